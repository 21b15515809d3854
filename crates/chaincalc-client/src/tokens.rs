//! Command-line operand tokens.
//!
//! A token has the form `[UNARY:]VALUE[:BINARY]`, with operator names matched
//! case-insensitively. `SQUARE:3:PLUS` squares 3 and adds the next operand;
//! `10:PLUS` leaves the value unchanged; `4` or `4:EQUALS` ends the chain.
//! Only the last token may omit its binary operator.

use std::str::FromStr;

use chaincalc_wire::{Operand, OperatorError, OperatorTag};
use thiserror::Error;

/// A token that does not describe an operand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperandParseError {
    /// The token has no value or too many `:` separated parts.
    #[error("`{token}` is not of the form [UNARY:]VALUE[:BINARY]")]
    Shape {
        /// Offending token.
        token: String,
    },
    /// The value part is not a number.
    #[error("`{value}` in `{token}` is not a number")]
    InvalidValue {
        /// Offending token.
        token: String,
        /// Unparseable value.
        value: String,
    },
    /// An operator name outside the fixed operator set.
    #[error("`{name}` in `{token}` is not an operator")]
    UnknownOperator {
        /// Offending token.
        token: String,
        /// Unrecognised name.
        name: String,
    },
    /// A known operator in a position it has no meaning in.
    #[error("`{token}`: {source}")]
    Misplaced {
        /// Offending token.
        token: String,
        /// Why the operator does not fit.
        #[source]
        source: OperatorError,
    },
}

/// Parses a whole chain of operand tokens.
///
/// # Errors
///
/// Returns the first [`OperandParseError`] found, in token order.
pub fn parse_operands<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Operand>, OperandParseError> {
    let last = tokens.len().saturating_sub(1);
    tokens
        .iter()
        .enumerate()
        .map(|(index, token)| parse_operand(token.as_ref(), index, index == last))
        .collect()
}

fn parse_operand(token: &str, index: usize, terminal: bool) -> Result<Operand, OperandParseError> {
    let parts: Vec<&str> = token.split(':').collect();
    let (unary, value, binary) = match parts.as_slice() {
        [value] => (None, *value, None),
        [first, second] if f64::from_str(first).is_ok() => (None, *first, Some(*second)),
        [unary, value] => (Some(*unary), *value, None),
        [unary, value, binary] => (Some(*unary), *value, Some(*binary)),
        _ => {
            return Err(OperandParseError::Shape {
                token: token.to_owned(),
            });
        }
    };

    let value = value
        .parse::<f64>()
        .map_err(|_| OperandParseError::InvalidValue {
            token: token.to_owned(),
            value: value.to_owned(),
        })?;
    let unary = unary.map(|name| operator(token, name)).transpose()?;
    if let Some(tag) = unary {
        tag.unary().map_err(|source| misplaced(token, source))?;
    }
    let binary = binary.map(|name| operator(token, name)).transpose()?;

    if terminal {
        return Ok(Operand {
            unary,
            value,
            binary,
        });
    }
    let order = u32::try_from(index).unwrap_or(u32::MAX);
    let tag = binary.ok_or_else(|| misplaced(token, OperatorError::MissingBinary { order }))?;
    tag.binary().map_err(|source| misplaced(token, source))?;
    Ok(Operand {
        unary,
        value,
        binary: Some(tag),
    })
}

fn operator(token: &str, name: &str) -> Result<OperatorTag, OperandParseError> {
    OperatorTag::from_str(&name.to_ascii_uppercase()).map_err(|_| {
        OperandParseError::UnknownOperator {
            token: token.to_owned(),
            name: name.to_owned(),
        }
    })
}

fn misplaced(token: &str, source: OperatorError) -> OperandParseError {
    OperandParseError::Misplaced {
        token: token.to_owned(),
        source,
    }
}
