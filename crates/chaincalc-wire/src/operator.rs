//! The fixed operator set shared by both ends of the protocol.

use strum::{Display, EnumString};

use crate::errors::OperatorError;

/// Operator names as they travel on the wire.
///
/// A tag is only a name; whether it is meaningful depends on the position it
/// occupies in an [`Operand`](crate::Operand). Use [`OperatorTag::unary`] and
/// [`OperatorTag::binary`] to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorTag {
    /// Terminal marker on the last operand of a chain.
    Equals,
    /// Identity when unary, addition when binary.
    Plus,
    /// Negation when unary, subtraction when binary.
    Minus,
    /// Multiplication.
    Mult,
    /// Division.
    Divide,
    /// Sine.
    Sin,
    /// Cosine.
    Cos,
    /// Natural exponential.
    Exp,
    /// Absolute value.
    Abs,
    /// Tangent.
    Tan,
    /// Square.
    Square,
    /// Natural logarithm.
    Ln,
}

impl OperatorTag {
    /// Every tag in declaration order.
    pub const ALL: [Self; 12] = [
        Self::Equals,
        Self::Plus,
        Self::Minus,
        Self::Mult,
        Self::Divide,
        Self::Sin,
        Self::Cos,
        Self::Exp,
        Self::Abs,
        Self::Tan,
        Self::Square,
        Self::Ln,
    ];

    /// Wire spelling of the tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "EQUALS",
            Self::Plus => "PLUS",
            Self::Minus => "MINUS",
            Self::Mult => "MULT",
            Self::Divide => "DIVIDE",
            Self::Sin => "SIN",
            Self::Cos => "COS",
            Self::Exp => "EXP",
            Self::Abs => "ABS",
            Self::Tan => "TAN",
            Self::Square => "SQUARE",
            Self::Ln => "LN",
        }
    }

    /// Interprets the tag in the leading (unary) position.
    pub fn unary(self) -> Result<UnaryOp, OperatorError> {
        match self {
            Self::Plus => Ok(UnaryOp::Identity),
            Self::Minus => Ok(UnaryOp::Negate),
            Self::Abs => Ok(UnaryOp::Abs),
            Self::Sin => Ok(UnaryOp::Sin),
            Self::Cos => Ok(UnaryOp::Cos),
            Self::Tan => Ok(UnaryOp::Tan),
            Self::Exp => Ok(UnaryOp::Exp),
            Self::Ln => Ok(UnaryOp::Ln),
            Self::Square => Ok(UnaryOp::Square),
            Self::Equals | Self::Mult | Self::Divide => Err(OperatorError::NotUnary(self)),
        }
    }

    /// Interprets the tag in the trailing (binary) position.
    pub fn binary(self) -> Result<BinaryOp, OperatorError> {
        match self {
            Self::Plus => Ok(BinaryOp::Add),
            Self::Minus => Ok(BinaryOp::Subtract),
            Self::Mult => Ok(BinaryOp::Multiply),
            Self::Divide => Ok(BinaryOp::Divide),
            Self::Equals
            | Self::Sin
            | Self::Cos
            | Self::Exp
            | Self::Abs
            | Self::Tan
            | Self::Square
            | Self::Ln => Err(OperatorError::NotBinary(self)),
        }
    }
}

/// Length in bytes of the longest tag; bounds the size of a chunk frame.
pub const MAX_TAG_LEN: usize = max_tag_len();

const fn max_tag_len() -> usize {
    let mut longest = 0;
    let mut index = 0;
    while index < OperatorTag::ALL.len() {
        let len = OperatorTag::ALL[index].as_str().len();
        if len > longest {
            longest = len;
        }
        index += 1;
    }
    longest
}

/// Operators applied to a single operand before it is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Leaves the value untouched.
    Identity,
    /// Flips the sign.
    Negate,
    /// Absolute value.
    Abs,
    /// Sine, radians.
    Sin,
    /// Cosine, radians.
    Cos,
    /// Tangent, radians.
    Tan,
    /// `e^x`.
    Exp,
    /// Natural logarithm; non-positive input yields NaN or negative infinity.
    Ln,
    /// `x * x`.
    Square,
}

impl UnaryOp {
    /// Applies the operator with plain IEEE-754 semantics.
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Identity => value,
            Self::Negate => -value,
            Self::Abs => value.abs(),
            Self::Sin => value.sin(),
            Self::Cos => value.cos(),
            Self::Tan => value.tan(),
            Self::Exp => value.exp(),
            Self::Ln => value.ln(),
            Self::Square => value * value,
        }
    }
}

/// Operators combining the running accumulator with the next operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `lhs + rhs`.
    Add,
    /// `lhs - rhs`.
    Subtract,
    /// `lhs * rhs`.
    Multiply,
    /// `lhs / rhs`; division by zero yields an infinity or NaN.
    Divide,
}

impl BinaryOp {
    /// Applies the operator with plain IEEE-754 semantics.
    #[must_use]
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Subtract => lhs - rhs,
            Self::Multiply => lhs * rhs,
            Self::Divide => lhs / rhs,
        }
    }
}
