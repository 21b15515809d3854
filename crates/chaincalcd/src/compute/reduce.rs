//! Left-to-right reduction of an ordered operand chain.

use chaincalc_wire::{BinaryOp, Operand, OperatorError, UnaryOp};

use super::errors::ReductionError;

/// Folds operands that are already sorted by position.
///
/// The first operand seeds the accumulator with its unary operator applied.
/// Each later operand has its own unary operator applied and is then combined
/// with the accumulator using the binary operator carried by the operand
/// before it. The binary operator of the last operand is never read.
pub(crate) fn reduce(operands: &[Operand]) -> Result<f64, ReductionError> {
    let Some((first, rest)) = operands.split_first() else {
        return Err(ReductionError::Empty);
    };
    let mut accumulator = unary_of(first, 0)?.apply(first.value);
    let mut previous = first;
    for (index, operand) in rest.iter().enumerate() {
        let order = position(index + 1);
        let combine = binary_of(previous, order - 1)?;
        let value = unary_of(operand, order)?.apply(operand.value);
        accumulator = combine.apply(accumulator, value);
        previous = operand;
    }
    Ok(accumulator)
}

fn unary_of(operand: &Operand, order: u32) -> Result<UnaryOp, ReductionError> {
    operand.unary.map_or(Ok(UnaryOp::Identity), |tag| {
        tag.unary()
            .map_err(|source| ReductionError::InvalidOperator { order, source })
    })
}

fn binary_of(operand: &Operand, order: u32) -> Result<BinaryOp, ReductionError> {
    let Some(tag) = operand.binary else {
        return Err(ReductionError::InvalidOperator {
            order,
            source: OperatorError::MissingBinary { order },
        });
    };
    tag.binary()
        .map_err(|source| ReductionError::InvalidOperator { order, source })
}

fn position(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaincalc_wire::OperatorTag;
    use rstest::rstest;

    #[test]
    fn sums_a_chain_of_additions() {
        let operands = [
            Operand::with_unary(OperatorTag::Plus, 10.0, OperatorTag::Plus),
            Operand::with_unary(OperatorTag::Plus, 10.0, OperatorTag::Plus),
            Operand::with_unary(OperatorTag::Plus, 14.0, OperatorTag::Equals),
        ];
        assert_eq!(reduce(&operands), Ok(34.0));
    }

    #[test]
    fn applies_unary_before_combining() {
        let operands = [
            Operand::with_unary(OperatorTag::Square, 3.0, OperatorTag::Plus),
            Operand::terminal(None, 4.0),
        ];
        assert_eq!(reduce(&operands), Ok(13.0));
    }

    #[test]
    fn division_by_zero_follows_ieee_754() {
        let operands = [
            Operand::new(5.0, OperatorTag::Divide),
            Operand::new(0.0, OperatorTag::Equals),
        ];
        assert_eq!(reduce(&operands), Ok(f64::INFINITY));
    }

    #[test]
    fn single_operand_ignores_its_binary_operator() {
        let operands = [Operand::with_unary(OperatorTag::Minus, 2.0, OperatorTag::Sin)];
        assert_eq!(reduce(&operands), Ok(-2.0));
    }

    #[test]
    fn precedence_is_strictly_left_to_right() {
        let operands = [
            Operand::new(2.0, OperatorTag::Plus),
            Operand::new(3.0, OperatorTag::Mult),
            Operand::new(4.0, OperatorTag::Equals),
        ];
        assert_eq!(reduce(&operands), Ok(20.0));
    }

    #[rstest]
    #[case::equals_mid_chain(
        [Operand::new(1.0, OperatorTag::Equals), Operand::new(2.0, OperatorTag::Equals)],
        ReductionError::InvalidOperator {
            order: 0,
            source: OperatorError::NotBinary(OperatorTag::Equals),
        }
    )]
    #[case::binary_only_tag_as_unary(
        [
            Operand::new(1.0, OperatorTag::Plus),
            Operand::with_unary(OperatorTag::Mult, 2.0, OperatorTag::Equals),
        ],
        ReductionError::InvalidOperator {
            order: 1,
            source: OperatorError::NotUnary(OperatorTag::Mult),
        }
    )]
    #[case::missing_binary(
        [Operand::terminal(None, 1.0), Operand::new(2.0, OperatorTag::Equals)],
        ReductionError::InvalidOperator {
            order: 0,
            source: OperatorError::MissingBinary { order: 0 },
        }
    )]
    fn misplaced_operators_fail(#[case] operands: [Operand; 2], #[case] expected: ReductionError) {
        assert_eq!(reduce(&operands), Err(expected));
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert_eq!(reduce(&[]), Err(ReductionError::Empty));
    }
}
