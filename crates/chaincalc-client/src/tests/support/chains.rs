use chaincalc_wire::{Operand, OperatorTag};

pub(crate) fn named_chain(name: &str) -> Result<Vec<Operand>, String> {
    match name {
        "sum" => Ok(vec![
            Operand::new(10.0, OperatorTag::Plus),
            Operand::new(10.0, OperatorTag::Plus),
            Operand::terminal(None, 14.0),
        ]),
        "square" => Ok(vec![
            Operand::with_unary(OperatorTag::Square, 3.0, OperatorTag::Plus),
            Operand::terminal(Some(OperatorTag::Plus), 4.0),
        ]),
        "divide-by-zero" => Ok(vec![
            Operand::new(5.0, OperatorTag::Divide),
            Operand::terminal(None, 0.0),
        ]),
        "long" => Ok((1..=40)
            .map(|step| Operand::new(f64::from(step), OperatorTag::Plus))
            .chain([Operand::terminal(None, 0.0)])
            .collect()),
        other => Err(format!("unknown chain '{other}'")),
    }
}

pub(crate) fn parse_value(text: &str) -> Result<f64, String> {
    match text {
        "infinity" => Ok(f64::INFINITY),
        other => other
            .parse()
            .map_err(|error| format!("invalid value '{other}': {error}")),
    }
}
