//! Argument parsing for the `chaincalc` binary.

use clap::Parser;

/// Evaluates a chained calculation on a chaincalc server.
///
/// Configuration flags (`--host`, `--reply-port`, ...) must precede the
/// operand tokens.
#[derive(Parser, Debug)]
#[command(name = "chaincalc", version)]
pub(crate) struct Cli {
    /// Operand tokens of the form `[UNARY:]VALUE[:BINARY]`, for example
    /// `square:3:plus 4`.
    #[arg(
        value_name = "OPERAND",
        required = true,
        num_args = 1..,
        allow_hyphen_values = true
    )]
    pub(crate) operands: Vec<String>,
}
