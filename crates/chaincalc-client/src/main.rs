//! CLI entrypoint for the chaincalc client.
//!
//! Delegates to [`chaincalc_client::run`], which loads configuration, parses
//! the operand tokens and prints the calculated value.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    chaincalc_client::run(std::env::args_os(), &mut stdout, &mut stderr)
}
