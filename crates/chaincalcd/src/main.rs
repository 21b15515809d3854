//! Entry point for the `chaincalcd` binary.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match chaincalcd::run_server() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let mut stderr = io::stderr().lock();
            writeln!(stderr, "chaincalcd: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
