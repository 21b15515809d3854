//! Client side of chaincalc.
//!
//! [`Client`] splits a chain of [`Operand`](chaincalc_wire::Operand)s into
//! chunks, writes them in parallel over one connection per destination port
//! and hands back a [`ResultHandle`] that the receiver thread resolves when
//! the server answers on the reply connection.
//!
//! The `chaincalc` binary wraps the client: [`run`] loads configuration,
//! parses operand tokens with [`parse_operands`], waits for the value and
//! prints it.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

mod cli;
mod config;
mod dispatch;
mod errors;
mod handle;
mod logging;
mod options;
mod receiver;
mod registry;
mod sender;
mod tokens;
mod transport;

#[cfg(test)]
mod tests;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub use dispatch::Client;
pub(crate) use errors::AppError;
pub use errors::{ClientError, ResultError};
pub use handle::{ResultHandle, ResultState};
pub use options::{ClientOptions, DEFAULT_QUEUE_CAPACITY};
pub use tokens::{OperandParseError, parse_operands};

/// Runs the `chaincalc` command line with the given arguments and streams.
///
/// Prints the value on `stdout` and returns success, or reports the failure
/// on `stderr`.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    match execute(&args, stdout, loader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::CliUsage(error))
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            write!(stdout, "{error}").ok();
            ExitCode::SUCCESS
        }
        Err(error) => {
            writeln!(stderr, "chaincalc: {error}").ok();
            ExitCode::FAILURE
        }
    }
}

fn execute<W, L>(args: &[OsString], stdout: &mut W, loader: &L) -> Result<(), AppError>
where
    W: Write,
    L: ConfigLoader,
{
    let split = split_config_arguments(args);
    let cli = Cli::try_parse_from(split.cli_arguments(args)).map_err(AppError::CliUsage)?;
    let config = loader.load(&split.config_arguments)?;
    config
        .validate_client()
        .map_err(AppError::InvalidConfiguration)?;
    logging::install(&config)?;
    let operands = parse_operands(&cli.operands)?;

    let client = Client::start(ClientOptions::from_config(&config))?;
    let outcome = client
        .calculate(&operands)
        .map_err(AppError::from)
        .and_then(|handle| handle.wait().map_err(AppError::from));
    client.close();
    let value = outcome?;
    writeln!(stdout, "{value}").map_err(AppError::WriteResult)
}
