//! Entry point for the `tessera` binary.
#![forbid(unsafe_code)]

use tessera_cli::CliError;

fn main() -> eyre::Result<()> {
    match tessera_cli::run() {
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        outcome => outcome.map_err(eyre::Report::from),
    }
}
