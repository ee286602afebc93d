//! apply_upgrade - validate, preview and apply POS upgrade packages

use clap::Parser;

mod cli;
mod commands;

use cli::Cli;
use commands::common::{ExitCode, EXIT_UNHANDLED};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match commands::apply::execute(&cli).await {
        Ok(()) => 0,
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(ExitCode(code)) => *code,
            None => {
                eprintln!("Error: {err:#}");
                EXIT_UNHANDLED
            }
        },
    };
    std::process::exit(code);
}
