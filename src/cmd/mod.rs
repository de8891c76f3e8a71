//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`] or [`validate`]. Each handler lives in
//! its own submodule.

pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::ButlerError;

pub async fn dispatch(cli: Cli) -> Result<(), ButlerError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  butler v{version} \u{2014} configuration-management agent\n\n  \
         No command provided. To get started:\n\n    \
         butler run -u http://configs/butler.toml   Start the agent\n    \
         butler validate butler.toml                Check a config document\n    \
         butler --help                              See all commands and options\n"
    );
}
