//! numng CLI entry point
//!
//! Parses arguments, installs logging and maps failures to exit codes:
//! `2` resolution, `3` fetch, `4` build, `5` link, `1` anything else.

use clap::Parser;
use numng::cli;
use numng::core::{EXIT_SUCCESS, user_friendly_error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let code = match cli.execute().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            error_ctx.exit_code()
        }
    };
    std::process::exit(code);
}
