mod dispatch;
mod exit;
mod logging;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use log::error;

use crate::dispatch::run_cli;
use crate::exit::exit_code_for;
use crate::render::TerminalRenderer;

#[derive(Parser, Debug)]
#[command(name = "memoria")]
#[command(about = "Install and keep the memoria RAG system up to date", long_about = None)]
pub(crate) struct Cli {
    /// Installation root (defaults to ~/.memoria).
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,
    /// Installer config file (defaults to <root>/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Download, verify and install memoria.
    Install {
        #[arg(long = "version", value_name = "VERSION")]
        target: Option<String>,
    },
    /// Move the installation to the latest (or a given) release.
    Update {
        #[arg(long = "version", value_name = "VERSION")]
        target: Option<String>,
        /// Ignore the cached latest version and ask the release server.
        #[arg(long)]
        refresh: bool,
    },
    /// Remove the installation, its container and shell hooks.
    Uninstall {
        #[arg(long)]
        yes: bool,
        /// Also delete the vector store data and config.toml.
        #[arg(long)]
        purge: bool,
    },
    /// Report whether a newer release is available.
    Check {
        #[arg(long)]
        refresh: bool,
    },
    /// Verify the installed system is serving.
    Health,
    /// Print the CLI and installed versions.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.quiet);
    let renderer = TerminalRenderer::current();

    match run_cli(cli, renderer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            renderer.print_status("err", &err.to_string());
            for line in err.rollback_report() {
                eprintln!("  {line}");
            }
            let mut cause = std::error::Error::source(&err);
            while let Some(inner) = cause {
                eprintln!("  caused by: {inner}");
                cause = inner.source();
            }
            if err.is_fatal() {
                error!("installation may be inconsistent; inspect the kept backup before retrying");
            }
            ExitCode::from(exit_code_for(&err))
        }
    }
}

#[cfg(test)]
mod tests;
