//! RepoLens installer CLI.
//!
//! This CLI installs the RepoLens self-hosted code-intelligence stack:
//! it checks prerequisites, gathers configuration interactively, pulls the
//! service images, and waits for the stack to come up healthy.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repolens_cli::commands::install::InstallCommand;
use repolens_cli::commands::uninstall::UninstallCommand;
use repolens_cli::{compose, runner, ui};

/// RepoLens - self-hosted code intelligence installer.
#[derive(Parser)]
#[command(
    name = "repolens",
    version,
    about = "RepoLens installer",
    long_about = "Install the RepoLens self-hosted code intelligence stack.\n\n\
                  This CLI checks your machine, asks for the credentials the\n\
                  services need, starts the container stack, and waits for it\n\
                  to come up healthy.\n\n\
                  Configuration lives in a .env file in the install directory;\n\
                  re-running the installer offers to update or reinstall."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the RepoLens stack.
    ///
    /// Checks prerequisites, gathers configuration interactively, starts
    /// the four services, and waits for the server to answer.
    Install(InstallCommand),

    /// Remove the RepoLens stack and all of its data.
    Uninstall(UninstallCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("info,repolens_cli=debug")
    } else {
        EnvFilter::new("warn,repolens_cli=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let code = tokio::select! {
        result = run(cli) => match result {
            Ok(()) => 0,
            Err(e) => {
                runner::abandon_active_spinner();
                ui::show_cursor();
                eprintln!("Error: {e:#}");
                1
            }
        },
        _ = tokio::signal::ctrl_c() => on_interrupt(),
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Install(cmd) => cmd.run().await,
        Commands::Uninstall(cmd) => cmd.run().await,
    }
}

/// Single interrupt handler for the whole binary.
///
/// Ctrl-C while the log tail is streaming is the documented way to leave a
/// finished install and exits cleanly; at any earlier point it abandons the
/// run, restores the terminal, and exits 130.
fn on_interrupt() -> i32 {
    if compose::log_tail_active() {
        // The tail child shares the process group and got the signal too.
        println!();
        return 0;
    }

    runner::abandon_active_spinner();
    ui::show_cursor();
    eprintln!();
    eprintln!("Interrupted. Nothing is running in the background;");
    eprintln!("re-run 'repolens install' to pick up where you left off.");
    130
}
