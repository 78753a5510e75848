// Copyright 2026 Vouchsafe Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use vouchsafe::cli;

#[derive(Parser)]
#[command(
    name = "vouchsafe",
    about = "Voucher probe and stock scanner for the SHEIN India storefront",
    version,
    after_help = "Run 'vouchsafe <command> --help' for details on each command.\nFirst run: 'vouchsafe login' to save an authenticated browser profile."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check voucher codes against the storefront cart
    Check {
        /// Voucher codes to classify
        codes: Vec<String>,
        /// Leave the browser open after the batch
        #[arg(long)]
        keep_open: bool,
    },
    /// Scan a catalog collection for in-stock products
    Scan {
        /// Collection URL to scan (defaults to the standing collection)
        #[arg(long)]
        target: Option<String>,
        /// Leave the browser open after the scan
        #[arg(long)]
        keep_open: bool,
    },
    /// Scan the account wishlist for in-stock products
    Wishlist {
        /// Leave the browser open after the scan
        #[arg(long)]
        keep_open: bool,
    },
    /// Open a visible browser window to log in manually
    Login,
    /// Re-check protected codes on a fixed cadence
    Watch {
        /// Codes to watch (defaults to the protected roster)
        codes: Vec<String>,
        /// Seconds between cycles
        #[arg(long, default_value = "180")]
        interval: u64,
    },
    /// Generate candidate voucher codes for a tier
    Generate {
        /// Voucher tier by value: 500, 1000, or 2000
        value: u32,
        /// How many codes to generate
        #[arg(long, default_value = "10")]
        count: usize,
    },
    /// Manage the protected-code roster
    Protect {
        #[command(subcommand)]
        action: ProtectAction,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProtectAction {
    /// Add codes to the roster
    Add {
        /// Codes to protect
        codes: Vec<String>,
    },
    /// Remove codes from the roster
    Release {
        /// Codes to release
        codes: Vec<String>,
    },
    /// Show the roster
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("VOUCHSAFE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("VOUCHSAFE_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("VOUCHSAFE_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("VOUCHSAFE_NO_COLOR", "1");
    }

    init_tracing(cli.verbose, cli.quiet, cli.no_color);

    let result = match cli.command {
        Commands::Check { codes, keep_open } => cli::check::run(&codes, keep_open).await,
        Commands::Scan { target, keep_open } => {
            cli::scan_cmd::run(target.as_deref(), keep_open).await
        }
        Commands::Wishlist { keep_open } => cli::wishlist_cmd::run(keep_open).await,
        Commands::Login => cli::login::run().await,
        Commands::Watch { codes, interval } => cli::watch_cmd::run(&codes, interval).await,
        Commands::Generate { value, count } => cli::generate_cmd::run(value, count).await,
        Commands::Protect { action } => match action {
            ProtectAction::Add { codes } => cli::protect_cmd::run_add(&codes).await,
            ProtectAction::Release { codes } => cli::protect_cmd::run_release(&codes).await,
            ProtectAction::List => cli::protect_cmd::run_list().await,
        },
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "vouchsafe", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}

/// Logs go to stderr so stdout stays parseable in JSON mode.
fn init_tracing(verbose: bool, quiet: bool, no_color: bool) {
    let directive = if verbose {
        "vouchsafe=debug"
    } else if quiet {
        "vouchsafe=warn"
    } else {
        "vouchsafe=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .init();
}
