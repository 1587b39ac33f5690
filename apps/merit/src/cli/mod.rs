//! # Merit CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Create the data directory and both databases
//! - `status` - Count stored achievements by status
//! - `reconcile` - Report inconsistencies between the two stores

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use merit_core::MeritError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Merit - student achievement tracking
///
/// Records achievements as a workflow reference plus a content document and
/// walks them through submission and advisor verification.
#[derive(Parser, Debug)]
#[command(name = "merit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "merit.toml")]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize the data directory
    Init {
        /// Replace existing databases
        #[arg(short, long)]
        force: bool,
    },

    /// Show achievement counts by status
    Status,

    /// Check both stores for orphans, corrupt references and ownership
    /// mismatches
    Reconcile,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

pub async fn execute(cli: Cli) -> Result<(), MeritError> {
    let mut config = Config::load(Some(&cli.config))?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config, cli.quiet).await
        }
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Reconcile) => cmd_reconcile(&config, json_mode),
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_flags_parse() {
        let cli = Cli::try_parse_from(["merit", "--json-mode", "server", "-p", "9001"])
            .expect("parse");
        assert!(cli.json_mode);
        assert!(matches!(
            cli.command,
            Some(Commands::Server {
                host: None,
                port: Some(9001)
            })
        ));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["merit", "init", "--force", "--config", "alt.toml"])
            .expect("parse");
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(cli.command, Some(Commands::Init { force: true })));
    }
}
