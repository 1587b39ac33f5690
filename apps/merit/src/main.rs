//! # Merit - Student Achievement Server
//!
//! The main binary for the merit achievement workflow.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  apps/merit (THE BINARY)                 │
//! │                                                          │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐   │
//! │  │    CLI      │    │  HTTP API   │    │   Config    │   │
//! │  │   (clap)    │    │   (axum)    │    │   (toml)    │   │
//! │  └──────┬──────┘    └──────┬──────┘    └──────┬──────┘   │
//! │         └──────────────────┼──────────────────┘          │
//! │                            ▼                             │
//! │                 ┌─────────────────────┐                  │
//! │                 │ AchievementService  │                  │
//! │                 │ (spawn_blocking +   │                  │
//! │                 │  timeout budgets)   │                  │
//! │                 └──────────┬──────────┘                  │
//! │                            ▼                             │
//! │                    ┌───────────────┐                     │
//! │                    │  merit-core   │                     │
//! │                    │  (THE LOGIC)  │                     │
//! │                    └───────────────┘                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! merit init
//! merit server --host 0.0.0.0 --port 8080
//! merit status --json-mode
//! merit reconcile
//! ```

use clap::Parser;
use merit::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // MERIT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("MERIT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "merit=info,merit_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(code = e.outcome().as_str(), "{}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ███╗   ███╗███████╗██████╗ ██╗████████╗
  ████╗ ████║██╔════╝██╔══██╗██║╚══██╔══╝
  ██╔████╔██║█████╗  ██████╔╝██║   ██║
  ██║╚██╔╝██║██╔══╝  ██╔══██╗██║   ██║
  ██║ ╚═╝ ██║███████╗██║  ██║██║   ██║
  ╚═╝     ╚═╝╚══════╝╚═╝  ╚═╝╚═╝   ╚═╝

  Student Achievement Server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
