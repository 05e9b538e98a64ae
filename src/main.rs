//! jmap-mcp-rs: JMAP MCP server over stdio
//!
//! Exposes a JMAP mail account to an MCP client as a set of tools. At
//! startup the server negotiates a JMAP session and registers only the tool
//! groups the account supports: mail reading always, mail mutation for
//! read-write accounts, and message submission when the server offers it.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and exit status
//! - [`bootstrap`]: Startup state machine and stdio serving
//! - [`config`]: Environment-driven connection settings
//! - [`session`]: Session negotiation and active account selection
//! - [`capability`]: Capability gate deciding which tool groups to expose
//! - [`jmap`]: Thin JMAP client (session fetch, single method calls)
//! - [`server`]: MCP serving surface, tool registrar, and tool handlers
//! - [`models`]: Tool input DTOs and the response envelope
//! - [`errors`]: Bootstrap error taxonomy and MCP error mapping

mod bootstrap;
mod capability;
mod config;
mod errors;
mod jmap;
mod models;
mod server;
mod session;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Initializes tracing on stderr (stdout carries MCP traffic only), runs the
/// bootstrap, and serves until the client disconnects. Any bootstrap failure
/// prints a diagnostic with its cause chain and exits non-zero.
///
/// # Environment Variables
///
/// See [`config::RuntimeConfig::load_from_env`].
///
/// # Example
///
/// ```no_run
/// JMAP_SESSION_URL=https://api.fastmail.com/jmap/session \
/// JMAP_BEARER_TOKEN=fmu1-... \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match bootstrap::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "{}", err.label());
            eprintln!("{}", err.diagnostic());
            ExitCode::FAILURE
        }
    }
}
