//! Entry point for the Attendance Engine binary.
//!
//! Running this binary starts an HTTP server exposing daily timecards,
//! monthly payroll summaries and punch corrections.  Settings are read
//! from `ATTENDANCE_*` environment variables (see
//! [`attendance_engine::config::ServerConfig`]); log verbosity follows
//! `RUST_LOG` and defaults to `info`.

use attendance_engine::config::ServerConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();
    if let Err(err) = attendance_engine::api::serve(config).await {
        error!(error = %err, "server terminated");
        std::process::exit(1);
    }
}
