//! Command-line interface
//!
//! Provides argument parsing and subcommand handling for the server binary.

use clap::{Parser, Subcommand};

/// Demo HTTP server reporting request and response metrics
#[derive(Parser)]
#[command(name = "otelmetrics-demo")]
#[command(version)]
#[command(about = "Demo HTTP server reporting request and response metrics")]
#[command(
    long_about = "Serves a default handler on every path, counts requests and responses \
    through a metrics middleware, and pushes the counters to a push gateway on a fixed interval."
)]
pub struct Cli {
    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# Demo server configuration
# =========================
#
# Every section and key is optional. Missing values use the defaults shown.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 8080

# Seconds in-flight requests may run after Ctrl-C before they are aborted (1-300)
shutdown_timeout_seconds = 30

# ─────────────────────────────────────────────────────────────────────────────
# PUSH EXPORTER
# ─────────────────────────────────────────────────────────────────────────────
#
# Metrics are pushed to a Prometheus push gateway at
#   <push_url>/metrics/job/<job>
# Setting PUSHGATEWAY_HOST_IP in the environment overrides push_url with
#   http://$PUSHGATEWAY_HOST_IP:9091

[exporter]
enabled = true
push_url = "http://localhost:9091"
job = "otel-example"

# Attached to every metric as the `env` label
env = "local"

# Push period in seconds (1-3600)
interval_seconds = 10

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"
"#
}
