//! Demo HTTP server
//!
//! Serves the default handler behind the metrics middleware and the outer
//! server instrumentation, and pushes the collected metrics to a push gateway.

use clap::Parser;
use otelmetrics_demo::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    exporter::PushExporter,
    handlers::{self, DefaultHandler},
    middleware::{MessageEvents, MetricsMiddleware, ServerInstrumentation},
    server,
    sink::{MetricSink, PrometheusSink},
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        match output {
            Some(path) => {
                std::fs::write(&path, generate_config_template())?;
                println!("Configuration template written to {}", path);
            }
            None => print!("{}", generate_config_template()),
        }
        return Ok(());
    }

    // Load configuration
    let config = Config::load_or_default(&cli.config)?;

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting demo server on {}:{}",
        config.server.host,
        config.server.port
    );

    let sink = PrometheusSink::with_env(&config.exporter.env)?;

    let exporter = if config.exporter.enabled {
        Some(PushExporter::new(&config.exporter, sink.registry())?.spawn())
    } else {
        tracing::info!("Push exporter disabled");
        None
    };

    let sink: Arc<dyn MetricSink> = Arc::new(sink);
    let metrics = Arc::new(MetricsMiddleware::new(
        Arc::new(DefaultHandler),
        Arc::clone(&sink),
    ));
    let handler = ServerInstrumentation::new(metrics, sink.as_ref(), "server")
        .with_message_events(MessageEvents::ALL);
    let app = handlers::router(Arc::new(handler));

    let result = server::run(&config.server, app, server::shutdown_signal()).await;

    if let Some(exporter) = exporter {
        exporter.stop().await;
    }

    result?;
    tracing::info!("Server stopped");
    Ok(())
}
