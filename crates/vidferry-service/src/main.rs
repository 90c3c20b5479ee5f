//! Service entry point.
//!
//! Wires the yt-dlp engine, the outbox delivery channel, and a tracing
//! emitter into the pipeline, then serves `/health` until ctrl-c.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use vidferry_core::ports::TracingSessionEmitter;
use vidferry_service::{OutboxChannel, ServiceConfig, run};

/// Video download and delivery pipeline, headless service mode.
#[derive(Parser, Debug)]
#[command(name = "vidferry", version, about)]
struct Args {
    /// Port for the health endpoint.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Root directory for in-flight session scopes.
    #[arg(long, env = "VIDFERRY_WORKSPACE", default_value = "temp")]
    workspace_root: PathBuf,

    /// Directory finished artifacts are copied into.
    #[arg(long, env = "VIDFERRY_OUTBOX", default_value = "outbox")]
    outbox: PathBuf,

    /// Netscape cookies file passed to yt-dlp.
    #[arg(long, env = "VIDFERRY_COOKIES")]
    cookies: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let config = ServiceConfig {
        port: args.port,
        workspace_root: args.workspace_root,
        cookies_file: args.cookies,
    };

    run(
        config,
        Arc::new(OutboxChannel::new(args.outbox)),
        Arc::new(TracingSessionEmitter::new()),
    )
    .await
}
