//! Guardrails Orchestrator
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                     ORCHESTRATOR                      │
//!   Client request   │  ┌────────┐   ┌──────────────┐   ┌────────────────┐  │
//!   ─────────────────┼─▶│  http  │──▶│ orchestrator │──▶│   detectors    │◀─┼──▶ Detector
//!                    │  │ server │   │  (stages)    │   │ (JoinSet fan)  │  │    services
//!                    │  └────────┘   └──────┬───────┘   └────────────────┘  │
//!                    │                      │ pass                          │
//!                    │                      ▼                               │
//!   Client response  │               ┌──────────────┐                       │
//!   ◀────────────────┼───────────────│   primary    │◀──────────────────────┼──▶ OpenAI-compatible
//!                    │               │ (openai.rs)  │                       │    service
//!                    │               └──────────────┘                       │
//!                    │  ┌──────────────────────────────────────────────────┐ │
//!                    │  │ config + watcher │ net (TLS profiles) │ security │ │
//!                    │  │ upstream clients │ health │ observability        │ │
//!                    │  └──────────────────────────────────────────────────┘ │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use guardrails_orchestrator::config::{load_config, watcher::ConfigWatcher, ConfigOverrides};
use guardrails_orchestrator::lifecycle::{preflight, signals, Shutdown};
use guardrails_orchestrator::observability::{logging, metrics};
use guardrails_orchestrator::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "guardrails-orchestrator")]
#[command(about = "Screens chat completions through detector services", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "ORCHESTRATOR_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Override `server.bind_address`
    #[arg(long)]
    bind_address: Option<SocketAddr>,

    /// Override `observability.log_level`
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        bind_address: args.bind_address,
    };
    let mut config = load_config(&args.config)?;
    overrides.apply(&mut config);

    logging::init_logging(&config.observability, args.log_level.as_deref())
        .map_err(|e| format!("failed to initialize logging: {e}"))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "guardrails-orchestrator starting"
    );

    // Resolves every referenced TLS profile and the listener pair; nothing
    // binds if this fails.
    let orchestrator = preflight(&config).await?;

    if args.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        tls = config.server.tls.is_some(),
        request_timeout_secs = config.server.request_timeout_secs,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    let server = HttpServer::new(orchestrator, config).with_overrides(overrides);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
