//! TLS load-balancing TCP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                  TLS BALANCER                     │
//!                      │                                                   │
//!   Node (client)      │  ┌──────────┐   ┌──────────────┐   ┌──────────┐  │
//!   ───────────────────┼─▶│   net    │──▶│load_balancer │──▶│ net::tls │──┼──▶ Target
//!                      │  │ listener │   │   selector   │   │  dialer  │  │    (TLS)
//!                      │  └────┬─────┘   └──────────────┘   └────┬─────┘  │
//!                      │       │                                  │        │
//!                      │       ▼                                  ▼        │
//!                      │  ┌──────────────────────────────────────────┐    │
//!                      │  │ proxy: relay node→target / target→node    │    │
//!                      │  │ pairing: trackers + pair registry         │    │
//!                      │  └──────────────────────────────────────────┘    │
//!                      │                                                   │
//!                      │  config · lifecycle · observability · admin      │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use tls_balancer::config::load_config;
use tls_balancer::lifecycle::{shutdown_signal, Application, Shutdown};
use tls_balancer::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "tls-balancer")]
#[command(about = "Least-loaded TCP to TLS load balancer", long_about = None)]
struct Args {
    /// Path to the configuration file (.json or .toml)
    #[arg(default_value = "config.json")]
    config: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "tls-balancer starting"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.threads > 0 {
        builder.worker_threads(config.threads);
    }
    let runtime = builder.build()?;

    runtime.block_on(async move {
        let app = Application::build(config).await.inspect_err(|e| {
            tracing::error!(error = %e, "Startup failed");
        })?;

        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.trigger();
        });

        app.run(&shutdown).await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
