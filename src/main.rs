//! ==============================================================================
//! main.rs - telemetry simulator entry point
//! ==============================================================================
//!
//! purpose:
//!     fabricates gateway / endpoint / sensor telemetry and publishes it to an
//!     mqtt broker over websockets, so the iot dashboard can be exercised
//!     without real hardware in the field.
//!
//! responsibilities:
//!     - load simulator.toml and apply command line overrides
//!     - initialize logging
//!     - print example payloads
//!     - connect (or dry run) and run the publish loop until ctrl+c
//!
//! relationships:
//!     - uses: config.rs (settings), generator.rs (data), publisher.rs (mqtt)
//!
//! ==============================================================================

mod config;
mod domain;
mod generator;
mod publisher;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Cli, SimulatorConfig};
use generator::TelemetryGenerator;
use publisher::{DryRunSink, PublishLoop, Schedule, TelemetrySink};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // step 1: load configuration
    let (mut config, source) = SimulatorConfig::resolve(cli.config.as_deref())?;
    config.apply_cli(&cli);
    config.validate().context("invalid configuration")?;

    // step 2: logging (RUST_LOG wins over the config file)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => warn!("No config file found - using defaults"),
    }

    // startup banner
    println!("===========================================================");
    println!("  MQTT Simulator (WebSocket) - Testing IoT App");
    println!("===========================================================");
    config.print_summary();

    // step 3: the generator, seeded when asked for reproducible data
    let rng = match config.simulation.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut generator = TelemetryGenerator::new(config.generator_settings(), rng)
        .context("invalid simulation settings")?;

    print_examples(&mut generator)?;

    // step 4: publish
    if config.dry_run {
        info!("Dry run: payloads are logged, nothing is sent");
        run(generator, DryRunSink, &config).await;
    } else {
        let (sink, mut connected) = publisher::connect(&config).context("failed to create MQTT client")?;
        info!(
            "Connecting to {}",
            publisher::broker_url(&config.broker.host, config.broker.port, &config.broker.path, config.use_tls())
        );
        publisher::wait_connected(&mut connected, Duration::from_secs(config.broker.connect_timeout_seconds)).await;
        run(generator, sink, &config).await;
    }

    Ok(())
}

async fn run<S: TelemetrySink>(generator: TelemetryGenerator<StdRng>, sink: S, config: &SimulatorConfig) {
    let summary = PublishLoop::new(
        generator,
        sink,
        config.topics.clone(),
        Schedule::from_config(config),
        config.simulation.gateways,
    )
    .show_payloads(config.logging.show_payloads)
    .run(shutdown_signal())
    .await;

    info!(
        cycles = summary.cycles,
        published = summary.published,
        failed = summary.failed,
        "Simulator stopped"
    );
}

/// resolves on ctrl+c, never if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// one gateway with two endpoints, so the operator sees the document shapes
fn print_examples(generator: &mut TelemetryGenerator<StdRng>) -> Result<()> {
    let sensors = generator.settings().sensors;
    let id = generator::gateway_id(1);

    println!("Example payloads:");
    println!("gateway/gateway -> {}", serde_json::to_string_pretty(&generator.gateway(&id))?);
    println!("gateway/endpoint -> {}", serde_json::to_string_pretty(&generator.endpoints(&id, 2))?);
    println!("gateway/sensor -> {}", serde_json::to_string_pretty(&generator.sensors(&id, 2, sensors))?);
    println!();
    Ok(())
}
