//! ==============================================================================
//! config.rs - Simulator Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `simulator.toml` and the command line flags.
//!     loads configuration from file or falls back to defaults, then applies
//!     flag overrides on top.
//!
//! structure:
//!     - BrokerConfig: where to connect (websocket host/port/path, credentials).
//!     - TopicsConfig: the three publish topics.
//!     - ScheduleConfig: cycle interval, pause between messages, cycle limit.
//!     - SimulationConfig: how many gateways/endpoints/sensors, value bounds.
//!     - RealismConfig: random walk parameters.
//!     - LoggingConfig: log level and payload echo.
//!
//! ==============================================================================

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::generator::GeneratorSettings;

/// Command line flags. Anything given here wins over simulator.toml.
#[derive(Parser, Debug, Default)]
#[command(name = "telemetry-sim", version, about = "MQTT (WebSocket) telemetry simulator")]
pub struct Cli {
    /// Path to simulator.toml (default: config/simulator.toml if present)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// MQTT broker host
    #[arg(long, short = 'H')]
    pub host: Option<String>,

    /// MQTT WebSocket port (443 switches to wss)
    #[arg(long, short)]
    pub port: Option<u16>,

    /// WebSocket path
    #[arg(long)]
    pub path: Option<String>,

    /// Username
    #[arg(long, short)]
    pub user: Option<String>,

    /// Password
    #[arg(long)]
    pub password: Option<String>,

    /// Publish interval in seconds
    #[arg(long, short)]
    pub interval: Option<u64>,

    /// Stop after this many cycles (default: run until Ctrl+C)
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Seed for reproducible data
    #[arg(long)]
    pub seed: Option<u64>,

    /// Quality of Service level (0, 1, or 2)
    #[arg(long, short)]
    pub qos: Option<u8>,

    /// Draw independent uniform values instead of the random walk
    #[arg(long)]
    pub uniform: bool,

    /// Log payloads instead of connecting to a broker
    #[arg(long)]
    pub dry_run: bool,
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SimulatorConfig {
    pub broker: BrokerConfig,
    pub topics: TopicsConfig,
    pub schedule: ScheduleConfig,
    pub simulation: SimulationConfig,
    pub realism: RealismConfig,
    pub logging: LoggingConfig,
    /// set from --dry-run only
    #[serde(skip)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// force wss even when the port is not 443
    pub tls: bool,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_seconds: u64,
    /// how long to wait for the first CONNACK before publishing anyway
    pub connect_timeout_seconds: u64,
    pub qos: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TopicsConfig {
    pub gateway: String,
    pub endpoint: String,
    pub sensor: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_seconds: u64,
    pub message_gap_ms: u64,
    pub max_cycles: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    pub gateways: u32,
    pub endpoints: u32,
    pub sensors: u32,
    pub seed: Option<u64>,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity_min: i64,
    pub humidity_max: i64,
    pub battery_min: u8,
    pub battery_max: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RealismConfig {
    pub enabled: bool,
    pub temp_target: f64,
    pub humidity_target: f64,
    pub temp_step_std: f64,
    pub humidity_step_std: f64,
    pub temp_initial_std: f64,
    pub humidity_initial_std: f64,
    pub mean_reversion: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_payloads: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "mqtt.ispciot.org".to_string(),
            port: 80,
            path: "/mqtt".to_string(),
            tls: false,
            client_id: "mqtt_simulator_ws".to_string(),
            username: None,
            password: None,
            keep_alive_seconds: 60,
            connect_timeout_seconds: 2,
            qos: 1,
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            gateway: "gateway/gateway".to_string(),
            endpoint: "gateway/endpoint".to_string(),
            sensor: "gateway/sensor".to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_seconds: 30, message_gap_ms: 50, max_cycles: None }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let g = GeneratorSettings::default();
        Self {
            gateways: 3,
            endpoints: g.endpoints,
            sensors: g.sensors,
            seed: None,
            temp_min: g.temp_min,
            temp_max: g.temp_max,
            humidity_min: g.humidity_min,
            humidity_max: g.humidity_max,
            battery_min: g.battery_min,
            battery_max: g.battery_max,
        }
    }
}

impl Default for RealismConfig {
    fn default() -> Self {
        let g = GeneratorSettings::default();
        Self {
            enabled: g.realistic,
            temp_target: g.temp_target,
            humidity_target: g.humidity_target,
            temp_step_std: g.temp_step_std,
            humidity_step_std: g.humidity_step_std,
            temp_initial_std: g.temp_initial_std,
            humidity_initial_std: g.humidity_initial_std,
            mean_reversion: g.mean_reversion,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_payloads: false }
    }
}

impl SimulatorConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config {}", path.as_ref().display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the explicit file, else the first default location that exists,
    /// else built-in defaults. Returns the file actually used.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let paths = [
            PathBuf::from("config").join("simulator.toml"),
            PathBuf::from("..").join("config").join("simulator.toml"),
        ];

        for path in paths {
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Apply command line flags on top of the file values
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.broker.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.broker.port = port;
        }
        if let Some(path) = &cli.path {
            self.broker.path = path.clone();
        }
        // an empty --user means "no credentials"
        if let Some(user) = &cli.user {
            self.broker.username = Some(user.clone()).filter(|u| !u.is_empty());
        }
        if let Some(password) = &cli.password {
            self.broker.password = Some(password.clone());
        }
        if let Some(qos) = cli.qos {
            self.broker.qos = qos;
        }
        if let Some(interval) = cli.interval {
            self.schedule.interval_seconds = interval;
        }
        if cli.cycles.is_some() {
            self.schedule.max_cycles = cli.cycles;
        }
        if cli.seed.is_some() {
            self.simulation.seed = cli.seed;
        }
        if cli.uniform {
            self.realism.enabled = false;
        }
        self.dry_run |= cli.dry_run;
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker.host.trim().is_empty() {
            bail!("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            bail!("broker.port must be greater than 0");
        }
        if self.broker.qos > 2 {
            bail!("broker.qos must be 0, 1, or 2, got: {}", self.broker.qos);
        }
        if self.broker.keep_alive_seconds < 5 {
            bail!("broker.keep_alive_seconds must be at least 5, got: {}", self.broker.keep_alive_seconds);
        }
        if self.broker.client_id.is_empty() {
            bail!("broker.client_id must not be empty");
        }
        // rumqttc rejects these with a panic in MqttOptions::new
        if self.broker.client_id.starts_with(char::is_whitespace) {
            bail!("broker.client_id must not start with whitespace: {:?}", self.broker.client_id);
        }
        if self.schedule.interval_seconds == 0 {
            bail!("schedule.interval_seconds must be greater than 0");
        }
        for (name, count) in [
            ("gateways", self.simulation.gateways),
            ("endpoints", self.simulation.endpoints),
            ("sensors", self.simulation.sensors),
        ] {
            if !(1..=99).contains(&count) {
                bail!("simulation.{} must be between 1 and 99, got: {}", name, count);
            }
        }
        Ok(())
    }

    /// wss when forced or when talking to the standard https port
    pub fn use_tls(&self) -> bool {
        self.broker.tls || self.broker.port == 443
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            endpoints: self.simulation.endpoints,
            sensors: self.simulation.sensors,
            temp_min: self.simulation.temp_min,
            temp_max: self.simulation.temp_max,
            humidity_min: self.simulation.humidity_min,
            humidity_max: self.simulation.humidity_max,
            battery_min: self.simulation.battery_min,
            battery_max: self.simulation.battery_max,
            realistic: self.realism.enabled,
            temp_target: self.realism.temp_target,
            humidity_target: self.realism.humidity_target,
            temp_step_std: self.realism.temp_step_std,
            humidity_step_std: self.realism.humidity_step_std,
            temp_initial_std: self.realism.temp_initial_std,
            humidity_initial_std: self.realism.humidity_initial_std,
            mean_reversion: self.realism.mean_reversion,
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let scheme = if self.use_tls() { "wss" } else { "ws" };
        let cycles = self
            .schedule
            .max_cycles
            .map_or_else(|| "until Ctrl+C".to_string(), |n| n.to_string());
        println!("┌─────────────────────────────────────────┐");
        println!("│        SIMULATOR CONFIGURATION          │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Broker: {}://{}:{}{}", scheme, self.broker.host, self.broker.port, self.broker.path);
        println!("│ Client ID: {}", self.broker.client_id);
        println!("│ QoS: {}", self.broker.qos);
        println!("│ Interval: {}s", self.schedule.interval_seconds);
        println!("│ Cycles: {}", cycles);
        println!(
            "│ Layout: {} gateways x {} endpoints x {} sensors",
            self.simulation.gateways, self.simulation.endpoints, self.simulation.sensors
        );
        println!("│ Mode: {}", if self.realism.enabled { "random walk" } else { "uniform" });
        println!("│ Dry run: {}", self.dry_run);
        println!("└─────────────────────────────────────────┘");
    }
}
