//! ==============================================================================
//! publisher.rs - mqtt over websocket publish loop
//! ==============================================================================
//!
//! purpose:
//!     connects to the broker over ws:// (or wss:// on port 443) and publishes
//!     one gateway, endpoint and sensor document per simulated gateway every
//!     cycle. fire-and-forget: a failed publish is logged and the cycle goes on.
//!
//! relationships:
//!     - uses: generator.rs (payloads), config.rs (broker, topics, schedule)
//!     - used by: main.rs
//!
//! architecture:
//!
//!     ┌──────────────┐  publish()   ┌───────────┐  requests  ┌────────────┐
//!     │ PublishLoop  │ ───────────> │ MqttSink  │ ─────────> │ event loop │ ──> broker
//!     │ (main task)  │              │ (client)  │            │  (spawned) │
//!     └──────────────┘              └───────────┘            └────────────┘
//!
//!     the loop only sees the TelemetrySink trait, so dry runs and tests swap
//!     the client for something that never touches the network.
//!
//! ==============================================================================

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport,
};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::{SimulatorConfig, TopicsConfig};
use crate::generator::{gateway_id, TelemetryGenerator};

/// capacity of the request channel between client and event loop
const REQUEST_CAPACITY: usize = 64;

// ==============================================================================
// sinks
// ==============================================================================

/// Destination for serialized telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
}

/// rumqttc client plus the task driving its event loop
pub struct MqttSink {
    client: AsyncClient,
    qos: QoS,
    driver: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TelemetrySink for MqttSink {
    /// Never waits: while the broker is unreachable the request queue fills
    /// up and further messages are dropped as failed publishes.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, self.qos, false, payload)
            .with_context(|| format!("publish to '{}' failed", topic))
    }

    async fn disconnect(&self) -> Result<()> {
        let requested = self.client.try_disconnect();

        if let Some(mut driver) = self.driver.lock().await.take() {
            if requested.is_err() {
                // DISCONNECT is stuck behind a full queue, nothing left to flush
                driver.abort();
            } else if tokio::time::timeout(Duration::from_secs(1), &mut driver).await.is_err() {
                debug!("event loop did not stop after disconnect");
                driver.abort();
            }
        }

        requested.context("disconnect request failed")
    }
}

/// Logs every message instead of sending it.
pub struct DryRunSink;

#[async_trait]
impl TelemetrySink for DryRunSink {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        info!(topic, payload = %String::from_utf8_lossy(&payload), "[DRY RUN] publish");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

// ==============================================================================
// connection
// ==============================================================================

pub fn parse_qos(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        _ => bail!("QoS must be 0, 1, or 2, got: {}", level),
    }
}

/// websocket url as rumqttc expects it in place of the host
pub fn broker_url(host: &str, port: u16, path: &str, tls: bool) -> String {
    let scheme = if tls { "wss" } else { "ws" };
    if path.starts_with('/') {
        format!("{}://{}:{}{}", scheme, host, port, path)
    } else {
        format!("{}://{}:{}/{}", scheme, host, port, path)
    }
}

pub fn mqtt_options(config: &SimulatorConfig) -> MqttOptions {
    let broker = &config.broker;
    let tls = config.use_tls();
    let url = broker_url(&broker.host, broker.port, &broker.path, tls);

    let mut options = MqttOptions::new(broker.client_id.clone(), url, broker.port);
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_seconds));
    options.set_clean_session(true);
    if let Some(user) = &broker.username {
        options.set_credentials(user.clone(), broker.password.clone().unwrap_or_default());
    }
    if tls {
        options.set_transport(Transport::wss_with_default_config());
    } else {
        options.set_transport(Transport::Ws);
    }
    options
}

/// Build the client and spawn its event loop.
///
/// The returned watch flips to `true` on the first accepted CONNACK.
pub fn connect(config: &SimulatorConfig) -> Result<(MqttSink, watch::Receiver<bool>)> {
    let qos = parse_qos(config.broker.qos)?;
    let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
    let (connected_tx, connected_rx) = watch::channel(false);

    let driver = tokio::spawn(drive(eventloop, connected_tx));

    Ok((MqttSink { client, qos, driver: Mutex::new(Some(driver)) }, connected_rx))
}

async fn drive(mut eventloop: EventLoop, connected: watch::Sender<bool>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("✓ Connected to MQTT broker (WS)");
                    connected.send_replace(true);
                } else {
                    error!(code = ?ack.code, "Broker refused the connection");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent, stopping event loop");
                break;
            }
            Ok(event) => trace!(?event, "mqtt event"),
            Err(e) => {
                connected.send_replace(false);
                warn!("MQTT connection error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Wait for the first CONNACK. Publishing goes ahead either way.
pub async fn wait_connected(connected: &mut watch::Receiver<bool>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, connected.wait_for(|up| *up)).await {
        Ok(Ok(_)) => true,
        _ => {
            warn!("No CONNACK within {:?}, publishing anyway", timeout);
            false
        }
    }
}

// ==============================================================================
// publish loop
// ==============================================================================

#[derive(Debug, Clone)]
pub struct Schedule {
    /// pause between cycles
    pub interval: Duration,
    /// pause after every single message
    pub message_gap: Duration,
    /// stop after this many cycles
    pub max_cycles: Option<u64>,
}

impl Schedule {
    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.schedule.interval_seconds),
            message_gap: Duration::from_millis(config.schedule.message_gap_ms),
            max_cycles: config.schedule.max_cycles,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub published: u64,
    pub failed: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub published: u64,
    pub failed: u64,
    pub interrupted: bool,
}

pub struct PublishLoop<R, S> {
    generator: TelemetryGenerator<R>,
    sink: S,
    topics: TopicsConfig,
    schedule: Schedule,
    gateways: u32,
    show_payloads: bool,
}

impl<R: Rng, S: TelemetrySink> PublishLoop<R, S> {
    pub fn new(
        generator: TelemetryGenerator<R>,
        sink: S,
        topics: TopicsConfig,
        schedule: Schedule,
        gateways: u32,
    ) -> Self {
        Self { generator, sink, topics, schedule, gateways, show_payloads: false }
    }

    /// echo payloads at info instead of debug
    pub fn show_payloads(mut self, show: bool) -> Self {
        self.show_payloads = show;
        self
    }

    /// Publish gateway, endpoint and sensor documents for every gateway.
    pub async fn run_cycle(&mut self) -> CycleStats {
        let mut stats = CycleStats::default();
        let endpoints = self.generator.settings().endpoints;
        let sensors = self.generator.settings().sensors;

        for g in 1..=self.gateways {
            let id = gateway_id(g);

            let gateway = self.generator.gateway(&id);
            self.send(&self.topics.gateway, &gateway, &mut stats).await;
            tokio::time::sleep(self.schedule.message_gap).await;

            let endpoint = self.generator.endpoints(&id, endpoints);
            self.send(&self.topics.endpoint, &endpoint, &mut stats).await;
            tokio::time::sleep(self.schedule.message_gap).await;

            let sensor = self.generator.sensors(&id, endpoints, sensors);
            self.send(&self.topics.sensor, &sensor, &mut stats).await;
            tokio::time::sleep(self.schedule.message_gap).await;
        }

        debug!(tracked_sensors = self.generator.tracked_sensors(), "cycle done");
        stats
    }

    async fn send<T: Serialize>(&self, topic: &str, payload: &T, stats: &mut CycleStats) {
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(topic, "Failed to serialize payload: {}", e);
                stats.failed += 1;
                return;
            }
        };

        if self.show_payloads {
            info!(topic, payload = %String::from_utf8_lossy(&bytes), "publish");
        } else {
            debug!(topic, payload = %String::from_utf8_lossy(&bytes), "publish");
        }

        match self.sink.publish(topic, bytes).await {
            Ok(()) => stats.published += 1,
            Err(e) => {
                warn!("⚠ {:#}", e);
                stats.failed += 1;
            }
        }
    }

    /// Run cycles until the cycle limit or until `shutdown` resolves,
    /// then disconnect the sink.
    pub async fn run<F: Future<Output = ()>>(mut self, shutdown: F) -> RunSummary {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();
        let mut cycle = 1u64;

        loop {
            info!(cycle, time = %chrono::Local::now().format("%H:%M:%S"), "⏱ Starting cycle");

            let stats = tokio::select! {
                stats = self.run_cycle() => stats,
                _ = &mut shutdown => {
                    info!("⛔ Interrupted by user");
                    summary.interrupted = true;
                    break;
                }
            };
            summary.cycles = cycle;
            summary.published += stats.published;
            summary.failed += stats.failed;

            if self.schedule.max_cycles.is_some_and(|max| cycle >= max) {
                info!(published = stats.published, failed = stats.failed, "✓ Cycle {} complete, cycle limit reached", cycle);
                break;
            }
            info!(
                published = stats.published,
                failed = stats.failed,
                "✓ Cycle {} complete, waiting {}s",
                cycle,
                self.schedule.interval.as_secs()
            );

            tokio::select! {
                _ = tokio::time::sleep(self.schedule.interval) => {}
                _ = &mut shutdown => {
                    info!("⛔ Interrupted by user");
                    summary.interrupted = true;
                    break;
                }
            }
            cycle += 1;
        }

        if let Err(e) = self.sink.disconnect().await {
            debug!("disconnect failed: {:#}", e);
        }
        summary
    }
}
