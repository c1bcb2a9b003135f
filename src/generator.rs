//! ==============================================================================
//! generator.rs - fake gateway / endpoint / sensor telemetry
//! ==============================================================================
//!
//! purpose:
//!     fabricates plausible telemetry for a fleet of lora gateways.
//!     sensor values follow a bounded random walk that keeps drifting back
//!     toward a target, so consecutive cycles look like a real room instead
//!     of white noise.
//!
//! random walk (per gateway/endpoint/sensor triple):
//!
//!     next = clamp(prev + N(0, step_std) + k * (target - prev), min, max)
//!
//!     the first value of a triple is drawn around the target, after that the
//!     unrounded value is remembered for the next cycle.
//!
//! relationships:
//!     - produces: domain.rs payloads
//!     - used by: publisher.rs (once per gateway per cycle), main.rs (examples)
//!
//! ==============================================================================

use anyhow::{anyhow, bail, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;

use crate::domain::{
    EndpointReport, EndpointSensors, EndpointStatus, GatewayStatus, SensorReading, SensorReport,
    SensorState,
};

const WIFI_SIGNALS: [&str; 4] = ["excelente", "buena", "regular", "débil"];
// three out of four gateways report a healthy radio
const LORA_STATUSES: [&str; 4] = ["ok", "ok", "ok", "warning"];
/// endpoints at or above this charge level stop charging
const FULL_CHARGE: u8 = 95;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    /// endpoints per gateway
    pub endpoints: u32,
    /// sensors per endpoint
    pub sensors: u32,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity_min: i64,
    pub humidity_max: i64,
    pub battery_min: u8,
    pub battery_max: u8,
    /// random walk when true, independent uniform draws when false
    pub realistic: bool,
    pub temp_target: f64,
    pub humidity_target: f64,
    pub temp_step_std: f64,
    pub humidity_step_std: f64,
    pub temp_initial_std: f64,
    pub humidity_initial_std: f64,
    /// fraction of the distance to the target recovered each step
    pub mean_reversion: f64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            endpoints: 3,
            sensors: 4,
            temp_min: 15.0,
            temp_max: 30.0,
            humidity_min: 40,
            humidity_max: 65,
            battery_min: 50,
            battery_max: 100,
            realistic: true,
            temp_target: 24.0,
            humidity_target: 55.0,
            temp_step_std: 0.5,
            humidity_step_std: 2.0,
            temp_initial_std: 1.0,
            humidity_initial_std: 3.0,
            mean_reversion: 0.12,
        }
    }
}

impl GeneratorSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("temp_min", self.temp_min),
            ("temp_max", self.temp_max),
            ("temp_target", self.temp_target),
            ("humidity_target", self.humidity_target),
            ("temp_step_std", self.temp_step_std),
            ("humidity_step_std", self.humidity_step_std),
            ("temp_initial_std", self.temp_initial_std),
            ("humidity_initial_std", self.humidity_initial_std),
        ] {
            if !value.is_finite() {
                bail!("{} must be a finite number, got {}", name, value);
            }
        }
        if !(self.temp_min <= self.temp_max) {
            bail!("temperature bounds are inverted: {} > {}", self.temp_min, self.temp_max);
        }
        // gen_range overflows when the span itself is not representable
        if !(self.temp_max - self.temp_min).is_finite() {
            bail!("temperature range {}..={} is too wide", self.temp_min, self.temp_max);
        }
        if self.temp_span().is_none() {
            bail!(
                "temperature bounds {}..={} contain no value with one decimal",
                self.temp_min,
                self.temp_max
            );
        }
        if self.humidity_min > self.humidity_max {
            bail!("humidity bounds are inverted: {} > {}", self.humidity_min, self.humidity_max);
        }
        if self.battery_min > self.battery_max || self.battery_max > 100 {
            bail!("battery bounds must satisfy min <= max <= 100, got {}..={}", self.battery_min, self.battery_max);
        }
        if !(0.0..=1.0).contains(&self.mean_reversion) {
            bail!("mean_reversion must be within 0.0..=1.0, got {}", self.mean_reversion);
        }
        Ok(())
    }

    /// temperature bounds pulled inward onto the 0.1 grid
    fn temp_span(&self) -> Option<(f64, f64)> {
        let lo = (self.temp_min * 10.0 - 1e-9).ceil() / 10.0;
        let hi = (self.temp_max * 10.0 + 1e-9).floor() / 10.0;
        (lo <= hi).then_some((lo, hi))
    }
}

/// identity of one physical sensor across cycles
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SensorKey {
    gateway: String,
    endpoint: String,
    sensor: String,
}

/// last unrounded values of a sensor
#[derive(Debug, Clone, Copy)]
struct SensorMemory {
    temp: f64,
    humidity: f64,
}

pub struct TelemetryGenerator<R> {
    settings: GeneratorSettings,
    rng: R,
    temp_step: Normal<f64>,
    humidity_step: Normal<f64>,
    temp_initial: Normal<f64>,
    humidity_initial: Normal<f64>,
    memory: HashMap<SensorKey, SensorMemory>,
}

impl<R: Rng> TelemetryGenerator<R> {
    pub fn new(settings: GeneratorSettings, rng: R) -> Result<Self> {
        settings.validate()?;

        let normal = |mean: f64, std: f64, what: &str| {
            Normal::new(mean, std).map_err(|e| anyhow!("invalid {} deviation {}: {}", what, std, e))
        };

        Ok(Self {
            temp_step: normal(0.0, settings.temp_step_std, "temperature step")?,
            humidity_step: normal(0.0, settings.humidity_step_std, "humidity step")?,
            temp_initial: normal(settings.temp_target, settings.temp_initial_std, "temperature initial")?,
            humidity_initial: normal(settings.humidity_target, settings.humidity_initial_std, "humidity initial")?,
            settings,
            rng,
            memory: HashMap::new(),
        })
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// number of sensors with remembered values
    pub fn tracked_sensors(&self) -> usize {
        self.memory.len()
    }

    /// random uptime as HH:MM:SS
    pub fn uptime(&mut self) -> String {
        let hours = self.rng.gen_range(0..=23);
        let minutes = self.rng.gen_range(0..=59);
        let seconds = self.rng.gen_range(0..=59);
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }

    pub fn gateway(&mut self, gateway_id: &str) -> GatewayStatus {
        let wifi = WIFI_SIGNALS[self.rng.gen_range(0..WIFI_SIGNALS.len())];
        let lora = LORA_STATUSES[self.rng.gen_range(0..LORA_STATUSES.len())];
        GatewayStatus {
            gateway_id: gateway_id.to_string(),
            wifi_signal: wifi.to_string(),
            lora_status: lora.to_string(),
            uptime: self.uptime(),
        }
    }

    pub fn endpoints(&mut self, gateway_id: &str, count: u32) -> EndpointReport {
        let endpoints = (1..=count)
            .map(|i| {
                let battery = self.rng.gen_range(self.settings.battery_min..=self.settings.battery_max);
                EndpointStatus {
                    id: endpoint_id(i),
                    battery,
                    charging: battery < FULL_CHARGE,
                    lora: "ok".to_string(),
                    sensor_count: self.settings.sensors,
                }
            })
            .collect();

        EndpointReport { gateway_id: gateway_id.to_string(), endpoints }
    }

    pub fn sensors(&mut self, gateway_id: &str, endpoints: u32, sensors: u32) -> SensorReport {
        let mut report = SensorReport { gateway_id: gateway_id.to_string(), endpoints: Vec::new() };

        for e in 1..=endpoints {
            let endpoint = endpoint_id(e);
            let mut readings = Vec::with_capacity(sensors as usize);

            for s in 1..=sensors {
                let sensor = sensor_id(s);
                let (temp, humidity) = if self.settings.realistic {
                    self.walk(gateway_id, &endpoint, &sensor)
                } else {
                    self.uniform()
                };
                readings.push(SensorReading {
                    id: sensor,
                    position: s,
                    temp,
                    humidity,
                    state: SensorState::classify(temp, humidity),
                });
            }

            report.endpoints.push(EndpointSensors { endpoint_id: endpoint, sensors: readings });
        }

        report
    }

    /// advance the remembered walk of one sensor and return rounded values
    fn walk(&mut self, gateway: &str, endpoint: &str, sensor: &str) -> (f64, i64) {
        let key = SensorKey {
            gateway: gateway.to_string(),
            endpoint: endpoint.to_string(),
            sensor: sensor.to_string(),
        };
        let s = &self.settings;
        let (h_min, h_max) = (s.humidity_min as f64, s.humidity_max as f64);

        let prev = match self.memory.get(&key) {
            Some(prev) => *prev,
            None => SensorMemory {
                temp: self.temp_initial.sample(&mut self.rng).clamp(s.temp_min, s.temp_max),
                humidity: self.humidity_initial.sample(&mut self.rng).clamp(h_min, h_max),
            },
        };

        let temp = revert(
            prev.temp,
            s.temp_target,
            self.temp_step.sample(&mut self.rng),
            s.mean_reversion,
        )
        .clamp(s.temp_min, s.temp_max);
        let humidity = revert(
            prev.humidity,
            s.humidity_target,
            self.humidity_step.sample(&mut self.rng),
            s.mean_reversion,
        )
        .clamp(h_min, h_max);

        self.memory.insert(key, SensorMemory { temp, humidity });
        (self.publishable_temp(temp), humidity.round() as i64)
    }

    fn uniform(&mut self) -> (f64, i64) {
        let s = &self.settings;
        let temp = self.rng.gen_range(s.temp_min..=s.temp_max);
        let humidity = self.rng.gen_range(s.humidity_min..=s.humidity_max);
        (self.publishable_temp(temp), humidity)
    }

    /// round to one decimal without leaving the configured bounds
    fn publishable_temp(&self, temp: f64) -> f64 {
        let rounded = round1(temp);
        match self.settings.temp_span() {
            Some((lo, hi)) => rounded.clamp(lo, hi),
            None => rounded,
        }
    }
}

/// one mean-reverting step before clamping
fn revert(prev: f64, target: f64, noise: f64, k: f64) -> f64 {
    prev + noise + k * (target - prev)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn gateway_id(index: u32) -> String {
    format!("G{:02}", index)
}

pub fn endpoint_id(index: u32) -> String {
    format!("E{:02}", index)
}

pub fn sensor_id(index: u32) -> String {
    format!("0F{:02}", index)
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn generator(settings: GeneratorSettings, seed: u64) -> TelemetryGenerator<StdRng> {
        TelemetryGenerator::new(settings, StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_ids() {
        assert_eq!(gateway_id(1), "G01");
        assert_eq!(endpoint_id(12), "E12");
        assert_eq!(sensor_id(4), "0F04");
    }

    #[test]
    fn test_uptime_format() {
        let mut g = generator(GeneratorSettings::default(), 1);
        for _ in 0..200 {
            let uptime = g.uptime();
            let parts: Vec<u32> = uptime.split(':').map(|p| p.parse().unwrap()).collect();
            assert_eq!(uptime.len(), 8);
            assert_eq!(parts.len(), 3);
            assert!(parts[0] <= 23 && parts[1] <= 59 && parts[2] <= 59, "{}", uptime);
        }
    }

    #[test]
    fn test_gateway_fields() {
        let mut g = generator(GeneratorSettings::default(), 2);
        let status = g.gateway("G02");
        assert_eq!(status.gateway_id, "G02");
        assert!(WIFI_SIGNALS.contains(&status.wifi_signal.as_str()));
        assert!(status.lora_status == "ok" || status.lora_status == "warning");
    }

    #[test]
    fn test_endpoints_battery_and_charging() {
        let mut g = generator(GeneratorSettings::default(), 3);
        for _ in 0..50 {
            let report = g.endpoints("G01", 3);
            assert_eq!(report.endpoints.len(), 3);
            assert_eq!(report.endpoints[2].id, "E03");
            for e in &report.endpoints {
                assert!((50..=100).contains(&e.battery));
                assert_eq!(e.charging, e.battery < 95);
                assert_eq!(e.lora, "ok");
                assert_eq!(e.sensor_count, 4);
            }
        }
    }

    #[test]
    fn test_realistic_stays_in_bounds() {
        let mut g = generator(GeneratorSettings::default(), 4);
        for _ in 0..500 {
            let report = g.sensors("G01", 3, 4);
            for reading in report.endpoints.iter().flat_map(|e| &e.sensors) {
                assert!((15.0..=30.0).contains(&reading.temp), "{}", reading.temp);
                assert!((40..=65).contains(&reading.humidity), "{}", reading.humidity);
                assert_eq!(reading.state, SensorState::classify(reading.temp, reading.humidity));
            }
        }
    }

    #[test]
    fn test_uniform_stays_in_bounds_and_keeps_no_state() {
        let settings = GeneratorSettings { realistic: false, ..Default::default() };
        let mut g = generator(settings, 5);
        for _ in 0..500 {
            let report = g.sensors("G01", 2, 2);
            for reading in report.endpoints.iter().flat_map(|e| &e.sensors) {
                assert!((15.0..=30.0).contains(&reading.temp));
                assert!((40..=65).contains(&reading.humidity));
            }
        }
        assert_eq!(g.tracked_sensors(), 0);
    }

    #[test]
    fn test_state_grows_per_triple() {
        let mut g = generator(GeneratorSettings::default(), 6);
        g.sensors("G01", 3, 4);
        assert_eq!(g.tracked_sensors(), 12);
        g.sensors("G01", 3, 4);
        assert_eq!(g.tracked_sensors(), 12);
        g.sensors("G02", 2, 4);
        assert_eq!(g.tracked_sensors(), 20);
    }

    #[test]
    fn test_sensor_layout() {
        let mut g = generator(GeneratorSettings::default(), 7);
        let report = g.sensors("G03", 2, 4);
        assert_eq!(report.gateway_id, "G03");
        assert_eq!(report.endpoints.len(), 2);
        assert_eq!(report.endpoints[1].endpoint_id, "E02");
        let positions: Vec<u32> = report.endpoints[0].sensors.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
        assert_eq!(report.endpoints[0].sensors[3].id, "0F04");
    }

    #[test]
    fn test_mean_reversion_pulls_toward_target() {
        let settings = GeneratorSettings {
            temp_step_std: 0.0,
            humidity_step_std: 0.0,
            ..Default::default()
        };
        let mut g = generator(settings, 8);
        g.memory.insert(
            SensorKey { gateway: "G01".into(), endpoint: "E01".into(), sensor: "0F01".into() },
            SensorMemory { temp: 15.0, humidity: 40.0 },
        );

        let report = g.sensors("G01", 1, 1);
        let reading = &report.endpoints[0].sensors[0];
        // 15 + 0.12 * (24 - 15) = 16.08, 40 + 0.12 * (55 - 40) = 41.8
        assert_eq!(reading.temp, 16.1);
        assert_eq!(reading.humidity, 42);
        assert_eq!(reading.state, SensorState::TempOutOfRange);

        let mut last = 15.0;
        for _ in 0..40 {
            let t = g.sensors("G01", 1, 1).endpoints[0].sensors[0].temp;
            assert!(t >= last);
            last = t;
        }
        assert!((last - 24.0).abs() < 0.2, "{}", last);
    }

    #[test]
    fn test_zero_noise_sits_on_target() {
        let settings = GeneratorSettings {
            temp_step_std: 0.0,
            humidity_step_std: 0.0,
            temp_initial_std: 0.0,
            humidity_initial_std: 0.0,
            ..Default::default()
        };
        let mut g = generator(settings, 9);
        for _ in 0..10 {
            let reading = g.sensors("G01", 1, 1).endpoints[0].sensors[0].clone();
            assert_eq!(reading.temp, 24.0);
            assert_eq!(reading.humidity, 55);
            assert_eq!(reading.state, SensorState::Ok);
        }
    }

    #[test]
    fn test_seeded_runs_match() {
        let mut a = generator(GeneratorSettings::default(), 42);
        let mut b = generator(GeneratorSettings::default(), 42);
        for _ in 0..5 {
            assert_eq!(a.gateway("G01"), b.gateway("G01"));
            assert_eq!(a.endpoints("G01", 3), b.endpoints("G01", 3));
            assert_eq!(a.sensors("G01", 3, 4), b.sensors("G01", 3, 4));
        }
    }

    #[test]
    fn test_rounding_respects_off_grid_bounds() {
        // targets outside the bounds pin the walk to the edges
        for (target, realistic) in [(35.0, true), (5.0, true), (24.0, false)] {
            let settings = GeneratorSettings {
                temp_min: 15.04,
                temp_max: 29.96,
                temp_target: target,
                realistic,
                ..Default::default()
            };
            let mut g = generator(settings, 11);
            for _ in 0..300 {
                for reading in g.sensors("G01", 2, 2).endpoints.iter().flat_map(|e| &e.sensors) {
                    assert!(
                        (15.04..=29.96).contains(&reading.temp),
                        "{} escaped bounds (target {}, realistic {})",
                        reading.temp,
                        target,
                        realistic
                    );
                }
            }
        }
    }

    #[test]
    fn test_walk_pinned_to_max_reports_inner_grid_value() {
        let settings = GeneratorSettings {
            temp_max: 29.96,
            temp_target: 40.0,
            temp_step_std: 0.0,
            ..Default::default()
        };
        let mut g = generator(settings, 12);
        g.memory.insert(
            SensorKey { gateway: "G01".into(), endpoint: "E01".into(), sensor: "0F01".into() },
            SensorMemory { temp: 29.96, humidity: 55.0 },
        );
        assert_eq!(g.sensors("G01", 1, 1).endpoints[0].sensors[0].temp, 29.9);
    }

    #[test]
    fn test_invalid_settings() {
        let bad = [
            GeneratorSettings { temp_min: 31.0, ..Default::default() },
            GeneratorSettings { humidity_max: 10, ..Default::default() },
            GeneratorSettings { battery_max: 101, ..Default::default() },
            GeneratorSettings { mean_reversion: 1.5, ..Default::default() },
            GeneratorSettings { temp_step_std: -1.0, ..Default::default() },
            GeneratorSettings { realistic: false, temp_min: -1e308, temp_max: 1e308, ..Default::default() },
            GeneratorSettings { temp_max: f64::INFINITY, ..Default::default() },
            GeneratorSettings { temp_target: f64::NAN, ..Default::default() },
            GeneratorSettings { humidity_step_std: f64::INFINITY, ..Default::default() },
            GeneratorSettings { temp_min: 15.01, temp_max: 15.09, ..Default::default() },
        ];
        for settings in bad {
            assert!(
                TelemetryGenerator::new(settings.clone(), StdRng::seed_from_u64(0)).is_err(),
                "{:?}",
                settings
            );
        }
    }
}
