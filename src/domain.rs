//! ==============================================================================
//! domain.rs - telemetry payloads
//! ==============================================================================
//!
//! purpose:
//!     the json documents published on the three gateway topics.
//!     rust field names are english, wire keys are the ones the iot
//!     application already consumes (hence the serde renames).
//!
//! relationships:
//!     - built by: generator.rs
//!     - serialized by: publisher.rs
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};

/// gateway heartbeat, published on `gateway/gateway`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct GatewayStatus {
    /// gateway identifier (e.g., "G01")
    #[serde(rename = "id_gateway")]
    pub gateway_id: String,

    /// coarse wifi quality descriptor ("excelente", "buena", "regular", "débil")
    pub wifi_signal: String,

    /// lora radio health ("ok" or "warning")
    pub lora_status: String,

    /// uptime formatted as HH:MM:SS
    pub uptime: String,
}

/// battery state of every endpoint behind one gateway, published on `gateway/endpoint`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct EndpointReport {
    #[serde(rename = "id_gateway")]
    pub gateway_id: String,
    pub endpoints: Vec<EndpointStatus>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct EndpointStatus {
    /// endpoint identifier (e.g., "E01")
    pub id: String,

    /// battery charge in percent
    #[serde(rename = "bateria")]
    pub battery: u8,

    /// true while the battery is below the full-charge threshold
    #[serde(rename = "cargando")]
    pub charging: bool,

    /// lora link state as seen by the endpoint
    pub lora: String,

    /// number of sensors attached to the endpoint
    #[serde(rename = "sensores")]
    pub sensor_count: u32,
}

/// sensor readings of every endpoint behind one gateway, published on `gateway/sensor`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SensorReport {
    #[serde(rename = "id_gateway")]
    pub gateway_id: String,
    pub endpoints: Vec<EndpointSensors>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct EndpointSensors {
    #[serde(rename = "id_endpoint")]
    pub endpoint_id: String,
    #[serde(rename = "sensores")]
    pub sensors: Vec<SensorReading>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SensorReading {
    /// sensor identifier (e.g., "0F01")
    pub id: String,

    /// 1-based slot on the endpoint
    #[serde(rename = "posicion")]
    pub position: u32,

    /// temperature in celsius, one decimal
    pub temp: f64,

    /// relative humidity in percent
    #[serde(rename = "humedad")]
    pub humidity: i64,

    #[serde(rename = "estado")]
    pub state: SensorState,
}

/// status band derived from a reading
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    Ok,
    TempCriticalLow,
    TempCriticalHigh,
    TempOutOfRange,
    HumidityOutOfRange,
}

impl SensorState {
    /// classify rounded values, first matching band wins
    pub fn classify(temp: f64, humidity: i64) -> Self {
        if temp < 10.0 {
            SensorState::TempCriticalLow
        } else if temp > 30.0 {
            SensorState::TempCriticalHigh
        } else if temp < 18.0 || temp > 28.0 {
            SensorState::TempOutOfRange
        } else if !(25..=65).contains(&humidity) {
            SensorState::HumidityOutOfRange
        } else {
            SensorState::Ok
        }
    }
}
