use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod client;
pub mod frame;
pub mod lifecycle;
pub mod transport;

pub type DriverId = String;

/// Where the connection to the telemetry gateway currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Automatic retries are used up, only a manual reconnect gets out of here.
    Failed,
    TornDown,
}

impl Status {
    pub fn is_connected(self) -> bool {
        self == Status::Connected
    }
}

/// Server side timestamp. The gateway sends either epoch numbers or ISO strings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceTime {
    Epoch(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TelemetryData {
    pub driver_id: DriverId,
    pub speed_kph: Option<f64>,
    pub throttle_pct: Option<f64>,
    pub brake_pct: Option<f64>,
    pub gear: Option<i32>,
    pub lap: Option<u32>,
    pub sector: Option<u32>,
    /// Fraction of the lap completed, 0..1
    pub track_x: Option<f64>,
    pub distance_m: Option<f64>,
    pub ts: Option<SourceTime>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RadioMessage {
    pub team: String,
    #[serde(default)]
    pub driver_id: Option<DriverId>,
    pub text: String,
    pub ts: SourceTime,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TopAnomaly {
    pub feature: String,
    pub value: f64,
    pub baseline: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnomalyData {
    pub driver_id: DriverId,
    pub is_anomaly: bool,
    pub confidence: f64,
    #[serde(default)]
    pub top_anomaly: Option<TopAnomaly>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SummaryData {
    pub driver_id: DriverId,
    pub summary: String,
    pub confidence: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A payload together with the moment this client received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub data: T,
    pub received_at: Instant,
}

impl<T> Stamped<T> {
    pub fn new(data: T, received_at: Instant) -> Stamped<T> {
        Stamped { data, received_at }
    }
}

pub type TelemetrySample = Stamped<TelemetryData>;
pub type AnomalyRecord = Stamped<AnomalyData>;
pub type SummaryRecord = Stamped<SummaryData>;

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Status(Status),
    Telemetry(TelemetrySample),
    Radio(RadioMessage),
    Anomaly(AnomalyRecord),
    Summary(SummaryRecord),
}
