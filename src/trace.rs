use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::console::StateUpdater;
use crate::feed::{TelemetrySample, Update};

#[derive(Debug, Clone, PartialEq)]
pub struct TracePoint {
    pub time: Instant,
    pub throttle: f64,
    pub brake: f64,
    pub speed_kph: f64,
}

/// Rolling per driver history of pedal and speed traces.
pub struct TelemetryTrace {
    window: Duration,
    traces: HashMap<String, VecDeque<TracePoint>>,
}

impl TelemetryTrace {
    pub fn new(window: Duration) -> TelemetryTrace {
        TelemetryTrace {
            window,
            traces: HashMap::new(),
        }
    }

    pub fn points(&self, driver_id: &str) -> Option<&VecDeque<TracePoint>> {
        self.traces.get(driver_id)
    }

    pub fn drivers(&self) -> usize {
        self.traces.len()
    }

    pub fn record(&mut self, sample: &TelemetrySample) {
        self.evict(sample.received_at);

        let data = &sample.data;
        self.traces
            .entry(data.driver_id.clone())
            .or_insert_with(VecDeque::new)
            .push_back(TracePoint {
                time: sample.received_at,
                throttle: data.throttle_pct.unwrap_or(0.0),
                brake: data.brake_pct.unwrap_or(0.0),
                speed_kph: data.speed_kph.unwrap_or(0.0),
            });
    }

    /// Drops points older than the window, and drivers left without any.
    pub fn evict(&mut self, now: Instant) {
        let window = self.window;
        for points in self.traces.values_mut() {
            while let Some(point) = points.front() {
                if now.saturating_duration_since(point.time) < window {
                    break;
                }
                points.pop_front();
            }
        }
        self.traces.retain(|_, points| !points.is_empty());
    }
}

impl StateUpdater for TelemetryTrace {
    fn update_state(&mut self, update: &Update) {
        match update {
            Update::Telemetry(sample) => self.record(sample),
            _ => self.evict(Instant::now()),
        }
    }
}
