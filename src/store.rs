use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::feed::frame::Frame;
use crate::feed::{AnomalyRecord, DriverId, RadioMessage, Stamped, SummaryRecord, TelemetrySample, Update};

pub const RADIO_RETENTION: usize = 50;

/// Everything received from the gateway so far.
///
/// Keyed stores are last-write-wins: a new record for a driver replaces the
/// old one wholesale. The radio log is newest first and capped.
#[derive(Debug, Clone)]
pub struct LiveState {
    telemetry: HashMap<DriverId, TelemetrySample>,
    radio: VecDeque<RadioMessage>,
    anomalies: HashMap<DriverId, AnomalyRecord>,
    summaries: HashMap<DriverId, SummaryRecord>,
    radio_retention: usize,
}

impl Default for LiveState {
    fn default() -> Self {
        LiveState::new(RADIO_RETENTION)
    }
}

impl LiveState {
    pub fn new(radio_retention: usize) -> LiveState {
        LiveState {
            telemetry: HashMap::new(),
            radio: VecDeque::with_capacity(radio_retention),
            anomalies: HashMap::new(),
            summaries: HashMap::new(),
            radio_retention,
        }
    }

    /// Applies one decoded frame. Touches exactly one store.
    pub fn apply(&mut self, frame: Frame, received_at: Instant) -> Option<Update> {
        match frame {
            Frame::Telemetry(data) => {
                let sample = Stamped::new(data, received_at);
                self.telemetry.insert(sample.data.driver_id.clone(), sample.clone());
                Some(Update::Telemetry(sample))
            }
            Frame::Radio(message) => {
                self.radio.push_front(message.clone());
                self.radio.truncate(self.radio_retention);
                Some(Update::Radio(message))
            }
            Frame::Anomaly(data) => {
                let record = Stamped::new(data, received_at);
                self.anomalies.insert(record.data.driver_id.clone(), record.clone());
                Some(Update::Anomaly(record))
            }
            Frame::Summary(data) => {
                let record = Stamped::new(data, received_at);
                self.summaries.insert(record.data.driver_id.clone(), record.clone());
                Some(Update::Summary(record))
            }
            Frame::Unknown(_) => None,
        }
    }

    pub fn telemetry(&self, driver_id: &str) -> Option<&TelemetrySample> {
        self.telemetry.get(driver_id)
    }

    pub fn all_telemetry(&self) -> &HashMap<DriverId, TelemetrySample> {
        &self.telemetry
    }

    /// Newest first.
    pub fn radio(&self) -> &VecDeque<RadioMessage> {
        &self.radio
    }

    pub fn anomaly(&self, driver_id: &str) -> Option<&AnomalyRecord> {
        self.anomalies.get(driver_id)
    }

    pub fn anomalies(&self) -> &HashMap<DriverId, AnomalyRecord> {
        &self.anomalies
    }

    pub fn summary(&self, driver_id: &str) -> Option<&SummaryRecord> {
        self.summaries.get(driver_id)
    }

    pub fn summaries(&self) -> &HashMap<DriverId, SummaryRecord> {
        &self.summaries
    }

    /// Sorted ids of every driver we have telemetry for.
    pub fn drivers(&self) -> Vec<&str> {
        let mut drivers: Vec<&str> = self.telemetry.keys().map(String::as_str).collect();
        drivers.sort_unstable();
        drivers
    }

    pub fn is_empty(&self) -> bool {
        self.telemetry.is_empty() && self.radio.is_empty() && self.anomalies.is_empty() && self.summaries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    fn frame(text: &str) -> Frame {
        Frame::try_from(text).unwrap()
    }

    fn radio(text: &str, ts: u64) -> Frame {
        frame(&format!(r#"{{"type":"radio","data":{{"team":"T1","text":"{}","ts":{}}}}}"#, text, ts))
    }

    #[test]
    fn telemetry_is_last_write_wins_without_merge() {
        let mut state = LiveState::default();
        let now = Instant::now();

        state.apply(
            frame(r#"{"type":"telemetry","data":{"driver_id":"d1","speed_kph":200,"gear":7}}"#),
            now,
        );
        state.apply(frame(r#"{"type":"telemetry","data":{"driver_id":"d1","speed_kph":210}}"#), now);
        state.apply(frame(r#"{"type":"telemetry","data":{"driver_id":"d2","speed_kph":180}}"#), now);

        let d1 = state.telemetry("d1").unwrap();
        assert_eq!(d1.data.speed_kph, Some(210.0));
        // Replaced, not merged: the gear from the first sample is gone.
        assert_eq!(d1.data.gear, None);
        assert_eq!(state.telemetry("d2").unwrap().data.speed_kph, Some(180.0));
        assert_eq!(state.drivers(), vec!["d1", "d2"]);
    }

    #[test]
    fn telemetry_then_radio() {
        let mut state = LiveState::default();
        let now = Instant::now();

        state.apply(frame(r#"{"type":"telemetry","data":{"driver_id":"d1","speed_kph":200}}"#), now);
        state.apply(frame(r#"{"type":"telemetry","data":{"driver_id":"d1","speed_kph":210}}"#), now);
        state.apply(radio("box box box", 1000), now);

        assert_eq!(state.telemetry("d1").unwrap().data.speed_kph, Some(210.0));
        assert_eq!(state.radio().len(), 1);
        assert_eq!(state.radio()[0].text, "box box box");
    }

    #[test]
    fn radio_keeps_newest_fifty() {
        let mut state = LiveState::default();
        let now = Instant::now();

        for i in 0..120 {
            state.apply(radio(&format!("message {}", i), i), now);
            assert!(state.radio().len() <= RADIO_RETENTION);
        }

        let texts: Vec<&str> = state.radio().iter().map(|message| message.text.as_str()).collect();
        let expected: Vec<String> = (70..120).rev().map(|i| format!("message {}", i)).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn anomaly_and_summary_are_stamped_on_receipt() {
        let mut state = LiveState::default();
        let first = Instant::now();
        let later = first + std::time::Duration::from_secs(3);

        state.apply(
            frame(r#"{"type":"anomaly","data":{"driver_id":"d1","is_anomaly":true,"confidence":0.9}}"#),
            first,
        );
        state.apply(
            frame(r#"{"type":"anomaly","data":{"driver_id":"d1","is_anomaly":false,"confidence":0.2}}"#),
            later,
        );
        state.apply(
            frame(r#"{"type":"summary","data":{"driver_id":"d1","summary":"Pushing hard","confidence":0.9}}"#),
            first,
        );

        let anomaly = state.anomaly("d1").unwrap();
        assert!(!anomaly.data.is_anomaly);
        assert_eq!(anomaly.received_at, later);
        assert_eq!(state.summary("d1").unwrap().data.summary, "Pushing hard");
        assert_eq!(state.summary("d1").unwrap().received_at, first);
    }

    #[test]
    fn unknown_frames_leave_state_alone() {
        let mut state = LiveState::default();

        assert_eq!(state.apply(Frame::Unknown("subscribed".to_string()), Instant::now()), None);
        assert!(state.is_empty());
    }

    #[test]
    fn update_mirrors_stored_record() {
        let mut state = LiveState::default();
        let now = Instant::now();

        let update = state.apply(frame(r#"{"type":"telemetry","data":{"driver_id":"d9","lap":3}}"#), now);
        match update {
            Some(Update::Telemetry(sample)) => assert_eq!(&sample, state.telemetry("d9").unwrap()),
            other => panic!("unexpected update {:?}", other),
        }
    }
}
