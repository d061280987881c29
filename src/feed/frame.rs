//! Wire format of the telemetry gateway.
//!
//! Inbound frames look like `{"type": "...", "data": {...}}`. They are
//! validated once, here, and turned into a [`Frame`]. Types this client does
//! not know about decode to [`Frame::Unknown`] so the gateway can grow new
//! message kinds without breaking older dashboards.

use std::convert::TryFrom;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::feed::{AnomalyData, DriverId, RadioMessage, SummaryData, TelemetryData};

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Telemetry(TelemetryData),
    Radio(RadioMessage),
    Anomaly(AnomalyData),
    Summary(SummaryData),
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotObject,
    #[error("frame has no `type` discriminator")]
    MissingType,
    #[error("{kind} frame has no `data` payload")]
    MissingData { kind: &'static str },
    #[error("{kind} frame has no string `driver_id`")]
    MissingDriverId { kind: &'static str },
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        source: serde_json::Error,
    },
    #[error("{kind} confidence {value} is outside 0..=1")]
    Confidence { kind: &'static str, value: f64 },
}

fn payload<T: DeserializeOwned>(kind: &'static str, data: Option<Value>, keyed: bool) -> Result<T, DecodeError> {
    let data = data.ok_or(DecodeError::MissingData { kind })?;
    if keyed && !matches!(data.get("driver_id"), Some(Value::String(_))) {
        return Err(DecodeError::MissingDriverId { kind });
    }

    serde_json::from_value(data).map_err(|source| DecodeError::Payload { kind, source })
}

fn check_confidence(kind: &'static str, value: f64) -> Result<(), DecodeError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DecodeError::Confidence { kind, value })
    }
}

impl TryFrom<&str> for Frame {
    type Error = DecodeError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        let mut envelope = match serde_json::from_str(text)? {
            Value::Object(envelope) => envelope,
            _ => return Err(DecodeError::NotObject),
        };
        let kind = match envelope.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(DecodeError::MissingType),
        };
        let data = envelope.remove("data");

        match kind.as_str() {
            "telemetry" => Ok(Frame::Telemetry(payload("telemetry", data, true)?)),
            "radio" => Ok(Frame::Radio(payload("radio", data, false)?)),
            "anomaly" => {
                let anomaly: AnomalyData = payload("anomaly", data, true)?;
                check_confidence("anomaly", anomaly.confidence)?;
                Ok(Frame::Anomaly(anomaly))
            }
            "summary" => {
                let summary: SummaryData = payload("summary", data, true)?;
                check_confidence("summary", summary.confidence)?;
                Ok(Frame::Summary(summary))
            }
            _ => Ok(Frame::Unknown(kind)),
        }
    }
}

/// Structured commands this client sends to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    SubscribeDriver { driver_id: DriverId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SourceTime;
    use serde_json::json;

    #[test]
    fn decodes_telemetry_and_keeps_extra_fields() {
        let text = r#"{"type":"telemetry","data":{"driver_id":"d1","speed_kph":200.5,"gear":7,"track_x":0.25,"ers_pct":41.0}}"#;

        match Frame::try_from(text).unwrap() {
            Frame::Telemetry(telemetry) => {
                assert_eq!(telemetry.driver_id, "d1");
                assert_eq!(telemetry.speed_kph, Some(200.5));
                assert_eq!(telemetry.gear, Some(7));
                assert_eq!(telemetry.track_x, Some(0.25));
                assert_eq!(telemetry.brake_pct, None);
                assert_eq!(telemetry.extra.get("ers_pct"), Some(&json!(41.0)));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn radio_accepts_numeric_and_text_timestamps() {
        let numeric = Frame::try_from(r#"{"type":"radio","data":{"team":"T1","text":"box box box","ts":1000}}"#).unwrap();
        let text = Frame::try_from(
            r#"{"type":"radio","data":{"team":"T1","driver_id":"d1","text":"stay out","ts":"2024-05-01T12:00:00"}}"#,
        )
        .unwrap();

        match (numeric, text) {
            (Frame::Radio(first), Frame::Radio(second)) => {
                assert_eq!(first.ts, SourceTime::Epoch(1000.0));
                assert_eq!(first.driver_id, None);
                assert_eq!(second.ts, SourceTime::Text("2024-05-01T12:00:00".to_string()));
                assert_eq!(second.driver_id.as_deref(), Some("d1"));
            }
            other => panic!("unexpected frames {:?}", other),
        }
    }

    #[test]
    fn radio_keeps_transcriber_fields() {
        let text = r#"{"type":"radio","data":{"team":"T1","text":"pit now","ts":12.5,"confidence":0.92,"source":"whisper"}}"#;

        match Frame::try_from(text).unwrap() {
            Frame::Radio(message) => {
                assert_eq!(message.text, "pit now");
                assert_eq!(message.extra.get("confidence"), Some(&json!(0.92)));
                assert_eq!(message.extra.get("source"), Some(&json!("whisper")));
                assert!(!message.extra.contains_key("team"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn decodes_anomaly_with_and_without_detail() {
        let flagged = r#"{"type":"anomaly","data":{"driver_id":"d2","is_anomaly":true,"confidence":0.8,
            "top_anomaly":{"feature":"brake_pct","value":0.95,"baseline":0.4,"score":4.0}}}"#;
        let quiet = r#"{"type":"anomaly","data":{"driver_id":"d2","is_anomaly":false,"confidence":0.1,"top_anomaly":null}}"#;

        match Frame::try_from(flagged).unwrap() {
            Frame::Anomaly(anomaly) => {
                let top = anomaly.top_anomaly.expect("top anomaly");
                assert_eq!(top.feature, "brake_pct");
                assert_eq!(top.score, 4.0);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        match Frame::try_from(quiet).unwrap() {
            Frame::Anomaly(anomaly) => assert!(anomaly.top_anomaly.is_none()),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn unknown_types_are_not_errors() {
        let frame = Frame::try_from(r#"{"type":"subscribed","driver_id":"d1"}"#).unwrap();
        assert_eq!(frame, Frame::Unknown("subscribed".to_string()));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(Frame::try_from("box box"), Err(DecodeError::Json(_))));
        assert!(matches!(Frame::try_from(r#"["telemetry", {}]"#), Err(DecodeError::NotObject)));
        assert!(matches!(Frame::try_from(r#"{"data":{}}"#), Err(DecodeError::MissingType)));
        assert!(matches!(Frame::try_from(r#"{"type":3,"data":{}}"#), Err(DecodeError::MissingType)));
        assert!(matches!(
            Frame::try_from(r#"{"type":"summary"}"#),
            Err(DecodeError::MissingData { kind: "summary" })
        ));
        assert!(matches!(
            Frame::try_from(r#"{"type":"telemetry","data":{"speed_kph":200}}"#),
            Err(DecodeError::MissingDriverId { kind: "telemetry" })
        ));
        assert!(matches!(
            Frame::try_from(r#"{"type":"anomaly","data":{"driver_id":7,"is_anomaly":true,"confidence":0.5}}"#),
            Err(DecodeError::MissingDriverId { kind: "anomaly" })
        ));
        assert!(matches!(
            Frame::try_from(r#"{"type":"radio","data":{"team":"T1","ts":1}}"#),
            Err(DecodeError::Payload { kind: "radio", .. })
        ));
        assert!(matches!(
            Frame::try_from(r#"{"type":"summary","data":{"driver_id":"d1","summary":"ok","confidence":1.5}}"#),
            Err(DecodeError::Confidence { kind: "summary", .. })
        ));
    }

    #[test]
    fn subscribe_command_wire_shape() {
        let command = Command::SubscribeDriver { driver_id: "d1".to_string() };
        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({"type": "subscribe_driver", "driver_id": "d1"})
        );
    }
}
