use std::cmp::Ordering;

use crate::feed::TopAnomaly;
use crate::store::LiveState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreatLevel {
    Clear,
    Low,
    Elevated,
    Critical,
}

impl ThreatLevel {
    fn from_confidence(confidence: f64) -> ThreatLevel {
        if confidence > 0.7 {
            ThreatLevel::Critical
        } else if confidence > 0.4 {
            ThreatLevel::Elevated
        } else {
            ThreatLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreatAlert {
    pub driver_id: String,
    pub confidence: f64,
    pub detail: Option<TopAnomaly>,
}

/// Roll-up of every driver currently flagged as anomalous.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatBoard {
    /// Highest confidence first.
    pub alerts: Vec<ThreatAlert>,
    pub average_confidence: f64,
    pub level: ThreatLevel,
}

impl ThreatBoard {
    pub fn assess(state: &LiveState) -> ThreatBoard {
        let mut alerts: Vec<ThreatAlert> = state
            .anomalies()
            .values()
            .filter(|record| record.data.is_anomaly)
            .map(|record| ThreatAlert {
                driver_id: record.data.driver_id.clone(),
                confidence: record.data.confidence,
                detail: record.data.top_anomaly.clone(),
            })
            .collect();
        alerts.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });

        let total: f64 = alerts.iter().map(|alert| alert.confidence).sum();
        let average_confidence = total / alerts.len().max(1) as f64;
        let level = match alerts.first() {
            Some(top) => ThreatLevel::from_confidence(top.confidence),
            None => ThreatLevel::Clear,
        };

        ThreatBoard {
            alerts,
            average_confidence,
            level,
        }
    }

    pub fn active(&self) -> usize {
        self.alerts.len()
    }

    pub fn top(&self) -> Option<&ThreatAlert> {
        self.alerts.first()
    }
}
