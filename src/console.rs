use std::time::Duration;

use async_std::channel::Receiver;
use async_std::stream;
use futures::StreamExt;

use crate::config::Config;
use crate::feed::client::SyncClient;
use crate::feed::{Status, Update};
use crate::threat::{ThreatBoard, ThreatLevel};
use crate::trace::TelemetryTrace;
use crate::track::TrackLayout;

/// Anything that keeps derived state up to date from the update stream.
pub trait StateUpdater {
    fn update_state(&mut self, update: &Update);
}

enum Tick {
    Update(Update),
    Digest,
}

/// Logs what the gateway sends, plus a periodic digest of the live state.
pub struct Console {
    client: SyncClient,
    drivers: Vec<String>,
    digest_interval: Duration,
    trace: TelemetryTrace,
    track: TrackLayout,
    radio_seen: usize,
}

impl Console {
    pub fn new(config: &Config, client: SyncClient) -> Console {
        Console {
            client,
            drivers: config.drivers.clone(),
            digest_interval: config.digest_interval,
            trace: TelemetryTrace::new(config.trace_window),
            track: TrackLayout::synthetic(),
            radio_seen: 0,
        }
    }

    /// Runs until the client stops or gives up reconnecting.
    pub async fn run(mut self, updates: Receiver<Update>) {
        let digests = stream::interval(self.digest_interval).map(|()| Tick::Digest);
        let mut ticks = Box::pin(futures::stream::select(updates.map(Tick::Update), digests));

        while let Some(tick) = ticks.next().await {
            match tick {
                Tick::Update(update) => {
                    self.update_state(&update);
                    match update {
                        Update::Status(Status::Failed) | Update::Status(Status::TornDown) => break,
                        _ => {}
                    }
                }
                Tick::Digest => self.digest(),
            }
        }
    }

    fn digest(&self) {
        let (markers, board) = self
            .client
            .with_state(|state| (self.track.place(state), ThreatBoard::assess(state)));

        info![
            "{:?}: {} cars, {} radio messages, {} traced, threat {:?} ({} active, avg {:.0}%)",
            self.client.status(),
            markers.len(),
            self.radio_seen,
            self.trace.drivers(),
            board.level,
            board.active(),
            board.average_confidence * 100.0
        ];
        for marker in &markers {
            debug![
                "  {} sector {} at ({:.1}, {:.1}) {:.0} kph{}",
                marker.driver_id,
                marker.position.sector,
                marker.position.x,
                marker.position.y,
                marker.speed_kph,
                if marker.is_anomaly { " [anomaly]" } else { "" }
            ];
        }
        if let Some(top) = board.top().filter(|_| board.level >= ThreatLevel::Elevated) {
            warn!["Top threat: {} at {:.0}% confidence", top.driver_id, top.confidence * 100.0];
        }
    }
}

impl StateUpdater for Console {
    fn update_state(&mut self, update: &Update) {
        self.trace.update_state(update);

        match update {
            Update::Status(Status::Connected) => {
                info!["Connected"];
                for driver in &self.drivers {
                    self.client.subscribe_to_driver(driver);
                }
            }
            Update::Status(Status::Failed) => {
                error!["{}", self.client.error().unwrap_or_else(|| "Connection failed".to_string())]
            }
            Update::Status(status) => info!["Connection status: {:?}", status],
            Update::Radio(message) => {
                self.radio_seen += 1;
                info!["[radio] {}: {}", message.team, message.text];
            }
            Update::Anomaly(record) if record.data.is_anomaly => warn![
                "Anomaly for {} ({:.0}% confidence): {:?}",
                record.data.driver_id,
                record.data.confidence * 100.0,
                record.data.top_anomaly
            ],
            Update::Summary(record) => info!["[summary] {}: {}", record.data.driver_id, record.data.summary],
            _ => {}
        }
    }
}
