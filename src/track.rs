//! Where every car sits on a synthetic three sector circuit.

use std::f64::consts::PI;

use crate::store::LiveState;

pub const SECTORS: u32 = 3;
pub const POINTS_PER_SECTOR: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub sector: u32,
    pub x: f64,
    pub y: f64,
    /// Progress within the sector, 0..=1
    pub progress: f64,
    /// Degrees
    pub angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarPosition {
    pub x: f64,
    pub y: f64,
    /// Radians, pointing at the next track point
    pub heading: f64,
    pub sector: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarMarker {
    pub driver_id: String,
    pub position: CarPosition,
    pub speed_kph: f64,
    pub is_anomaly: bool,
}

#[derive(Debug, Clone)]
pub struct TrackLayout {
    points: Vec<TrackPoint>,
}

impl TrackLayout {
    /// Every sector spans 120 degrees and bulges outwards in its middle.
    pub fn synthetic() -> TrackLayout {
        let mut points = Vec::with_capacity((SECTORS * POINTS_PER_SECTOR) as usize);
        for sector in 1..=SECTORS {
            for i in 0..POINTS_PER_SECTOR {
                let progress = i as f64 / (POINTS_PER_SECTOR - 1) as f64;
                let angle = (sector - 1) as f64 * 120.0 + progress * 120.0;
                let radius = 100.0 + (progress * PI).sin() * 30.0;
                let radians = angle.to_radians();

                points.push(TrackPoint {
                    sector,
                    x: radians.cos() * radius,
                    y: radians.sin() * radius,
                    progress,
                    angle,
                });
            }
        }

        TrackLayout { points }
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Maps a lap fraction onto the layout. Out of range fractions are clamped.
    pub fn locate(&self, track_x: f64) -> Option<CarPosition> {
        let last = self.points.len().checked_sub(1)?;
        let fraction = if track_x.is_nan() { 0.0 } else { track_x.clamp(0.0, 1.0) };

        let idx = (fraction * last as f64).floor() as usize;
        let point = &self.points[idx];
        let next = &self.points[(idx + 1).min(last)];

        Some(CarPosition {
            x: point.x,
            y: point.y,
            heading: (next.y - point.y).atan2(next.x - point.x),
            sector: point.sector,
        })
    }

    /// One marker per driver with telemetry, sorted by driver id.
    pub fn place(&self, state: &LiveState) -> Vec<CarMarker> {
        state
            .drivers()
            .into_iter()
            .filter_map(|driver_id| {
                let sample = state.telemetry(driver_id)?;
                let position = self.locate(sample.data.track_x.unwrap_or(0.0))?;

                Some(CarMarker {
                    driver_id: driver_id.to_string(),
                    position,
                    speed_kph: sample.data.speed_kph.unwrap_or(0.0),
                    is_anomaly: state.anomaly(driver_id).map_or(false, |anomaly| anomaly.data.is_anomaly),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::frame::Frame;
    use std::convert::TryFrom;
    use std::time::Instant;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn layout_shape() {
        let layout = TrackLayout::synthetic();
        let points = layout.points();

        assert_eq!(points.len(), 60);
        assert_eq!(points[0].sector, 1);
        assert_eq!(points[59].sector, 3);
        assert!(close(points[0].x, 100.0) && close(points[0].y, 0.0));
        // Sector ends sit back on the base radius, the middles bulge out.
        assert!(close(points[19].angle, 120.0));
        assert!(close(points[19].x.hypot(points[19].y), 100.0));
        assert!(points[10].x.hypot(points[10].y) > 125.0);
    }

    #[test]
    fn locate_clamps_and_points_forward() {
        let layout = TrackLayout::synthetic();

        let start = layout.locate(0.0).unwrap();
        assert!(close(start.x, 100.0));
        assert_eq!(start.sector, 1);
        // Heading roughly upwards at the start of an anticlockwise lap.
        assert!(start.heading > 0.0 && start.heading < PI);

        assert_eq!(layout.locate(-3.0), layout.locate(0.0));
        assert_eq!(layout.locate(f64::NAN), layout.locate(0.0));

        let finish = layout.locate(7.0).unwrap();
        let last = layout.points()[59];
        assert!(close(finish.x, last.x) && close(finish.y, last.y));
        assert_eq!(finish.heading, 0.0);

        assert_eq!(layout.locate(0.5).unwrap().sector, 2);
    }

    #[test]
    fn places_drivers_with_anomaly_flags() {
        let layout = TrackLayout::synthetic();
        let mut state = LiveState::default();
        let now = Instant::now();
        for text in &[
            r#"{"type":"telemetry","data":{"driver_id":"driver_2","track_x":0.9,"speed_kph":250}}"#,
            r#"{"type":"telemetry","data":{"driver_id":"driver_1"}}"#,
            r#"{"type":"anomaly","data":{"driver_id":"driver_2","is_anomaly":true,"confidence":0.7}}"#,
        ] {
            state.apply(Frame::try_from(*text).unwrap(), now);
        }

        let markers = layout.place(&state);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].driver_id, "driver_1");
        assert_eq!(markers[0].position, layout.locate(0.0).unwrap());
        assert_eq!(markers[0].speed_kph, 0.0);
        assert!(!markers[0].is_anomaly);
        assert_eq!(markers[1].position.sector, 3);
        assert_eq!(markers[1].speed_kph, 250.0);
        assert!(markers[1].is_anomaly);
    }
}
