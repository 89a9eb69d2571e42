//! Surface wave arrival prediction for catalogued earthquakes.

use crate::types::EventMetadata;
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Typical Rayleigh wave group velocity (km/s)
pub const SURFACE_WAVE_VELOCITY_KM_S: f64 = 3.4;

/// Capture span before the predicted arrival
pub const CAPTURE_BEFORE_S: i64 = 15;

/// Capture span after the predicted arrival
pub const CAPTURE_AFTER_S: i64 = 45;

/// Point on the Earth's surface in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in km (haversine).
    ///
    /// Spherical Earth of radius [`EARTH_RADIUS_KM`]. Differs from a WGS-84
    /// geodesic by up to about 0.5%, which at regional distances shifts the
    /// predicted arrival by one or two seconds.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
    }
}

/// Travel time of the surface wave from `event` to `station`.
pub fn surface_wave_delay(event: &GeoPoint, station: &GeoPoint) -> Duration {
    let seconds = event.distance_km(station) / SURFACE_WAVE_VELOCITY_KM_S;
    Duration::microseconds((seconds * 1e6).round() as i64)
}

/// Predicted arrival time at `station` for an event at `origin_time`.
pub fn arrival_time(origin_time: DateTime<Utc>, event: &GeoPoint, station: &GeoPoint) -> DateTime<Utc> {
    origin_time + surface_wave_delay(event, station)
}

/// Waveform span to record around an arrival: 15 s before to 45 s after.
pub fn capture_window(arrival: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        arrival - Duration::seconds(CAPTURE_BEFORE_S),
        arrival + Duration::seconds(CAPTURE_AFTER_S),
    )
}

/// Hourly capture times in `[start, end]` at least `buffer` away from every
/// earthquake origin time.
///
/// `start` is floored to the hour. Used to pick background intervals that
/// contain no catalogued event.
pub fn background_hours(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    quakes: &[DateTime<Utc>],
    buffer: Duration,
) -> Vec<DateTime<Utc>> {
    let Some(mut hour) = start.duration_trunc(Duration::hours(1)).ok() else {
        return Vec::new();
    };

    let mut hours = Vec::new();
    while hour <= end {
        if quakes.iter().all(|&q| (hour - q).abs() > buffer) {
            hours.push(hour);
        }
        hour += Duration::hours(1);
    }
    hours
}

impl EventMetadata {
    pub fn epicenter(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Fill in the predicted arrival at `station` and return it.
    pub fn predict_arrival(&mut self, station: &GeoPoint) -> DateTime<Utc> {
        let arrival = arrival_time(self.time, &self.epicenter(), station);
        self.arrival_time = Some(arrival);
        arrival
    }
}
