//! Farm location and normalized forecast records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FarmId;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude and longitude are both within range.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A farm that has coordinates on record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmLocation {
    pub id: FarmId,
    pub lat: f64,
    pub lon: f64,
}

impl FarmLocation {
    pub fn new(id: impl Into<FarmId>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// One forecast observation in provider-independent units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Millimetres.
    pub precipitation: f64,
    /// Metres per second.
    pub wind_speed: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
}

impl ForecastPoint {
    pub fn new(
        timestamp: DateTime<Utc>,
        temperature: f64,
        precipitation: f64,
        wind_speed: f64,
        humidity: f64,
    ) -> Self {
        Self {
            timestamp,
            temperature,
            precipitation,
            wind_speed,
            humidity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds() {
        assert!(Coordinates::new(-1.2921, 36.8219).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -180.5).is_valid());
    }

    #[test]
    fn test_farm_location_coordinates() {
        let farm = FarmLocation::new("farm-1", 0.3476, 32.5825);
        assert_eq!(farm.coordinates(), Coordinates::new(0.3476, 32.5825));
        assert_eq!(farm.id.as_str(), "farm-1");
    }
}
