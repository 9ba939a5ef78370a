//! Monitored region model

use crate::domain::types::{Coordinate, GeoEvent, RegionId, WatchSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a region definition is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("region id must not be empty")]
    EmptyId,
    #[error("region {id}: radius must be a positive number of meters, got {radius}")]
    InvalidRadius { id: String, radius: f64 },
    #[error("region {id}: latitude {latitude} out of range [-90, 90]")]
    InvalidLatitude { id: String, latitude: f64 },
    #[error("region {id}: longitude {longitude} out of range [-180, 180]")]
    InvalidLongitude { id: String, longitude: f64 },
}

/// How `register` treats a region id that is already tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterMode {
    /// Keep the learned membership state
    #[default]
    PreserveState,
    /// Forget the learned state; the next concrete report fires again
    ResetState,
}

impl RegisterMode {
    pub fn from_reset(reset: bool) -> Self {
        if reset {
            RegisterMode::ResetState
        } else {
            RegisterMode::PreserveState
        }
    }
}

/// Circular geofence
///
/// Fields are private so a `Region` always satisfies its geometry
/// invariants; build one with [`Region::new`] or by deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegionSpec", into = "RegionSpec")]
pub struct Region {
    id: RegionId,
    latitude: f64,
    longitude: f64,
    radius: f64,
    watched: WatchSet,
}

impl Region {
    pub fn new(
        id: impl Into<RegionId>,
        latitude: f64,
        longitude: f64,
        radius: f64,
        watched: WatchSet,
    ) -> Result<Self, RegionError> {
        let id = id.into();
        if id.as_str().is_empty() {
            return Err(RegionError::EmptyId);
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(RegionError::InvalidRadius { id: id.0, radius });
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(RegionError::InvalidLatitude { id: id.0, latitude });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(RegionError::InvalidLongitude { id: id.0, longitude });
        }
        Ok(Self { id, latitude, longitude, radius, watched })
    }

    pub fn id(&self) -> &RegionId {
        &self.id
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Radius in meters
    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn watched(&self) -> WatchSet {
        self.watched
    }

    #[inline]
    pub fn watches(&self, event: GeoEvent) -> bool {
        self.watched.contains(event)
    }
}

/// Unvalidated region shape used for config files and wire payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSpec {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    #[serde(default = "default_events")]
    pub events: WatchSet,
}

fn default_events() -> WatchSet {
    WatchSet::BOTH
}

impl TryFrom<RegionSpec> for Region {
    type Error = RegionError;

    fn try_from(spec: RegionSpec) -> Result<Self, Self::Error> {
        Region::new(spec.id, spec.latitude, spec.longitude, spec.radius, spec.events)
    }
}

impl From<Region> for RegionSpec {
    fn from(region: Region) -> Self {
        Self {
            id: region.id.0,
            latitude: region.latitude,
            longitude: region.longitude,
            radius: region.radius,
            events: region.watched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_region() {
        let region = Region::new("home", 51.05, 3.72, 150.0, WatchSet::BOTH).unwrap();
        assert_eq!(region.id().as_str(), "home");
        assert_eq!(region.center(), Coordinate::new(51.05, 3.72));
        assert!(region.watches(GeoEvent::Entry));
        assert!(region.watches(GeoEvent::Exit));
    }

    #[test]
    fn test_reject_bad_geometry() {
        assert_eq!(Region::new("", 0.0, 0.0, 10.0, WatchSet::BOTH), Err(RegionError::EmptyId));
        assert!(matches!(
            Region::new("r", 0.0, 0.0, 0.0, WatchSet::BOTH),
            Err(RegionError::InvalidRadius { .. })
        ));
        assert!(matches!(
            Region::new("r", 0.0, 0.0, f64::NAN, WatchSet::BOTH),
            Err(RegionError::InvalidRadius { .. })
        ));
        assert!(matches!(
            Region::new("r", 91.0, 0.0, 10.0, WatchSet::BOTH),
            Err(RegionError::InvalidLatitude { .. })
        ));
        assert!(matches!(
            Region::new("r", 0.0, -181.0, 10.0, WatchSet::BOTH),
            Err(RegionError::InvalidLongitude { .. })
        ));
    }

    #[test]
    fn test_deserialize_defaults_to_both_events() {
        let region: Region =
            serde_json::from_str(r#"{"id":"office","latitude":1.0,"longitude":2.0,"radius":50}"#)
                .unwrap();
        assert_eq!(region.watched(), WatchSet::BOTH);
    }

    #[test]
    fn test_deserialize_rejects_invalid_radius() {
        let result: Result<Region, _> =
            serde_json::from_str(r#"{"id":"x","latitude":1.0,"longitude":2.0,"radius":-5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_register_mode_from_reset() {
        assert_eq!(RegisterMode::from_reset(true), RegisterMode::ResetState);
        assert_eq!(RegisterMode::from_reset(false), RegisterMode::PreserveState);
    }
}
