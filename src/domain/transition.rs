//! Domain events produced by the tracker

use crate::domain::region::Region;
use crate::domain::types::{epoch_ms, Coordinate, GeoEvent, RegionId};
use serde::Serialize;

/// A detected, deduplicated crossing of a region boundary
///
/// Created once per genuine state change and handed out by shared
/// reference only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub region_id: RegionId,
    pub direction: GeoEvent,
    pub latitude: f64,
    pub longitude: f64,
    /// Region radius in meters
    pub radius: f64,
    /// Coordinate that triggered the report, when the monitor supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,
    /// Detection time (epoch ms)
    pub detected_at: u64,
}

impl Transition {
    pub fn new(region: &Region, direction: GeoEvent, location: Option<Coordinate>) -> Self {
        Self {
            region_id: region.id().clone(),
            direction,
            latitude: region.latitude(),
            longitude: region.longitude(),
            radius: region.radius(),
            location,
            detected_at: epoch_ms(),
        }
    }
}

/// User-facing message for a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Correlates the message with its region
    pub region_id: RegionId,
    pub title: String,
    pub body: String,
}
