//! Inputs accepted by the tracker

use crate::domain::region::{Region, RegisterMode};
use crate::domain::types::{epoch_ms, Coordinate, GeoEvent, MembershipState, RegionId};
use serde::Serialize;
use smallvec::SmallVec;

/// Current membership state reported by the monitoring service
#[derive(Debug, Clone, PartialEq)]
pub struct RawReport {
    pub region_id: RegionId,
    pub state: MembershipState,
    pub location: Option<Coordinate>,
}

impl RawReport {
    pub fn new(region_id: impl Into<RegionId>, state: MembershipState) -> Self {
        Self { region_id: region_id.into(), state, location: None }
    }

    pub fn with_location(mut self, location: Coordinate) -> Self {
        self.location = Some(location);
        self
    }
}

/// Direct crossing event naming every region that triggered it
///
/// Some monitors deliver "entered"/"exited" instead of a membership state.
/// Each id is folded back into a state report so deduplication still holds.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCrossing {
    pub region_ids: SmallVec<[RegionId; 4]>,
    pub direction: GeoEvent,
    pub location: Option<Coordinate>,
}

impl RawCrossing {
    pub fn reports(&self) -> impl Iterator<Item = RawReport> + '_ {
        let state = self.direction.resulting_state();
        self.region_ids.iter().map(move |id| RawReport {
            region_id: id.clone(),
            state,
            location: self.location,
        })
    }
}

/// Raw user position forwarded to location subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    /// Delivered by the background (significant-change) listener
    pub background: bool,
    /// Receive time (epoch ms)
    pub ts: u64,
}

impl LocationUpdate {
    pub fn new(coordinate: Coordinate, background: bool) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            background,
            ts: epoch_ms(),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Everything the tracker loop consumes
#[derive(Debug, Clone)]
pub enum TrackerInput {
    State(RawReport),
    Crossing(RawCrossing),
    /// Error signalled by the monitoring service instead of a report
    MonitorError { code: i32, message: Option<String> },
    Location(LocationUpdate),
    /// `None` uses the tracker's configured default mode
    Register { region: Region, mode: Option<RegisterMode> },
    Unregister { region_id: RegionId },
    UnregisterAll,
}

impl TrackerInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerInput::State(_) => "state",
            TrackerInput::Crossing(_) => "crossing",
            TrackerInput::MonitorError { .. } => "monitor_error",
            TrackerInput::Location(_) => "location",
            TrackerInput::Register { .. } => "register",
            TrackerInput::Unregister { .. } => "unregister",
            TrackerInput::UnregisterAll => "unregister_all",
        }
    }
}
