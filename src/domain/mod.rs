//! Domain models - core types of the geofence tracker
//!
//! - `Region` - a monitored circular area and its watch set
//! - `MembershipState` - inside / outside / unknown relation to a region
//! - `Transition` - a deduplicated enter/exit event
//! - `TrackerInput` - raw reports, commands and location updates

pub mod input;
pub mod region;
pub mod transition;
pub mod types;

pub use input::{LocationUpdate, RawCrossing, RawReport, TrackerInput};
pub use region::{Region, RegionError, RegionSpec, RegisterMode};
pub use transition::{Notification, Transition};
pub use types::{Coordinate, GeoEvent, LifecycleState, MembershipState, RegionId, WatchSet};
