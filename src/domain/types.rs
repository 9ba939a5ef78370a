//! Shared value types for the geofence gateway

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for region identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub String);

impl RegionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RegionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RegionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RegionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Direction of a boundary crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoEvent {
    Entry,
    Exit,
}

impl GeoEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoEvent::Entry => "entry",
            GeoEvent::Exit => "exit",
        }
    }

    /// Membership state implied once this crossing has happened
    pub fn resulting_state(&self) -> MembershipState {
        match self {
            GeoEvent::Entry => MembershipState::Inside,
            GeoEvent::Exit => MembershipState::Outside,
        }
    }
}

impl std::fmt::Display for GeoEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subset of {entry, exit} a region reports on
///
/// Serialized as a list (`["entry", "exit"]`) so config files and wire
/// payloads read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<GeoEvent>", into = "Vec<GeoEvent>")]
pub struct WatchSet {
    entry: bool,
    exit: bool,
}

impl WatchSet {
    pub const NONE: WatchSet = WatchSet { entry: false, exit: false };
    pub const ENTRY: WatchSet = WatchSet { entry: true, exit: false };
    pub const BOTH: WatchSet = WatchSet { entry: true, exit: true };

    #[inline]
    pub fn contains(&self, event: GeoEvent) -> bool {
        match event {
            GeoEvent::Entry => self.entry,
            GeoEvent::Exit => self.exit,
        }
    }

    /// An empty watch set makes a region inert
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.entry && !self.exit
    }

    pub fn events(&self) -> Vec<GeoEvent> {
        let mut events = Vec::with_capacity(2);
        if self.entry {
            events.push(GeoEvent::Entry);
        }
        if self.exit {
            events.push(GeoEvent::Exit);
        }
        events
    }
}

impl From<Vec<GeoEvent>> for WatchSet {
    fn from(events: Vec<GeoEvent>) -> Self {
        events.iter().copied().collect()
    }
}

impl From<WatchSet> for Vec<GeoEvent> {
    fn from(set: WatchSet) -> Self {
        set.events()
    }
}

impl FromIterator<GeoEvent> for WatchSet {
    fn from_iter<I: IntoIterator<Item = GeoEvent>>(iter: I) -> Self {
        let mut set = WatchSet::NONE;
        for event in iter {
            match event {
                GeoEvent::Entry => set.entry = true,
                GeoEvent::Exit => set.exit = true,
            }
        }
        set
    }
}

/// Believed relation between the tracked entity and a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipState {
    #[default]
    Unknown,
    Inside,
    Outside,
}

impl MembershipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Unknown => "unknown",
            MembershipState::Inside => "inside",
            MembershipState::Outside => "outside",
        }
    }

    #[inline]
    pub fn is_concrete(&self) -> bool {
        !matches!(self, MembershipState::Unknown)
    }
}

impl std::fmt::Display for MembershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide application lifecycle, supplied by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Foreground,
    #[default]
    Background,
    Inactive,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Foreground => "foreground",
            LifecycleState::Background => "background",
            LifecycleState::Inactive => "inactive",
        }
    }

    #[inline]
    pub fn is_foreground(&self) -> bool {
        matches!(self, LifecycleState::Foreground)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a coordinate only when both halves are present
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self { latitude, longitude }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_set_from_events() {
        let set: WatchSet = vec![GeoEvent::Exit].into();
        assert!(set.contains(GeoEvent::Exit));
        assert!(!set.contains(GeoEvent::Entry));
        assert!(!set.is_empty());
        assert!(WatchSet::from(Vec::new()).is_empty());
        assert_eq!(WatchSet::BOTH.events(), vec![GeoEvent::Entry, GeoEvent::Exit]);
    }

    #[test]
    fn test_watch_set_serde_as_list() {
        let set: WatchSet = serde_json::from_str(r#"["entry","entry"]"#).unwrap();
        assert_eq!(set, WatchSet::ENTRY);
        assert_eq!(serde_json::to_string(&WatchSet::BOTH).unwrap(), r#"["entry","exit"]"#);
    }

    #[test]
    fn test_membership_state_parse() {
        let state: MembershipState = serde_json::from_str(r#""inside""#).unwrap();
        assert_eq!(state, MembershipState::Inside);
        assert!(state.is_concrete());
        assert!(!MembershipState::default().is_concrete());
    }

    #[test]
    fn test_lifecycle_foreground() {
        assert!(LifecycleState::Foreground.is_foreground());
        assert!(!LifecycleState::Background.is_foreground());
        assert!(!LifecycleState::Inactive.is_foreground());
    }

    #[test]
    fn test_coordinate_from_parts() {
        assert_eq!(Coordinate::from_parts(Some(1.0), Some(2.0)), Some(Coordinate::new(1.0, 2.0)));
        assert_eq!(Coordinate::from_parts(Some(1.0), None), None);
    }
}
