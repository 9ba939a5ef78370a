//! Transition detection
//!
//! Compares a raw membership report against the registry's last known state
//! and decides whether it is a genuine entry/exit:
//! - `unknown` reports carry no information and never overwrite state
//! - repeated identical reports are suppressed
//! - a change to a direction the region does not watch still updates state
//! - the first concrete report after registration fires (initial membership)

use crate::domain::input::RawReport;
use crate::domain::transition::Transition;
use crate::domain::types::{Coordinate, GeoEvent, MembershipState, RegionId};
use crate::services::registry::RegionRegistry;
use tracing::{debug, warn};

/// Result of classifying one report
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Genuine transition the region watches
    Fired(Transition),
    /// State changed, but the region does not watch this direction
    Filtered { region_id: RegionId, direction: GeoEvent },
    /// Same state as last time
    Duplicate,
    /// `unknown` report, ignored
    Unknown,
    /// Region is not monitored (never registered, or removed meanwhile)
    Unregistered,
}

impl Detection {
    pub fn into_transition(self) -> Option<Transition> {
        match self {
            Detection::Fired(transition) => Some(transition),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Detection::Fired(_) => "fired",
            Detection::Filtered { .. } => "filtered",
            Detection::Duplicate => "duplicate",
            Detection::Unknown => "unknown",
            Detection::Unregistered => "unregistered",
        }
    }
}

/// Stateless detector; all state lives in the registry it is given
///
/// Callers must hold exclusive access to the registry for the whole call so
/// the read of the previous state and the write of the new one cannot
/// interleave with another report for the same region.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransitionDetector;

impl TransitionDetector {
    pub fn new() -> Self {
        Self
    }

    /// Observe a report and return the transition it produces, if any
    pub fn observe(
        &self,
        registry: &mut RegionRegistry,
        region_id: &str,
        reported: MembershipState,
        location: Option<Coordinate>,
    ) -> Option<Transition> {
        self.classify(registry, region_id, reported, location).into_transition()
    }

    /// Same as [`observe`](Self::observe) for a whole raw report
    pub fn observe_report(
        &self,
        registry: &mut RegionRegistry,
        report: &RawReport,
    ) -> Detection {
        self.classify(registry, report.region_id.as_str(), report.state, report.location)
    }

    /// Classify a report, updating the stored state when it changed
    pub fn classify(
        &self,
        registry: &mut RegionRegistry,
        region_id: &str,
        reported: MembershipState,
        location: Option<Coordinate>,
    ) -> Detection {
        let Some((region, stored)) = registry.entry_mut(region_id) else {
            warn!(region_id = %region_id, state = %reported, "report_unregistered_region");
            return Detection::Unregistered;
        };

        let direction = match reported {
            MembershipState::Unknown => {
                debug!(region_id = %region_id, previous = %*stored, "report_unknown_ignored");
                return Detection::Unknown;
            }
            state if state == *stored => {
                debug!(region_id = %region_id, state = %state, "report_duplicate_suppressed");
                return Detection::Duplicate;
            }
            MembershipState::Inside => GeoEvent::Entry,
            MembershipState::Outside => GeoEvent::Exit,
        };

        let previous = *stored;
        *stored = reported;

        if !region.watches(direction) {
            debug!(
                region_id = %region_id,
                previous = %previous,
                state = %reported,
                direction = %direction,
                "transition_not_watched"
            );
            return Detection::Filtered { region_id: region.id().clone(), direction };
        }

        debug!(
            region_id = %region_id,
            previous = %previous,
            state = %reported,
            direction = %direction,
            first = !previous.is_concrete(),
            "transition_detected"
        );
        Detection::Fired(Transition::new(region, direction, location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::region::{Region, RegisterMode};
    use crate::domain::types::WatchSet;
    use MembershipState::{Inside, Outside, Unknown};

    fn registry_with(id: &str, watched: WatchSet) -> RegionRegistry {
        let mut registry = RegionRegistry::new();
        registry.register(Region::new(id, 51.0, 4.0, 75.0, watched).unwrap());
        registry
    }

    fn feed(
        registry: &mut RegionRegistry,
        id: &str,
        states: &[MembershipState],
    ) -> Vec<Transition> {
        let detector = TransitionDetector::new();
        states.iter().filter_map(|s| detector.observe(registry, id, *s, None)).collect()
    }

    #[test]
    fn test_repeated_inside_fires_once() {
        let mut registry = registry_with("r", WatchSet::BOTH);

        let fired = feed(&mut registry, "r", &[Inside, Inside, Inside]);

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].direction, GeoEvent::Entry);
        assert_eq!(fired[0].region_id.as_str(), "r");
        assert_eq!(fired[0].radius, 75.0);
    }

    #[test]
    fn test_first_outside_fires_exit() {
        let mut registry = registry_with("r", WatchSet::BOTH);

        let fired = feed(&mut registry, "r", &[Outside]);

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].direction, GeoEvent::Exit);
    }

    #[test]
    fn test_unknown_between_reports_is_ignored() {
        let mut registry = registry_with("r", WatchSet::BOTH);

        let fired = feed(&mut registry, "r", &[Inside, Unknown, Inside]);

        assert_eq!(fired.len(), 1);
        assert_eq!(registry.state("r"), Some(Inside));
    }

    #[test]
    fn test_unknown_never_overwrites_state() {
        let mut registry = registry_with("r", WatchSet::BOTH);
        feed(&mut registry, "r", &[Outside]);

        let detection = TransitionDetector::new().classify(&mut registry, "r", Unknown, None);

        assert_eq!(detection, Detection::Unknown);
        assert_eq!(registry.state("r"), Some(Outside));
    }

    #[test]
    fn test_unwatched_direction_still_updates_state() {
        let mut registry = registry_with("r", WatchSet::ENTRY);

        let fired = feed(&mut registry, "r", &[Inside, Outside]);
        assert_eq!(fired.len(), 1);
        assert_eq!(registry.state("r"), Some(Outside));

        let fired = feed(&mut registry, "r", &[Inside]);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].direction, GeoEvent::Entry);
    }

    #[test]
    fn test_filtered_detection_reports_direction() {
        let mut registry = registry_with("r", WatchSet::ENTRY);

        let detection = TransitionDetector::new().classify(&mut registry, "r", Outside, None);

        assert_eq!(
            detection,
            Detection::Filtered { region_id: RegionId::from("r"), direction: GeoEvent::Exit }
        );
        assert_eq!(detection.as_str(), "filtered");
    }

    #[test]
    fn test_empty_watch_set_is_inert() {
        let mut registry = registry_with("r", WatchSet::NONE);

        let fired = feed(&mut registry, "r", &[Inside, Outside, Inside, Outside]);

        assert!(fired.is_empty());
        assert_eq!(registry.state("r"), Some(Outside));
    }

    #[test]
    fn test_unregistered_region_is_noop() {
        let mut registry = RegionRegistry::new();

        let detection = TransitionDetector::new().classify(&mut registry, "ghost", Inside, None);

        assert_eq!(detection, Detection::Unregistered);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_transition_carries_location() {
        let mut registry = registry_with("r", WatchSet::BOTH);
        let report = RawReport::new("r", Inside).with_location(Coordinate::new(51.0001, 4.0001));

        let detection = TransitionDetector::new().observe_report(&mut registry, &report);

        let transition = detection.into_transition().unwrap();
        assert_eq!(transition.location, Some(Coordinate::new(51.0001, 4.0001)));
        assert_eq!(transition.latitude, 51.0);
    }

    #[test]
    fn test_reset_registration_fires_again() {
        let mut registry = registry_with("r", WatchSet::BOTH);
        feed(&mut registry, "r", &[Inside]);

        let region = registry.get("r").cloned().unwrap();
        registry.register_with(region, RegisterMode::ResetState);

        assert_eq!(feed(&mut registry, "r", &[Inside]).len(), 1);
    }

    #[test]
    fn test_preserving_registration_does_not_refire() {
        let mut registry = registry_with("r", WatchSet::BOTH);
        feed(&mut registry, "r", &[Inside]);

        let region = registry.get("r").cloned().unwrap();
        registry.register(region);

        assert!(feed(&mut registry, "r", &[Inside]).is_empty());
    }
}
