//! Region registry - monitored regions and their last known membership
//!
//! Holds at most one `MembershipState` per region id. The state is created
//! as `Unknown` together with the region and is only changed by the
//! transition detector (or reset by an explicit re-registration).

use crate::domain::region::{Region, RegisterMode};
use crate::domain::types::{MembershipState, RegionId};
use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct Monitored {
    region: Region,
    state: MembershipState,
}

/// In-memory set of monitored regions
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: FxHashMap<RegionId, Monitored>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self { regions: FxHashMap::default() }
    }

    /// Insert or overwrite a region, preserving any learned state
    ///
    /// Returns true if the id was not tracked before.
    pub fn register(&mut self, region: Region) -> bool {
        self.register_with(region, RegisterMode::PreserveState)
    }

    /// Insert or overwrite a region with an explicit re-registration policy
    pub fn register_with(&mut self, region: Region, mode: RegisterMode) -> bool {
        match self.regions.get_mut(region.id().as_str()) {
            Some(existing) => {
                if mode == RegisterMode::ResetState {
                    existing.state = MembershipState::Unknown;
                }
                debug!(
                    region_id = %region.id(),
                    state = %existing.state,
                    mode = ?mode,
                    "region_reregistered"
                );
                existing.region = region;
                false
            }
            None => {
                debug!(region_id = %region.id(), radius = %region.radius(), "region_registered");
                self.regions.insert(
                    region.id().clone(),
                    Monitored { region, state: MembershipState::Unknown },
                );
                true
            }
        }
    }

    /// Remove a region and its state. Absent ids are ignored.
    pub fn unregister(&mut self, region_id: &str) -> bool {
        self.regions.remove(region_id).is_some()
    }

    /// Remove every region, returning how many were tracked
    pub fn unregister_all(&mut self) -> usize {
        let count = self.regions.len();
        self.regions.clear();
        count
    }

    pub fn get(&self, region_id: &str) -> Option<&Region> {
        self.regions.get(region_id).map(|m| &m.region)
    }

    pub fn state(&self, region_id: &str) -> Option<MembershipState> {
        self.regions.get(region_id).map(|m| m.state)
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.regions.contains_key(region_id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Ids of all monitored regions, sorted
    pub fn ids(&self) -> Vec<RegionId> {
        let mut ids: Vec<RegionId> = self.regions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Region and a mutable handle on its state, for the detector
    pub(crate) fn entry_mut(
        &mut self,
        region_id: &str,
    ) -> Option<(&Region, &mut MembershipState)> {
        self.regions.get_mut(region_id).map(|m| (&m.region, &mut m.state))
    }
}
