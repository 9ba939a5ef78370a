//! Input handlers for the Tracker
//!
//! Each handler processes one input kind. Registry mutations happen under
//! the registry lock; dispatch side effects happen after it is dropped but
//! while the delivery lock is still held.

use super::Tracker;
use crate::domain::input::{LocationUpdate, RawCrossing, RawReport};
use crate::domain::region::{Region, RegisterMode};
use crate::domain::transition::Transition;
use crate::domain::types::GeoEvent;
use crate::services::detector::Detection;
use crate::services::dispatch::DispatchOutcome;
use tracing::{debug, info, warn};

impl Tracker {
    /// Run one report through the detector and dispatch a fired transition
    pub(crate) fn handle_state_report(&self, report: &RawReport) -> Option<Transition> {
        self.metrics.record_report();

        // Lock order: delivery, then registry
        let _delivery = self.delivery.lock();
        let detection = {
            let mut registry = self.registry.lock();
            self.detector.observe_report(&mut registry, report)
        };
        debug!(region_id = %report.region_id, detection = detection.as_str(), "report_classified");

        match detection {
            Detection::Fired(transition) => {
                match transition.direction {
                    GeoEvent::Entry => self.metrics.record_entry(),
                    GeoEvent::Exit => self.metrics.record_exit(),
                }
                self.deliver(&transition);
                Some(transition)
            }
            Detection::Filtered { .. } => {
                self.metrics.record_report_filtered();
                None
            }
            Detection::Duplicate => {
                self.metrics.record_report_duplicate();
                None
            }
            Detection::Unknown => {
                self.metrics.record_report_unknown();
                None
            }
            Detection::Unregistered => {
                self.metrics.record_report_unregistered();
                None
            }
        }
    }

    /// Compose and route one transition; sink failures stop here
    fn deliver(&self, transition: &Transition) {
        let notification = self.composer.compose(transition);

        let outcome = self.router.dispatch(transition, &notification);
        debug!(
            region_id = %transition.region_id,
            outcome = outcome.as_str(),
            "transition_dispatched"
        );
        match outcome {
            DispatchOutcome::Callback { delivered } => {
                self.metrics.record_callbacks_delivered(delivered as u64);
            }
            DispatchOutcome::Notified => {
                self.metrics.record_notification_sent();
            }
            DispatchOutcome::NotificationFailed(_) => {
                self.metrics.record_notification_failed();
            }
        }
    }

    /// Fold a multi-region crossing into per-region state reports
    pub(crate) fn handle_crossing(&self, crossing: &RawCrossing) -> Vec<Transition> {
        debug!(
            direction = %crossing.direction,
            regions = crossing.region_ids.len(),
            "crossing_received"
        );
        crossing.reports().filter_map(|report| self.handle_state_report(&report)).collect()
    }

    pub(crate) fn handle_monitor_error(&self, code: i32, message: Option<&str>) {
        self.metrics.record_monitor_error();
        warn!(code = code, message = message.unwrap_or(""), "monitor_error");
    }

    pub(crate) fn handle_location(&self, update: &LocationUpdate) {
        self.metrics.record_location_update();
        let delivered = self.locations.notify(update);
        debug!(
            latitude = %update.latitude,
            longitude = %update.longitude,
            background = update.background,
            delivered = delivered,
            "location_update"
        );
    }

    pub(crate) fn handle_register(&self, region: Region, mode: RegisterMode) -> bool {
        let region_id = region.id().clone();
        let (added, count) = {
            let mut registry = self.registry.lock();
            let added = registry.register_with(region, mode);
            (added, registry.len())
        };
        self.metrics.set_regions_monitored(count);
        info!(region_id = %region_id, added = added, regions = count, "region_monitoring_started");
        added
    }

    pub(crate) fn handle_unregister(&self, region_id: &str) -> bool {
        let (removed, count) = {
            let mut registry = self.registry.lock();
            let removed = registry.unregister(region_id);
            (removed, registry.len())
        };
        self.metrics.set_regions_monitored(count);
        if removed {
            info!(region_id = %region_id, regions = count, "region_monitoring_stopped");
        } else {
            debug!(region_id = %region_id, "unregister_unknown_region");
        }
        removed
    }

    pub(crate) fn handle_unregister_all(&self) -> usize {
        let removed = self.registry.lock().unregister_all();
        self.metrics.set_regions_monitored(0);
        info!(removed = removed, "region_monitoring_cleared");
        removed
    }
}
