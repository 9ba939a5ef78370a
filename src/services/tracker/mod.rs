//! Region tracking and transition orchestration
//!
//! The Tracker is the central input processor that coordinates:
//! - Region registry (monitored regions and their last known state)
//! - Transition detection (dedup, unknown filtering, watch sets)
//! - Notification composition (defaults and per-region overrides)
//! - Dispatch (callbacks in foreground, notifications otherwise)
//!
//! All methods take `&self`; the registry sits behind a mutex so the tracker
//! can be shared across threads. Reports additionally hold the delivery lock
//! from detection until dispatch returns, so transitions reach callbacks and
//! the sink in the order they were committed to the registry. The registry
//! lock itself is released before dispatch.

mod handlers;

use crate::domain::input::{LocationUpdate, RawReport, TrackerInput};
use crate::domain::region::{Region, RegisterMode};
use crate::domain::transition::Transition;
use crate::domain::types::{LifecycleState, MembershipState, RegionId};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::event_source::EventSource;
use crate::services::composer::{NotificationComposer, OverrideStore};
use crate::services::detector::TransitionDetector;
use crate::services::dispatch::{DispatchRouter, NotificationSink};
use crate::services::registry::RegionRegistry;
use crate::services::subscribers::{Subscribers, Subscription};
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::info;

/// Central input processor for region membership tracking
pub struct Tracker {
    /// Monitored regions and their membership state
    pub(crate) registry: Mutex<RegionRegistry>,
    /// Serializes detect-then-deliver; reentrant so callbacks may report again
    pub(crate) delivery: ReentrantMutex<()>,
    pub(crate) detector: TransitionDetector,
    /// Builds notification text for background delivery
    pub(crate) composer: NotificationComposer,
    /// Routes transitions by lifecycle state
    pub(crate) router: DispatchRouter,
    /// Raw location update subscribers
    pub(crate) locations: Subscribers<LocationUpdate>,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    /// Mode used for `Register` inputs that do not name one
    pub(crate) default_register_mode: RegisterMode,
}

impl Tracker {
    /// Create a new Tracker with the given configuration and collaborators
    pub fn new(
        config: &Config,
        overrides: Arc<dyn OverrideStore>,
        notifier: Arc<dyn NotificationSink>,
        lifecycle: watch::Receiver<LifecycleState>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry: Mutex::new(RegionRegistry::new()),
            delivery: ReentrantMutex::new(()),
            detector: TransitionDetector::new(),
            composer: NotificationComposer::new(overrides, config.notification_key_prefix()),
            router: DispatchRouter::new(lifecycle, notifier),
            locations: Subscribers::new(),
            metrics,
            default_register_mode: RegisterMode::from_reset(config.reset_state_on_register()),
        }
    }

    /// Consume inputs until the source ends or shutdown is signalled
    pub async fn run<S: EventSource>(&self, mut source: S, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("tracker_shutdown");
                        break;
                    }
                }
                input = source.next_input() => {
                    match input {
                        Some(input) => self.process_input(input),
                        None => {
                            info!("tracker_source_closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Process a single input, dispatching to the appropriate handler
    pub fn process_input(&self, input: TrackerInput) {
        let process_start = Instant::now();

        match input {
            TrackerInput::State(report) => {
                self.handle_state_report(&report);
            }
            TrackerInput::Crossing(crossing) => {
                self.handle_crossing(&crossing);
            }
            TrackerInput::MonitorError { code, message } => {
                self.handle_monitor_error(code, message.as_deref());
            }
            TrackerInput::Location(update) => {
                self.handle_location(&update);
            }
            TrackerInput::Register { region, mode } => {
                self.handle_register(region, mode.unwrap_or(self.default_register_mode));
            }
            TrackerInput::Unregister { region_id } => {
                self.handle_unregister(region_id.as_str());
            }
            TrackerInput::UnregisterAll => {
                self.handle_unregister_all();
            }
        }

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_input_processed(latency_us);
    }

    /// Observe a raw report and return the transition it fired, if any
    ///
    /// A fired transition has already been dispatched when this returns.
    pub fn observe(&self, report: &RawReport) -> Option<Transition> {
        self.handle_state_report(report)
    }

    /// Register a region, preserving learned state on re-registration
    pub fn register(&self, region: Region) -> bool {
        self.handle_register(region, RegisterMode::PreserveState)
    }

    pub fn register_with(&self, region: Region, mode: RegisterMode) -> bool {
        self.handle_register(region, mode)
    }

    pub fn unregister(&self, region_id: &str) -> bool {
        self.handle_unregister(region_id)
    }

    pub fn unregister_all(&self) -> usize {
        self.handle_unregister_all()
    }

    /// Add an in-process transition callback (used in foreground)
    pub fn subscribe_transitions<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Transition) + Send + Sync + 'static,
    {
        self.router.subscribe(callback)
    }

    /// Add a raw location update callback
    pub fn subscribe_locations<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&LocationUpdate) + Send + Sync + 'static,
    {
        self.locations.subscribe(callback)
    }

    pub fn region(&self, region_id: &str) -> Option<Region> {
        self.registry.lock().get(region_id).cloned()
    }

    pub fn state(&self, region_id: &str) -> Option<MembershipState> {
        self.registry.lock().state(region_id)
    }

    pub fn region_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn region_ids(&self) -> Vec<RegionId> {
        self.registry.lock().ids()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.router.lifecycle()
    }
}
