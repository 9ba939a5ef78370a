//! Dispatch routing for detected transitions
//!
//! The lifecycle state is read from a `watch` channel at the moment of
//! delivery:
//! - foreground: transition goes to the in-process callback subscribers
//! - background / inactive: composed notification goes to the notification sink
//!
//! Exactly one path is taken per transition. Sink failures are returned as
//! values, logged here, and never propagate into the tracker.

use crate::domain::transition::{Notification, Transition};
use crate::domain::types::LifecycleState;
use crate::services::subscribers::{Subscribers, Subscription};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why a notification could not be presented
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("notification queue full")]
    QueueFull,
    #[error("notification queue closed")]
    QueueClosed,
    #[error("presentation failed: {0}")]
    Presentation(String),
}

/// Displays user-visible notifications
pub trait NotificationSink: Send + Sync {
    fn display(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Sink that only logs; used when no presentation layer is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn display(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            region_id = %notification.region_id,
            title = %notification.title,
            body = %notification.body,
            "notification_logged"
        );
        Ok(())
    }
}

/// What happened to one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Foreground: delivered to `delivered` callback subscribers
    Callback { delivered: usize },
    /// Background: notification accepted by the sink
    Notified,
    /// Background: sink rejected the notification
    NotificationFailed(DeliveryError),
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Callback { .. } => "callback",
            DispatchOutcome::Notified => "notified",
            DispatchOutcome::NotificationFailed(_) => "notification_failed",
        }
    }
}

/// Routes transitions to callbacks or notifications by lifecycle state
pub struct DispatchRouter {
    lifecycle: watch::Receiver<LifecycleState>,
    notifier: Arc<dyn NotificationSink>,
    callbacks: Subscribers<Transition>,
}

impl DispatchRouter {
    pub fn new(
        lifecycle: watch::Receiver<LifecycleState>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { lifecycle, notifier, callbacks: Subscribers::new() }
    }

    /// Register an in-process transition callback
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Transition) + Send + Sync + 'static,
    {
        self.callbacks.subscribe(callback)
    }

    /// Current lifecycle state (not cached)
    pub fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }

    pub fn dispatch(
        &self,
        transition: &Transition,
        notification: &Notification,
    ) -> DispatchOutcome {
        let lifecycle = self.lifecycle();

        if lifecycle.is_foreground() {
            let delivered = self.callbacks.notify(transition);
            if delivered == 0 {
                debug!(region_id = %transition.region_id, "transition_no_subscribers");
            }
            info!(
                region_id = %transition.region_id,
                direction = %transition.direction,
                lifecycle = %lifecycle,
                delivered = delivered,
                "transition_delivered_callback"
            );
            return DispatchOutcome::Callback { delivered };
        }

        match self.notifier.display(notification) {
            Ok(()) => {
                info!(
                    region_id = %transition.region_id,
                    direction = %transition.direction,
                    lifecycle = %lifecycle,
                    title = %notification.title,
                    "notification_sent"
                );
                DispatchOutcome::Notified
            }
            Err(e) => {
                warn!(
                    region_id = %transition.region_id,
                    direction = %transition.direction,
                    error = %e,
                    "notification_failed"
                );
                DispatchOutcome::NotificationFailed(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Sink that records notifications, or fails every call when `failing`
    #[derive(Default)]
    pub struct RecordingSink {
        pub shown: Mutex<Vec<Notification>>,
        pub failing: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self { shown: Mutex::new(Vec::new()), failing: true }
        }

        pub fn count(&self) -> usize {
            self.shown.lock().len()
        }
    }

    impl NotificationSink for RecordingSink {
        fn display(&self, notification: &Notification) -> Result<(), DeliveryError> {
            if self.failing {
                return Err(DeliveryError::Presentation("no presentation layer".to_string()));
            }
            self.shown.lock().push(notification.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;
    use crate::domain::region::Region;
    use crate::domain::types::{GeoEvent, RegionId, WatchSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transition() -> Transition {
        let region = Region::new("R1", 0.0, 0.0, 10.0, WatchSet::BOTH).unwrap();
        Transition::new(&region, GeoEvent::Entry, None)
    }

    fn notification() -> Notification {
        Notification {
            region_id: RegionId::from("R1"),
            title: "Entering region".to_string(),
            body: "You are entering R1".to_string(),
        }
    }

    fn router(
        state: LifecycleState,
        sink: Arc<RecordingSink>,
    ) -> (DispatchRouter, watch::Sender<LifecycleState>) {
        let (tx, rx) = watch::channel(state);
        (DispatchRouter::new(rx, sink), tx)
    }

    #[test]
    fn test_foreground_uses_callback_only() {
        let sink = Arc::new(RecordingSink::default());
        let (router, _tx) = router(LifecycleState::Foreground, sink.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = router.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = router.dispatch(&transition(), &notification());

        assert_eq!(outcome, DispatchOutcome::Callback { delivered: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_background_uses_notification_only() {
        let sink = Arc::new(RecordingSink::default());
        let (router, _tx) = router(LifecycleState::Background, sink.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = router.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = router.dispatch(&transition(), &notification());

        assert_eq!(outcome, DispatchOutcome::Notified);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.shown.lock()[0].body, "You are entering R1");
    }

    #[test]
    fn test_inactive_is_treated_as_background() {
        let sink = Arc::new(RecordingSink::default());
        let (router, _tx) = router(LifecycleState::Inactive, sink.clone());

        assert_eq!(router.dispatch(&transition(), &notification()), DispatchOutcome::Notified);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_lifecycle_read_at_dispatch_time() {
        let sink = Arc::new(RecordingSink::default());
        let (router, tx) = router(LifecycleState::Background, sink.clone());

        tx.send(LifecycleState::Foreground).unwrap();
        let outcome = router.dispatch(&transition(), &notification());

        assert_eq!(outcome, DispatchOutcome::Callback { delivered: 0 });
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_sink_failure_is_returned_not_raised() {
        let sink = Arc::new(RecordingSink::failing());
        let (router, _tx) = router(LifecycleState::Background, sink);

        let outcome = router.dispatch(&transition(), &notification());

        assert!(matches!(
            outcome,
            DispatchOutcome::NotificationFailed(DeliveryError::Presentation(_))
        ));
        assert_eq!(outcome.as_str(), "notification_failed");
    }
}
