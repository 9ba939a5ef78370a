//! Typed channel for MQTT egress messages
//!
//! Provides a non-blocking way to send transitions, notifications, location
//! updates and metrics to the MQTT publisher. Uses a bounded mpsc channel to
//! prevent unbounded memory growth.

use crate::domain::input::LocationUpdate;
use crate::domain::transition::{Notification, Transition};
use crate::domain::types::epoch_ms;
use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_NUM_BUCKETS};
use crate::services::dispatch::{DeliveryError, NotificationSink};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

/// Message types that can be sent to the MQTT publisher
#[derive(Debug)]
pub enum EgressMessage {
    Transition(TransitionPayload),
    Notification(NotificationPayload),
    Location(LocationPayload),
    Metrics(MetricsPayload),
}

impl EgressMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            EgressMessage::Transition(_) => "transition",
            EgressMessage::Notification(_) => "notification",
            EgressMessage::Location(_) => "location",
            EgressMessage::Metrics(_) => "metrics",
        }
    }
}

/// Transition delivered to a foreground callback
#[derive(Debug, Clone, Serialize)]
pub struct TransitionPayload {
    pub site: String,
    #[serde(flatten)]
    pub transition: Transition,
}

/// Background notification handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub site: String,
    /// Unique per notification (UUIDv7, time-ordered)
    pub id: String,
    pub ts: u64,
    /// Presentation channel (e.g. high-importance alerts)
    pub channel: String,
    #[serde(flatten)]
    pub notification: Notification,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationPayload {
    pub site: String,
    #[serde(flatten)]
    pub update: LocationUpdate,
}

/// Payload for periodic metrics snapshots
#[derive(Debug, Serialize)]
pub struct MetricsPayload {
    pub site: String,
    pub ts: u64,
    pub inputs_total: u64,
    pub inputs_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub regions: u64,
    pub reports: u64,
    pub reports_unknown: u64,
    pub reports_duplicate: u64,
    pub reports_filtered: u64,
    pub reports_unregistered: u64,
    pub entries: u64,
    pub exits: u64,
    pub callbacks: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub monitor_errors: u64,
    pub locations: u64,
    pub inputs_dropped: u64,
    pub inputs_malformed: u64,
    pub egress_dropped: u64,
}

impl MetricsPayload {
    pub fn from_summary(summary: MetricsSummary, site: String) -> Self {
        Self {
            site,
            ts: epoch_ms(),
            inputs_total: summary.inputs_total,
            inputs_per_sec: summary.inputs_per_sec,
            avg_latency_us: summary.avg_process_latency_us,
            max_latency_us: summary.max_process_latency_us,
            lat_buckets: summary.lat_buckets,
            lat_p50_us: summary.lat_p50_us,
            lat_p95_us: summary.lat_p95_us,
            lat_p99_us: summary.lat_p99_us,
            regions: summary.regions_monitored,
            reports: summary.reports_total,
            reports_unknown: summary.reports_unknown,
            reports_duplicate: summary.reports_duplicate,
            reports_filtered: summary.reports_filtered,
            reports_unregistered: summary.reports_unregistered,
            entries: summary.entries_total,
            exits: summary.exits_total,
            callbacks: summary.callbacks_delivered,
            notifications_sent: summary.notifications_sent,
            notifications_failed: summary.notifications_failed,
            monitor_errors: summary.monitor_errors,
            locations: summary.location_updates,
            inputs_dropped: summary.inputs_dropped,
            inputs_malformed: summary.inputs_malformed,
            egress_dropped: summary.egress_dropped,
        }
    }
}

/// Sender handle for egress messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped, logged at
/// debug and counted in `egress_dropped` when metrics are attached.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    site_id: String,
    metrics: Option<Arc<Metrics>>,
}

impl EgressSender {
    pub fn new(tx: mpsc::Sender<EgressMessage>, site_id: String) -> Self {
        Self { tx, site_id, metrics: None }
    }

    /// Count refused messages in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn enqueue(&self, msg: EgressMessage) -> Result<(), TrySendError<EgressMessage>> {
        self.tx.try_send(msg).inspect_err(|e| {
            let (kind, reason) = match e {
                TrySendError::Full(m) => (m.kind(), "full"),
                TrySendError::Closed(m) => (m.kind(), "closed"),
            };
            debug!(kind = kind, reason = reason, "egress_dropped");
            if let Some(metrics) = &self.metrics {
                metrics.record_egress_dropped();
            }
        })
    }

    /// Send a foreground transition; dropped if the channel is full
    pub fn send_transition(&self, transition: &Transition) {
        let payload =
            TransitionPayload { site: self.site_id.clone(), transition: transition.clone() };
        let _ = self.enqueue(EgressMessage::Transition(payload));
    }

    /// Queue a notification for presentation
    ///
    /// Unlike the other senders, a failure is reported so the caller can
    /// count it.
    pub fn send_notification(
        &self,
        notification: &Notification,
        channel: &str,
    ) -> Result<(), DeliveryError> {
        let payload = NotificationPayload {
            site: self.site_id.clone(),
            id: Uuid::now_v7().to_string(),
            ts: epoch_ms(),
            channel: channel.to_string(),
            notification: notification.clone(),
        };
        self.enqueue(EgressMessage::Notification(payload)).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::QueueClosed,
        })
    }

    pub fn send_location(&self, update: &LocationUpdate) {
        let payload = LocationPayload { site: self.site_id.clone(), update: update.clone() };
        let _ = self.enqueue(EgressMessage::Location(payload));
    }

    /// Send a metrics snapshot
    pub fn send_metrics(&self, summary: MetricsSummary) {
        let payload = MetricsPayload::from_summary(summary, self.site_id.clone());
        let _ = self.enqueue(EgressMessage::Metrics(payload));
    }
}

/// Notification sink that publishes through the egress channel
pub struct EgressNotificationSink {
    sender: EgressSender,
    channel_id: String,
}

impl EgressNotificationSink {
    pub fn new(sender: EgressSender, channel_id: impl Into<String>) -> Self {
        Self { sender, channel_id: channel_id.into() }
    }
}

impl NotificationSink for EgressNotificationSink {
    fn display(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.sender.send_notification(notification, &self.channel_id)
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
/// site_id is included in every payload for downstream consumers.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::region::Region;
    use crate::domain::types::{GeoEvent, RegionId, WatchSet};

    fn notification() -> Notification {
        Notification {
            region_id: RegionId::from("home"),
            title: "Entering region".to_string(),
            body: "You are entering home".to_string(),
        }
    }

    #[test]
    fn test_transition_payload_is_flat_json() {
        let region = Region::new("home", 52.0, 4.0, 100.0, WatchSet::BOTH).unwrap();
        let payload = TransitionPayload {
            site: "device-1".to_string(),
            transition: Transition::new(&region, GeoEvent::Entry, None),
        };

        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["site"], "device-1");
        assert_eq!(json["region_id"], "home");
        assert_eq!(json["direction"], "entry");
        assert_eq!(json["radius"], 100.0);
        assert!(json.get("location").is_none());
    }

    #[test]
    fn test_notification_sink_sends_with_channel() {
        let (sender, mut rx) = create_egress_channel(4, "device-1".to_string());
        let sink = EgressNotificationSink::new(sender, "high_importance_channel");

        sink.display(&notification()).unwrap();

        match rx.try_recv().unwrap() {
            EgressMessage::Notification(payload) => {
                assert_eq!(payload.site, "device-1");
                assert_eq!(payload.channel, "high_importance_channel");
                assert_eq!(payload.notification.body, "You are entering home");
                assert!(!payload.id.is_empty());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_notification_sink_reports_full_queue() {
        let (sender, _rx) = create_egress_channel(1, "s".to_string());
        let sink = EgressNotificationSink::new(sender, "c");

        assert_eq!(sink.display(&notification()), Ok(()));
        assert_eq!(sink.display(&notification()), Err(DeliveryError::QueueFull));
    }

    #[test]
    fn test_notification_sink_reports_closed_queue() {
        let (sender, rx) = create_egress_channel(1, "s".to_string());
        drop(rx);
        let sink = EgressNotificationSink::new(sender, "c");

        assert_eq!(sink.display(&notification()), Err(DeliveryError::QueueClosed));
    }

    #[test]
    fn test_best_effort_senders_drop_when_full() {
        let (sender, mut rx) = create_egress_channel(1, "s".to_string());
        let update = LocationUpdate::new(crate::domain::types::Coordinate::new(1.0, 2.0), false);

        sender.send_location(&update);
        sender.send_location(&update);

        assert!(matches!(rx.try_recv(), Ok(EgressMessage::Location(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_transition_is_counted() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_egress_channel(1, "s".to_string());
        let sender = sender.with_metrics(metrics.clone());
        let region = Region::new("home", 52.0, 4.0, 100.0, WatchSet::BOTH).unwrap();
        let transition = Transition::new(&region, GeoEvent::Entry, None);

        sender.send_transition(&transition);
        sender.send_transition(&transition);

        assert!(matches!(rx.try_recv(), Ok(EgressMessage::Transition(_))));
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.report().egress_dropped, 1);
    }

    #[test]
    fn test_refused_notification_is_counted_as_egress_drop() {
        let metrics = Arc::new(Metrics::new());
        let (sender, rx) = create_egress_channel(1, "s".to_string());
        drop(rx);
        let sink = EgressNotificationSink::new(sender.with_metrics(metrics.clone()), "c");

        assert_eq!(sink.display(&notification()), Err(DeliveryError::QueueClosed));
        assert_eq!(metrics.report().egress_dropped, 1);
    }
}
