//! MQTT publisher for egress events
//!
//! Publishes tracker output to MQTT topics for downstream consumers:
//! - geofence/transitions - Foreground transitions (QoS 1)
//! - geofence/notifications - Background notifications (QoS 1)
//! - geofence/locations - Raw location updates (QoS 0)
//! - geofence/metrics - Periodic metrics snapshots (QoS 0)

use crate::infra::config::Config;
use crate::io::egress_channel::EgressMessage;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Where each egress kind is published and with which delivery guarantee
#[derive(Debug, Clone)]
struct Route {
    topic: String,
    qos: QoS,
}

#[derive(Debug, Clone)]
struct EgressRoutes {
    transitions: Route,
    notifications: Route,
    locations: Route,
    metrics: Route,
}

impl EgressRoutes {
    fn from_config(config: &Config) -> Self {
        // User-visible events are at-least-once; telemetry is fire-and-forget
        let route = |topic: &str, qos| Route { topic: topic.to_string(), qos };
        Self {
            transitions: route(config.egress_transitions_topic(), QoS::AtLeastOnce),
            notifications: route(config.egress_notifications_topic(), QoS::AtLeastOnce),
            locations: route(config.egress_locations_topic(), QoS::AtMostOnce),
            metrics: route(config.egress_metrics_topic(), QoS::AtMostOnce),
        }
    }

    /// Serialize a message and pick its route
    fn encode<'a>(&'a self, msg: &EgressMessage) -> Result<(&'a Route, String), serde_json::Error> {
        Ok(match msg {
            EgressMessage::Transition(p) => (&self.transitions, serde_json::to_string(p)?),
            EgressMessage::Notification(p) => (&self.notifications, serde_json::to_string(p)?),
            EgressMessage::Location(p) => (&self.locations, serde_json::to_string(p)?),
            EgressMessage::Metrics(p) => (&self.metrics, serde_json::to_string(p)?),
        })
    }
}

/// MQTT publisher actor
///
/// Owns the egress receiver and its own broker connection.
pub struct MqttPublisher {
    client: AsyncClient,
    eventloop: EventLoop,
    rx: mpsc::Receiver<EgressMessage>,
    routes: EgressRoutes,
}

impl MqttPublisher {
    pub fn new(config: &Config, rx: mpsc::Receiver<EgressMessage>) -> Self {
        let client_id = format!("{}-egress-{}", config.mqtt_client_id(), std::process::id());
        let mut options = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, 100);
        Self { client, eventloop, rx, routes: EgressRoutes::from_config(config) }
    }

    /// Run until shutdown, then flush whatever is still queued
    ///
    /// The broker connection is polled on its own task so a full client
    /// request queue never stalls the flush.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self { client, eventloop, mut rx, routes } = self;
        info!(
            transitions = %routes.transitions.topic,
            notifications = %routes.notifications.topic,
            locations = %routes.locations.topic,
            metrics = %routes.metrics.topic,
            "mqtt_egress_started"
        );
        tokio::spawn(drive_connection(eventloop));

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                msg = rx.recv() => match msg {
                    Some(msg) => publish(&client, &routes, msg).await,
                    None => break,
                },
            }
        }

        let mut flushed = 0usize;
        while let Ok(msg) = rx.try_recv() {
            publish(&client, &routes, msg).await;
            flushed += 1;
        }
        info!(flushed = flushed, "mqtt_egress_shutdown");
    }
}

async fn drive_connection(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("mqtt_egress_connected"),
            Ok(Event::Incoming(Packet::PubAck(_))) => debug!("mqtt_egress_puback"),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "mqtt_egress_error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn publish(client: &AsyncClient, routes: &EgressRoutes, msg: EgressMessage) {
    let kind = msg.kind();
    let (route, json) = match routes.encode(&msg) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(error = %e, kind = kind, "mqtt_egress_serialize_failed");
            return;
        }
    };
    let published = client.publish(route.topic.as_str(), route.qos, false, json.into_bytes()).await;
    if let Err(e) = published {
        if matches!(route.qos, QoS::AtMostOnce) {
            debug!(error = %e, kind = kind, "mqtt_egress_publish_failed");
        } else {
            error!(error = %e, kind = kind, "mqtt_egress_publish_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::egress_channel::create_egress_channel;

    #[test]
    fn test_routes_follow_config_topics() {
        let routes = EgressRoutes::from_config(&Config::default());
        assert_eq!(routes.transitions.topic, "geofence/transitions");
        assert!(matches!(routes.notifications.qos, QoS::AtLeastOnce));
        assert!(matches!(routes.locations.qos, QoS::AtMostOnce));
    }

    #[tokio::test]
    async fn test_metrics_encode_to_metrics_topic() {
        let (tx, mut rx) = create_egress_channel(4, "phone-1".to_string());
        tx.send_metrics(crate::infra::Metrics::new().report());
        let msg = rx.recv().await.unwrap();

        let routes = EgressRoutes::from_config(&Config::default());
        let (route, json) = routes.encode(&msg).unwrap();
        assert_eq!(route.topic, "geofence/metrics");
        assert!(json.contains("\"site\":\"phone-1\""));
    }
}
