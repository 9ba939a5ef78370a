//! MQTT client for receiving monitor reports, commands and lifecycle changes
//!
//! Three topics are subscribed:
//! - reports: membership states, crossings, monitor errors, locations
//! - commands: register / unregister / unregister_all
//! - lifecycle: foreground / background / inactive
//!
//! Reports and commands go to the tracker's input queue; lifecycle changes
//! update the `watch` channel read by the dispatch router.

use crate::domain::input::TrackerInput;
use crate::domain::types::LifecycleState;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::wire::{parse_command, parse_lifecycle, parse_report, WireError};
use anyhow::Context;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Which inbound stream a topic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Reports,
    Commands,
    Lifecycle,
    Other,
}

struct Topics {
    reports: String,
    commands: String,
    lifecycle: String,
}

impl Topics {
    fn from_config(config: &Config) -> Self {
        Self {
            reports: config.mqtt_reports_topic().to_string(),
            commands: config.mqtt_commands_topic().to_string(),
            lifecycle: config.mqtt_lifecycle_topic().to_string(),
        }
    }

    fn route(&self, topic: &str) -> Route {
        if topic == self.reports {
            Route::Reports
        } else if topic == self.commands {
            Route::Commands
        } else if topic == self.lifecycle {
            Route::Lifecycle
        } else {
            Route::Other
        }
    }
}

/// Outcome of handling one publish packet
#[derive(Debug, PartialEq, Eq)]
enum Handled {
    Queued,
    Lifecycle(LifecycleState),
    Malformed,
    Dropped,
    Closed,
    Ignored,
}

/// Decode one payload and forward it
fn handle_publish(
    route: Route,
    payload: &[u8],
    input_tx: &mpsc::Sender<TrackerInput>,
    lifecycle_tx: &watch::Sender<LifecycleState>,
) -> Handled {
    let parsed: Result<TrackerInput, WireError> = match route {
        Route::Reports => parse_report(payload),
        Route::Commands => parse_command(payload),
        Route::Lifecycle => {
            return match parse_lifecycle(payload) {
                Ok(state) => {
                    lifecycle_tx.send_replace(state);
                    Handled::Lifecycle(state)
                }
                Err(e) => {
                    debug!(error = %e, "lifecycle_payload_malformed");
                    Handled::Malformed
                }
            };
        }
        Route::Other => return Handled::Ignored,
    };

    let input = match parsed {
        Ok(input) => input,
        Err(e) => {
            debug!(error = %e, route = ?route, "payload_malformed");
            return Handled::Malformed;
        }
    };

    debug!(input = input.as_str(), "input_received");
    match input_tx.try_send(input) {
        Ok(()) => Handled::Queued,
        Err(TrySendError::Full(_)) => Handled::Dropped,
        Err(TrySendError::Closed(_)) => Handled::Closed,
    }
}

/// Start the MQTT client and forward decoded inputs to the tracker
///
/// Inputs are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped inputs are counted in metrics and logged (rate-limited).
pub async fn start_mqtt_client(
    config: &Config,
    input_tx: mpsc::Sender<TrackerInput>,
    lifecycle_tx: watch::Sender<LifecycleState>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut mqttoptions =
        MqttOptions::new(config.mqtt_client_id(), config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let topics = Topics::from_config(config);
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    for topic in [&topics.reports, &topics.commands, &topics.lifecycle] {
        client
            .subscribe(topic.as_str(), QoS::AtLeastOnce)
            .await
            .with_context(|| format!("subscribing to {topic}"))?;
    }

    info!(
        reports = %topics.reports,
        commands = %topics.commands,
        lifecycle = %topics.lifecycle,
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_subscribed"
    );

    // Drop warnings: at most one per second
    let mut last_drop_warn: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let route = topics.route(&publish.topic);
                        match handle_publish(route, &publish.payload, &input_tx, &lifecycle_tx) {
                            Handled::Queued | Handled::Ignored => {}
                            Handled::Lifecycle(state) => {
                                info!(lifecycle = %state, "lifecycle_changed");
                            }
                            Handled::Malformed => metrics.record_input_malformed(),
                            Handled::Dropped => {
                                metrics.record_input_dropped();
                                let quiet = last_drop_warn
                                    .map_or(true, |at| at.elapsed() > Duration::from_secs(1));
                                if quiet {
                                    warn!("mqtt_input_dropped: channel full");
                                    last_drop_warn = Some(Instant::now());
                                }
                            }
                            Handled::Closed => {
                                warn!("input_channel_closed");
                                return Ok(());
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
