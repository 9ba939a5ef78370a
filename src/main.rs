//! Geofence gateway - region entry/exit tracker
//!
//! Turns noisy membership reports from a geofence monitor into deduplicated
//! entry/exit transitions and routes each one to an in-process callback
//! (foreground) or a user-visible notification (background).
//!
//! Module structure:
//! - `domain/` - Core types (Region, Transition, TrackerInput)
//! - `io/` - External interfaces (MQTT in/out, overrides file, Prometheus)
//! - `services/` - Tracking logic (Tracker, detector, composer, dispatch)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use geofence_gateway::domain::RegisterMode;
use geofence_gateway::infra::{Config, Metrics};
use geofence_gateway::io::{
    create_egress_channel, EgressNotificationSink, MqttPublisher, TomlOverrideStore,
};
use geofence_gateway::services::{
    LogSink, MemoryOverrideStore, NotificationSink, OverrideStore, Tracker,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence gateway - region transition tracking and dispatch
#[derive(Parser, Debug)]
#[command(name = "geofence-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(git_hash = env!("GIT_HASH"), "geofence_gateway_starting");

    let config = Config::load_from_path(&args.config);
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        reports_topic = %config.mqtt_reports_topic(),
        initial_lifecycle = %config.initial_lifecycle(),
        reset_state_on_register = %config.reset_state_on_register(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Egress channel and publisher (if enabled)
    let egress_sender = if config.egress_enabled() {
        let (egress_sender, egress_rx) = create_egress_channel(1000, config.site_id().to_string());
        let egress_sender = egress_sender.with_metrics(metrics.clone());

        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });

        let metrics_egress = egress_sender.clone();
        let metrics_for_egress = metrics.clone();
        let egress_interval = config.egress_metrics_interval_secs().max(1);
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(egress_interval);
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                metrics_egress.send_metrics(metrics_for_egress.report());
            }
        });

        Some(egress_sender)
    } else {
        None
    };

    let notifier: Arc<dyn NotificationSink> = match &egress_sender {
        Some(sender) => Arc::new(EgressNotificationSink::new(
            sender.clone(),
            config.notification_channel_id(),
        )),
        None => Arc::new(LogSink),
    };

    let overrides: Arc<dyn OverrideStore> = match config.overrides_file() {
        Some(path) => Arc::new(
            TomlOverrideStore::load(path)
                .with_context(|| format!("loading notification overrides from {path}"))?,
        ),
        None => Arc::new(MemoryOverrideStore::new()),
    };

    let (lifecycle_tx, lifecycle_rx) = watch::channel(config.initial_lifecycle());

    let tracker =
        Arc::new(Tracker::new(&config, overrides, notifier, lifecycle_rx, metrics.clone()));

    let register_mode = RegisterMode::from_reset(config.reset_state_on_register());
    for region in config.regions() {
        tracker.register_with(region, register_mode);
    }
    info!(regions = tracker.region_count(), "startup_regions_registered");

    // Foreground callbacks and raw locations are forwarded to egress for the host app
    if let Some(sender) = &egress_sender {
        let transitions = sender.clone();
        tracker
            .subscribe_transitions(move |transition| transitions.send_transition(transition))
            .detach();
        let locations = sender.clone();
        tracker.subscribe_locations(move |update| locations.send_location(update)).detach();
    }

    // Input channel (bounded for backpressure)
    let (input_tx, input_rx) = mpsc::channel(config.event_queue_size());

    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = geofence_gateway::io::mqtt::start_mqtt_client(
            &mqtt_config,
            input_tx,
            lifecycle_tx,
            mqtt_metrics,
            mqtt_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "mqtt_client_error");
        }
    });

    // Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = geofence_gateway::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Periodic metrics log
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    info!("tracker_started");
    tracker.run(input_rx, shutdown_rx).await;

    info!("geofence_gateway_shutdown_complete");
    Ok(())
}
