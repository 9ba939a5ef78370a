//! Configuration loading from TOML files
//!
//! The binary selects the file via `--config <path>`, the CONFIG_FILE
//! environment variable, or `config/dev.toml`. A missing or invalid file
//! falls back to defaults.

use crate::domain::region::{Region, RegionSpec};
use crate::domain::types::LifecycleState;
use crate::services::composer::DEFAULT_KEY_PREFIX;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_reports_topic")]
    pub reports_topic: String,
    #[serde(default = "default_commands_topic")]
    pub commands_topic: String,
    #[serde(default = "default_lifecycle_topic")]
    pub lifecycle_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_client_id() -> String {
    "geofence-gateway".to_string()
}

fn default_reports_topic() -> String {
    "geofence/reports".to_string()
}

fn default_commands_topic() -> String {
    "geofence/commands".to_string()
}

fn default_lifecycle_topic() -> String {
    "geofence/lifecycle".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Capacity of the bounded input queue
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
    /// Re-registering a known region resets its state to unknown
    #[serde(default)]
    pub reset_state_on_register: bool,
    #[serde(default)]
    pub initial_lifecycle: LifecycleState,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            event_queue_size: default_event_queue_size(),
            reset_state_on_register: false,
            initial_lifecycle: LifecycleState::default(),
        }
    }
}

fn default_event_queue_size() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Override lookup key prefix (`{prefix}.{region_id}`)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Flat TOML file of override strings (optional)
    #[serde(default)]
    pub overrides_file: Option<String>,
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            overrides_file: None,
            channel_id: default_channel_id(),
        }
    }
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_channel_id() -> String {
    "high_importance_channel".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// Enable MQTT egress publishing
    #[serde(default = "default_egress_enabled")]
    pub enabled: bool,
    /// Topic for foreground transitions (QoS 1)
    #[serde(default = "default_transitions_topic")]
    pub transitions_topic: String,
    /// Topic for background notifications (QoS 1)
    #[serde(default = "default_notifications_topic")]
    pub notifications_topic: String,
    /// Topic for periodic metrics snapshots (QoS 0)
    #[serde(default = "default_metrics_topic")]
    pub metrics_topic: String,
    /// Topic for raw location updates (QoS 0)
    #[serde(default = "default_locations_topic")]
    pub locations_topic: String,
    /// Interval for publishing metrics (seconds)
    #[serde(default = "default_metrics_publish_interval")]
    pub metrics_publish_interval_secs: u64,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_egress_enabled(),
            transitions_topic: default_transitions_topic(),
            notifications_topic: default_notifications_topic(),
            metrics_topic: default_metrics_topic(),
            locations_topic: default_locations_topic(),
            metrics_publish_interval_secs: default_metrics_publish_interval(),
        }
    }
}

fn default_egress_enabled() -> bool {
    true
}

fn default_transitions_topic() -> String {
    "geofence/transitions".to_string()
}

fn default_notifications_topic() -> String {
    "geofence/notifications".to_string()
}

fn default_metrics_topic() -> String {
    "geofence/metrics".to_string()
}

fn default_locations_topic() -> String {
    "geofence/locations".to_string()
}

fn default_metrics_publish_interval() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Metrics log interval (seconds)
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Unique site or device identifier
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "geofence".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Regions registered at startup
    #[serde(default)]
    pub regions: Vec<RegionSpec>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_client_id: String,
    mqtt_reports_topic: String,
    mqtt_commands_topic: String,
    mqtt_lifecycle_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    event_queue_size: usize,
    reset_state_on_register: bool,
    initial_lifecycle: LifecycleState,
    notification_key_prefix: String,
    overrides_file: Option<String>,
    notification_channel_id: String,
    egress_enabled: bool,
    egress_transitions_topic: String,
    egress_notifications_topic: String,
    egress_metrics_topic: String,
    egress_locations_topic: String,
    egress_metrics_interval_secs: u64,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    regions: Vec<RegionSpec>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let tracker = TrackerConfig::default();
        let notifications = NotificationsConfig::default();
        let egress = EgressConfig::default();
        let metrics = MetricsConfig::default();
        Self {
            site_id: default_site_id(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: default_client_id(),
            mqtt_reports_topic: default_reports_topic(),
            mqtt_commands_topic: default_commands_topic(),
            mqtt_lifecycle_topic: default_lifecycle_topic(),
            mqtt_username: None,
            mqtt_password: None,
            event_queue_size: tracker.event_queue_size,
            reset_state_on_register: tracker.reset_state_on_register,
            initial_lifecycle: tracker.initial_lifecycle,
            notification_key_prefix: notifications.key_prefix,
            overrides_file: notifications.overrides_file,
            notification_channel_id: notifications.channel_id,
            egress_enabled: egress.enabled,
            egress_transitions_topic: egress.transitions_topic,
            egress_notifications_topic: egress.notifications_topic,
            egress_metrics_topic: egress.metrics_topic,
            egress_locations_topic: egress.locations_topic,
            egress_metrics_interval_secs: egress.metrics_publish_interval_secs,
            metrics_interval_secs: metrics.interval_secs,
            prometheus_port: metrics.prometheus_port,
            regions: Vec::new(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_client_id: toml_config.mqtt.client_id,
            mqtt_reports_topic: toml_config.mqtt.reports_topic,
            mqtt_commands_topic: toml_config.mqtt.commands_topic,
            mqtt_lifecycle_topic: toml_config.mqtt.lifecycle_topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            event_queue_size: toml_config.tracker.event_queue_size.max(1),
            reset_state_on_register: toml_config.tracker.reset_state_on_register,
            initial_lifecycle: toml_config.tracker.initial_lifecycle,
            notification_key_prefix: toml_config.notifications.key_prefix,
            overrides_file: toml_config.notifications.overrides_file,
            notification_channel_id: toml_config.notifications.channel_id,
            egress_enabled: toml_config.egress.enabled,
            egress_transitions_topic: toml_config.egress.transitions_topic,
            egress_notifications_topic: toml_config.egress.notifications_topic,
            egress_metrics_topic: toml_config.egress.metrics_topic,
            egress_locations_topic: toml_config.egress.locations_topic,
            egress_metrics_interval_secs: toml_config.egress.metrics_publish_interval_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            regions: toml_config.regions,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Startup regions that pass validation; invalid entries are skipped
    pub fn regions(&self) -> Vec<Region> {
        self.regions
            .iter()
            .cloned()
            .filter_map(|spec| {
                let id = spec.id.clone();
                match Region::try_from(spec) {
                    Ok(region) => Some(region),
                    Err(e) => {
                        warn!(region_id = %id, error = %e, "config_region_invalid");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_reports_topic(&self) -> &str {
        &self.mqtt_reports_topic
    }

    pub fn mqtt_commands_topic(&self) -> &str {
        &self.mqtt_commands_topic
    }

    pub fn mqtt_lifecycle_topic(&self) -> &str {
        &self.mqtt_lifecycle_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn event_queue_size(&self) -> usize {
        self.event_queue_size
    }

    pub fn reset_state_on_register(&self) -> bool {
        self.reset_state_on_register
    }

    pub fn initial_lifecycle(&self) -> LifecycleState {
        self.initial_lifecycle
    }

    pub fn notification_key_prefix(&self) -> &str {
        &self.notification_key_prefix
    }

    pub fn overrides_file(&self) -> Option<&str> {
        self.overrides_file.as_deref()
    }

    pub fn notification_channel_id(&self) -> &str {
        &self.notification_channel_id
    }

    // Egress getters
    pub fn egress_enabled(&self) -> bool {
        self.egress_enabled
    }

    pub fn egress_transitions_topic(&self) -> &str {
        &self.egress_transitions_topic
    }

    pub fn egress_notifications_topic(&self) -> &str {
        &self.egress_notifications_topic
    }

    pub fn egress_metrics_topic(&self) -> &str {
        &self.egress_metrics_topic
    }

    pub fn egress_locations_topic(&self) -> &str {
        &self.egress_locations_topic
    }

    pub fn egress_metrics_interval_secs(&self) -> u64 {
        self.egress_metrics_interval_secs
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    #[cfg(test)]
    pub fn with_reset_state_on_register(mut self, reset: bool) -> Self {
        self.reset_state_on_register = reset;
        self
    }

    #[cfg(test)]
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.notification_key_prefix = prefix.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::WatchSet;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.mqtt_reports_topic(), "geofence/reports");
        assert_eq!(config.event_queue_size(), 1000);
        assert!(!config.reset_state_on_register());
        assert_eq!(config.initial_lifecycle(), LifecycleState::Background);
        assert_eq!(config.notification_key_prefix(), "geofence.notification.message");
        assert_eq!(config.notification_channel_id(), "high_importance_channel");
        assert!(config.regions().is_empty());
    }

    #[test]
    fn test_minimal_toml_uses_section_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [mqtt]
            host = "broker"
            port = 1884
            "#,
        )
        .unwrap();

        assert_eq!(toml_config.mqtt.client_id, "geofence-gateway");
        assert_eq!(toml_config.tracker.event_queue_size, 1000);
        assert!(toml_config.egress.enabled);
        assert_eq!(toml_config.egress.transitions_topic, "geofence/transitions");
        assert_eq!(toml_config.metrics.prometheus_port, 9090);
        assert!(toml_config.regions.is_empty());
    }

    #[test]
    fn test_region_events_default_to_both() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [mqtt]
            host = "broker"
            port = 1883

            [[regions]]
            id = "home"
            latitude = 52.37
            longitude = 4.89
            radius = 100.0
            "#,
        )
        .unwrap();

        assert_eq!(toml_config.regions[0].events, WatchSet::BOTH);
    }
}
