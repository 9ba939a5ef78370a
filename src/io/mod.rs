//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `event_source` - Inbound input stream consumed by the tracker
//! - `wire` - JSON payloads on the inbound MQTT topics
//! - `mqtt` - MQTT client for reports, commands and lifecycle changes
//! - `egress_channel` - Typed channel for MQTT egress messages
//! - `mqtt_egress` - MQTT publisher for egress messages
//! - `overrides` - TOML-backed notification override store
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod egress_channel;
pub mod event_source;
pub mod mqtt;
pub mod mqtt_egress;
pub mod overrides;
pub mod prometheus;
pub mod wire;

// Re-export commonly used types
pub use egress_channel::{
    create_egress_channel, EgressMessage, EgressNotificationSink, EgressSender,
};
pub use event_source::EventSource;
pub use mqtt_egress::MqttPublisher;
pub use overrides::TomlOverrideStore;
pub use wire::WireError;
