//! Services - business logic and state management
//!
//! This module contains the core tracking services:
//! - `tracker` - Central input orchestrator
//! - `registry` - Monitored regions and their membership state
//! - `detector` - Dedup and watch-set filtering of raw reports
//! - `composer` - Notification text with per-region overrides
//! - `dispatch` - Lifecycle-based routing to callbacks or notifications
//! - `subscribers` - Revocable callback subscriptions

pub mod composer;
pub mod detector;
pub mod dispatch;
pub mod registry;
pub mod subscribers;
pub mod tracker;

// Re-export commonly used types
pub use composer::{MemoryOverrideStore, NotificationComposer, OverrideStore};
pub use detector::{Detection, TransitionDetector};
pub use dispatch::{DeliveryError, DispatchOutcome, DispatchRouter, LogSink, NotificationSink};
pub use registry::RegionRegistry;
pub use subscribers::{Subscribers, Subscription};
pub use tracker::Tracker;
