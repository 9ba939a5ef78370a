//! Notification text for transitions
//!
//! Default titles and bodies are fixed templates. A user-supplied override
//! stored under `{key_prefix}.{region_id}` replaces the body verbatim.

use crate::domain::transition::{Notification, Transition};
use crate::domain::types::GeoEvent;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_KEY_PREFIX: &str = "geofence.notification.message";

const ENTRY_TITLE: &str = "Entering region";
const EXIT_TITLE: &str = "Exit from region";

/// Read-only key/value lookup for per-region message overrides
///
/// Absence is not an error.
pub trait OverrideStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory override store
#[derive(Debug, Default)]
pub struct MemoryOverrideStore {
    entries: RwLock<FxHashMap<String, String>>,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: FxHashMap<String, String> =
            entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { entries: RwLock::new(entries) }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl OverrideStore for MemoryOverrideStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }
}

/// Builds the user-facing message for a transition
pub struct NotificationComposer {
    store: Arc<dyn OverrideStore>,
    key_prefix: String,
}

impl NotificationComposer {
    pub fn new(store: Arc<dyn OverrideStore>, key_prefix: impl Into<String>) -> Self {
        Self { store, key_prefix: key_prefix.into() }
    }

    /// Override lookup key for a region
    pub fn override_key(&self, region_id: &str) -> String {
        format!("{}.{}", self.key_prefix, region_id)
    }

    pub fn compose(&self, transition: &Transition) -> Notification {
        let region_id = &transition.region_id;
        let (title, default_body) = match transition.direction {
            GeoEvent::Entry => (ENTRY_TITLE, format!("You are entering {region_id}")),
            GeoEvent::Exit => (EXIT_TITLE, format!("You have exited {region_id}")),
        };

        let key = self.override_key(region_id.as_str());
        let body = match self.store.get(&key) {
            Some(text) => {
                debug!(region_id = %region_id, key = %key, "notification_override_used");
                text
            }
            None => default_body,
        };

        Notification { region_id: region_id.clone(), title: title.to_string(), body }
    }
}
