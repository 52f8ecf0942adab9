//! Listener registry.
//!
//! Reminders persist only a [`ListenerRef`]: a handler key plus parameters.
//! Hosts register the handlers for those keys at process start, so a reminder
//! armed by one process can be delivered by another.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use waymark_geo::Place;

use crate::{DayOfWeek, ListenerRef, TimeOfDay};

/// The context a reminder fired with.
#[derive(Debug, Clone, PartialEq)]
pub enum ReminderTrigger {
    Time {
        day: DayOfWeek,
        time: TimeOfDay,
    },
    Location {
        day: DayOfWeek,
        place: Place,
    },
    TimeLocation {
        day: DayOfWeek,
        time: TimeOfDay,
        place: Place,
    },
}

/// A fired reminder, as handed to a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderEvent {
    pub id: String,
    /// Parameters stored with the reminder's [`ListenerRef`].
    pub params: serde_json::Value,
    pub trigger: ReminderTrigger,
}

/// Application logic run when a reminder fires.
#[async_trait]
pub trait ReminderListener: Send + Sync {
    async fn on_reminder(&self, event: &ReminderEvent);
}

/// Handlers keyed by the listener key reminders persist.
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    handlers: HashMap<String, Arc<dyn ReminderListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler with the same key.
    pub fn register(&mut self, key: impl Into<String>, handler: Arc<dyn ReminderListener>) {
        self.handlers.insert(key.into(), handler);
    }

    /// Builder-style [`ListenerRegistry::register`].
    pub fn with(mut self, key: impl Into<String>, handler: Arc<dyn ReminderListener>) -> Self {
        self.register(key, handler);
        self
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ReminderListener>> {
        self.handlers.get(key).cloned()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Build the event for `listener` and invoke its handler.
    ///
    /// Returns false when no handler is registered under the listener's key.
    pub(crate) async fn invoke(
        &self,
        id: &str,
        listener: &ListenerRef,
        trigger: ReminderTrigger,
    ) -> bool {
        let Some(handler) = self.get(&listener.key) else {
            return false;
        };

        let event = ReminderEvent {
            id: id.to_string(),
            params: listener.params.clone(),
            trigger,
        };
        handler.on_reminder(&event).await;
        true
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
