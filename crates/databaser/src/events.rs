//! Events: a name-keyed listener registry for the execution pipeline and
//! the lifecycle hooks of entities.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::entity::Entity;
use crate::error::EventError;

/// Fired before a statement runs; payload `{table, query, bindings}`
pub const EXECUTE: &str = "dotapp.databaser.execute";
/// Fired after a statement succeeded; payload `{table, cached, execution_data}`
pub const EXECUTE_SUCCESS: &str = "dotapp.databaser.execute.success";
/// Fired after a statement failed; payload `{table, error, errno}`
pub const EXECUTE_ERROR: &str = "dotapp.databaser.execute.error";

pub type Listener = Arc<dyn Fn(&JsonValue) + Send + Sync>;

/// Fire-and-observe event registry shared by everything built from one
/// application context
#[derive(Default)]
pub struct EventDispatcher {
    listeners: DashMap<String, Vec<Listener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `name`
    pub fn listen<F>(&self, name: &str, callback: F)
    where
        F: Fn(&JsonValue) + Send + Sync + 'static,
    {
        self.listeners
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Call every listener of `name` in registration order
    pub fn trigger(&self, name: &str, payload: &JsonValue) {
        // Listeners may register further listeners, so the map guard must
        // be released before any of them runs
        let listeners: Vec<Listener> = match self.listeners.get(name) {
            Some(entry) => entry.value().clone(),
            None => return,
        };
        tracing::trace!(event = name, listeners = listeners.len(), "triggering event");
        for listener in listeners {
            listener(payload);
        }
    }

    pub fn has_listeners(&self, name: &str) -> bool {
        self.listeners.get(name).map_or(false, |l| !l.is_empty())
    }

    pub fn forget(&self, name: &str) {
        self.listeners.remove(name);
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("events", &self.listeners.len())
            .finish()
    }
}

/// Lifecycle points of [`Entity::save`] and [`Entity::delete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityEvent {
    Creating,
    Created,
    Updating,
    Updated,
    Saving,
    Saved,
    Deleting,
    Deleted,
}

impl EntityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityEvent::Creating => "creating",
            EntityEvent::Created => "created",
            EntityEvent::Updating => "updating",
            EntityEvent::Updated => "updated",
            EntityEvent::Saving => "saving",
            EntityEvent::Saved => "saved",
            EntityEvent::Deleting => "deleting",
            EntityEvent::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EntityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity hook; an `Err` aborts the operation that fired it
pub type EntityHandler = Arc<dyn Fn(&mut Entity) -> Result<(), EventError> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_trigger_calls_listeners_in_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            dispatcher.listen(EXECUTE, move |payload| {
                seen.lock().push(format!("{}:{}", tag, payload["table"]));
            });
        }

        dispatcher.trigger(EXECUTE, &serde_json::json!({"table": "users"}));
        assert_eq!(*seen.lock(), vec!["first:\"users\"", "second:\"users\""]);
    }

    #[test]
    fn test_listener_may_register_listeners() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let count = Arc::new(AtomicUsize::new(0));

        let inner = dispatcher.clone();
        let counter = count.clone();
        dispatcher.listen(EXECUTE_SUCCESS, move |_| {
            let counter = counter.clone();
            inner.listen(EXECUTE_ERROR, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        dispatcher.trigger(EXECUTE_SUCCESS, &JsonValue::Null);
        dispatcher.trigger(EXECUTE_ERROR, &JsonValue::Null);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!dispatcher.has_listeners("unknown"));
    }
}
