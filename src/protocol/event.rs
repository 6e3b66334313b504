//! Event message types.
//!
//! Events are unsolicited notifications pushed by the remote end. They
//! carry no `id`.
//!
//! # Format
//!
//! ```json
//! {
//!   "type": "event",
//!   "method": "module.eventName",
//!   "params": { ... }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Event
// ============================================================================

/// An event notification from remote end to local end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name in `module.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Returns the module name from the method.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let event = Event::new("log.entryAdded", json!({}));
    /// assert_eq!(event.module(), "log");
    /// ```
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split_once('.').map(|(_, name)| name).unwrap_or_default()
    }

    /// Deserializes the params into a typed payload.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.params)?)
    }
}

// ============================================================================
// EventFilter
// ============================================================================

/// Selects which events a listener receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Every event of one module, e.g. `network`.
    Module(String),
    /// One exact method, e.g. `log.entryAdded`.
    Method(String),
}

impl EventFilter {
    /// Returns `true` if `event` passes this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::All => true,
            Self::Module(module) => event.module() == module,
            Self::Method(method) => event.method == *method,
        }
    }
}

impl From<&str> for EventFilter {
    /// `"*"` selects everything, a dotted name selects one method, a bare
    /// name selects a module.
    fn from(filter: &str) -> Self {
        if filter == "*" {
            Self::All
        } else if filter.contains('.') {
            Self::Method(filter.to_string())
        } else {
            Self::Module(filter.to_string())
        }
    }
}

impl From<String> for EventFilter {
    fn from(filter: String) -> Self {
        Self::from(filter.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
