use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Enum representing different SDK events
#[derive(Clone, Debug, PartialEq)]
pub enum SdkEvent {
    /// A quote fetch finished with a fresh batch
    QuotesUpdated { quote_count: usize },

    /// The service accepted a confirmation and funding can start
    PaymentConfirmed {
        payment_id: String,
        funding_page_url: String,
    },

    /// A confirmation was rejected or could not be sent
    ConfirmFailed { error: String },

    /// The observed status of the tracked payment changed
    PaymentStatusChanged { payment_id: String, status: String },

    /// The tracked payment has been funded. Emitted once per session.
    PaymentFunded { payment_id: String },

    /// A recovery scan finished
    RecoveryScanCompleted {
        /// Number of recoverable balances found
        recoverable: usize,
        /// Payments left out because their balance lookup failed
        skipped: usize,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Called when an event occurs
    fn on_event(&self, event: &SdkEvent);
}

/// Event emitter for SDK events
pub struct EventEmitter {
    listeners: Mutex<HashMap<String, Box<dyn EventListener>>>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    /// Creates a new event emitter
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a listener to the event emitter
    ///
    /// # Returns
    ///
    /// A unique ID for the listener
    pub fn add_listener(&self, listener: Box<dyn EventListener>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.insert(id.clone(), listener);
        id
    }

    /// Removes a listener from the event emitter
    ///
    /// # Returns
    ///
    /// `true` if the listener was found and removed, `false` otherwise
    pub fn remove_listener(&self, id: &str) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.remove(id).is_some()
    }

    /// Emits an event to all listeners
    pub fn emit(&self, event: &SdkEvent) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.values() {
            listener.on_event(event);
        }
    }
}
