//! RELAY: Engine Event Bus
//!
//! Topic-keyed event routing between engine components. An explicit bus
//! object is passed by reference into anything that publishes or
//! subscribes; there is no process-global listener registry.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Topics published by the execution engine
pub mod topics {
    pub const OPERATION_STARTED: &str = "operation/started";
    pub const OPERATION_STATE: &str = "operation/state";
    pub const OPERATION_COMPLETED: &str = "operation/completed";
    pub const LINK_DISPATCHED: &str = "link/dispatched";
    pub const LINK_COMPLETED: &str = "link/completed";
    pub const FACT_LEARNED: &str = "fact/learned";
}

/// One engine event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Routing topic, e.g. "link/completed"
    pub topic: String,
    /// Event payload
    pub data: serde_json::Value,
    /// Publish timestamp
    pub timestamp: DateTime<Local>,
}

impl Event {
    /// Create a new event
    pub fn new(topic: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            topic: topic.into(),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
            timestamp: Local::now(),
        }
    }
}

/// Channel types for the relay
pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Engine event bus
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: EventSender,
}

impl EventBus {
    /// Initialize the relay with its receiving end
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: tx }, rx)
    }

    /// Publish an event; dropped silently once the receiver is gone
    pub fn publish(&self, event: Event) {
        trace!("◆ RELAY: {}", event.topic);
        if self.sender.send(event).is_err() {
            warn!("◆ RELAY OFFLINE: event dropped");
        }
    }

    /// Build and publish in one call
    pub fn emit(&self, topic: impl Into<String>, data: impl Serialize) {
        self.publish(Event::new(topic, data));
    }
}

/// Routes events to topic handlers
pub struct EventDispatcher {
    receiver: EventReceiver,
    handlers: HashMap<String, Box<dyn Fn(Event) + Send + Sync>>,
}

impl EventDispatcher {
    /// Initialize dispatcher
    pub fn new(receiver: EventReceiver) -> Self {
        Self {
            receiver,
            handlers: HashMap::new(),
        }
    }

    /// Register a topic handler
    pub fn on_topic<F>(&mut self, topic: impl Into<String>, handler: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.handlers.insert(topic.into(), Box::new(handler));
    }

    /// Execute dispatch loop; events with no handler are logged and dropped
    pub async fn run(mut self) {
        debug!("◆ RELAY DISPATCHER ONLINE");

        while let Some(event) = self.receiver.recv().await {
            if let Some(handler) = self.handlers.get(&event.topic) {
                handler(event);
            } else {
                trace!("◆ RELAY: no handler for {}", event.topic);
            }
        }

        debug!("◆ RELAY DISPATCHER OFFLINE");
    }
}
