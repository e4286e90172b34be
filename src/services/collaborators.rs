/*!
 * Outside collaborators the orchestrator hands work to
 */

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use crate::entities::order;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Hands a paid order to the order pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
    async fn submit(&self, order: &order::Model) -> Result<(), ServiceError>;
}

/// Default submitter: publishes `Event::OrderSubmitted` for downstream consumers
#[derive(Debug, Clone)]
pub struct EventOrderSubmitter {
    events: EventSender,
}

impl EventOrderSubmitter {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

#[async_trait]
impl OrderSubmitter for EventOrderSubmitter {
    async fn submit(&self, order: &order::Model) -> Result<(), ServiceError> {
        self.events
            .send(Event::OrderSubmitted {
                order_no: order.order_no.clone(),
                timestamp: Utc::now(),
            })
            .await
            .map_err(ServiceError::InternalError)
    }
}

/// Session-scoped checkout form data. Keys are the caller's checkout session id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckoutSessionStore: Send + Sync {
    /// Drop submitted billing and payment form values
    async fn clear_forms(&self, session_id: &str);

    /// Drop custom fields attached during checkout
    async fn clear_custom_fields(&self, session_id: &str);
}

#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub forms: serde_json::Map<String, serde_json::Value>,
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
}

/// In-process session store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionData>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_form(&self, session_id: &str, key: &str, value: serde_json::Value) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .forms
            .insert(key.to_string(), value);
    }

    pub fn put_custom_field(&self, session_id: &str, key: &str, value: serde_json::Value) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .custom_fields
            .insert(key.to_string(), value);
    }

    pub fn get(&self, session_id: &str) -> Option<SessionData> {
        self.sessions.get(session_id).map(|s| s.clone())
    }
}

#[async_trait]
impl CheckoutSessionStore for InMemorySessionStore {
    async fn clear_forms(&self, session_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.forms.clear();
        }
        debug!(session_id, "Checkout forms cleared");
    }

    async fn clear_custom_fields(&self, session_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.custom_fields.clear();
        }
        debug!(session_id, "Checkout custom fields cleared");
    }
}
