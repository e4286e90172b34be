/*!
 * Inbound processor notifications
 *
 * Authenticates a delivery, then applies each item through the finalizer.
 * The delivery is acknowledged only after every item's transaction committed.
 */

use std::sync::Arc;

use base64::{engine::general_purpose, Engine};
use hmac::{Hmac, Mac};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use metrics::counter;
use sea_orm::{DatabaseConnection, EntityTrait};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::entities::order;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::notification::{EVENT_AUTHORISATION, EVENT_OFFER_CLOSED};
use crate::models::{AuthorizationOutcome, NotificationEvent, NotificationRequest, ResultCode};
use crate::services::order_finalizer::OrderFinalizer;

type HmacSha256 = Hmac<Sha256>;

pub const ACCEPTED_BODY: &str = "[accepted]";
pub const REJECTED_BODY: &str = "[rejected]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Unauthenticated,
    Malformed,
    UnknownOrder,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Accepted,
    Rejected { kind: RejectionKind, reason: String },
}

impl Ack {
    fn rejected(kind: RejectionKind, reason: impl Into<String>) -> Self {
        Ack::Rejected {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Ack::Accepted)
    }
}

/// Credentials the processor presents on the notification endpoint
#[derive(Clone, Default)]
pub struct NotificationAuth {
    /// Raw HMAC key (already hex-decoded)
    pub hmac_key: Option<Vec<u8>>,
    pub basic: Option<(String, String)>,
}

impl NotificationAuth {
    pub fn from_config(
        hmac_key_hex: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let hmac_key = hmac_key_hex
            .map(|key| {
                hex::decode(key.trim()).map_err(|e| {
                    ServiceError::ValidationError(format!("notification HMAC key is not hex: {}", e))
                })
            })
            .transpose()?;
        let basic = match (username, password) {
            (Some(u), Some(p)) => Some((u.to_string(), p.to_string())),
            _ => None,
        };
        Ok(Self { hmac_key, basic })
    }
}

/// Base64 HMAC-SHA256 of an item's signing payload
pub fn sign_notification(key: &[u8], event: &NotificationEvent) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ServiceError::InternalError(format!("invalid HMAC key: {}", e)))?;
    mac.update(event.signing_payload().as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn signature_matches(key: &[u8], event: &NotificationEvent) -> bool {
    let Some(signature) = event.signature() else {
        return false;
    };
    let Ok(expected) = general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(event.signing_payload().as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Compares digests so timing does not reveal how much of the header matched
fn basic_auth_matches(headers: &HeaderMap, username: &str, password: &str) -> bool {
    let Some(presented) = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return false;
    };
    let expected = general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    Sha256::digest(presented.trim().as_bytes()) == Sha256::digest(expected.as_bytes())
}

#[derive(Clone)]
pub struct NotificationProcessor {
    db: Arc<DatabaseConnection>,
    finalizer: OrderFinalizer,
    auth: NotificationAuth,
    events: EventSender,
}

impl NotificationProcessor {
    pub fn new(
        db: Arc<DatabaseConnection>,
        finalizer: OrderFinalizer,
        auth: NotificationAuth,
        events: EventSender,
    ) -> Self {
        if auth.hmac_key.is_none() {
            warn!("Notification HMAC key not configured; item signatures are not verified");
        }
        Self {
            db,
            finalizer,
            auth,
            events,
        }
    }

    #[instrument(skip_all, fields(body_len = body.len()))]
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Ack {
        let ack = self.process(headers, body).await;
        match &ack {
            Ack::Accepted => {
                counter!("orchestrator_notifications.acks", 1, "outcome" => "accepted");
            }
            Ack::Rejected { kind, reason } => {
                counter!("orchestrator_notifications.acks", 1, "outcome" => "rejected");
                warn!(?kind, reason = %reason, "Notification rejected");
                self.events
                    .send_or_log(Event::NotificationRejected {
                        reason: reason.clone(),
                    })
                    .await;
            }
        }
        ack
    }

    async fn process(&self, headers: &HeaderMap, body: &[u8]) -> Ack {
        if let Some((username, password)) = &self.auth.basic {
            if !basic_auth_matches(headers, username, password) {
                return Ack::rejected(RejectionKind::Unauthenticated, "basic credentials mismatch");
            }
        }

        let request: NotificationRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                return Ack::rejected(RejectionKind::Malformed, format!("unreadable body: {}", e))
            }
        };

        // Every item is authenticated before any of them is applied
        if let Some(key) = &self.auth.hmac_key {
            for item in &request.notification_items {
                let event = &item.request_item;
                if !signature_matches(key, event) {
                    return Ack::rejected(
                        RejectionKind::Unauthenticated,
                        format!("invalid signature for {}", event.psp_reference),
                    );
                }
            }
        }

        for item in &request.notification_items {
            if let Some(rejection) = self.apply(&item.request_item).await {
                return rejection;
            }
        }
        Ack::Accepted
    }

    async fn apply(&self, event: &NotificationEvent) -> Option<Ack> {
        let order_no = event.merchant_reference.as_str();
        let existing = match order::Entity::find_by_id(order_no.to_string())
            .one(&*self.db)
            .await
        {
            Ok(Some(order)) => order,
            Ok(None) => {
                return Some(Ack::rejected(
                    RejectionKind::UnknownOrder,
                    format!("unknown order {}", order_no),
                ))
            }
            Err(e) => return Some(Ack::rejected(RejectionKind::Internal, e.to_string())),
        };

        let result = match event.event_code.as_str() {
            EVENT_AUTHORISATION if event.is_success() => {
                let outcome = outcome_from_event(event);
                self.finalizer
                    .finalize_success(order_no, None, &outcome)
                    .await
            }
            EVENT_AUTHORISATION | EVENT_OFFER_CLOSED => {
                self.finalizer.finalize_failure(order_no, None).await
            }
            other => {
                info!(order_no, event_code = other, "Notification acknowledged without action");
                return None;
            }
        };

        match result {
            Ok(finalized) => {
                if !finalized.transitioned && finalized.order.is_terminal() {
                    info!(
                        order_no,
                        event_code = %event.event_code,
                        status = %existing.payment_status,
                        "Notification for an already finalized order"
                    );
                }
                None
            }
            Err(ServiceError::NotFound(msg)) => {
                Some(Ack::rejected(RejectionKind::UnknownOrder, msg))
            }
            Err(e) => Some(Ack::rejected(RejectionKind::Internal, e.to_string())),
        }
    }
}

fn outcome_from_event(event: &NotificationEvent) -> AuthorizationOutcome {
    AuthorizationOutcome {
        result_code: ResultCode::Authorised,
        action: None,
        psp_reference: Some(event.psp_reference.clone()),
        merchant_reference: Some(event.merchant_reference.clone()),
        payment_method: event.payment_method.clone(),
        payment_data: None,
        refusal_reason: event.reason.clone(),
        additional_data: None,
    }
}
