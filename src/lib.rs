//! Payment Orchestrator Library
//!
//! Checkout orders, the processor's two-call authorization protocol, 3-D Secure
//! continuations and webhook notifications, converging on one terminal state per order.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

#[cfg(test)]
mod test_support;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use handlers::CheckoutView;
use services::challenge_router::RoutingPolicy;
use services::checkout::CheckoutService;
use services::collaborators::{CheckoutSessionStore, OrderSubmitter};
use services::donations::DonationService;
use services::gateway::AuthorizationGateway;
use services::notifications::{NotificationAuth, NotificationProcessor};
use services::order_finalizer::OrderFinalizer;
use services::pending_payments::PendingPaymentStore;

/// Pluggable pieces the orchestrator talks to
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn AuthorizationGateway>,
    pub pending: Arc<dyn PendingPaymentStore>,
    pub submitter: Arc<dyn OrderSubmitter>,
    pub sessions: Arc<dyn CheckoutSessionStore>,
    pub view: Arc<dyn CheckoutView>,
}

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub checkout: CheckoutService,
    pub donations: DonationService,
    pub notifications: NotificationProcessor,
    pub view: Arc<dyn CheckoutView>,
}

impl AppState {
    /// Wire the services around one shared finalizer
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        collaborators: Collaborators,
    ) -> Result<Self, errors::ServiceError> {
        let finalizer = OrderFinalizer::new(
            db.clone(),
            collaborators.pending.clone(),
            collaborators.submitter,
            event_sender.clone(),
        );
        let checkout = CheckoutService::new(
            db.clone(),
            collaborators.gateway.clone(),
            collaborators.pending,
            finalizer.clone(),
            collaborators.sessions,
            RoutingPolicy::new(config.deferred_settlement_methods()),
            event_sender.clone(),
        );
        let donations = DonationService::new(
            db.clone(),
            collaborators.gateway,
            config.donation_account.clone(),
            event_sender.clone(),
        );
        let auth = NotificationAuth::from_config(
            config.notification_hmac_key.as_deref(),
            config.notification_username.as_deref(),
            config.notification_password.as_deref(),
        )?;
        let notifications =
            NotificationProcessor::new(db.clone(), finalizer, auth, event_sender.clone());

        Ok(Self {
            db,
            config,
            event_sender,
            checkout,
            donations,
            notifications,
            view: collaborators.view,
        })
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!response.success);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    let checkout = Router::new()
        .route("/orders", post(handlers::checkout::create_order))
        .route("/payment-methods", get(handlers::checkout::payment_methods))
        .route("/payments", post(handlers::checkout::initiate_payment))
        .route("/payments/details", post(handlers::checkout::payment_details))
        .route(
            "/return",
            get(handlers::checkout::redirect_return).post(handlers::checkout::redirect_return_form),
        )
        .route("/3ds2", post(handlers::checkout::three_ds2))
        .route("/3ds", post(handlers::checkout::three_ds_legacy));

    Router::new()
        .nest("/checkout", checkout)
        .route(
            "/notifications",
            post(handlers::notifications::receive_notification),
        )
        .route("/donations", post(handlers::donations::donate))
        .route("/orders/:order_no", get(handlers::orders::get_order))
}

/// Every route the service exposes, without transport layers
pub fn app_router() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { "payment-orchestrator up" }))
        .nest("/health", health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
}

pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventSender};
    pub use crate::services::checkout::CheckoutResult;
    pub use crate::{ApiResponse, ApiResult, AppState, Collaborators};
}
