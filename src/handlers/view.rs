use axum::{
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::entities::order::{self, PaymentStatus};
use crate::services::challenge_router::RedirectAction;
use crate::services::checkout::CheckoutResult;
use crate::ApiResponse;

/// Kind of page the shopper ends up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Confirmed,
    Declined,
    Challenge,
    Redirect,
    Rejected,
    Cancelled,
}

/// JSON body returned to the checkout component
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDecision {
    pub outcome: DecisionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    /// Processor action the component must perform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Value>,
    /// Where the shopper continues when no action is pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckoutDecision {
    fn new(outcome: DecisionKind) -> Self {
        Self {
            outcome,
            order_no: None,
            payment_status: None,
            action: None,
            redirect: None,
            continue_url: None,
            message: None,
        }
    }

    fn for_order(outcome: DecisionKind, order: &order::Model) -> Self {
        Self {
            order_no: Some(order.order_no.clone()),
            payment_status: Some(order.payment_status),
            ..Self::new(outcome)
        }
    }

    /// Rejected results point the component at the landing page
    pub fn from_result(result: &CheckoutResult, landing_url: &str) -> Self {
        match result {
            CheckoutResult::Confirmed { order } => Self::for_order(DecisionKind::Confirmed, order),
            CheckoutResult::Declined { order } => Self::for_order(DecisionKind::Declined, order),
            CheckoutResult::Challenge { order_no, action } => Self {
                order_no: Some(order_no.clone()),
                action: Some(action.clone()),
                ..Self::new(DecisionKind::Challenge)
            },
            CheckoutResult::Redirect { order_no, redirect } => Self {
                order_no: Some(order_no.clone()),
                redirect: serde_json::to_value(redirect).ok(),
                ..Self::new(DecisionKind::Redirect)
            },
            CheckoutResult::Rejected { reason } => Self {
                continue_url: Some(landing_url.to_string()),
                message: Some(reason.clone()),
                ..Self::new(DecisionKind::Rejected)
            },
            CheckoutResult::Cancelled => Self::new(DecisionKind::Cancelled),
        }
    }
}

/// Renders the shopper-facing result of a browser checkout step
pub trait CheckoutView: Send + Sync {
    fn confirmation(&self, order: &order::Model) -> Response;

    /// Every failed order renders the same decline
    fn declined(&self, order: &order::Model) -> Response;

    fn challenge(&self, order_no: &str, action: &Value) -> Response;

    fn redirect(&self, order_no: &str, redirect: &RedirectAction) -> Response;

    /// Generic landing page; carries no order state
    fn landing(&self) -> Response;

    fn cancelled(&self) -> Response {
        self.landing()
    }

    fn render(&self, result: CheckoutResult) -> Response {
        match result {
            CheckoutResult::Confirmed { order } => self.confirmation(&order),
            CheckoutResult::Declined { order } => self.declined(&order),
            CheckoutResult::Challenge { order_no, action } => self.challenge(&order_no, &action),
            CheckoutResult::Redirect { order_no, redirect } => self.redirect(&order_no, &redirect),
            CheckoutResult::Rejected { reason } => {
                tracing::warn!(%reason, "Sending shopper to the landing page");
                self.landing()
            }
            CheckoutResult::Cancelled => self.cancelled(),
        }
    }
}

/// JSON bodies for pages, `303 See Other` for navigation
#[derive(Debug, Clone)]
pub struct JsonCheckoutView {
    landing_url: String,
}

impl JsonCheckoutView {
    pub fn new(landing_url: impl Into<String>) -> Self {
        Self {
            landing_url: landing_url.into(),
        }
    }

    fn see_other(location: &str) -> Response {
        match HeaderValue::from_str(location) {
            Ok(value) => (StatusCode::SEE_OTHER, [(LOCATION, value)]).into_response(),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }

    fn json(decision: CheckoutDecision) -> Response {
        (StatusCode::OK, Json(ApiResponse::success(decision))).into_response()
    }
}

impl CheckoutView for JsonCheckoutView {
    fn confirmation(&self, order: &order::Model) -> Response {
        Self::json(CheckoutDecision::for_order(DecisionKind::Confirmed, order))
    }

    fn declined(&self, order: &order::Model) -> Response {
        Self::json(CheckoutDecision::for_order(DecisionKind::Declined, order))
    }

    fn challenge(&self, order_no: &str, action: &Value) -> Response {
        Self::json(CheckoutDecision::from_result(
            &CheckoutResult::Challenge {
                order_no: order_no.to_string(),
                action: action.clone(),
            },
            &self.landing_url,
        ))
    }

    fn redirect(&self, order_no: &str, redirect: &RedirectAction) -> Response {
        if redirect.method.eq_ignore_ascii_case("GET") && redirect.data.is_none() {
            return Self::see_other(&redirect.url);
        }
        // POST redirects need a form the browser submits itself
        Self::json(CheckoutDecision::from_result(
            &CheckoutResult::Redirect {
                order_no: order_no.to_string(),
                redirect: redirect.clone(),
            },
            &self.landing_url,
        ))
    }

    fn landing(&self) -> Response {
        Self::see_other(&self.landing_url)
    }
}
