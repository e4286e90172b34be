pub mod checkout;
pub mod donations;
pub mod notifications;
pub mod orders;
pub mod view;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub use view::{CheckoutDecision, CheckoutView, JsonCheckoutView};

/// Header carrying the shopper's checkout session id
pub const CHECKOUT_SESSION_HEADER: &str = "x-checkout-session";

/// Per-request checkout context. Session state is passed explicitly to services.
#[derive(Debug, Clone, Default)]
pub struct CheckoutContext {
    pub session: Option<String>,
}

impl CheckoutContext {
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CheckoutContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .headers
            .get(CHECKOUT_SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(Self { session })
    }
}
