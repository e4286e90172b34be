/*!
 * Processor gateway
 *
 * Stateless adapter over the processor's Checkout API. Responses are
 * normalized into `AuthorizationOutcome`; nothing here touches local state.
 */

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use crate::config::AppConfig;
use crate::models::{Amount, AuthorizationOutcome};

const API_KEY_HEADER: &str = "X-API-Key";
const RETURN_PATH: &str = "/api/v1/checkout/return";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The processor answered 4xx; retrying the same request will not help
    #[error("processor rejected the request ({status}): {message}")]
    InvalidRequest { status: u16, message: String },

    /// Timeout, connection failure or 5xx
    #[error("processor unreachable: {0}")]
    Transport(String),

    #[error("unreadable processor response: {0}")]
    Decode(String),
}

/// Initial authorization call. `state_data` is the client component payload
/// (payment method, browser info, billing address) forwarded as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub reference: String,
    pub amount: Amount,
    pub country_code: Option<String>,
    pub state_data: Map<String, Value>,
}

/// Continuation call carrying the shopper's challenge or redirect result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsRequest {
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentMethodsRequest {
    pub amount: Amount,
    pub country_code: Option<String>,
    pub shopper_locale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    pub amount: Amount,
    pub reference: String,
    pub donation_original_psp_reference: String,
    pub donation_account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation_token: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationGateway: Send + Sync {
    async fn initiate(&self, request: PaymentRequest)
        -> Result<AuthorizationOutcome, GatewayError>;

    async fn submit_details(
        &self,
        request: DetailsRequest,
    ) -> Result<AuthorizationOutcome, GatewayError>;

    async fn payment_methods(&self, request: PaymentMethodsRequest) -> Result<Value, GatewayError>;

    async fn donate(&self, request: DonationRequest) -> Result<Value, GatewayError>;
}

/// A call that never produced an answer is an `Error` outcome. Only a
/// processor rejection stays an error for the caller to handle.
pub fn absorb_transport_failure(
    result: Result<AuthorizationOutcome, GatewayError>,
) -> Result<AuthorizationOutcome, GatewayError> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(err @ GatewayError::InvalidRequest { .. }) => Err(err),
        Err(err) => {
            warn!(error = %err, "Treating failed processor call as an Error outcome");
            Ok(AuthorizationOutcome::error(err.to_string()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub api_key: String,
    pub merchant_account: String,
    pub public_base_url: String,
    pub platform_name: String,
    pub timeout: Duration,
}

impl From<&AppConfig> for GatewaySettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            base_url: cfg.processor_base_url.clone(),
            api_key: cfg.processor_api_key.clone(),
            merchant_account: cfg.merchant_account.clone(),
            public_base_url: cfg.public_base_url.clone(),
            platform_name: cfg.external_platform_name.clone(),
            timeout: cfg.processor_timeout(),
        }
    }
}

/// `reqwest` client for an Adyen-style Checkout API
#[derive(Clone)]
pub struct AdyenCheckoutClient {
    client: Client,
    settings: GatewaySettings,
}

impl AdyenCheckoutClient {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        HeaderValue::from_str(&settings.api_key)
            .map_err(|e| GatewayError::Transport(format!("invalid API key header: {}", e)))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self::with_client(settings, client))
    }

    /// Build from an existing client (useful for testing)
    pub fn with_client(mut settings: GatewaySettings, client: Client) -> Self {
        settings.base_url = settings.base_url.trim_end_matches('/').to_string();
        Self { client, settings }
    }

    fn return_url(&self, reference: &str) -> Result<String, GatewayError> {
        let base = self.settings.public_base_url.trim_end_matches('/');
        let mut url = url::Url::parse(&format!("{}{}", base, RETURN_PATH))
            .map_err(|e| GatewayError::Transport(format!("invalid public base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("merchantReference", reference);
        Ok(url.into())
    }

    fn application_info(&self) -> Value {
        json!({
            "externalPlatform": {
                "name": self.settings.platform_name,
                "version": env!("CARGO_PKG_VERSION"),
                "integrator": "component",
            },
            "merchantApplication": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    async fn post<T: DeserializeOwned>(&self, path: &'static str, body: &Value) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.settings.base_url, path);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.settings.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                counter!("orchestrator_gateway.requests", 1, "endpoint" => path, "outcome" => "transport_error");
                let kind = if e.is_timeout() { "timeout" } else { "connection" };
                GatewayError::Transport(format!("{} failure calling {}: {}", kind, path, e))
            })?;

        let status = response.status();
        histogram!(
            "orchestrator_gateway.request_duration_seconds",
            started.elapsed().as_secs_f64(),
            "endpoint" => path
        );
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(format!("reading {} response: {}", path, e)))?;

        if status.is_client_error() {
            counter!("orchestrator_gateway.requests", 1, "endpoint" => path, "outcome" => "rejected");
            return Err(GatewayError::InvalidRequest {
                status: status.as_u16(),
                message: rejection_message(status, &bytes),
            });
        }
        if !status.is_success() {
            counter!("orchestrator_gateway.requests", 1, "endpoint" => path, "outcome" => "server_error");
            return Err(GatewayError::Transport(format!(
                "{} answered with status {}",
                path, status
            )));
        }

        counter!("orchestrator_gateway.requests", 1, "endpoint" => path, "outcome" => "ok");
        debug!(endpoint = path, status = status.as_u16(), "Processor call completed");
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(format!("{}: {}", path, e)))
    }
}

fn rejection_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request rejected")
                .to_string()
        })
}

#[async_trait]
impl AuthorizationGateway for AdyenCheckoutClient {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initiate(&self, request: PaymentRequest) -> Result<AuthorizationOutcome, GatewayError> {
        let mut body = request.state_data;
        body.insert("reference".into(), Value::String(request.reference.clone()));
        body.insert("amount".into(), json!(request.amount));
        body.insert(
            "merchantAccount".into(),
            Value::String(self.settings.merchant_account.clone()),
        );
        body.insert(
            "returnUrl".into(),
            Value::String(self.return_url(&request.reference)?),
        );
        body.insert("channel".into(), Value::String("Web".into()));
        body.insert("applicationInfo".into(), self.application_info());
        if let Some(country_code) = request.country_code {
            body.insert("countryCode".into(), Value::String(country_code));
        }

        self.post("/payments", &Value::Object(body)).await
    }

    #[instrument(skip(self, request))]
    async fn submit_details(
        &self,
        request: DetailsRequest,
    ) -> Result<AuthorizationOutcome, GatewayError> {
        let body =
            serde_json::to_value(&request).map_err(|e| GatewayError::Decode(e.to_string()))?;
        self.post("/payments/details", &body).await
    }

    #[instrument(skip(self, request))]
    async fn payment_methods(&self, request: PaymentMethodsRequest) -> Result<Value, GatewayError> {
        let mut body = json!({
            "merchantAccount": self.settings.merchant_account,
            "amount": request.amount,
            "channel": "Web",
        });
        if let Some(country_code) = request.country_code {
            body["countryCode"] = Value::String(country_code);
        }
        if let Some(locale) = request.shopper_locale {
            body["shopperLocale"] = Value::String(locale);
        }
        self.post("/paymentMethods", &body).await
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn donate(&self, request: DonationRequest) -> Result<Value, GatewayError> {
        let mut body =
            serde_json::to_value(&request).map_err(|e| GatewayError::Decode(e.to_string()))?;
        body["merchantAccount"] = Value::String(self.settings.merchant_account.clone());
        self.post("/donations", &body).await
    }
}
