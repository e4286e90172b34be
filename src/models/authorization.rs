use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Monetary amount in minor units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Amount {
    pub value: i64,
    pub currency: String,
}

/// Result codes the processor reports for a payment attempt
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumIter,
)]
pub enum ResultCode {
    Authorised,
    Pending,
    Received,
    PresentToShopper,
    IdentifyShopper,
    ChallengeShopper,
    RedirectShopper,
    Refused,
    Cancelled,
    Error,
    #[serde(other)]
    Unknown,
}

/// Normalized answer to `/payments` or `/payments/details`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationOutcome {
    pub result_code: ResultCode,
    #[serde(default)]
    pub action: Option<Value>,
    #[serde(default)]
    pub psp_reference: Option<String>,
    #[serde(default)]
    pub merchant_reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_payment_method")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_data: Option<String>,
    #[serde(default)]
    pub refusal_reason: Option<String>,
    #[serde(default)]
    pub additional_data: Option<Value>,
}

impl AuthorizationOutcome {
    /// Outcome used in place of a response that never arrived
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            result_code: ResultCode::Error,
            action: None,
            psp_reference: None,
            merchant_reference: None,
            payment_method: None,
            payment_data: None,
            refusal_reason: Some(reason.into()),
            additional_data: None,
        }
    }

    /// An action counts only when it is a non-empty object
    pub fn has_action(&self) -> bool {
        match &self.action {
            Some(Value::Object(map)) => !map.is_empty(),
            _ => false,
        }
    }

    /// Continuation token, top-level or carried by the action
    pub fn continuation_token(&self) -> Option<String> {
        self.payment_data.clone().or_else(|| {
            self.action
                .as_ref()
                .and_then(|a| a.get("paymentData"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    }

    /// `MD` posted through a legacy 3-D Secure redirect form
    pub fn secondary_token(&self) -> Option<String> {
        self.action
            .as_ref()
            .and_then(|a| a.get("data"))
            .and_then(|d| d.get("MD"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Accepts `"scheme"` or `{"type": "scheme", ...}`; anything else is `None`
fn lenient_payment_method<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Object(map)) => map
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}
