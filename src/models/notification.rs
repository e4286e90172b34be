use serde::{Deserialize, Serialize};

use super::Amount;

/// Body of a standard notification delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(default)]
    pub live: Option<String>,
    pub notification_items: Vec<NotificationItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationItem {
    #[serde(rename = "NotificationRequestItem")]
    pub request_item: NotificationEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub psp_reference: String,
    #[serde(default)]
    pub original_reference: Option<String>,
    pub merchant_account_code: String,
    pub merchant_reference: String,
    pub event_code: String,
    /// `"true"` or `"false"` as sent
    pub success: String,
    pub amount: Amount,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub additional_data: Option<NotificationAdditionalData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationAdditionalData {
    #[serde(rename = "hmacSignature", default)]
    pub hmac_signature: Option<String>,
}

pub const EVENT_AUTHORISATION: &str = "AUTHORISATION";
pub const EVENT_OFFER_CLOSED: &str = "OFFER_CLOSED";

impl NotificationEvent {
    pub fn is_success(&self) -> bool {
        self.success.eq_ignore_ascii_case("true")
    }

    pub fn signature(&self) -> Option<&str> {
        self.additional_data
            .as_ref()
            .and_then(|d| d.hmac_signature.as_deref())
    }

    /// Colon-joined fields covered by the item signature
    pub fn signing_payload(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}:{}",
            self.psp_reference,
            self.original_reference.as_deref().unwrap_or_default(),
            self.merchant_account_code,
            self.merchant_reference,
            self.amount.value,
            self.amount.currency,
            self.event_code,
            self.success,
        )
    }
}
