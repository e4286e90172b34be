/*!
 * Challenge routing
 *
 * Pure mapping from a processor outcome to what the orchestrator does next.
 * A non-empty action always wins over the result code.
 */

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::models::{AuthorizationOutcome, ResultCode};

pub const DEFAULT_DEFERRED_SETTLEMENT_METHOD: &str = "alipay_hk";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Method types for which `Received` does not mean the shopper paid.
    /// Matched as lower-case substrings of the outcome's method type.
    pub deferred_settlement_methods: Vec<String>,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            deferred_settlement_methods: vec![DEFAULT_DEFERRED_SETTLEMENT_METHOD.to_string()],
        }
    }
}

impl RoutingPolicy {
    pub fn new(deferred_settlement_methods: Vec<String>) -> Self {
        Self {
            deferred_settlement_methods: deferred_settlement_methods
                .into_iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
        }
    }

    fn settles_later(&self, payment_method: Option<&str>) -> bool {
        let Some(method) = payment_method else {
            return false;
        };
        let method = method.to_ascii_lowercase();
        self.deferred_settlement_methods
            .iter()
            .any(|deferred| method.contains(deferred.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectAction {
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Refused,
    Error,
    DeferredSettlementIncomplete,
    UnsupportedResultCode(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Refused => f.write_str("refused"),
            FailureReason::Error => f.write_str("error"),
            FailureReason::DeferredSettlementIncomplete => {
                f.write_str("deferred_settlement_incomplete")
            }
            FailureReason::UnsupportedResultCode(code) => {
                write!(f, "unsupported_result_code:{}", code)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success { psp_reference: Option<String> },
    Failure { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Redirect(RedirectAction),
    Challenge {
        action: Value,
        payment_data: Option<String>,
    },
    Finalize(Verdict),
}

impl Decision {
    pub fn awaits_shopper(&self) -> bool {
        !matches!(self, Decision::Finalize(_))
    }
}

pub fn route(outcome: &AuthorizationOutcome, policy: &RoutingPolicy) -> Decision {
    if outcome.has_action() {
        if let Some(redirect) = outcome.action.as_ref().and_then(as_redirect) {
            return Decision::Redirect(redirect);
        }
        return Decision::Challenge {
            action: outcome.action.clone().unwrap_or(Value::Null),
            payment_data: outcome.continuation_token(),
        };
    }

    let verdict = match outcome.result_code {
        ResultCode::Received if policy.settles_later(outcome.payment_method.as_deref()) => {
            Verdict::Failure {
                reason: FailureReason::DeferredSettlementIncomplete,
            }
        }
        ResultCode::Authorised
        | ResultCode::Pending
        | ResultCode::Received
        | ResultCode::PresentToShopper => Verdict::Success {
            psp_reference: outcome.psp_reference.clone(),
        },
        ResultCode::Refused | ResultCode::Cancelled => Verdict::Failure {
            reason: FailureReason::Refused,
        },
        ResultCode::Error => Verdict::Failure {
            reason: FailureReason::Error,
        },
        code @ (ResultCode::IdentifyShopper
        | ResultCode::ChallengeShopper
        | ResultCode::RedirectShopper
        | ResultCode::Unknown) => Verdict::Failure {
            reason: FailureReason::UnsupportedResultCode(code.to_string()),
        },
    };
    Decision::Finalize(verdict)
}

fn as_redirect(action: &Value) -> Option<RedirectAction> {
    if action.get("type").and_then(Value::as_str) != Some("redirect") {
        return None;
    }
    let url = action.get("url").and_then(Value::as_str)?;
    Some(RedirectAction {
        url: url.to_string(),
        method: action
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase(),
        data: action.get("data").cloned(),
    })
}
