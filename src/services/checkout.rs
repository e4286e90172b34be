/*!
 * Checkout orchestration
 *
 * Entry points of the two-call authorization protocol. Every continuation
 * (component completion, redirect return, 3-D Secure 2, legacy 3-D Secure)
 * funnels into `continue_authorization`. Gateway calls are never made while
 * a transaction is open.
 */

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::TransactionBoundary;
use crate::entities::order::{self, ExportStatus, PaymentStatus};
use crate::entities::payment_instrument::{self, COMPONENT_PAYMENT_METHOD};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Amount, AuthorizationOutcome};
use crate::services::challenge_router::{route, Decision, RedirectAction, RoutingPolicy, Verdict};
use crate::services::collaborators::CheckoutSessionStore;
use crate::services::gateway::{
    absorb_transport_failure, AuthorizationGateway, DetailsRequest, GatewayError, PaymentMethodsRequest,
    PaymentRequest,
};
use crate::services::order_finalizer::{Finalized, OrderFinalizer};
use crate::services::pending_payments::{PendingPayment, PendingPaymentStore};

/// What the caller should show the shopper
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutResult {
    Confirmed { order: order::Model },
    Declined { order: order::Model },
    Challenge { order_no: String, action: Value },
    Redirect { order_no: String, redirect: RedirectAction },
    /// Integrity or transport failure; the shopper goes to the landing page
    Rejected { reason: String },
    /// The shopper abandoned the component; nothing changed
    Cancelled,
}

impl CheckoutResult {
    fn rejected(reason: impl Into<String>) -> Self {
        CheckoutResult::Rejected {
            reason: reason.into(),
        }
    }

    /// Result for an order that already reached a terminal state
    fn for_order(order: order::Model) -> Self {
        match order.payment_status {
            PaymentStatus::Paid => CheckoutResult::Confirmed { order },
            PaymentStatus::Failed => CheckoutResult::Declined { order },
            PaymentStatus::Created => CheckoutResult::rejected(format!(
                "order {} has no payment result yet",
                order.order_no
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_no: Option<String>,
    pub amount: Amount,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodDescription {
    pub brand_code: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodsView {
    pub payment_methods: Value,
    pub amount: Amount,
    pub country_code: Option<String>,
    pub descriptions: Vec<PaymentMethodDescription>,
}

/// Input of `continue_authorization`
#[derive(Debug, Clone, Default)]
struct Continuation {
    details: Value,
    /// Continuation token sent by the client; the stored one is used otherwise
    payment_data: Option<String>,
    /// Posted `MD` that must match the stored secondary token
    md: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn AuthorizationGateway>,
    pending: Arc<dyn PendingPaymentStore>,
    finalizer: OrderFinalizer,
    sessions: Arc<dyn CheckoutSessionStore>,
    policy: RoutingPolicy,
    events: EventSender,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn AuthorizationGateway>,
        pending: Arc<dyn PendingPaymentStore>,
        finalizer: OrderFinalizer,
        sessions: Arc<dyn CheckoutSessionStore>,
        policy: RoutingPolicy,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            pending,
            finalizer,
            sessions,
            policy,
            events,
        }
    }

    /// Create an order from a priced basket total
    #[instrument(skip(self, new_order))]
    pub async fn create_order(&self, new_order: NewOrder) -> Result<order::Model, ServiceError> {
        if new_order.amount.value <= 0 {
            return Err(ServiceError::ValidationError(
                "amount must be a positive number of minor units".into(),
            ));
        }
        let order_no = new_order
            .order_no
            .unwrap_or_else(|| format!("ORD-{}", Uuid::new_v4().simple()).to_uppercase());

        if order::Entity::find_by_id(order_no.clone())
            .one(&*self.db)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!("order {} already exists", order_no)));
        }

        let now = Utc::now();
        let created = order::ActiveModel {
            order_no: Set(order_no.clone()),
            payment_status: Set(PaymentStatus::Created),
            export_status: Set(ExportStatus::NotExported),
            amount_value: Set(new_order.amount.value),
            currency: Set(new_order.amount.currency.to_uppercase()),
            country_code: Set(new_order.country_code.map(|c| c.to_uppercase())),
            psp_reference: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(order_no = %created.order_no, amount = created.amount_value, "Order created");
        self.events
            .send_or_log(Event::OrderCreated {
                order_no: created.order_no.clone(),
            })
            .await;
        Ok(created)
    }

    pub async fn find_order(&self, order_no: &str) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_no.to_string())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_no)))
    }

    /// Payment methods available for an order's amount and country
    #[instrument(skip(self))]
    pub async fn payment_methods(
        &self,
        order_no: &str,
        shopper_locale: Option<String>,
    ) -> Result<PaymentMethodsView, ServiceError> {
        let order = self.find_order(order_no).await?;
        let amount = Amount {
            value: order.amount_value,
            currency: order.currency.clone(),
        };
        let response = self
            .gateway
            .payment_methods(PaymentMethodsRequest {
                amount: amount.clone(),
                country_code: order.country_code.clone(),
                shopper_locale,
            })
            .await?;

        let payment_methods = response
            .get("paymentMethods")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let descriptions = payment_methods
            .as_array()
            .map(|methods| {
                methods
                    .iter()
                    .filter_map(|m| {
                        Some(PaymentMethodDescription {
                            brand_code: m.get("type")?.as_str()?.to_string(),
                            description: m.get("name")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(PaymentMethodsView {
            payment_methods,
            amount,
            country_code: order.country_code,
            descriptions,
        })
    }

    /// Component-direct initiate: the first `/payments` call for an order
    #[instrument(skip(self, state_data))]
    pub async fn initiate(
        &self,
        session: Option<&str>,
        order_no: &str,
        state_data: Value,
        cancel_transaction: bool,
    ) -> Result<CheckoutResult, ServiceError> {
        counter!("orchestrator_checkout.entries", 1, "entry" => "initiate");
        if cancel_transaction {
            info!(order_no, "Shopper cancelled the component payment");
            return Ok(CheckoutResult::Cancelled);
        }

        let state_data = parse_state_data(state_data)?;
        let payment_method_type = state_data
            .get("paymentMethod")
            .and_then(|m| m.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let boundary = TransactionBoundary::begin(&self.db, "initiate_payment").await?;
        let prepared = self
            .prepare_instrument(boundary.txn(), order_no, payment_method_type.clone())
            .await;
        let (order, instrument_id) = match boundary.settle(prepared).await? {
            Prepared::Ready { order, instrument_id } => (order, instrument_id),
            Prepared::AlreadyFinal(order) => return Ok(CheckoutResult::for_order(order)),
        };

        let request = PaymentRequest {
            reference: order.order_no.clone(),
            amount: Amount {
                value: order.amount_value,
                currency: order.currency.clone(),
            },
            country_code: order.country_code.clone(),
            state_data,
        };
        let outcome = match absorb_transport_failure(self.gateway.initiate(request).await) {
            Ok(outcome) => outcome,
            Err(e) => return self.reject_request(order_no, instrument_id, e).await,
        };

        self.apply_outcome(session, order_no, instrument_id, payment_method_type, outcome)
            .await
    }

    /// Component-direct completion: `stateData` carries `details` and `paymentData`
    #[instrument(skip(self, state_data))]
    pub async fn complete_component(
        &self,
        session: Option<&str>,
        merchant_reference: &str,
        state_data: Value,
    ) -> Result<CheckoutResult, ServiceError> {
        counter!("orchestrator_checkout.entries", 1, "entry" => "component_details");
        let state_data = parse_state_data(state_data)?;
        let details = state_data.get("details").cloned();
        let payment_data = state_data
            .get("paymentData")
            .and_then(Value::as_str)
            .map(str::to_string);

        let (Some(details), Some(payment_data)) = (details, payment_data) else {
            warn!(
                merchant_reference,
                "Component completion without details and paymentData; failing order"
            );
            return self.fail_current(session, merchant_reference).await;
        };

        self.continue_authorization(
            session,
            merchant_reference,
            Continuation {
                details,
                payment_data: Some(payment_data),
                md: None,
            },
        )
        .await
    }

    /// Shopper returns from a redirect with `redirectResult` or `payload`
    #[instrument(skip(self, redirect_result, payload))]
    pub async fn redirect_return(
        &self,
        session: Option<&str>,
        merchant_reference: &str,
        redirect_result: Option<String>,
        payload: Option<String>,
    ) -> Result<CheckoutResult, ServiceError> {
        counter!("orchestrator_checkout.entries", 1, "entry" => "redirect_return");
        let details = match (redirect_result, payload) {
            (Some(redirect_result), _) => json!({ "redirectResult": redirect_result }),
            (None, Some(payload)) => json!({ "payload": payload }),
            (None, None) => {
                // Still render a finished order; otherwise nothing to replay
                let order = self.find_order(merchant_reference).await?;
                if order.is_terminal() {
                    return Ok(CheckoutResult::for_order(order));
                }
                return Ok(CheckoutResult::rejected("redirect return without a result"));
            }
        };

        self.continue_authorization(
            session,
            merchant_reference,
            Continuation {
                details,
                payment_data: None,
                md: None,
            },
        )
        .await
    }

    /// 3-D Secure 2 continuation posted by the challenge page
    #[instrument(skip(self, challenge_result, state_data))]
    pub async fn three_ds2(
        &self,
        session: Option<&str>,
        merchant_reference: &str,
        result_code: Option<&str>,
        challenge_result: Option<String>,
        state_data: Option<Value>,
    ) -> Result<CheckoutResult, ServiceError> {
        counter!("orchestrator_checkout.entries", 1, "entry" => "three_ds2");
        let awaiting_shopper = matches!(result_code, Some("IdentifyShopper" | "ChallengeShopper"));
        if !awaiting_shopper && challenge_result.is_none() {
            warn!(merchant_reference, ?result_code, "3DS2 continuation without a challenge");
            return self.fail_current(session, merchant_reference).await;
        }

        let details_from_state = match state_data {
            Some(raw) => parse_state_data(raw)?.get("details").cloned(),
            None => None,
        };
        let details = match (details_from_state, challenge_result) {
            (Some(details), _) => details,
            (None, Some(challenge_result)) => json!({ "threeds2.challengeResult": challenge_result }),
            (None, None) => json!({}),
        };

        self.continue_authorization(
            session,
            merchant_reference,
            Continuation {
                details,
                payment_data: None,
                md: None,
            },
        )
        .await
    }

    /// Legacy 3-D Secure form post carrying `MD` and `PaRes`
    #[instrument(skip(self, md, pa_res))]
    pub async fn three_ds_legacy(
        &self,
        session: Option<&str>,
        merchant_reference: &str,
        md: String,
        pa_res: String,
    ) -> Result<CheckoutResult, ServiceError> {
        counter!("orchestrator_checkout.entries", 1, "entry" => "three_ds_legacy");
        self.continue_authorization(
            session,
            merchant_reference,
            Continuation {
                details: json!({ "MD": md.clone(), "PaRes": pa_res }),
                payment_data: None,
                md: Some(md),
            },
        )
        .await
    }

    async fn continue_authorization(
        &self,
        session: Option<&str>,
        order_no: &str,
        continuation: Continuation,
    ) -> Result<CheckoutResult, ServiceError> {
        let order = self.find_order(order_no).await?;
        if order.is_terminal() {
            info!(order_no, status = %order.payment_status, "Order already final; rendering existing result");
            return Ok(CheckoutResult::for_order(order));
        }

        let Some(instrument) = self.current_instrument(order_no).await? else {
            return Ok(CheckoutResult::rejected(format!(
                "no authorization in progress for order {}",
                order_no
            )));
        };
        let pending = self
            .pending
            .load(&self.db, instrument.id)
            .await?
            .unwrap_or_default();

        if let Some(posted_md) = continuation.md.as_deref() {
            if pending.md.as_deref() != Some(posted_md) {
                warn!(order_no, "Posted MD does not match the stored token; failing order");
                counter!("orchestrator_checkout.integrity_failures", 1);
                self.finalizer
                    .finalize_failure(order_no, Some(instrument.id))
                    .await?;
                self.clear_session(session, false).await;
                return Ok(CheckoutResult::rejected("secondary verification token mismatch"));
            }
        }

        let request = DetailsRequest {
            details: continuation.details,
            payment_data: continuation.payment_data.or(pending.payment_data),
        };
        let outcome = match absorb_transport_failure(self.gateway.submit_details(request).await) {
            Ok(outcome) => outcome,
            Err(e) => return self.reject_request(order_no, instrument.id, e).await,
        };

        // The processor's reference is authoritative for which order this is
        let (target, instrument_id) = match outcome.merchant_reference.as_deref() {
            Some(reference) if reference != order_no => {
                warn!(
                    requested = order_no,
                    processor = reference,
                    "Processor reports a different merchant reference"
                );
                let instrument_id = self.current_instrument(reference).await?.map(|i| i.id);
                (reference.to_string(), instrument_id)
            }
            _ => (order_no.to_string(), Some(instrument.id)),
        };

        match instrument_id {
            Some(instrument_id) => {
                self.apply_outcome(session, &target, instrument_id, pending.payment_method_type, outcome)
                    .await
            }
            None => {
                let decision = route(&outcome, &self.policy);
                match decision {
                    Decision::Finalize(verdict) => {
                        self.finalize(session, &target, None, verdict, &outcome).await
                    }
                    _ => Ok(CheckoutResult::rejected(format!(
                        "no authorization in progress for order {}",
                        target
                    ))),
                }
            }
        }
    }

    async fn apply_outcome(
        &self,
        session: Option<&str>,
        order_no: &str,
        instrument_id: Uuid,
        payment_method_type: Option<String>,
        mut outcome: AuthorizationOutcome,
    ) -> Result<CheckoutResult, ServiceError> {
        if outcome.payment_method.is_none() {
            outcome.payment_method = payment_method_type.clone();
        }

        match route(&outcome, &self.policy) {
            Decision::Redirect(redirect) => {
                let pending = PendingPayment {
                    payment_data: outcome.continuation_token(),
                    md: outcome.secondary_token(),
                    payment_method_type,
                };
                if let Some(order) = self.save_pending(order_no, instrument_id, pending).await? {
                    return Ok(CheckoutResult::for_order(order));
                }
                Ok(CheckoutResult::Redirect {
                    order_no: order_no.to_string(),
                    redirect,
                })
            }
            Decision::Challenge {
                action,
                payment_data,
            } => {
                let pending = PendingPayment {
                    payment_data,
                    md: None,
                    payment_method_type,
                };
                if let Some(order) = self.save_pending(order_no, instrument_id, pending).await? {
                    return Ok(CheckoutResult::for_order(order));
                }
                Ok(CheckoutResult::Challenge {
                    order_no: order_no.to_string(),
                    action,
                })
            }
            Decision::Finalize(verdict) => {
                self.finalize(session, order_no, Some(instrument_id), verdict, &outcome)
                    .await
            }
        }
    }

    async fn finalize(
        &self,
        session: Option<&str>,
        order_no: &str,
        instrument_id: Option<Uuid>,
        verdict: Verdict,
        outcome: &AuthorizationOutcome,
    ) -> Result<CheckoutResult, ServiceError> {
        let Finalized { order, .. } = match verdict {
            Verdict::Success { .. } => {
                self.finalizer
                    .finalize_success(order_no, instrument_id, outcome)
                    .await?
            }
            Verdict::Failure { reason } => {
                info!(
                    order_no,
                    %reason,
                    refusal_reason = ?outcome.refusal_reason,
                    "Authorization failed"
                );
                self.finalizer
                    .finalize_failure(order_no, instrument_id)
                    .await?
            }
        };

        let result = CheckoutResult::for_order(order);
        self.clear_session(session, matches!(result, CheckoutResult::Confirmed { .. }))
            .await;
        Ok(result)
    }

    /// Fail the order's current attempt without calling the processor
    async fn fail_current(
        &self,
        session: Option<&str>,
        order_no: &str,
    ) -> Result<CheckoutResult, ServiceError> {
        let instrument_id = self.current_instrument(order_no).await?.map(|i| i.id);
        let finalized = self.finalizer.finalize_failure(order_no, instrument_id).await?;
        self.clear_session(session, false).await;
        Ok(CheckoutResult::for_order(finalized.order))
    }

    /// Processor refused the request itself: drop the attempt's pending data, leave the order
    async fn reject_request(
        &self,
        order_no: &str,
        instrument_id: Uuid,
        error: GatewayError,
    ) -> Result<CheckoutResult, ServiceError> {
        warn!(order_no, error = %error, "Processor rejected the request");
        let boundary = TransactionBoundary::begin(&self.db, "clear_rejected_attempt").await?;
        let cleared = self.pending.clear(boundary.txn(), instrument_id).await;
        boundary.settle(cleared).await?;
        Ok(CheckoutResult::rejected(error.to_string()))
    }

    /// Store the continuation unless the order finished meanwhile
    async fn save_pending(
        &self,
        order_no: &str,
        instrument_id: Uuid,
        pending: PendingPayment,
    ) -> Result<Option<order::Model>, ServiceError> {
        let boundary = TransactionBoundary::begin(&self.db, "save_pending_payment").await?;
        let result = self
            .save_pending_in(boundary.txn(), order_no, instrument_id, pending)
            .await;
        boundary.settle(result).await
    }

    async fn save_pending_in(
        &self,
        txn: &DatabaseTransaction,
        order_no: &str,
        instrument_id: Uuid,
        pending: PendingPayment,
    ) -> Result<Option<order::Model>, ServiceError> {
        let order = lock_order(txn, order_no).await?;
        if order.is_terminal() {
            info!(order_no, "Order finalized while the shopper was challenged; not saving");
            return Ok(Some(order));
        }
        self.pending.save(txn, instrument_id, pending).await?;
        Ok(None)
    }

    async fn prepare_instrument(
        &self,
        txn: &DatabaseTransaction,
        order_no: &str,
        payment_method_type: Option<String>,
    ) -> Result<Prepared, ServiceError> {
        let order = lock_order(txn, order_no).await?;
        if order.is_terminal() {
            return Ok(Prepared::AlreadyFinal(order));
        }

        let removed = payment_instrument::Entity::delete_many()
            .filter(payment_instrument::Column::OrderNo.eq(order_no))
            .exec(txn)
            .await?;
        if removed.rows_affected > 0 {
            info!(order_no, removed = removed.rows_affected, "Replaced previous payment attempt");
        }

        let now = Utc::now();
        let instrument = payment_instrument::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_no: Set(order_no.to_string()),
            payment_method: Set(COMPONENT_PAYMENT_METHOD.to_string()),
            payment_method_type: Set(payment_method_type),
            payment_data: Set(None),
            md: Set(None),
            psp_reference: Set(None),
            auth_result: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await?;

        Ok(Prepared::Ready {
            order,
            instrument_id: instrument.id,
        })
    }

    async fn current_instrument(
        &self,
        order_no: &str,
    ) -> Result<Option<payment_instrument::Model>, ServiceError> {
        Ok(payment_instrument::Entity::find()
            .filter(payment_instrument::Column::OrderNo.eq(order_no))
            .order_by_desc(payment_instrument::Column::CreatedAt)
            .one(&*self.db)
            .await?)
    }

    async fn clear_session(&self, session: Option<&str>, paid: bool) {
        let Some(session) = session else {
            return;
        };
        if paid {
            self.sessions.clear_forms(session).await;
        }
        self.sessions.clear_custom_fields(session).await;
    }
}

/// `SELECT ... FOR UPDATE` on the order; instrument writes then serialize with the finalizer's status update
fn locked_order(order_no: &str) -> Select<order::Entity> {
    order::Entity::find_by_id(order_no.to_string()).lock_exclusive()
}

async fn lock_order(txn: &DatabaseTransaction, order_no: &str) -> Result<order::Model, ServiceError> {
    locked_order(order_no)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_no)))
}

enum Prepared {
    Ready {
        order: order::Model,
        instrument_id: Uuid,
    },
    AlreadyFinal(order::Model),
}

/// Client state data arrives either as an object or as its JSON string form
fn parse_state_data(raw: Value) -> Result<Map<String, Value>, ServiceError> {
    let value = match raw {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| ServiceError::BadRequest(format!("stateData is not valid JSON: {}", e)))?,
        other => other,
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ServiceError::BadRequest("stateData must be an object".into())),
    }
}
