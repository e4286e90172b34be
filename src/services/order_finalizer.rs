/*!
 * Order finalization
 *
 * Moves an order from `created` to `paid` or `failed` exactly once. The
 * transition is a compare-and-set on `payment_status`; whoever loses the
 * race observes the winner's terminal state and mutates nothing.
 */

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter,
    QuerySelect,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::db::TransactionBoundary;
use crate::entities::order::{self, ExportStatus, PaymentStatus};
use crate::entities::payment_instrument;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::AuthorizationOutcome;
use crate::services::collaborators::OrderSubmitter;
use crate::services::pending_payments::PendingPaymentStore;

/// Result of a finalization attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub order: order::Model,
    /// `false` when the order was already terminal and nothing changed
    pub transitioned: bool,
}

#[derive(Clone)]
pub struct OrderFinalizer {
    db: Arc<DatabaseConnection>,
    pending: Arc<dyn PendingPaymentStore>,
    submitter: Arc<dyn OrderSubmitter>,
    events: EventSender,
}

impl OrderFinalizer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        pending: Arc<dyn PendingPaymentStore>,
        submitter: Arc<dyn OrderSubmitter>,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            pending,
            submitter,
            events,
        }
    }

    #[instrument(skip(self, outcome), fields(result_code = %outcome.result_code))]
    pub async fn finalize_success(
        &self,
        order_no: &str,
        instrument_id: Option<Uuid>,
        outcome: &AuthorizationOutcome,
    ) -> Result<Finalized, ServiceError> {
        let boundary = TransactionBoundary::begin(&self.db, "finalize_success").await?;
        let result = self
            .transition(
                boundary.txn(),
                order_no,
                instrument_id,
                PaymentStatus::Paid,
                Some(outcome),
            )
            .await;
        let finalized = boundary.settle(result).await?;

        if !finalized.transitioned {
            return Ok(finalized);
        }

        counter!("orchestrator_finalizer.transitions", 1, "status" => "paid");
        info!(order_no, psp_reference = ?finalized.order.psp_reference, "Order paid");
        self.events
            .send_or_log(Event::PaymentAuthorised {
                order_no: order_no.to_string(),
                psp_reference: finalized.order.psp_reference.clone(),
            })
            .await;

        // Payment stays captured even when the pipeline refuses the order
        if let Err(e) = self.submitter.submit(&finalized.order).await {
            counter!("orchestrator_finalizer.submission_failures", 1);
            error!(order_no, error = %e, "Order submission failed");
            self.events
                .send_or_log(Event::OrderSubmissionFailed {
                    order_no: order_no.to_string(),
                    error: e.to_string(),
                })
                .await;
        }

        Ok(finalized)
    }

    #[instrument(skip(self))]
    pub async fn finalize_failure(
        &self,
        order_no: &str,
        instrument_id: Option<Uuid>,
    ) -> Result<Finalized, ServiceError> {
        let boundary = TransactionBoundary::begin(&self.db, "finalize_failure").await?;
        let result = self
            .transition(
                boundary.txn(),
                order_no,
                instrument_id,
                PaymentStatus::Failed,
                None,
            )
            .await;
        let finalized = boundary.settle(result).await?;

        if finalized.transitioned {
            counter!("orchestrator_finalizer.transitions", 1, "status" => "failed");
            info!(order_no, "Order failed");
            self.events
                .send_or_log(Event::PaymentFailed {
                    order_no: order_no.to_string(),
                })
                .await;
        }

        Ok(finalized)
    }

    async fn transition(
        &self,
        txn: &DatabaseTransaction,
        order_no: &str,
        instrument_id: Option<Uuid>,
        target: PaymentStatus,
        outcome: Option<&AuthorizationOutcome>,
    ) -> Result<Finalized, ServiceError> {
        let now = Utc::now();
        let psp_reference = outcome.and_then(|o| o.psp_reference.clone());

        let mut update = order::Entity::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(target.to_value()))
            .col_expr(order::Column::UpdatedAt, Expr::value(now));
        if target == PaymentStatus::Paid {
            update = update
                .col_expr(
                    order::Column::ExportStatus,
                    Expr::value(ExportStatus::Ready.to_value()),
                )
                .col_expr(order::Column::PspReference, Expr::value(psp_reference.clone()));
        }
        let cas = update
            .filter(order::Column::OrderNo.eq(order_no))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Created.to_value()))
            .exec(txn)
            .await?;

        if cas.rows_affected == 0 {
            let existing = load_order(txn, order_no).await?;
            if existing.payment_status != target {
                warn!(
                    order_no,
                    current = %existing.payment_status,
                    requested = %target,
                    "Order already finalized with a different outcome"
                );
            }
            return Ok(Finalized {
                order: existing,
                transitioned: false,
            });
        }

        let mut record = payment_instrument::Entity::update_many()
            .col_expr(payment_instrument::Column::UpdatedAt, Expr::value(now))
            .filter(payment_instrument::Column::OrderNo.eq(order_no));
        if let Some(outcome) = outcome {
            record = record
                .col_expr(
                    payment_instrument::Column::PspReference,
                    Expr::value(psp_reference),
                )
                .col_expr(
                    payment_instrument::Column::AuthResult,
                    Expr::value(Some(outcome.result_code.to_string())),
                );
        }
        if let Some(id) = instrument_id {
            record = record.filter(payment_instrument::Column::Id.eq(id));
        }
        record.exec(txn).await?;

        let instrument_ids: Vec<Uuid> = payment_instrument::Entity::find()
            .select_only()
            .column(payment_instrument::Column::Id)
            .filter(payment_instrument::Column::OrderNo.eq(order_no))
            .into_tuple()
            .all(txn)
            .await?;
        for id in instrument_ids {
            self.pending.clear(txn, id).await?;
        }

        Ok(Finalized {
            order: load_order(txn, order_no).await?,
            transitioned: true,
        })
    }
}

async fn load_order(txn: &DatabaseTransaction, order_no: &str) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_no.to_string())
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_no)))
}
