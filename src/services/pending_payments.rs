use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::payment_instrument;
use crate::errors::ServiceError;

/// In-flight authorization state attached to one payment instrument
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingPayment {
    pub payment_data: Option<String>,
    pub md: Option<String>,
    pub payment_method_type: Option<String>,
}

impl PendingPayment {
    pub fn is_empty(&self) -> bool {
        self.payment_data.is_none() && self.md.is_none()
    }
}

/// Mutations take a transaction so they cannot run outside a `TransactionBoundary`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PendingPaymentStore: Send + Sync {
    async fn save(
        &self,
        txn: &DatabaseTransaction,
        instrument_id: Uuid,
        pending: PendingPayment,
    ) -> Result<(), ServiceError>;

    async fn load(
        &self,
        db: &DatabaseConnection,
        instrument_id: Uuid,
    ) -> Result<Option<PendingPayment>, ServiceError>;

    /// Idempotent; a missing or already-clear instrument is not an error
    async fn clear(&self, txn: &DatabaseTransaction, instrument_id: Uuid) -> Result<(), ServiceError>;
}

/// Stores pending state in the `payment_instruments` row itself
#[derive(Debug, Clone, Default)]
pub struct SeaOrmPendingPaymentStore;

#[async_trait]
impl PendingPaymentStore for SeaOrmPendingPaymentStore {
    async fn save(
        &self,
        txn: &DatabaseTransaction,
        instrument_id: Uuid,
        pending: PendingPayment,
    ) -> Result<(), ServiceError> {
        let instrument = payment_instrument::Entity::find_by_id(instrument_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment instrument {}", instrument_id)))?;

        let mut active: payment_instrument::ActiveModel = instrument.into();
        active.payment_data = Set(pending.payment_data);
        active.md = Set(pending.md);
        if let Some(method_type) = pending.payment_method_type {
            active.payment_method_type = Set(Some(method_type));
        }
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;

        debug!(%instrument_id, "Pending payment data saved");
        Ok(())
    }

    async fn load(
        &self,
        db: &DatabaseConnection,
        instrument_id: Uuid,
    ) -> Result<Option<PendingPayment>, ServiceError> {
        let instrument = payment_instrument::Entity::find_by_id(instrument_id)
            .one(db)
            .await?;
        Ok(instrument.map(|i| PendingPayment {
            payment_data: i.payment_data,
            md: i.md,
            payment_method_type: i.payment_method_type,
        }))
    }

    async fn clear(&self, txn: &DatabaseTransaction, instrument_id: Uuid) -> Result<(), ServiceError> {
        let result = payment_instrument::Entity::update_many()
            .col_expr(
                payment_instrument::Column::PaymentData,
                Expr::value(Option::<String>::None),
            )
            .col_expr(payment_instrument::Column::Md, Expr::value(Option::<String>::None))
            .col_expr(payment_instrument::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment_instrument::Column::Id.eq(instrument_id))
            .exec(txn)
            .await?;

        debug!(%instrument_id, rows = result.rows_affected, "Pending payment data cleared");
        Ok(())
    }
}
