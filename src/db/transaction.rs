/*!
 * Transaction boundary
 *
 * Every order or instrument mutation runs against a `&DatabaseTransaction`
 * borrowed from a `TransactionBoundary`. The boundary commits or rolls back
 * as a unit; dropping it without settling rolls back.
 */

use metrics::counter;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use std::time::Instant;
use tracing::{debug, warn};

pub struct TransactionBoundary {
    txn: DatabaseTransaction,
    label: &'static str,
    started: Instant,
}

impl TransactionBoundary {
    /// Open a transaction on the pool. `label` names the operation in logs and metrics.
    pub async fn begin(db: &DatabaseConnection, label: &'static str) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        debug!(transaction = label, "Transaction started");
        counter!("orchestrator_db.transaction.started", 1, "operation" => label);
        Ok(Self {
            txn,
            label,
            started: Instant::now(),
        })
    }

    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), DbErr> {
        let Self { txn, label, started } = self;
        txn.commit().await?;
        counter!("orchestrator_db.transaction.committed", 1, "operation" => label);
        debug!(transaction = label, elapsed = ?started.elapsed(), "Transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DbErr> {
        let Self { txn, label, started } = self;
        txn.rollback().await?;
        counter!("orchestrator_db.transaction.rolled_back", 1, "operation" => label);
        warn!(transaction = label, elapsed = ?started.elapsed(), "Transaction rolled back");
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`, and hand the result back.
    ///
    /// A failed rollback is logged; the original error is what the caller sees.
    pub async fn settle<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DbErr>,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let label = self.label;
                if let Err(rollback_err) = self.rollback().await {
                    warn!(transaction = label, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}
