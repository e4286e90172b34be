//! Shared fixtures for unit tests

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use uuid::Uuid;

use crate::entities::order::{self, ExportStatus, PaymentStatus};
use crate::entities::payment_instrument::{self, COMPONENT_PAYMENT_METHOD};

/// Migrated in-memory SQLite database on a single connection
pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    crate::db::run_migrations(&db).await.unwrap();
    db
}

pub fn new_order(order_no: &str) -> order::ActiveModel {
    let now = Utc::now();
    order::ActiveModel {
        order_no: Set(order_no.to_string()),
        payment_status: Set(PaymentStatus::Created),
        export_status: Set(ExportStatus::NotExported),
        amount_value: Set(1000),
        currency: Set("EUR".into()),
        country_code: Set(Some("NL".into())),
        psp_reference: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

pub async fn insert_order(db: &DatabaseConnection, order_no: &str) -> order::Model {
    new_order(order_no).insert(db).await.unwrap()
}

pub async fn insert_instrument(
    db: &DatabaseConnection,
    order_no: &str,
    payment_data: Option<&str>,
    md: Option<&str>,
) -> payment_instrument::Model {
    let now = Utc::now();
    payment_instrument::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_no: Set(order_no.to_string()),
        payment_method: Set(COMPONENT_PAYMENT_METHOD.into()),
        payment_method_type: Set(Some("scheme".into())),
        payment_data: Set(payment_data.map(str::to_string)),
        md: Set(md.map(str::to_string)),
        psp_reference: Set(None),
        auth_result: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}
