use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Method code recorded on every instrument created by the component checkout
pub const COMPONENT_PAYMENT_METHOD: &str = "AdyenComponent";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_instruments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_no: String,
    pub payment_method: String,
    /// Method type selected by the shopper, if the state data could be parsed
    pub payment_method_type: Option<String>,
    /// Continuation token for `/payments/details`
    pub payment_data: Option<String>,
    /// Secondary verification token of the legacy 3-D Secure flow
    pub md: Option<String>,
    pub psp_reference: Option<String>,
    pub auth_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderNo",
        to = "super::order::Column::OrderNo"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn has_pending_data(&self) -> bool {
        self.payment_data.is_some() || self.md.is_some()
    }
}
