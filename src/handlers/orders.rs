use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::entities::order::{self, ExportStatus, PaymentStatus};
use crate::models::Amount;
use crate::{ApiResponse, ApiResult, AppState};

/// Order confirmation as shown to the shopper
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_no: String,
    pub payment_status: PaymentStatus,
    pub export_status: ExportStatus,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psp_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<order::Model> for OrderView {
    fn from(order: order::Model) -> Self {
        Self {
            order_no: order.order_no,
            payment_status: order.payment_status,
            export_status: order.export_status,
            amount: Amount {
                value: order.amount_value,
                currency: order.currency,
            },
            country_code: order.country_code,
            psp_reference: order.psp_reference,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_no}",
    summary = "Get order",
    params(("order_no" = String, Path, description = "Merchant order number")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderView>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> ApiResult<OrderView> {
    let order = state.checkout.find_order(&order_no).await?;
    Ok(Json(ApiResponse::success(order.into())))
}
