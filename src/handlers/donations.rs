use axum::{extract::State, response::Json};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::Amount;
use crate::services::donations::{Donation, DonationReceipt};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    #[validate(length(min = 1))]
    pub order_reference: String,
    pub amount: Amount,
    /// Processor reference of the order's payment
    #[validate(length(min = 1))]
    pub correlation_reference: String,
    pub donation_token: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/donations",
    request_body = DonationRequest,
    responses(
        (status = 200, description = "Donation submitted", body = Object),
        (status = 400, description = "Donation not possible for this order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Donations"
)]
pub async fn donate(
    State(state): State<AppState>,
    Json(request): Json<DonationRequest>,
) -> Result<Json<ApiResponse<DonationReceipt>>, ServiceError> {
    request.validate()?;
    let receipt = state
        .donations
        .donate(Donation {
            order_reference: request.order_reference,
            amount: request.amount,
            correlation_reference: request.correlation_reference,
            donation_token: request.donation_token,
        })
        .await?;
    Ok(Json(ApiResponse::success(receipt)))
}
