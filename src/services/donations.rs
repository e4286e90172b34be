use std::sync::Arc;

use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::order::{self, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::Amount;
use crate::services::gateway::{AuthorizationGateway, DonationRequest};

#[derive(Debug, Clone)]
pub struct Donation {
    pub order_reference: String,
    pub amount: Amount,
    /// Processor reference of the order's payment
    pub correlation_reference: String,
    pub donation_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationReceipt {
    pub order_no: String,
    pub donation_reference: String,
    pub response: Value,
}

/// Donation after a completed purchase. Never touches pending payment data.
#[derive(Clone)]
pub struct DonationService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn AuthorizationGateway>,
    donation_account: Option<String>,
    events: EventSender,
}

impl DonationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn AuthorizationGateway>,
        donation_account: Option<String>,
        events: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            donation_account,
            events,
        }
    }

    #[instrument(skip(self, donation), fields(order_no = %donation.order_reference))]
    pub async fn donate(&self, donation: Donation) -> Result<DonationReceipt, ServiceError> {
        let donation_account = self
            .donation_account
            .clone()
            .ok_or_else(|| ServiceError::InvalidOperation("donations are not enabled".into()))?;
        if donation.amount.value <= 0 {
            return Err(ServiceError::ValidationError(
                "donation amount must be positive".into(),
            ));
        }

        let order = order::Entity::find_by_id(donation.order_reference.clone())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", donation.order_reference)))?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is not paid",
                order.order_no
            )));
        }
        if order.psp_reference.as_deref() != Some(donation.correlation_reference.as_str()) {
            return Err(ServiceError::BadRequest(
                "correlation reference does not belong to the order".into(),
            ));
        }

        let donation_reference = format!("{}-DON-{}", order.order_no, Uuid::new_v4().simple());
        let response = self
            .gateway
            .donate(DonationRequest {
                amount: donation.amount,
                reference: donation_reference.clone(),
                donation_original_psp_reference: donation.correlation_reference,
                donation_account,
                donation_token: donation.donation_token,
            })
            .await?;

        info!(order_no = %order.order_no, %donation_reference, "Donation submitted");
        self.events
            .send_or_log(Event::DonationCompleted {
                order_no: order.order_no.clone(),
                donation_reference: donation_reference.clone(),
            })
            .await;

        Ok(DonationReceipt {
            order_no: order.order_no,
            donation_reference,
            response,
        })
    }
}
