use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payment Orchestrator API",
        version = "1.0.0",
        description = r#"
# Payment Orchestrator

Drives checkout orders through the processor's two-call authorization protocol.

## Flow

1. `POST /checkout/orders` creates an order in `created` state.
2. `POST /checkout/payments` sends the component state data to the processor.
   The response either finalizes the order or returns an action (redirect or challenge).
3. The shopper completes the action; the result comes back through
   `/checkout/payments/details`, `/checkout/return`, `/checkout/3ds2` or `/checkout/3ds`.
4. The processor also posts asynchronous notifications to `/notifications`.

An order reaches `paid` or `failed` exactly once, whichever of the shopper's
return and the notification arrives first.

## Error Handling

```json
{
  "error": "Not Found",
  "message": "Not found: order ORD-100",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Order creation and shopper-facing authorization steps"),
        (name = "Notifications", description = "Processor webhook"),
        (name = "Donations", description = "Donations after a completed purchase"),
        (name = "Orders", description = "Order confirmation"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::checkout::create_order,
        crate::handlers::checkout::payment_methods,
        crate::handlers::checkout::initiate_payment,
        crate::handlers::checkout::payment_details,
        crate::handlers::checkout::redirect_return,
        crate::handlers::checkout::three_ds2,
        crate::handlers::checkout::three_ds_legacy,
        crate::handlers::notifications::receive_notification,
        crate::handlers::donations::donate,
        crate::handlers::orders::get_order,
        crate::health::health_check,
    ),
    components(
        schemas(
            crate::models::Amount,
            crate::models::ResultCode,
            crate::entities::order::PaymentStatus,
            crate::entities::order::ExportStatus,
            crate::handlers::checkout::CreateOrderRequest,
            crate::handlers::checkout::InitiatePaymentRequest,
            crate::handlers::checkout::PaymentDetailsRequest,
            crate::handlers::checkout::ThreeDs2Form,
            crate::handlers::checkout::ThreeDsForm,
            crate::handlers::donations::DonationRequest,
            crate::handlers::orders::OrderView,
            crate::handlers::view::CheckoutDecision,
            crate::handlers::view::DecisionKind,
            crate::health::HealthInfo,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
