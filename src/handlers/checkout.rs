use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::orders::OrderView;
use crate::handlers::{CheckoutContext, CheckoutDecision};
use crate::models::Amount;
use crate::services::checkout::{CheckoutResult, NewOrder, PaymentMethodsView};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_no: Option<String>,
    pub amount: Amount,
    #[validate(length(equal = 2))]
    pub country_code: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PaymentMethodsQuery {
    pub order_no: String,
    pub shopper_locale: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub order_no: String,
    /// Component state data, as an object or its JSON string form
    #[schema(value_type = Object)]
    pub state_data: Option<Value>,
    #[serde(default)]
    pub cancel_transaction: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetailsRequest {
    pub merchant_reference: String,
    /// Carries `details` and `paymentData`
    #[schema(value_type = Object)]
    pub state_data: Value,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedirectReturnParams {
    pub merchant_reference: String,
    pub redirect_result: Option<String>,
    pub payload: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThreeDs2Form {
    pub merchant_reference: String,
    pub result_code: Option<String>,
    pub challenge_result: Option<String>,
    /// JSON string posted by the challenge page
    pub state_data: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ThreeDsForm {
    #[serde(rename = "merchantReference")]
    pub merchant_reference: String,
    #[serde(rename = "MD")]
    pub md: Option<String>,
    #[serde(rename = "PaRes")]
    pub pa_res: Option<String>,
}

/// Log the failure with its order and hand back the generic error response
fn fail(order_no: &str, err: ServiceError) -> Response {
    crate::tracing::log_error(&err, err.kind(), Some(order_no));
    err.into_response()
}

/// Browser pages never show an error body; failures go to the landing page
fn render(state: &AppState, order_no: &str, result: Result<CheckoutResult, ServiceError>) -> Response {
    match result {
        Ok(result) => state.view.render(result),
        Err(err) => {
            crate::tracing::log_error(&err, err.kind(), Some(order_no));
            state.view.landing()
        }
    }
}

fn decision(
    state: &AppState,
    order_no: &str,
    result: Result<CheckoutResult, ServiceError>,
) -> Response {
    match result {
        Ok(result) => Json(ApiResponse::success(CheckoutDecision::from_result(
            &result,
            &state.config.landing_url,
        )))
        .into_response(),
        Err(err) => fail(order_no, err),
    }
}

/// Create an order from a priced basket total
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderView>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order number already used", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderView>>), ServiceError> {
    request.validate()?;
    let order = state
        .checkout
        .create_order(NewOrder {
            order_no: request.order_no,
            amount: request.amount,
            country_code: request.country_code,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OrderView::from(order))),
    ))
}

/// Payment methods available for an order
#[utoipa::path(
    get,
    path = "/api/v1/checkout/payment-methods",
    params(PaymentMethodsQuery),
    responses(
        (status = 200, description = "Payment methods retrieved", body = Object),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Processor unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn payment_methods(
    State(state): State<AppState>,
    Query(query): Query<PaymentMethodsQuery>,
) -> Result<Json<ApiResponse<PaymentMethodsView>>, ServiceError> {
    let view = state
        .checkout
        .payment_methods(&query.order_no, query.shopper_locale)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

/// First authorization call for an order
#[utoipa::path(
    post,
    path = "/api/v1/checkout/payments",
    request_body = InitiatePaymentRequest,
    params(("x-checkout-session" = Option<String>, Header, description = "Checkout session id")),
    responses(
        (status = 200, description = "Next step for the component", body = ApiResponse<CheckoutDecision>),
        (status = 400, description = "Unreadable state data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    ctx: CheckoutContext,
    Json(request): Json<InitiatePaymentRequest>,
) -> Response {
    let result = state
        .checkout
        .initiate(
            ctx.session(),
            &request.order_no,
            request.state_data.unwrap_or(Value::Null),
            request.cancel_transaction,
        )
        .await;
    decision(&state, &request.order_no, result)
}

/// Component completion after an action
#[utoipa::path(
    post,
    path = "/api/v1/checkout/payments/details",
    request_body = PaymentDetailsRequest,
    params(("x-checkout-session" = Option<String>, Header, description = "Checkout session id")),
    responses(
        (status = 200, description = "Next step for the component", body = ApiResponse<CheckoutDecision>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn payment_details(
    State(state): State<AppState>,
    ctx: CheckoutContext,
    Json(request): Json<PaymentDetailsRequest>,
) -> Response {
    let result = state
        .checkout
        .complete_component(ctx.session(), &request.merchant_reference, request.state_data)
        .await;
    decision(&state, &request.merchant_reference, result)
}

/// Shopper returns from the issuer or payment method page
#[utoipa::path(
    get,
    path = "/api/v1/checkout/return",
    params(RedirectReturnParams),
    responses(
        (status = 200, description = "Result page"),
        (status = 303, description = "Navigation to the next page"),
    ),
    tag = "Checkout"
)]
pub async fn redirect_return(
    State(state): State<AppState>,
    ctx: CheckoutContext,
    Query(params): Query<RedirectReturnParams>,
) -> Response {
    handle_return(state, ctx, params).await
}

/// Same as the GET return, for methods that post back
pub async fn redirect_return_form(
    State(state): State<AppState>,
    ctx: CheckoutContext,
    Form(params): Form<RedirectReturnParams>,
) -> Response {
    handle_return(state, ctx, params).await
}

async fn handle_return(state: AppState, ctx: CheckoutContext, params: RedirectReturnParams) -> Response {
    let result = state
        .checkout
        .redirect_return(
            ctx.session(),
            &params.merchant_reference,
            params.redirect_result,
            params.payload,
        )
        .await;
    render(&state, &params.merchant_reference, result)
}

/// 3-D Secure 2 continuation posted by the challenge page
#[utoipa::path(
    post,
    path = "/api/v1/checkout/3ds2",
    request_body(content = ThreeDs2Form, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Result page"),
        (status = 303, description = "Navigation to the next page"),
    ),
    tag = "Checkout"
)]
pub async fn three_ds2(
    State(state): State<AppState>,
    ctx: CheckoutContext,
    Form(form): Form<ThreeDs2Form>,
) -> Response {
    let result = state
        .checkout
        .three_ds2(
            ctx.session(),
            &form.merchant_reference,
            form.result_code.as_deref(),
            form.challenge_result,
            form.state_data.map(Value::String),
        )
        .await;
    render(&state, &form.merchant_reference, result)
}

/// Legacy 3-D Secure form post
#[utoipa::path(
    post,
    path = "/api/v1/checkout/3ds",
    request_body(content = ThreeDsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Result page"),
        (status = 303, description = "Navigation to the next page"),
    ),
    tag = "Checkout"
)]
pub async fn three_ds_legacy(
    State(state): State<AppState>,
    ctx: CheckoutContext,
    Form(form): Form<ThreeDsForm>,
) -> Response {
    let (Some(md), Some(pa_res)) = (form.md, form.pa_res) else {
        return state.view.render(CheckoutResult::Rejected {
            reason: "3-D Secure post without MD or PaRes".into(),
        });
    };
    let result = state
        .checkout
        .three_ds_legacy(ctx.session(), &form.merchant_reference, md, pa_res)
        .await;
    render(&state, &form.merchant_reference, result)
}
