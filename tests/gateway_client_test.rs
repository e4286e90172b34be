//! HTTP-level tests for the processor client against a mock Checkout API

use std::time::Duration;

use assert_matches::assert_matches;
use payment_orchestrator::models::{Amount, ResultCode};
use payment_orchestrator::services::gateway::{
    AdyenCheckoutClient, AuthorizationGateway, DetailsRequest, DonationRequest, GatewayError,
    GatewaySettings, PaymentMethodsRequest, PaymentRequest,
};
use serde_json::{json, Map, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> AdyenCheckoutClient {
    AdyenCheckoutClient::new(GatewaySettings {
        base_url: server.uri(),
        api_key: "test-api-key".into(),
        merchant_account: "ShopMerchantECOM".into(),
        public_base_url: "https://shop.example.com".into(),
        platform_name: "storefront".into(),
        timeout: Duration::from_secs(2),
    })
    .expect("client")
}

fn eur(value: i64) -> Amount {
    Amount {
        value,
        currency: "EUR".into(),
    }
}

fn card_state_data() -> Map<String, Value> {
    match json!({"paymentMethod": {"type": "scheme", "encryptedCardNumber": "enc"}}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn initiate_posts_state_data_with_order_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .and(header("X-API-Key", "test-api-key"))
        .and(body_partial_json(json!({
            "reference": "ORD-100",
            "merchantAccount": "ShopMerchantECOM",
            "channel": "Web",
            "countryCode": "NL",
            "amount": {"value": 1000, "currency": "EUR"},
            "returnUrl": "https://shop.example.com/api/v1/checkout/return?merchantReference=ORD-100",
            "paymentMethod": {"type": "scheme"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultCode": "Authorised",
            "pspReference": "PSP-1",
            "merchantReference": "ORD-100"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .initiate(PaymentRequest {
            reference: "ORD-100".into(),
            amount: eur(1000),
            country_code: Some("NL".into()),
            state_data: card_state_data(),
        })
        .await
        .expect("outcome");

    assert_eq!(outcome.result_code, ResultCode::Authorised);
    assert_eq!(outcome.psp_reference.as_deref(), Some("PSP-1"));
}

#[tokio::test]
async fn details_carry_the_continuation_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/details"))
        .and(body_partial_json(json!({
            "paymentData": "pd-1",
            "details": {"redirectResult": "X6Xt"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultCode": "Refused",
            "refusalReason": "Not enough balance"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client_for(&server)
        .submit_details(DetailsRequest {
            details: json!({"redirectResult": "X6Xt"}),
            payment_data: Some("pd-1".into()),
        })
        .await
        .expect("outcome");
    assert_eq!(outcome.result_code, ResultCode::Refused);
    assert_eq!(outcome.refusal_reason.as_deref(), Some("Not enough balance"));
}

#[tokio::test]
async fn client_errors_are_request_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "status": 422,
            "errorCode": "14_030",
            "message": "Return URL is missing."
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .initiate(PaymentRequest {
            reference: "ORD-101".into(),
            amount: eur(500),
            country_code: None,
            state_data: card_state_data(),
        })
        .await
        .unwrap_err();
    assert_matches!(
        err,
        GatewayError::InvalidRequest { status: 422, ref message } if message == "Return URL is missing."
    );
}

#[tokio::test]
async fn server_errors_are_transport_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/details"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .submit_details(DetailsRequest {
            details: json!({}),
            payment_data: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, GatewayError::Transport(_));
}

#[tokio::test]
async fn unreadable_success_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .initiate(PaymentRequest {
            reference: "ORD-102".into(),
            amount: eur(500),
            country_code: None,
            state_data: Map::new(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, GatewayError::Decode(_));
}

#[tokio::test]
async fn slow_processor_times_out_as_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"resultCode": "Authorised"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .initiate(PaymentRequest {
            reference: "ORD-103".into(),
            amount: eur(500),
            country_code: None,
            state_data: Map::new(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, GatewayError::Transport(ref msg) if msg.starts_with("timeout"));
}

#[tokio::test]
async fn payment_methods_and_donations_use_their_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/paymentMethods"))
        .and(body_partial_json(json!({
            "merchantAccount": "ShopMerchantECOM",
            "shopperLocale": "nl_NL",
            "countryCode": "NL"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paymentMethods": [{"type": "ideal", "name": "iDEAL"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/donations"))
        .and(body_partial_json(json!({
            "merchantAccount": "ShopMerchantECOM",
            "donationAccount": "CharityAccount",
            "donationOriginalPspReference": "PSP-1",
            "donationToken": "tok"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "DON-1",
            "status": "completed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let methods = client
        .payment_methods(PaymentMethodsRequest {
            amount: eur(1000),
            country_code: Some("NL".into()),
            shopper_locale: Some("nl_NL".into()),
        })
        .await
        .expect("methods");
    assert_eq!(methods["paymentMethods"][0]["type"], "ideal");

    let donation = client
        .donate(DonationRequest {
            amount: eur(100),
            reference: "ORD-100-donation".into(),
            donation_original_psp_reference: "PSP-1".into(),
            donation_account: "CharityAccount".into(),
            donation_token: Some("tok".into()),
        })
        .await
        .expect("donation");
    assert_eq!(donation["status"], "completed");
}
