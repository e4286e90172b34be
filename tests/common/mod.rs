#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use payment_orchestrator::{
    config::AppConfig,
    db,
    entities::{
        order::{self, ExportStatus, PaymentStatus},
        payment_instrument::{self, COMPONENT_PAYMENT_METHOD},
    },
    errors::ServiceError,
    events::{self, Event, EventHandler, EventSender},
    handlers::{JsonCheckoutView, CHECKOUT_SESSION_HEADER},
    models::{
        notification::{NotificationAdditionalData, NotificationItem},
        Amount, AuthorizationOutcome, NotificationEvent, NotificationRequest,
    },
    services::{
        collaborators::{InMemorySessionStore, OrderSubmitter},
        gateway::{
            AuthorizationGateway, DetailsRequest, DonationRequest, GatewayError,
            PaymentMethodsRequest, PaymentRequest,
        },
        notifications::sign_notification,
        pending_payments::{PendingPayment, PendingPaymentStore, SeaOrmPendingPaymentStore},
    },
    AppState, Collaborators,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

pub const HMAC_KEY_HEX: &str = "44782DEF547AAA06C910C43932B1EB0C71FC68D9D0C057550C48EC2ACF6BA056";
pub const MERCHANT_ACCOUNT: &str = "ShopMerchantECOM";
pub const LANDING_URL: &str = "/checkout/start";

/// Processor stand-in answering from per-endpoint scripts
#[derive(Default)]
pub struct StubGateway {
    initiate_script: Mutex<VecDeque<Result<AuthorizationOutcome, GatewayError>>>,
    details_script: Mutex<VecDeque<Result<AuthorizationOutcome, GatewayError>>>,
    pub initiate_calls: AtomicUsize,
    pub details_calls: AtomicUsize,
    pub details_requests: Mutex<Vec<DetailsRequest>>,
    pub donation_requests: Mutex<Vec<DonationRequest>>,
}

impl StubGateway {
    pub fn on_initiate(&self, response: Result<AuthorizationOutcome, GatewayError>) {
        self.initiate_script.lock().unwrap().push_back(response);
    }

    pub fn on_details(&self, response: Result<AuthorizationOutcome, GatewayError>) {
        self.details_script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst) + self.details_calls.load(Ordering::SeqCst)
    }

    pub fn last_details(&self) -> Option<DetailsRequest> {
        self.details_requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AuthorizationGateway for StubGateway {
    async fn initiate(&self, _request: PaymentRequest) -> Result<AuthorizationOutcome, GatewayError> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        self.initiate_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Transport("no scripted /payments answer".into())))
    }

    async fn submit_details(
        &self,
        request: DetailsRequest,
    ) -> Result<AuthorizationOutcome, GatewayError> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        self.details_requests.lock().unwrap().push(request);
        self.details_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(GatewayError::Transport("no scripted /payments/details answer".into()))
            })
    }

    async fn payment_methods(&self, _request: PaymentMethodsRequest) -> Result<Value, GatewayError> {
        Ok(json!({
            "paymentMethods": [
                {"type": "scheme", "name": "Credit Card"},
                {"type": "ideal", "name": "iDEAL"}
            ]
        }))
    }

    async fn donate(&self, request: DonationRequest) -> Result<Value, GatewayError> {
        self.donation_requests.lock().unwrap().push(request);
        Ok(json!({"status": "completed"}))
    }
}

/// Records every order handed to the order pipeline
#[derive(Default)]
pub struct RecordingSubmitter {
    pub submitted: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingSubmitter {
    pub fn count(&self, order_no: &str) -> usize {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.as_str() == order_no)
            .count()
    }
}

#[async_trait]
impl OrderSubmitter for RecordingSubmitter {
    async fn submit(&self, order: &order::Model) -> Result<(), ServiceError> {
        self.submitted.lock().unwrap().push(order.order_no.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::InternalError("order pipeline down".into()));
        }
        Ok(())
    }
}

/// Real store whose `clear` can be made to fail
#[derive(Default)]
pub struct FaultyPendingStore {
    inner: SeaOrmPendingPaymentStore,
    pub fail_clear: AtomicBool,
}

#[async_trait]
impl PendingPaymentStore for FaultyPendingStore {
    async fn save(
        &self,
        txn: &DatabaseTransaction,
        instrument_id: Uuid,
        pending: PendingPayment,
    ) -> Result<(), ServiceError> {
        self.inner.save(txn, instrument_id, pending).await
    }

    async fn load(
        &self,
        db: &DatabaseConnection,
        instrument_id: Uuid,
    ) -> Result<Option<PendingPayment>, ServiceError> {
        self.inner.load(db, instrument_id).await
    }

    async fn clear(&self, txn: &DatabaseTransaction, instrument_id: Uuid) -> Result<(), ServiceError> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(ServiceError::InternalError("injected clear failure".into()));
        }
        self.inner.clear(txn, instrument_id).await
    }
}

#[derive(Default)]
pub struct RecordingEvents(pub Mutex<Vec<Event>>);

#[async_trait]
impl EventHandler for RecordingEvents {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        self.0.lock().unwrap().push(event);
        Ok(())
    }
}

/// Application state over an in-memory SQLite database with stubbed collaborators
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<StubGateway>,
    pub submitter: Arc<RecordingSubmitter>,
    pub sessions: Arc<InMemorySessionStore>,
    pub pending: Arc<FaultyPendingStore>,
    pub events: Arc<RecordingEvents>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "https://checkout-test.adyen.com/v70".to_string(),
            MERCHANT_ACCOUNT.to_string(),
            "https://shop.example.com".to_string(),
            "test".to_string(),
        );
        // One connection keeps every task on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.notification_hmac_key = Some(HMAC_KEY_HEX.to_string());
        cfg.donation_account = Some("CharityAccount".to_string());
        cfg.landing_url = LANDING_URL.to_string();
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = EventSender::channel(256);
        let recorded = Arc::new(RecordingEvents::default());
        let handlers: Vec<Arc<dyn EventHandler>> = vec![recorded.clone()];
        let event_task = tokio::spawn(events::process_events(event_rx, handlers));

        let gateway = Arc::new(StubGateway::default());
        let submitter = Arc::new(RecordingSubmitter::default());
        let sessions = Arc::new(InMemorySessionStore::new());
        let pending = Arc::new(FaultyPendingStore::default());

        let state = AppState::new(
            db.clone(),
            cfg.clone(),
            event_sender,
            Collaborators {
                gateway: gateway.clone(),
                pending: pending.clone(),
                submitter: submitter.clone(),
                sessions: sessions.clone(),
                view: Arc::new(JsonCheckoutView::new(cfg.landing_url.clone())),
            },
        )
        .expect("valid test state");

        let router = payment_orchestrator::app_router()
            .layer(axum::middleware::from_fn(
                payment_orchestrator::middleware_helpers::request_id_middleware,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            db,
            gateway,
            submitter,
            sessions,
            pending,
            events: recorded,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CHECKOUT_SESSION_HEADER, "sess-1");
        let body = match body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("request")).await
    }

    pub async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> Response {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CHECKOUT_SESSION_HEADER, "sess-1")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(encoded))
            .expect("request");
        self.send(request).await
    }

    pub async fn post_notification(&self, body: String) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/notifications")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn seed_order(&self, order_no: &str) -> order::Model {
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
        .insert(&*self.db)
        .await
        .expect("seed order")
    }

    pub async fn seed_instrument(
        &self,
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
        .insert(&*self.db)
        .await
        .expect("seed instrument")
    }

    pub async fn order(&self, order_no: &str) -> order::Model {
        order::Entity::find_by_id(order_no.to_string())
            .one(&*self.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn instruments(&self, order_no: &str) -> Vec<payment_instrument::Model> {
        payment_instrument::Entity::find()
            .filter(payment_instrument::Column::OrderNo.eq(order_no))
            .all(&*self.db)
            .await
            .expect("query instruments")
    }

    pub fn hmac_key(&self) -> Vec<u8> {
        hex::decode(HMAC_KEY_HEX).expect("hex key")
    }

    /// A notification delivery whose items are signed with the configured key
    pub fn signed_delivery(&self, items: Vec<NotificationEvent>) -> String {
        let key = self.hmac_key();
        let notification_items = items
            .into_iter()
            .map(|mut event| {
                let signature = sign_notification(&key, &event).expect("sign");
                event.additional_data = Some(NotificationAdditionalData {
                    hmac_signature: Some(signature),
                });
                NotificationItem {
                    request_item: event,
                }
            })
            .collect();
        serde_json::to_string(&NotificationRequest {
            live: Some("false".into()),
            notification_items,
        })
        .expect("serialize delivery")
    }

    /// Give the event loop a moment to drain
    pub async fn settle_events(&self) {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    pub fn recorded_events(&self) -> Vec<Event> {
        self.events.0.lock().unwrap().clone()
    }
}

pub fn notification(order_no: &str, event_code: &str, success: bool) -> NotificationEvent {
    NotificationEvent {
        psp_reference: format!("PSP-{}", order_no),
        original_reference: None,
        merchant_account_code: MERCHANT_ACCOUNT.into(),
        merchant_reference: order_no.into(),
        event_code: event_code.into(),
        success: success.to_string(),
        amount: Amount {
            value: 1000,
            currency: "EUR".into(),
        },
        payment_method: Some("visa".into()),
        reason: None,
        event_date: None,
        additional_data: None,
    }
}

/// Processor answer with the given result code
pub fn outcome(result_code: &str, order_no: &str) -> AuthorizationOutcome {
    serde_json::from_value(json!({
        "resultCode": result_code,
        "pspReference": format!("PSP-{}", order_no),
        "merchantReference": order_no,
    }))
    .expect("outcome")
}

pub fn outcome_with_action(result_code: &str, order_no: &str, action: Value) -> AuthorizationOutcome {
    serde_json::from_value(json!({
        "resultCode": result_code,
        "merchantReference": order_no,
        "action": action,
    }))
    .expect("outcome")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn response_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}
