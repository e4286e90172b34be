use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PROCESSOR_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DEFERRED_SETTLEMENT_METHODS: &str = "alipay_hk";
const DEFAULT_EXTERNAL_PLATFORM_NAME: &str = "payment-orchestrator";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Per-request timeout applied by the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // ========== Payment processor ==========
    /// Checkout API base URL, e.g. https://checkout-test.adyen.com/v70
    #[validate(custom = "validate_http_url")]
    pub processor_base_url: String,

    /// API key sent as X-API-Key
    #[serde(default)]
    pub processor_api_key: String,

    /// Merchant account the payments are booked on
    pub merchant_account: String,

    /// Timeout for outbound processor calls (seconds)
    #[serde(default = "default_processor_timeout_secs")]
    pub processor_timeout_secs: u64,

    /// Hex-encoded HMAC key used to sign notification items
    #[serde(default)]
    #[validate(custom = "validate_hmac_key")]
    pub notification_hmac_key: Option<String>,

    /// Basic auth credentials the processor uses on the notification endpoint
    #[serde(default)]
    pub notification_username: Option<String>,
    #[serde(default)]
    pub notification_password: Option<String>,

    /// Comma-separated method types for which a `Received` result is not a payment
    #[serde(default = "default_deferred_settlement_methods")]
    pub deferred_settlement_methods: String,

    /// Charity merchant account receiving donations
    #[serde(default)]
    pub donation_account: Option<String>,

    /// Public base URL of this service, used to build shopper return URLs
    #[validate(custom = "validate_http_url")]
    pub public_base_url: String,

    /// Generic landing page for transport and integrity failures
    #[serde(default = "default_landing_url")]
    pub landing_url: String,

    /// Platform name reported to the processor in application info
    #[serde(default = "default_external_platform_name")]
    pub external_platform_name: String,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(
        database_url: String,
        processor_base_url: String,
        merchant_account: String,
        public_base_url: String,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: default_port(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            processor_base_url,
            processor_api_key: String::new(),
            merchant_account,
            processor_timeout_secs: default_processor_timeout_secs(),
            notification_hmac_key: None,
            notification_username: None,
            notification_password: None,
            deferred_settlement_methods: default_deferred_settlement_methods(),
            donation_account: None,
            public_base_url,
            landing_url: default_landing_url(),
            external_platform_name: default_external_platform_name(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_secs(self.processor_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Deferred-settlement method types, lower-cased, empty entries dropped
    pub fn deferred_settlement_methods(&self) -> Vec<String> {
        self.deferred_settlement_methods
            .split(',')
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .collect()
    }

    /// Allowed CORS origins, if any were configured
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() && self.notification_hmac_key.is_none() {
            let mut err = ValidationError::new("notification_hmac_key_required");
            err.message = Some(
                "Set APP__NOTIFICATION_HMAC_KEY; unsigned notifications are only accepted outside production"
                    .into(),
            );
            errors.add("notification_hmac_key", err);
        }

        if self.notification_username.is_some() != self.notification_password.is_some() {
            let mut err = ValidationError::new("notification_credentials_incomplete");
            err.message =
                Some("notification_username and notification_password must be set together".into());
            errors.add("notification_username", err);
        }

        if self.is_production() && self.processor_api_key.trim().is_empty() {
            let mut err = ValidationError::new("processor_api_key_required");
            err.message = Some("Set APP__PROCESSOR_API_KEY".into());
            errors.add("processor_api_key", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_request_timeout_secs() -> u64 {
    // outbound processor calls must fit inside the request budget
    DEFAULT_PROCESSOR_TIMEOUT_SECS + 15
}
fn default_processor_timeout_secs() -> u64 {
    DEFAULT_PROCESSOR_TIMEOUT_SECS
}
fn default_deferred_settlement_methods() -> String {
    DEFAULT_DEFERRED_SETTLEMENT_METHODS.to_string()
}
fn default_landing_url() -> String {
    "/".to_string()
}
fn default_external_platform_name() -> String {
    DEFAULT_EXTERNAL_PLATFORM_NAME.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_http_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(()),
        _ => {
            let mut err = ValidationError::new("url");
            err.message = Some("Must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

fn validate_hmac_key(key: &str) -> Result<(), ValidationError> {
    let trimmed = key.trim();
    if trimmed.is_empty() || hex::decode(trimmed).is_err() {
        let mut err = ValidationError::new("notification_hmac_key");
        err.message = Some("HMAC key must be a non-empty hex string".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("payment_orchestrator={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://orchestrator.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("processor_base_url", "https://checkout-test.adyen.com/v70")?
        .set_default("public_base_url", "http://localhost:8080")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("merchant_account").is_err() {
        error!("Merchant account is not configured. Set APP__MERCHANT_ACCOUNT.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "merchant_account is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
