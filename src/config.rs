use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::models::PaymentFlow;
use crate::services::delivery_fee::FeeSchedule;

const CONFIG_DIR: &str = "config";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_NOTIFICATION_ATTEMPTS: u32 = 3;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Ordering behavior: pickup normalization and verification-code branding.
#[derive(Clone, Debug, Deserialize)]
pub struct OrderingConfig {
    /// Literal address written onto every pickup order, regardless of what
    /// the client supplied.
    #[serde(default = "default_pickup_address")]
    pub pickup_address: String,

    /// Brand tag prefixed to generated verification codes.
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            pickup_address: default_pickup_address(),
            code_prefix: default_code_prefix(),
        }
    }
}

/// Static bank identity returned to manual-flow customers as payment
/// instructions. Configuration-level, never computed.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BankDetails {
    #[serde(default)]
    pub bank_name: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub account_number: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentConfig {
    /// Settlement variant for this deployment: "manual" or "gateway".
    #[serde(default = "default_payment_flow")]
    pub flow: PaymentFlow,

    #[serde(default)]
    pub bank: BankDetails,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            flow: default_payment_flow(),
            bank: BankDetails::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Secret key for outbound session calls (bearer auth).
    #[serde(default)]
    pub secret_key: String,

    /// Shared secret for inbound webhook signatures.
    #[serde(default)]
    pub webhook_secret: String,

    /// Where the gateway redirects the customer after settlement.
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            callback_url: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NotificationConfig {
    /// Endpoint of the operator notification channel (bot relay).
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub channel_id: String,

    /// Bounded retry cap; a notification is dropped after this many attempts.
    #[serde(default = "default_notification_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            channel_id: String::new(),
            max_attempts: default_notification_attempts(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Application configuration, loaded from `config/` files layered with
/// `APP_`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Delivery fee schedule. Deployment-specific; never hardcode.
    #[serde(default)]
    pub fees: FeeSchedule,

    #[serde(default)]
    pub ordering: OrderingConfig,

    #[serde(default)]
    pub payment: PaymentConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_pickup_address() -> String {
    "Pickup at store".to_string()
}
fn default_code_prefix() -> String {
    "CHOW".to_string()
}
fn default_payment_flow() -> PaymentFlow {
    PaymentFlow::Manual
}
fn default_gateway_base_url() -> String {
    "https://api.paystack.co".to_string()
}
fn default_notification_attempts() -> u32 {
    DEFAULT_NOTIFICATION_ATTEMPTS
}
fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

/// Loads configuration from `config/default`, an optional per-environment
/// file selected by `RUN_ENV`, and `APP_`-prefixed environment variables
/// (double underscore as the section separator).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    let env_path = Path::new(CONFIG_DIR).join(&run_env);
    builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));

    builder = builder.add_source(Environment::with_prefix("APP").separator("__"));

    builder.build()?.try_deserialize()
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
