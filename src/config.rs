use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str = "development_only_jwt_secret_for_the_fragrance_storefront_api";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[serde(default = "default_jwt_expiration")]
    #[validate(range(min = 60, max = 86400))]
    pub jwt_expiration: usize,

    /// JWT issuer name
    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    /// JWT audience
    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1, max = 65535))]
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

    /// Allow permissive CORS outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Whole-request timeout applied at the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

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

    /// Payment provider identifier ("stripe" or "mock")
    #[serde(default = "default_payment_provider")]
    #[validate(custom = "validate_payment_provider")]
    pub payment_provider: String,

    /// Stripe secret key, required when `payment_provider = "stripe"`
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Stripe API base URL
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Timeout for a single payment provider call (seconds)
    #[serde(default = "default_payment_provider_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub payment_provider_timeout_secs: u64,

    /// Currency code for payment intents
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Default tax rate (as decimal, e.g., 0.08 for 8%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: f64,

    /// Flat shipping cost charged below the free-shipping threshold
    #[serde(default = "default_shipping_flat_rate")]
    #[validate(custom = "validate_non_negative_amount")]
    pub shipping_flat_rate: Decimal,

    /// Subtotal at or above which shipping is free
    #[serde(default = "default_free_shipping_threshold")]
    #[validate(custom = "validate_non_negative_amount")]
    pub free_shipping_threshold: Decimal,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Default page size for paginated API responses
    #[serde(default = "default_api_page_size")]
    pub api_default_page_size: u64,

    /// Maximum page size allowed for paginated API responses
    #[serde(default = "default_api_max_page_size")]
    pub api_max_page_size: u64,
}

impl AppConfig {
    /// Creates a new configuration with defaults for every optional setting
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration: default_jwt_expiration(),
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            request_timeout_secs: default_request_timeout_secs(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            payment_provider: default_payment_provider(),
            stripe_secret_key: None,
            stripe_api_base: default_stripe_api_base(),
            payment_provider_timeout_secs: default_payment_provider_timeout_secs(),
            default_currency: default_currency(),
            default_tax_rate: default_tax_rate(),
            shipping_flat_rate: default_shipping_flat_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
            event_channel_capacity: default_event_channel_capacity(),
            api_default_page_size: default_api_page_size(),
            api_max_page_size: default_api_max_page_size(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Parsed list of allowed CORS origins
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Tax rate as a decimal fraction
    pub fn tax_rate(&self) -> Decimal {
        Decimal::try_from(self.default_tax_rate)
            .unwrap_or(Decimal::ZERO)
            .round_dp(4)
    }

    pub fn payment_provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.payment_provider_timeout_secs)
    }

    /// Clamps a requested page size into the configured bounds
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.api_default_page_size)
            .clamp(1, self.api_max_page_size.max(1))
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.payment_provider.eq_ignore_ascii_case("stripe")
            && self
                .stripe_secret_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            let mut err = ValidationError::new("stripe_secret_key_required");
            err.message = Some("Set APP__STRIPE_SECRET_KEY when payment_provider is stripe".into());
            errors.add("stripe_secret_key", err);
        }

        if self.is_production() && self.payment_provider.eq_ignore_ascii_case("mock") {
            let mut err = ValidationError::new("mock_payment_provider_in_production");
            err.message = Some("The mock payment provider cannot be used in production".into());
            errors.add("payment_provider", err);
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

fn default_jwt_expiration() -> usize {
    3600
}

fn default_auth_issuer() -> String {
    "fragrance-api".to_string()
}

fn default_auth_audience() -> String {
    "fragrance-storefront".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
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

fn default_payment_provider() -> String {
    "mock".to_string()
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_payment_provider_timeout_secs() -> u64 {
    10
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_tax_rate() -> f64 {
    0.08 // 8% default tax rate
}

fn default_shipping_flat_rate() -> Decimal {
    dec!(10.00)
}

fn default_free_shipping_threshold() -> Decimal {
    dec!(100.00)
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_api_page_size() -> u64 {
    20
}

fn default_api_max_page_size() -> u64 {
    100
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

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 3] = ["your-secret-key", "default-secret-key", "changeme"];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

fn validate_payment_provider(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "stripe" | "mock" => Ok(()),
        _ => {
            let mut err = ValidationError::new("payment_provider");
            err.message = Some("Must be one of: stripe, mock".into());
            Err(err)
        }
    }
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
        let mut err = ValidationError::new("default_tax_rate");
        err.message = Some("default_tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_non_negative_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() {
        let mut err = ValidationError::new("amount");
        err.message = Some("Amount must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("fragrance_api={},tower_http=debug", level);
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

/// Loads application configuration from the `config/` directory
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] but reads TOML files from `config_dir`
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://fragrance.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(
            File::with_name(&config_dir.join("default").to_string_lossy()).required(false),
        )
        .add_source(File::with_name(&config_dir.join(&run_env).to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to a secure random string.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SECRET: &str = "a_sufficiently_random_secret_for_unit_tests_9f8e7d";

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            SECRET.into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    fn write_config(dir: &TempDir, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
        writeln!(file, "{}", content).unwrap();
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let mut cfg = base_config();
        cfg.payment_provider = "stripe".into();
        cfg.stripe_secret_key = Some("sk_test_123".into());
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn stripe_requires_secret_key() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.payment_provider = "stripe".into();
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.errors().contains_key("stripe_secret_key"));
    }

    #[test]
    fn mock_provider_rejected_in_production() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.errors().contains_key("payment_provider"));
    }

    #[test]
    fn tax_rate_out_of_range_fails_validation() {
        let mut cfg = base_config();
        cfg.default_tax_rate = 1.5;
        assert!(cfg.validate().is_err());

        cfg.default_tax_rate = 0.2;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_event_channel_capacity_fails_validation() {
        let mut cfg = base_config();
        cfg.event_channel_capacity = 0;
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("event_channel_capacity"));
    }

    #[test]
    fn page_size_is_clamped() {
        let cfg = base_config();
        assert_eq!(cfg.page_size(None), 20);
        assert_eq!(cfg.page_size(Some(0)), 1);
        assert_eq!(cfg.page_size(Some(5000)), 100);
    }

    #[test]
    fn loads_layered_toml_files() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            &format!(
                r#"
                jwt_secret = "{SECRET}"
                shipping_flat_rate = "7.50"
                free_shipping_threshold = 150
                default_tax_rate = 0.05
                "#
            ),
        );

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.shipping_flat_rate, dec!(7.50));
        assert_eq!(cfg.free_shipping_threshold, dec!(150));
        assert_eq!(cfg.tax_rate(), dec!(0.05));
        assert_eq!(cfg.payment_provider, "mock");
    }

    #[test]
    fn missing_jwt_secret_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "default.toml", "log_level = \"debug\"");
        if env::var("APP__JWT_SECRET").is_ok() {
            return;
        }
        assert!(matches!(
            load_config_from(dir.path()),
            Err(AppConfigError::Load(_))
        ));
    }
}
