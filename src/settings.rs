use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AdapterError;
use crate::gateway::GatewayKind;

const PLACEHOLDER_TOKEN: &str = "dummy";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SquareEnvironment {
    Sandbox,
    Production,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SquareSettings {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub location_id: String,
    #[serde(default = "default_environment")]
    pub environment: SquareEnvironment,
    #[serde(default)]
    pub api_version: String,
    /// Overrides the environment's API host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_square_timeout_ms")]
    pub timeout_ms: u64,
    /// Authorize only; capture/void later.
    #[serde(default)]
    pub capture_manually: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for SquareSettings {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            application_id: String::new(),
            location_id: String::new(),
            environment: default_environment(),
            api_version: String::new(),
            base_url: None,
            timeout_ms: default_square_timeout_ms(),
            capture_manually: false,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_provider")]
    pub provider: GatewayKind,
    #[serde(default)]
    pub square: SquareSettings,
    pub server_port: u16,
    /// Public base URL used to build the checkout return URL.
    pub base_url: String,
    pub database_path: String,
    /// Product id of the deposit / down-payment product.
    #[serde(default)]
    pub deposit_product_id: Option<String>,
    /// Delay before retrieving a transaction on checkout return.
    #[serde(default = "default_callback_delay", with = "humantime_serde")]
    pub callback_delay: Duration,
    /// Where the buyer lands after a checkout return was processed.
    pub process_url: String,
    /// Partner used by token endpoints when the request names none.
    #[serde(default)]
    pub default_partner_id: Option<String>,
    /// Bearer token required on the host record routes when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_api_token: Option<String>,
}

/// Public values the client-side card form needs. Never carries the access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormValues {
    pub application_id: String,
    pub location_id: String,
    pub environment: SquareEnvironment,
    pub redirect_url: String,
    pub form_action_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            square: SquareSettings::default(),
            server_port: 8069,
            base_url: "http://localhost:8069".to_string(),
            database_path: "data/adapter.redb".to_string(),
            deposit_product_id: None,
            callback_delay: default_callback_delay(),
            process_url: "/payment/process".to_string(),
            default_partner_id: None,
            host_api_token: None,
        }
    }
}

impl Config {
    /// Load from config.toml (if present) and environment variables.
    /// Environment variables override file values.
    /// Supported env keys: PAYMENT_PROVIDER, SQUARE_ACCESS_TOKEN, SQUARE_APPLICATION_ID,
    /// SQUARE_LOCATION_ID, SQUARE_ENVIRONMENT, SQUARE_VERSION, SQUARE_BASE_URL, SQUARE_TIMEOUT_MS,
    /// SQUARE_CAPTURE_MANUALLY, SQUARE_DEPOSIT_PRODUCT_ID, SERVER_PORT, BASE_URL, DATABASE_PATH,
    /// CALLBACK_DELAY, PROCESS_URL, DEFAULT_PARTNER_ID, HOST_API_TOKEN
    pub fn load() -> Self {
        let base: Config = Default::default();
        let mut fig = Figment::from(Serialized::defaults(base));
        if std::path::Path::new("config.toml").exists() {
            fig = fig.merge(Toml::file("config.toml"));
        }
        let mut cfg: Config = fig.extract().unwrap_or_default();
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("PAYMENT_PROVIDER") {
            self.provider = v.parse().unwrap_or(self.provider);
        }
        if let Some(v) = get("SQUARE_ACCESS_TOKEN") {
            self.square.access_token = v;
        }
        if let Some(v) = get("SQUARE_APPLICATION_ID") {
            self.square.application_id = v;
        }
        if let Some(v) = get("SQUARE_LOCATION_ID") {
            self.square.location_id = v;
        }
        if let Some(v) = get("SQUARE_ENVIRONMENT") {
            self.square.environment = match v.to_ascii_lowercase().as_str() {
                "production" | "prod" => SquareEnvironment::Production,
                _ => SquareEnvironment::Sandbox,
            };
        }
        if let Some(v) = get("SQUARE_VERSION") {
            self.square.api_version = v;
        }
        if let Some(v) = get("SQUARE_BASE_URL") {
            self.square.base_url = Some(v);
        }
        if let Some(v) = get("SQUARE_TIMEOUT_MS") {
            self.square.timeout_ms = v.parse().unwrap_or(self.square.timeout_ms);
        }
        if let Some(v) = get("SQUARE_CAPTURE_MANUALLY") {
            self.square.capture_manually = parse_bool(&v);
        }
        if let Some(v) = get("SQUARE_DEPOSIT_PRODUCT_ID") {
            self.deposit_product_id = Some(v);
        }
        if let Some(v) = get("SERVER_PORT") {
            self.server_port = v.parse().unwrap_or(self.server_port);
        }
        if let Some(v) = get("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database_path = v;
        }
        if let Some(v) = get("CALLBACK_DELAY") {
            self.callback_delay = parse_duration_env(&v, self.callback_delay);
        }
        if let Some(v) = get("PROCESS_URL") {
            self.process_url = v;
        }
        if let Some(v) = get("DEFAULT_PARTNER_ID") {
            self.default_partner_id = Some(v);
        }
        if let Some(v) = get("HOST_API_TOKEN") {
            self.host_api_token = Some(v).filter(|t| !t.is_empty());
        }
    }

    /// Reject missing or placeholder credentials before any gateway call.
    pub fn validate(&self) -> Result<(), AdapterError> {
        let token = self.square.access_token.trim();
        if token.is_empty() || token == PLACEHOLDER_TOKEN {
            return Err(AdapterError::Configuration(
                "Please configure square account: access token is missing".to_string(),
            ));
        }
        if self.square.location_id.trim().is_empty() {
            return Err(AdapterError::Configuration(
                "Please configure square account: location id is missing".to_string(),
            ));
        }
        Ok(())
    }

    /// Absolute URL the gateway sends the buyer back to after checkout.
    pub fn return_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), crate::server::RETURN_PATH)
    }

    pub fn form_values(&self) -> FormValues {
        FormValues {
            application_id: self.square.application_id.clone(),
            location_id: self.square.location_id.clone(),
            environment: self.square.environment,
            redirect_url: self.return_url(),
            form_action_url: crate::server::CHECKOUT_PATH.to_string(),
        }
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn parse_duration_env(value: &str, current: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(current)
}

fn default_provider() -> GatewayKind {
    GatewayKind::Square
}

fn default_environment() -> SquareEnvironment {
    SquareEnvironment::Sandbox
}

fn default_square_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2_000
}

fn default_callback_delay() -> Duration {
    Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn configured() -> Config {
        let mut cfg = Config::default();
        cfg.square.access_token = "EAAA-token".into();
        cfg.square.location_id = "L1".into();
        cfg
    }

    #[test]
    fn test_placeholder_token_is_rejected() {
        let mut cfg = configured();
        assert!(cfg.validate().is_ok());

        cfg.square.access_token = "dummy".into();
        assert!(matches!(cfg.validate(), Err(AdapterError::Configuration(_))));

        cfg.square.access_token = String::new();
        assert!(matches!(cfg.validate(), Err(AdapterError::Configuration(_))));
    }

    #[test]
    fn test_missing_location_is_rejected() {
        let mut cfg = configured();
        cfg.square.location_id = " ".into();
        assert!(matches!(cfg.validate(), Err(AdapterError::Configuration(_))));
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SQUARE_ACCESS_TOKEN", "tok"),
            ("SQUARE_ENVIRONMENT", "production"),
            ("SQUARE_CAPTURE_MANUALLY", "true"),
            ("CALLBACK_DELAY", "250ms"),
            ("SERVER_PORT", "not-a-port"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.square.access_token, "tok");
        assert_eq!(cfg.square.environment, SquareEnvironment::Production);
        assert!(cfg.square.capture_manually);
        assert_eq!(cfg.callback_delay, Duration::from_millis(250));
        assert_eq!(cfg.server_port, 8069);
    }

    #[test]
    fn test_form_values_leave_out_access_token() {
        let mut cfg = configured();
        cfg.square.application_id = "sq0idp-app".into();
        cfg.base_url = "https://shop.example.com".into();

        let values = cfg.form_values();
        assert_eq!(values.application_id, "sq0idp-app");
        assert_eq!(values.location_id, "L1");
        assert_eq!(values.redirect_url, "https://shop.example.com/payment/square/validate");
        assert_eq!(values.form_action_url, "/payment/square/redirect_checkout");

        let json = serde_json::to_string(&values).unwrap();
        assert!(!json.contains("EAAA-token"));
        assert!(json.contains("\"environment\":\"sandbox\""));
    }

    #[test]
    fn test_return_url() {
        let mut cfg = Config::default();
        cfg.base_url = "https://shop.example.com/".into();
        assert_eq!(cfg.return_url(), "https://shop.example.com/payment/square/validate");
    }
}
