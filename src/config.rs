//! Configuration module for the self-service flows.

use serde::Deserialize;
use std::path::Path;

use crate::{FlowError, Result};

/// Verification gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the verification backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Static authorization token sent with every request.
    #[serde(default = "default_auth_token")]
    pub auth_token: String,
    /// Request timeout in seconds for every remote call.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://verification.bank.internal/api".to_string()
}

fn default_auth_token() -> String {
    String::new()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: default_auth_token(),
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Flow timing and input-shape configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    /// Quiet period in milliseconds before a username lookup fires.
    #[serde(default = "default_username_debounce_ms")]
    pub username_debounce_ms: u64,
    /// Number of digits in a national ID.
    #[serde(default = "default_national_id_length")]
    pub national_id_length: usize,
    /// Validity window of a one-time code in seconds.
    #[serde(default = "default_otp_validity_secs")]
    pub otp_validity_secs: u32,
    /// Number of digits in a one-time code.
    #[serde(default = "default_otp_code_length")]
    pub otp_code_length: usize,
    /// Seconds the success confirmation stays visible before the flow
    /// navigates back to its entry point.
    #[serde(default = "default_success_redirect_delay_secs")]
    pub success_redirect_delay_secs: u64,
    /// Seconds before a failure notice is dismissed automatically.
    #[serde(default = "default_notice_dismiss_secs")]
    pub notice_dismiss_secs: u64,
}

fn default_username_debounce_ms() -> u64 {
    800
}

fn default_national_id_length() -> usize {
    10
}

fn default_otp_validity_secs() -> u32 {
    120
}

fn default_otp_code_length() -> usize {
    6
}

fn default_success_redirect_delay_secs() -> u64 {
    3
}

fn default_notice_dismiss_secs() -> u64 {
    5
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            username_debounce_ms: default_username_debounce_ms(),
            national_id_length: default_national_id_length(),
            otp_validity_secs: default_otp_validity_secs(),
            otp_code_length: default_otp_code_length(),
            success_redirect_delay_secs: default_success_redirect_delay_secs(),
            notice_dismiss_secs: default_notice_dismiss_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/selfserve.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Verification gateway configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Flow timing configuration.
    #[serde(default)]
    pub flow: FlowConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| FlowError::Unknown(format!("config read error: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FlowError::Unknown(format!("config parse error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(
            config.gateway.base_url,
            "https://verification.bank.internal/api"
        );
        assert_eq!(config.gateway.auth_token, "");
        assert_eq!(config.gateway.timeout_secs, 10);

        assert_eq!(config.flow.username_debounce_ms, 800);
        assert_eq!(config.flow.national_id_length, 10);
        assert_eq!(config.flow.otp_validity_secs, 120);
        assert_eq!(config.flow.otp_code_length, 6);
        assert_eq!(config.flow.success_redirect_delay_secs, 3);
        assert_eq!(config.flow.notice_dismiss_secs, 5);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/selfserve.log");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
            [gateway]
            base_url = "https://staging.bank.example/api"
            auth_token = "token-123"

            [flow]
            otp_validity_secs = 60
        "#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.gateway.base_url, "https://staging.bank.example/api");
        assert_eq!(config.gateway.auth_token, "token-123");
        // Unspecified fields fall back to defaults
        assert_eq!(config.gateway.timeout_secs, 10);
        assert_eq!(config.flow.otp_validity_secs, 60);
        assert_eq!(config.flow.username_debounce_ms, 800);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.flow.otp_validity_secs, 120);
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("gateway = \"not a table\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[flow]\nusername_debounce_ms = 500").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.flow.username_debounce_ms, 500);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("does/not/exist.toml");
        assert!(result.is_err());
    }
}
