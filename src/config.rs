use gloo_net::http::Request;
use log::{warn, Level};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const CONFIG_PATH: &str = "assets/config.json";
const DEFAULT_THREAD_ENDPOINT: &str = "/api/thread";
const DEFAULT_BREAKPOINT_PX: f64 = 768.0;
// Optimism mainnet.
const DEFAULT_CHAIN_ID: u64 = 10;

/// What happens when an entry is dragged from one column into the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossColumnPolicy {
    /// The destination occupant goes back to the source's original slot, so
    /// both columns keep their length.
    #[default]
    Swap,
    /// Plain splice out of one column and into the other.
    Relocate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub admin_mode: bool,
    pub paired_breakpoint_px: f64,
    pub cross_column_policy: CrossColumnPolicy,
    pub expected_chain_id: u64,
    pub thread_endpoint: String,
    pub submit_endpoint: Option<String>,
    /// Shared order store. Without one, orders only live in this browser.
    pub order_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            admin_mode: env_flag(option_env!("AMACASTER_ADMIN_MODE")),
            paired_breakpoint_px: DEFAULT_BREAKPOINT_PX,
            cross_column_policy: CrossColumnPolicy::default(),
            expected_chain_id: option_env!("AMACASTER_CHAIN_ID")
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(DEFAULT_CHAIN_ID),
            thread_endpoint: DEFAULT_THREAD_ENDPOINT.to_owned(),
            submit_endpoint: None,
            order_endpoint: option_env!("AMACASTER_ORDER_ENDPOINT").map(str::to_owned),
            log_level: "info".to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.paired_breakpoint_px.is_finite() || self.paired_breakpoint_px <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "paired_breakpoint_px",
                reason: format!("{} is not a positive width", self.paired_breakpoint_px),
            });
        }

        if self.thread_endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "thread_endpoint",
                reason: "must not be empty".to_owned(),
            });
        }

        if Level::from_str(&self.log_level).is_err() {
            return Err(ConfigError::Invalid {
                field: "log_level",
                reason: format!("unknown level '{}'", self.log_level),
            });
        }

        Ok(())
    }

    pub fn log_level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::Info)
    }

    pub fn submit_endpoint(&self) -> Option<&str> {
        non_blank(self.submit_endpoint.as_deref())
    }

    pub fn order_endpoint(&self) -> Option<&str> {
        non_blank(self.order_endpoint.as_deref())
    }
}

/// Loads `assets/config.json`, keeping the compiled-in defaults when the
/// file is missing or unreadable.
pub async fn fetch_config() -> AppConfig {
    let response = match Request::get(CONFIG_PATH).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("Falling back to default config: {}", err);
            return AppConfig::default();
        }
    };

    if !response.ok() {
        if response.status() != 404 {
            warn!("HTTP {} while fetching {}", response.status(), CONFIG_PATH);
        }
        return AppConfig::default();
    }

    let text = match response.text().await {
        Ok(text) => text,
        Err(err) => {
            warn!("Falling back to default config: {}", err);
            return AppConfig::default();
        }
    };

    match AppConfig::from_json(&text) {
        Ok(config) => config,
        Err(err) => {
            warn!("Falling back to default config: {}", err);
            AppConfig::default()
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn env_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{ "admin_mode": true }"#).unwrap();
        assert!(config.admin_mode);
        assert_eq!(config.paired_breakpoint_px, 768.0);
        assert_eq!(config.cross_column_policy, CrossColumnPolicy::Swap);
        assert_eq!(config.thread_endpoint, "/api/thread");
    }

    #[test]
    fn policy_reads_snake_case() {
        let config =
            AppConfig::from_json(r#"{ "cross_column_policy": "relocate" }"#).unwrap();
        assert_eq!(config.cross_column_policy, CrossColumnPolicy::Relocate);
    }

    #[test]
    fn rejects_bad_breakpoint_and_level() {
        assert!(matches!(
            AppConfig::from_json(r#"{ "paired_breakpoint_px": 0 }"#),
            Err(ConfigError::Invalid { field: "paired_breakpoint_px", .. })
        ));
        assert!(matches!(
            AppConfig::from_json(r#"{ "log_level": "loud" }"#),
            Err(ConfigError::Invalid { field: "log_level", .. })
        ));
        assert!(matches!(
            AppConfig::from_json("{ nope"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn blank_submit_endpoint_is_none() {
        let config = AppConfig {
            submit_endpoint: Some("  ".to_owned()),
            ..AppConfig::default()
        };
        assert_eq!(config.submit_endpoint(), None);
    }

    #[test]
    fn order_endpoint_is_trimmed() {
        let config = AppConfig::from_json(r#"{ "order_endpoint": " /api/save-order " }"#).unwrap();
        assert_eq!(config.order_endpoint(), Some("/api/save-order"));

        let blank = AppConfig::from_json(r#"{ "order_endpoint": "" }"#).unwrap();
        assert_eq!(blank.order_endpoint(), None);
    }

    #[test]
    fn env_flag_values() {
        assert!(env_flag(Some("true")));
        assert!(env_flag(Some(" YES ")));
        assert!(!env_flag(Some("false")));
        assert!(!env_flag(None));
    }
}
