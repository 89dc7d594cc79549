//! SDK configuration.
//!
//! # Environment Variables
//!
//! [`IcpayConfig::from_env`] reads:
//!
//! - `ICPAY_API_URL`: payment API base URL (default: `https://api.icpay.org`)
//! - `ICPAY_SECRET_KEY` and optional `ICPAY_ACCOUNT_ID`: server credentials
//! - `ICPAY_PUBLISHABLE_KEY`: public credentials, used when no secret key is set
//! - `ICPAY_PLATFORM_CANISTER_ID`: fixed payment destination, skips the lookup
//! - `ICPAY_REQUEST_TIMEOUT_MS`: per-request timeout for API calls
//! - `ICPAY_POLL_ATTEMPTS`, `ICPAY_POLL_INTERVAL_MS`, `ICPAY_POLL_DEADLINE_MS`: status polling

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::IcpayError;
use crate::poll::RetryPolicy;
use crate::principal::Principal;

/// Credentials for the backend payment API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ApiCredentials {
    /// Server-side secret key, optionally scoped to one account.
    #[serde(rename_all = "camelCase")]
    Secret {
        /// The secret key.
        secret_key: String,
        /// Account the key acts for.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_id: Option<String>,
    },
    /// Browser-safe publishable key.
    #[serde(rename_all = "camelCase")]
    Publishable {
        /// The publishable key.
        publishable_key: String,
    },
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret { account_id, .. } => f
                .debug_struct("Secret")
                .field("secret_key", &"<redacted>")
                .field("account_id", account_id)
                .finish(),
            Self::Publishable { publishable_key } => f
                .debug_struct("Publishable")
                .field("publishable_key", publishable_key)
                .finish(),
        }
    }
}

/// Top-level SDK configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcpayConfig {
    /// Payment API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    /// API credentials. Read-only endpoints need at least a publishable key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ApiCredentials>,
    /// Fixed payment destination. When unset, it is fetched from the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_canister_id: Option<Principal>,
    /// Per-request timeout for API calls, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    /// Status polling policy.
    #[serde(default)]
    pub polling: RetryPolicy,
}

/// Default payment API base URL.
pub const DEFAULT_API_URL: &str = "https://api.icpay.org";

fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("DEFAULT_API_URL is a valid URL")
}

impl Default for IcpayConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            credentials: None,
            platform_canister_id: None,
            request_timeout_ms: None,
            polling: RetryPolicy::default(),
        }
    }
}

impl IcpayConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`IcpayError::InvalidConfig`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, IcpayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`IcpayError::InvalidConfig`] if a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IcpayError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = get("ICPAY_API_URL") {
            config.api_url = parse_var("ICPAY_API_URL", &url)?;
        }
        config.credentials = match (get("ICPAY_SECRET_KEY"), get("ICPAY_PUBLISHABLE_KEY")) {
            (Some(secret_key), _) => Some(ApiCredentials::Secret {
                secret_key,
                account_id: get("ICPAY_ACCOUNT_ID"),
            }),
            (None, Some(publishable_key)) => Some(ApiCredentials::Publishable { publishable_key }),
            (None, None) => None,
        };
        if let Some(id) = get("ICPAY_PLATFORM_CANISTER_ID") {
            config.platform_canister_id = Some(parse_var("ICPAY_PLATFORM_CANISTER_ID", &id)?);
        }
        if let Some(ms) = get("ICPAY_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = Some(parse_var("ICPAY_REQUEST_TIMEOUT_MS", &ms)?);
        }
        if let Some(attempts) = get("ICPAY_POLL_ATTEMPTS") {
            config.polling.max_attempts = parse_var("ICPAY_POLL_ATTEMPTS", &attempts)?;
        }
        if let Some(ms) = get("ICPAY_POLL_INTERVAL_MS") {
            config.polling.interval = Duration::from_millis(parse_var("ICPAY_POLL_INTERVAL_MS", &ms)?);
        }
        if let Some(ms) = get("ICPAY_POLL_DEADLINE_MS") {
            config.polling.deadline = Some(Duration::from_millis(parse_var("ICPAY_POLL_DEADLINE_MS", &ms)?));
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the polling policy.
    #[must_use]
    pub const fn with_polling(mut self, polling: RetryPolicy) -> Self {
        self.polling = polling;
        self
    }

    /// The request timeout, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Checks the values that cannot be checked by deserialization alone.
    ///
    /// # Errors
    ///
    /// Returns [`IcpayError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), IcpayError> {
        if !matches!(self.api_url.scheme(), "http" | "https") || self.api_url.cannot_be_a_base() {
            return Err(IcpayError::invalid_config(format!(
                "api url must be an http(s) base url, got {}",
                self.api_url
            )));
        }
        match &self.credentials {
            Some(ApiCredentials::Secret { secret_key, .. }) if secret_key.is_empty() => {
                Err(IcpayError::invalid_config("secret key is empty"))
            }
            Some(ApiCredentials::Publishable { publishable_key }) if publishable_key.is_empty() => {
                Err(IcpayError::invalid_config("publishable key is empty"))
            }
            _ => Ok(()),
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, IcpayError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| IcpayError::invalid_config(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<IcpayConfig, IcpayError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        IcpayConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, IcpayConfig::default());
        assert_eq!(config.polling.max_attempts, 30);
    }

    #[test]
    fn secret_key_wins_over_publishable_key() {
        let config = load(&[
            ("ICPAY_SECRET_KEY", "sk_live_1"),
            ("ICPAY_ACCOUNT_ID", "acc_1"),
            ("ICPAY_PUBLISHABLE_KEY", "pk_live_1"),
        ])
        .unwrap();
        assert_eq!(
            config.credentials,
            Some(ApiCredentials::Secret {
                secret_key: "sk_live_1".into(),
                account_id: Some("acc_1".into()),
            })
        );
        assert!(!format!("{:?}", config.credentials).contains("sk_live_1"));
    }

    #[test]
    fn polling_overrides_are_read() {
        let config = load(&[
            ("ICPAY_POLL_ATTEMPTS", "5"),
            ("ICPAY_POLL_INTERVAL_MS", "250"),
            ("ICPAY_POLL_DEADLINE_MS", "10000"),
            ("ICPAY_PLATFORM_CANISTER_ID", "aaaaa-aa"),
        ])
        .unwrap();
        assert_eq!(config.polling.max_attempts, 5);
        assert_eq!(config.polling.interval, Duration::from_millis(250));
        assert_eq!(config.polling.deadline, Some(Duration::from_secs(10)));
        assert_eq!(config.platform_canister_id.unwrap().as_str(), "aaaaa-aa");
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = load(&[("ICPAY_POLL_ATTEMPTS", "many")]).unwrap_err();
        assert!(matches!(err, IcpayError::InvalidConfig { .. }));
        assert!(err.to_string().contains("ICPAY_POLL_ATTEMPTS"));

        let err = load(&[("ICPAY_API_URL", "ftp://example.org")]).unwrap_err();
        assert!(matches!(err, IcpayError::InvalidConfig { .. }));

        let err = load(&[("ICPAY_API_URL", "not a url")]).unwrap_err();
        assert!(err.to_string().contains("ICPAY_API_URL"));
    }

    #[test]
    fn api_url_is_parsed() {
        let config = load(&[("ICPAY_API_URL", "http://localhost:8080/sdk")]).unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:8080/sdk");
        assert_eq!(IcpayConfig::default().api_url.as_str(), "https://api.icpay.org/");

        let mut config = IcpayConfig::default();
        config.api_url = Url::parse("mailto:ops@icpay.org").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_camel_case() {
        let config: IcpayConfig = serde_json::from_str(
            r#"{"credentials":{"type":"publishable","publishableKey":"pk_1"},"polling":{"maxAttempts":3,"interval":10}}"#,
        )
        .unwrap();
        assert_eq!(config.api_url, default_api_url());
        assert_eq!(config.polling.max_attempts, 3);
        assert!(matches!(config.credentials, Some(ApiCredentials::Publishable { .. })));
    }
}
