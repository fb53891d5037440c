//! Explicit configuration threaded through every component.

use std::time::Duration;

use chain_eth::chains::{self, PRODUCTION_CHAIN_ID};
use tracing::warn;

use crate::error::WalletError;

/// Upper bound on waiting for a submitted call batch.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between call-status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How the wallet API is reached.
#[derive(Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// A custom endpoint, used as-is.
    RpcUrl(String),
    /// The hosted endpoint, authenticated with a bearer token.
    Jwt(String),
    /// The hosted endpoint, authenticated with an API key in the path.
    ApiKey(String),
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportConfig::RpcUrl(url) => f.debug_tuple("RpcUrl").field(url).finish(),
            TransportConfig::Jwt(_) => f.write_str("Jwt(<redacted>)"),
            TransportConfig::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Settings for the wallet session, client cache and orchestrators.
#[derive(Clone)]
pub struct WalletConfig {
    pub api_key: Option<String>,
    pub jwt: Option<String>,
    pub rpc_url: Option<String>,
    /// Candidate sponsorship policies; the first one is used.
    pub policy_ids: Vec<String>,
    /// Whether submissions are sponsored unless the caller opts out.
    pub default_sponsored: bool,
    pub default_chain_id: u64,
    pub status_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            jwt: None,
            rpc_url: None,
            policy_ids: Vec::new(),
            default_sponsored: true,
            default_chain_id: PRODUCTION_CHAIN_ID,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl std::fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("WalletConfig")
            .field("api_key", &redact(&self.api_key))
            .field("jwt", &redact(&self.jwt))
            .field("rpc_url", &self.rpc_url)
            .field("policy_ids", &self.policy_ids)
            .field("default_sponsored", &self.default_sponsored)
            .field("default_chain_id", &self.default_chain_id)
            .field("status_timeout", &self.status_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl WalletConfig {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, WalletError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WalletError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self {
            api_key: get("ALCHEMY_API_KEY"),
            jwt: get("ALCHEMY_JWT"),
            rpc_url: get("ALCHEMY_RPC_URL"),
            ..Self::default()
        };

        if let Some(raw) = get("ALCHEMY_POLICY_ID") {
            config.policy_ids = raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = get("WALLET_DEFAULT_SPONSORED") {
            config.default_sponsored = parse_bool("WALLET_DEFAULT_SPONSORED", &raw)?;
        }
        if let Some(raw) = get("WALLET_DEFAULT_CHAIN_ID") {
            config.default_chain_id = chains::parse_chain_id(&raw)
                .map_err(|e| WalletError::Config(format!("WALLET_DEFAULT_CHAIN_ID: {e}")))?;
        }
        if let Some(raw) = get("WALLET_STATUS_TIMEOUT_SECS") {
            config.status_timeout =
                Duration::from_secs(parse_u64("WALLET_STATUS_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = get("WALLET_POLL_INTERVAL_MS") {
            config.poll_interval =
                Duration::from_millis(parse_u64("WALLET_POLL_INTERVAL_MS", &raw)?);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_jwt(mut self, jwt: impl Into<String>) -> Self {
        self.jwt = Some(jwt.into());
        self
    }

    #[must_use]
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_ids = vec![policy_id.into()];
        self
    }

    #[must_use]
    pub fn with_policy_ids<I, S>(mut self, policy_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy_ids = policy_ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Resolves the wallet API transport. A custom url takes precedence over
    /// a jwt, which takes precedence over an api key.
    pub fn transport(&self) -> Result<TransportConfig, WalletError> {
        let configured = [&self.rpc_url, &self.jwt, &self.api_key]
            .iter()
            .filter(|v| v.is_some())
            .count();
        if configured > 1 {
            warn!(configured, "several transports configured, using the first by precedence");
        }

        if let Some(url) = &self.rpc_url {
            Ok(TransportConfig::RpcUrl(url.clone()))
        } else if let Some(jwt) = &self.jwt {
            Ok(TransportConfig::Jwt(jwt.clone()))
        } else if let Some(key) = &self.api_key {
            Ok(TransportConfig::ApiKey(key.clone()))
        } else {
            Err(WalletError::MissingTransportConfig)
        }
    }

    /// The sponsorship policy in effect, if any.
    pub fn policy_id(&self) -> Option<&str> {
        self.policy_ids.first().map(String::as_str)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, WalletError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(WalletError::Config(format!("{key}: expected a boolean, got {raw}"))),
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, WalletError> {
    raw.parse()
        .map_err(|_| WalletError::Config(format!("{key}: expected an integer, got {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = WalletConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.default_chain_id, 8453);
        assert_eq!(config.status_timeout, Duration::from_secs(60));
        assert!(config.default_sponsored);
        assert!(config.policy_id().is_none());
    }

    #[test]
    fn missing_transport_is_an_error() {
        let config = WalletConfig::default();
        assert_eq!(config.transport(), Err(WalletError::MissingTransportConfig));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = WalletConfig::from_lookup(lookup(&[("ALCHEMY_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
        assert!(config.transport().is_err());
    }

    #[test]
    fn transport_precedence_url_then_jwt_then_key() {
        let config = WalletConfig::default().with_api_key("key").with_jwt("jwt");
        assert_eq!(config.transport().unwrap(), TransportConfig::Jwt("jwt".into()));

        let config = config.with_rpc_url("https://rpc.example");
        assert_eq!(
            config.transport().unwrap(),
            TransportConfig::RpcUrl("https://rpc.example".into())
        );
    }

    #[test]
    fn policy_list_uses_first() {
        let config = WalletConfig::from_lookup(lookup(&[(
            "ALCHEMY_POLICY_ID",
            "policy-a, policy-b",
        )]))
        .unwrap();
        assert_eq!(config.policy_ids, vec!["policy-a", "policy-b"]);
        assert_eq!(config.policy_id(), Some("policy-a"));
    }

    #[test]
    fn parses_caip2_default_chain() {
        let config =
            WalletConfig::from_lookup(lookup(&[("WALLET_DEFAULT_CHAIN_ID", "eip155:84532")]))
                .unwrap();
        assert_eq!(config.default_chain_id, 84532);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        for pairs in [
            [("WALLET_DEFAULT_SPONSORED", "maybe")],
            [("WALLET_STATUS_TIMEOUT_SECS", "soon")],
            [("WALLET_DEFAULT_CHAIN_ID", "base")],
        ] {
            assert!(matches!(
                WalletConfig::from_lookup(lookup(&pairs)),
                Err(WalletError::Config(_))
            ));
        }
    }

    #[test]
    fn durations_from_env() {
        let config = WalletConfig::from_lookup(lookup(&[
            ("WALLET_STATUS_TIMEOUT_SECS", "5"),
            ("WALLET_POLL_INTERVAL_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.status_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = WalletConfig::default().with_api_key("super-secret").with_jwt("tok");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("tok\""));
        assert!(debug.contains("<redacted>"));
        assert_eq!(
            format!("{:?}", TransportConfig::ApiKey("super-secret".into())),
            "ApiKey(<redacted>)"
        );
    }
}
