// src/sponsor.rs
use std::fmt;

use tracing::debug;

pub const DEFAULT_BUNDLER_BASE_URL: &str = "https://bundler.0xgasless.com";
pub const DEFAULT_PAYMASTER_BASE_URL: &str = "https://paymaster.0xgasless.com";

pub const API_KEY_ENV: &str = "GASLESS_API_KEY";
pub const BUNDLER_URL_ENV: &str = "GASLESS_BUNDLER_URL";
pub const PAYMASTER_URL_ENV: &str = "GASLESS_PAYMASTER_URL";

const REDACTED: &str = "***";

/// Sponsor API key. Never printed: it is part of the paymaster URL path.
#[derive(Clone, PartialEq, Eq)]
pub struct SponsorApiKey(String);

impl SponsorApiKey {
    /// Returns `None` for an empty or blank key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        (!key.is_empty()).then_some(Self(key))
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SponsorApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SponsorApiKey({})", REDACTED)
    }
}

/// Where the sponsor's services live and the credential used to reach the
/// paymaster.
#[derive(Debug, Clone)]
pub struct SponsorConfig {
    pub bundler_base_url: String,
    pub paymaster_base_url: String,
    pub api_key: Option<SponsorApiKey>,
}

impl SponsorConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            bundler_base_url: DEFAULT_BUNDLER_BASE_URL.to_string(),
            paymaster_base_url: DEFAULT_PAYMASTER_BASE_URL.to_string(),
            api_key: api_key.and_then(SponsorApiKey::new),
        }
    }

    /// Reads the API key and optional base URL overrides from the process
    /// environment.
    pub fn from_env() -> Self {
        let mut config = Self::new(std::env::var(API_KEY_ENV).ok());
        if let Ok(url) = std::env::var(BUNDLER_URL_ENV) {
            config.bundler_base_url = url;
        }
        if let Ok(url) = std::env::var(PAYMASTER_URL_ENV) {
            config.paymaster_base_url = url;
        }
        debug!(
            "Sponsor config: bundler={}, paymaster={}, api key set={}",
            config.bundler_base_url,
            config.paymaster_base_url,
            config.api_key.is_some()
        );
        config
    }

    pub fn with_base_urls(mut self, bundler: impl Into<String>, paymaster: impl Into<String>) -> Self {
        self.bundler_base_url = bundler.into();
        self.paymaster_base_url = paymaster.into();
        self
    }

    pub fn endpoints(&self, chain_id: u64, api_key: &SponsorApiKey) -> SponsorEndpoints {
        SponsorEndpoints {
            bundler_url: format!("{}/{}", self.bundler_base_url.trim_end_matches('/'), chain_id),
            paymaster_base_url: format!(
                "{}/v1/{}/rpc",
                self.paymaster_base_url.trim_end_matches('/'),
                chain_id
            ),
            api_key: api_key.clone(),
        }
    }
}

/// Bundler and paymaster URLs fixed for one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SponsorEndpoints {
    bundler_url: String,
    paymaster_base_url: String,
    api_key: SponsorApiKey,
}

impl SponsorEndpoints {
    pub fn bundler_url(&self) -> &str {
        &self.bundler_url
    }

    /// Full paymaster URL including the API key. Do not log it.
    pub fn paymaster_url(&self) -> String {
        format!("{}/{}", self.paymaster_base_url, self.api_key.expose())
    }

    pub fn redacted_paymaster_url(&self) -> String {
        format!("{}/{}", self.paymaster_base_url, REDACTED)
    }
}

impl fmt::Debug for SponsorEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SponsorEndpoints")
            .field("bundler_url", &self.bundler_url)
            .field("paymaster_url", &self.redacted_paymaster_url())
            .finish()
    }
}

impl fmt::Display for SponsorEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bundler {} / paymaster {}", self.bundler_url, self.redacted_paymaster_url())
    }
}
