//! Provider configuration
//!
//! A [`Provider`] is built once from a [`ProviderConfig`] and handed to the
//! bucket reconciler and authorization manager. It owns the API client and
//! the organization every resource is created in.

use crate::authorization::AuthorizationManager;
use crate::bucket::BucketReconciler;
use crate::client::{InfluxClient, Organization};
use crate::error::ConfigError;
use tracing::level_filters::LevelFilter;

pub const URL_ENV: &str = "INFLUX_URL";
pub const TOKEN_ENV: &str = "INFLUX_TOKEN";
pub const LOG_LEVEL_ENV: &str = "INFLUX_LOG_LEVEL";

/// 1 = TRACE ... 5 = ERROR
pub const DEFAULT_LOG_LEVEL: u8 = 5;

/// Connection settings for an InfluxDB v2 server
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub url: String,
    pub token: String,
    pub log_level: u8,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            log_level: DEFAULT_LOG_LEVEL,
        }
    }

    pub fn with_log_level(mut self, log_level: u8) -> Self {
        self.log_level = log_level;
        self
    }

    /// Read `INFLUX_URL`, `INFLUX_TOKEN` and `INFLUX_LOG_LEVEL`
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(URL_ENV).map_err(|_| ConfigError::MissingUrl)?;
        let token = std::env::var(TOKEN_ENV).map_err(|_| ConfigError::MissingToken)?;
        let log_level = match std::env::var(LOG_LEVEL_ENV) {
            Ok(raw) => parse_log_level(&raw)?,
            Err(_) => DEFAULT_LOG_LEVEL,
        };

        let config = Self {
            url,
            token,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        url::Url::parse(&self.url).map_err(|source| ConfigError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        if !(1..=5).contains(&self.log_level) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.to_string()));
        }
        Ok(())
    }

    /// Most verbose level that is still logged
    pub fn level_filter(&self) -> LevelFilter {
        match self.log_level {
            1 => LevelFilter::TRACE,
            2 => LevelFilter::DEBUG,
            3 => LevelFilter::INFO,
            4 => LevelFilter::WARN,
            _ => LevelFilter::ERROR,
        }
    }
}

pub fn parse_log_level(raw: &str) -> Result<u8, ConfigError> {
    match raw.trim().parse::<u8>() {
        Ok(level) if (1..=5).contains(&level) => Ok(level),
        _ => Err(ConfigError::InvalidLogLevel(raw.to_string())),
    }
}

/// Configured provider: API client plus the resolved organization
#[derive(Debug, Clone)]
pub struct Provider {
    config: ProviderConfig,
    client: InfluxClient,
    organization: Organization,
}

impl Provider {
    /// Build the client and resolve the organization.
    ///
    /// The first organization visible to the token is used.
    pub async fn configure(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = InfluxClient::new(&config.url, config.token.clone())?;

        tracing::debug!("Resolving organization on {}", client.server_url());
        let organization = client
            .organizations()
            .await?
            .into_iter()
            .next()
            .ok_or(ConfigError::NoOrganization)?;
        tracing::info!(
            "Using organization {} ({})",
            organization.name,
            organization.id
        );

        Ok(Self::from_parts(config, client, organization))
    }

    pub fn from_parts(
        config: ProviderConfig,
        client: InfluxClient,
        organization: Organization,
    ) -> Self {
        Self {
            config,
            client,
            organization,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn client(&self) -> &InfluxClient {
        &self.client
    }

    pub fn org_id(&self) -> &str {
        &self.organization.id
    }

    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    pub fn buckets(&self) -> BucketReconciler<InfluxClient, InfluxClient> {
        BucketReconciler::new(self.client.clone(), self.client.clone(), self.org_id())
    }

    pub fn authorizations(&self) -> AuthorizationManager<InfluxClient> {
        AuthorizationManager::new(
            self.client.clone(),
            self.org_id(),
            self.client.server_url(),
        )
    }
}
