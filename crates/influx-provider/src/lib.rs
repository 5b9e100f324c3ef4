//! InfluxDB v2 provider
//!
//! Manages two kinds of resources over the InfluxDB v2 HTTP API:
//!
//! - `influx_bucket`: a bucket and its database/retention-policy (DBRP)
//!   mapping, reconciled as one unit by [`BucketReconciler`]
//! - `influx_authorization`: an API token with a fixed permission set,
//!   managed by [`AuthorizationManager`]
//!
//! # Example
//!
//! ```ignore
//! use influx_provider::{BucketSpec, Provider, ProviderConfig};
//!
//! let provider = Provider::configure(ProviderConfig::from_env()?).await?;
//! let (bucket, mapping) = provider
//!     .buckets()
//!     .create(&BucketSpec::new("metrics").with_retention_days(30))
//!     .await?;
//! ```

pub mod authorization;
pub mod bucket;
pub mod client;
pub mod error;
pub mod provider;
pub mod retention;

pub use authorization::{
    AuthorizationManager, AuthorizationSpec, AuthorizationState, PermissionSpec,
};
pub use bucket::{BucketReconciler, BucketSpec, BucketState};
pub use client::{
    AuthorizationApi, AuthorizationStatus, BucketApi, BucketRecord, DbrpApi, DbrpMapping,
    InfluxClient, Organization, PermissionAction,
};
pub use error::{ApiError, AuthorizationError, BucketError, ConfigError};
pub use provider::{Provider, ProviderConfig};
pub use retention::Retention;
