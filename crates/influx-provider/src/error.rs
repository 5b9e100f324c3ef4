//! InfluxDB provider error types

use thiserror::Error;

/// Failure of a single call against the InfluxDB API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unable to parse response JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid resource id {0:?}")]
    InvalidId(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Provider configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("InfluxDB URL is not set (use --url or INFLUX_URL)")]
    MissingUrl,

    #[error("InfluxDB token is not set (use --token or INFLUX_TOKEN)")]
    MissingToken,

    #[error("invalid InfluxDB URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("log level must be between 1 (TRACE) and 5 (ERROR), got {0}")]
    InvalidLogLevel(String),

    #[error("no organization is visible to this token")]
    NoOrganization,

    #[error("error initializing the Influx API client: {0}")]
    Api(#[from] ApiError),
}

/// Bucket reconciliation errors
#[derive(Error, Debug)]
pub enum BucketError {
    #[error("invalid bucket configuration: {0}")]
    InvalidSpec(String),

    #[error("failed to create bucket {name}: {source}")]
    BucketCreateFailed {
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to create DBRP mapping for bucket {bucket_id} (bucket removed): {source}")]
    MappingCreateFailed {
        bucket_id: String,
        #[source]
        source: ApiError,
    },

    /// The mapping failed and the compensating bucket delete failed too.
    #[error(
        "failed bucket cleanup: bucket {bucket_id} remains after its DBRP mapping failed \
         (mapping error: {mapping}; cleanup error: {cleanup}); remote state needs manual repair"
    )]
    CleanupFailed {
        bucket_id: String,
        mapping: ApiError,
        cleanup: ApiError,
    },

    #[error("failed to get bucket {bucket_id}: {source}")]
    BucketReadFailed {
        bucket_id: String,
        #[source]
        source: ApiError,
    },

    #[error("no database retention policy mapping found for bucket {bucket_id}: {reason}")]
    MappingLookupFailed { bucket_id: String, reason: String },

    #[error("failed to update bucket {bucket_id}: {source}")]
    BucketUpdateFailed {
        bucket_id: String,
        #[source]
        source: ApiError,
    },

    #[error("bucket {bucket_id} was updated but its DBRP mapping {mapping_id} was not: {source}")]
    MappingUpdateFailed {
        bucket_id: String,
        mapping_id: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to delete bucket {bucket_id}: {source}")]
    BucketDeleteFailed {
        bucket_id: String,
        #[source]
        source: ApiError,
    },

    #[error("bucket {bucket_id} was deleted but DBRP mapping {mapping_id} is orphaned: {source}")]
    MappingDeleteFailed {
        bucket_id: String,
        mapping_id: String,
        #[source]
        source: ApiError,
    },

    #[error("{field} of bucket {bucket_id} cannot change in place ({from:?} -> {to:?})")]
    ImmutableField {
        bucket_id: String,
        field: &'static str,
        from: String,
        to: String,
    },

    #[error("bucket not found: {0}")]
    NotFound(String),
}

impl BucketError {
    /// Remote state is inconsistent and cannot be recovered by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BucketError::CleanupFailed { .. })
    }

    /// The bucket no longer exists but its mapping might.
    pub fn is_partial_delete(&self) -> bool {
        matches!(self, BucketError::MappingDeleteFailed { .. })
    }
}

/// Authorization management errors
#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("invalid authorization configuration: {0}")]
    InvalidSpec(String),

    #[error("failed to create authorization {name}: {source}")]
    CreateFailed {
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to get authorization {id}: {source}")]
    ReadFailed {
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to update authorization status of {id}: {source}")]
    UpdateFailed {
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to delete authorization {id}: {source}")]
    DeleteFailed {
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("{field} of authorization {id} cannot change in place")]
    ImmutableField { id: String, field: &'static str },

    #[error("authorization not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;
