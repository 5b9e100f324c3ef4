//! Bucket reconciler
//!
//! Keeps a bucket and its DBRP mapping in step. The two live behind
//! different endpoints, so every operation is a short sequence of remote
//! calls:
//!
//! - create: bucket, then mapping; if the mapping fails the bucket is
//!   deleted again so nothing is left orphaned
//! - read: bucket by id, then its mapping by (org, bucket)
//! - update: bucket, then the mapping's retention label (no rollback)
//! - delete: bucket, then mapping (no rollback)
//!
//! Bucket name and organization are immutable: a change to either plans as
//! a replacement.

use crate::client::{
    BucketApi, BucketRecord, BucketUpdate, DbrpApi, DbrpMapping, NewBucket, NewDbrpMapping,
};
use crate::error::{ApiError, BucketError};
use crate::retention::Retention;
use influx_provider_core::{Action, ActionType, Change, classify};
use serde::{Deserialize, Serialize};

pub const RESOURCE_TYPE: &str = "influx_bucket";

/// Desired state of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Zero means infinite retention
    #[serde(default)]
    pub retention_days: u32,

    /// Defaults to the provider's organization
    #[serde(default)]
    pub org_id: Option<String>,
}

impl BucketSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            retention_days: 0,
            org_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn retention(&self) -> Retention {
        Retention::from_days(self.retention_days)
    }

    fn validate(&self) -> Result<(), BucketError> {
        if self.name.trim().is_empty() {
            return Err(BucketError::InvalidSpec(
                "bucket name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Persisted state of a managed bucket and its mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketState {
    pub id: String,
    pub dbrp_id: String,
    pub org_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub retention_days: u32,
}

impl BucketState {
    pub fn from_remote(bucket: &BucketRecord, mapping: &DbrpMapping) -> Self {
        Self {
            id: bucket.id.clone(),
            dbrp_id: mapping.id.clone(),
            org_id: bucket.org_id.clone(),
            name: bucket.name.clone(),
            description: non_empty(bucket.description.as_deref()),
            retention_days: Retention::from_rules(&bucket.retention_rules).days(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Orchestrates the Buckets API and the DBRP mapping API as one unit
pub struct BucketReconciler<B, D> {
    buckets: B,
    dbrps: D,
    org_id: String,
}

impl<B: BucketApi, D: DbrpApi> BucketReconciler<B, D> {
    /// `org_id` is the organization used when a spec does not name one
    pub fn new(buckets: B, dbrps: D, org_id: impl Into<String>) -> Self {
        Self {
            buckets,
            dbrps,
            org_id: org_id.into(),
        }
    }

    fn target_org<'a>(&'a self, spec: &'a BucketSpec) -> &'a str {
        spec.org_id.as_deref().unwrap_or(&self.org_id)
    }

    /// Create the bucket and its mapping, removing the bucket again if the
    /// mapping cannot be created.
    pub async fn create(
        &self,
        spec: &BucketSpec,
    ) -> Result<(BucketRecord, DbrpMapping), BucketError> {
        spec.validate()?;
        let retention = spec.retention();

        tracing::info!("Creating bucket with name: {}", spec.name);
        let bucket = self
            .buckets
            .create_bucket(&NewBucket {
                org_id: self.target_org(spec).to_string(),
                name: spec.name.clone(),
                description: spec.description.clone(),
                retention_rules: retention.rules(),
            })
            .await
            .map_err(|source| BucketError::BucketCreateFailed {
                name: spec.name.clone(),
                source,
            })?;

        let mapping = NewDbrpMapping {
            bucket_id: bucket.id.clone(),
            database: spec.name.clone(),
            default: true,
            org_id: bucket.org_id.clone(),
            retention_policy: retention.label(),
        };

        tracing::info!(
            "Creating DBRP mapping {}/{} for bucket {}",
            mapping.database,
            mapping.retention_policy,
            bucket.id
        );
        if let Err(mapping_error) = self.dbrps.create_mapping(&mapping).await {
            return Err(self.remove_orphan(&bucket, mapping_error).await);
        }

        self.read(&bucket.id)
            .await?
            .ok_or_else(|| BucketError::NotFound(bucket.id.clone()))
    }

    /// Compensating delete after a failed mapping creation
    async fn remove_orphan(&self, bucket: &BucketRecord, mapping_error: ApiError) -> BucketError {
        tracing::warn!(
            "DBRP mapping for bucket {} failed, deleting the bucket: {}",
            bucket.id,
            mapping_error
        );

        match self.buckets.delete_bucket(&bucket.id).await {
            Ok(()) | Err(ApiError::NotFound(_)) => BucketError::MappingCreateFailed {
                bucket_id: bucket.id.clone(),
                source: mapping_error,
            },
            Err(cleanup) => {
                tracing::error!(
                    "Bucket {} could not be cleaned up and is orphaned: {}",
                    bucket.id,
                    cleanup
                );
                BucketError::CleanupFailed {
                    bucket_id: bucket.id.clone(),
                    mapping: mapping_error,
                    cleanup,
                }
            }
        }
    }

    /// Fetch a bucket and its mapping; `None` when the bucket does not exist.
    pub async fn read(
        &self,
        bucket_id: &str,
    ) -> Result<Option<(BucketRecord, DbrpMapping)>, BucketError> {
        tracing::debug!("Reading bucket with id: {}", bucket_id);

        let bucket = match self.buckets.find_bucket_by_id(bucket_id).await {
            Ok(bucket) => bucket,
            Err(ApiError::NotFound(_)) => {
                tracing::debug!("Bucket {} not found", bucket_id);
                return Ok(None);
            }
            Err(source) => {
                return Err(BucketError::BucketReadFailed {
                    bucket_id: bucket_id.to_string(),
                    source,
                });
            }
        };

        let mapping = self.find_mapping(&bucket).await?;
        Ok(Some((bucket, mapping)))
    }

    async fn find_mapping(&self, bucket: &BucketRecord) -> Result<DbrpMapping, BucketError> {
        let mappings = self
            .dbrps
            .list_mappings(&bucket.org_id, &bucket.id)
            .await
            .map_err(|e| BucketError::MappingLookupFailed {
                bucket_id: bucket.id.clone(),
                reason: e.to_string(),
            })?;

        if mappings.len() > 1 {
            tracing::warn!(
                "Bucket {} has {} DBRP mappings, using {}",
                bucket.id,
                mappings.len(),
                mappings[0].id
            );
        }

        mappings
            .into_iter()
            .next()
            .ok_or_else(|| BucketError::MappingLookupFailed {
                bucket_id: bucket.id.clone(),
                reason: "no mapping id found".to_string(),
            })
    }

    /// Update description and retention of an existing bucket, then the
    /// retention label of its stored mapping.
    pub async fn update(
        &self,
        state: &BucketState,
        spec: &BucketSpec,
    ) -> Result<BucketRecord, BucketError> {
        spec.validate()?;
        if spec.name != state.name {
            return Err(BucketError::ImmutableField {
                bucket_id: state.id.clone(),
                field: "name",
                from: state.name.clone(),
                to: spec.name.clone(),
            });
        }
        let org_id = self.target_org(spec);
        if org_id != state.org_id {
            return Err(BucketError::ImmutableField {
                bucket_id: state.id.clone(),
                field: "org_id",
                from: state.org_id.clone(),
                to: org_id.to_string(),
            });
        }

        let retention = spec.retention();

        tracing::info!("Updating bucket id: {}", state.id);
        let bucket = self
            .buckets
            .update_bucket(
                &state.id,
                &BucketUpdate {
                    name: spec.name.clone(),
                    description: spec.description.clone().unwrap_or_default(),
                    retention_rules: retention.rules(),
                },
            )
            .await
            .map_err(|source| BucketError::BucketUpdateFailed {
                bucket_id: state.id.clone(),
                source,
            })?;

        tracing::info!(
            "Updating DBRP mapping {} to retention policy {}",
            state.dbrp_id,
            retention.label()
        );
        self.dbrps
            .update_mapping(&state.dbrp_id, &state.org_id, &retention.label())
            .await
            .map_err(|source| BucketError::MappingUpdateFailed {
                bucket_id: state.id.clone(),
                mapping_id: state.dbrp_id.clone(),
                source,
            })?;

        Ok(bucket)
    }

    /// Delete the bucket, then its mapping. Ids are taken from stored state.
    pub async fn delete(
        &self,
        bucket_id: &str,
        mapping_id: &str,
        org_id: &str,
    ) -> Result<(), BucketError> {
        tracing::info!("Deleting bucket id: {}", bucket_id);
        match self.buckets.delete_bucket(bucket_id).await {
            Ok(()) => {}
            Err(ApiError::NotFound(_)) => {
                tracing::warn!("Bucket {} was already deleted", bucket_id);
            }
            Err(source) => {
                return Err(BucketError::BucketDeleteFailed {
                    bucket_id: bucket_id.to_string(),
                    source,
                });
            }
        }

        tracing::info!("Deleting DBRP mapping id: {}", mapping_id);
        match self.dbrps.delete_mapping(mapping_id, org_id).await {
            Ok(()) => Ok(()),
            // The server may drop the mapping together with the bucket
            Err(ApiError::NotFound(_)) => {
                tracing::debug!("DBRP mapping {} already removed", mapping_id);
                Ok(())
            }
            Err(source) => Err(BucketError::MappingDeleteFailed {
                bucket_id: bucket_id.to_string(),
                mapping_id: mapping_id.to_string(),
                source,
            }),
        }
    }

    /// Attribute changes between a managed bucket and its desired spec
    pub fn changes(&self, prior: &BucketState, desired: &BucketSpec) -> Vec<Change> {
        let mut changes = Vec::new();

        if prior.name != desired.name {
            changes.push(
                Change::new("name", Some(prior.name.clone()), Some(desired.name.clone()))
                    .forcing_replacement(),
            );
        }

        let org_id = self.target_org(desired);
        if prior.org_id != org_id {
            changes.push(
                Change::new("org_id", Some(prior.org_id.clone()), Some(org_id.to_string()))
                    .forcing_replacement(),
            );
        }

        let description = non_empty(desired.description.as_deref());
        if prior.description != description {
            changes.push(Change::new(
                "description",
                prior.description.clone(),
                description,
            ));
        }

        if prior.retention_days != desired.retention_days {
            changes.push(Change::new(
                "retention_days",
                Some(prior.retention_days.to_string()),
                Some(desired.retention_days.to_string()),
            ));
        }

        changes
    }

    fn action_type(&self, prior: Option<&BucketState>, desired: Option<&BucketSpec>) -> ActionType {
        match (prior, desired) {
            (None, None) => ActionType::NoOp,
            (None, Some(_)) => ActionType::Create,
            (Some(_), None) => ActionType::Delete,
            (Some(prior), Some(desired)) => classify(&self.changes(prior, desired)),
        }
    }

    /// Plan the action that brings `prior` to `desired`
    pub fn plan(
        &self,
        resource_name: &str,
        prior: Option<&BucketState>,
        desired: Option<&BucketSpec>,
    ) -> Action {
        let changes = match (prior, desired) {
            (Some(prior), Some(desired)) => self.changes(prior, desired),
            (None, Some(desired)) => vec![
                Change::new("name", None, Some(desired.name.clone())),
                Change::new("org_id", None, Some(self.target_org(desired).to_string())),
                Change::new("description", None, non_empty(desired.description.as_deref())),
                Change::new(
                    "retention_days",
                    None,
                    Some(desired.retention_days.to_string()),
                ),
            ],
            _ => Vec::new(),
        };

        Action::new(self.action_type(prior, desired), RESOURCE_TYPE, resource_name)
            .with_changes(changes)
    }

    /// Run the planned action and return the resulting state
    pub async fn apply(
        &self,
        prior: Option<&BucketState>,
        desired: Option<&BucketSpec>,
    ) -> Result<Option<BucketState>, BucketError> {
        match (self.action_type(prior, desired), prior, desired) {
            (ActionType::Create, _, Some(spec)) => {
                let (bucket, mapping) = self.create(spec).await?;
                Ok(Some(BucketState::from_remote(&bucket, &mapping)))
            }
            (ActionType::Update, Some(prior), Some(spec)) => {
                self.update(prior, spec).await?;
                let (bucket, mapping) = self
                    .read(&prior.id)
                    .await?
                    .ok_or_else(|| BucketError::NotFound(prior.id.clone()))?;
                Ok(Some(BucketState::from_remote(&bucket, &mapping)))
            }
            (ActionType::Replace, Some(prior), Some(spec)) => {
                spec.validate()?;
                tracing::info!(
                    "Replacing bucket {} ({} -> {})",
                    prior.id,
                    prior.name,
                    spec.name
                );
                self.delete(&prior.id, &prior.dbrp_id, &prior.org_id).await?;
                let (bucket, mapping) = self.create(spec).await?;
                Ok(Some(BucketState::from_remote(&bucket, &mapping)))
            }
            (ActionType::Delete, Some(prior), _) => {
                self.delete(&prior.id, &prior.dbrp_id, &prior.org_id).await?;
                Ok(None)
            }
            _ => Ok(prior.cloned()),
        }
    }
}
