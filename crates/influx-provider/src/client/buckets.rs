//! Buckets API

use super::InfluxClient;
use crate::error::Result;
use crate::retention::RetentionRule;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Remote bucket operations
#[async_trait]
pub trait BucketApi: Send + Sync {
    async fn create_bucket(&self, bucket: &NewBucket) -> Result<BucketRecord>;

    /// Fails with [`crate::ApiError::NotFound`] when the bucket does not exist
    async fn find_bucket_by_id(&self, id: &str) -> Result<BucketRecord>;

    async fn update_bucket(&self, id: &str, update: &BucketUpdate) -> Result<BucketRecord>;

    async fn delete_bucket(&self, id: &str) -> Result<()>;
}

/// Bucket as returned by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    pub id: String,

    #[serde(rename = "orgID")]
    pub org_id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub retention_rules: Vec<RetentionRule>,
}

/// Body of `POST /api/v2/buckets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBucket {
    #[serde(rename = "orgID")]
    pub org_id: String,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub retention_rules: Vec<RetentionRule>,
}

/// Body of `PATCH /api/v2/buckets/{id}`
///
/// The description is always sent so that clearing it takes effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketUpdate {
    pub name: String,
    pub description: String,
    pub retention_rules: Vec<RetentionRule>,
}

#[async_trait]
impl<T: BucketApi + ?Sized> BucketApi for std::sync::Arc<T> {
    async fn create_bucket(&self, bucket: &NewBucket) -> Result<BucketRecord> {
        (**self).create_bucket(bucket).await
    }

    async fn find_bucket_by_id(&self, id: &str) -> Result<BucketRecord> {
        (**self).find_bucket_by_id(id).await
    }

    async fn update_bucket(&self, id: &str, update: &BucketUpdate) -> Result<BucketRecord> {
        (**self).update_bucket(id, update).await
    }

    async fn delete_bucket(&self, id: &str) -> Result<()> {
        (**self).delete_bucket(id).await
    }
}

#[async_trait]
impl BucketApi for InfluxClient {
    async fn create_bucket(&self, bucket: &NewBucket) -> Result<BucketRecord> {
        let url = self.endpoint("buckets", &[])?;
        self.send_json(self.post(url).json(bucket), &[StatusCode::CREATED])
            .await
    }

    async fn find_bucket_by_id(&self, id: &str) -> Result<BucketRecord> {
        let url = self.item_endpoint("buckets", id, &[])?;
        self.send_json(self.get(url), &[StatusCode::OK]).await
    }

    async fn update_bucket(&self, id: &str, update: &BucketUpdate) -> Result<BucketRecord> {
        let url = self.item_endpoint("buckets", id, &[])?;
        self.send_json(self.patch(url).json(update), &[StatusCode::OK])
            .await
    }

    async fn delete_bucket(&self, id: &str) -> Result<()> {
        let url = self.item_endpoint("buckets", id, &[])?;
        self.send(self.delete(url), &[StatusCode::NO_CONTENT, StatusCode::OK])
            .await?;
        Ok(())
    }
}
