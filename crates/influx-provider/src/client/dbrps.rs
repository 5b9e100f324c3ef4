//! Database/retention-policy (DBRP) mapping API
//!
//! The structured client does not cover these endpoints, so the request
//! shapes here follow the raw HTTP contract:
//!
//! - `POST dbrps?orgID=<org>` expects `201 Created`
//! - `GET dbrps/?orgID=<org>&bucketID=<bucket>` expects `200` with `{"content": [...]}`
//! - `PATCH dbrps/<id>?orgID=<org>` expects `200`
//! - `DELETE dbrps/<id>?orgID=<org>`

use super::InfluxClient;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Remote DBRP mapping operations
#[async_trait]
pub trait DbrpApi: Send + Sync {
    async fn create_mapping(&self, mapping: &NewDbrpMapping) -> Result<()>;

    /// Mappings for one bucket, in server order
    async fn list_mappings(&self, org_id: &str, bucket_id: &str) -> Result<Vec<DbrpMapping>>;

    /// Change only the retention policy label of a mapping
    async fn update_mapping(&self, id: &str, org_id: &str, retention_policy: &str) -> Result<()>;

    async fn delete_mapping(&self, id: &str, org_id: &str) -> Result<()>;
}

/// Body of `POST /api/v2/dbrps`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDbrpMapping {
    #[serde(rename = "bucketID")]
    pub bucket_id: String,

    pub database: String,

    pub default: bool,

    #[serde(rename = "orgID")]
    pub org_id: String,

    pub retention_policy: String,
}

/// Mapping as listed by the server
///
/// Only `id` is guaranteed; the other fields default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbrpMapping {
    pub id: String,

    #[serde(rename = "bucketID", default)]
    pub bucket_id: String,

    #[serde(rename = "orgID", default)]
    pub org_id: String,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub retention_policy: String,

    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Deserialize)]
struct DbrpList {
    #[serde(default)]
    content: Vec<DbrpMapping>,
}

#[derive(Debug, Serialize)]
struct DbrpUpdate<'a> {
    retention_policy: &'a str,
}

#[async_trait]
impl<T: DbrpApi + ?Sized> DbrpApi for std::sync::Arc<T> {
    async fn create_mapping(&self, mapping: &NewDbrpMapping) -> Result<()> {
        (**self).create_mapping(mapping).await
    }

    async fn list_mappings(&self, org_id: &str, bucket_id: &str) -> Result<Vec<DbrpMapping>> {
        (**self).list_mappings(org_id, bucket_id).await
    }

    async fn update_mapping(&self, id: &str, org_id: &str, retention_policy: &str) -> Result<()> {
        (**self).update_mapping(id, org_id, retention_policy).await
    }

    async fn delete_mapping(&self, id: &str, org_id: &str) -> Result<()> {
        (**self).delete_mapping(id, org_id).await
    }
}

#[async_trait]
impl DbrpApi for InfluxClient {
    async fn create_mapping(&self, mapping: &NewDbrpMapping) -> Result<()> {
        let url = self.endpoint("dbrps", &[("orgID", mapping.org_id.as_str())])?;
        self.send(self.post(url).json(mapping), &[StatusCode::CREATED])
            .await?;
        Ok(())
    }

    async fn list_mappings(&self, org_id: &str, bucket_id: &str) -> Result<Vec<DbrpMapping>> {
        let url = self.endpoint("dbrps/", &[("orgID", org_id), ("bucketID", bucket_id)])?;
        let list: DbrpList = self.send_json(self.get(url), &[StatusCode::OK]).await?;
        Ok(list.content)
    }

    async fn update_mapping(&self, id: &str, org_id: &str, retention_policy: &str) -> Result<()> {
        let url = self.item_endpoint("dbrps", id, &[("orgID", org_id)])?;
        let body = DbrpUpdate { retention_policy };
        self.send(self.patch(url).json(&body), &[StatusCode::OK])
            .await?;
        Ok(())
    }

    async fn delete_mapping(&self, id: &str, org_id: &str) -> Result<()> {
        let url = self.item_endpoint("dbrps", id, &[("orgID", org_id)])?;
        self.send(self.delete(url), &[StatusCode::NO_CONTENT, StatusCode::OK])
            .await?;
        Ok(())
    }
}
