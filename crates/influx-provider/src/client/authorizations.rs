//! Authorizations API

use super::InfluxClient;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Remote authorization operations
#[async_trait]
pub trait AuthorizationApi: Send + Sync {
    async fn create_authorization(
        &self,
        authorization: &NewAuthorization,
    ) -> Result<AuthorizationRecord>;

    async fn list_authorizations(&self) -> Result<Vec<AuthorizationRecord>>;

    async fn update_authorization_status(
        &self,
        id: &str,
        status: AuthorizationStatus,
    ) -> Result<AuthorizationRecord>;

    async fn delete_authorization(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Read,
    Write,
}

impl std::fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionAction::Read => write!(f, "read"),
            PermissionAction::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    #[default]
    Active,
    Inactive,
}

impl std::fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorizationStatus::Active => write!(f, "active"),
            AuthorizationStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for AuthorizationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(AuthorizationStatus::Active),
            "inactive" => Ok(AuthorizationStatus::Inactive),
            other => Err(format!(
                "status must be either active or inactive, got {:?}",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResource {
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "orgID", default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub action: PermissionAction,
    pub resource: PermissionResource,
}

/// Authorization as returned by the server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub id: String,

    /// Only guaranteed in the create response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default)]
    pub status: AuthorizationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "orgID")]
    pub org_id: String,

    /// Organization name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl std::fmt::Debug for AuthorizationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRecord")
            .field("id", &self.id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("status", &self.status)
            .field("description", &self.description)
            .field("org_id", &self.org_id)
            .field("org", &self.org)
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// Body of `POST /api/v2/authorizations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAuthorization {
    #[serde(rename = "orgID")]
    pub org_id: String,

    pub description: String,

    pub status: AuthorizationStatus,

    pub permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize)]
struct AuthorizationList {
    #[serde(default)]
    authorizations: Vec<AuthorizationRecord>,
}

#[derive(Debug, Serialize)]
struct StatusUpdate {
    status: AuthorizationStatus,
}

#[async_trait]
impl<T: AuthorizationApi + ?Sized> AuthorizationApi for std::sync::Arc<T> {
    async fn create_authorization(
        &self,
        authorization: &NewAuthorization,
    ) -> Result<AuthorizationRecord> {
        (**self).create_authorization(authorization).await
    }

    async fn list_authorizations(&self) -> Result<Vec<AuthorizationRecord>> {
        (**self).list_authorizations().await
    }

    async fn update_authorization_status(
        &self,
        id: &str,
        status: AuthorizationStatus,
    ) -> Result<AuthorizationRecord> {
        (**self).update_authorization_status(id, status).await
    }

    async fn delete_authorization(&self, id: &str) -> Result<()> {
        (**self).delete_authorization(id).await
    }
}

#[async_trait]
impl AuthorizationApi for InfluxClient {
    async fn create_authorization(
        &self,
        authorization: &NewAuthorization,
    ) -> Result<AuthorizationRecord> {
        let url = self.endpoint("authorizations", &[])?;
        self.send_json(self.post(url).json(authorization), &[StatusCode::CREATED])
            .await
    }

    async fn list_authorizations(&self) -> Result<Vec<AuthorizationRecord>> {
        let url = self.endpoint("authorizations", &[])?;
        let list: AuthorizationList = self.send_json(self.get(url), &[StatusCode::OK]).await?;
        Ok(list.authorizations)
    }

    async fn update_authorization_status(
        &self,
        id: &str,
        status: AuthorizationStatus,
    ) -> Result<AuthorizationRecord> {
        let url = self.item_endpoint("authorizations", id, &[])?;
        self.send_json(
            self.patch(url).json(&StatusUpdate { status }),
            &[StatusCode::OK],
        )
        .await
    }

    async fn delete_authorization(&self, id: &str) -> Result<()> {
        let url = self.item_endpoint("authorizations", id, &[])?;
        self.send(self.delete(url), &[StatusCode::NO_CONTENT, StatusCode::OK])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "inactive".parse::<AuthorizationStatus>().unwrap(),
            AuthorizationStatus::Inactive
        );
        assert!("paused".parse::<AuthorizationStatus>().is_err());
    }

    #[test]
    fn test_record_debug_redacts_token() {
        let record = AuthorizationRecord {
            id: "a1".to_string(),
            token: Some("very-secret".to_string()),
            status: AuthorizationStatus::Active,
            description: Some("ci".to_string()),
            org_id: "o1".to_string(),
            org: None,
            permissions: Vec::new(),
        };

        let rendered = format!("{:?}", record);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_permission_wire_format() {
        let permission = Permission {
            action: PermissionAction::Write,
            resource: PermissionResource {
                resource_type: "buckets".to_string(),
                id: Some("b1".to_string()),
                org_id: Some("o1".to_string()),
            },
        };

        assert_eq!(
            serde_json::to_value(&permission).unwrap(),
            serde_json::json!({
                "action": "write",
                "resource": { "type": "buckets", "id": "b1", "orgID": "o1" }
            })
        );
    }
}
