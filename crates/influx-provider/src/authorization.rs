//! Authorization (API token) management
//!
//! An authorization's name and permissions are fixed at creation; only its
//! active/inactive status can be changed in place.

use crate::client::{
    AuthorizationApi, AuthorizationRecord, AuthorizationStatus, NewAuthorization, Permission,
    PermissionAction, PermissionResource,
};
use crate::error::{ApiError, AuthorizationError};
use influx_provider_core::{Action, ActionType, Change, classify};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const RESOURCE_TYPE: &str = "influx_authorization";

/// One permission of an authorization
///
/// Parsed from `<action>:<type>[:<id>]`. Any action other than `write`
/// grants read access.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionSpec {
    pub action: PermissionAction,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl PermissionSpec {
    pub fn new(action: PermissionAction, resource_type: impl Into<String>) -> Self {
        Self {
            action,
            resource_type: resource_type.into(),
            resource_id: None,
        }
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    fn from_remote(permission: &Permission) -> Self {
        Self {
            action: permission.action,
            resource_type: permission.resource.resource_type.clone(),
            resource_id: permission.resource.id.clone().filter(|id| !id.is_empty()),
        }
    }

    fn to_remote(&self, org_id: &str) -> Permission {
        Permission {
            action: self.action,
            resource: PermissionResource {
                resource_type: self.resource_type.clone(),
                id: self.resource_id.clone().filter(|id| !id.is_empty()),
                org_id: Some(org_id.to_string()),
            },
        }
    }
}

impl std::fmt::Display for PermissionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.action, self.resource_type)?;
        if let Some(id) = &self.resource_id {
            write!(f, ":{}", id)?;
        }
        Ok(())
    }
}

impl FromStr for PermissionSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let action = parts.next().unwrap_or_default();
        let resource_type = parts.next().unwrap_or_default();
        if action.is_empty() || resource_type.is_empty() {
            return Err(format!(
                "permission must look like <action>:<type>[:<id>], got {:?}",
                s
            ));
        }

        let action = match action {
            "write" => PermissionAction::Write,
            _ => PermissionAction::Read,
        };

        Ok(Self {
            action,
            resource_type: resource_type.to_string(),
            resource_id: parts.next().filter(|id| !id.is_empty()).map(str::to_string),
        })
    }
}

/// Desired state of an authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationSpec {
    /// Stored remotely as the description
    pub name: String,

    #[serde(default)]
    pub status: AuthorizationStatus,

    pub permissions: Vec<PermissionSpec>,
}

impl AuthorizationSpec {
    pub fn new(name: impl Into<String>, permissions: Vec<PermissionSpec>) -> Self {
        Self {
            name: name.into(),
            status: AuthorizationStatus::Active,
            permissions,
        }
    }

    pub fn with_status(mut self, status: AuthorizationStatus) -> Self {
        self.status = status;
        self
    }

    fn validate(&self) -> Result<(), AuthorizationError> {
        if self.name.trim().is_empty() {
            return Err(AuthorizationError::InvalidSpec(
                "authorization name must not be empty".to_string(),
            ));
        }
        if self.permissions.is_empty() {
            return Err(AuthorizationError::InvalidSpec(format!(
                "authorization {} needs at least one permission",
                self.name
            )));
        }
        Ok(())
    }

    fn permission_set(&self) -> Vec<PermissionSpec> {
        normalized(self.permissions.clone())
    }
}

/// Permissions compare as a set
fn normalized(mut permissions: Vec<PermissionSpec>) -> Vec<PermissionSpec> {
    permissions.sort();
    permissions.dedup();
    permissions
}

fn render(permissions: &[PermissionSpec]) -> String {
    permissions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Persisted state of a managed authorization
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub id: String,
    pub org_id: String,
    #[serde(default)]
    pub organization: Option<String>,
    pub host: String,
    pub name: String,
    pub status: AuthorizationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub permissions: Vec<PermissionSpec>,
}

impl AuthorizationState {
    fn from_remote(record: &AuthorizationRecord, host: &str) -> Self {
        Self {
            id: record.id.clone(),
            org_id: record.org_id.clone(),
            organization: record.org.clone(),
            host: host.to_string(),
            name: record.description.clone().unwrap_or_default(),
            status: record.status,
            token: record.token.clone(),
            permissions: normalized(
                record
                    .permissions
                    .iter()
                    .map(PermissionSpec::from_remote)
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Debug for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationState")
            .field("id", &self.id)
            .field("org_id", &self.org_id)
            .field("organization", &self.organization)
            .field("host", &self.host)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// Creates, reads, updates and deletes authorizations in one organization
pub struct AuthorizationManager<A> {
    api: A,
    org_id: String,
    host: String,
}

impl<A: AuthorizationApi> AuthorizationManager<A> {
    /// `host` is recorded in state as the server the token belongs to
    pub fn new(api: A, org_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            api,
            org_id: org_id.into(),
            host: host.into(),
        }
    }

    pub async fn create(
        &self,
        spec: &AuthorizationSpec,
    ) -> Result<AuthorizationState, AuthorizationError> {
        spec.validate()?;

        tracing::info!("Creating authorization with name: {}", spec.name);
        let request = NewAuthorization {
            org_id: self.org_id.clone(),
            description: spec.name.clone(),
            status: spec.status,
            permissions: spec
                .permission_set()
                .iter()
                .map(|p| p.to_remote(&self.org_id))
                .collect(),
        };

        let created = self
            .api
            .create_authorization(&request)
            .await
            .map_err(|source| AuthorizationError::CreateFailed {
                name: spec.name.clone(),
                source,
            })?;

        let mut state = self
            .read(&created.id)
            .await?
            .ok_or_else(|| AuthorizationError::NotFound(created.id.clone()))?;
        // the token is only guaranteed in the create response
        if state.token.is_none() {
            state.token = created.token;
        }
        Ok(state)
    }

    /// Look up an authorization by id; `None` when it no longer exists
    pub async fn read(&self, id: &str) -> Result<Option<AuthorizationState>, AuthorizationError> {
        tracing::debug!("Reading authorization with id: {}", id);

        let authorizations = self.api.list_authorizations().await.map_err(|source| {
            AuthorizationError::ReadFailed {
                id: id.to_string(),
                source,
            }
        })?;

        Ok(authorizations
            .iter()
            .find(|a| a.id == id)
            .map(|record| AuthorizationState::from_remote(record, &self.host)))
    }

    /// Change the status of an existing authorization
    pub async fn update(
        &self,
        state: &AuthorizationState,
        spec: &AuthorizationSpec,
    ) -> Result<AuthorizationState, AuthorizationError> {
        spec.validate()?;
        if spec.name != state.name {
            return Err(AuthorizationError::ImmutableField {
                id: state.id.clone(),
                field: "name",
            });
        }
        if spec.permission_set() != normalized(state.permissions.clone()) {
            return Err(AuthorizationError::ImmutableField {
                id: state.id.clone(),
                field: "permissions",
            });
        }

        let mut updated = state.clone();
        if spec.status != state.status {
            tracing::info!("Updating authorization id: {} to {}", state.id, spec.status);
            let record = self
                .api
                .update_authorization_status(&state.id, spec.status)
                .await
                .map_err(|source| AuthorizationError::UpdateFailed {
                    id: state.id.clone(),
                    source,
                })?;
            updated.status = record.status;
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), AuthorizationError> {
        tracing::info!("Deleting authorization id: {}", id);
        match self.api.delete_authorization(id).await {
            Ok(()) => Ok(()),
            Err(ApiError::NotFound(_)) => {
                tracing::warn!("Authorization {} was already deleted", id);
                Ok(())
            }
            Err(source) => Err(AuthorizationError::DeleteFailed {
                id: id.to_string(),
                source,
            }),
        }
    }

    pub fn changes(&self, prior: &AuthorizationState, desired: &AuthorizationSpec) -> Vec<Change> {
        let mut changes = Vec::new();

        if prior.name != desired.name {
            changes.push(
                Change::new("name", Some(prior.name.clone()), Some(desired.name.clone()))
                    .forcing_replacement(),
            );
        }

        let current = normalized(prior.permissions.clone());
        let wanted = desired.permission_set();
        if current != wanted {
            changes.push(
                Change::new(
                    "permissions",
                    Some(render(&current)),
                    Some(render(&wanted)),
                )
                .forcing_replacement(),
            );
        }

        if prior.status != desired.status {
            changes.push(Change::new(
                "status",
                Some(prior.status.to_string()),
                Some(desired.status.to_string()),
            ));
        }

        changes
    }

    fn action_type(
        &self,
        prior: Option<&AuthorizationState>,
        desired: Option<&AuthorizationSpec>,
    ) -> ActionType {
        match (prior, desired) {
            (None, None) => ActionType::NoOp,
            (None, Some(_)) => ActionType::Create,
            (Some(_), None) => ActionType::Delete,
            (Some(prior), Some(desired)) => classify(&self.changes(prior, desired)),
        }
    }

    pub fn plan(
        &self,
        resource_name: &str,
        prior: Option<&AuthorizationState>,
        desired: Option<&AuthorizationSpec>,
    ) -> Action {
        let changes = match (prior, desired) {
            (Some(prior), Some(desired)) => self.changes(prior, desired),
            (None, Some(desired)) => vec![
                Change::new("name", None, Some(desired.name.clone())),
                Change::new("status", None, Some(desired.status.to_string())),
                Change::new("permissions", None, Some(render(&desired.permission_set()))),
            ],
            _ => Vec::new(),
        };

        Action::new(self.action_type(prior, desired), RESOURCE_TYPE, resource_name)
            .with_changes(changes)
    }

    pub async fn apply(
        &self,
        prior: Option<&AuthorizationState>,
        desired: Option<&AuthorizationSpec>,
    ) -> Result<Option<AuthorizationState>, AuthorizationError> {
        match (self.action_type(prior, desired), prior, desired) {
            (ActionType::Create, _, Some(spec)) => self.create(spec).await.map(Some),
            (ActionType::Update, Some(prior), Some(spec)) => {
                self.update(prior, spec).await.map(Some)
            }
            (ActionType::Replace, Some(prior), Some(spec)) => {
                spec.validate()?;
                tracing::info!("Replacing authorization {}", prior.id);
                self.delete(&prior.id).await?;
                self.create(spec).await.map(Some)
            }
            (ActionType::Delete, Some(prior), _) => {
                self.delete(&prior.id).await?;
                Ok(None)
            }
            _ => Ok(prior.cloned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const ORG: &str = "org0000000000001";
    const HOST: &str = "http://localhost:8086";

    #[derive(Default)]
    struct FakeAuthorizations {
        records: Mutex<Vec<AuthorizationRecord>>,
        calls: Mutex<Vec<String>>,
        created: AtomicUsize,
    }

    impl FakeAuthorizations {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuthorizationApi for FakeAuthorizations {
        async fn create_authorization(
            &self,
            authorization: &NewAuthorization,
        ) -> crate::error::Result<AuthorizationRecord> {
            self.calls.lock().unwrap().push("create".to_string());
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            let mut records = self.records.lock().unwrap();
            let record = AuthorizationRecord {
                id: format!("auth{}", n),
                token: Some(format!("token-{}", n)),
                status: authorization.status,
                description: Some(authorization.description.clone()),
                org_id: authorization.org_id.clone(),
                org: Some("acme".to_string()),
                permissions: authorization.permissions.clone(),
            };
            // listing does not return tokens
            records.push(AuthorizationRecord {
                token: None,
                ..record.clone()
            });
            Ok(record)
        }

        async fn list_authorizations(&self) -> crate::error::Result<Vec<AuthorizationRecord>> {
            self.calls.lock().unwrap().push("list".to_string());
            Ok(self.records.lock().unwrap().clone())
        }

        async fn update_authorization_status(
            &self,
            id: &str,
            status: AuthorizationStatus,
        ) -> crate::error::Result<AuthorizationRecord> {
            self.calls.lock().unwrap().push(format!("update {} {}", id, status));
            let mut records = self.records.lock().unwrap();
            let record = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| ApiError::NotFound("authorization not found".to_string()))?;
            record.status = status;
            Ok(record.clone())
        }

        async fn delete_authorization(&self, id: &str) -> crate::error::Result<()> {
            self.calls.lock().unwrap().push(format!("delete {}", id));
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                return Err(ApiError::NotFound("authorization not found".to_string()));
            }
            Ok(())
        }
    }

    fn manager(fake: &Arc<FakeAuthorizations>) -> AuthorizationManager<Arc<FakeAuthorizations>> {
        AuthorizationManager::new(fake.clone(), ORG, HOST)
    }

    fn telegraf() -> AuthorizationSpec {
        AuthorizationSpec::new(
            "telegraf",
            vec![
                "write:buckets:b1".parse().unwrap(),
                "read:buckets:b1".parse().unwrap(),
            ],
        )
    }

    #[test]
    fn test_permission_parse() {
        let p: PermissionSpec = "write:buckets:0123".parse().unwrap();
        assert_eq!(p.action, PermissionAction::Write);
        assert_eq!(p.resource_type, "buckets");
        assert_eq!(p.resource_id.as_deref(), Some("0123"));
        assert_eq!(p.to_string(), "write:buckets:0123");

        // anything but write is read
        let p: PermissionSpec = "admin:orgs".parse().unwrap();
        assert_eq!(p.action, PermissionAction::Read);
        assert_eq!(p.resource_id, None);

        assert!("buckets".parse::<PermissionSpec>().is_err());
        assert!(":buckets".parse::<PermissionSpec>().is_err());
    }

    #[test]
    fn test_permission_scoped_to_org() {
        let remote = PermissionSpec::new(PermissionAction::Read, "dashboards").to_remote(ORG);
        assert_eq!(remote.resource.org_id.as_deref(), Some(ORG));
        assert_eq!(remote.resource.id, None);

        let remote = PermissionSpec::new(PermissionAction::Write, "buckets")
            .with_resource_id("b1")
            .to_remote(ORG);
        assert_eq!(remote.resource.id.as_deref(), Some("b1"));
    }

    #[tokio::test]
    async fn test_create_keeps_token() {
        let fake = Arc::new(FakeAuthorizations::default());
        let auths = manager(&fake);

        let state = auths.create(&telegraf()).await.unwrap();

        assert_eq!(state.id, "auth1");
        assert_eq!(state.name, "telegraf");
        assert_eq!(state.org_id, ORG);
        assert_eq!(state.organization.as_deref(), Some("acme"));
        assert_eq!(state.host, HOST);
        assert_eq!(state.token.as_deref(), Some("token-1"));
        assert_eq!(state.permissions.len(), 2);
        assert!(!format!("{:?}", state).contains("token-1"));

        let sent = fake.records.lock().unwrap()[0].clone();
        assert!(sent.permissions.iter().all(|p| p.resource.org_id.as_deref() == Some(ORG)));
    }

    #[tokio::test]
    async fn test_create_requires_permissions() {
        let fake = Arc::new(FakeAuthorizations::default());
        let auths = manager(&fake);

        let err = auths
            .create(&AuthorizationSpec::new("empty", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorizationError::InvalidSpec(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_is_absent() {
        let fake = Arc::new(FakeAuthorizations::default());
        assert!(manager(&fake).read("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_update() {
        let fake = Arc::new(FakeAuthorizations::default());
        let auths = manager(&fake);
        let state = auths.create(&telegraf()).await.unwrap();

        let spec = telegraf().with_status(AuthorizationStatus::Inactive);
        let updated = auths.update(&state, &spec).await.unwrap();

        assert_eq!(updated.status, AuthorizationStatus::Inactive);
        assert_eq!(updated.token, state.token);
        assert!(fake.calls().contains(&"update auth1 inactive".to_string()));

        // unchanged status sends nothing
        let calls = fake.calls().len();
        auths.update(&updated, &spec).await.unwrap();
        assert_eq!(fake.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_update_rejects_permission_change() {
        let fake = Arc::new(FakeAuthorizations::default());
        let auths = manager(&fake);
        let state = auths.create(&telegraf()).await.unwrap();

        let spec = AuthorizationSpec::new("telegraf", vec!["read:buckets".parse().unwrap()]);
        let err = auths.update(&state, &spec).await.unwrap_err();
        assert!(matches!(
            err,
            AuthorizationError::ImmutableField {
                field: "permissions",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_plan_and_apply() {
        let fake = Arc::new(FakeAuthorizations::default());
        let auths = manager(&fake);

        assert_eq!(
            auths.plan("telegraf", None, Some(&telegraf())).action_type,
            ActionType::Create
        );
        let state = auths.apply(None, Some(&telegraf())).await.unwrap().unwrap();

        // permission order does not matter
        let mut reordered = telegraf();
        reordered.permissions.reverse();
        assert_eq!(
            auths.plan("telegraf", Some(&state), Some(&reordered)).action_type,
            ActionType::NoOp
        );

        let inactive = telegraf().with_status(AuthorizationStatus::Inactive);
        assert_eq!(
            auths.plan("telegraf", Some(&state), Some(&inactive)).action_type,
            ActionType::Update
        );

        let renamed = AuthorizationSpec::new("collector", telegraf().permissions);
        assert_eq!(
            auths.plan("telegraf", Some(&state), Some(&renamed)).action_type,
            ActionType::Replace
        );
        let replaced = auths.apply(Some(&state), Some(&renamed)).await.unwrap().unwrap();
        assert_ne!(replaced.id, state.id);
        assert_eq!(fake.records.lock().unwrap().len(), 1);

        assert!(auths.apply(Some(&replaced), None).await.unwrap().is_none());
        assert!(fake.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing() {
        let fake = Arc::new(FakeAuthorizations::default());
        manager(&fake).delete("gone").await.unwrap();
    }
}
