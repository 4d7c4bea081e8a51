use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ClusterClient, ManifestKind};
use crate::error::ClientError;

/// Native-realm user record, as accepted by `PUT /_security/user/{username}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityUser {
    #[serde(skip_serializing)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// `SecurityUser` manifests carry a list of users, upserted one at a time.
///
/// The first failing upsert aborts the batch. Users already written stay
/// written.
pub struct SecurityUserKind;

#[async_trait]
impl ManifestKind for SecurityUserKind {
    const KIND: &'static str = "SecurityUser";
    type Resource = Vec<SecurityUser>;

    fn describe(&self, users: &Self::Resource) -> Vec<String> {
        users
            .iter()
            .map(|u| {
                if u.roles.is_empty() {
                    format!("upsert user {}", u.username)
                } else {
                    format!("upsert user {} (roles: {})", u.username, u.roles.join(", "))
                }
            })
            .collect()
    }

    async fn apply(
        &self,
        client: &dyn ClusterClient,
        users: Self::Resource,
    ) -> Result<(), ClientError> {
        let total = users.len();
        for (i, user) in users.iter().enumerate() {
            client.put_security_user(user).await?;
            info!(username = %user.username, applied = i + 1, total, "security user applied");
        }
        Ok(())
    }
}
