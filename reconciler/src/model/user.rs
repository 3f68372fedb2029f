//! Database user spec

use super::{
    ResourceIdentity, ResourceKind, ResourceMetadata, ResourceSpec, SecretString,
    DEFAULT_AUTH_DATABASE,
};
use serde::{Deserialize, Serialize};

/// A role granted to a user on a database (optionally a single collection).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub role_name: String,
    pub database_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

impl std::fmt::Display for RoleAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.role_name, self.database_name)?;
        if let Some(collection) = &self.collection_name {
            write!(f, ".{collection}")?;
        }
        Ok(())
    }
}

/// What a user scope points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeType {
    #[default]
    Cluster,
    DataLake,
}

/// Restriction of a user to a specific cluster or data lake.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScope {
    pub name: String,

    #[serde(default, rename = "type")]
    pub scope_type: ScopeType,
}

/// Desired shape of a database user.
///
/// Identity is (username, authDatabase); an empty auth database normalizes to
/// `admin`. The password, when present, is secret end to end.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserSpec {
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretString>,

    #[serde(default)]
    pub auth_database: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleAssignment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<UserScope>,
}

impl DatabaseUserSpec {
    /// Cluster names this user is scoped to.
    pub fn cluster_scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes
            .iter()
            .filter(|s| s.scope_type == ScopeType::Cluster)
            .map(|s| s.name.as_str())
    }
}

impl ResourceSpec for DatabaseUserSpec {
    const KIND: ResourceKind = ResourceKind::DatabaseUser;

    fn identity(&self, _metadata: &ResourceMetadata) -> ResourceIdentity {
        ResourceIdentity::DatabaseUser {
            username: self.username.clone(),
            auth_database: if self.auth_database.is_empty() {
                DEFAULT_AUTH_DATABASE.to_string()
            } else {
                self.auth_database.clone()
            },
        }
    }

    fn normalize(&mut self) {
        if self.auth_database.is_empty() {
            self.auth_database = DEFAULT_AUTH_DATABASE.to_string();
        }
    }
}
