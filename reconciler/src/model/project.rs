//! Project spec

use super::{ResourceIdentity, ResourceKind, ResourceMetadata, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired shape of the project itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    /// Project display name; defaults to the metadata name.
    #[serde(default)]
    pub name: String,

    /// Owning organization. Required for project creation; optional for
    /// updates, where it must match the remote project if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ResourceSpec for ProjectSpec {
    const KIND: ResourceKind = ResourceKind::Project;

    fn identity(&self, metadata: &ResourceMetadata) -> ResourceIdentity {
        ResourceIdentity::Project {
            name: if self.name.is_empty() {
                metadata.name.clone()
            } else {
                self.name.clone()
            },
        }
    }

    fn normalize(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_falls_back_to_metadata_name() {
        let spec = ProjectSpec::default();
        assert_eq!(
            spec.identity(&ResourceMetadata::named("platform")),
            ResourceIdentity::Project {
                name: "platform".to_string(),
            }
        );

        let spec = ProjectSpec {
            name: "explicit".to_string(),
            ..Default::default()
        };
        assert_eq!(
            spec.identity(&ResourceMetadata::named("platform")),
            ResourceIdentity::Project {
                name: "explicit".to_string(),
            }
        );
    }
}
