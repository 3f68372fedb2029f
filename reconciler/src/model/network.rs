//! Network access entry spec
//!
//! An entry grants access from exactly one of: a single IP address, a CIDR
//! block, or an AWS security group. The populated selector is the identity.

use super::{ResourceIdentity, ResourceKind, ResourceMetadata, ResourceSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Desired shape of a network access entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAccessSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_security_group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Entry expires and is removed remotely after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after: Option<DateTime<Utc>>,
}

impl NetworkAccessSpec {
    /// The first populated selector, in IP ≺ CIDR ≺ security-group order.
    pub fn selector(&self) -> Option<&str> {
        self.ip_address
            .as_deref()
            .or(self.cidr_block.as_deref())
            .or(self.aws_security_group.as_deref())
    }

    /// Number of populated selectors; valid entries have exactly one.
    pub fn selector_count(&self) -> usize {
        [
            self.ip_address.is_some(),
            self.cidr_block.is_some(),
            self.aws_security_group.is_some(),
        ]
        .iter()
        .filter(|populated| **populated)
        .count()
    }
}

impl ResourceSpec for NetworkAccessSpec {
    const KIND: ResourceKind = ResourceKind::NetworkAccess;

    fn identity(&self, metadata: &ResourceMetadata) -> ResourceIdentity {
        ResourceIdentity::NetworkAccess {
            // Fall back to the metadata name for invalid selector-less
            // entries so the validator can still report them by identity.
            selector: self
                .selector()
                .unwrap_or(metadata.name.as_str())
                .to_string(),
        }
    }

    fn normalize(&mut self) {
        for field in [
            &mut self.ip_address,
            &mut self.cidr_block,
            &mut self.aws_security_group,
        ] {
            if let Some(value) = field.take() {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    *field = Some(trimmed.to_string());
                }
            }
        }
        if matches!(self.comment.as_deref(), Some("")) {
            self.comment = None;
        }
    }
}
