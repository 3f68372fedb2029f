//! Cluster spec
//!
//! The richest resource kind: provider/region placement, instance tier,
//! replication topology, autoscaling, backup, BI connector, encryption.
//! Instance sizes are an ordered enum so tier downgrades are detectable.

use super::{ResourceIdentity, ResourceKind, ResourceMetadata, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cloud provider hosting a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudProvider {
    #[default]
    Aws,
    Gcp,
    Azure,
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudProvider::Aws => write!(f, "AWS"),
            CloudProvider::Gcp => write!(f, "GCP"),
            CloudProvider::Azure => write!(f, "AZURE"),
        }
    }
}

/// Instance tier, ordered smallest to largest.
///
/// `Ord` follows declaration order, so `desired < current` means a downgrade.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum InstanceSize {
    #[default]
    M10,
    M20,
    M30,
    M40,
    M50,
    M60,
    M80,
    M140,
    M200,
    M300,
    M400,
    M700,
}

impl InstanceSize {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "M10" => Some(Self::M10),
            "M20" => Some(Self::M20),
            "M30" => Some(Self::M30),
            "M40" => Some(Self::M40),
            "M50" => Some(Self::M50),
            "M60" => Some(Self::M60),
            "M80" => Some(Self::M80),
            "M140" => Some(Self::M140),
            "M200" => Some(Self::M200),
            "M300" => Some(Self::M300),
            "M400" => Some(Self::M400),
            "M700" => Some(Self::M700),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstanceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Node counts and election priority for one region of a replication spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionConfig {
    pub region: String,

    /// Nodes eligible for primary election.
    #[serde(default)]
    pub electable_nodes: u32,

    #[serde(default)]
    pub read_only_nodes: u32,

    #[serde(default)]
    pub analytics_nodes: u32,

    /// Election priority 0–7; unset normalizes to 7 (highest).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

/// One replication spec (shard/zone) of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,

    #[serde(default = "default_num_shards")]
    pub num_shards: u32,

    #[serde(default)]
    pub region_configs: Vec<RegionConfig>,
}

fn default_num_shards() -> u32 {
    1
}

/// Compute autoscaling bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_instance_size: Option<InstanceSize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_instance_size: Option<InstanceSize>,
}

/// BI connector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiConnectorSpec {
    #[serde(default)]
    pub enabled: bool,

    /// `primary`, `secondary`, or `analytics`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_preference: Option<String>,
}

/// Remote lifecycle state reported by the service for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    /// Provisioned and serving.
    Idle,
    Creating,
    Updating,
    Deleting,
    Repairing,
}

impl ClusterState {
    /// Whether the cluster has reached a steady serving state.
    pub fn is_ready(&self) -> bool {
        matches!(self, ClusterState::Idle)
    }
}

/// Desired shape of a cluster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub provider: CloudProvider,

    /// Provider region, e.g. `US_EAST_1`.
    pub region: String,

    #[serde(default)]
    pub instance_size: InstanceSize,

    #[serde(
        default,
        rename = "diskSizeGB",
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_size_gb: Option<f64>,

    /// Major version, e.g. `7.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongodb_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replication_specs: Vec<ReplicationSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<AutoscalingSpec>,

    #[serde(default)]
    pub backup_enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bi_connector: Option<BiConnectorSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_at_rest: Option<bool>,

    #[serde(default)]
    pub paused: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ClusterSpec {
    /// Total electable nodes across all replication specs.
    pub fn electable_nodes(&self) -> u32 {
        self.replication_specs
            .iter()
            .flat_map(|spec| spec.region_configs.iter())
            .map(|rc| rc.electable_nodes)
            .sum()
    }
}

impl ResourceSpec for ClusterSpec {
    const KIND: ResourceKind = ResourceKind::Cluster;

    fn identity(&self, metadata: &ResourceMetadata) -> ResourceIdentity {
        ResourceIdentity::Cluster {
            name: metadata.name.clone(),
        }
    }

    fn normalize(&mut self) {
        for spec in &mut self.replication_specs {
            if spec.num_shards == 0 {
                spec.num_shards = 1;
            }
            for rc in &mut spec.region_configs {
                if rc.priority.is_none() {
                    rc.priority = Some(7);
                }
            }
        }
        // A cluster declared without explicit topology serves from its
        // region with a default three-node replica set.
        if self.replication_specs.is_empty() {
            self.replication_specs.push(ReplicationSpec {
                zone_name: None,
                num_shards: 1,
                region_configs: vec![RegionConfig {
                    region: self.region.clone(),
                    electable_nodes: 3,
                    read_only_nodes: 0,
                    analytics_nodes: 0,
                    priority: Some(7),
                }],
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_size_ordering() {
        assert!(InstanceSize::M10 < InstanceSize::M30);
        assert!(InstanceSize::M140 < InstanceSize::M700);
        assert_eq!(InstanceSize::parse("M30"), Some(InstanceSize::M30));
        assert_eq!(InstanceSize::parse("M15"), None);
        assert_eq!(InstanceSize::M30.to_string(), "M30");
    }

    #[test]
    fn test_normalize_fills_default_topology() {
        let mut spec = ClusterSpec {
            region: "US_EAST_1".to_string(),
            ..Default::default()
        };
        spec.normalize();
        assert_eq!(spec.replication_specs.len(), 1);
        assert_eq!(spec.electable_nodes(), 3);
        assert_eq!(
            spec.replication_specs[0].region_configs[0].priority,
            Some(7)
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut spec = ClusterSpec {
            region: "EU_WEST_1".to_string(),
            ..Default::default()
        };
        spec.normalize();
        let once = spec.clone();
        spec.normalize();
        assert_eq!(spec, once);
    }

    #[test]
    fn test_normalize_defaults_priority_and_shards() {
        let mut spec = ClusterSpec {
            region: "US_EAST_1".to_string(),
            replication_specs: vec![ReplicationSpec {
                zone_name: None,
                num_shards: 0,
                region_configs: vec![RegionConfig {
                    region: "US_EAST_1".to_string(),
                    electable_nodes: 3,
                    read_only_nodes: 0,
                    analytics_nodes: 0,
                    priority: None,
                }],
            }],
            ..Default::default()
        };
        spec.normalize();
        assert_eq!(spec.replication_specs[0].num_shards, 1);
        assert_eq!(
            spec.replication_specs[0].region_configs[0].priority,
            Some(7)
        );
    }

    #[test]
    fn test_cluster_state_readiness() {
        assert!(ClusterState::Idle.is_ready());
        assert!(!ClusterState::Creating.is_ready());
        assert!(!ClusterState::Updating.is_ready());
    }

    #[test]
    fn test_spec_yaml_round_trip() {
        let yaml = r#"
provider: AWS
region: US_EAST_1
instanceSize: M10
diskSizeGB: 20.0
backupEnabled: true
"#;
        let spec: ClusterSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.provider, CloudProvider::Aws);
        assert_eq!(spec.instance_size, InstanceSize::M10);
        assert_eq!(spec.disk_size_gb, Some(20.0));
        assert!(spec.backup_enabled);
    }
}
