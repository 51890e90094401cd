//! Keyspace data model.
//!
//! [`KeyspaceConfig`] is the loosely-typed record the host hands over;
//! [`DesiredState`] is the validated form everything else works with.
//! [`ObservedState`] is what the catalog reports back.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Short class name of the simple replication strategy.
pub const SIMPLE_STRATEGY: &str = "SimpleStrategy";

/// Short class name of the network-topology replication strategy.
pub const NETWORK_TOPOLOGY_STRATEGY: &str = "NetworkTopologyStrategy";

/// Option key carrying the replica count of a simple strategy.
pub const REPLICATION_FACTOR: &str = "replication_factor";

/// Replication strategy of a keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationSpec {
    /// A flat replica count across the whole cluster.
    Simple {
        /// Number of replicas, at least 1.
        factor: u32,
    },
    /// A replica count per datacenter.
    NetworkTopology {
        /// Datacenter name to replica count, each at least 1.
        per_datacenter: BTreeMap<String, u32>,
    },
}

impl ReplicationSpec {
    /// The short strategy class name.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Simple { .. } => SIMPLE_STRATEGY,
            Self::NetworkTopology { .. } => NETWORK_TOPOLOGY_STRATEGY,
        }
    }

    /// Strategy options as `(key, replica count)` pairs, in deterministic order.
    pub fn options(&self) -> Vec<(&str, u32)> {
        match self {
            Self::Simple { factor } => vec![(REPLICATION_FACTOR, *factor)],
            Self::NetworkTopology { per_datacenter } => per_datacenter
                .iter()
                .map(|(dc, count)| (dc.as_str(), *count))
                .collect(),
        }
    }
}

/// Validated desired state of one keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    /// Keyspace name. Immutable once created.
    pub name: String,
    /// Whether commit-log durable writes are enabled.
    pub durable_writes: bool,
    /// Replication strategy.
    pub replication: ReplicationSpec,
}

impl DesiredState {
    /// A simple-strategy keyspace.
    pub fn simple(name: impl Into<String>, durable_writes: bool, factor: u32) -> Self {
        Self {
            name: name.into(),
            durable_writes,
            replication: ReplicationSpec::Simple { factor },
        }
    }

    /// A network-topology keyspace.
    pub fn network_topology<I, K>(name: impl Into<String>, durable_writes: bool, dcs: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            durable_writes,
            replication: ReplicationSpec::NetworkTopology {
                per_datacenter: dcs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            },
        }
    }

    /// Check the invariants a hand-built value might violate.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.name.is_empty() {
            return Err(ProviderError::Validation(
                "name must not be empty".to_string(),
            ));
        }
        match &self.replication {
            ReplicationSpec::Simple { factor } => check_count(REPLICATION_FACTOR, *factor),
            ReplicationSpec::NetworkTopology { per_datacenter } => {
                if per_datacenter.is_empty() {
                    return Err(ProviderError::Validation(format!(
                        "datacenters must name at least one datacenter for {}",
                        NETWORK_TOPOLOGY_STRATEGY
                    )));
                }
                per_datacenter
                    .iter()
                    .try_for_each(|(dc, count)| check_count(&format!("datacenters.{}", dc), *count))
            }
        }
    }
}

fn check_count(path: &str, count: u32) -> Result<(), ProviderError> {
    if count == 0 {
        return Err(ProviderError::Validation(format!(
            "{} must be at least 1",
            path
        )));
    }
    Ok(())
}

/// Keyspace attributes as declared in configuration and stored in state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceConfig {
    /// Resource id, set after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Keyspace name.
    #[serde(default)]
    pub name: String,
    /// Durable writes flag.
    #[serde(default)]
    pub durable_writes: bool,
    /// `SimpleStrategy` or `NetworkTopologyStrategy`.
    #[serde(default)]
    pub replication_class: String,
    /// Required with `SimpleStrategy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<i64>,
    /// Required with `NetworkTopologyStrategy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenters: Option<BTreeMap<String, i64>>,
}

impl KeyspaceConfig {
    /// Parse from a JSON state or configuration value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize into a JSON state value.
    pub fn to_value(&self) -> Result<serde_json::Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Build the state record for a desired keyspace.
    pub fn from_desired(desired: &DesiredState, handle: &ResourceHandle) -> Self {
        let mut config = Self {
            id: Some(handle.as_str().to_string()),
            name: desired.name.clone(),
            durable_writes: desired.durable_writes,
            replication_class: desired.replication.class().to_string(),
            replication_factor: None,
            datacenters: None,
        };
        config.set_replication(&desired.replication);
        config
    }

    /// Replace the replication attributes, clearing the other variant's field.
    pub fn set_replication(&mut self, replication: &ReplicationSpec) {
        self.replication_class = replication.class().to_string();
        match replication {
            ReplicationSpec::Simple { factor } => {
                self.replication_factor = Some(i64::from(*factor));
                self.datacenters = None;
            }
            ReplicationSpec::NetworkTopology { per_datacenter } => {
                self.replication_factor = None;
                self.datacenters = Some(
                    per_datacenter
                        .iter()
                        .map(|(dc, count)| (dc.clone(), i64::from(*count)))
                        .collect(),
                );
            }
        }
    }

    /// The handle recorded in this state.
    pub fn handle(&self) -> ResourceHandle {
        self.id
            .as_deref()
            .map(ResourceHandle::new)
            .unwrap_or_default()
    }
}

impl TryFrom<&KeyspaceConfig> for DesiredState {
    type Error = ProviderError;

    fn try_from(config: &KeyspaceConfig) -> Result<Self, Self::Error> {
        let replication = match config.replication_class.as_str() {
            SIMPLE_STRATEGY => {
                let factor = config.replication_factor.ok_or_else(|| {
                    ProviderError::Validation(format!(
                        "replication_factor is required when replication_class is {}",
                        SIMPLE_STRATEGY
                    ))
                })?;
                ReplicationSpec::Simple {
                    factor: to_count(REPLICATION_FACTOR, factor)?,
                }
            }
            NETWORK_TOPOLOGY_STRATEGY => {
                let datacenters = config.datacenters.as_ref().ok_or_else(|| {
                    ProviderError::Validation(format!(
                        "datacenters is required when replication_class is {}",
                        NETWORK_TOPOLOGY_STRATEGY
                    ))
                })?;
                let per_datacenter = datacenters
                    .iter()
                    .map(|(dc, count)| {
                        to_count(&format!("datacenters.{}", dc), *count).map(|c| (dc.clone(), c))
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                ReplicationSpec::NetworkTopology { per_datacenter }
            }
            _ => {
                return Err(ProviderError::Validation(format!(
                    "replication_class must be one of [{}, {}], got '{}'",
                    SIMPLE_STRATEGY, NETWORK_TOPOLOGY_STRATEGY, config.replication_class
                )))
            }
        };

        let desired = DesiredState {
            name: config.name.clone(),
            durable_writes: config.durable_writes,
            replication,
        };
        desired.validate()?;
        Ok(desired)
    }
}

impl TryFrom<KeyspaceConfig> for DesiredState {
    type Error = ProviderError;

    fn try_from(config: KeyspaceConfig) -> Result<Self, Self::Error> {
        DesiredState::try_from(&config)
    }
}

fn to_count(path: &str, value: i64) -> Result<u32, ProviderError> {
    u32::try_from(value)
        .ok()
        .filter(|count| *count >= 1)
        .ok_or_else(|| {
            ProviderError::Validation(format!(
                "{} must be between 1 and {}, got {}",
                path,
                u32::MAX,
                value
            ))
        })
}

/// Keyspace properties as reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    /// Keyspace name.
    pub name: String,
    /// Durable writes flag.
    pub durable_writes: bool,
    /// Strategy class, possibly fully qualified
    /// (`org.apache.cassandra.locator.SimpleStrategy`).
    pub strategy_class: String,
    /// Strategy options without the `class` entry.
    pub strategy_options: BTreeMap<String, String>,
}

impl ObservedState {
    /// True for the blank metadata some drivers return for a missing keyspace.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.strategy_class.is_empty() && self.strategy_options.is_empty()
    }

    /// Whether the strategy class names the given short identifier.
    pub fn is_strategy(&self, short_class: &str) -> bool {
        self.strategy_class == short_class
            || self
                .strategy_class
                .rsplit('.')
                .next()
                .is_some_and(|suffix| suffix == short_class)
    }

    /// Convert the observed strategy back into a [`ReplicationSpec`].
    ///
    /// Returns `None` for strategies this provider does not manage or for
    /// options that do not parse as replica counts.
    pub fn replication(&self) -> Option<ReplicationSpec> {
        if self.is_strategy(SIMPLE_STRATEGY) {
            let factor = self.strategy_options.get(REPLICATION_FACTOR)?.parse().ok()?;
            Some(ReplicationSpec::Simple { factor })
        } else if self.is_strategy(NETWORK_TOPOLOGY_STRATEGY) {
            let per_datacenter = self
                .strategy_options
                .iter()
                .map(|(dc, count)| count.parse().ok().map(|c| (dc.clone(), c)))
                .collect::<Option<BTreeMap<_, _>>>()?;
            Some(ReplicationSpec::NetworkTopology { per_datacenter })
        } else {
            None
        }
    }

    /// Whether the keyspace already has the desired properties.
    pub fn matches(&self, desired: &DesiredState) -> bool {
        self.durable_writes == desired.durable_writes
            && self.replication().as_ref() == Some(&desired.replication)
    }
}

/// Identity of a managed keyspace as tracked by the host.
///
/// Empty means the keyspace is not known to exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    /// A handle naming an existing keyspace.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The cleared handle.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the handle names a keyspace.
    pub fn is_set(&self) -> bool {
        !self.0.is_empty()
    }

    /// Forget the keyspace.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: serde_json::Value) -> KeyspaceConfig {
        KeyspaceConfig::from_value(value).unwrap()
    }

    #[test]
    fn test_simple_config_to_desired() {
        let desired = DesiredState::try_from(config(json!({
            "name": "orders",
            "durable_writes": true,
            "replication_class": "SimpleStrategy",
            "replication_factor": 3,
            "datacenters": {"dc1": 2}
        })))
        .unwrap();

        assert_eq!(desired, DesiredState::simple("orders", true, 3));
    }

    #[test]
    fn test_network_topology_config_to_desired() {
        let desired = DesiredState::try_from(config(json!({
            "name": "events",
            "durable_writes": false,
            "replication_class": "NetworkTopologyStrategy",
            "datacenters": {"dc1": 2, "dc2": 1}
        })))
        .unwrap();

        assert_eq!(
            desired,
            DesiredState::network_topology("events", false, [("dc1", 2), ("dc2", 1)])
        );
    }

    #[test]
    fn test_unknown_class_rejected() {
        let err = DesiredState::try_from(config(json!({
            "name": "orders",
            "durable_writes": true,
            "replication_class": "Unknown",
            "replication_factor": 3
        })))
        .unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.message().contains("replication_class must be one of"));
    }

    #[test]
    fn test_missing_variant_field_rejected() {
        let err = DesiredState::try_from(config(json!({
            "name": "orders",
            "durable_writes": true,
            "replication_class": "SimpleStrategy",
            "datacenters": {"dc1": 2}
        })))
        .unwrap_err();
        assert!(err.message().contains("replication_factor is required"));

        let err = DesiredState::try_from(config(json!({
            "name": "events",
            "durable_writes": true,
            "replication_class": "NetworkTopologyStrategy",
            "replication_factor": 3
        })))
        .unwrap_err();
        assert!(err.message().contains("datacenters is required"));
    }

    #[test]
    fn test_counts_must_be_positive() {
        let err = DesiredState::try_from(config(json!({
            "name": "orders",
            "durable_writes": true,
            "replication_class": "SimpleStrategy",
            "replication_factor": 0
        })))
        .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));

        let err = DesiredState::try_from(config(json!({
            "name": "events",
            "durable_writes": true,
            "replication_class": "NetworkTopologyStrategy",
            "datacenters": {"dc1": 2, "dc2": -1}
        })))
        .unwrap_err();
        assert!(err.message().contains("datacenters.dc2"));

        let err = DesiredState::network_topology("events", true, Vec::<(String, u32)>::new())
            .validate()
            .unwrap_err();
        assert!(err.message().contains("at least one datacenter"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = DesiredState::simple("", true, 1).validate().unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[test]
    fn test_observed_strategy_suffix_match() {
        let observed = ObservedState {
            name: "orders".to_string(),
            durable_writes: true,
            strategy_class: "org.apache.cassandra.locator.SimpleStrategy".to_string(),
            strategy_options: BTreeMap::from([(REPLICATION_FACTOR.to_string(), "3".to_string())]),
        };

        assert!(observed.is_strategy(SIMPLE_STRATEGY));
        assert!(!observed.is_strategy(NETWORK_TOPOLOGY_STRATEGY));
        assert_eq!(observed.replication(), Some(ReplicationSpec::Simple { factor: 3 }));
        assert!(observed.matches(&DesiredState::simple("orders", true, 3)));
        assert!(!observed.matches(&DesiredState::simple("orders", false, 3)));
        assert!(!observed.matches(&DesiredState::simple("orders", true, 2)));
    }

    #[test]
    fn test_observed_unmanaged_strategy() {
        let observed = ObservedState {
            name: "system".to_string(),
            durable_writes: true,
            strategy_class: "org.apache.cassandra.locator.LocalStrategy".to_string(),
            strategy_options: BTreeMap::new(),
        };
        assert_eq!(observed.replication(), None);
        assert!(!observed.is_empty());
        assert!(ObservedState::default().is_empty());
    }

    #[test]
    fn test_state_record_round_trip_clears_other_variant() {
        let handle = ResourceHandle::new("events");
        let desired = DesiredState::network_topology("events", true, [("dc1", 2)]);
        let mut record = KeyspaceConfig::from_desired(&desired, &handle);
        assert_eq!(record.replication_factor, None);

        record.set_replication(&ReplicationSpec::Simple { factor: 2 });
        assert_eq!(record.replication_class, SIMPLE_STRATEGY);
        assert_eq!(record.datacenters, None);
        assert_eq!(record.handle(), handle);

        let value = record.to_value().unwrap();
        assert_eq!(value["id"], "events");
        assert_eq!(value["replication_factor"], 2);
        assert!(value.get("datacenters").is_none());
    }

    #[test]
    fn test_resource_handle() {
        let mut handle = ResourceHandle::new("orders");
        assert!(handle.is_set());
        assert_eq!(handle.to_string(), "orders");

        handle.clear();
        assert!(!handle.is_set());
        assert_eq!(handle, ResourceHandle::empty());
        assert_eq!(KeyspaceConfig::default().handle(), ResourceHandle::empty());
    }
}
