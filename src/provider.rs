//! The `cassandra_keyspace` provider.
//!
//! [`CassandraProvider`] declares the provider and resource schemas and maps
//! each host call onto the [`KeyspaceReconciler`].

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::config::{
    ProviderConfig, DEFAULT_HOST_PORT, ENV_HOST_PORT, ENV_PASSWORD, ENV_USERNAME,
};
use crate::error::ProviderError;
use crate::keyspace::KeyspaceReconciler;
use crate::model::{DesiredState, KeyspaceConfig, ObservedState, ResourceHandle};
use crate::reader::RemoteKeyspace;
use crate::schema::{Attribute, AttributeType, Diagnostic, ProviderSchema, Schema};
use crate::service::ProviderService;
use crate::session::{Connector, ScyllaConnector};
use crate::types::{AttributeChange, ImportedResource, PlanResult};
use crate::validation::validate;

/// Resource and data source type name.
pub const KEYSPACE_RESOURCE: &str = "cassandra_keyspace";

/// Provider configuration schema.
pub fn provider_config_schema() -> Schema {
    Schema::v0()
        .with_description("Connection to a Cassandra cluster")
        .with_attribute(
            "host_port",
            Attribute::optional_string()
                .with_description("Contact point as host:port")
                .with_env_default(ENV_HOST_PORT)
                .with_default(DEFAULT_HOST_PORT),
        )
        .with_attribute(
            "username",
            Attribute::optional_string()
                .with_description("Username for password authentication")
                .with_env_default(ENV_USERNAME),
        )
        .with_attribute(
            "password",
            Attribute::optional_string()
                .with_description("Password for password authentication")
                .with_env_default(ENV_PASSWORD)
                .sensitive(),
        )
}

/// `cassandra_keyspace` resource schema.
pub fn keyspace_schema() -> Schema {
    Schema::v0()
        .with_description("A Cassandra keyspace")
        .with_attribute("id", Attribute::computed_string())
        .with_attribute(
            "name",
            Attribute::required_string()
                .with_description("Keyspace name")
                .with_force_new(),
        )
        .with_attribute(
            "durable_writes",
            Attribute::required_bool().with_description("Write through the commit log"),
        )
        .with_attribute(
            "replication_class",
            Attribute::required_string()
                .with_description("SimpleStrategy or NetworkTopologyStrategy"),
        )
        .with_attribute(
            "replication_factor",
            Attribute::optional_int64().with_description("Replica count for SimpleStrategy"),
        )
        .with_attribute(
            "datacenters",
            Attribute::optional_map(AttributeType::Int64)
                .with_description("Replica count per datacenter for NetworkTopologyStrategy"),
        )
}

/// `cassandra_keyspace` data source schema.
pub fn keyspace_data_source_schema() -> Schema {
    Schema::v0()
        .with_description("Properties of an existing keyspace")
        .with_attribute("name", Attribute::required_string())
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("durable_writes", Attribute::computed_bool())
        .with_attribute("replication_class", Attribute::computed_string())
        .with_attribute("replication_factor", Attribute::computed_int64())
        .with_attribute("datacenters", Attribute::computed_map(AttributeType::Int64))
        .with_attribute("strategy_class", Attribute::computed_string())
        .with_attribute(
            "strategy_options",
            Attribute::computed_map(AttributeType::String),
        )
}

/// Manages `cassandra_keyspace` resources through sessions opened by `C`.
pub struct CassandraProvider<C: Connector> {
    connector: C,
    reconciler: RwLock<Option<Arc<KeyspaceReconciler>>>,
}

impl CassandraProvider<ScyllaConnector> {
    /// A provider connecting with the `scylla` driver.
    pub fn scylla() -> Self {
        Self::new(ScyllaConnector)
    }
}

impl<C: Connector> CassandraProvider<C> {
    /// Create an unconfigured provider.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            reconciler: RwLock::new(None),
        }
    }

    /// Whether `configure` has succeeded.
    pub async fn is_configured(&self) -> bool {
        self.reconciler.read().await.is_some()
    }

    async fn reconciler(&self) -> Result<Arc<KeyspaceReconciler>, ProviderError> {
        self.reconciler.read().await.clone().ok_or_else(|| {
            ProviderError::FailedPrecondition("provider has not been configured".to_string())
        })
    }
}

fn check_resource_type(resource_type: &str) -> Result<(), ProviderError> {
    if resource_type == KEYSPACE_RESOURCE {
        Ok(())
    } else {
        Err(ProviderError::UnknownResource(resource_type.to_string()))
    }
}

fn desired_from_value(value: Value) -> Result<(KeyspaceConfig, DesiredState), ProviderError> {
    let config = KeyspaceConfig::from_value(value)?;
    let desired = DesiredState::try_from(&config)?;
    Ok((config, desired))
}

/// Overwrite the state's remote-backed attributes with what the catalog reports.
fn apply_observed(state: &mut KeyspaceConfig, observed: &ObservedState) {
    state.durable_writes = observed.durable_writes;
    match observed.replication() {
        Some(replication) => state.set_replication(&replication),
        None => {
            warn!(
                keyspace = %observed.name,
                strategy_class = %observed.strategy_class,
                "Keyspace uses a replication strategy this provider does not manage"
            );
            state.replication_class = observed
                .strategy_class
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .to_string();
            state.replication_factor = None;
            state.datacenters = None;
        }
    }
}

fn state_from_observed(observed: &ObservedState) -> KeyspaceConfig {
    let mut state = KeyspaceConfig {
        id: Some(observed.name.clone()),
        name: observed.name.clone(),
        ..Default::default()
    };
    apply_observed(&mut state, observed);
    state
}

#[async_trait::async_trait]
impl<C: Connector> ProviderService for CassandraProvider<C> {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(provider_config_schema())
            .with_resource(KEYSPACE_RESOURCE, keyspace_schema())
            .with_data_source(KEYSPACE_RESOURCE, keyspace_data_source_schema())
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validate(&provider_config_schema(), &config);
        if diagnostics.is_empty() {
            if let Err(e) = ProviderConfig::from_value(config) {
                diagnostics.push(Diagnostic::from(e).with_attribute("host_port"));
            }
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?;
        debug!(?config, "Connecting");

        let session = self
            .connector
            .connect(&config)
            .await
            .map_err(|e| ProviderError::RemoteExecution(e.to_string()))?;
        *self.reconciler.write().await = Some(Arc::new(KeyspaceReconciler::new(session)));
        info!(host_port = %config.host_port, "Provider configured");
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.reconciler.write().await.take();
        info!("Provider stopped");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        check_resource_type(resource_type)?;
        let diagnostics = validate(&keyspace_schema(), &config);
        if !diagnostics.is_empty() {
            return Ok(diagnostics);
        }
        Ok(match desired_from_value(config) {
            Ok(_) => vec![],
            Err(e) => vec![Diagnostic::from(e)],
        })
    }

    #[instrument(skip_all, name = "provider.plan", fields(resource_type = %resource_type))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        check_resource_type(resource_type)?;

        if proposed_state.is_null() {
            let prior = prior_state.unwrap_or(Value::Null);
            let changes = AttributeChange::diff(&prior, &Value::Null, &[]);
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let (_, desired) = desired_from_value(proposed_state)?;
        match prior_state {
            None => {
                let planned =
                    KeyspaceConfig::from_desired(&desired, &ResourceHandle::new(&desired.name))
                        .to_value()?;
                let changes = AttributeChange::diff(&json!({}), &planned, &[]);
                Ok(PlanResult::with_changes(planned, changes, false))
            }
            Some(prior) => {
                let prior_config = KeyspaceConfig::from_value(prior.clone())?;
                let schema = keyspace_schema();
                let renamed = prior_config.name != desired.name;
                let handle = if renamed {
                    ResourceHandle::new(&desired.name)
                } else {
                    prior_config.handle()
                };
                let planned = KeyspaceConfig::from_desired(&desired, &handle).to_value()?;
                let changes = AttributeChange::diff(&prior, &planned, &["id"]);
                if changes.is_empty() {
                    return Ok(PlanResult::no_change(planned));
                }
                let requires_replace = changes
                    .iter()
                    .any(|c| schema.force_new_attributes().any(|name| name == c.path));
                debug!(changes = changes.len(), requires_replace, "Plan computed");
                Ok(PlanResult::with_changes(planned, changes, requires_replace))
            }
        }
    }

    #[instrument(skip_all, name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let (_, desired) = desired_from_value(planned_state)?;
        let reconciler = self.reconciler().await?;

        let handle = reconciler.create(&desired).await?;
        KeyspaceConfig::from_desired(&desired, &handle).to_value()
    }

    #[instrument(skip_all, name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let mut state = KeyspaceConfig::from_value(current_state)?;
        let mut handle = state.handle();
        let reconciler = self.reconciler().await?;

        match reconciler.read(&mut handle).await? {
            Some(observed) => apply_observed(&mut state, &observed),
            None => state.id = Some(String::new()),
        }
        state.to_value()
    }

    #[instrument(skip_all, name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        check_resource_type(resource_type)?;
        let handle = KeyspaceConfig::from_value(prior_state)?.handle();
        let (_, desired) = desired_from_value(planned_state)?;
        let reconciler = self.reconciler().await?;

        if desired.name != handle.as_str() {
            warn!(
                keyspace = %handle,
                requested = %desired.name,
                "Name changes require replacement; altering the existing keyspace"
            );
        }
        reconciler.update(&handle, &desired).await?;

        let applied = DesiredState {
            name: handle.as_str().to_string(),
            ..desired
        };
        KeyspaceConfig::from_desired(&applied, &handle).to_value()
    }

    #[instrument(skip_all, name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        check_resource_type(resource_type)?;
        let mut handle = KeyspaceConfig::from_value(current_state)?.handle();
        let reconciler = self.reconciler().await?;
        reconciler.delete(&mut handle).await
    }

    #[instrument(skip(self), name = "provider.import")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        check_resource_type(resource_type)?;
        let reconciler = self.reconciler().await?;

        match reconciler.observe(id).await? {
            RemoteKeyspace::Found(observed) => {
                let state = state_from_observed(&observed).to_value()?;
                Ok(vec![ImportedResource::new(KEYSPACE_RESOURCE, state)])
            }
            RemoteKeyspace::NotFound => Err(ProviderError::NotFound(id.to_string())),
        }
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        if data_source_type != KEYSPACE_RESOURCE {
            return Err(ProviderError::UnknownResource(data_source_type.to_string()));
        }
        let name = config
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProviderError::Validation("name is required".to_string()))?
            .to_string();
        let reconciler = self.reconciler().await?;

        match reconciler.observe(&name).await? {
            RemoteKeyspace::Found(observed) => {
                let mut state = state_from_observed(&observed).to_value()?;
                state["strategy_class"] = json!(observed.strategy_class);
                state["strategy_options"] = json!(observed.strategy_options);
                Ok(state)
            }
            RemoteKeyspace::NotFound => Err(ProviderError::NotFound(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        assert_error_contains, assert_plan_changes_attribute, assert_plan_creates,
        assert_plan_no_changes, assert_plan_replaces, assert_plan_updates_in_place,
        MemoryConnector, ProviderTester, TestError,
    };

    fn orders() -> Value {
        json!({
            "name": "orders",
            "durable_writes": true,
            "replication_class": "SimpleStrategy",
            "replication_factor": 3
        })
    }

    async fn configured() -> (MemoryConnector, ProviderTester<CassandraProvider<MemoryConnector>>) {
        let connector = MemoryConnector::new();
        let tester = ProviderTester::new(CassandraProvider::new(connector.clone()));
        tester
            .configure(json!({"host_port": "127.0.0.1:9042"}))
            .await
            .unwrap();
        (connector, tester)
    }

    #[test]
    fn test_schema_registration() {
        let tester = ProviderTester::new(CassandraProvider::new(MemoryConnector::new()));
        let schema = tester.schema();

        assert!(schema.provider.attributes["password"].flags.sensitive);
        assert_eq!(
            schema.provider.attributes["host_port"].env_default.as_deref(),
            Some(ENV_HOST_PORT)
        );
        let keyspace = &schema.resources[KEYSPACE_RESOURCE];
        assert!(keyspace.attributes["name"].force_new);
        assert!(keyspace.attributes["id"].flags.computed);
        assert_eq!(tester.resource_types(), vec![KEYSPACE_RESOURCE.to_string()]);
        assert_eq!(tester.data_source_types(), vec![KEYSPACE_RESOURCE.to_string()]);
    }

    #[tokio::test]
    async fn test_configure_rejects_bad_host_port_without_connecting() {
        let connector = MemoryConnector::new();
        let provider = CassandraProvider::new(connector.clone());

        let err = provider
            .configure(json!({"host_port": "localhost"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(connector.connects().is_empty());
        assert!(!provider.is_configured().await);
    }

    #[tokio::test]
    async fn test_validate_provider_config() {
        let tester = ProviderTester::new(CassandraProvider::new(MemoryConnector::new()));
        tester
            .validate_provider_config(json!({"host_port": "db:9042"}))
            .await
            .unwrap();

        match tester.validate_provider_config(json!({"host_port": "db"})).await {
            Err(TestError::Diagnostics(diags)) => assert_error_contains(&diags, "invalid host_port"),
            other => panic!("expected diagnostics, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_calls_before_configure_fail() {
        let tester = ProviderTester::new(CassandraProvider::new(MemoryConnector::new()));
        let err = tester.create(KEYSPACE_RESOURCE, orders()).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (_, tester) = configured().await;
        let err = tester.create("cassandra_table", orders()).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_validate_resource_config() {
        let (_, tester) = configured().await;
        tester
            .validate_resource_config(KEYSPACE_RESOURCE, orders())
            .await
            .unwrap();

        let mut bad = orders();
        bad["replication_class"] = json!("Unknown");
        match tester.validate_resource_config(KEYSPACE_RESOURCE, bad).await {
            Err(TestError::Diagnostics(diags)) => {
                assert_error_contains(&diags, "replication_class must be one of")
            }
            other => panic!("expected diagnostics, got {:?}", other),
        }

        let mut bad = orders();
        bad["durable_writes"] = json!("yes");
        assert!(tester
            .validate_resource_config(KEYSPACE_RESOURCE, bad)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_plan_create_and_no_change() {
        let (_, tester) = configured().await;
        let plan = tester.plan_create(KEYSPACE_RESOURCE, orders()).await.unwrap();
        assert_plan_creates(&plan);
        assert_eq!(plan.planned_state["id"], "orders");

        let state = tester
            .create(KEYSPACE_RESOURCE, plan.planned_state)
            .await
            .unwrap();
        let plan = tester
            .plan_update(KEYSPACE_RESOURCE, state, orders())
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_plan_update_in_place_and_replace() {
        let (_, tester) = configured().await;
        let state = tester.lifecycle_create(KEYSPACE_RESOURCE, orders()).await.unwrap();

        let mut proposed = orders();
        proposed["replication_factor"] = json!(5);
        let plan = tester
            .plan_update(KEYSPACE_RESOURCE, state.clone(), proposed)
            .await
            .unwrap();
        assert_plan_updates_in_place(&plan);
        assert_plan_changes_attribute(&plan, "replication_factor");

        let mut proposed = orders();
        proposed["name"] = json!("orders_v2");
        let plan = tester
            .plan_update(KEYSPACE_RESOURCE, state, proposed)
            .await
            .unwrap();
        assert_plan_replaces(&plan);
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_without_remote_calls() {
        let (connector, tester) = configured().await;
        let mut bad = orders();
        bad["replication_class"] = json!("Unknown");

        let err = tester.plan_create(KEYSPACE_RESOURCE, bad).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(connector.session().executed().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_class_never_executes() {
        let (connector, tester) = configured().await;
        let mut bad = orders();
        bad["replication_class"] = json!("Unknown");

        let err = tester.create(KEYSPACE_RESOURCE, bad.clone()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(connector.session().executed().is_empty());
        assert!(!connector.session().contains("orders"));

        let state = tester.create(KEYSPACE_RESOURCE, orders()).await.unwrap();
        let executed = connector.session().executed();

        let err = tester
            .update(KEYSPACE_RESOURCE, state, bad)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert_eq!(connector.session().executed(), executed);
    }

    #[tokio::test]
    async fn test_read_detects_drift_and_deletion() {
        let (connector, tester) = configured().await;
        let state = tester.create(KEYSPACE_RESOURCE, orders()).await.unwrap();

        let drifted = crate::statement::build(
            crate::statement::StatementKind::Alter,
            &DesiredState::network_topology("orders", false, [("dc1", 2)]),
        )
        .unwrap();
        crate::session::CqlSession::execute(connector.session().as_ref(), &drifted)
            .await
            .unwrap();

        let refreshed = tester.read(KEYSPACE_RESOURCE, state.clone()).await.unwrap();
        assert_eq!(refreshed["durable_writes"], false);
        assert_eq!(refreshed["replication_class"], "NetworkTopologyStrategy");
        assert_eq!(refreshed["datacenters"]["dc1"], 2);
        assert!(refreshed.get("replication_factor").is_none());

        connector.session().remove("orders");
        let gone = tester.read(KEYSPACE_RESOURCE, state).await.unwrap();
        assert_eq!(gone["id"], "");
    }

    #[tokio::test]
    async fn test_import_and_data_source() {
        let (connector, tester) = configured().await;
        connector
            .session()
            .insert(&DesiredState::network_topology("events", true, [("dc1", 2), ("dc2", 1)]));

        let imported = tester.import_resource(KEYSPACE_RESOURCE, "events").await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].state["id"], "events");
        assert_eq!(imported[0].state["datacenters"], json!({"dc1": 2, "dc2": 1}));

        let err = tester
            .import_resource(KEYSPACE_RESOURCE, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));

        let data = tester
            .read_data_source(KEYSPACE_RESOURCE, json!({"name": "events"}))
            .await
            .unwrap();
        assert_eq!(
            data["strategy_class"],
            "org.apache.cassandra.locator.NetworkTopologyStrategy"
        );
        assert_eq!(data["strategy_options"]["dc2"], "1");
    }

    #[tokio::test]
    async fn test_import_unmanaged_strategy() {
        let (connector, tester) = configured().await;
        connector.session().insert_observed(ObservedState {
            name: "system".to_string(),
            durable_writes: true,
            strategy_class: "org.apache.cassandra.locator.LocalStrategy".to_string(),
            strategy_options: Default::default(),
        });

        let imported = tester.import_resource(KEYSPACE_RESOURCE, "system").await.unwrap();
        assert_eq!(imported[0].state["replication_class"], "LocalStrategy");
    }

    #[tokio::test]
    async fn test_stop_unconfigures() {
        let (_, tester) = configured().await;
        tester.stop().await.unwrap();
        assert!(!tester.provider().is_configured().await);
    }
}
