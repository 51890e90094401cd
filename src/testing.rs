//! Testing utilities.
//!
//! [`MemorySession`] is an in-memory keyspace catalog implementing
//! [`CqlSession`], and [`ProviderTester`] drives a [`ProviderService`]
//! the way the host engine would.
//!
//! # Example
//!
//! ```ignore
//! use cassandra_keyspace_provider::testing::{MemoryConnector, ProviderTester};
//! use cassandra_keyspace_provider::CassandraProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_keyspace() {
//!     let connector = MemoryConnector::new();
//!     let tester = ProviderTester::new(CassandraProvider::new(connector.clone()));
//!     tester.configure(json!({})).await.unwrap();
//!
//!     let state = tester.lifecycle_create("cassandra_keyspace", json!({
//!         "name": "orders",
//!         "durable_writes": true,
//!         "replication_class": "SimpleStrategy",
//!         "replication_factor": 3
//!     })).await.unwrap();
//!
//!     assert_eq!(state["id"], "orders");
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::model::{DesiredState, ObservedState, NETWORK_TOPOLOGY_STRATEGY, SIMPLE_STRATEGY};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::ProviderService;
use crate::session::{Connector, CqlSession, SessionError};
use crate::statement::{build, Statement, StatementKind};
use crate::types::{ImportedResource, PlanResult};

/// Package prefix the catalog reports strategy classes under.
pub const STRATEGY_PACKAGE: &str = "org.apache.cassandra.locator";

#[derive(Default)]
struct Catalog {
    keyspaces: BTreeMap<String, ObservedState>,
    executed: Vec<Statement>,
    execution_failure: Option<String>,
    read_failure: Option<String>,
}

/// An in-memory keyspace catalog.
///
/// Applies create, alter and drop statements the way a cluster would, and
/// records every statement it was asked to execute.
#[derive(Default)]
pub struct MemorySession {
    catalog: Mutex<Catalog>,
    empty_metadata_for_missing: bool,
}

impl MemorySession {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report missing keyspaces as blank metadata instead of an error,
    /// like some driver metadata paths do.
    pub fn with_empty_metadata_for_missing(mut self) -> Self {
        self.empty_metadata_for_missing = true;
        self
    }

    /// Seed a keyspace directly, bypassing the statement log.
    pub fn insert(&self, desired: &DesiredState) {
        let observed = observed_from_desired(desired);
        self.lock().keyspaces.insert(desired.name.clone(), observed);
    }

    /// Seed arbitrary catalog metadata.
    pub fn insert_observed(&self, observed: ObservedState) {
        self.lock().keyspaces.insert(observed.name.clone(), observed);
    }

    /// Remove a keyspace behind the provider's back.
    pub fn remove(&self, name: &str) {
        self.lock().keyspaces.remove(name);
    }

    /// Whether the catalog holds a keyspace.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().keyspaces.contains_key(name)
    }

    /// Names of all keyspaces, sorted.
    pub fn keyspace_names(&self) -> Vec<String> {
        self.lock().keyspaces.keys().cloned().collect()
    }

    /// Every statement passed to `execute`, including failed ones.
    pub fn executed(&self) -> Vec<Statement> {
        self.lock().executed.clone()
    }

    /// Make every subsequent `execute` fail with this message.
    pub fn fail_executions(&self, message: impl Into<String>) {
        self.lock().execution_failure = Some(message.into());
    }

    /// Make every subsequent catalog read fail with this message.
    pub fn fail_reads(&self, message: impl Into<String>) {
        self.lock().read_failure = Some(message.into());
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        let mut catalog = self.lock();
        catalog.execution_failure = None;
        catalog.read_failure = None;
    }

    fn lock(&self) -> MutexGuard<'_, Catalog> {
        // A panicking test thread must not hide the catalog from the others.
        self.catalog.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn observed_from_desired(desired: &DesiredState) -> ObservedState {
    ObservedState {
        name: desired.name.clone(),
        durable_writes: desired.durable_writes,
        strategy_class: format!("{}.{}", STRATEGY_PACKAGE, desired.replication.class()),
        strategy_options: desired
            .replication
            .options()
            .into_iter()
            .map(|(key, count)| (key.to_string(), count.to_string()))
            .collect(),
    }
}

fn observed_from_statement(statement: &Statement) -> Result<ObservedState, SessionError> {
    let class = statement
        .replication_class()
        .ok_or_else(|| SessionError::Execution("missing replication class".to_string()))?;
    if class != SIMPLE_STRATEGY && class != NETWORK_TOPOLOGY_STRATEGY {
        return Err(SessionError::Execution(format!(
            "Unable to find replication strategy class '{}'",
            class
        )));
    }
    let durable_writes = statement
        .durable_writes()
        .ok_or_else(|| SessionError::Execution("missing durable_writes".to_string()))?;

    Ok(ObservedState {
        name: statement.keyspace.clone(),
        durable_writes,
        strategy_class: format!("{}.{}", STRATEGY_PACKAGE, class),
        strategy_options: statement
            .option_pairs()
            .into_iter()
            .map(|(key, count)| (key.to_string(), count.to_string()))
            .collect(),
    })
}

#[async_trait::async_trait]
impl CqlSession for MemorySession {
    async fn execute(&self, statement: &Statement) -> Result<(), SessionError> {
        let mut catalog = self.lock();
        catalog.executed.push(statement.clone());
        if let Some(message) = &catalog.execution_failure {
            return Err(SessionError::Execution(message.clone()));
        }

        let name = &statement.keyspace;
        match statement.kind {
            StatementKind::Create => {
                if !catalog.keyspaces.contains_key(name) {
                    let observed = observed_from_statement(statement)?;
                    catalog.keyspaces.insert(name.clone(), observed);
                }
                Ok(())
            }
            StatementKind::Alter => {
                if !catalog.keyspaces.contains_key(name) {
                    return Err(SessionError::Execution(format!(
                        "Cannot alter non existing keyspace '{}'",
                        name
                    )));
                }
                let observed = observed_from_statement(statement)?;
                catalog.keyspaces.insert(name.clone(), observed);
                Ok(())
            }
            StatementKind::Drop => match catalog.keyspaces.remove(name) {
                Some(_) => Ok(()),
                None => Err(SessionError::Execution(format!(
                    "Cannot drop non existing keyspace '{}'",
                    name
                ))),
            },
        }
    }

    async fn describe_keyspace(&self, name: &str) -> Result<ObservedState, SessionError> {
        let catalog = self.lock();
        if let Some(message) = &catalog.read_failure {
            return Err(SessionError::Read(message.clone()));
        }
        match catalog.keyspaces.get(name) {
            Some(observed) => Ok(observed.clone()),
            None if self.empty_metadata_for_missing => Ok(ObservedState::default()),
            None => Err(SessionError::KeyspaceNotFound(name.to_string())),
        }
    }
}

/// A [`Connector`] that hands out one shared [`MemorySession`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    session: Arc<MemorySession>,
    connects: Arc<Mutex<Vec<ProviderConfig>>>,
}

impl MemoryConnector {
    /// A connector over a fresh catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector over an existing catalog.
    pub fn with_session(session: Arc<MemorySession>) -> Self {
        Self {
            session,
            connects: Arc::default(),
        }
    }

    /// The shared catalog.
    pub fn session(&self) -> Arc<MemorySession> {
        Arc::clone(&self.session)
    }

    /// Configurations `connect` was called with.
    pub fn connects(&self) -> Vec<ProviderConfig> {
        self.connects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &ProviderConfig) -> Result<Arc<dyn CqlSession>, SessionError> {
        self.connects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(config.clone());
        let session: Arc<dyn CqlSession> = self.session.clone();
        Ok(session)
    }
}

/// Build a create statement and apply it, for seeding tests.
pub async fn apply_create(session: &MemorySession, desired: &DesiredState) -> Result<(), ProviderError> {
    let statement = build(StatementKind::Create, desired)?;
    session
        .execute(&statement)
        .await
        .map_err(|e| ProviderError::RemoteExecution(e.to_string()))
}

/// A test harness for provider implementations.
///
/// Wraps a `ProviderService` and exposes the host engine's call sequence.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Validate provider configuration.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Run plan → create → read and return the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run plan → update → read and return the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Run create → update → delete, returning the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Assert that a plan creates the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to create, not replace"
    );
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates in place.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan changes a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error whose summary contains `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
