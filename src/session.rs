//! CQL driver capability.
//!
//! The reconciler talks to the cluster only through [`CqlSession`]. A
//! production session is opened by a [`Connector`]; [`ScyllaConnector`]
//! does so with the `scylla` driver, which speaks CQL to Apache Cassandra
//! as well as ScyllaDB.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::model::ObservedState;
use crate::statement::Statement;

/// Keyspace the provider session logs into.
pub const CONTROL_KEYSPACE: &str = "system";

const DESCRIBE_KEYSPACE_QUERY: &str = r#"
    SELECT keyspace_name, durable_writes, replication
      FROM system_schema.keyspaces
      WHERE keyspace_name = ?
"#;

/// Errors reported by a session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The session could not be established.
    #[error("failed to connect to {host_port}: {reason}")]
    Connect {
        /// Contact point.
        host_port: String,
        /// Driver message.
        reason: String,
    },

    /// A statement failed at the database or in transit.
    #[error("statement failed: {0}")]
    Execution(String),

    /// A catalog query failed or returned rows that could not be decoded.
    #[error("catalog read failed: {0}")]
    Read(String),

    /// The catalog has no keyspace with this name.
    #[error("keyspace not found: {0}")]
    KeyspaceNotFound(String),
}

/// An open session against the cluster.
///
/// Implementations must be safe to share between concurrent lifecycle calls.
#[async_trait::async_trait]
pub trait CqlSession: Send + Sync + 'static {
    /// Execute an administrative statement.
    async fn execute(&self, statement: &Statement) -> Result<(), SessionError>;

    /// Describe a keyspace from the catalog.
    ///
    /// A missing keyspace may be reported either as
    /// [`SessionError::KeyspaceNotFound`] or as blank metadata; callers must
    /// handle both.
    async fn describe_keyspace(&self, name: &str) -> Result<ObservedState, SessionError>;
}

/// Opens sessions from validated provider configuration.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect to the cluster.
    async fn connect(&self, config: &ProviderConfig) -> Result<Arc<dyn CqlSession>, SessionError>;
}

/// Connects with the `scylla` driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScyllaConnector;

#[async_trait::async_trait]
impl Connector for ScyllaConnector {
    async fn connect(&self, config: &ProviderConfig) -> Result<Arc<dyn CqlSession>, SessionError> {
        let session = ScyllaSession::connect(config).await?;
        Ok(Arc::new(session))
    }
}

/// A [`CqlSession`] backed by a `scylla` driver session.
pub struct ScyllaSession {
    session: Session,
}

impl ScyllaSession {
    /// Open a session to `config.host_port`, authenticating when a username is set.
    pub async fn connect(config: &ProviderConfig) -> Result<Self, SessionError> {
        let mut builder = SessionBuilder::new()
            .known_node(&config.host_port)
            .use_keyspace(CONTROL_KEYSPACE, false);
        if !config.username.is_empty() {
            builder = builder.user(&config.username, &config.password);
        }

        let session = builder.build().await.map_err(|e| SessionError::Connect {
            host_port: config.host_port.clone(),
            reason: e.to_string(),
        })?;
        info!(host_port = %config.host_port, "Connected to Cassandra");
        Ok(Self { session })
    }
}

#[async_trait::async_trait]
impl CqlSession for ScyllaSession {
    async fn execute(&self, statement: &Statement) -> Result<(), SessionError> {
        // DDL does not accept bind markers, so parameters are inlined as
        // escaped literals at this boundary.
        let cql = statement
            .render()
            .map_err(|e| SessionError::Execution(e.to_string()))?;
        debug!(keyspace = %statement.keyspace, kind = %statement.kind, "Executing statement");
        self.session
            .query_unpaged(cql, ())
            .await
            .map_err(|e| SessionError::Execution(e.to_string()))?;
        Ok(())
    }

    async fn describe_keyspace(&self, name: &str) -> Result<ObservedState, SessionError> {
        let result = self
            .session
            .query_unpaged(DESCRIBE_KEYSPACE_QUERY, (name,))
            .await
            .map_err(|e| SessionError::Read(e.to_string()))?;
        let rows = result
            .into_rows_result()
            .map_err(|e| SessionError::Read(e.to_string()))?;
        let mut iter = rows
            .rows::<(String, bool, HashMap<String, String>)>()
            .map_err(|e| SessionError::Read(e.to_string()))?;

        match iter.next() {
            None => Err(SessionError::KeyspaceNotFound(name.to_string())),
            Some(row) => {
                let (keyspace_name, durable_writes, replication) =
                    row.map_err(|e| SessionError::Read(e.to_string()))?;
                Ok(observed_from_replication(
                    keyspace_name,
                    durable_writes,
                    replication,
                ))
            }
        }
    }
}

/// Split a catalog `replication` map into class and options.
pub fn observed_from_replication<I>(name: String, durable_writes: bool, replication: I) -> ObservedState
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut strategy_class = String::new();
    let mut strategy_options = BTreeMap::new();
    for (key, value) in replication {
        if key == "class" {
            strategy_class = value;
        } else {
            strategy_options.insert(key, value);
        }
    }
    ObservedState {
        name,
        durable_writes,
        strategy_class,
        strategy_options,
    }
}
