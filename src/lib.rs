//! Cassandra Keyspace Provider
//!
//! A Hemmer provider that manages Cassandra keyspaces declaratively. Each
//! `cassandra_keyspace` resource names a keyspace, its durable-writes flag
//! and its replication strategy; the provider creates, reads, alters and
//! drops keyspaces so the cluster converges on that description.
//!
//! # Overview
//!
//! - **Statements**: [`statement::build`] renders `CREATE`/`ALTER`/`DROP KEYSPACE` CQL
//! - **Remote state**: [`reader::KeyspaceReader`] reads `system_schema.keyspaces`
//! - **Reconciler**: [`keyspace::KeyspaceReconciler`] implements the resource lifecycle
//! - **Provider**: [`CassandraProvider`] maps host calls onto the reconciler
//! - **Sessions**: [`session::CqlSession`] abstracts the `scylla` driver
//! - **Testing**: [`testing::MemorySession`] and [`testing::ProviderTester`]
//!
//! # Quick Start
//!
//! ```ignore
//! use cassandra_keyspace_provider::{CassandraProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     cassandra_keyspace_provider::init_logging();
//!
//!     let provider = CassandraProvider::scylla();
//!     provider.configure(json!({"host_port": "127.0.0.1:9042"})).await?;
//!
//!     let planned = json!({
//!         "name": "orders",
//!         "durable_writes": true,
//!         "replication_class": "SimpleStrategy",
//!         "replication_factor": 3
//!     });
//!     let state = provider.create("cassandra_keyspace", planned).await?;
//!     assert_eq!(state["id"], "orders");
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! | Attribute   | Environment          | Default          |
//! |-------------|----------------------|------------------|
//! | `host_port` | `CASSANDRA_HOSTPORT` | `localhost:9042` |
//! | `username`  | `CASSANDRA_USERNAME` | empty            |
//! | `password`  | `CASSANDRA_PASSWORD` | empty            |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod keyspace;
pub mod logging;
pub mod model;
pub mod provider;
pub mod reader;
pub mod schema;
pub mod service;
pub mod session;
pub mod statement;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use keyspace::KeyspaceReconciler;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use model::{DesiredState, KeyspaceConfig, ObservedState, ReplicationSpec, ResourceHandle};
pub use provider::{CassandraProvider, KEYSPACE_RESOURCE};
pub use reader::{KeyspaceReader, RemoteKeyspace};
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use session::{Connector, CqlSession, ScyllaConnector, ScyllaSession, SessionError};
pub use statement::{Statement, StatementKind};
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::validate;

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
