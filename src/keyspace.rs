//! Keyspace lifecycle reconciliation.
//!
//! A keyspace is either unmanaged (empty handle) or present (handle set to
//! its name). Every call re-derives which from the catalog; nothing is
//! cached between calls.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::ProviderError;
use crate::model::{DesiredState, ObservedState, ResourceHandle};
use crate::reader::{KeyspaceReader, RemoteKeyspace};
use crate::session::CqlSession;
use crate::statement::{build, build_drop, Statement, StatementKind};

/// Drives create/read/update/delete for keyspaces over one shared session.
#[derive(Clone)]
pub struct KeyspaceReconciler {
    session: Arc<dyn CqlSession>,
    reader: KeyspaceReader,
}

impl KeyspaceReconciler {
    /// Create a reconciler over a session.
    pub fn new(session: Arc<dyn CqlSession>) -> Self {
        let reader = KeyspaceReader::new(Arc::clone(&session));
        Self { session, reader }
    }

    /// Look a keyspace up without touching any handle.
    pub async fn observe(&self, name: &str) -> Result<RemoteKeyspace, ProviderError> {
        self.reader.read(name).await
    }

    /// Create the keyspace, returning its handle.
    ///
    /// Creation uses `IF NOT EXISTS`, so repeating it is a no-op.
    #[instrument(skip(self, desired), fields(keyspace = %desired.name))]
    pub async fn create(&self, desired: &DesiredState) -> Result<ResourceHandle, ProviderError> {
        let statement = build(StatementKind::Create, desired)?;
        self.execute(&statement).await?;
        info!(replication = desired.replication.class(), "Keyspace created");
        Ok(ResourceHandle::new(&desired.name))
    }

    /// Refresh the handle from the catalog.
    ///
    /// Clears the handle when the keyspace is gone. Read failures propagate
    /// and leave the handle as it was.
    #[instrument(skip(self), fields(keyspace = %handle))]
    pub async fn read(
        &self,
        handle: &mut ResourceHandle,
    ) -> Result<Option<ObservedState>, ProviderError> {
        if !handle.is_set() {
            return Ok(None);
        }
        match self.reader.read(handle.as_str()).await? {
            RemoteKeyspace::Found(observed) => Ok(Some(observed)),
            RemoteKeyspace::NotFound => {
                warn!("Keyspace no longer exists, clearing id");
                handle.clear();
                Ok(None)
            }
        }
    }

    /// Alter the keyspace named by the handle to match `desired`.
    ///
    /// The handle's name is used even if `desired.name` differs; renames
    /// are replacements, not alterations.
    #[instrument(skip(self, desired), fields(keyspace = %handle))]
    pub async fn update(
        &self,
        handle: &ResourceHandle,
        desired: &DesiredState,
    ) -> Result<(), ProviderError> {
        if !handle.is_set() {
            return Err(ProviderError::FailedPrecondition(
                "cannot alter a keyspace without an id".to_string(),
            ));
        }
        let target = DesiredState {
            name: handle.as_str().to_string(),
            ..desired.clone()
        };
        let statement = build(StatementKind::Alter, &target)?;
        self.execute(&statement).await?;
        info!(replication = desired.replication.class(), "Keyspace altered");
        Ok(())
    }

    /// Drop the keyspace if it still exists, then clear the handle.
    ///
    /// On a failed drop the handle is left set so the host can retry.
    #[instrument(skip(self), fields(keyspace = %handle))]
    pub async fn delete(&self, handle: &mut ResourceHandle) -> Result<(), ProviderError> {
        if self.read(handle).await?.is_none() {
            info!("Keyspace already absent");
            return Ok(());
        }
        let statement = build_drop(handle.as_str());
        self.execute(&statement).await?;
        handle.clear();
        info!("Keyspace dropped");
        Ok(())
    }

    async fn execute(&self, statement: &Statement) -> Result<(), ProviderError> {
        self.session.execute(statement).await.map_err(|e| {
            ProviderError::RemoteExecution(format!(
                "{} keyspace '{}': {}",
                statement.kind, statement.keyspace, e
            ))
        })
    }
}
