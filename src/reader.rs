//! Remote keyspace catalog reads.

use std::sync::Arc;

use tracing::debug;

use crate::error::ProviderError;
use crate::model::ObservedState;
use crate::session::{CqlSession, SessionError};

/// Result of looking a keyspace up in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteKeyspace {
    /// The keyspace exists with these properties.
    Found(ObservedState),
    /// The catalog has no keyspace by that name.
    NotFound,
}

impl RemoteKeyspace {
    /// The observed state, if found.
    pub fn into_observed(self) -> Option<ObservedState> {
        match self {
            Self::Found(observed) => Some(observed),
            Self::NotFound => None,
        }
    }
}

/// Reads keyspace metadata and normalizes absence into [`RemoteKeyspace::NotFound`].
#[derive(Clone)]
pub struct KeyspaceReader {
    session: Arc<dyn CqlSession>,
}

impl KeyspaceReader {
    /// Create a reader over a session.
    pub fn new(session: Arc<dyn CqlSession>) -> Self {
        Self { session }
    }

    /// Look a keyspace up by exact name.
    ///
    /// Transport and decoding failures are returned as
    /// [`ProviderError::RemoteRead`] and never read as absence.
    pub async fn read(&self, name: &str) -> Result<RemoteKeyspace, ProviderError> {
        match self.session.describe_keyspace(name).await {
            Ok(observed) if observed.is_empty() || observed.name != name => {
                debug!(keyspace = %name, returned = %observed.name, "Catalog returned no matching metadata");
                Ok(RemoteKeyspace::NotFound)
            }
            Ok(observed) => Ok(RemoteKeyspace::Found(observed)),
            Err(SessionError::KeyspaceNotFound(_)) => {
                debug!(keyspace = %name, "Keyspace not in catalog");
                Ok(RemoteKeyspace::NotFound)
            }
            Err(e) => Err(ProviderError::RemoteRead(format!(
                "reading keyspace '{}': {}",
                name, e
            ))),
        }
    }
}
