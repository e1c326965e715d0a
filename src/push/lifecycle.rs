//! Push-query admission and teardown
//!
//! Registration is a single atomic check-and-insert against the concurrency
//! quota: when one slot remains, exactly one of any number of concurrent
//! callers wins it. Explicit termination and transport disconnect converge
//! on the same idempotent removal path, which unregisters the queue from
//! the fan-out registry and closes it.

use super::queue::ProcessingQueue;
use super::registry::PushRegistry;
use crate::{Error, Result};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Opaque identifier of one live push query. Never reused while registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushQueryId(Uuid);

impl PushQueryId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PushQueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for PushQueryId {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| format!("invalid push query id '{}': {}", value, e))
    }
}

/// Identifier of the transport connection a query rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One admitted push query: its id, owning connection, and queue.
#[derive(Clone)]
pub struct PushQueryHandle {
    pub id: PushQueryId,
    pub connection: ConnectionId,
    pub queue: Arc<ProcessingQueue>,
}

/// Admits push queries against a quota and owns their teardown.
pub struct QueryLifecycleManager {
    registry: Arc<PushRegistry>,
    max_push_queries: usize,
    queries: Mutex<HashMap<PushQueryId, PushQueryHandle>>,
}

impl QueryLifecycleManager {
    pub fn new(registry: Arc<PushRegistry>, max_push_queries: usize) -> Self {
        Self {
            registry,
            max_push_queries,
            queries: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_push_queries(&self) -> usize {
        self.max_push_queries
    }

    pub fn num_live(&self) -> usize {
        self.queries.lock().len()
    }

    /// Admit a query if a quota slot is free and register its queue with
    /// the fan-out registry. Check and insert happen under one lock so
    /// concurrent callers can never both take the last slot.
    pub fn register_query(&self, handle: PushQueryHandle) -> Result<()> {
        let mut queries = self.queries.lock();

        if queries.contains_key(&handle.id) {
            // Ids are generated, so a collision is a caller defect.
            error!("Push query id {} registered twice", handle.id);
            return Err(Error::DuplicateRegistration(handle.id.to_string()));
        }
        if queries.len() >= self.max_push_queries {
            return Err(Error::QuotaExceeded {
                max: self.max_push_queries,
            });
        }

        self.registry.register(Arc::clone(&handle.queue));
        info!(
            "Registered push query {} on connection {} ({}/{} slots used)",
            handle.id,
            handle.connection,
            queries.len() + 1,
            self.max_push_queries
        );
        queries.insert(handle.id, handle);
        Ok(())
    }

    /// Remove a query, unregister its queue from the fan-out registry, and
    /// close the queue. A no-op when the id is not registered, so the
    /// racing termination and disconnect paths are both safe.
    pub fn remove_query(&self, id: &PushQueryId) -> Option<PushQueryHandle> {
        let removed = self.queries.lock().remove(id);
        match removed {
            Some(handle) => {
                self.registry.unregister(&handle.queue);
                handle.queue.close();
                info!("Removed push query {}", id);
                Some(handle)
            }
            None => {
                debug!("Push query {} already removed", id);
                None
            }
        }
    }

    /// Tear down every query owned by a lost connection. Returns how many
    /// queries were removed.
    pub fn remove_for_connection(&self, connection: &ConnectionId) -> usize {
        let ids: Vec<PushQueryId> = self
            .queries
            .lock()
            .values()
            .filter(|h| h.connection == *connection)
            .map(|h| h.id)
            .collect();

        let mut removed = 0;
        for id in ids {
            if self.remove_query(&id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Connection {} lost, removed {} push queries", connection, removed);
        }
        removed
    }

    /// Close every live query; used at process shutdown.
    pub fn shutdown(&self) {
        let ids: Vec<PushQueryId> = self.queries.lock().keys().copied().collect();
        for id in ids {
            self.remove_query(&id);
        }
    }
}
