use crate::{NamespacedName, WorkloadKind};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Describes an agent connection: the workload that owns the agent's pod and
/// the agent's proxy instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Connection {
    pub parent_name: NamespacedName,
    pub parent_kind: Option<WorkloadKind>,

    /// Empty until the agent discovers its local proxy process.
    pub instance_id: String,
}

/// Tracks agent connections by the per-stream identity the agent presents.
///
/// Each live agent stream owns one entry, which is removed when the stream
/// ends.
#[derive(Clone, Debug, Default)]
pub struct ConnectionTracker(Arc<RwLock<HashMap<String, Connection>>>);

// === impl Connection ===

impl Connection {
    /// A connection is ready once its owning workload is known. The proxy
    /// instance may not have been discovered yet.
    pub fn is_ready(&self) -> bool {
        !self.parent_name.is_empty() && self.parent_kind.is_some()
    }
}

// === impl ConnectionTracker ===

impl ConnectionTracker {
    pub fn track(&self, id: impl ToString, conn: Connection) {
        self.0.write().insert(id.to_string(), conn);
    }

    /// Returns the tracked connection, or an empty connection if none is
    /// tracked for `id`.
    pub fn get(&self, id: &str) -> Connection {
        self.0.read().get(id).cloned().unwrap_or_default()
    }

    pub fn is_ready(&self, id: &str) -> bool {
        self.0.read().get(id).map(Connection::is_ready).unwrap_or(false)
    }

    /// Records the proxy instance for an already-tracked connection.
    pub fn set_instance_id(&self, id: &str, instance_id: impl ToString) {
        if let Some(conn) = self.0.write().get_mut(id) {
            conn.instance_id = instance_id.to_string();
        }
    }

    pub fn remove(&self, id: &str) {
        self.0.write().remove(id);
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}
