use crate::{Deployment, NamespacedName};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Holds one [`Deployment`] per proxy workload.
#[derive(Clone, Debug, Default)]
pub struct DeploymentStore(Arc<RwLock<HashMap<NamespacedName, Arc<Deployment>>>>);

// === impl DeploymentStore ===

impl DeploymentStore {
    pub fn get(&self, name: &NamespacedName) -> Option<Arc<Deployment>> {
        self.0.read().get(name).cloned()
    }

    /// Returns the deployment for `name`, creating it if it does not exist.
    pub fn get_or_insert(&self, name: &NamespacedName, gateway_name: &str) -> Arc<Deployment> {
        if let Some(deployment) = self.get(name) {
            return deployment;
        }

        self.0
            .write()
            .entry(name.clone())
            .or_insert_with(|| {
                tracing::debug!(%name, gateway = %gateway_name, "Adding deployment");
                Arc::new(Deployment::new(gateway_name))
            })
            .clone()
    }

    /// Removes a deployment. Agents still subscribed to it are not notified.
    pub fn remove(&self, name: &NamespacedName) {
        if self.0.write().remove(name).is_some() {
            tracing::debug!(%name, "Removed deployment");
        }
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}
