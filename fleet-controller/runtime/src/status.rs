use crate::core::status::Update;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use tokio::sync::mpsc::UnboundedReceiver;

/// Drains deployment status updates.
///
/// Updates are reported as they arrive; the controller stops once every
/// status queue has been dropped.
pub struct Controller {
    updates: UnboundedReceiver<Update>,
    metrics: ControllerMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct ControllerMetrics {
    updates: Counter,
    failures: Counter,
}

// === impl Controller ===

impl Controller {
    pub fn new(updates: UnboundedReceiver<Update>, metrics: ControllerMetrics) -> Self {
        Self { updates, metrics }
    }

    pub async fn process_updates(mut self) {
        while let Some(Update {
            deployment,
            gateway,
            error,
        }) = self.updates.recv().await
        {
            self.metrics.updates.inc();
            match error {
                None => tracing::info!(%deployment, %gateway, "Proxy configured"),
                Some(error) => {
                    self.metrics.failures.inc();
                    tracing::warn!(%deployment, %gateway, %error, "Failed to configure proxy");
                }
            }
        }
        tracing::debug!("Status updates closed");
    }
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let updates = Counter::default();
        reg.register(
            "updates",
            "Count of deployment status updates",
            updates.clone(),
        );

        let failures = Counter::default();
        reg.register(
            "failures",
            "Count of deployment status updates reporting a configuration failure",
            failures.clone(),
        );

        Self { updates, failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{status::Queue, ApplyError, NamespacedName};

    #[tokio::test]
    async fn counts_updates_and_failures() {
        let (queue, updates) = Queue::channel();
        let metrics = ControllerMetrics::default();
        let controller = Controller::new(updates, metrics.clone());

        let deployment = NamespacedName::new("ns-0", "gateway-nginx");
        queue.enqueue(Update {
            deployment: deployment.clone(),
            gateway: "gateway".to_string(),
            error: None,
        });
        queue.enqueue(Update {
            deployment,
            gateway: "gateway".to_string(),
            error: Some(ApplyError::Validation("image mismatch".to_string())),
        });
        drop(queue);

        controller.process_updates().await;
        assert_eq!(metrics.updates.get(), 2);
        assert_eq!(metrics.failures.get(), 1);
    }
}
