use crate::{
    broadcast::Message,
    status::{Queue, Update},
    ApiAction, ApplyError, Deployment, File, Files, NamespacedName, VolumeMount,
};

/// Publishes configuration changes to a deployment's agents.
#[derive(Clone, Debug)]
pub struct Updater {
    status: Queue,
}

/// A new desired configuration for a deployment.
#[derive(Clone, Debug, Default)]
pub struct ConfigUpdate {
    pub files: Vec<File>,
    pub volume_mounts: Vec<VolumeMount>,

    /// API actions to apply, if the deployment's upstreams changed.
    pub api_actions: Option<Vec<ApiAction>>,
}

// === impl Updater ===

impl Updater {
    pub fn new(status: Queue) -> Self {
        Self { status }
    }

    /// Applies an update to all connected agents in a single transaction and
    /// reports the deployment's resulting status.
    pub async fn update(
        &self,
        name: &NamespacedName,
        deployment: &Deployment,
        update: ConfigUpdate,
    ) -> Option<ApplyError> {
        let ConfigUpdate {
            files,
            volume_mounts,
            api_actions,
        } = update;

        let mut locked = deployment.lock_files().await;
        Self::update_config(deployment, &mut locked, files, &volume_mounts).await;
        if let Some(actions) = api_actions {
            Self::update_api_actions(deployment, &mut locked, actions).await;
        }
        drop(locked);

        let error = Self::status(deployment);
        self.status.enqueue(Update {
            deployment: name.clone(),
            gateway: deployment.gateway_name().to_string(),
            error: error.clone(),
        });
        error
    }

    /// Broadcasts changed files, waiting for every subscribed agent to apply
    /// them.
    pub async fn update_config(
        deployment: &Deployment,
        files: &mut Files<'_>,
        new_files: Vec<File>,
        volume_mounts: &[VolumeMount],
    ) {
        let Some(msg) = files.set_files(new_files, volume_mounts) else {
            tracing::debug!("Configuration unchanged");
            return;
        };

        if deployment.broadcaster().send(msg).await {
            tracing::info!(version = %files.overviews().1, "Sent configuration to agents");
        }
        deployment.set_latest_config_error(deployment.configuration_status());
    }

    /// Broadcasts each API action and records them for agents that connect
    /// later.
    pub async fn update_api_actions(
        deployment: &Deployment,
        files: &mut Files<'_>,
        actions: Vec<ApiAction>,
    ) {
        let mut errors = Vec::new();
        for action in &actions {
            if deployment
                .broadcaster()
                .send(Message::ApiAction(action.clone()))
                .await
            {
                errors.push(deployment.configuration_status());
            }
        }
        deployment.set_latest_upstream_error(ApplyError::join(errors));
        files.set_api_actions(actions);
    }

    /// The outcome of the most recent update.
    pub fn status(deployment: &Deployment) -> Option<ApplyError> {
        ApplyError::join([
            deployment.latest_config_error(),
            deployment.latest_upstream_error(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UpstreamServer;

    fn mk_update(contents: &str, actions: Option<Vec<ApiAction>>) -> ConfigUpdate {
        ConfigUpdate {
            files: vec![File::new("/etc/nginx/conf.d/http.conf", contents.to_string())],
            volume_mounts: vec![],
            api_actions: actions,
        }
    }

    fn mk_action() -> ApiAction {
        ApiAction::UpdateHttpUpstreamServers {
            upstream: "default_svc_80".to_string(),
            servers: vec![UpstreamServer {
                address: "10.0.0.1:80".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn update_records_failures_of_agents() {
        let (queue, mut updates) = Queue::channel();
        let updater = Updater::new(queue);
        let name = NamespacedName::new("ns-0", "gateway-nginx");
        let deployment = std::sync::Arc::new(Deployment::new("gateway"));
        let mut sub = deployment.broadcaster().subscribe();

        let agent = tokio::spawn({
            let deployment = deployment.clone();
            async move {
                // Fail the config apply and succeed the action.
                let msg = sub.recv().await.unwrap();
                assert!(matches!(msg, Message::ConfigApply { .. }));
                deployment.set_pod_status(
                    "pod-0",
                    Some(ApplyError::Agent {
                        message: "config apply failed".to_string(),
                        error: "bad directive".to_string(),
                    }),
                );
                sub.respond();

                let msg = sub.recv().await.unwrap();
                assert_eq!(msg, Message::ApiAction(mk_action()));
                sub.respond();
                sub
            }
        });

        let error = updater
            .update(&name, &deployment, mk_update("a", Some(vec![mk_action()])))
            .await
            .expect("must report the failure");
        assert!(error.to_string().contains("bad directive"));
        let _sub = agent.await.unwrap();

        let update = updates.recv().await.unwrap();
        assert_eq!(update.deployment, name);
        assert_eq!(update.gateway, "gateway");
        assert_eq!(update.error, Some(error));

        assert_eq!(deployment.lock_files().await.api_actions(), &[mk_action()]);
    }

    #[tokio::test]
    async fn unchanged_update_is_not_broadcast() {
        let (queue, _updates) = Queue::channel();
        let updater = Updater::new(queue);
        let name = NamespacedName::new("ns-0", "gateway-nginx");
        let deployment = Deployment::new("gateway");

        assert_eq!(updater.update(&name, &deployment, mk_update("a", None)).await, None);

        // A subscriber that never reads would block a broadcast.
        let _sub = deployment.broadcaster().subscribe();
        assert_eq!(updater.update(&name, &deployment, mk_update("a", None)).await, None);
    }
}
