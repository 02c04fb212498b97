use crate::{Container, DaemonSet, Deployment, NamespacedName, PodTemplateSpec, WorkloadKind};
use anyhow::{anyhow, Context, Result};
use kube::{Api, Client};

/// Reads the proxy container image that a workload's pods are expected to run.
#[async_trait::async_trait]
pub trait ImageReader {
    async fn proxy_image(&self, parent: &NamespacedName, kind: WorkloadKind) -> Result<String>;
}

/// Looks up workload pod templates through the Kubernetes API.
#[derive(Clone)]
pub struct KubeImageReader {
    client: Client,
    container: String,
}

// === impl KubeImageReader ===

impl KubeImageReader {
    pub fn new(client: Client, container: impl ToString) -> Self {
        Self {
            client,
            container: container.to_string(),
        }
    }

    async fn template(
        &self,
        parent: &NamespacedName,
        kind: WorkloadKind,
    ) -> Result<Option<PodTemplateSpec>> {
        let template = match kind {
            WorkloadKind::Deployment => {
                let api = Api::<Deployment>::namespaced(self.client.clone(), &parent.namespace);
                api.get(&parent.name)
                    .await
                    .with_context(|| format!("failed to get Deployment {parent}"))?
                    .spec
                    .map(|spec| spec.template)
            }
            WorkloadKind::DaemonSet => {
                let api = Api::<DaemonSet>::namespaced(self.client.clone(), &parent.namespace);
                api.get(&parent.name)
                    .await
                    .with_context(|| format!("failed to get DaemonSet {parent}"))?
                    .spec
                    .map(|spec| spec.template)
            }
        };
        Ok(template)
    }
}

#[async_trait::async_trait]
impl ImageReader for KubeImageReader {
    async fn proxy_image(&self, parent: &NamespacedName, kind: WorkloadKind) -> Result<String> {
        let containers = self
            .template(parent, kind)
            .await?
            .and_then(|t| t.spec)
            .map(|spec| spec.containers)
            .unwrap_or_default();

        let image = container_image(&containers, &self.container).ok_or_else(|| {
            anyhow!(
                "{} container not found in {kind} {:?}",
                self.container,
                parent.name
            )
        })?;
        tracing::debug!(%parent, %kind, %image, "Found proxy image");
        Ok(image)
    }
}

fn container_image(containers: &[Container], name: &str) -> Option<String> {
    containers
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.image.clone().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_container(name: &str, image: &str) -> Container {
        Container {
            name: name.to_string(),
            image: Some(image.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn finds_named_container() {
        let containers = vec![
            mk_container("init", "busybox:1"),
            mk_container("nginx", "nginx:1.27"),
        ];
        assert_eq!(
            container_image(&containers, "nginx"),
            Some("nginx:1.27".to_string())
        );
        assert_eq!(container_image(&containers, "proxy"), None);
    }
}
