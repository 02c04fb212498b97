use crate::{
    core::{status::Queue, ConnectionTracker, DeploymentStore, Updater},
    grpc::{self, CommandConfig, CommandService, FileService, GrpcServerMetricsFamily, ResetHandle},
    k8s::KubeImageReader,
    status,
};
use anyhow::{bail, Result};
use clap::Parser;
use futures::prelude::*;
use prometheus_client::registry::Registry;
use std::{sync::Arc, time::Duration};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "fleet", about = "Configures the proxies of a gateway fleet")]
pub struct Args {
    #[clap(
        long,
        default_value = "fleet=info,warn",
        env = "FLEET_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Bounds the wait for a subscribing agent's connection and deployment.
    #[clap(long, default_value = "30000")]
    connection_timeout_ms: u64,

    #[clap(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    connection_poll_interval_ms: u64,

    #[clap(long, default_value = "30000")]
    image_validation_timeout_ms: u64,

    #[clap(long, default_value = "5000")]
    api_action_timeout_ms: u64,

    #[clap(long, default_value = "500", value_parser = clap::value_parser!(u64).range(1..))]
    api_action_interval_ms: u64,

    /// The pod template container whose image must match the deployment's
    /// proxy image.
    #[clap(long, default_value = "nginx")]
    proxy_container_name: String,

    #[clap(long, default_value_t = grpc::DEFAULT_CHUNK_SIZE)]
    file_chunk_size: u32,
}

/// Handles to every component that serves agents.
///
/// The provisioning side publishes configuration through `deployments` and
/// `updater`; the transport binds `commands` and `files`.
#[derive(Clone)]
pub struct Fleet {
    pub tracker: ConnectionTracker,
    pub deployments: DeploymentStore,
    pub updater: Updater,
    pub commands: CommandService,
    pub files: FileService,
    pub reset: ResetHandle,
}

impl Args {
    #[inline]
    pub async fn parse_and_run<F, S>(serve: F) -> Result<()>
    where
        F: FnOnce(Fleet, drain::Watch) -> S,
        S: Future<Output = Result<()>> + Send + 'static,
    {
        Self::parse().run(serve).await
    }

    /// Runs the controller, handing the assembled [`Fleet`] to `serve`, until
    /// the process is signaled to shut down.
    pub async fn run<F, S>(self, serve: F) -> Result<()>
    where
        F: FnOnce(Fleet, drain::Watch) -> S,
        S: Future<Output = Result<()>> + Send + 'static,
    {
        let commands_config = self.command_config();
        let Self {
            admin,
            client,
            log_level,
            log_format,
            proxy_container_name,
            file_chunk_size,
            ..
        } = self;

        let mut prom = <Registry>::default();
        let grpc_metrics = GrpcServerMetricsFamily::register(prom.sub_registry_with_prefix("grpc"));
        let status_metrics =
            status::ControllerMetrics::register(prom.sub_registry_with_prefix("deployment_status"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let tracker = ConnectionTracker::default();
        let deployments = DeploymentStore::default();
        let (queue, updates) = Queue::channel();
        let (reset, reset_signal) = ResetHandle::new();
        let images = KubeImageReader::new(runtime.client(), proxy_container_name);

        let commands = CommandService::new(
            tracker.clone(),
            deployments.clone(),
            queue.clone(),
            Arc::new(images),
            reset_signal,
            commands_config,
            &grpc_metrics,
        );
        let files = FileService::new(
            tracker.clone(),
            deployments.clone(),
            file_chunk_size,
            &grpc_metrics,
        );
        let fleet = Fleet {
            tracker,
            deployments,
            updater: Updater::new(queue),
            commands,
            files,
            reset,
        };

        tokio::spawn(
            status::Controller::new(updates, status_metrics)
                .process_updates()
                .instrument(info_span!("status_controller")),
        );

        let server = serve(fleet, runtime.shutdown_handle());
        tokio::spawn(
            async move {
                if let Err(error) = server.await {
                    tracing::error!(%error, "Agent server failed");
                }
            }
            .instrument(info_span!("grpc")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for
        // the server to drain before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }

    fn command_config(&self) -> CommandConfig {
        CommandConfig {
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
            connection_poll_interval: Duration::from_millis(self.connection_poll_interval_ms),
            image_validation_timeout: Duration::from_millis(self.image_validation_timeout_ms),
            api_action_timeout: Duration::from_millis(self.api_action_timeout_ms),
            api_action_interval: Duration::from_millis(self.api_action_interval_ms),
        }
    }
}
