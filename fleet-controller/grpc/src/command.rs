//! The agent command service.
//!
//! Each agent subscription runs through four stages:
//!
//! 1. Wait for the agent to register the workload that owns its pod, and for
//!    that workload's deployment to be known.
//! 2. Holding the deployment's file lock, validate the pod's proxy image, then
//!    apply the current configuration and any pending API actions.
//! 3. Relay broadcasts from the deployment to the agent, one at a time, and
//!    record the agent's responses as pod status.
//! 4. On exit, forget the connection and its pod status.

use crate::{
    cancel::Cancel,
    file::to_file_meta,
    identity::ConnectionIdentity,
    messenger::{Event, Messenger, Outbound, StreamError},
    metrics::{GrpcServerMetricsFamily, GrpcServerRPCMetrics, ResponseObserver},
    proto::{self, command_response::CommandStatus, instance_meta::InstanceType},
};
use anyhow::{anyhow, bail};
use fleet_controller_core::{
    status::{Queue, Update},
    ApiAction, ApplyError, Connection, ConnectionTracker, Deployment, DeploymentStore,
    FileOverview, Message, Subscription, UpstreamServer,
};
use fleet_controller_k8s_api::{
    ImageReader, NamespacedName, WorkloadKind, AGENT_OWNER_NAME_LABEL, AGENT_OWNER_TYPE_LABEL,
};
use futures::prelude::*;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::{sync::watch, time};
use tonic::{Request, Response, Status};

const SERVICE: &str = "mpi.v1.CommandService";

const AGENT_TIMEOUT: &str = "timed out waiting for agent to register proxy";
const STORE_TIMEOUT: &str = "timed out waiting for proxy deployment to be added to store";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandConfig {
    /// Bounds the wait for an agent's connection to become ready.
    pub connection_timeout: Duration,
    pub connection_poll_interval: Duration,

    pub image_validation_timeout: Duration,

    /// Bounds the retries of each API action during the initial
    /// configuration, since the proxy may still be reloading.
    pub api_action_timeout: Duration,
    pub api_action_interval: Duration,
}

#[derive(Clone)]
pub struct CommandService {
    tracker: ConnectionTracker,
    deployments: DeploymentStore,
    status: Queue,
    images: Arc<dyn ImageReader + Send + Sync>,
    reset: ResetSignal,
    config: CommandConfig,
    metrics: Metrics,
}

/// Closes every active subscription, forcing agents to reconnect.
#[derive(Clone, Debug)]
pub struct ResetHandle(Arc<watch::Sender<()>>);

#[derive(Clone, Debug)]
pub struct ResetSignal(watch::Receiver<()>);

#[derive(Clone, Debug)]
struct Metrics {
    create_connection: GrpcServerRPCMetrics,
    update_status: GrpcServerRPCMetrics,
    update_health: GrpcServerRPCMetrics,
    subscribe: GrpcServerRPCMetrics,
}

/// The state of one subscription once its connection is ready.
struct Session<'a> {
    uuid: &'a str,
    conn: Connection,
    deployment: Arc<Deployment>,
    messenger: Messenger,
    rsp: &'a ResponseObserver,
}

/// Forgets a subscription's connection when the subscription ends.
struct Cleanup<'a> {
    tracker: &'a ConnectionTracker,
    uuid: &'a str,
    deployment: Option<Arc<Deployment>>,
}

// === impl CommandConfig ===

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            connection_poll_interval: Duration::from_secs(1),
            image_validation_timeout: Duration::from_secs(30),
            api_action_timeout: Duration::from_secs(5),
            api_action_interval: Duration::from_millis(500),
        }
    }
}

// === impl CommandService ===

impl CommandService {
    pub fn new(
        tracker: ConnectionTracker,
        deployments: DeploymentStore,
        status: Queue,
        images: Arc<dyn ImageReader + Send + Sync>,
        reset: ResetSignal,
        config: CommandConfig,
        metrics: &GrpcServerMetricsFamily,
    ) -> Self {
        // Intervals panic on a zero period.
        let min = Duration::from_millis(1);
        let config = CommandConfig {
            connection_poll_interval: config.connection_poll_interval.max(min),
            api_action_interval: config.api_action_interval.max(min),
            ..config
        };
        Self {
            tracker,
            deployments,
            status,
            images,
            reset,
            config,
            metrics: Metrics {
                create_connection: metrics.unary_rpc(SERVICE, "CreateConnection"),
                update_status: metrics.unary_rpc(SERVICE, "UpdateDataPlaneStatus"),
                update_health: metrics.unary_rpc(SERVICE, "UpdateDataPlaneHealth"),
                subscribe: metrics.subscription_rpc(SERVICE, "Subscribe"),
            },
        }
    }

    /// Records the workload that owns the agent's pod.
    pub async fn create_connection(
        &self,
        req: Request<proto::CreateConnectionRequest>,
    ) -> Result<Response<proto::CreateConnectionResponse>, Status> {
        let rsp = self.metrics.create_connection.start_unary();
        let res = self.track_connection(req);
        rsp.end(&res);
        res
    }

    fn track_connection(
        &self,
        req: Request<proto::CreateConnectionRequest>,
    ) -> Result<Response<proto::CreateConnectionResponse>, Status> {
        let id = ConnectionIdentity::from_request(&req)?;
        let proto::CreateConnectionRequest {
            message_meta,
            resource,
        } = req.into_inner();
        let resource = resource.unwrap_or_default();
        let correlation_id = message_meta.map(|m| m.correlation_id).unwrap_or_default();
        let pod = resource
            .container_info
            .as_ref()
            .map(|c| c.hostname.as_str())
            .unwrap_or_default();
        tracing::info!(%pod, %correlation_id, "Creating connection");

        let Some((parent_name, parent_kind)) = owner(&resource.instances) else {
            tracing::error!(%pod, %correlation_id, error = "agent labels missing", "Error getting pod owner");
            return Err(Status::invalid_argument(
                "error getting pod owner: agent labels missing",
            ));
        };

        self.tracker.track(
            &id.uuid,
            Connection {
                parent_name,
                parent_kind: Some(parent_kind),
                instance_id: proxy_instance_id(&resource.instances).unwrap_or_default(),
            },
        );

        Ok(Response::new(proto::CreateConnectionResponse {
            response: Some(proto::CommandResponse {
                status: CommandStatus::Ok as i32,
                ..Default::default()
            }),
        }))
    }

    /// Records the agent's proxy instance once the agent discovers it.
    pub async fn update_data_plane_status(
        &self,
        req: Request<proto::UpdateDataPlaneStatusRequest>,
    ) -> Result<Response<proto::UpdateDataPlaneStatusResponse>, Status> {
        let rsp = self.metrics.update_status.start_unary();
        let res = self.set_instance_id(req);
        rsp.end(&res);
        res
    }

    fn set_instance_id(
        &self,
        req: Request<proto::UpdateDataPlaneStatusRequest>,
    ) -> Result<Response<proto::UpdateDataPlaneStatusResponse>, Status> {
        let id = ConnectionIdentity::from_request(&req)?;
        let instance_id = req
            .get_ref()
            .resource
            .as_ref()
            .and_then(|r| proxy_instance_id(&r.instances))
            .ok_or_else(|| Status::invalid_argument("request does not contain proxy instance id"))?;
        self.tracker.set_instance_id(&id.uuid, instance_id);
        Ok(Response::new(proto::UpdateDataPlaneStatusResponse {}))
    }

    pub async fn update_data_plane_health(
        &self,
        _req: Request<proto::UpdateDataPlaneHealthRequest>,
    ) -> Result<Response<proto::UpdateDataPlaneHealthResponse>, Status> {
        let _rsp = self.metrics.update_health.start_unary();
        Ok(Response::new(proto::UpdateDataPlaneHealthResponse {}))
    }

    /// Serves an agent's subscription until the agent disconnects, the call is
    /// cancelled, or connections are reset.
    ///
    /// Requests to the agent are written to `outbound`. An error is always
    /// returned; agents are expected to subscribe again.
    pub async fn subscribe<S>(
        &self,
        req: Request<S>,
        outbound: Outbound,
        cancel: Cancel,
    ) -> Result<(), Status>
    where
        S: Stream<Item = Result<proto::DataPlaneResponse, Status>> + Send + Unpin + 'static,
    {
        let rsp = self.metrics.subscribe.start();
        let res = self.serve_subscription(req, outbound, &cancel, &rsp).await;
        if let Err(status) = &res {
            tracing::debug!(code = ?status.code(), message = %status.message(), "Subscription ended");
        }
        rsp.end(&res);
        res
    }

    async fn serve_subscription<S>(
        &self,
        req: Request<S>,
        outbound: Outbound,
        cancel: &Cancel,
        rsp: &ResponseObserver,
    ) -> Result<(), Status>
    where
        S: Stream<Item = Result<proto::DataPlaneResponse, Status>> + Send + Unpin + 'static,
    {
        let id = ConnectionIdentity::from_request(&req)?;
        let mut reset = self.reset.fresh();
        let mut cleanup = Cleanup {
            tracker: &self.tracker,
            uuid: &id.uuid,
            deployment: None,
        };

        let (conn, deployment) = self
            .wait_for_connection(&id.uuid, cancel)
            .await
            .map_err(|status| {
                tracing::error!(uuid = %id.uuid, error = %status.message(), "Error waiting for connection");
                status
            })?;
        cleanup.deployment = Some(deployment.clone());
        tracing::info!(
            uuid = %id.uuid,
            parent = %conn.parent_name,
            kind = ?conn.parent_kind,
            "Connected to agent",
        );

        let mut session = Session {
            uuid: &id.uuid,
            conn,
            deployment,
            messenger: Messenger::spawn(req.into_inner(), outbound),
            rsp,
        };
        let subscription = self.set_initial_config(&mut session, cancel).await?;
        self.relay_broadcasts(session, subscription, &mut reset, cancel)
            .await
    }

    async fn wait_for_connection(
        &self,
        uuid: &str,
        cancel: &Cancel,
    ) -> Result<(Connection, Arc<Deployment>), Status> {
        let period = self.config.connection_poll_interval;
        let mut ticks = time::interval_at(time::Instant::now() + period, period);
        ticks.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let timeout = time::sleep(self.config.connection_timeout);
        tokio::pin!(timeout);

        let mut error = AGENT_TIMEOUT;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancel.status()),
                _ = &mut timeout => return Err(Status::deadline_exceeded(error)),
                _ = ticks.tick() => {
                    let conn = self.tracker.get(uuid);
                    if !conn.is_ready() {
                        error = AGENT_TIMEOUT;
                        continue;
                    }
                    // The agent is registered; wait for its deployment.
                    if let Some(deployment) = self.deployments.get(&conn.parent_name) {
                        return Ok((conn, deployment));
                    }
                    error = STORE_TIMEOUT;
                }
            }
        }
    }

    /// Applies the deployment's current configuration to a new agent.
    ///
    /// Failures to apply configuration are recorded as the pod's status;
    /// only failures of the connection itself are returned. The returned
    /// subscription is taken before the file lock is released, so no
    /// broadcast published after the handshake is missed.
    async fn set_initial_config(
        &self,
        session: &mut Session<'_>,
        cancel: &Cancel,
    ) -> Result<Subscription, Status> {
        let deployment = session.deployment.clone();
        let files = tokio::select! {
            files = deployment.lock_files() => files,
            _ = cancel.cancelled() => return Err(cancel.status()),
        };

        let validated = tokio::select! {
            res = self.validate_image(&session.conn, files.image_version()) => res,
            _ = cancel.cancelled() => return Err(cancel.status()),
        };
        if let Err(error) = validated {
            let error = format!("{error:#}");
            session.report(&self.status, Some(ApplyError::Validation(error.clone())));
            return Err(Status::failed_precondition(format!(
                "proxy image version validation failed: {error}"
            )));
        }

        let (overviews, version) = files.overviews();
        tracing::info!(
            uuid = session.uuid,
            parent = %session.conn.parent_name,
            config_version = %version,
            "Sending initial configuration to agent",
        );
        let req = config_apply_request(overviews, &session.conn.instance_id, version);
        session.send_or_report(req, &self.status, cancel).await?;

        let mut errors = vec![session.wait_for_apply(cancel).await?];
        for action in files.api_actions() {
            errors.push(self.apply_action(session, action, cancel).await?);
        }
        let subscription = deployment.broadcaster().subscribe();
        session.report(&self.status, ApplyError::join(errors));
        Ok(subscription)
    }

    async fn validate_image(&self, conn: &Connection, expected: &str) -> anyhow::Result<()> {
        let Some(kind) = conn.parent_kind else {
            bail!("unknown workload kind for {}", conn.parent_name);
        };
        let image = time::timeout(
            self.config.image_validation_timeout,
            self.images.proxy_image(&conn.parent_name, kind),
        )
        .await
        .map_err(|_| anyhow!("timed out reading {kind} {}", conn.parent_name))??;

        if image != expected {
            bail!("proxy image version mismatch: has {image:?} but expected {expected:?}");
        }
        tracing::debug!(parent = %conn.parent_name, %image, "Proxy image version validated");
        Ok(())
    }

    /// Retries an API action until the agent applies it or the action's
    /// deadline passes.
    ///
    /// Returns the accumulated failures if the action never applied.
    async fn apply_action(
        &self,
        session: &mut Session<'_>,
        action: &ApiAction,
        cancel: &Cancel,
    ) -> Result<Option<ApplyError>, Status> {
        let deadline = time::sleep(self.config.api_action_timeout);
        tokio::pin!(deadline);
        let mut ticks = time::interval(self.config.api_action_interval);
        ticks.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        let mut failures = None;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancel.status()),
                _ = &mut deadline => break,
                _ = ticks.tick() => {}
            }

            let req = api_action_request(action, &session.conn.instance_id);
            session.send_or_report(req, &self.status, cancel).await?;

            let applied = tokio::select! {
                res = session.wait_for_apply(cancel) => res?,
                _ = &mut deadline => break,
            };
            match applied {
                None => return Ok(None),
                Some(error) => {
                    tracing::debug!(uuid = session.uuid, %error, "API action failed; retrying");
                    failures = ApplyError::join([failures, Some(error)]);
                }
            }
        }

        match failures {
            Some(error) => {
                tracing::warn!(uuid = session.uuid, %error, "Failed to apply API action");
                Ok(Some(error))
            }
            None => Err(Status::deadline_exceeded(
                "timed out waiting for agent to apply API action",
            )),
        }
    }

    /// Sends each broadcast to the agent and acknowledges it once the agent
    /// responds.
    ///
    /// A broadcast is only read once the previous one has been acknowledged.
    async fn relay_broadcasts(
        &self,
        mut session: Session<'_>,
        mut subscription: Subscription,
        reset: &mut ResetSignal,
        cancel: &Cancel,
    ) -> Result<(), Status> {
        let deployment = session.deployment.clone();
        let mut pending: Option<Message> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if pending.take().is_some() {
                        subscription.respond();
                    }
                    return Err(cancel.status());
                }

                _ = reset.reset() => return Err(Status::unavailable("TLS files updated")),

                msg = subscription.recv(), if pending.is_none() => {
                    let Some(msg) = msg else {
                        return Err(Status::unavailable("subscription closed"));
                    };
                    let instance_id = &session.conn.instance_id;
                    let req = match &msg {
                        Message::ConfigApply { overviews, version } => {
                            config_apply_request(overviews, instance_id, version)
                        }
                        Message::ApiAction(action) => api_action_request(action, instance_id),
                    };

                    tracing::debug!(uuid = session.uuid, "Sending configuration to agent");
                    let sent = tokio::select! {
                        res = session.send(req, cancel) => res,
                        _ = reset.reset() => {
                            subscription.respond();
                            return Err(Status::unavailable("TLS files updated"));
                        }
                    };
                    match sent {
                        Ok(()) => {}
                        Err(StreamError::Cancelled(_)) => {
                            subscription.respond();
                            return Err(cancel.status());
                        }
                        Err(error) => {
                            tracing::error!(uuid = session.uuid, %error, "Error sending request to agent");
                            deployment.set_pod_status(session.uuid, Some(ApplyError::Connection(error.to_string())));
                            subscription.respond();
                            return Err(Status::internal(error.to_string()));
                        }
                    }
                    pending = Some(msg);
                }

                event = session.recv() => match event {
                    Event::Error(error) => {
                        tracing::error!(
                            uuid = session.uuid,
                            parent = %session.conn.parent_name,
                            %error,
                            "Connection error",
                        );
                        deployment.set_pod_status(session.uuid, Some(ApplyError::Connection(error.to_string())));
                        if pending.take().is_some() {
                            tracing::debug!(uuid = session.uuid, "Connection failed with a pending request");
                            subscription.respond();
                        }
                        return Err(stream_status(&error));
                    }

                    Event::Message(msg) => {
                        let res = msg.command_response.unwrap_or_default();
                        if res.status() != CommandStatus::Ok {
                            if is_rollback_message(&res.message) {
                                continue;
                            }
                            deployment.set_pod_status(
                                session.uuid,
                                Some(ApplyError::Agent {
                                    message: res.message,
                                    error: res.error,
                                }),
                            );
                        } else {
                            deployment.set_pod_status(session.uuid, None);
                        }

                        // Only broadcasts are acknowledged. Other responses
                        // answer requests from the initial configuration.
                        if pending.take().is_some() {
                            subscription.respond();
                        } else {
                            tracing::debug!(uuid = session.uuid, "Received response for non-broadcast request");
                        }
                    }
                },
            }
        }
    }
}

// === impl ResetHandle ===

impl ResetHandle {
    pub fn new() -> (Self, ResetSignal) {
        let (tx, rx) = watch::channel(());
        (Self(Arc::new(tx)), ResetSignal(rx))
    }

    pub fn reset(&self) {
        tracing::info!("Resetting agent connections");
        self.0.send_replace(());
    }
}

// === impl ResetSignal ===

impl ResetSignal {
    /// Returns a signal that only observes resets issued after this call.
    fn fresh(&self) -> Self {
        let mut rx = self.0.clone();
        rx.borrow_and_update();
        Self(rx)
    }

    async fn reset(&mut self) {
        if self.0.changed().await.is_err() {
            // Without a handle, connections are never reset.
            future::pending::<()>().await;
        }
    }
}

// === impl Session ===

impl Session<'_> {
    async fn send(
        &self,
        req: proto::ManagementPlaneRequest,
        cancel: &Cancel,
    ) -> Result<(), StreamError> {
        self.messenger.send(req, cancel).await?;
        self.rsp.msg_sent();
        Ok(())
    }

    /// Sends a handshake request. A failed send is recorded as the pod's
    /// status unless the subscription was cancelled.
    async fn send_or_report(
        &self,
        req: proto::ManagementPlaneRequest,
        queue: &Queue,
        cancel: &Cancel,
    ) -> Result<(), Status> {
        match self.send(req, cancel).await {
            Ok(()) => Ok(()),
            Err(StreamError::Cancelled(_)) => Err(cancel.status()),
            Err(error) => {
                self.report(queue, Some(ApplyError::Connection(error.to_string())));
                Err(Status::internal(error.to_string()))
            }
        }
    }

    async fn recv(&mut self) -> Event {
        let event = self.messenger.recv().await;
        if let Event::Message(_) = event {
            self.rsp.msg_received();
        }
        event
    }

    /// Waits for the agent to respond to a request from the initial
    /// configuration, returning the agent's failure, if any.
    async fn wait_for_apply(&mut self, cancel: &Cancel) -> Result<Option<ApplyError>, Status> {
        tokio::select! {
            _ = cancel.cancelled() => Err(cancel.status()),
            event = self.recv() => match event {
                Event::Error(error) => Err(stream_status(&error)),
                Event::Message(msg) => {
                    let res = msg.command_response.unwrap_or_default();
                    if res.status() == CommandStatus::Ok {
                        return Ok(None);
                    }
                    let error = ApplyError::Agent {
                        message: res.message,
                        error: res.error,
                    };
                    tracing::debug!(uuid = self.uuid, %error, "Agent failed to apply request");
                    Ok(Some(error))
                }
            },
        }
    }

    /// Records the pod's status and publishes the deployment's aggregated
    /// status.
    fn report(&self, queue: &Queue, error: Option<ApplyError>) {
        match &error {
            Some(error) => {
                tracing::error!(uuid = self.uuid, %error, "Error sending request to agent")
            }
            None => tracing::info!(
                uuid = self.uuid,
                parent = %self.conn.parent_name,
                "Configured proxy for new subscription",
            ),
        }
        self.deployment.set_pod_status(self.uuid, error);
        queue.enqueue(Update {
            deployment: self.conn.parent_name.clone(),
            gateway: self.deployment.gateway_name().to_string(),
            error: self.deployment.configuration_status(),
        });
    }
}

// === impl Cleanup ===

impl Drop for Cleanup<'_> {
    fn drop(&mut self) {
        if let Some(deployment) = self.deployment.take() {
            deployment.remove_pod_status(self.uuid);
        }
        self.tracker.remove(self.uuid);
    }
}

/// Reads the owning workload from the agent instance's labels.
fn owner(instances: &[proto::Instance]) -> Option<(NamespacedName, WorkloadKind)> {
    let mut name = None;
    let mut kind = None;
    for instance in instances.iter().filter(|i| instance_type(i) == InstanceType::Agent) {
        let labels = instance
            .instance_config
            .iter()
            .flat_map(|c| c.agent_config.iter())
            .flat_map(|c| c.labels.iter());
        for label in labels {
            if let Some(value) = string_field(label, AGENT_OWNER_NAME_LABEL) {
                name = NamespacedName::from_owner_label(value);
            }
            if let Some(value) = string_field(label, AGENT_OWNER_TYPE_LABEL) {
                kind = value.parse::<WorkloadKind>().ok();
            }
        }
    }
    Some((name?, kind?))
}

/// The id of the first proxy instance the agent manages.
fn proxy_instance_id(instances: &[proto::Instance]) -> Option<String> {
    instances
        .iter()
        .find(|i| matches!(instance_type(i), InstanceType::Nginx | InstanceType::NginxPlus))
        .and_then(|i| i.instance_meta.as_ref())
        .map(|m| m.instance_id.clone())
        .filter(|id| !id.is_empty())
}

fn instance_type(instance: &proto::Instance) -> InstanceType {
    instance
        .instance_meta
        .as_ref()
        .map(|m| m.instance_type())
        .unwrap_or(InstanceType::Unspecified)
}

fn string_field<'l>(label: &'l prost_types::Struct, key: &str) -> Option<&'l str> {
    match label.fields.get(key)?.kind.as_ref()? {
        prost_types::value::Kind::StringValue(s) => Some(s),
        _ => None,
    }
}

fn is_rollback_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("rollback successful") || msg.contains("rollback failed")
}

fn stream_status(error: &StreamError) -> Status {
    match error {
        StreamError::Closed => Status::aborted(error.to_string()),
        _ => Status::internal(error.to_string()),
    }
}

fn message_meta() -> proto::MessageMeta {
    proto::MessageMeta {
        message_id: uuid::Uuid::new_v4().to_string(),
        correlation_id: uuid::Uuid::new_v4().to_string(),
        timestamp: Some(std::time::SystemTime::now().into()),
    }
}

fn config_apply_request(
    overviews: &[FileOverview],
    instance_id: &str,
    version: &str,
) -> proto::ManagementPlaneRequest {
    let files = overviews
        .iter()
        .map(|o| proto::File {
            file_meta: Some(to_file_meta(&o.meta)),
            unmanaged: o.unmanaged,
        })
        .collect();
    proto::ManagementPlaneRequest {
        message_meta: Some(message_meta()),
        request: Some(proto::management_plane_request::Request::ConfigApplyRequest(
            proto::ConfigApplyRequest {
                overview: Some(proto::FileOverview {
                    files,
                    config_version: Some(proto::ConfigVersion {
                        instance_id: instance_id.to_string(),
                        version: version.to_string(),
                    }),
                }),
            },
        )),
    }
}

fn api_action_request(action: &ApiAction, instance_id: &str) -> proto::ManagementPlaneRequest {
    use proto::plus_action::Action;

    let action = match action {
        ApiAction::UpdateHttpUpstreamServers { upstream, servers } => {
            Action::UpdateHttpUpstreamServers(to_upstream(upstream, servers))
        }
        ApiAction::UpdateStreamServers { upstream, servers } => {
            Action::UpdateStreamServers(to_upstream(upstream, servers))
        }
    };
    proto::ManagementPlaneRequest {
        message_meta: Some(message_meta()),
        request: Some(proto::management_plane_request::Request::ActionRequest(
            proto::ApiActionRequest {
                instance_id: instance_id.to_string(),
                action: Some(proto::PlusAction {
                    action: Some(action),
                }),
            },
        )),
    }
}

fn to_upstream(upstream: &str, servers: &[UpstreamServer]) -> proto::UpdateUpstreamServers {
    let servers = servers
        .iter()
        .map(|s| prost_types::Struct {
            fields: BTreeMap::from([(
                "server".to_string(),
                prost_types::Value {
                    kind: Some(prost_types::value::Kind::StringValue(s.address.clone())),
                },
            )]),
        })
        .collect();
    proto::UpdateUpstreamServers {
        upstream: upstream.to_string(),
        servers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn mk_label(key: &str, value: &str) -> prost_types::Struct {
        prost_types::Struct {
            fields: btreemap! {
                key.to_string() => prost_types::Value {
                    kind: Some(prost_types::value::Kind::StringValue(value.to_string())),
                },
            },
        }
    }

    fn mk_instance(ty: InstanceType, id: &str, labels: Vec<prost_types::Struct>) -> proto::Instance {
        proto::Instance {
            instance_meta: Some(proto::InstanceMeta {
                instance_id: id.to_string(),
                instance_type: ty as i32,
                ..Default::default()
            }),
            instance_config: Some(proto::InstanceConfig {
                agent_config: Some(proto::AgentConfig { labels }),
            }),
        }
    }

    #[test]
    fn parses_owner_labels() {
        let instances = vec![
            mk_instance(InstanceType::Nginx, "nginx-0", vec![]),
            mk_instance(
                InstanceType::Agent,
                "agent-0",
                vec![
                    mk_label(AGENT_OWNER_NAME_LABEL, "ns-0_gateway_nginx"),
                    mk_label(AGENT_OWNER_TYPE_LABEL, "DaemonSet"),
                ],
            ),
        ];
        assert_eq!(
            owner(&instances),
            Some((
                NamespacedName::new("ns-0", "gateway_nginx"),
                WorkloadKind::DaemonSet
            ))
        );
        assert_eq!(proxy_instance_id(&instances), Some("nginx-0".to_string()));
    }

    #[test]
    fn ignores_labels_of_other_instances() {
        let instances = vec![mk_instance(
            InstanceType::NginxPlus,
            "nginx-0",
            vec![
                mk_label(AGENT_OWNER_NAME_LABEL, "ns-0_gateway-nginx"),
                mk_label(AGENT_OWNER_TYPE_LABEL, "Deployment"),
            ],
        )];
        assert_eq!(owner(&instances), None);
        assert_eq!(proxy_instance_id(&instances), Some("nginx-0".to_string()));

        let instances = vec![mk_instance(
            InstanceType::Agent,
            "agent-0",
            vec![mk_label(AGENT_OWNER_NAME_LABEL, "gateway-nginx")],
        )];
        assert_eq!(owner(&instances), None);
        assert_eq!(proxy_instance_id(&instances), None);
    }

    #[test]
    fn rollback_messages() {
        assert!(is_rollback_message("Config apply failed, rollback successful"));
        assert!(is_rollback_message("Config apply failed, Rollback Failed"));
        assert!(!is_rollback_message("Config apply failed"));
    }

    #[test]
    fn action_requests_carry_servers() {
        let req = api_action_request(
            &ApiAction::UpdateStreamServers {
                upstream: "default_svc_53".to_string(),
                servers: vec![UpstreamServer {
                    address: "10.0.0.1:53".to_string(),
                }],
            },
            "nginx-0",
        );
        let meta = req.message_meta.unwrap();
        assert_ne!(meta.message_id, meta.correlation_id);
        assert!(meta.timestamp.is_some());

        let Some(proto::management_plane_request::Request::ActionRequest(action)) = req.request
        else {
            panic!("expected an action request");
        };
        assert_eq!(action.instance_id, "nginx-0");
        let Some(proto::plus_action::Action::UpdateStreamServers(update)) =
            action.action.and_then(|a| a.action)
        else {
            panic!("expected a stream servers update");
        };
        assert_eq!(update.upstream, "default_svc_53");
        assert_eq!(update.servers, vec![mk_label("server", "10.0.0.1:53")]);
    }

    #[tokio::test]
    async fn reset_only_observes_later_resets() {
        let (handle, signal) = ResetHandle::new();
        handle.reset();

        let mut fresh = signal.fresh();
        let waiter = tokio::spawn(async move { fresh.reset().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        handle.reset();
        time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("reset must be observed")
            .unwrap();
    }
}
