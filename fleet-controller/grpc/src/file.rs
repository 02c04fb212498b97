use crate::{
    identity::ConnectionIdentity,
    metrics::{GrpcServerMetricsFamily, GrpcServerRPCMetrics, ResponseObserver},
    proto,
};
use bytes::Bytes;
use fleet_controller_core::{ConnectionTracker, Deployment, DeploymentStore, FileLookup, FileMeta};
use futures::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::{Request, Response, Status};

const SERVICE: &str = "mpi.v1.FileService";

pub const DEFAULT_CHUNK_SIZE: u32 = 2 * 1024 * 1024;

/// Serves configuration files to agents.
///
/// Agents may report the files their proxy references, but they never change
/// configuration: file updates from agents are accepted and ignored.
#[derive(Clone, Debug)]
pub struct FileService {
    tracker: ConnectionTracker,
    deployments: DeploymentStore,
    chunk_size: u32,
    metrics: Metrics,
}

#[derive(Clone, Debug)]
struct Metrics {
    get_file: GrpcServerRPCMetrics,
    get_file_stream: GrpcServerRPCMetrics,
    get_overview: GrpcServerRPCMetrics,
    update_overview: GrpcServerRPCMetrics,
    update_file: GrpcServerRPCMetrics,
}

// === impl FileService ===

impl FileService {
    pub fn new(
        tracker: ConnectionTracker,
        deployments: DeploymentStore,
        chunk_size: u32,
        metrics: &GrpcServerMetricsFamily,
    ) -> Self {
        Self {
            tracker,
            deployments,
            chunk_size: chunk_size.max(1),
            metrics: Metrics {
                get_file: metrics.unary_rpc(SERVICE, "GetFile"),
                get_file_stream: metrics.server_stream_rpc(SERVICE, "GetFileStream"),
                get_overview: metrics.unary_rpc(SERVICE, "GetOverview"),
                update_overview: metrics.unary_rpc(SERVICE, "UpdateOverview"),
                update_file: metrics.unary_rpc(SERVICE, "UpdateFile"),
            },
        }
    }

    pub async fn get_file(
        &self,
        req: Request<proto::GetFileRequest>,
    ) -> Result<Response<proto::GetFileResponse>, Status> {
        let rsp = self.metrics.get_file.start_unary();
        let res = self.read_file(req);
        rsp.end(&res);
        res
    }

    fn read_file(
        &self,
        req: Request<proto::GetFileRequest>,
    ) -> Result<Response<proto::GetFileResponse>, Status> {
        let id = ConnectionIdentity::from_request(&req)?;
        let meta = req
            .get_ref()
            .file_meta
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("invalid request"))?;
        let contents = self.contents(&id, meta)?;
        Ok(Response::new(proto::GetFileResponse {
            contents: Some(proto::FileContents {
                contents: contents.to_vec(),
            }),
        }))
    }

    /// Writes a file to `out` as a header followed by fixed-size chunks.
    pub async fn get_file_stream(
        &self,
        req: Request<proto::GetFileRequest>,
        out: mpsc::Sender<Result<proto::FileDataChunk, Status>>,
    ) -> Result<(), Status> {
        let rsp = self.metrics.get_file_stream.start_unary();
        let res = self.send_chunks(req, &out, &rsp).await;
        rsp.end(&res);
        res
    }

    async fn send_chunks(
        &self,
        req: Request<proto::GetFileRequest>,
        out: &mpsc::Sender<Result<proto::FileDataChunk, Status>>,
        rsp: &ResponseObserver,
    ) -> Result<(), Status> {
        let id = ConnectionIdentity::from_request(&req)?;
        let proto::GetFileRequest {
            message_meta,
            file_meta,
        } = req.into_inner();
        let (Some(message_meta), Some(meta)) = (message_meta, file_meta) else {
            return Err(Status::invalid_argument("invalid request"));
        };
        let contents = self.contents(&id, &meta)?;

        let size = u32::try_from(meta.size).map_err(|_| {
            Status::internal("file size is too large and cannot be converted to uint32")
        })?;
        tracing::debug!(file = %meta.name, size, "Sending chunked file to agent");

        let header = proto::FileDataChunkHeader {
            chunks: chunks(size, self.chunk_size),
            chunk_size: self.chunk_size,
            file_meta: Some(meta),
        };
        let chunks = contents
            .chunks(self.chunk_size as usize)
            .enumerate()
            .map(|(i, data)| {
                proto::file_data_chunk::Chunk::Content(proto::FileDataChunkContent {
                    chunk_id: i as u32,
                    data: data.to_vec(),
                })
            });
        for chunk in std::iter::once(proto::file_data_chunk::Chunk::Header(header)).chain(chunks) {
            let chunk = proto::FileDataChunk {
                meta: Some(message_meta.clone()),
                chunk: Some(chunk),
            };
            out.send(Ok(chunk))
                .await
                .map_err(|_| Status::aborted("failed to send file chunk: stream closed"))?;
            rsp.msg_sent();
        }
        Ok(())
    }

    pub async fn get_overview(
        &self,
        _req: Request<proto::GetOverviewRequest>,
    ) -> Result<Response<proto::GetOverviewResponse>, Status> {
        let _rsp = self.metrics.get_overview.start_unary();
        Ok(Response::new(proto::GetOverviewResponse::default()))
    }

    /// Records the files the agent's proxy currently references.
    pub async fn update_overview(
        &self,
        req: Request<proto::UpdateOverviewRequest>,
    ) -> Result<Response<proto::UpdateOverviewResponse>, Status> {
        let rsp = self.metrics.update_overview.start_unary();
        let res = self.set_latest_file_names(req).await;
        rsp.end(&res);
        res
    }

    async fn set_latest_file_names(
        &self,
        req: Request<proto::UpdateOverviewRequest>,
    ) -> Result<Response<proto::UpdateOverviewResponse>, Status> {
        let id = ConnectionIdentity::from_request(&req)?;
        let deployment = self.deployment(&id)?;
        let names = req
            .into_inner()
            .overview
            .map(|o| o.files)
            .unwrap_or_default()
            .into_iter()
            .map(|f| f.file_meta.map(|m| m.name).unwrap_or_default())
            .collect::<Vec<_>>();
        tracing::debug!(uuid = %id.uuid, files = names.len(), "Agent reported file overview");

        deployment.lock_files().await.set_latest_file_names(names);
        Ok(Response::new(proto::UpdateOverviewResponse::default()))
    }

    pub async fn update_file(
        &self,
        _req: Request<proto::UpdateFileRequest>,
    ) -> Result<Response<proto::UpdateFileResponse>, Status> {
        let _rsp = self.metrics.update_file.start_unary();
        Ok(Response::new(proto::UpdateFileResponse {}))
    }

    /// Ignores the agent's file without reading it.
    pub async fn update_file_stream<S>(
        &self,
        _req: Request<S>,
    ) -> Result<Response<proto::UpdateFileResponse>, Status>
    where
        S: Stream<Item = Result<proto::FileDataChunk, Status>> + Send + 'static,
    {
        Ok(Response::new(proto::UpdateFileResponse {}))
    }

    fn deployment(&self, id: &ConnectionIdentity) -> Result<Arc<Deployment>, Status> {
        let conn = self.tracker.get(&id.uuid);
        if !conn.is_ready() {
            return Err(Status::not_found("connection not found"));
        }
        self.deployments
            .get(&conn.parent_name)
            .ok_or_else(|| Status::not_found("deployment not found in store"))
    }

    fn contents(&self, id: &ConnectionIdentity, meta: &proto::FileMeta) -> Result<Bytes, Status> {
        let deployment = self.deployment(id)?;
        match deployment.get_file(&meta.name, &meta.hash) {
            FileLookup::Found(contents) if !contents.is_empty() => {
                tracing::debug!(file = %meta.name, hash = %meta.hash, "Getting file for agent");
                Ok(contents)
            }
            FileLookup::WrongHash(found) => {
                tracing::debug!(file = %meta.name, wanted = %meta.hash, %found, "File found had wrong hash");
                Err(Status::not_found("file not found"))
            }
            _ => {
                tracing::debug!(file = %meta.name, "Error getting file for agent");
                Err(Status::not_found("file not found"))
            }
        }
    }
}

pub(crate) fn to_file_meta(meta: &FileMeta) -> proto::FileMeta {
    proto::FileMeta {
        name: meta.name.clone(),
        hash: meta.hash.clone(),
        permissions: meta.permissions.clone(),
        size: meta.size,
    }
}

fn chunks(size: u32, chunk_size: u32) -> u32 {
    size.div_ceil(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count() {
        assert_eq!(chunks(0, DEFAULT_CHUNK_SIZE), 0);
        assert_eq!(chunks(1, DEFAULT_CHUNK_SIZE), 1);
        assert_eq!(chunks(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_SIZE), 1);
        assert_eq!(chunks(DEFAULT_CHUNK_SIZE + 1, DEFAULT_CHUNK_SIZE), 2);
        assert_eq!(chunks(u32::MAX, DEFAULT_CHUNK_SIZE), 2048);
    }
}
