//! Splits an agent's subscription stream into independent send and receive
//! halves.

use crate::{
    cancel::Cancel,
    proto::{DataPlaneResponse, ManagementPlaneRequest},
};
use futures::prelude::*;
use tokio::{sync::mpsc, task::JoinHandle};
use tonic::Status;

/// Requests sent to the agent.
pub type Outbound = mpsc::Sender<Result<ManagementPlaneRequest, Status>>;

/// A terminal failure of an agent's stream.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StreamError {
    /// The agent closed its stream.
    #[error("EOF")]
    Closed,

    #[error("failed to receive: {}", .0.message())]
    Status(Status),

    #[error("failed to send: stream closed")]
    SendClosed,

    /// The subscription was cancelled before a request could be sent.
    #[error("failed to send: {0}")]
    Cancelled(String),
}

#[derive(Debug)]
pub enum Event {
    Message(DataPlaneResponse),
    Error(StreamError),
}

#[derive(Debug)]
pub struct Messenger {
    outbound: Outbound,
    messages: mpsc::Receiver<DataPlaneResponse>,
    errors: mpsc::Receiver<StreamError>,
    task: JoinHandle<()>,
}

// === impl Messenger ===

impl Messenger {
    /// Starts receiving from `inbound` in the background.
    pub fn spawn<S>(inbound: S, outbound: Outbound) -> Self
    where
        S: Stream<Item = Result<DataPlaneResponse, Status>> + Send + Unpin + 'static,
    {
        let (messages_tx, messages) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(1);
        let task = tokio::spawn(Self::run(inbound, messages_tx, errors_tx));
        Self {
            outbound,
            messages,
            errors,
            task,
        }
    }

    /// Forwards messages until the stream fails or ends. Exactly one error is
    /// reported in either case.
    async fn run<S>(
        mut inbound: S,
        messages: mpsc::Sender<DataPlaneResponse>,
        errors: mpsc::Sender<StreamError>,
    ) where
        S: Stream<Item = Result<DataPlaneResponse, Status>> + Unpin,
    {
        loop {
            let error = match inbound.next().await {
                Some(Ok(msg)) => {
                    if messages.send(msg).await.is_err() {
                        return;
                    }
                    continue;
                }
                Some(Err(status)) => StreamError::Status(status),
                None => StreamError::Closed,
            };
            tracing::debug!(%error, "Agent stream ended");
            let _ = errors.send(error).await;
            return;
        }
    }

    /// Sends a request, unless `cancel` fires while the agent is not
    /// accepting requests.
    pub async fn send(&self, req: ManagementPlaneRequest, cancel: &Cancel) -> Result<(), StreamError> {
        tokio::select! {
            res = self.outbound.send(Ok(req)) => res.map_err(|_| StreamError::SendClosed),
            _ = cancel.cancelled() => Err(StreamError::Cancelled(cancel.cause())),
        }
    }

    /// Receives the next message from the agent, or the stream's terminal
    /// error once every message has been received.
    pub async fn recv(&mut self) -> Event {
        tokio::select! {
            biased;
            Some(msg) = self.messages.recv() => Event::Message(msg),
            Some(error) = self.errors.recv() => Event::Error(error),
            else => Event::Error(StreamError::Closed),
        }
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        self.task.abort();
    }
}
