use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cancels an agent's call, recording why.
///
/// Clones share the same cancellation state.
#[derive(Clone, Debug, Default)]
pub struct Cancel {
    token: CancellationToken,
    cause: Arc<Mutex<Option<String>>>,
}

// === impl Cancel ===

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the call. Only the first cause is kept.
    pub fn cancel(&self, cause: impl ToString) {
        {
            let mut c = self.cause.lock();
            if c.is_none() {
                *c = Some(cause.to_string());
            }
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the call is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn cause(&self) -> String {
        self.cause
            .lock()
            .clone()
            .unwrap_or_else(|| "context canceled".to_string())
    }

    pub(crate) fn status(&self) -> tonic::Status {
        tonic::Status::cancelled(self.cause())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_first_cause() {
        let cancel = Cancel::new();
        assert!(!cancel.is_cancelled());

        let waiter = tokio::spawn({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        });
        cancel.cancel("server shutting down");
        cancel.cancel("ignored");
        waiter.await.unwrap();

        assert!(cancel.is_cancelled());
        let status = cancel.status();
        assert_eq!(status.code(), tonic::Code::Cancelled);
        assert_eq!(status.message(), "server shutting down");
    }
}
