//! Carries the aggregated configuration status of each deployment to the
//! status writer.

use crate::{ApplyError, NamespacedName};
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub deployment: NamespacedName,
    pub gateway: String,
    pub error: Option<ApplyError>,
}

#[derive(Clone, Debug)]
pub struct Queue(mpsc::UnboundedSender<Update>);

// === impl Queue ===

impl Queue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Update>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn enqueue(&self, update: Update) {
        if self.0.send(update).is_err() {
            tracing::debug!("Status queue closed; dropping update");
        }
    }
}
