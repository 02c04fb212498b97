#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cancel;
pub mod command;
pub mod file;
mod identity;
pub mod messenger;
pub mod metrics;
pub mod proto;


pub use self::{
    cancel::Cancel,
    command::{CommandConfig, CommandService, ResetHandle, ResetSignal},
    file::{FileService, DEFAULT_CHUNK_SIZE},
    identity::ConnectionIdentity,
    metrics::GrpcServerMetricsFamily,
};
