#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod broadcast;
mod connection;
pub mod deployment;
mod error;
pub mod file;
pub mod status;
mod store;
mod update;

pub use self::{
    broadcast::{Broadcaster, Message, Subscription},
    connection::{Connection, ConnectionTracker},
    deployment::{Deployment, FileLookup, Files},
    error::ApplyError,
    file::{ApiAction, File, FileMeta, FileOverview, UpstreamServer},
    store::DeploymentStore,
    update::{ConfigUpdate, Updater},
};
pub use fleet_controller_k8s_api::{NamespacedName, VolumeMount, WorkloadKind};
