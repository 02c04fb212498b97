#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod images;
pub mod workload;

pub use self::{
    images::{ImageReader, KubeImageReader},
    workload::{NamespacedName, WorkloadKind},
};
pub use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment},
    core::v1::{Container, PodTemplateSpec, VolumeMount},
};
pub use kube::Client;

/// Agent label holding the owning workload as `<namespace>_<name>`.
pub const AGENT_OWNER_NAME_LABEL: &str = "owner-name";

/// Agent label holding the owning workload's kind.
pub const AGENT_OWNER_TYPE_LABEL: &str = "owner-type";
