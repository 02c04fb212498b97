#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use fleet_controller_core as core;
pub use fleet_controller_grpc as grpc;
pub use fleet_controller_k8s_api as k8s;

mod args;
mod status;

pub use self::{
    args::{Args, Fleet},
    status::{Controller, ControllerMetrics},
};
