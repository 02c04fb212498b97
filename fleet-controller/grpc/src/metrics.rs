//! Per-RPC server metrics for the agent services.

use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

#[derive(Clone, Debug)]
pub struct GrpcServerMetricsFamily {
    started: Family<CallLabels, Counter>,
    handling: Family<CallLabels, Histogram>,
    handled: Family<OutcomeLabels, Counter>,
    msg_received: Family<CallLabels, Counter>,
    msg_sent: Family<CallLabels, Counter>,
    active_subscriptions: Gauge,
}

/// The metrics of a single RPC method.
#[derive(Clone, Debug)]
pub(crate) struct GrpcServerRPCMetrics {
    labels: CallLabels,
    started: Counter,
    handling: Histogram,
    handled: Family<OutcomeLabels, Counter>,
    msg_received: Counter,
    msg_sent: Counter,
    active: Option<Gauge>,
}

/// Observes one call. A call that is dropped without ending is recorded as
/// `OK`.
pub(crate) struct ResponseObserver {
    rpc: GrpcServerRPCMetrics,
    started_at: Option<time::Instant>,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
enum CallKind {
    Unary,
    ServerStream,
    BidiStream,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CallLabels {
    grpc_service: &'static str,
    grpc_method: &'static str,
    grpc_type: CallKind,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    grpc_code: &'static str,
    #[prometheus(flatten)]
    call: CallLabels,
}

// === impl GrpcServerMetricsFamily ===

impl GrpcServerMetricsFamily {
    pub fn register(reg: &mut Registry) -> Self {
        let started = Family::<CallLabels, Counter>::default();
        reg.register("started", "Total number of RPCs started", started.clone());

        let handled = Family::<OutcomeLabels, Counter>::default();
        reg.register(
            "handled",
            "Total number of RPCs completed, by status code",
            handled.clone(),
        );

        // Subscriptions last as long as the agent stays connected.
        let handling = Family::<CallLabels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.1, 1.0, 30.0, 300.0, 3600.0])
        });
        reg.register_with_unit(
            "handling",
            "Time from the start of an RPC until it completed",
            Unit::Seconds,
            handling.clone(),
        );

        let msg_received = Family::<CallLabels, Counter>::default();
        reg.register(
            "msg_received",
            "Total number of messages received from agents",
            msg_received.clone(),
        );

        let msg_sent = Family::<CallLabels, Counter>::default();
        reg.register(
            "msg_sent",
            "Total number of messages sent to agents",
            msg_sent.clone(),
        );

        let active_subscriptions = Gauge::default();
        reg.register(
            "active_subscriptions",
            "Number of agent subscriptions currently open",
            active_subscriptions.clone(),
        );

        Self {
            started,
            handling,
            handled,
            msg_received,
            msg_sent,
            active_subscriptions,
        }
    }

    pub(crate) fn unary_rpc(&self, svc: &'static str, method: &'static str) -> GrpcServerRPCMetrics {
        self.rpc(svc, method, CallKind::Unary, None)
    }

    pub(crate) fn server_stream_rpc(
        &self,
        svc: &'static str,
        method: &'static str,
    ) -> GrpcServerRPCMetrics {
        self.rpc(svc, method, CallKind::ServerStream, None)
    }

    /// Subscriptions are also counted by the active subscriptions gauge while
    /// they run.
    pub(crate) fn subscription_rpc(
        &self,
        svc: &'static str,
        method: &'static str,
    ) -> GrpcServerRPCMetrics {
        let active = Some(self.active_subscriptions.clone());
        self.rpc(svc, method, CallKind::BidiStream, active)
    }

    fn rpc(
        &self,
        grpc_service: &'static str,
        grpc_method: &'static str,
        grpc_type: CallKind,
        active: Option<Gauge>,
    ) -> GrpcServerRPCMetrics {
        let labels = CallLabels {
            grpc_service,
            grpc_method,
            grpc_type,
        };

        // Export an OK count before the first call completes.
        let _ = self.handled.get_or_create(&OutcomeLabels {
            call: labels.clone(),
            grpc_code: code_str(tonic::Code::Ok),
        });

        GrpcServerRPCMetrics {
            started: self.started.get_or_create(&labels).clone(),
            handling: self.handling.get_or_create(&labels).clone(),
            handled: self.handled.clone(),
            msg_received: self.msg_received.get_or_create(&labels).clone(),
            msg_sent: self.msg_sent.get_or_create(&labels).clone(),
            labels,
            active,
        }
    }
}

// === impl GrpcServerRPCMetrics ===

impl GrpcServerRPCMetrics {
    pub(crate) fn start(&self) -> ResponseObserver {
        self.started.inc();
        if let Some(active) = &self.active {
            active.inc();
        }
        ResponseObserver {
            rpc: self.clone(),
            started_at: Some(time::Instant::now()),
        }
    }

    /// Starts a call whose request is a single message.
    pub(crate) fn start_unary(&self) -> ResponseObserver {
        let rsp = self.start();
        rsp.msg_received();
        rsp
    }
}

// === impl ResponseObserver ===

impl ResponseObserver {
    pub(crate) fn msg_sent(&self) {
        self.rpc.msg_sent.inc();
    }

    pub(crate) fn msg_received(&self) {
        self.rpc.msg_received.inc();
    }

    pub(crate) fn end<T>(mut self, res: &Result<T, tonic::Status>) {
        let code = res.as_ref().map_or_else(|s| s.code(), |_| tonic::Code::Ok);
        self.record(code);
    }

    fn record(&mut self, code: tonic::Code) {
        let Some(started_at) = self.started_at.take() else {
            return;
        };
        self.rpc
            .handling
            .observe(started_at.elapsed().as_secs_f64());
        self.rpc
            .handled
            .get_or_create(&OutcomeLabels {
                call: self.rpc.labels.clone(),
                grpc_code: code_str(code),
            })
            .inc();
        if let Some(active) = &self.rpc.active {
            active.dec();
        }
    }
}

impl Drop for ResponseObserver {
    fn drop(&mut self) {
        self.record(tonic::Code::Ok);
    }
}

fn code_str(code: tonic::Code) -> &'static str {
    use tonic::Code::*;
    match code {
        Ok => "OK",
        Cancelled => "CANCELLED",
        Unknown => "UNKNOWN",
        InvalidArgument => "INVALID_ARGUMENT",
        DeadlineExceeded => "DEADLINE_EXCEEDED",
        NotFound => "NOT_FOUND",
        AlreadyExists => "ALREADY_EXISTS",
        PermissionDenied => "PERMISSION_DENIED",
        ResourceExhausted => "RESOURCE_EXHAUSTED",
        FailedPrecondition => "FAILED_PRECONDITION",
        Aborted => "ABORTED",
        OutOfRange => "OUT_OF_RANGE",
        Unimplemented => "UNIMPLEMENTED",
        Internal => "INTERNAL",
        Unavailable => "UNAVAILABLE",
        DataLoss => "DATA_LOSS",
        Unauthenticated => "UNAUTHENTICATED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn records_codes_and_active_subscriptions() {
        let mut reg = Registry::default();
        let family = GrpcServerMetricsFamily::register(&mut reg);
        let subscribe = family.subscription_rpc("mpi.v1.CommandService", "Subscribe");

        let rsp = subscribe.start();
        rsp.msg_received();
        rsp.msg_sent();
        assert_eq!(family.active_subscriptions.get(), 1);
        rsp.end::<()>(&Err(tonic::Status::aborted("EOF")));
        assert_eq!(family.active_subscriptions.get(), 0);

        let mut out = String::new();
        encode(&mut out, &reg).unwrap();
        assert!(out.contains("grpc_code=\"ABORTED\""), "{out}");
        assert!(out.contains("grpc_type=\"BidiStream\""), "{out}");
    }

    #[test]
    fn dropped_calls_are_ok() {
        let mut reg = Registry::default();
        let family = GrpcServerMetricsFamily::register(&mut reg);
        let get_file = family.unary_rpc("mpi.v1.FileService", "GetFile");

        drop(get_file.start_unary());
        let ok = family.handled.get_or_create(&OutcomeLabels {
            call: get_file.labels.clone(),
            grpc_code: "OK",
        });
        assert_eq!(ok.get(), 1);
    }
}
