//! # Prometheus Metrics
//!
//! Ledger activity counters and transfer latency, kept in a dedicated
//! [`prometheus::Registry`] and served at `/metrics` on the metrics port.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use afritrade_ledger::ErrorKind;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Transfers that moved money.
    pub transfers_committed_total: IntCounter,
    /// Retries answered from an earlier commit.
    pub transfers_replayed_total: IntCounter,
    /// Failed commits, labelled by error kind.
    pub transfers_rejected_total: IntCounterVec,
    /// Phase-1 lookups that found the recipient.
    pub verifications_total: IntCounter,
    pub deposits_total: IntCounter,
    pub registrations_total: IntCounter,
    /// Requests turned away because a wallet lock timed out.
    pub busy_rejections_total: IntCounter,
    /// Wall time of a phase-2 commit, including lock waits.
    pub transfer_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Create and register every metric.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("afritrade".into()), None)?;

        let transfers_committed_total = IntCounter::new(
            "transfers_committed_total",
            "Transfers committed to the ledger",
        )?;
        registry.register(Box::new(transfers_committed_total.clone()))?;

        let transfers_replayed_total = IntCounter::new(
            "transfers_replayed_total",
            "Transfer retries answered from an earlier commit",
        )?;
        registry.register(Box::new(transfers_replayed_total.clone()))?;

        let transfers_rejected_total = IntCounterVec::new(
            Opts::new("transfers_rejected_total", "Transfer commits that failed"),
            &["kind"],
        )?;
        registry.register(Box::new(transfers_rejected_total.clone()))?;

        let verifications_total = IntCounter::new(
            "verifications_total",
            "Successful recipient verifications",
        )?;
        registry.register(Box::new(verifications_total.clone()))?;

        let deposits_total = IntCounter::new("deposits_total", "Deposits credited")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let registrations_total =
            IntCounter::new("registrations_total", "Users registered with a wallet")?;
        registry.register(Box::new(registrations_total.clone()))?;

        let busy_rejections_total = IntCounter::new(
            "busy_rejections_total",
            "Requests rejected because a wallet lock timed out",
        )?;
        registry.register(Box::new(busy_rejections_total.clone()))?;

        let transfer_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "transfer_latency_seconds",
                "Transfer commit latency in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
        )?;
        registry.register(Box::new(transfer_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            transfers_committed_total,
            transfers_replayed_total,
            transfers_rejected_total,
            verifications_total,
            deposits_total,
            registrations_total,
            busy_rejections_total,
            transfer_latency_seconds,
        })
    }

    /// Count a failed commit under its error kind.
    pub fn record_rejection(&self, kind: ErrorKind) {
        self.transfers_rejected_total
            .with_label_values(&[kind.as_str()])
            .inc();
        if kind == ErrorKind::Busy {
            self.busy_rejections_total.inc();
        }
    }

    /// Prometheus text exposition of everything registered.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_labelled_by_kind() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_rejection(ErrorKind::InsufficientFunds);
        metrics.record_rejection(ErrorKind::Busy);
        metrics.record_rejection(ErrorKind::Busy);

        assert_eq!(
            metrics
                .transfers_rejected_total
                .with_label_values(&["busy"])
                .get(),
            2
        );
        assert_eq!(metrics.busy_rejections_total.get(), 2);

        let text = metrics.encode().unwrap();
        assert!(text.contains("afritrade_transfers_rejected_total{kind=\"insufficient_funds\"} 1"));
    }

    #[test]
    fn two_registries_do_not_collide() {
        let a = NodeMetrics::new().unwrap();
        let b = NodeMetrics::new().unwrap();
        a.deposits_total.inc();
        assert_eq!(b.deposits_total.get(), 0);
    }
}
