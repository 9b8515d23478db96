use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const ACCEPTED_TOTAL: &str = "nps_responses_accepted_total";
pub const REJECTED_TOTAL: &str = "nps_responses_rejected_total";
pub const STORE_FAILURES_TOTAL: &str = "nps_store_failures_total";
pub const LISTED_TOTAL: &str = "nps_responses_listed_total";
pub const INGEST_DURATION_MS: &str = "nps_ingest_duration_ms";

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. The global recorder can only be set
    /// once per process, so later calls share the first handle.
    pub fn init() -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new().install_recorder()?;
                describe();
                Ok::<_, anyhow::Error>(handle)
            })?
            .clone();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(ACCEPTED_TOTAL, "NPS responses accepted and stored.");
    describe_counter!(
        REJECTED_TOTAL,
        "NPS requests rejected, labelled by reason."
    );
    describe_counter!(STORE_FAILURES_TOTAL, "Response store errors.");
    describe_counter!(LISTED_TOTAL, "Responses returned by the read path.");
    describe_histogram!(
        INGEST_DURATION_MS,
        "POST /api/nps-responses handling time in milliseconds."
    );
}
