//! Prometheus metrics (feature `metrics`) and tracing spans (feature `tracing`).

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{ComplaintMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<ComplaintMetrics> = Lazy::new(ComplaintMetrics::init);

    pub struct ComplaintMetrics {
        registry: Registry,
        _provider: SdkMeterProvider,
        pub complaints_created: Counter<u64>,
        pub allocation_retries: Counter<u64>,
        pub status_updates: Counter<u64>,
        pub query_errors: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub pool_wait_duration: Histogram<f64>,
    }

    impl ComplaintMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("adumuo");

            let complaints_created = meter
                .u64_counter("adumuo_complaints_created_total")
                .with_description("Complaints persisted with a fresh reference code")
                .build();

            let allocation_retries = meter
                .u64_counter("adumuo_allocation_retries_total")
                .with_description("Reference code allocations retried after a collision")
                .build();

            let status_updates = meter
                .u64_counter("adumuo_status_updates_total")
                .with_description("Applied complaint status changes")
                .build();

            let query_errors = meter
                .u64_counter("adumuo_query_errors_total")
                .with_description("Failed database statements")
                .build();

            let query_duration = meter
                .f64_histogram("adumuo_query_duration_seconds")
                .with_description("Duration of database statements")
                .build();

            let pool_wait_duration = meter
                .f64_histogram("adumuo_pool_wait_seconds")
                .with_description("Time spent waiting for an idle pooled connection")
                .build();

            Self {
                registry,
                _provider: provider,
                complaints_created,
                allocation_retries,
                status_updates,
                query_errors,
                query_duration,
                pool_wait_duration,
            }
        }

        pub fn record_complaint_created(&self) {
            self.complaints_created.add(1, &[]);
        }

        pub fn record_allocation_retry(&self) {
            self.allocation_retries.add(1, &[]);
        }

        pub fn record_status_update(&self, status: &'static str) {
            self.status_updates.add(1, &[KeyValue::new("status", status)]);
        }

        pub fn record_query_error(&self) {
            self.query_errors.add(1, &[]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn observe_pool_wait(&self, elapsed: Duration) {
            self.pool_wait_duration.record(elapsed.as_secs_f64(), &[]);
        }

        /// Current metrics in the Prometheus text exposition format.
        pub fn render(&self) -> String {
            TextEncoder::new()
                .encode_to_string(&self.registry.gather())
                .unwrap_or_default()
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    /// Statements are truncated so spans never carry bulk text.
    const MAX_STATEMENT_LEN: usize = 120;

    pub fn execute_query_span(query: &str) -> Span {
        let statement: String = query.trim().chars().take(MAX_STATEMENT_LEN).collect();
        info_span!("db.query", db.system = "postgresql", db.statement = %statement)
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("db.connect", db.system = "postgresql")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("db.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("db.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("db.transaction.rollback")
    }

    pub fn create_complaint_span(category: &str) -> Span {
        info_span!("complaint.create", complaint.category = %category)
    }

    pub fn update_status_span(reference_code: &str, target: &str) -> Span {
        info_span!(
            "complaint.update_status",
            complaint.reference_code = %reference_code,
            complaint.target_status = %target
        )
    }
}
