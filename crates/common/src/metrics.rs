use std::sync::{Arc, OnceLock};

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Process-wide metric families for kernels, cache channels, and the
/// inbound message queue.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    kernel_batches_in: CounterVec,
    kernel_batches_out: CounterVec,
    kernel_rows_out: CounterVec,
    kernel_bytes_in: CounterVec,
    kernel_bytes_out: CounterVec,
    kernel_time_seconds: HistogramVec,
    cache_depth_entries: GaugeVec,
    cache_size_bytes: GaugeVec,
    cache_sentinels: CounterVec,
    message_queue_depth: Gauge,
    messages_received: CounterVec,
}

impl MetricsRegistry {
    /// Create a registry with all DFQ metric families registered.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Record one completed kernel run.
    #[allow(clippy::too_many_arguments)]
    pub fn record_kernel(
        &self,
        kernel_id: u32,
        kind: &str,
        batches_in: u64,
        batches_out: u64,
        rows_out: u64,
        bytes_in: u64,
        bytes_out: u64,
        secs: f64,
    ) {
        let kernel_id = kernel_id.to_string();
        let labels = [kernel_id.as_str(), kind];
        self.inner
            .kernel_batches_in
            .with_label_values(&labels)
            .inc_by(batches_in as f64);
        self.inner
            .kernel_batches_out
            .with_label_values(&labels)
            .inc_by(batches_out as f64);
        self.inner
            .kernel_rows_out
            .with_label_values(&labels)
            .inc_by(rows_out as f64);
        self.inner
            .kernel_bytes_in
            .with_label_values(&labels)
            .inc_by(bytes_in as f64);
        self.inner
            .kernel_bytes_out
            .with_label_values(&labels)
            .inc_by(bytes_out as f64);
        self.inner
            .kernel_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    /// Update the observed depth/weight of one cache channel.
    pub fn set_cache_depth(&self, channel: &str, entries: u64, bytes: u64) {
        self.inner
            .cache_depth_entries
            .with_label_values(&[channel])
            .set(entries as f64);
        self.inner
            .cache_size_bytes
            .with_label_values(&[channel])
            .set(bytes as f64);
    }

    /// Count one sentinel observed by a cache channel.
    pub fn inc_cache_sentinels(&self, channel: &str) {
        self.inner
            .cache_sentinels
            .with_label_values(&[channel])
            .inc();
    }

    /// Update the inbound message-queue depth.
    pub fn set_message_queue_depth(&self, depth: u64) {
        self.inner.message_queue_depth.set(depth as f64);
    }

    /// Count one message consumed for a token.
    pub fn inc_messages_received(&self, token: &str) {
        self.inner
            .messages_received
            .with_label_values(&[token])
            .inc();
    }

    /// Render all families in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let kernel_batches_in = counter_vec(
            &registry,
            "dfq_kernel_batches_in_total",
            "Input batches pulled per kernel",
            &["kernel_id", "kind"],
        );
        let kernel_batches_out = counter_vec(
            &registry,
            "dfq_kernel_batches_out_total",
            "Output batches pushed per kernel",
            &["kernel_id", "kind"],
        );
        let kernel_rows_out = counter_vec(
            &registry,
            "dfq_kernel_rows_out_total",
            "Output rows produced per kernel",
            &["kernel_id", "kind"],
        );
        let kernel_bytes_in = counter_vec(
            &registry,
            "dfq_kernel_bytes_in_total",
            "Input bytes pulled per kernel",
            &["kernel_id", "kind"],
        );
        let kernel_bytes_out = counter_vec(
            &registry,
            "dfq_kernel_bytes_out_total",
            "Output bytes pushed per kernel",
            &["kernel_id", "kind"],
        );
        let kernel_time_seconds = histogram_vec(
            &registry,
            "dfq_kernel_time_seconds",
            "Wall time of each kernel run",
            &["kernel_id", "kind"],
        );

        let cache_depth_entries = gauge_vec(
            &registry,
            "dfq_cache_depth_entries",
            "Entries currently queued per cache channel",
            &["channel"],
        );
        let cache_size_bytes = gauge_vec(
            &registry,
            "dfq_cache_size_bytes",
            "Byte weight currently queued per cache channel",
            &["channel"],
        );
        let cache_sentinels = counter_vec(
            &registry,
            "dfq_cache_sentinels_total",
            "Sentinels observed per cache channel",
            &["channel"],
        );

        let message_queue_depth = gauge(
            &registry,
            "dfq_message_queue_depth",
            "Messages currently waiting in the inbound queue",
        );
        let messages_received = counter_vec(
            &registry,
            "dfq_messages_received_total",
            "Messages consumed per token",
            &["token"],
        );

        Self {
            registry,
            kernel_batches_in,
            kernel_batches_out,
            kernel_rows_out,
            kernel_bytes_in,
            kernel_bytes_out,
            kernel_time_seconds,
            cache_depth_entries,
            cache_size_bytes,
            cache_sentinels,
            message_queue_depth,
            messages_received,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let g = GaugeVec::new(Opts::new(name, help), labels).expect("gauge vec");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Gauge {
    let g = Gauge::with_opts(Opts::new(name, help)).expect("gauge");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

/// Shared process-wide registry.
pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
