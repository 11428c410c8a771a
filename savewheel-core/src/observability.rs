/*!
Observability for savewheel.

- Logging setup through `tracing-subscriber`, as text or JSON
- Prometheus counters for saves and restores (feature `metrics`)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Duration;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SaveError};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<SaveMetrics> = OnceLock::new();

/// Metrics collected for save and restore operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SaveMetrics {
    pub saves_total: Counter,
    pub overwrites_total: Counter,

    pub restores_total: Counter,
    pub restore_failures_total: Counter,
    pub restores_aborted_total: Counter,
    pub restore_latency_seconds: Histogram,

    pub archive_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| SaveError::observability(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| SaveError::observability(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
fn histogram(registry: &Registry, opts: HistogramOpts) -> Result<Histogram> {
    let name = opts.common_opts.name.clone();
    let histogram = Histogram::with_opts(opts)
        .map_err(|e| SaveError::observability(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| SaveError::observability(format!("Failed to register {name}: {e}")))?;
    Ok(histogram)
}

#[cfg(feature = "metrics")]
impl SaveMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_total = counter(
            &registry,
            "savewheel_saves_total",
            "Total slot archives written",
        )?;
        let overwrites_total = counter(
            &registry,
            "savewheel_overwrites_total",
            "Saves that replaced an existing slot",
        )?;
        let restores_total = counter(
            &registry,
            "savewheel_restores_total",
            "Restores that completed",
        )?;
        let restore_failures_total = counter(
            &registry,
            "savewheel_restore_failures_total",
            "Restores that failed after modifying the live directory",
        )?;
        let restores_aborted_total = counter(
            &registry,
            "savewheel_restores_aborted_total",
            "Restores aborted before the live directory was touched",
        )?;
        let restore_latency_seconds = histogram(
            &registry,
            HistogramOpts::new(
                "savewheel_restore_latency_seconds",
                "Duration of restore operations in seconds",
            ),
        )?;
        let archive_size_bytes = histogram(
            &registry,
            HistogramOpts::new("savewheel_archive_size_bytes", "Size of stored archives in bytes")
                .buckets(prometheus::exponential_buckets(1024.0, 4.0, 10).map_err(|e| {
                    SaveError::observability(format!("Invalid archive size buckets: {e}"))
                })?),
        )?;

        Ok(Self {
            saves_total,
            overwrites_total,
            restores_total,
            restore_failures_total,
            restores_aborted_total,
            restore_latency_seconds,
            archive_size_bytes,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static SaveMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize savewheel metrics"))
    }

    /// Record a slot save, noting whether an existing slot was replaced
    pub fn record_save(&self, overwrote: bool) {
        self.saves_total.inc();
        if overwrote {
            self.overwrites_total.inc();
        }
    }

    pub fn record_restore(&self) {
        self.restores_total.inc();
    }

    pub fn record_restore_failure(&self) {
        self.restore_failures_total.inc();
    }

    pub fn record_restore_aborted(&self) {
        self.restores_aborted_total.inc();
    }

    pub fn record_restore_latency(&self, duration: Duration) {
        self.restore_latency_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_archive_size(&self, size_bytes: usize) {
        self.archive_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SaveError::observability(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| SaveError::observability(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence when set. Otherwise savewheel's own
/// crates log at `info`, or `debug` when `verbose` is set. Log lines go
/// to stderr so they never mix with command output.
pub fn init_observability(verbose: bool, format: LogFormat) -> Result<()> {
    #[cfg(feature = "metrics")]
    SaveMetrics::global();

    let default_directives = if verbose {
        "savewheel_core=debug,savewheel=debug"
    } else {
        "savewheel_core=info,savewheel=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let result = match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
        }
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr);
            set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
        }
    };

    result.map_err(|e| {
        SaveError::observability(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!(?format, "savewheel observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(false, LogFormat::Text)
}
