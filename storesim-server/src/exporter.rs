use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use storesim_core::RuntimeMetricsSnapshot;

/// Prometheus gauges mirroring the latest workload snapshot.
///
/// Gauges are updated on every poll and rendered in the text exposition format on request.
#[derive(Debug)]
pub struct PrometheusExporter {
    registry: Registry,
    ops_per_sec: IntGauge,
    read_per_sec: IntGauge,
    write_per_sec: IntGauge,
    delete_per_sec: IntGauge,
    key_count: IntGauge,
}

impl PrometheusExporter {
    /// Creates an exporter with its own registry.
    ///
    /// On Linux, the registry also carries process metrics like CPU time and resident memory.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let ops_per_sec = gauge(&registry, "storesim_ops_per_sec", "Operations per second")?;
        let read_per_sec = gauge(&registry, "storesim_read_per_sec", "Reads per second")?;
        let write_per_sec = gauge(&registry, "storesim_write_per_sec", "Writes per second")?;
        let delete_per_sec = gauge(&registry, "storesim_delete_per_sec", "Deletes per second")?;
        let key_count = gauge(&registry, "storesim_key_count", "Number of live keys")?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            ops_per_sec,
            read_per_sec,
            write_per_sec,
            delete_per_sec,
            key_count,
        })
    }

    /// Sets all gauges from `snapshot`.
    pub fn update(&self, snapshot: &RuntimeMetricsSnapshot) {
        self.ops_per_sec.set(clamp(snapshot.ops_per_second));
        self.read_per_sec.set(clamp(snapshot.reads_per_second));
        self.write_per_sec.set(clamp(snapshot.writes_per_second));
        self.delete_per_sec.set(clamp(snapshot.deletes_per_second));
        self.key_count.set(clamp(snapshot.key_count));
    }

    /// The content type of [`render`](Self::render) output.
    pub fn format_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Renders all registered metrics in the text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
