use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};

/// Counters and gauges for the cyclic read/write path.
#[derive(Clone)]
pub struct CycleMetrics {
    pub registry: Registry,
    pub reads: IntCounter,
    pub writes: IntCounter,
    pub transport_failures: IntCounter,
    pub deadline_misses: IntCounter,
    pub commands_sent: IntCounter,
    pub watchdog_feeds: IntCounter,
    pub period_seconds: Gauge,
    pub read_duration_seconds: Gauge,
    pub write_duration_seconds: Gauge,
}

impl CycleMetrics {
    pub fn new() -> Result<Self, String> {
        let err = |e: prometheus::Error| format!("metrics init error: {e}");
        let registry = Registry::new();
        let reads = IntCounter::new("odrive_reads_total", "Completed read cycles").map_err(err)?;
        let writes =
            IntCounter::new("odrive_writes_total", "Completed write cycles").map_err(err)?;
        let transport_failures = IntCounter::new(
            "odrive_transport_failures_total",
            "Cycle calls aborted by a transport failure",
        )
        .map_err(err)?;
        let deadline_misses = IntCounter::new(
            "odrive_deadline_misses_total",
            "Gateway calls not started before the cycle deadline",
        )
        .map_err(err)?;
        let commands_sent =
            IntCounter::new("odrive_commands_sent_total", "Setpoints sent to axes").map_err(err)?;
        let watchdog_feeds =
            IntCounter::new("odrive_watchdog_feeds_total", "Watchdog feeds sent").map_err(err)?;
        let period_seconds =
            Gauge::new("odrive_period_seconds", "Last control period").map_err(err)?;
        let read_duration_seconds =
            Gauge::new("odrive_read_duration_seconds", "Duration of the last read").map_err(err)?;
        let write_duration_seconds =
            Gauge::new("odrive_write_duration_seconds", "Duration of the last write")
                .map_err(err)?;

        let metrics = Self {
            registry,
            reads,
            writes,
            transport_failures,
            deadline_misses,
            commands_sent,
            watchdog_feeds,
            period_seconds,
            read_duration_seconds,
            write_duration_seconds,
        };
        let _ = metrics.registry.register(Box::new(metrics.reads.clone()));
        let _ = metrics.registry.register(Box::new(metrics.writes.clone()));
        let _ = metrics
            .registry
            .register(Box::new(metrics.transport_failures.clone()));
        let _ = metrics
            .registry
            .register(Box::new(metrics.deadline_misses.clone()));
        let _ = metrics
            .registry
            .register(Box::new(metrics.commands_sent.clone()));
        let _ = metrics
            .registry
            .register(Box::new(metrics.watchdog_feeds.clone()));
        let _ = metrics
            .registry
            .register(Box::new(metrics.period_seconds.clone()));
        let _ = metrics
            .registry
            .register(Box::new(metrics.read_duration_seconds.clone()));
        let _ = metrics
            .registry
            .register(Box::new(metrics.write_duration_seconds.clone()));
        Ok(metrics)
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
