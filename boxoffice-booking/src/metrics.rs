use std::time::Duration;

use boxoffice_core::{BookingResult, CoreResult, LockingStrategy};
use prometheus::{HistogramOpts, HistogramVec, IntCounter, Opts, Registry};

/// Observability handle owned by the orchestrator. Registered into a
/// caller-supplied registry so several orchestrators (or tests) never share
/// global state.
#[derive(Clone)]
pub struct BookingMetrics {
    latency: HistogramVec,
    conflicts: IntCounter,
}

impl BookingMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "booking_latency_seconds",
                "Wall-clock latency of booking attempts",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["strategy", "outcome"],
        )?;
        let conflicts = IntCounter::with_opts(Opts::new(
            "booking_conflict_total",
            "Total number of booking conflicts",
        ))?;

        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(conflicts.clone()))?;

        Ok(Self { latency, conflicts })
    }

    /// Metrics that are recorded but never exported.
    pub fn unregistered() -> prometheus::Result<Self> {
        Self::new(&Registry::new())
    }

    pub fn observe(&self, strategy: LockingStrategy, outcome: &CoreResult<BookingResult>, elapsed: Duration) {
        let label = match outcome {
            Ok(_) => "booked",
            Err(e) => e.code(),
        };

        self.latency
            .with_label_values(&[strategy.as_str(), label])
            .observe(elapsed.as_secs_f64());

        if matches!(outcome, Err(e) if e.is_conflict()) {
            self.conflicts.inc();
        }
    }

    pub fn conflict_count(&self) -> u64 {
        self.conflicts.get()
    }

    pub fn attempt_count(&self, strategy: LockingStrategy, outcome: &str) -> u64 {
        self.latency
            .with_label_values(&[strategy.as_str(), outcome])
            .get_sample_count()
    }
}
