use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing service activity.
#[derive(Default)]
pub struct ServiceMetrics {
    symptoms_vectorized: AtomicU64,
    diseases_stored: AtomicU64,
    searches_served: AtomicU64,
    notes_converted: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record symptoms written by a vectorize request.
    pub fn record_symptoms(&self, count: u64) {
        self.symptoms_vectorized.fetch_add(count, Ordering::Relaxed);
    }

    /// Record diseases written by a batch request.
    pub fn record_diseases(&self, count: u64) {
        self.diseases_stored.fetch_add(count, Ordering::Relaxed);
    }

    /// Record answered symptom searches.
    pub fn record_searches(&self, count: u64) {
        self.searches_served.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one notes conversion.
    pub fn record_notes(&self) {
        self.notes_converted.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            symptoms_vectorized: self.symptoms_vectorized.load(Ordering::Relaxed),
            diseases_stored: self.diseases_stored.load(Ordering::Relaxed),
            searches_served: self.searches_served.load(Ordering::Relaxed),
            notes_converted: self.notes_converted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Symptoms upserted since startup.
    pub symptoms_vectorized: u64,
    /// Diseases upserted since startup.
    pub diseases_stored: u64,
    /// Individual symptom searches answered, including those inside multi-search requests.
    pub searches_served: u64,
    /// Notes conversion requests handled.
    pub notes_converted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_counter() {
        let metrics = ServiceMetrics::new();
        metrics.record_symptoms(3);
        metrics.record_symptoms(2);
        metrics.record_diseases(1);
        metrics.record_searches(4);
        metrics.record_notes();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                symptoms_vectorized: 5,
                diseases_stored: 1,
                searches_served: 4,
                notes_converted: 1,
            }
        );
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(ServiceMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
