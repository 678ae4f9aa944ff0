//! Decision metrics

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Decision counters and latency
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionMetrics {
    /// Total number of decisions rendered
    pub total_decisions: u64,

    pub allowed: u64,

    /// Denied decisions, including fail-closed ones
    pub denied: u64,

    /// Decisions denied because evaluation failed
    pub evaluation_failures: u64,

    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
}

impl DecisionMetrics {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.allowed as f64 / self.total_decisions as f64
        }
    }
}

/// Collects decision metrics
pub struct MetricsCollector {
    metrics: Arc<RwLock<DecisionMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(DecisionMetrics::default())),
        }
    }

    /// Record one decision with its latency
    pub async fn record_decision(&self, allowed: bool, failed: bool, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let mut metrics = self.metrics.write().await;

        metrics.total_decisions += 1;
        if allowed {
            metrics.allowed += 1;
        } else {
            metrics.denied += 1;
        }
        if failed {
            metrics.evaluation_failures += 1;
        }

        // Running mean
        let n = metrics.total_decisions as f64;
        metrics.avg_latency_ms += (latency_ms - metrics.avg_latency_ms) / n;
        metrics.max_latency_ms = metrics.max_latency_ms.max(latency_ms);
    }

    /// Get current metrics snapshot
    pub async fn snapshot(&self) -> DecisionMetrics {
        self.metrics.read().await.clone()
    }

    /// Reset all metrics
    pub async fn reset(&self) {
        *self.metrics.write().await = DecisionMetrics::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
