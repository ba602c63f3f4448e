//! Threshold alerting on top of the event batcher

use std::sync::Arc;

use bulwark_domain::{Alert, Severity};
use tracing::warn;

use super::batcher::EventBatcher;

pub const METRIC_API_RESPONSE_TIME: &str = "api_response_time";
pub const METRIC_ERROR_RATE: &str = "error_rate";
pub const METRIC_CPU_USAGE: &str = "cpu_usage";

/// Alert when `metric` goes strictly above `threshold`
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: String,
    pub threshold: f64,
    pub severity: Severity,
}

impl ThresholdRule {
    pub fn new(metric: impl Into<String>, threshold: f64, severity: Severity) -> Self {
        Self { metric: metric.into(), threshold, severity }
    }
}

/// Checks metric observations against rules and enqueues breaches as alerts
#[derive(Debug)]
pub struct ThresholdMonitor {
    rules: Vec<ThresholdRule>,
    batcher: Arc<EventBatcher>,
}

impl ThresholdMonitor {
    /// Monitor with [`default_rules`](Self::default_rules)
    pub fn new(batcher: Arc<EventBatcher>) -> Self {
        Self::with_rules(batcher, Self::default_rules())
    }

    pub fn with_rules(batcher: Arc<EventBatcher>, rules: Vec<ThresholdRule>) -> Self {
        Self { rules, batcher }
    }

    /// Response time above 1000ms, error rate above 5%, CPU above 85%
    pub fn default_rules() -> Vec<ThresholdRule> {
        vec![
            ThresholdRule::new(METRIC_API_RESPONSE_TIME, 1_000.0, Severity::Medium),
            ThresholdRule::new(METRIC_ERROR_RATE, 0.05, Severity::High),
            ThresholdRule::new(METRIC_CPU_USAGE, 0.85, Severity::High),
        ]
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Record one observation. Returns the alert if a rule was breached.
    ///
    /// When several rules match the metric, the most severe breach wins.
    pub fn observe(&self, metric: &str, value: f64) -> Option<Alert> {
        let rule = self
            .rules
            .iter()
            .filter(|rule| rule.metric == metric && value > rule.threshold)
            .max_by_key(|rule| rule.severity)?;

        let alert = Alert::new(
            rule.severity,
            metric,
            rule.threshold,
            value,
            format!("{metric} is {value}, above threshold {}", rule.threshold),
        );
        warn!(metric, value, threshold = rule.threshold, severity = %rule.severity, "threshold breached");
        self.batcher.enqueue(alert.clone().into_event());
        Some(alert)
    }
}
