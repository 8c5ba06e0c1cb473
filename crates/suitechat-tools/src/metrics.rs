// In-process tool metrics for health and debugging.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{json, Value};

#[derive(Default)]
pub struct Metrics {
    calls: Mutex<HashMap<(String, String), u64>>,
    durations: Mutex<HashMap<String, Vec<f64>>>,
    rate_limit_rejections: Mutex<HashMap<String, u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self, tool: &str, status: &str) {
        let mut calls = self.calls.lock().unwrap();
        *calls.entry((tool.to_string(), status.to_string())).or_insert(0) += 1;
    }

    pub fn record_duration(&self, tool: &str, seconds: f64) {
        let mut durations = self.durations.lock().unwrap();
        durations.entry(tool.to_string()).or_default().push(seconds);
    }

    pub fn record_rate_limit_rejection(&self, tool: &str) {
        let mut rejections = self.rate_limit_rejections.lock().unwrap();
        *rejections.entry(tool.to_string()).or_insert(0) += 1;
    }

    pub fn rejection_count(&self, tool: &str) -> u64 {
        self.rate_limit_rejections
            .lock()
            .unwrap()
            .get(tool)
            .copied()
            .unwrap_or(0)
    }

    pub fn call_count(&self, tool: &str, status: &str) -> u64 {
        self.calls
            .lock()
            .unwrap()
            .get(&(tool.to_string(), status.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of all counters for the health surface.
    pub fn snapshot(&self) -> Value {
        let calls = self.calls.lock().unwrap();
        let mut calls_by_tool: HashMap<String, HashMap<String, u64>> = HashMap::new();
        for ((tool, status), count) in calls.iter() {
            calls_by_tool
                .entry(tool.clone())
                .or_default()
                .insert(status.clone(), *count);
        }

        let durations = self.durations.lock().unwrap();
        let duration_stats: HashMap<String, Value> = durations
            .iter()
            .map(|(tool, samples)| {
                let total: f64 = samples.iter().sum();
                let avg = if samples.is_empty() { 0.0 } else { total / samples.len() as f64 };
                (
                    tool.clone(),
                    json!({"count": samples.len(), "total": total, "avg": avg}),
                )
            })
            .collect();

        let rejections = self.rate_limit_rejections.lock().unwrap();

        json!({
            "tool_calls_total": calls_by_tool,
            "tool_duration_seconds": duration_stats,
            "rate_limit_rejections_total": rejections.clone(),
        })
    }

    /// Reset all counters. Used in tests.
    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
        self.durations.lock().unwrap().clear();
        self.rate_limit_rejections.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_by_tool_and_status() {
        let metrics = Metrics::new();
        metrics.record_call("rag_search", "success");
        metrics.record_call("rag_search", "success");
        metrics.record_call("rag_search", "error");
        metrics.record_rate_limit_rejection("rag_search");
        metrics.record_duration("rag_search", 0.25);

        assert_eq!(metrics.call_count("rag_search", "success"), 2);
        assert_eq!(metrics.call_count("rag_search", "error"), 1);
        assert_eq!(metrics.rejection_count("rag_search"), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["tool_calls_total"]["rag_search"]["success"], 2);
        assert_eq!(snapshot["tool_duration_seconds"]["rag_search"]["count"], 1);
    }
}
