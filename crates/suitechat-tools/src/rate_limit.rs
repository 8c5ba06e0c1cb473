// Sliding-window rate limiter keyed by (tenant, tool).
//
// Advisory and per-process: no persistence, one mutex-guarded map held by
// the instance. Rejections surface as ToolError::RateLimited and bump the
// per-tool rejection counter in metrics.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

const WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_LIMIT: u32 = 10;

pub struct RateLimiter {
    window: Duration,
    default_limit: u32,
    per_tool_limits: HashMap<String, u32>,
    buckets: Mutex<HashMap<(Uuid, String), Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}

impl RateLimiter {
    pub fn new(default_limit: u32) -> Self {
        Self {
            window: WINDOW,
            default_limit,
            per_tool_limits: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Override the limit for a specific tool.
    pub fn with_tool_limit(mut self, tool: impl Into<String>, limit: u32) -> Self {
        self.per_tool_limits.insert(tool.into(), limit);
        self
    }

    pub fn limit_for(&self, tool: &str) -> u32 {
        self.per_tool_limits
            .get(tool)
            .copied()
            .unwrap_or(self.default_limit)
    }

    /// Record one attempt. Returns true when the call is allowed: the
    /// limit-th call inside the window passes, the next is denied.
    pub fn check(&self, tenant_id: Uuid, tool: &str) -> bool {
        let limit = self.limit_for(tool) as usize;
        let now = Instant::now();

        let mut buckets = self.buckets.lock().unwrap();
        let attempts = buckets.entry((tenant_id, tool.to_string())).or_default();
        if let Some(cutoff) = now.checked_sub(self.window) {
            attempts.retain(|t| *t > cutoff);
        }

        if attempts.len() >= limit {
            return false;
        }
        attempts.push(now);
        true
    }

    /// Clear all counters. Used in tests.
    pub fn reset(&self) {
        self.buckets.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_exactly_limit_calls_within_window() {
        let limiter = RateLimiter::new(10);
        let tenant = Uuid::now_v7();

        for i in 0..10 {
            assert!(limiter.check(tenant, "netsuite.suiteql"), "call {i} denied");
        }
        assert!(!limiter.check(tenant, "netsuite.suiteql"), "11th call allowed");
    }

    #[test]
    fn tenants_do_not_share_buckets() {
        let limiter = RateLimiter::new(1);
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert!(limiter.check(a, "rag_search"));
        assert!(limiter.check(b, "rag_search"));
        assert!(!limiter.check(a, "rag_search"));
    }

    #[test]
    fn per_tool_override_applies() {
        let limiter = RateLimiter::new(10).with_tool_limit("report.export", 1);
        let tenant = Uuid::now_v7();
        assert!(limiter.check(tenant, "report.export"));
        assert!(!limiter.check(tenant, "report.export"));
        assert!(limiter.check(tenant, "rag_search"));
    }
}
