// Policy evaluation: tool gating, blocked fields, output redaction.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use suitechat_contracts::PolicyDecision;
use suitechat_storage::PolicyProfileRow;

/// Recognised row caps: LIMIT n, FETCH FIRST n ROWS ONLY, ROWNUM <= n.
fn row_cap_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bLIMIT\s+(\d+)|\bFETCH\s+FIRST\s+(\d+)\s+ROWS?\s+ONLY|\bROWNUM\s*<=?\s*(\d+)",
        )
        .expect("row cap regex")
    })
}

/// Extract the row cap from a query, if one is present.
fn extract_row_cap(query: &str) -> Option<i64> {
    let caps = row_cap_regex().captures(query)?;
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .and_then(|m| m.as_str().parse().ok())
}

/// Evaluate whether a pending tool call is allowed by the active policy.
/// Absence of a policy is permissive.
pub fn evaluate_tool_call(
    policy: Option<&PolicyProfileRow>,
    tool_name: &str,
    params: &Value,
) -> PolicyDecision {
    let Some(policy) = policy else {
        return PolicyDecision::allow();
    };

    // Tool allow-list, when the policy declares one
    let allowed_tools = policy.tool_allowlist_names();
    if !allowed_tools.is_empty() && !allowed_tools.iter().any(|t| t == tool_name) {
        return PolicyDecision::deny(format!("Tool not permitted by policy: {tool_name}"));
    }

    let query = params.get("query").and_then(Value::as_str).unwrap_or("");
    let query_lower = query.to_lowercase();

    // Blocked fields: case-insensitive substring over the query parameter
    for field in policy.blocked_field_names() {
        if !field.is_empty() && query_lower.contains(&field.to_lowercase()) {
            return PolicyDecision::deny(format!("Query references blocked field: {field}"));
        }
    }

    // Row limit requirement
    if policy.require_row_limit && !query.is_empty() {
        let max_rows = i64::from(policy.max_rows_per_query.max(1));
        match extract_row_cap(query) {
            None => {
                return PolicyDecision::deny(format!(
                    "Query must include a row limit (max {max_rows} rows). \
                     Add FETCH FIRST {max_rows} ROWS ONLY to your query."
                ));
            }
            Some(cap) if cap > max_rows => {
                return PolicyDecision::deny(format!(
                    "Row limit {cap} exceeds the policy maximum of {max_rows} rows."
                ));
            }
            Some(_) => {}
        }
    }

    PolicyDecision::allow()
}

/// Recursively strip keys matching blocked_fields (case-insensitive) from
/// objects and arrays. Idempotent.
pub fn redact_output(policy: Option<&PolicyProfileRow>, result: Value) -> Value {
    let Some(policy) = policy else {
        return result;
    };
    let blocked: Vec<String> = policy
        .blocked_field_names()
        .into_iter()
        .map(|f| f.to_lowercase())
        .collect();
    if blocked.is_empty() {
        return result;
    }
    redact_value(result, &blocked)
}

fn redact_value(value: Value, blocked: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !blocked.contains(&key.to_lowercase()))
                .map(|(key, val)| (key, redact_value(val, blocked)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| redact_value(item, blocked))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn policy(blocked: Value, require_row_limit: bool, max_rows: i32) -> PolicyProfileRow {
        PolicyProfileRow {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            name: "default".into(),
            version: 1,
            is_active: true,
            is_locked: false,
            read_only_mode: true,
            allowed_record_types: None,
            blocked_fields: Some(blocked),
            tool_allowlist: None,
            max_rows_per_query: max_rows,
            require_row_limit,
            custom_rules: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn no_policy_is_permissive() {
        let decision = evaluate_tool_call(None, "netsuite.suiteql", &json!({"query": "SELECT *"}));
        assert!(decision.allowed);
    }

    #[test]
    fn blocked_field_denies_with_field_in_reason() {
        let p = policy(json!(["ssn"]), false, 1000);
        let decision = evaluate_tool_call(
            Some(&p),
            "netsuite.suiteql",
            &json!({"query": "SELECT SSN FROM employee FETCH FIRST 10 ROWS ONLY"}),
        );
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("ssn"));
    }

    #[test]
    fn missing_row_cap_is_denied_when_required() {
        let p = policy(json!([]), true, 500);
        let decision = evaluate_tool_call(
            Some(&p),
            "netsuite.suiteql",
            &json!({"query": "SELECT id FROM transaction"}),
        );
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("500"));
    }

    #[test]
    fn recognised_row_caps_pass() {
        let p = policy(json!([]), true, 1000);
        for query in [
            "SELECT id FROM transaction FETCH FIRST 100 ROWS ONLY",
            "SELECT id FROM transaction LIMIT 10",
            "SELECT id FROM transaction WHERE ROWNUM <= 50",
        ] {
            let decision = evaluate_tool_call(Some(&p), "netsuite.suiteql", &json!({"query": query}));
            assert!(decision.allowed, "{query} should pass");
        }
    }

    #[test]
    fn row_cap_above_maximum_is_denied() {
        let p = policy(json!([]), true, 100);
        let decision = evaluate_tool_call(
            Some(&p),
            "netsuite.suiteql",
            &json!({"query": "SELECT id FROM transaction LIMIT 5000"}),
        );
        assert!(!decision.allowed);
    }

    #[test]
    fn policy_tool_allowlist_gates_unlisted_tools() {
        let mut p = policy(json!([]), false, 1000);
        p.tool_allowlist = Some(json!(["rag_search"]));
        assert!(evaluate_tool_call(Some(&p), "rag_search", &json!({})).allowed);
        let denied = evaluate_tool_call(Some(&p), "netsuite.suiteql", &json!({}));
        assert!(!denied.allowed);
        assert!(denied.reason.unwrap().contains("netsuite.suiteql"));
    }

    #[test]
    fn redaction_strips_nested_keys_case_insensitively() {
        let p = policy(json!(["salary"]), false, 1000);
        let result = json!({
            "rows": [
                {"name": "a", "Salary": 100, "detail": {"salary": 1, "dept": "x"}},
                {"name": "b", "SALARY": 200},
            ],
            "count": 2,
        });
        let redacted = redact_output(Some(&p), result);
        assert_eq!(
            redacted,
            json!({
                "rows": [
                    {"name": "a", "detail": {"dept": "x"}},
                    {"name": "b"},
                ],
                "count": 2,
            })
        );
    }

    #[test]
    fn redaction_is_idempotent() {
        let p = policy(json!(["token"]), false, 1000);
        let value = json!({"token": "x", "rows": [{"token": "y", "keep": 1}]});
        let once = redact_output(Some(&p), value);
        let twice = redact_output(Some(&p), once.clone());
        assert_eq!(once, twice);
    }
}
