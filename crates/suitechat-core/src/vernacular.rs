// Tenant vernacular resolver.
//
// Runs before the agents: a fast LLM extracts candidate tenant-specific
// entities from the user message, each candidate is matched against the
// trigram-indexed mapping table, active learned rules are loaded, and
// everything is serialised into a stable XML block the agents fold into
// their system context. Failure never blocks the turn; the block is just
// empty.

use serde_json::Value;
use sqlx::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use suitechat_llm::{LlmAdapter, LlmRequest};
use suitechat_storage::{Database, TenantLearnedRuleRow};

use suitechat_contracts::Message;

use crate::prompts::ENTITY_EXTRACTOR_PROMPT;

const EXTRACTION_MAX_TOKENS: u32 = 256;

/// One resolved entity, ready for the XML block.
#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub user_term: String,
    pub internal_script_id: String,
    pub entity_type: String,
    pub metadata: String,
    pub confidence_score: f32,
}

/// Resolve tenant vernacular for a user message. Returns the
/// `<tenant_vernacular>` block, or an empty string when there are no
/// matches and no rules (or when extraction fails).
pub async fn resolve_vernacular(
    db: &Database,
    conn: &mut PgConnection,
    tenant_id: Uuid,
    user_message: &str,
    adapter: &dyn LlmAdapter,
    fast_model: &str,
) -> String {
    let request = LlmRequest::new(fast_model, EXTRACTION_MAX_TOKENS, ENTITY_EXTRACTOR_PROMPT)
        .with_messages(vec![Message::user(format!("User prompt: {user_message}"))]);

    let candidates = match adapter.create_message(request).await {
        Ok(response) => parse_entity_array(&response.text()),
        Err(err) => {
            warn!(error = %err, "vernacular extraction failed");
            return String::new();
        }
    };

    let mut resolved = Vec::new();
    for candidate in &candidates {
        match db.resolve_entity_fuzzy(conn, tenant_id, candidate).await {
            Ok(Some((mapping, similarity))) => {
                info!(
                    user_term = %candidate,
                    script_id = %mapping.script_id,
                    entity_type = %mapping.entity_type,
                    similarity = similarity,
                    "vernacular match found"
                );
                resolved.push(ResolvedEntity {
                    user_term: candidate.clone(),
                    internal_script_id: mapping.script_id,
                    entity_type: mapping.entity_type,
                    metadata: mapping.description.unwrap_or_default(),
                    confidence_score: (similarity * 100.0).round() / 100.0,
                });
            }
            Ok(None) => {
                info!(user_term = %candidate, "no vernacular match");
            }
            Err(err) => {
                warn!(user_term = %candidate, error = %err, "vernacular lookup failed");
            }
        }
    }

    let rules = match db.active_learned_rules(conn, tenant_id).await {
        Ok(rules) => rules,
        Err(err) => {
            warn!(error = %err, "learned rule load failed");
            Vec::new()
        }
    };

    build_vernacular_block(&resolved, &rules)
}

/// Parse the extractor's JSON array, tolerating markdown code fences.
pub(crate) fn parse_entity_array(text: &str) -> Vec<String> {
    let mut content = text.trim();
    if let Some(start) = content.find("```json") {
        content = &content[start + 7..];
        if let Some(end) = content.find("```") {
            content = &content[..end];
        }
    } else if let Some(start) = content.find("```") {
        content = &content[start + 3..];
        if let Some(end) = content.find("```") {
            content = &content[..end];
        }
    }

    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Serialise resolved entities and learned rules into the stable XML block.
/// Empty when there is nothing to say.
pub(crate) fn build_vernacular_block(
    resolved: &[ResolvedEntity],
    rules: &[TenantLearnedRuleRow],
) -> String {
    if resolved.is_empty() && rules.is_empty() {
        return String::new();
    }

    let mut parts = vec![
        "<tenant_vernacular>".to_string(),
        "    <instruction_context>".to_string(),
        "        The following entities and rules have been mapped to their specific internal NetSuite constraints for this particular tenant.".to_string(),
        "        You MUST use these exact inner script IDs and rules when constructing your SuiteQL FROM and WHERE clauses.".to_string(),
        "    </instruction_context>".to_string(),
    ];

    if !resolved.is_empty() {
        parts.push("    <resolved_entities>".to_string());
        for entity in resolved {
            parts.push("        <entity>".to_string());
            parts.push(format!("            <user_term>{}</user_term>", entity.user_term));
            parts.push(format!(
                "            <internal_script_id>{}</internal_script_id>",
                entity.internal_script_id
            ));
            parts.push(format!(
                "            <entity_type>{}</entity_type>",
                entity.entity_type
            ));
            parts.push(format!("            <metadata>{}</metadata>", entity.metadata));
            parts.push(format!(
                "            <confidence_score>{}</confidence_score>",
                entity.confidence_score
            ));
            parts.push("        </entity>".to_string());
        }
        parts.push("    </resolved_entities>".to_string());
    }

    if !rules.is_empty() {
        parts.push("    <learned_rules>".to_string());
        parts.push(
            "        <!-- Explicit business logic / schema rules learned for this tenant. FOLLOW THESE STRICTLY. -->"
                .to_string(),
        );
        for rule in rules {
            parts.push(format!(
                "        <rule category=\"{}\">",
                rule.rule_category.as_deref().unwrap_or("general")
            ));
            parts.push(format!("            {}", rule.rule_description));
            parts.push("        </rule>".to_string());
        }
        parts.push("    </learned_rules>".to_string());
    }

    parts.push("</tenant_vernacular>".to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(description: &str, category: Option<&str>) -> TenantLearnedRuleRow {
        TenantLearnedRuleRow {
            id: Uuid::now_v7(),
            tenant_id: Uuid::now_v7(),
            rule_category: category.map(str::to_string),
            rule_description: description.to_string(),
            is_active: true,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn entity_array_parses_plain_and_fenced_json() {
        assert_eq!(
            parse_entity_array(r#"["Inventory Processor", "Failed"]"#),
            vec!["Inventory Processor", "Failed"]
        );
        assert_eq!(
            parse_entity_array("```json\n[\"Ordoro\"]\n```"),
            vec!["Ordoro"]
        );
        assert_eq!(parse_entity_array("```\n[\"X\"]\n```"), vec!["X"]);
    }

    #[test]
    fn entity_array_rejects_non_arrays_and_blanks() {
        assert!(parse_entity_array("{\"not\": \"array\"}").is_empty());
        assert!(parse_entity_array("not json").is_empty());
        assert_eq!(parse_entity_array(r#"["ok", "", 42]"#), vec!["ok"]);
    }

    #[test]
    fn block_is_empty_without_matches_or_rules() {
        assert_eq!(build_vernacular_block(&[], &[]), "");
    }

    #[test]
    fn block_carries_entities_and_rules_with_categories() {
        let resolved = vec![ResolvedEntity {
            user_term: "Inventory Processor".into(),
            internal_script_id: "customrecord_inv_proc".into(),
            entity_type: "customrecord".into(),
            metadata: String::new(),
            confidence_score: 0.62,
        }];
        let rules = vec![rule("Always include the currency column", Some("output_preference"))];

        let block = build_vernacular_block(&resolved, &rules);
        assert!(block.starts_with("<tenant_vernacular>"));
        assert!(block.ends_with("</tenant_vernacular>"));
        assert!(block.contains("<internal_script_id>customrecord_inv_proc</internal_script_id>"));
        assert!(block.contains("<rule category=\"output_preference\">"));
        assert!(block.contains("Always include the currency column"));
    }

    #[test]
    fn rules_without_category_default_to_general() {
        let block = build_vernacular_block(&[], &[rule("never round amounts", None)]);
        assert!(block.contains("<rule category=\"general\">"));
    }
}
