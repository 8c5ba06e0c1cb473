// Memory updater: learn from user corrections in chat.
//
// Regex-gated so it costs zero tokens for the overwhelming majority of
// messages. Only when the message carries an explicit correction signal
// does one fast-model call run; a parseable result upserts an entity
// mapping and/or appends a learned rule, then emits a single audit event.
// Any parse or transport error returns false.

use regex::Regex;
use serde::Deserialize;
use sqlx::PgConnection;
use std::sync::OnceLock;
use tracing::{info, warn};
use uuid::Uuid;

use suitechat_contracts::Message;
use suitechat_llm::{LlmAdapter, LlmRequest};
use suitechat_storage::{AuditLog, Database, NewAuditEvent};

use crate::prompts::CORRECTION_EXTRACTION_PROMPT;

const EXTRACTION_MAX_TOKENS: u32 = 256;
const USER_MESSAGE_LIMIT: usize = 1000;
const ASSISTANT_PREVIEW_LIMIT: usize = 500;

fn correction_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?xi)
            (?:
                \b(?:no|nope|wrong|incorrect|not\s+right),?\s |
                \bthat(?:'s|\s+is)\s+(?:wrong|incorrect|not\s+right) |
                \bactually[,\s] |
                \bremember\s+that\b |
                \balways\s+(?:use|show|include|add)\b |
                \bnever\s+(?:use|show|include|add)\b |
                \bit\s+should\s+be\b |
                \bnot\s+\w+[,\s]+it(?:'s|\s+is)\b |
                \bplease\s+(?:always|never)\b |
                \bfrom\s+now\s+on\b |
                \bin\s+the\s+future\b |
                \bdon(?:'t|t)\s+(?:use|show|include)\b |
                \bwhen\s+i\s+say\b |
                \bis\s+stored\s+in\b |
                \bthe\s+(?:field|column|table)\s+(?:is|for)\b |
                \buse\s+(?:customrecord|custbody|custcol|custitem)\w*\b
            )
            ",
        )
        .expect("correction regex")
    })
}

/// Fast gate: does the message look like a correction?
pub fn has_correction_signal(user_message: &str) -> bool {
    correction_regex().is_match(user_message)
}

#[derive(Debug, Deserialize)]
struct ExtractedCorrection {
    entity_correction: Option<EntityCorrection>,
    rule: Option<RuleCorrection>,
}

#[derive(Debug, Deserialize)]
struct EntityCorrection {
    natural_name: Option<String>,
    script_id: Option<String>,
    entity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RuleCorrection {
    description: Option<String>,
    category: Option<String>,
}

/// Pull the first {...} object out of the model's reply and parse it.
fn parse_correction(text: &str) -> Option<ExtractedCorrection> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Check the user message for corrections and persist what it teaches.
/// Returns true when at least one row was written.
#[allow(clippy::too_many_arguments)]
pub async fn maybe_extract_correction(
    db: &Database,
    conn: &mut PgConnection,
    tenant_id: Uuid,
    user_id: Uuid,
    user_message: &str,
    assistant_message: &str,
    adapter: &dyn LlmAdapter,
    fast_model: &str,
) -> bool {
    if !has_correction_signal(user_message) {
        return false;
    }

    info!(
        tenant_id = %tenant_id,
        preview = %truncate(user_message, 80),
        "correction signal detected"
    );

    let prompt = CORRECTION_EXTRACTION_PROMPT
        .replace("{{USER_MESSAGE}}", &truncate(user_message, USER_MESSAGE_LIMIT))
        .replace(
            "{{ASSISTANT_PREVIEW}}",
            &truncate(assistant_message, ASSISTANT_PREVIEW_LIMIT),
        );

    let request = LlmRequest::new(
        fast_model,
        EXTRACTION_MAX_TOKENS,
        "You extract corrections from chat messages. Return only JSON.",
    )
    .with_messages(vec![Message::user(prompt)]);

    let response = match adapter.create_message(request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "correction extraction call failed");
            return false;
        }
    };

    let Some(extracted) = parse_correction(&response.text()) else {
        return false;
    };

    let mut saved = false;

    if let Some(entity) = extracted.entity_correction {
        if let (Some(natural_name), Some(script_id)) = (
            entity.natural_name.filter(|s| !s.is_empty()),
            entity.script_id.filter(|s| !s.is_empty()),
        ) {
            let entity_type = entity.entity_type.unwrap_or_else(|| "general".into());
            match db
                .upsert_entity_mapping(conn, tenant_id, &entity_type, &natural_name, &script_id)
                .await
            {
                Ok(()) => {
                    info!(
                        tenant_id = %tenant_id,
                        natural_name = %natural_name,
                        script_id = %script_id,
                        "entity mapping saved from correction"
                    );
                    saved = true;
                }
                Err(err) => warn!(error = %err, "entity mapping upsert failed"),
            }
        }
    }

    if let Some(rule) = extracted.rule {
        if let Some(description) = rule.description.filter(|s| !s.is_empty()) {
            let category = rule.category.unwrap_or_else(|| "general".into());
            match db
                .insert_learned_rule(conn, tenant_id, &description, &category, Some(user_id))
                .await
            {
                Ok(row) => {
                    info!(
                        tenant_id = %tenant_id,
                        rule_id = %row.id,
                        category = %category,
                        "learned rule saved from correction"
                    );
                    saved = true;
                }
                Err(err) => warn!(error = %err, "learned rule insert failed"),
            }
        }
    }

    if saved {
        let event = NewAuditEvent::new(tenant_id, "memory", "correction.auto_saved")
            .actor(user_id)
            .resource("chat_correction", tenant_id.to_string())
            .payload(serde_json::json!({
                "user_message_preview": truncate(user_message, 200),
            }));
        if let Err(err) = AuditLog::append(conn, event).await {
            warn!(error = %err, "correction audit write failed");
        }
    }

    saved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correction_signals_hit() {
        for message in [
            "no, the platform field is custitem_fw_platform",
            "Actually, use the other table",
            "remember that payouts settle on Fridays",
            "always include the currency column",
            "never show internal ids",
            "from now on, round to two decimals",
            "in the future use the Ordoro status",
            "don't use the legacy field",
            "when I say today I mean PST",
            "the rush flag is stored in custbody_rush",
            "use customrecord_inventory_processor for that",
            "that's wrong, it should be custcol_po_number",
        ] {
            assert!(has_correction_signal(message), "expected hit: {message}");
        }
    }

    #[test]
    fn ordinary_messages_do_not_hit() {
        for message in [
            "show me the last 10 sales orders",
            "how many invoices were created today?",
            "compare revenue month-over-month",
            "hello",
        ] {
            assert!(!has_correction_signal(message), "unexpected hit: {message}");
        }
    }

    #[test]
    fn parse_correction_extracts_embedded_json() {
        let text = "Here you go:\n{\"entity_correction\": {\"natural_name\": \"rush flag\", \
                    \"script_id\": \"custbody_rush\", \"entity_type\": \"transaction_body_field\"}, \
                    \"rule\": null}";
        let extracted = parse_correction(text).unwrap();
        let entity = extracted.entity_correction.unwrap();
        assert_eq!(entity.natural_name.as_deref(), Some("rush flag"));
        assert_eq!(entity.script_id.as_deref(), Some("custbody_rush"));
        assert!(extracted.rule.is_none());
    }

    #[test]
    fn parse_correction_rejects_garbage() {
        assert!(parse_correction("no braces here").is_none());
        assert!(parse_correction("{not valid json}").is_none());
    }
}
