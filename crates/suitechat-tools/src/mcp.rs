// Remote tool transport: JSON-RPC over streaming HTTP to tenant MCP
// connectors.
//
// Remote tools are exposed to agents under synthetic names
// `ext__{connector_id}__{original_name}`. The client refreshes OAuth2
// tokens inside a 60-second pre-expiry window, persisting the rotated
// credentials on the connector row.

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use suitechat_contracts::ToolDefinition;
use suitechat_storage::{CredentialVault, Database, McpConnectorRow};

use crate::error::ToolError;

const SYNTHETIC_PREFIX: &str = "ext__";
const OAUTH_REFRESH_WINDOW_SECS: i64 = 60;

/// Build the synthetic tool name a connector tool is exposed under.
pub fn synthetic_name(connector_id: Uuid, tool_name: &str) -> String {
    format!("{SYNTHETIC_PREFIX}{connector_id}__{tool_name}")
}

/// Parse a synthetic tool name into (connector_id, original_name).
pub fn parse_synthetic_name(name: &str) -> Option<(Uuid, String)> {
    let rest = name.strip_prefix(SYNTHETIC_PREFIX)?;
    let (connector_part, tool_part) = rest.split_once("__")?;
    let connector_id = Uuid::parse_str(connector_part).ok()?;
    if tool_part.is_empty() {
        return None;
    }
    Some((connector_id, tool_part.to_string()))
}

/// Whether a tool name addresses a remote connector.
pub fn is_remote_tool(name: &str) -> bool {
    name.starts_with(SYNTHETIC_PREFIX)
}

/// Client for remote MCP servers.
#[derive(Clone, Default)]
pub struct McpClient {
    client: Client,
}

impl McpClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Discover the tools a connector's server exposes.
    pub async fn discover_tools(
        &self,
        connector: &McpConnectorRow,
        vault: &CredentialVault,
        db: &Database,
    ) -> Result<Vec<ToolDefinition>, ToolError> {
        let headers = self.build_headers(connector, vault, Some(db)).await?;
        let session = self.initialize(connector, &headers).await?;

        let result = self
            .rpc(connector, &headers, session.as_deref(), "tools/list", json!({}))
            .await?;

        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let definitions = tools
            .iter()
            .filter_map(|tool| {
                Some(ToolDefinition::new(
                    tool.get("name")?.as_str()?,
                    tool.get("description").and_then(Value::as_str).unwrap_or(""),
                    tool.get("inputSchema")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            server_url = %connector.server_url,
            tool_count = definitions.len(),
            "discovered remote tools"
        );
        Ok(definitions)
    }

    /// Call a tool on the connector's server and parse the result.
    pub async fn call_tool(
        &self,
        connector: &McpConnectorRow,
        tool_name: &str,
        params: Value,
        vault: &CredentialVault,
        db: &Database,
    ) -> Result<Value, ToolError> {
        let headers = self.build_headers(connector, vault, Some(db)).await?;
        let session = self.initialize(connector, &headers).await?;

        let result = self
            .rpc(
                connector,
                &headers,
                session.as_deref(),
                "tools/call",
                json!({"name": tool_name, "arguments": params}),
            )
            .await?;

        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let content = result
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if is_error {
            let text = first_text(&content).unwrap_or_else(|| result.to_string());
            warn!(
                server_url = %connector.server_url,
                tool_name = %tool_name,
                error = %text,
                "remote tool returned an error"
            );
            return Err(ToolError::Upstream(text));
        }

        let Some(text) = first_text(&content) else {
            return Ok(json!({"result": "No content returned"}));
        };
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({"result": text})))
    }

    /// Open a session: `initialize` and capture the session id header.
    async fn initialize(
        &self,
        connector: &McpConnectorRow,
        headers: &[(String, String)],
    ) -> Result<Option<String>, ToolError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "suitechat", "version": env!("CARGO_PKG_VERSION")},
            },
        });

        let mut request = self
            .client
            .post(&connector.server_url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::Upstream(format!("initialize failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Upstream(format!(
                "initialize returned {}",
                response.status()
            )));
        }

        let session = response
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(session)
    }

    async fn rpc(
        &self,
        connector: &McpConnectorRow,
        headers: &[(String, String)],
        session: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, ToolError> {
        let body = json!({"jsonrpc": "2.0", "id": 2, "method": method, "params": params});

        let mut request = self
            .client
            .post(&connector.server_url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(session_id) = session {
            request = request.header("Mcp-Session-Id", session_id);
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::Upstream(format!("{method} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Upstream(format!(
                "{method} returned {}",
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ToolError::Upstream(format!("{method} body read failed: {e}")))?;
        let envelope = parse_rpc_body(&text)
            .ok_or_else(|| ToolError::Upstream(format!("{method} returned an unparseable body")))?;

        if let Some(error) = envelope.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error");
            return Err(ToolError::Upstream(message.to_string()));
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| ToolError::Upstream(format!("{method} returned no result")))
    }

    /// Build auth headers from decrypted connector credentials.
    async fn build_headers(
        &self,
        connector: &McpConnectorRow,
        vault: &CredentialVault,
        db: Option<&Database>,
    ) -> Result<Vec<(String, String)>, ToolError> {
        let mut headers = Vec::new();

        let Some(encrypted) = &connector.encrypted_credentials else {
            return Ok(headers);
        };
        if connector.auth_type == "none" {
            return Ok(headers);
        }

        if connector.auth_type == "oauth2" {
            if let Some(token) = self.oauth2_token(connector, vault, db).await {
                headers.push(("Authorization".into(), format!("Bearer {token}")));
            }
            return Ok(headers);
        }

        let credentials = vault
            .decrypt_credentials(encrypted)
            .map_err(|e| ToolError::Upstream(format!("credential decrypt failed: {e}")))?;

        match connector.auth_type.as_str() {
            "bearer" => {
                let token = credentials
                    .get("access_token")
                    .or_else(|| credentials.get("token"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if !token.is_empty() {
                    headers.push(("Authorization".into(), format!("Bearer {token}")));
                }
            }
            "api_key" => {
                let api_key = credentials
                    .get("api_key")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let header_name = credentials
                    .get("header_name")
                    .and_then(Value::as_str)
                    .unwrap_or("X-API-Key");
                if !api_key.is_empty() {
                    headers.push((header_name.to_string(), api_key.to_string()));
                }
            }
            _ => {}
        }

        Ok(headers)
    }

    /// Valid OAuth2 access token, refreshed when inside the pre-expiry
    /// window. A failed refresh returns the stale token as a last resort.
    async fn oauth2_token(
        &self,
        connector: &McpConnectorRow,
        vault: &CredentialVault,
        db: Option<&Database>,
    ) -> Option<String> {
        let encrypted = connector.encrypted_credentials.as_ref()?;
        let mut credentials = vault.decrypt_credentials(encrypted).ok()?;
        let access_token = credentials.get("access_token")?.as_str()?.to_string();

        let expires_at = credentials
            .get("expires_at")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if Utc::now().timestamp() < expires_at - OAUTH_REFRESH_WINDOW_SECS {
            return Some(access_token);
        }

        let (Some(refresh_token), Some(token_url), Some(client_id)) = (
            credentials.get("refresh_token").and_then(Value::as_str).map(str::to_string),
            credentials.get("token_url").and_then(Value::as_str).map(str::to_string),
            credentials.get("client_id").and_then(Value::as_str).map(str::to_string),
        ) else {
            warn!(connector_id = %connector.id, "missing refresh fields; using stale token");
            return Some(access_token);
        };
        let Some(db) = db else {
            warn!(connector_id = %connector.id, "no db handle for refresh; using stale token");
            return Some(access_token);
        };

        let response = self
            .client
            .post(&token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
            ])
            .send()
            .await;

        let token_data: Value = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(data) => data,
                Err(e) => {
                    warn!(connector_id = %connector.id, error = %e, "token refresh parse failed");
                    return Some(access_token);
                }
            },
            Ok(resp) => {
                warn!(connector_id = %connector.id, status = %resp.status(), "token refresh rejected");
                return Some(access_token);
            }
            Err(e) => {
                warn!(connector_id = %connector.id, error = %e, "token refresh failed");
                return Some(access_token);
            }
        };

        let new_access = token_data
            .get("access_token")
            .and_then(Value::as_str)
            .unwrap_or(&access_token)
            .to_string();
        let expires_in = token_data
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(3600);

        credentials["access_token"] = json!(new_access);
        if let Some(new_refresh) = token_data.get("refresh_token").and_then(Value::as_str) {
            credentials["refresh_token"] = json!(new_refresh);
        }
        credentials["expires_at"] = json!(Utc::now().timestamp() + expires_in);

        match vault.encrypt_credentials(&credentials) {
            Ok(sealed) => {
                if let Err(e) = db.update_connector_credentials(connector.id, &sealed).await {
                    warn!(connector_id = %connector.id, error = %e, "failed to persist rotated token");
                }
            }
            Err(e) => {
                warn!(connector_id = %connector.id, error = %e, "failed to seal rotated token");
            }
        }

        info!(connector_id = %connector.id, "oauth2 token refreshed");
        Some(new_access)
    }
}

/// Discover a connector's tools and cache the descriptors on its row.
/// Called when a connector is registered or refreshed; returns the tools
/// under their synthetic `ext__` names, ready to hand to an agent.
pub async fn discover_and_cache(
    client: &McpClient,
    db: &Database,
    vault: &CredentialVault,
    tenant_id: Uuid,
    connector_id: Uuid,
) -> Result<Vec<ToolDefinition>, ToolError> {
    let connector = db
        .get_connector(tenant_id, connector_id)
        .await
        .map_err(ToolError::Internal)?
        .ok_or_else(|| ToolError::Failed(format!("connector {connector_id} not found")))?;

    let discovered = client.discover_tools(&connector, vault, db).await?;
    let cached = serde_json::to_value(&discovered).unwrap_or(Value::Null);
    db.cache_connector_tools(connector_id, &cached)
        .await
        .map_err(ToolError::Internal)?;

    Ok(discovered
        .into_iter()
        .map(|tool| ToolDefinition {
            name: synthetic_name(connector_id, &tool.name),
            ..tool
        })
        .collect())
}

/// Remote tool definitions for every active connector, from the cached
/// descriptors, under their synthetic names.
pub async fn remote_tool_definitions(
    db: &Database,
    tenant_id: Uuid,
) -> Result<Vec<ToolDefinition>, ToolError> {
    let connectors = db
        .list_active_connectors(tenant_id)
        .await
        .map_err(ToolError::Internal)?;

    let mut definitions = Vec::new();
    for connector in connectors {
        let Some(cached) = &connector.cached_tools else {
            continue;
        };
        let Ok(tools) = serde_json::from_value::<Vec<ToolDefinition>>(cached.clone()) else {
            continue;
        };
        definitions.extend(tools.into_iter().map(|tool| ToolDefinition {
            name: synthetic_name(connector.id, &tool.name),
            ..tool
        }));
    }
    Ok(definitions)
}

/// Accept plain JSON bodies and single-event SSE bodies.
fn parse_rpc_body(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    for line in text.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            if let Ok(value) = serde_json::from_str(data.trim()) {
                return Some(value);
            }
        }
    }
    None
}

fn first_text(content: &[Value]) -> Option<String> {
    content
        .iter()
        .find_map(|block| block.get("text").and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_names_round_trip() {
        let connector_id = Uuid::now_v7();
        let name = synthetic_name(connector_id, "export_report");
        assert!(is_remote_tool(&name));
        let (parsed_id, tool) = parse_synthetic_name(&name).unwrap();
        assert_eq!(parsed_id, connector_id);
        assert_eq!(tool, "export_report");
    }

    #[test]
    fn tool_names_with_double_underscores_survive_parsing() {
        let connector_id = Uuid::now_v7();
        let name = synthetic_name(connector_id, "ns__run_query");
        let (_, tool) = parse_synthetic_name(&name).unwrap();
        assert_eq!(tool, "ns__run_query");
    }

    #[test]
    fn malformed_synthetic_names_are_rejected() {
        assert!(parse_synthetic_name("rag_search").is_none());
        assert!(parse_synthetic_name("ext__not-a-uuid__tool").is_none());
        assert!(parse_synthetic_name(&format!("ext__{}__", Uuid::now_v7())).is_none());
    }

    #[test]
    fn rpc_body_parser_accepts_json_and_sse() {
        let plain = r#"{"jsonrpc":"2.0","id":2,"result":{"ok":true}}"#;
        assert!(parse_rpc_body(plain).is_some());

        let sse = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"ok\":true}}\n\n";
        let parsed = parse_rpc_body(sse).unwrap();
        assert_eq!(parsed["result"]["ok"], true);

        assert!(parse_rpc_body("not json at all").is_none());
    }
}
