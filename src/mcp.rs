// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Payment executor speaking MCP (JSON-RPC 2.0 over streamable HTTP).
//!
//! Each transfer becomes one `tools/call` on the payment agent's send tool,
//! with arguments `from`, `to`, `address` (the recipient again, for tools
//! that only know a destination), `amount` as a two decimal string, `token`
//! and `memo`.
//! The session, bearer token and resolved tool name are cached after the
//! first transfer; the locks guarding them are never held across a request.

use crate::base::round_cents;
use crate::error::{ExecutionError, SplitError};
use crate::settlement::{PaymentExecutor, Transfer};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";

/// Substrings that mark a tool as the payment tool when none is configured.
const PAYMENT_TOOL_KEYWORDS: [&str; 6] =
    ["send", "transfer", "pay", "payment", "transaction", "request"];

/// Client credentials for the payment agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    /// OAuth2 token endpoint. Without one, credentials go as HTTP basic auth.
    pub token_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ToolList {
    #[serde(default)]
    tools: Vec<ToolInfo>,
}

#[derive(Debug, Deserialize)]
struct ToolInfo {
    name: String,
}

#[derive(Debug)]
pub struct McpPaymentExecutor {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
    /// Explicit tool name; discovered through `tools/list` when `None`.
    tool: Option<String>,
    token_symbol: String,
    next_id: AtomicU64,
    access_token: Mutex<Option<String>>,
    session: Mutex<Option<Option<String>>>,
    resolved_tool: Mutex<Option<String>>,
}

impl McpPaymentExecutor {
    pub const DEFAULT_ENDPOINT: &'static str = "https://mcp.paywithlocus.com/mcp";

    pub fn new(endpoint: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            credentials,
            tool: None,
            token_symbol: "USDC".to_string(),
            next_id: AtomicU64::new(1),
            access_token: Mutex::new(None),
            session: Mutex::new(None),
            resolved_tool: Mutex::new(None),
        }
    }

    /// Uses `tool` instead of discovering one.
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Token symbol sent along with every transfer.
    pub fn token_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.token_symbol = symbol.into();
        self
    }

    /// Builds an executor from configuration.
    ///
    /// # Errors
    ///
    /// [`SplitError::Unavailable`] when the client id or secret is missing.
    pub fn from_settings(settings: &crate::settings::PaymentSettings) -> Result<Self, SplitError> {
        let (Some(client_id), Some(client_secret)) =
            (settings.client_id.clone(), settings.client_secret.clone())
        else {
            return Err(SplitError::Unavailable(
                "payment agent credentials are not configured".into(),
            ));
        };

        let mut executor = Self::new(
            settings.mcp_url.clone(),
            Credentials {
                client_id,
                client_secret,
                token_url: settings.token_url.clone(),
            },
        )
        .token_symbol(settings.token.clone());
        if let Some(tool) = &settings.tool {
            executor = executor.tool(tool.clone());
        }
        Ok(executor)
    }

    async fn bearer(&self) -> Result<Option<String>, ExecutionError> {
        let Some(token_url) = &self.credentials.token_url else {
            return Ok(None);
        };
        if let Some(token) = self.access_token.lock().clone() {
            return Ok(Some(token));
        }

        tracing::debug!(%token_url, "requesting payment agent token");
        let response = self
            .http
            .post(token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|err| ExecutionError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutionError::Transport(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|err| ExecutionError::Transport(err.to_string()))?
            .access_token;

        *self.access_token.lock() = Some(token.clone());
        Ok(Some(token))
    }

    /// Sends one JSON-RPC message. Returns the `result` member, or `Null`
    /// for notifications.
    async fn rpc(
        &self,
        method: &str,
        params: Value,
        session: Option<&str>,
        notification: bool,
    ) -> Result<(Value, Option<String>), ExecutionError> {
        let mut body = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if !notification {
            body["id"] = json!(id);
        }

        let mut request = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(&body);
        request = match self.bearer().await? {
            Some(token) => request.bearer_auth(token),
            None => request.basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            ),
        };
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ExecutionError::Transport(err.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Force a fresh token next time.
            self.access_token.lock().take();
        }
        if !status.is_success() {
            return Err(ExecutionError::Transport(format!(
                "{method} returned {status}"
            )));
        }

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let is_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        let text = response
            .text()
            .await
            .map_err(|err| ExecutionError::Transport(err.to_string()))?;

        if notification {
            return Ok((Value::Null, session_id));
        }
        let message = if is_stream {
            event_stream_message(&text, id)?
        } else {
            serde_json::from_str(&text)
                .map_err(|err| ExecutionError::Transport(format!("invalid JSON-RPC body: {err}")))?
        };
        Ok((rpc_result(message)?, session_id))
    }

    /// Performs the `initialize` handshake once and returns the session id.
    async fn session(&self) -> Result<Option<String>, ExecutionError> {
        if let Some(session) = self.session.lock().clone() {
            return Ok(session);
        }

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") },
        });
        let (_, session) = self.rpc("initialize", params, None, false).await?;
        self.rpc(
            "notifications/initialized",
            json!({}),
            session.as_deref(),
            true,
        )
        .await?;

        tracing::debug!(session = ?session, "payment agent session ready");
        *self.session.lock() = Some(session.clone());
        Ok(session)
    }

    async fn payment_tool(&self, session: Option<&str>) -> Result<String, ExecutionError> {
        if let Some(tool) = &self.tool {
            return Ok(tool.clone());
        }
        if let Some(tool) = self.resolved_tool.lock().clone() {
            return Ok(tool);
        }

        let (result, _) = self.rpc("tools/list", json!({}), session, false).await?;
        let tools: ToolList = serde_json::from_value(result)
            .map_err(|err| ExecutionError::Transport(format!("invalid tool list: {err}")))?;
        let tool = select_payment_tool(tools.tools.iter().map(|tool| tool.name.as_str()))
            .ok_or_else(|| {
                ExecutionError::Transport("payment agent exposes no payment tool".into())
            })?
            .to_string();

        tracing::info!(%tool, "using payment tool");
        *self.resolved_tool.lock() = Some(tool.clone());
        Ok(tool)
    }

    async fn send(&self, transfer: &Transfer) -> Result<String, ExecutionError> {
        let session = self.session().await?;
        let tool = self.payment_tool(session.as_deref()).await?;

        let amount = format!("{:.2}", round_cents(transfer.instruction.amount));
        let params = json!({
            "name": tool,
            "arguments": {
                "from": transfer.from_address,
                "to": transfer.to_address,
                "address": transfer.to_address,
                "amount": amount,
                "token": self.token_symbol,
                "memo": transfer.memo,
            },
        });

        let (result, _) = self.rpc("tools/call", params, session.as_deref(), false).await?;
        let text = tool_text(&result);
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return Err(ExecutionError::Rejected(text));
        }
        Ok(text)
    }
}

impl PaymentExecutor for McpPaymentExecutor {
    fn execute<'a>(&'a self, transfer: &'a Transfer) -> BoxFuture<'a, Result<String, ExecutionError>> {
        Box::pin(self.send(transfer))
    }
}

/// First tool whose name contains a payment keyword.
fn select_payment_tool<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    names.into_iter().find(|name| {
        let lower = name.to_lowercase();
        PAYMENT_TOOL_KEYWORDS
            .iter()
            .any(|keyword| lower.contains(keyword))
    })
}

/// Picks the JSON-RPC response with `id` out of an SSE body.
fn event_stream_message(body: &str, id: u64) -> Result<Value, ExecutionError> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .find(|message| message.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| ExecutionError::Transport("no response in event stream".into()))
}

fn rpc_result(message: Value) -> Result<Value, ExecutionError> {
    if let Some(error) = message.get("error") {
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(ExecutionError::Rejected(text));
    }
    message
        .get("result")
        .cloned()
        .ok_or_else(|| ExecutionError::Transport("JSON-RPC response without result".into()))
}

/// Concatenated text content of a tool result, or the raw JSON.
fn tool_text(result: &Value) -> String {
    let parts: Vec<&str> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|content| {
            content
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if parts.is_empty() {
        result.to_string()
    } else {
        parts.join("\n")
    }
}
