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

//! Minimal OpenAI chat-completions client.

use crate::error::{ParseError, SplitError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    /// Plain string or an array of content parts.
    pub content: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), api_key, base_url)
    }

    pub fn with_http(
        http: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Sends one chat completion and returns the first choice's text.
    ///
    /// # Errors
    ///
    /// - [`SplitError::Unavailable`] - transport failure or non-2xx status.
    /// - [`SplitError::Parse`] - the response carried no message content.
    pub(crate) async fn complete(&self, request: &ChatRequest<'_>) -> Result<String, SplitError> {
        tracing::debug!(model = request.model, "sending chat completion");

        let response = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| SplitError::Unavailable(format!("openai request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SplitError::Unavailable(format!(
                "openai returned {status}: {message}"
            )));
        }

        let body = response
            .json::<ChatResponse>()
            .await
            .map_err(|err| ParseError::Malformed(format!("openai response: {err}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(SplitError::Parse(ParseError::MissingField("choices[0].message.content")))
    }
}

/// Strips a surrounding Markdown code fence, if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("csv", "json") on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fence_handles_plain_and_fenced_text() {
        assert_eq!(strip_code_fence("  a,1,2  "), "a,1,2");
        assert_eq!(strip_code_fence("```csv\na,1,2\nb,1,3\n```"), "a,1,2\nb,1,3");
        assert_eq!(strip_code_fence("```\n{\"x\":1}\n```\n"), "{\"x\":1}");
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = OpenAiClient::new("key", "http://localhost:9000/v1/");
        assert_eq!(
            client.url("/chat/completions"),
            "http://localhost:9000/v1/chat/completions"
        );
    }
}
