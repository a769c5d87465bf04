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

//! Application settings.
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. `receipt_split.toml` in the working directory (optional)
//! 3. `RECEIPT_SPLIT__<SECTION>__<KEY>` environment variables, after `.env`
//!    has been loaded
//!
//! ```toml
//! [app]
//! level = "debug"
//!
//! [payments]
//! client_id = "..."
//! client_secret = "..."
//!
//! [[wallets]]
//! name = "Alice"
//! address = "0x1111"
//!
//! [[wallets]]
//! name = "Bob"
//! address = "0x2222"
//! ```
//!
//! Credentials left unset are only reported when the collaborator needing
//! them is used.

use crate::llm::OpenAiClient;
use crate::mcp::McpPaymentExecutor;
use crate::settlement::{AddressBook, DEFAULT_MAX_IN_FLIGHT};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const DEFAULT_FILE: &str = "receipt_split";
const ENV_PREFIX: &str = "RECEIPT_SPLIT";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Log level for this crate's targets.
    pub level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    /// Browser origins allowed to call the API. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub vision_model: String,
    pub reasoning_model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OpenAiClient::DEFAULT_BASE_URL.to_string(),
            vision_model: crate::parser::VisionReceiptParser::DEFAULT_MODEL.to_string(),
            reasoning_model: crate::negotiation::OpenAiReasoner::DEFAULT_MODEL.to_string(),
        }
    }
}

impl OpenAiSettings {
    /// Client for the configured endpoint, or `None` without an API key.
    pub fn client(&self) -> Option<OpenAiClient> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| OpenAiClient::new(key, self.base_url.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub mcp_url: String,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Payment tool name; discovered from the agent when unset.
    pub tool: Option<String>,
    pub token: String,
    pub max_in_flight: usize,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            mcp_url: McpPaymentExecutor::DEFAULT_ENDPOINT.to_string(),
            token_url: None,
            client_id: None,
            client_secret: None,
            tool: None,
            token: "USDC".to_string(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Payment address of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Wallet {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub server: ServerSettings,
    pub openai: OpenAiSettings,
    pub payments: PaymentSettings,
    pub wallets: Vec<Wallet>,
}

impl Settings {
    /// Loads `.env`, the optional settings file and the environment.
    pub fn new() -> Result<Self, ConfigError> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .add_source(File::with_name(DEFAULT_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )
            .build()?;

        let mut settings: Self = config.try_deserialize()?;
        settings.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Parses settings from TOML text alone.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Fills unset credentials from the plain variable names used by
    /// earlier deployments (`OPENAI_API_KEY`, `AGENT_CLIENT_ID`,
    /// `AGENT_CLIENT_SECRET`).
    fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.openai.api_key.is_none() {
            self.openai.api_key = lookup("OPENAI_API_KEY");
        }
        if self.payments.client_id.is_none() {
            self.payments.client_id = lookup("AGENT_CLIENT_ID");
        }
        if self.payments.client_secret.is_none() {
            self.payments.client_secret = lookup("AGENT_CLIENT_SECRET");
        }
    }

    pub fn address_book(&self) -> AddressBook {
        self.wallets
            .iter()
            .fold(AddressBook::new(), |book, wallet| {
                book.with(wallet.name.clone(), wallet.address.clone())
            })
    }

    /// `tracing` filter directive for this crate.
    pub fn log_filter(&self) -> String {
        format!("receipt_split={}", self.app.level)
    }
}
