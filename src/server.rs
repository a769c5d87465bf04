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

//! REST API over the splitting core.
//!
//! ## Endpoints
//!
//! - `GET /` - Banner
//! - `POST /upload-receipt` - Raw image body, returns the extracted items
//! - `POST /split` - Bill JSON, returns totals, owed amounts and instructions
//! - `POST /request-payment` - Owed amounts and payer, settles through the payment agent
//! - `POST /negotiate` - Two stances and the receipt, returns the negotiated split
//!
//! Amounts are written as decimal strings. Request amounts may be strings or
//! plain JSON numbers.
//!
//! Browser origins listed in `server.cors_origins` get CORS headers, and their
//! preflight requests are answered directly.
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:8000/split \
//!   -H "Content-Type: application/json" \
//!   -d '{"items": [{"id": "1", "quantity": 1, "name": "Coffee", "price": "4.00", "assignedTo": "Alice"}],
//!        "people": [{"id": "p1", "name": "Alice"}, {"id": "p2", "name": "Bob"}],
//!        "paidBy": "Bob", "taxPercent": "10", "tipPercent": "20"}'
//! ```

use crate::allocation::{BillTotals, OwedMap, compute_owed};
use crate::bill::BillContext;
use crate::error::{ParseError, SplitError, ValidationError};
use crate::item::Item;
use crate::mcp::McpPaymentExecutor;
use crate::negotiation::{
    NegotiationBuilder, NegotiationOutcome, NegotiationRequest, OpenAiReasoner,
    ReasoningCollaborator,
};
use crate::parser::{ReceiptParser, VisionReceiptParser, extract_items};
use crate::participant::Participant;
use crate::settings::Settings;
use crate::settlement::{
    AddressBook, DEFAULT_MAX_IN_FLIGHT, PaymentExecutor, PaymentInstruction, Settlement,
    TransactionResult, instructions_from_owed,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub message: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRequest {
    pub items: Vec<Item>,
    pub people: Vec<Participant>,
    #[serde(default)]
    pub paid_by: Option<String>,
    #[serde(default, deserialize_with = "crate::base::deserialize_amount")]
    pub tax_percent: Decimal,
    #[serde(default, deserialize_with = "crate::base::deserialize_amount")]
    pub tip_percent: Decimal,
}

/// `instructions` is empty without a payer.
#[derive(Debug, Serialize)]
pub struct SplitResponse {
    #[serde(flatten)]
    pub totals: BillTotals,
    pub owed: OwedMap,
    pub instructions: Vec<PaymentInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub paid_by: String,
    #[serde(deserialize_with = "crate::base::deserialize_amounts")]
    pub owed_amounts: HashMap<String, Decimal>,
    /// Participant order for the instructions; unlisted names follow
    /// alphabetically.
    #[serde(default)]
    pub people: Vec<Participant>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub transactions: Vec<TransactionResult>,
    pub total_processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Collaborators left as `None` make their endpoints answer 503.
#[derive(Clone)]
pub struct AppState {
    pub parser: Option<Arc<dyn ReceiptParser>>,
    pub executor: Option<Arc<dyn PaymentExecutor>>,
    pub reasoner: Option<Arc<dyn ReasoningCollaborator>>,
    pub addresses: Arc<AddressBook>,
    pub max_in_flight: usize,
    pub cors_origins: Arc<Vec<String>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            parser: None,
            executor: None,
            reasoner: None,
            addresses: Arc::new(AddressBook::new()),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            cors_origins: Arc::new(Vec::new()),
        }
    }
}

impl AppState {
    /// Wires every collaborator the settings have credentials for.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut state = Self {
            addresses: Arc::new(settings.address_book()),
            max_in_flight: settings.payments.max_in_flight,
            cors_origins: Arc::new(settings.server.cors_origins.clone()),
            ..Self::default()
        };

        match settings.openai.client() {
            Some(client) => {
                state.parser = Some(Arc::new(VisionReceiptParser::new(
                    client.clone(),
                    settings.openai.vision_model.clone(),
                )));
                state.reasoner = Some(Arc::new(OpenAiReasoner::new(
                    client,
                    settings.openai.reasoning_model.clone(),
                )));
            }
            None => tracing::warn!("no OpenAI API key; receipt upload and negotiation disabled"),
        }

        match McpPaymentExecutor::from_settings(&settings.payments) {
            Ok(executor) => state.executor = Some(Arc::new(executor)),
            Err(err) => tracing::warn!(%err, "payment requests disabled"),
        }

        tracing::info!(wallets = state.addresses.len(), "application state ready");
        state
    }
}

// === Error Handling ===

/// Wrapper for converting `SplitError` into HTTP responses.
pub struct AppError(SplitError);

impl From<SplitError> for AppError {
    fn from(err: SplitError) -> Self {
        AppError(err)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            SplitError::Validation(err) => (
                StatusCode::BAD_REQUEST,
                match err {
                    ValidationError::NegativePrice
                    | ValidationError::InvalidPrice(_)
                    | ValidationError::PriceTooLarge(_) => "INVALID_PRICE",
                    ValidationError::NegativePercent | ValidationError::PercentTooLarge(_) => {
                        "INVALID_PERCENT"
                    }
                    ValidationError::InvalidQuantity(_) => "INVALID_QUANTITY",
                    ValidationError::DuplicateItem(_) => "DUPLICATE_ITEM",
                    ValidationError::EmptyName => "EMPTY_NAME",
                    ValidationError::DuplicateParticipant(_) => "DUPLICATE_PARTICIPANT",
                    ValidationError::UnknownParticipant(_) => "UNKNOWN_PARTICIPANT",
                    ValidationError::UnknownItem(_) => "UNKNOWN_ITEM",
                    ValidationError::MissingPayer => "MISSING_PAYER",
                    ValidationError::EmptyImage => "EMPTY_IMAGE",
                    ValidationError::NegativeAmount | ValidationError::AmountMismatch { .. } => {
                        "INVALID_NEGOTIATION"
                    }
                },
            ),
            SplitError::Parse(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                match err {
                    ParseError::InvalidQuantity { .. } | ParseError::InvalidPrice { .. } => {
                        "UNREADABLE_ITEM"
                    }
                    ParseError::MissingField(_)
                    | ParseError::UnknownPerson(_)
                    | ParseError::Malformed(_) => "MALFORMED_RESPONSE",
                },
            ),
            SplitError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn unavailable(what: &str) -> AppError {
    AppError(SplitError::Unavailable(format!("{what} is not configured")))
}

// === Handlers ===

/// GET / - Banner.
async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Receipt split API is running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /upload-receipt - Extract items from a receipt image.
async fn upload_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let parser = state
        .parser
        .as_deref()
        .ok_or_else(|| unavailable("receipt parser"))?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let items = extract_items(parser, &body, content_type).await?;
    Ok(Json(UploadResponse {
        success: true,
        items,
    }))
}

/// POST /split - Compute totals and what everyone owes.
async fn split(Json(request): Json<SplitRequest>) -> Result<Json<SplitResponse>, AppError> {
    let bill = BillContext::from_parts(
        request.items,
        request.people,
        request.paid_by.as_deref(),
        request.tax_percent,
        request.tip_percent,
    )?;

    let owed = compute_owed(&bill);
    let instructions = match bill.payer() {
        Some(payer) => instructions_from_owed(&owed, payer)?,
        None => Vec::new(),
    };

    Ok(Json(SplitResponse {
        totals: bill.totals(),
        owed,
        instructions,
    }))
}

/// POST /request-payment - Settle owed amounts with the payer.
async fn request_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let executor = state
        .executor
        .as_deref()
        .ok_or_else(|| unavailable("payment executor"))?;

    let owed = ordered_owed(request.owed_amounts, &request.people);
    let instructions = instructions_from_owed(&owed, &request.paid_by)?;

    let report = Settlement::new(executor, &state.addresses)
        .max_in_flight(state.max_in_flight)
        .settle(&instructions)
        .await;

    Ok(Json(PaymentResponse {
        success: true,
        total_processed: report.total(),
        succeeded: report.succeeded(),
        failed: report.failed(),
        transactions: report.into_transactions(),
    }))
}

/// POST /negotiate - Let two participants argue out their shares.
async fn negotiate(
    State(state): State<AppState>,
    Json(request): Json<NegotiationRequest>,
) -> Result<Json<NegotiationOutcome>, AppError> {
    let reasoner = state
        .reasoner
        .as_deref()
        .ok_or_else(|| unavailable("reasoning collaborator"))?;

    let outcome = NegotiationBuilder::new(reasoner).negotiate(&request).await?;
    Ok(Json(outcome))
}

/// Orders owed amounts by `people`, then alphabetically for the rest.
fn ordered_owed(mut amounts: HashMap<String, Decimal>, people: &[Participant]) -> OwedMap {
    let mut ordered: Vec<(String, Decimal)> = people
        .iter()
        .filter_map(|person| amounts.remove_entry(&person.name))
        .collect();
    let mut rest: Vec<(String, Decimal)> = amounts.into_iter().collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    ordered.extend(rest);
    ordered.into_iter().collect()
}

// === CORS ===

async fn cors(State(origins): State<Arc<Vec<String>>>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .filter(|origin| {
            origin.to_str().is_ok_and(|origin| {
                origins
                    .iter()
                    .any(|allowed| allowed == "*" || allowed == origin)
            })
        })
        .cloned();

    let mut response = match &origin {
        Some(_) if request.method() == Method::OPTIONS => StatusCode::NO_CONTENT.into_response(),
        _ => next.run(request).await,
    };

    if let Some(origin) = origin {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("content-type, authorization"),
        );
        headers.insert(header::VARY, HeaderValue::from_static("origin"));
    }
    response
}

// === Router ===

pub fn router(state: AppState) -> Router {
    let origins = state.cors_origins.clone();
    Router::new()
        .route("/", get(banner))
        .route("/upload-receipt", post(upload_receipt))
        .route("/split", post(split))
        .route("/request-payment", post(request_payment))
        .route("/negotiate", post(negotiate))
        .with_state(state)
        .layer(middleware::from_fn_with_state(origins, cors))
}

/// Serves the API on `listener` until the process stops.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "receipt split API listening");
    }
    axum::serve(listener, router(state)).await
}
