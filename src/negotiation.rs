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

//! Negotiated two-way split.
//!
//! Person 3 paid the whole bill upfront. Persons 1 and 2 each state a stance
//! in free text; a reasoning model writes a short negotiation and decides how
//! the total divides between them. Person 3 is then reimbursed in full.
//!
//! The model is called exactly once. Its answer must be a JSON object:
//!
//! ```json
//! {
//!   "transcript": [{ "person": 1, "message": "..." }],
//!   "finalAmounts": { "person1": 6.00, "person2": 3.24 }
//! }
//! ```
//!
//! Amounts that are negative or do not sum to the total are rejected, never
//! adjusted.

use crate::allocation::BillTotals;
use crate::base::{check_percent, check_price, round_cents};
use crate::error::{ParseError, SplitError, ValidationError};
use crate::item::ParsedItem;
use crate::llm::{ChatMessage, ChatRequest, OpenAiClient, strip_code_fence};
use crate::settlement::PaymentInstruction;
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;

/// Largest accepted gap between the negotiated sum and the bill total.
pub const AMOUNT_TOLERANCE: Decimal = dec!(0.01);

/// One of the two negotiating participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negotiator {
    pub name: String,
    pub stance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationRequest {
    pub items: Vec<ParsedItem>,
    #[serde(deserialize_with = "crate::base::deserialize_amount")]
    pub tax_percent: Decimal,
    #[serde(deserialize_with = "crate::base::deserialize_amount")]
    pub tip_percent: Decimal,
    /// Persons 1 and 2.
    pub negotiators: [Negotiator; 2],
    /// Person 3, who paid the bill.
    pub payer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// 1, 2 or 3.
    pub person: u8,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAmounts {
    pub person1: Decimal,
    pub person2: Decimal,
}

impl FinalAmounts {
    pub fn sum(&self) -> Decimal {
        self.person1.saturating_add(self.person2)
    }

    /// Checks both amounts are non-negative and add up to `total`
    /// within [`AMOUNT_TOLERANCE`].
    pub fn validate(&self, total: Decimal) -> Result<(), ValidationError> {
        if self.person1 < Decimal::ZERO || self.person2 < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount);
        }
        if self.sum().saturating_sub(total).abs() > AMOUNT_TOLERANCE {
            return Err(ValidationError::AmountMismatch {
                expected: round_cents(total),
                actual: self.sum(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationOutcome {
    pub transcript: Vec<Turn>,
    pub final_amounts: FinalAmounts,
    pub total: Decimal,
}

impl NegotiationOutcome {
    /// Persons 1 and 2 each reimburse the payer their negotiated amount.
    pub fn instructions(&self, request: &NegotiationRequest) -> Vec<PaymentInstruction> {
        let [first, second] = &request.negotiators;
        [
            (first, self.final_amounts.person1),
            (second, self.final_amounts.person2),
        ]
        .into_iter()
        .map(|(negotiator, amount)| (negotiator, round_cents(amount)))
        .filter(|(_, amount)| *amount > Decimal::ZERO)
        .map(|(negotiator, amount)| {
            PaymentInstruction::new(negotiator.name.clone(), request.payer.clone(), amount)
        })
        .collect()
    }
}

/// Writes the negotiation for a prompt.
pub trait ReasoningCollaborator: Send + Sync {
    fn reason<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, SplitError>>;
}

/// Assembles the negotiation prompt, calls the collaborator once and
/// validates what comes back.
pub struct NegotiationBuilder<'a, R: ReasoningCollaborator + ?Sized> {
    reasoner: &'a R,
}

impl<'a, R: ReasoningCollaborator + ?Sized> NegotiationBuilder<'a, R> {
    pub fn new(reasoner: &'a R) -> Self {
        Self { reasoner }
    }

    /// Runs the negotiation.
    ///
    /// # Errors
    ///
    /// - [`SplitError::Validation`] - bad request (checked before the call)
    ///   or amounts that fail [`FinalAmounts::validate`].
    /// - [`SplitError::Parse`] - the answer is not the expected JSON shape.
    /// - [`SplitError::Unavailable`] - the collaborator could not be reached.
    pub async fn negotiate(
        &self,
        request: &NegotiationRequest,
    ) -> Result<NegotiationOutcome, SplitError> {
        validate_request(request)?;

        let subtotal = request
            .items
            .iter()
            .fold(Decimal::ZERO, |sum, item| sum.saturating_add(item.price));
        let totals = BillTotals::compute(subtotal, request.tax_percent, request.tip_percent);
        let prompt = render_prompt(request, &totals);

        tracing::info!(total = %round_cents(totals.total), "starting negotiation");
        let answer = self.reasoner.reason(&prompt).await?;
        let outcome = parse_outcome(&answer, totals.total)?;
        tracing::info!(
            person1 = %outcome.final_amounts.person1,
            person2 = %outcome.final_amounts.person2,
            turns = outcome.transcript.len(),
            "negotiation settled"
        );
        Ok(outcome)
    }
}

fn validate_request(request: &NegotiationRequest) -> Result<(), ValidationError> {
    check_percent(request.tax_percent)?;
    check_percent(request.tip_percent)?;
    for item in &request.items {
        check_price(item.price)?;
    }

    let names = [
        request.negotiators[0].name.trim(),
        request.negotiators[1].name.trim(),
        request.payer.trim(),
    ];
    if names.iter().any(|name| name.is_empty()) {
        return Err(ValidationError::EmptyName);
    }
    for (index, name) in names.iter().enumerate() {
        if names[..index].contains(name) {
            return Err(ValidationError::DuplicateParticipant(name.to_string()));
        }
    }
    Ok(())
}

fn render_prompt(request: &NegotiationRequest, totals: &BillTotals) -> String {
    let [first, second] = &request.negotiators;
    let items: String = request
        .items
        .iter()
        .map(|item| format!("- {} x{}: {}\n", item.name, item.quantity, item.price))
        .collect();
    let total = cents(totals.total);

    format!(
        "Three friends shared a meal. Person 3 ({payer}) already paid the whole bill.\n\
         Person 1 ({first}) and Person 2 ({second}) must together reimburse exactly the total.\n\n\
         Items:\n\
         {items}\n\
         Subtotal: {subtotal}\n\
         Tax ({tax_percent}%): {tax}\n\
         Tip ({tip_percent}%): {tip}\n\
         Total: {total}\n\n\
         Person 1 stance: {first_stance}\n\
         Person 2 stance: {second_stance}\n\n\
         Write a short negotiation between persons 1, 2 and 3 and decide how much \
         persons 1 and 2 each pay. Answer with a JSON object only, shaped as \
         {{\"transcript\": [{{\"person\": 1, \"message\": \"...\"}}], \
         \"finalAmounts\": {{\"person1\": 0.00, \"person2\": 0.00}}}}. \
         person1 + person2 must equal {total} and neither may be negative.",
        payer = request.payer,
        first = first.name,
        second = second.name,
        subtotal = cents(totals.subtotal),
        tax_percent = request.tax_percent,
        tax = cents(totals.tax),
        tip_percent = request.tip_percent,
        tip = cents(totals.tip),
        first_stance = first.stance.trim(),
        second_stance = second.stance.trim(),
    )
}

/// Two decimal places, rounded the same way as every other amount.
fn cents(amount: Decimal) -> String {
    format!("{:.2}", round_cents(amount))
}

#[derive(Debug, Deserialize)]
struct RawOutcome {
    transcript: Option<Vec<RawTurn>>,
    #[serde(rename = "finalAmounts")]
    final_amounts: Option<RawAmounts>,
}

#[derive(Debug, Deserialize)]
struct RawTurn {
    person: u64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawAmounts {
    person1: Option<Value>,
    person2: Option<Value>,
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => {
            let text = number.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

fn amount(value: Option<&Value>, field: &'static str) -> Result<Decimal, ParseError> {
    let value = value.ok_or(ParseError::MissingField(field))?;
    decimal_from_value(value)
        .ok_or_else(|| ParseError::Malformed(format!("{field} is not a number: {value}")))
}

/// Reads the collaborator's answer and validates it against `total`.
///
/// Accepts the JSON object on its own, inside a code fence, or surrounded by
/// prose.
pub fn parse_outcome(answer: &str, total: Decimal) -> Result<NegotiationOutcome, SplitError> {
    let text = strip_code_fence(answer);
    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(ParseError::Malformed("no JSON object in answer".into()).into()),
    };
    let raw: RawOutcome =
        serde_json::from_str(json).map_err(|err| ParseError::Malformed(err.to_string()))?;

    let transcript = raw
        .transcript
        .ok_or(ParseError::MissingField("transcript"))?
        .into_iter()
        .map(|turn| match turn.person {
            1..=3 => Ok(Turn {
                person: turn.person as u8,
                message: turn.message,
            }),
            other => Err(ParseError::UnknownPerson(other)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let amounts = raw
        .final_amounts
        .ok_or(ParseError::MissingField("finalAmounts"))?;
    let final_amounts = FinalAmounts {
        person1: amount(amounts.person1.as_ref(), "finalAmounts.person1")?,
        person2: amount(amounts.person2.as_ref(), "finalAmounts.person2")?,
    };
    final_amounts.validate(total)?;

    Ok(NegotiationOutcome {
        transcript,
        final_amounts,
        total,
    })
}

/// Reasoning collaborator backed by an OpenAI chat model in JSON mode.
#[derive(Debug, Clone)]
pub struct OpenAiReasoner {
    client: OpenAiClient,
    model: String,
}

impl OpenAiReasoner {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    async fn ask(&self, prompt: &str) -> Result<String, SplitError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: json!("You mediate bill-splitting negotiations and answer in JSON."),
                },
                ChatMessage {
                    role: "user",
                    content: json!(prompt),
                },
            ],
            response_format: Some(json!({ "type": "json_object" })),
        };
        self.client.complete(&request).await
    }
}

impl ReasoningCollaborator for OpenAiReasoner {
    fn reason<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, SplitError>> {
        Box::pin(self.ask(prompt))
    }
}
