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

//! Negotiation transcript builder integration tests with a canned reasoner.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use receipt_split::{
    NegotiationBuilder, NegotiationRequest, Negotiator, ParseError, ParsedItem,
    ReasoningCollaborator, SplitError, ValidationError, negotiation::parse_outcome,
};
use rust_decimal_macros::dec;

/// Answers every prompt with the same text and keeps the prompts it saw.
struct CannedReasoner {
    answer: Result<String, SplitError>,
    prompts: Mutex<Vec<String>>,
}

impl CannedReasoner {
    fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn unavailable() -> Self {
        Self {
            answer: Err(SplitError::Unavailable("openai returned 503".into())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

impl ReasoningCollaborator for CannedReasoner {
    fn reason<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, SplitError>> {
        self.prompts.lock().push(prompt.to_string());
        let answer = self.answer.clone();
        Box::pin(async move { answer })
    }
}

fn make_request() -> NegotiationRequest {
    NegotiationRequest {
        items: vec![
            ParsedItem::new("Coffee", 1, dec!(4.00)),
            ParsedItem::new("Muffin", 1, dec!(3.00)),
        ],
        tax_percent: dec!(10),
        tip_percent: dec!(20),
        negotiators: [
            Negotiator {
                name: "Alice".into(),
                stance: "I only had the coffee.".into(),
            },
            Negotiator {
                name: "Bob".into(),
                stance: "The muffin was shared.".into(),
            },
        ],
        payer: "Carol".into(),
    }
}

fn make_answer(person1: &str, person2: &str) -> String {
    format!(
        r#"{{
            "transcript": [
                {{"person": 1, "message": "I just had a coffee."}},
                {{"person": 2, "message": "You had half my muffin!"}},
                {{"person": 3, "message": "Sort it out, I paid 9.24."}}
            ],
            "finalAmounts": {{"person1": {person1}, "person2": {person2}}}
        }}"#
    )
}

#[tokio::test]
async fn balanced_amounts_pass() {
    let reasoner = CannedReasoner::answering(&make_answer("6.00", "3.24"));

    let outcome = NegotiationBuilder::new(&reasoner)
        .negotiate(&make_request())
        .await
        .unwrap();

    assert_eq!(reasoner.calls(), 1);
    assert_eq!(outcome.transcript.len(), 3);
    assert_eq!(outcome.transcript[2].person, 3);
    assert_eq!(outcome.final_amounts.person1, dec!(6.00));
    assert_eq!(outcome.final_amounts.person2, dec!(3.24));
    assert_eq!(outcome.total, dec!(9.24));

    let instructions = outcome.instructions(&make_request());
    assert_eq!(instructions.len(), 2);
    assert_eq!(instructions[0].from, "Alice");
    assert_eq!(instructions[1].to, "Carol");
}

#[tokio::test]
async fn unbalanced_amounts_are_a_validation_error() {
    let reasoner = CannedReasoner::answering(&make_answer("6.00", "2.00"));

    let result = NegotiationBuilder::new(&reasoner)
        .negotiate(&make_request())
        .await;

    assert_eq!(
        result,
        Err(SplitError::Validation(ValidationError::AmountMismatch {
            expected: dec!(9.24),
            actual: dec!(8.00),
        }))
    );
    assert_eq!(reasoner.calls(), 1);
}

#[tokio::test]
async fn amounts_within_a_cent_are_accepted() {
    let reasoner = CannedReasoner::answering(&make_answer("6.005", "3.24"));
    let outcome = NegotiationBuilder::new(&reasoner)
        .negotiate(&make_request())
        .await
        .unwrap();
    assert_eq!(outcome.final_amounts.sum(), dec!(9.245));
}

#[tokio::test]
async fn negative_amount_is_rejected() {
    let reasoner = CannedReasoner::answering(&make_answer("10.24", "-1.00"));
    let result = NegotiationBuilder::new(&reasoner)
        .negotiate(&make_request())
        .await;
    assert_eq!(
        result,
        Err(SplitError::Validation(ValidationError::NegativeAmount))
    );
}

#[tokio::test]
async fn invalid_request_never_reaches_the_reasoner() {
    let reasoner = CannedReasoner::answering(&make_answer("6.00", "3.24"));

    let mut request = make_request();
    request.negotiators[1].name = "  ".into();
    let result = NegotiationBuilder::new(&reasoner).negotiate(&request).await;
    assert_eq!(result, Err(SplitError::Validation(ValidationError::EmptyName)));

    let mut request = make_request();
    request.tip_percent = dec!(-15);
    let result = NegotiationBuilder::new(&reasoner).negotiate(&request).await;
    assert_eq!(
        result,
        Err(SplitError::Validation(ValidationError::NegativePercent))
    );

    assert_eq!(reasoner.calls(), 0);
}

#[tokio::test]
async fn prompt_mentions_items_and_total() {
    let reasoner = CannedReasoner::answering(&make_answer("6.00", "3.24"));
    NegotiationBuilder::new(&reasoner)
        .negotiate(&make_request())
        .await
        .unwrap();

    let prompt = reasoner.prompts.lock()[0].clone();
    assert!(prompt.contains("Muffin"));
    assert!(prompt.contains("The muffin was shared."));
    assert!(prompt.contains("must equal 9.24"));
}

#[tokio::test]
async fn unavailable_reasoner_is_reported() {
    let reasoner = CannedReasoner::unavailable();
    let result = NegotiationBuilder::new(&reasoner)
        .negotiate(&make_request())
        .await;
    assert!(matches!(result, Err(SplitError::Unavailable(_))));
}

#[test]
fn answer_may_be_fenced_or_wrapped_in_prose() {
    let fenced = format!("```json\n{}\n```", make_answer("6.00", "3.24"));
    assert!(parse_outcome(&fenced, dec!(9.24)).is_ok());

    let chatty = format!("Here you go:\n{}\nEnjoy!", make_answer("\"6.00\"", "\"3.24\""));
    assert!(parse_outcome(&chatty, dec!(9.24)).is_ok());
}

#[test]
fn malformed_answers_are_parse_errors() {
    assert!(matches!(
        parse_outcome("I could not decide.", dec!(9.24)),
        Err(SplitError::Parse(ParseError::Malformed(_)))
    ));
    assert_eq!(
        parse_outcome(r#"{"transcript": []}"#, dec!(9.24)),
        Err(SplitError::Parse(ParseError::MissingField("finalAmounts")))
    );
    assert_eq!(
        parse_outcome(
            r#"{"transcript": [{"person": 4, "message": "hi"}],
                "finalAmounts": {"person1": 6, "person2": 3.24}}"#,
            dec!(9.24)
        ),
        Err(SplitError::Parse(ParseError::UnknownPerson(4)))
    );
    assert_eq!(
        parse_outcome(
            r#"{"transcript": [], "finalAmounts": {"person1": 6}}"#,
            dec!(9.24)
        ),
        Err(SplitError::Parse(ParseError::MissingField(
            "finalAmounts.person2"
        )))
    );
}
