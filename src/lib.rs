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

//! # Receipt Split
//!
//! This library splits a shared receipt between participants and settles the
//! result: items are assigned to people, tax and tip are spread in
//! proportion to what each person ordered, and everyone reimburses the
//! person who paid.
//!
//! ## Core Components
//!
//! - [`BillContext`]: Items, participants, payer and tax/tip percentages
//! - [`compute_owed`]: Proportional allocation into an [`OwedMap`]
//! - [`Settlement`]: Dispatches [`PaymentInstruction`]s to a [`PaymentExecutor`]
//! - [`NegotiationBuilder`]: Lets a [`ReasoningCollaborator`] negotiate a two-way split
//! - [`extract_items`]: Reads receipt rows through a [`ReceiptParser`]
//!
//! ## Example
//!
//! ```
//! use receipt_split::{BillContext, ItemId, ParsedItem, compute_owed, instructions_from_owed};
//! use rust_decimal_macros::dec;
//!
//! let mut bill = BillContext::new();
//! bill.replace_items(vec![
//!     ParsedItem::new("Coffee", 1, dec!(4.00)),
//!     ParsedItem::new("Muffin", 1, dec!(3.00)),
//! ]);
//! bill.add_participant("Alice").unwrap();
//! bill.add_participant("Bob").unwrap();
//! bill.assign(&ItemId::from("1"), Some("Alice")).unwrap();
//! bill.assign(&ItemId::from("2"), Some("Alice")).unwrap();
//! bill.set_payer("Bob").unwrap();
//! bill.set_tax_percent(dec!(10)).unwrap();
//! bill.set_tip_percent(dec!(20)).unwrap();
//!
//! let owed = compute_owed(&bill);
//! assert_eq!(owed.get("Alice"), Some(dec!(9.24)));
//!
//! let instructions = instructions_from_owed(&owed, "Bob").unwrap();
//! assert_eq!(instructions.len(), 1);
//! assert_eq!(instructions[0].amount, dec!(9.24));
//! ```
//!
//! ## Concurrency
//!
//! Nothing here is shared between requests: every operation takes its
//! [`BillContext`] explicitly. Only settlement runs concurrently, and its
//! report keeps instruction order.

pub mod allocation;
mod base;
pub mod bill;
pub mod error;
pub mod item;
mod llm;
pub mod mcp;
pub mod negotiation;
pub mod parser;
pub mod participant;
pub mod server;
pub mod settings;
pub mod settlement;

pub use allocation::{BillTotals, OwedMap, compute_owed};
pub use base::{
    DISPLAY_PRECISION, ItemId, MAX_PERCENT, MAX_PRICE, ParticipantId, check_percent, check_price,
    round_cents,
};
pub use bill::BillContext;
pub use error::{ExecutionError, ParseError, SplitError, ValidationError};
pub use item::{Item, ItemLedger, ParsedItem};
pub use llm::OpenAiClient;
pub use mcp::McpPaymentExecutor;
pub use negotiation::{
    FinalAmounts, NegotiationBuilder, NegotiationOutcome, NegotiationRequest, Negotiator,
    OpenAiReasoner, ReasoningCollaborator, Turn,
};
pub use parser::{ReceiptParser, VisionReceiptParser, extract_items, parse_item_csv};
pub use participant::{Participant, ParticipantRegistry};
pub use settings::Settings;
pub use settlement::{
    AddressBook, PaymentExecutor, PaymentInstruction, Settlement, SettlementReport,
    TransactionResult, TransactionStatus, Transfer, instructions_from_owed,
};
