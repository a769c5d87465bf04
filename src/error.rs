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

//! Error types for bill splitting and settlement.
//!
//! - [`ParseError`]: a collaborator answered with something we cannot use.
//! - [`ValidationError`]: user input was rejected before any external call.
//! - [`ExecutionError`]: one payment instruction failed. This is recorded in
//!   the settlement report, never returned from `settle`.
//! - [`SplitError`]: what the public operations return.

use crate::base::ItemId;
use rust_decimal::Decimal;
use thiserror::Error;

/// The receipt parser or reasoning collaborator returned an unusable answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A row had a quantity that is not a whole number of at least one
    #[error("invalid quantity {value:?} for item {item:?}")]
    InvalidQuantity { item: String, value: String },

    /// A row had a price that is not a non-negative decimal
    #[error("invalid price {value:?} for item {item:?}")]
    InvalidPrice { item: String, value: String },

    /// A required field was absent
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Transcript turn attributed to someone other than person 1, 2 or 3
    #[error("transcript turn has unknown person {0}")]
    UnknownPerson(u64),

    /// The response could not be read at all
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// User input rejected before any external call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Price is below zero
    #[error("price cannot be negative")]
    NegativePrice,

    /// Price text is not a number
    #[error("invalid price {0:?}")]
    InvalidPrice(String),

    /// Price is above the supported maximum
    #[error("price {0} is too large")]
    PriceTooLarge(Decimal),

    /// Tax or tip percentage is below zero
    #[error("percentage cannot be negative")]
    NegativePercent,

    /// Tax or tip percentage is above the supported maximum
    #[error("percentage {0} is too large")]
    PercentTooLarge(Decimal),

    /// Quantity is zero
    #[error("item {0} must have a quantity of at least one")]
    InvalidQuantity(ItemId),

    /// Two items share an id
    #[error("duplicate item id {0}")]
    DuplicateItem(ItemId),

    /// Participant name is empty after trimming
    #[error("participant name cannot be empty")]
    EmptyName,

    /// Participant name is already registered
    #[error("participant {0:?} already exists")]
    DuplicateParticipant(String),

    /// Participant name is not registered
    #[error("unknown participant {0:?}")]
    UnknownParticipant(String),

    /// Item id is not in the ledger
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    /// Settlement was requested without a designated payer
    #[error("no payer designated")]
    MissingPayer,

    /// Receipt upload carried no bytes
    #[error("receipt image is empty")]
    EmptyImage,

    /// Negotiated amount is below zero
    #[error("negotiated amount cannot be negative")]
    NegativeAmount,

    /// Negotiated amounts do not add up to the bill total
    #[error("negotiated amounts sum to {actual}, expected {expected}")]
    AmountMismatch { expected: Decimal, actual: Decimal },
}

/// A single payment instruction failed at the payment executor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// No payment address for the named participant
    #[error("No wallet address configured for {0}")]
    MissingAddress(String),

    /// The payment service refused the transfer
    #[error("{0}")]
    Rejected(String),

    /// The payment service could not be reached or answered garbage
    #[error("payment service error: {0}")]
    Transport(String),
}

/// Errors returned by the public operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A collaborator could not be reached or is not configured
    #[error("service unavailable: {0}")]
    Unavailable(String),
}
