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

//! Settlement of a split bill.
//!
//! Owed amounts become [`PaymentInstruction`]s addressed to the payer. Each
//! instruction is handed to a [`PaymentExecutor`] and its outcome recorded
//! as a [`TransactionResult`].
//!
//! # Failure model
//!
//! A failed instruction is data, not an error: [`Settlement::settle`] always
//! attempts every instruction and returns one result per instruction in the
//! input order. Nothing is retried.
//!
//! # Concurrency
//!
//! Up to `max_in_flight` instructions are dispatched at once. Results are
//! collected in instruction order regardless of completion order, each into
//! its own slot.

use crate::allocation::OwedMap;
use crate::base::round_cents;
use crate::error::{ExecutionError, ValidationError};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Move `amount` from one participant to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstruction {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

impl PaymentInstruction {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: Decimal) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }
}

/// Builds one instruction per non-payer owing a positive amount.
///
/// Amounts are rounded to cents; an amount that rounds to zero produces no
/// instruction.
///
/// # Errors
///
/// [`ValidationError::MissingPayer`] if `payer` is blank.
pub fn instructions_from_owed(
    owed: &OwedMap,
    payer: &str,
) -> Result<Vec<PaymentInstruction>, ValidationError> {
    let payer = payer.trim();
    if payer.is_empty() {
        return Err(ValidationError::MissingPayer);
    }

    Ok(owed
        .iter()
        .filter(|(name, _)| *name != payer)
        .map(|(name, amount)| (name, round_cents(amount)))
        .filter(|(_, amount)| *amount > Decimal::ZERO)
        .map(|(name, amount)| PaymentInstruction::new(name, payer, amount))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

/// Outcome of one payment instruction.
///
/// Built once by the orchestrator from the executor's answer and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_address: Option<String>,
    to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    to_address: Option<String>,
    amount: Decimal,
    status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TransactionResult {
    fn success(transfer: &Transfer, receipt: String) -> Self {
        Self {
            from: transfer.instruction.from.clone(),
            from_address: Some(transfer.from_address.clone()),
            to: transfer.instruction.to.clone(),
            to_address: Some(transfer.to_address.clone()),
            amount: transfer.instruction.amount,
            status: TransactionStatus::Success,
            result: Some(receipt),
            error: None,
        }
    }

    fn failed(
        instruction: &PaymentInstruction,
        from_address: Option<&str>,
        to_address: Option<&str>,
        error: &ExecutionError,
    ) -> Self {
        Self {
            from: instruction.from.clone(),
            from_address: from_address.map(str::to_string),
            to: instruction.to.clone(),
            to_address: to_address.map(str::to_string),
            amount: instruction.amount,
            status: TransactionStatus::Failed,
            result: None,
            error: Some(error.to_string()),
        }
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn from_address(&self) -> Option<&str> {
        self.from_address.as_deref()
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn to_address(&self) -> Option<&str> {
        self.to_address.as_deref()
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    /// Opaque confirmation returned by the executor.
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Human-readable failure reason.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// An instruction with both ends resolved to payment addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub instruction: PaymentInstruction,
    pub from_address: String,
    pub to_address: String,
    pub memo: String,
}

/// Executes a single transfer on an external payment service.
///
/// Returns an opaque confirmation on success. Implementations must not
/// retry on their own.
pub trait PaymentExecutor: Send + Sync {
    fn execute<'a>(&'a self, transfer: &'a Transfer) -> BoxFuture<'a, Result<String, ExecutionError>>;
}

/// Participant name to payment address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBook {
    addresses: HashMap<String, String>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.insert(name, address);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, address: impl Into<String>) {
        self.addresses.insert(name.into(), address.into());
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.addresses.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl From<HashMap<String, String>> for AddressBook {
    fn from(addresses: HashMap<String, String>) -> Self {
        Self { addresses }
    }
}

/// Ordered results of one settlement run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    transactions: Vec<TransactionResult>,
}

impl SettlementReport {
    pub fn transactions(&self) -> &[TransactionResult] {
        &self.transactions
    }

    pub fn into_transactions(self) -> Vec<TransactionResult> {
        self.transactions
    }

    pub fn total(&self) -> usize {
        self.transactions.len()
    }

    pub fn succeeded(&self) -> usize {
        self.transactions.iter().filter(|tx| tx.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.transactions.iter().filter(|tx| !tx.is_success()).count()
    }
}

/// Concurrent executor calls allowed by default.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Dispatches payment instructions to an executor.
pub struct Settlement<'a, E: PaymentExecutor + ?Sized> {
    executor: &'a E,
    addresses: &'a AddressBook,
    max_in_flight: usize,
}

impl<'a, E: PaymentExecutor + ?Sized> Settlement<'a, E> {
    pub fn new(executor: &'a E, addresses: &'a AddressBook) -> Self {
        Self {
            executor,
            addresses,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Caps concurrent executor calls. `1` dispatches sequentially.
    pub fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Attempts every instruction and returns one result per instruction,
    /// in input order.
    pub async fn settle(&self, instructions: &[PaymentInstruction]) -> SettlementReport {
        tracing::info!(count = instructions.len(), "settling payment instructions");

        let transactions: Vec<TransactionResult> = stream::iter(instructions.iter().cloned())
            .map(|instruction| async move { self.settle_one(&instruction).await })
            .buffered(self.max_in_flight)
            .collect()
            .await;

        let report = SettlementReport { transactions };
        tracing::info!(
            total = report.total(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "settlement complete"
        );
        report
    }

    async fn settle_one(&self, instruction: &PaymentInstruction) -> TransactionResult {
        let from_address = self.addresses.resolve(&instruction.from);
        let to_address = self.addresses.resolve(&instruction.to);

        let (Some(from_address), Some(to_address)) = (from_address, to_address) else {
            let missing = if from_address.is_none() {
                &instruction.from
            } else {
                &instruction.to
            };
            let error = ExecutionError::MissingAddress(missing.clone());
            tracing::warn!(from = %instruction.from, to = %instruction.to, %error, "skipping payment");
            return TransactionResult::failed(instruction, from_address, to_address, &error);
        };

        let transfer = Transfer {
            instruction: instruction.clone(),
            from_address: from_address.to_string(),
            to_address: to_address.to_string(),
            memo: format!("Receipt split: {} pays {}", instruction.from, instruction.to),
        };

        match self.executor.execute(&transfer).await {
            Ok(receipt) => {
                tracing::info!(
                    from = %instruction.from,
                    to = %instruction.to,
                    amount = %instruction.amount,
                    "payment succeeded"
                );
                TransactionResult::success(&transfer, receipt)
            }
            Err(error) => {
                tracing::warn!(
                    from = %instruction.from,
                    to = %instruction.to,
                    amount = %instruction.amount,
                    %error,
                    "payment failed"
                );
                TransactionResult::failed(
                    instruction,
                    Some(from_address),
                    Some(to_address),
                    &error,
                )
            }
        }
    }
}
