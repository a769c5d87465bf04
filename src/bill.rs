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

//! The bill being split.
//!
//! A [`BillContext`] is an owned value: every operation takes one explicitly
//! and nothing is shared between requests. It ties the item ledger to the
//! participant registry so that removals cascade into item assignments.

use crate::allocation::BillTotals;
use crate::base::{ItemId, ParticipantId, check_percent};
use crate::error::ValidationError;
use crate::item::{Item, ItemLedger, ParsedItem};
use crate::participant::{Participant, ParticipantRegistry};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Default)]
pub struct BillContext {
    items: ItemLedger,
    participants: ParticipantRegistry,
    tax_percent: Decimal,
    tip_percent: Decimal,
}

impl BillContext {
    /// Creates an empty bill with 0% tax and tip.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a bill from values received from a client.
    ///
    /// Items keep whatever assignments they carry, stale ones included; the
    /// allocation engine ignores names that are not registered.
    ///
    /// # Errors
    ///
    /// Any [`ValidationError`] raised by the ledger or the setters: duplicate
    /// item ids, zero quantities, out of range prices or percentages, blank or
    /// duplicate names, unknown payer.
    pub fn from_parts(
        items: Vec<Item>,
        participants: Vec<Participant>,
        payer: Option<&str>,
        tax_percent: Decimal,
        tip_percent: Decimal,
    ) -> Result<Self, ValidationError> {
        let mut bill = Self {
            items: ItemLedger::from_items(items)?,
            ..Self::default()
        };
        for participant in participants {
            bill.participants.insert(participant)?;
        }
        if let Some(payer) = payer.map(str::trim).filter(|name| !name.is_empty()) {
            bill.participants.set_payer(payer)?;
        }
        bill.set_tax_percent(tax_percent)?;
        bill.set_tip_percent(tip_percent)?;
        Ok(bill)
    }

    pub fn items(&self) -> &ItemLedger {
        &self.items
    }

    pub fn participants(&self) -> &ParticipantRegistry {
        &self.participants
    }

    pub fn payer(&self) -> Option<&str> {
        self.participants.payer()
    }

    pub fn tax_percent(&self) -> Decimal {
        self.tax_percent
    }

    pub fn tip_percent(&self) -> Decimal {
        self.tip_percent
    }

    pub fn set_tax_percent(&mut self, percent: Decimal) -> Result<(), ValidationError> {
        self.tax_percent = check_percent(percent)?;
        Ok(())
    }

    pub fn set_tip_percent(&mut self, percent: Decimal) -> Result<(), ValidationError> {
        self.tip_percent = check_percent(percent)?;
        Ok(())
    }

    /// Loads a new receipt, discarding all previous items and assignments.
    pub fn replace_items(&mut self, parsed: Vec<ParsedItem>) {
        self.items.replace_all(parsed);
    }

    pub fn set_price(&mut self, id: &ItemId, price: Decimal) -> Result<(), ValidationError> {
        self.items.set_price(id, price)
    }

    pub fn edit_price(&mut self, id: &ItemId, input: &str) -> Result<(), ValidationError> {
        self.items.edit_price(id, input)
    }

    pub fn commit_price(&mut self, id: &ItemId) -> Result<Decimal, ValidationError> {
        self.items.commit_price(id)
    }

    /// Assigns an item to a registered participant, or clears it.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::UnknownItem`] - No item with this id.
    /// - [`ValidationError::UnknownParticipant`] - `name` is not registered.
    pub fn assign(&mut self, id: &ItemId, name: Option<&str>) -> Result<(), ValidationError> {
        let name = name.map(str::trim).filter(|name| !name.is_empty());
        if let Some(name) = name.filter(|name| !self.participants.contains(name)) {
            return Err(ValidationError::UnknownParticipant(name.to_string()));
        }
        self.items.set_assignment(id, name)
    }

    pub fn add_participant(&mut self, name: &str) -> Result<ParticipantId, ValidationError> {
        self.participants.add(name)
    }

    /// Removes a participant and unassigns every item that referenced them.
    ///
    /// The payer designation is cleared if it pointed at them. The item
    /// count never changes.
    pub fn remove_participant(&mut self, id: &ParticipantId) -> Option<Participant> {
        let removed = self.participants.remove(id)?;
        let cleared = self.items.clear_assignments_for(&removed.name);
        tracing::debug!(participant = %removed.name, cleared, "removed participant");
        Some(removed)
    }

    pub fn set_payer(&mut self, name: &str) -> Result<(), ValidationError> {
        self.participants.set_payer(name)
    }

    pub fn clear_payer(&mut self) {
        self.participants.clear_payer();
    }

    /// Subtotal, tax, tip and total, unrounded.
    pub fn totals(&self) -> BillTotals {
        BillTotals::compute(self.items.subtotal(), self.tax_percent, self.tip_percent)
    }
}
