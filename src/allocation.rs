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

//! Proportional cost allocation.
//!
//! Each participant pays for the items assigned to them plus a share of tax
//! and tip proportional to their share of the subtotal:
//!
//! | Quantity | Formula |
//! |----------|---------|
//! | subtotal | Σ item price |
//! | tax | subtotal × tax% / 100 |
//! | tip | (subtotal + tax) × tip% / 100 |
//! | total | subtotal + tax + tip |
//! | owed(p) | sub(p) + sub(p) / subtotal × (tax + tip) |
//!
//! Everything here is unrounded; rounding happens on serialization.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use receipt_split::{BillContext, ItemId, ParsedItem, compute_owed};
//!
//! let mut bill = BillContext::new();
//! bill.replace_items(vec![
//!     ParsedItem::new("Coffee", 1, dec!(4.00)),
//!     ParsedItem::new("Muffin", 1, dec!(3.00)),
//! ]);
//! bill.add_participant("Alice").unwrap();
//! bill.add_participant("Bob").unwrap();
//! bill.set_payer("Bob").unwrap();
//! bill.assign(&ItemId::from("1"), Some("Alice")).unwrap();
//! bill.assign(&ItemId::from("2"), Some("Alice")).unwrap();
//! bill.set_tax_percent(dec!(10)).unwrap();
//! bill.set_tip_percent(dec!(20)).unwrap();
//!
//! let owed = compute_owed(&bill);
//! assert_eq!(owed.get("Alice"), Some(dec!(9.24)));
//! assert_eq!(owed.get("Bob"), Some(dec!(0)));
//! ```

use crate::base::round_cents;
use crate::bill::BillContext;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

/// Derived amounts of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub tip: Decimal,
    pub total: Decimal,
}

impl BillTotals {
    /// Computes tax on the subtotal and tip on subtotal plus tax.
    ///
    /// Saturates at `Decimal::MAX` instead of overflowing.
    pub fn compute(subtotal: Decimal, tax_percent: Decimal, tip_percent: Decimal) -> Self {
        let tax = percent_of(subtotal, tax_percent);
        let tip = percent_of(subtotal.saturating_add(tax), tip_percent);
        Self {
            subtotal,
            tax,
            tip,
            total: subtotal.saturating_add(tax).saturating_add(tip),
        }
    }

    /// Tax plus tip, the part shared out proportionally.
    pub fn surcharge(&self) -> Decimal {
        self.tax.saturating_add(self.tip)
    }
}

impl Serialize for BillTotals {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("BillTotals", 4)?;
        state.serialize_field("subtotal", &round_cents(self.subtotal))?;
        state.serialize_field("tax", &round_cents(self.tax))?;
        state.serialize_field("tip", &round_cents(self.tip))?;
        state.serialize_field("total", &round_cents(self.total))?;
        state.end()
    }
}

fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount.saturating_mul(percent) / Decimal::ONE_HUNDRED
}

/// Amount each participant owes, in registry order.
///
/// The payer has an entry too (what their own items cost); they are left
/// out when building payment instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwedMap {
    entries: Vec<(String, Decimal)>,
}

impl OwedMap {
    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, amount)| *amount)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.entries
            .iter()
            .map(|(name, amount)| (name.as_str(), *amount))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entries, unrounded.
    pub fn total(&self) -> Decimal {
        self.entries
            .iter()
            .fold(Decimal::ZERO, |sum, (_, amount)| sum.saturating_add(*amount))
    }
}

impl FromIterator<(String, Decimal)> for OwedMap {
    /// Later duplicates of a name replace earlier ones in place.
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        let mut map = OwedMap::default();
        for (name, amount) in iter {
            match map.entries.iter_mut().find(|(entry, _)| *entry == name) {
                Some(slot) => slot.1 = amount,
                None => map.entries.push((name, amount)),
            }
        }
        map
    }
}

impl Serialize for OwedMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, amount) in &self.entries {
            map.serialize_entry(name, &round_cents(*amount))?;
        }
        map.end()
    }
}

/// Computes what every participant owes.
///
/// Returns an empty map when the subtotal is zero. Items that are unassigned,
/// or assigned to a name no longer registered, count towards the subtotal
/// and the tax/tip base but are attributed to nobody.
pub fn compute_owed(bill: &BillContext) -> OwedMap {
    let totals = bill.totals();
    if totals.subtotal.is_zero() {
        return OwedMap::default();
    }

    let items = bill.items().items();
    bill.participants()
        .participants()
        .iter()
        .map(|participant| {
            let personal: Decimal = items
                .iter()
                .filter(|item| item.is_assigned_to(&participant.name))
                .fold(Decimal::ZERO, |sum, item| sum.saturating_add(item.price));
            let share = (personal / totals.subtotal).saturating_mul(totals.surcharge());
            (participant.name.clone(), personal.saturating_add(share))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ItemId;
    use crate::item::ParsedItem;
    use rust_decimal_macros::dec;

    #[test]
    fn tip_is_charged_on_subtotal_plus_tax() {
        let totals = BillTotals::compute(dec!(100), dec!(10), dec!(20));
        assert_eq!(totals.tax, dec!(10));
        assert_eq!(totals.tip, dec!(22));
        assert_eq!(totals.total, dec!(132));
    }

    #[test]
    fn zero_subtotal_yields_empty_map() {
        let mut bill = BillContext::new();
        bill.replace_items(vec![ParsedItem::new("Water", 1, dec!(0))]);
        bill.add_participant("Alice").unwrap();
        bill.assign(&ItemId::from("1"), Some("Alice")).unwrap();
        bill.set_tax_percent(dec!(10)).unwrap();
        assert!(compute_owed(&bill).is_empty());
    }

    #[test]
    fn serialization_rounds_to_cents() {
        let owed: OwedMap = vec![
            ("Alice".to_string(), dec!(3.3333333)),
            ("Bob".to_string(), dec!(0)),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_value(&owed).unwrap();
        assert_eq!(json["Alice"], "3.33");
        assert_eq!(json["Bob"], "0");
    }

    #[test]
    fn from_iter_keeps_first_position_for_duplicates() {
        let owed: OwedMap = vec![
            ("Alice".to_string(), dec!(1)),
            ("Bob".to_string(), dec!(2)),
            ("Alice".to_string(), dec!(3)),
        ]
        .into_iter()
        .collect();
        let names: Vec<&str> = owed.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(owed.get("Alice"), Some(dec!(3)));
    }

    #[test]
    fn extreme_prices_saturate_instead_of_panicking() {
        let mut bill = BillContext::new();
        bill.replace_items(vec![
            ParsedItem::new("Yacht", 1, Decimal::MAX),
            ParsedItem::new("Island", 1, Decimal::MAX),
        ]);
        bill.add_participant("Alice").unwrap();
        bill.assign(&ItemId::from("1"), Some("Alice")).unwrap();
        bill.set_tax_percent(dec!(10)).unwrap();

        let totals = bill.totals();
        assert_eq!(totals.subtotal, Decimal::MAX);
        assert_eq!(totals.total, Decimal::MAX);
        let owed = compute_owed(&bill);
        assert_eq!(owed.get("Alice"), Some(Decimal::MAX));
    }
}
