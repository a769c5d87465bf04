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

//! Receipt line items.
//!
//! Items are created in bulk from a parsed receipt and replaced wholesale on
//! the next upload. After that only the price and the assignment change.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use receipt_split::{ItemId, ItemLedger, ParsedItem};
//!
//! let mut ledger = ItemLedger::new();
//! ledger.replace_all(vec![ParsedItem::new("Coffee", 1, dec!(4.00))]);
//!
//! ledger.edit_price(&ItemId::from("1"), "4.").unwrap();
//! ledger.edit_price(&ItemId::from("1"), "4.5").unwrap();
//! assert_eq!(ledger.commit_price(&ItemId::from("1")).unwrap(), dec!(4.5));
//! ```

use crate::base::{ItemId, check_price};
use crate::error::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// One row of a parsed receipt, before it becomes an [`Item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub name: String,
    pub quantity: u32,
    /// Line total, not unit price.
    #[serde(deserialize_with = "crate::base::deserialize_amount")]
    pub price: Decimal,
}

impl ParsedItem {
    pub fn new(name: impl Into<String>, quantity: u32, price: Decimal) -> Self {
        Self {
            name: name.into(),
            quantity,
            price,
        }
    }
}

/// A receipt line with its current assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub quantity: u32,
    pub name: String,
    #[serde(deserialize_with = "crate::base::deserialize_amount")]
    pub price: Decimal,
    /// Participant name; `""` on the wire means unassigned.
    #[serde(
        default,
        serialize_with = "serialize_assignment",
        deserialize_with = "deserialize_assignment"
    )]
    pub assigned_to: Option<String>,
}

impl Item {
    /// Builds an unassigned item from a parsed row.
    pub fn from_parsed(id: ItemId, parsed: ParsedItem) -> Self {
        Self {
            id,
            quantity: parsed.quantity,
            name: parsed.name,
            price: parsed.price,
            assigned_to: None,
        }
    }

    pub fn is_assigned_to(&self, name: &str) -> bool {
        self.assigned_to.as_deref() == Some(name)
    }
}

fn serialize_assignment<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

fn deserialize_assignment<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|name| normalize_assignment(&name)))
}

fn normalize_assignment(name: &str) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Returns `true` if `input` could still become a price as the user types.
///
/// Accepts digits with at most one decimal point, including the empty
/// string and a lone `"."`.
fn is_partial_price(input: &str) -> bool {
    let mut seen_point = false;
    input.chars().all(|c| match c {
        '0'..='9' => true,
        '.' if !seen_point => {
            seen_point = true;
            true
        }
        _ => false,
    })
}

/// The items of the current receipt.
#[derive(Debug, Clone, Default)]
pub struct ItemLedger {
    items: Vec<Item>,
    /// Uncommitted price text keyed by item.
    drafts: HashMap<ItemId, String>,
}

impl ItemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from items that already carry ids and assignments.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::DuplicateItem`] - Two items share an id.
    /// - [`ValidationError::InvalidQuantity`] - An item has quantity zero.
    /// - [`ValidationError::NegativePrice`] / [`ValidationError::PriceTooLarge`] -
    ///   A price is out of range.
    pub fn from_items(items: Vec<Item>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(&item.id) {
                return Err(ValidationError::DuplicateItem(item.id.clone()));
            }
            if item.quantity == 0 {
                return Err(ValidationError::InvalidQuantity(item.id.clone()));
            }
            check_price(item.price)?;
        }

        Ok(Self {
            items,
            drafts: HashMap::new(),
        })
    }

    /// Replaces every item with a freshly parsed receipt.
    ///
    /// Prior assignments and price drafts are discarded. Ids restart at `"1"`.
    pub fn replace_all(&mut self, parsed: Vec<ParsedItem>) {
        self.items = parsed
            .into_iter()
            .enumerate()
            .map(|(index, row)| Item::from_parsed(ItemId::from_index(index), row))
            .collect();
        self.drafts.clear();
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of every line price, assigned or not. Saturates at `Decimal::MAX`.
    pub fn subtotal(&self) -> Decimal {
        self.items
            .iter()
            .fold(Decimal::ZERO, |sum, item| sum.saturating_add(item.price))
    }

    fn get_mut(&mut self, id: &ItemId) -> Result<&mut Item, ValidationError> {
        self.items
            .iter_mut()
            .find(|item| &item.id == id)
            .ok_or_else(|| ValidationError::UnknownItem(id.clone()))
    }

    /// Sets a committed price.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::UnknownItem`] - No item with this id.
    /// - [`ValidationError::NegativePrice`] - `price` is below zero.
    /// - [`ValidationError::PriceTooLarge`] - `price` exceeds [`MAX_PRICE`].
    ///
    /// [`MAX_PRICE`]: crate::base::MAX_PRICE
    pub fn set_price(&mut self, id: &ItemId, price: Decimal) -> Result<(), ValidationError> {
        check_price(price)?;
        let item = self.get_mut(id)?;
        item.price = price;
        self.drafts.remove(id);
        Ok(())
    }

    /// Records in-progress price text for an item.
    ///
    /// Partial input such as `""`, `"4."` or `".5"` is kept as a draft; the
    /// item's committed price is untouched until [`commit_price`].
    ///
    /// # Errors
    ///
    /// - [`ValidationError::UnknownItem`] - No item with this id.
    /// - [`ValidationError::InvalidPrice`] - `input` can never become a
    ///   non-negative number (letters, a sign, a second point).
    ///
    /// [`commit_price`]: ItemLedger::commit_price
    pub fn edit_price(&mut self, id: &ItemId, input: &str) -> Result<(), ValidationError> {
        self.get_mut(id)?;
        if !is_partial_price(input) {
            return Err(ValidationError::InvalidPrice(input.to_string()));
        }
        self.drafts.insert(id.clone(), input.to_string());
        Ok(())
    }

    /// Current draft text for an item, if one is being edited.
    pub fn price_draft(&self, id: &ItemId) -> Option<&str> {
        self.drafts.get(id).map(String::as_str)
    }

    /// Coerces the item's draft into its price.
    ///
    /// Without a draft this returns the current price unchanged. On failure
    /// the draft is kept so it can be corrected.
    pub fn commit_price(&mut self, id: &ItemId) -> Result<Decimal, ValidationError> {
        let Some(draft) = self.drafts.get(id).cloned() else {
            return Ok(self.get_mut(id)?.price);
        };
        if !draft.chars().any(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidPrice(draft));
        }
        // "4." and ".5" are complete enough to commit
        let normalized = if draft.ends_with('.') {
            format!("0{draft}0")
        } else {
            format!("0{draft}")
        };
        let price = Decimal::from_str(&normalized)
            .map_err(|_| ValidationError::InvalidPrice(draft.clone()))?;
        self.set_price(id, price)?;
        Ok(price)
    }

    /// Assigns an item to a participant name, or clears it with `None`/`""`.
    ///
    /// The ledger does not know which names are registered; see
    /// [`BillContext::assign`](crate::BillContext::assign) for the checked
    /// variant.
    pub fn set_assignment(
        &mut self,
        id: &ItemId,
        participant: Option<&str>,
    ) -> Result<(), ValidationError> {
        let item = self.get_mut(id)?;
        item.assigned_to = participant.and_then(normalize_assignment);
        Ok(())
    }

    /// Clears every assignment pointing at `name`. Returns how many changed.
    pub fn clear_assignments_for(&mut self, name: &str) -> usize {
        let mut cleared = 0;
        for item in self.items.iter_mut().filter(|item| item.is_assigned_to(name)) {
            item.assigned_to = None;
            cleared += 1;
        }
        cleared
    }
}
