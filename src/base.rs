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

//! Core identifier types and money helpers.

use crate::error::ValidationError;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a receipt line item.
///
/// Assigned sequentially (`"1"`, `"2"`, ...) each time a receipt is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Id for the item at `index` (zero based) of a parsed receipt.
    pub fn from_index(index: usize) -> Self {
        ItemId((index + 1).to_string())
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId(value.to_string())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a participant.
///
/// Never reused within a registry, even after the participant is removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        ParticipantId(value.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of decimal places used when presenting or transferring amounts.
pub const DISPLAY_PRECISION: u32 = 2;

/// Largest accepted line price.
pub const MAX_PRICE: Decimal = dec!(1000000000000);

/// Largest accepted tax or tip percentage.
pub const MAX_PERCENT: Decimal = dec!(10000);

/// Checks a line price against `0..=MAX_PRICE`.
pub fn check_price(price: Decimal) -> Result<Decimal, ValidationError> {
    if price < Decimal::ZERO {
        Err(ValidationError::NegativePrice)
    } else if price > MAX_PRICE {
        Err(ValidationError::PriceTooLarge(price))
    } else {
        Ok(price)
    }
}

/// Checks a tax or tip percentage against `0..=MAX_PERCENT`.
pub fn check_percent(percent: Decimal) -> Result<Decimal, ValidationError> {
    if percent < Decimal::ZERO {
        Err(ValidationError::NegativePercent)
    } else if percent > MAX_PERCENT {
        Err(ValidationError::PercentTooLarge(percent))
    } else {
        Ok(percent)
    }
}

/// Rounds an amount to cents for display.
///
/// Only call this at the edges (serialization, payment instructions);
/// allocation accumulates unrounded values.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(DISPLAY_PRECISION, RoundingStrategy::MidpointAwayFromZero)
}

/// An amount on the wire: a decimal string or a plain JSON number.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireAmount {
    Text(String),
    Number(serde_json::Number),
}

impl WireAmount {
    fn into_decimal(self) -> Option<Decimal> {
        let text = match self {
            WireAmount::Text(text) => text,
            WireAmount::Number(number) => number.to_string(),
        };
        let text = text.trim();
        Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .ok()
    }
}

/// Accepts `"9.24"` as well as `9.24`. Amounts are always written as strings.
pub(crate) fn deserialize_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    WireAmount::deserialize(deserializer)?
        .into_decimal()
        .ok_or_else(|| serde::de::Error::custom("expected a decimal amount"))
}

/// [`deserialize_amount`] for every value of a name to amount map.
pub(crate) fn deserialize_amounts<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    HashMap::<String, WireAmount>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, amount)| match amount.into_decimal() {
            Some(amount) => Ok((name, amount)),
            None => Err(serde::de::Error::custom(format!(
                "expected a decimal amount for {name:?}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn item_ids_start_at_one() {
        assert_eq!(ItemId::from_index(0), ItemId::from("1"));
        assert_eq!(ItemId::from_index(9).to_string(), "10");
    }

    #[test]
    fn round_cents_rounds_half_away_from_zero() {
        assert_eq!(round_cents(dec!(1.005)), dec!(1.01));
        assert_eq!(round_cents(dec!(1.004)), dec!(1.00));
        assert_eq!(round_cents(dec!(9.2400001)), dec!(9.24));
    }

    #[test]
    fn bounds_reject_out_of_range_values() {
        assert_eq!(check_price(dec!(0)), Ok(dec!(0)));
        assert_eq!(check_price(MAX_PRICE), Ok(MAX_PRICE));
        assert_eq!(check_price(dec!(-0.01)), Err(ValidationError::NegativePrice));
        assert_eq!(
            check_price(Decimal::MAX),
            Err(ValidationError::PriceTooLarge(Decimal::MAX))
        );
        assert_eq!(check_percent(dec!(8.875)), Ok(dec!(8.875)));
        assert_eq!(
            check_percent(dec!(100000)),
            Err(ValidationError::PercentTooLarge(dec!(100000)))
        );
    }

    #[derive(Debug, Deserialize)]
    struct Owed {
        #[serde(deserialize_with = "deserialize_amount")]
        amount: Decimal,
        #[serde(deserialize_with = "deserialize_amounts")]
        by_name: HashMap<String, Decimal>,
    }

    #[test]
    fn amounts_accept_strings_and_numbers() {
        let owed: Owed = serde_json::from_str(
            r#"{"amount": 9.24, "by_name": {"Alice": "3.10", "Bob": 4.5, "Dana": 0}}"#,
        )
        .unwrap();
        assert_eq!(owed.amount, dec!(9.24));
        assert_eq!(owed.by_name["Alice"], dec!(3.10));
        assert_eq!(owed.by_name["Bob"], dec!(4.5));
        assert_eq!(owed.by_name["Dana"], dec!(0));

        let rejected = serde_json::from_str::<Owed>(r#"{"amount": "lots", "by_name": {}}"#);
        assert!(rejected.is_err());
    }
}
