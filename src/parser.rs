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

//! Receipt item extraction.
//!
//! A [`ReceiptParser`] turns image bytes into receipt rows. The bundled
//! [`VisionReceiptParser`] asks a vision model to answer in headerless CSV
//! (`name,quantity,price`) and reads that back with [`parse_item_csv`].

use crate::base::{ItemId, check_price};
use crate::error::{ParseError, SplitError, ValidationError};
use crate::item::{Item, ParsedItem};
use crate::llm::{ChatMessage, ChatRequest, OpenAiClient, strip_code_fence};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use csv::{ReaderBuilder, Trim};
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

const RECEIPT_PROMPT: &str = "Analyze this receipt image and extract all items purchased.
Return the data in CSV format with exactly 3 columns: name,quantity,price

Rules:
- Do NOT include headers in your response
- Each line should be: item_name,quantity,price
- quantity should be a whole number
- price should be the total price for that line item (quantity * unit price) as a decimal number
- Do NOT include currency symbols
- Do NOT include the subtotal, tax, or tip lines
- Only extract the actual purchased items

Example format:
Americano,1,3.50
Chocolate Chip Cookie,2,4.00
Coke,2,5.00";

/// Extracts receipt rows from an image.
pub trait ReceiptParser: Send + Sync {
    fn parse<'a>(
        &'a self,
        image: &'a [u8],
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ParsedItem>, SplitError>>;
}

/// Runs `parser` on an uploaded image and numbers the rows as items.
///
/// Either every row comes back or the whole call fails; a partial item list
/// is never returned.
///
/// # Errors
///
/// - [`ValidationError::EmptyImage`] - `image` is empty; the parser is not called.
/// - [`SplitError::Parse`] / [`SplitError::Unavailable`] from the parser.
pub async fn extract_items<P: ReceiptParser + ?Sized>(
    parser: &P,
    image: &[u8],
    content_type: &str,
) -> Result<Vec<Item>, SplitError> {
    if image.is_empty() {
        return Err(ValidationError::EmptyImage.into());
    }

    let rows = parser.parse(image, content_type).await?;
    tracing::info!(items = rows.len(), "extracted receipt items");
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| Item::from_parsed(ItemId::from_index(index), row))
        .collect())
}

/// Reads headerless `name,quantity,price` CSV.
///
/// Rows with fewer than three fields are skipped. A row with an unreadable
/// quantity or price fails the whole text.
///
/// # Example
///
/// ```
/// use rust_decimal_macros::dec;
/// use receipt_split::parse_item_csv;
///
/// let items = parse_item_csv("Americano,1,3.50\n\"Cookie, large\",2,4.00").unwrap();
/// assert_eq!(items.len(), 2);
/// assert_eq!(items[1].name, "Cookie, large");
/// assert_eq!(items[1].price, dec!(4.00));
/// ```
pub fn parse_item_csv(text: &str) -> Result<Vec<ParsedItem>, ParseError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(strip_code_fence(text).as_bytes());

    let mut items = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| ParseError::Malformed(err.to_string()))?;
        if record.len() < 3 {
            continue;
        }

        let name = record[0].to_string();
        let quantity = match record[1].parse::<u32>() {
            Ok(quantity) if quantity >= 1 => quantity,
            _ => {
                return Err(ParseError::InvalidQuantity {
                    item: name,
                    value: record[1].to_string(),
                });
            }
        };
        let price = match Decimal::from_str(record[2].trim_start_matches('$')) {
            Ok(price) if check_price(price).is_ok() => price,
            _ => {
                return Err(ParseError::InvalidPrice {
                    item: name,
                    value: record[2].to_string(),
                });
            }
        };

        items.push(ParsedItem {
            name,
            quantity,
            price,
        });
    }
    Ok(items)
}

/// Receipt parser backed by an OpenAI vision model.
#[derive(Debug, Clone)]
pub struct VisionReceiptParser {
    client: OpenAiClient,
    model: String,
}

impl VisionReceiptParser {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    async fn parse_image(&self, image: &[u8], content_type: &str) -> Result<Vec<ParsedItem>, SplitError> {
        let content_type = if content_type.is_empty() {
            "image/jpeg"
        } else {
            content_type
        };
        let data_url = format!("data:{content_type};base64,{}", STANDARD.encode(image));

        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: json!([
                    { "type": "text", "text": RECEIPT_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } },
                ]),
            }],
            response_format: None,
        };

        let answer = self.client.complete(&request).await?;
        tracing::debug!(answer = %answer, "vision model answer");
        Ok(parse_item_csv(&answer)?)
    }
}

impl ReceiptParser for VisionReceiptParser {
    fn parse<'a>(
        &'a self,
        image: &'a [u8],
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ParsedItem>, SplitError>> {
        Box::pin(self.parse_image(image, content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_rows_and_skips_short_ones() {
        let items = parse_item_csv("Americano,1,0.01\nTOTAL\nCoke, 2 , 0.02\n").unwrap();
        assert_eq!(
            items,
            vec![
                ParsedItem::new("Americano", 1, dec!(0.01)),
                ParsedItem::new("Coke", 2, dec!(0.02)),
            ]
        );
    }

    #[test]
    fn tolerates_code_fence_and_dollar_sign() {
        let items = parse_item_csv("```csv\nBagel,1,$2.25\n```").unwrap();
        assert_eq!(items, vec![ParsedItem::new("Bagel", 1, dec!(2.25))]);
    }

    #[test]
    fn rejects_non_numeric_quantity() {
        assert_eq!(
            parse_item_csv("Bagel,one,2.25"),
            Err(ParseError::InvalidQuantity {
                item: "Bagel".into(),
                value: "one".into()
            })
        );
    }

    #[test]
    fn rejects_zero_quantity_and_negative_price() {
        assert!(matches!(
            parse_item_csv("Bagel,0,2.25"),
            Err(ParseError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            parse_item_csv("Discount,1,-1.00"),
            Err(ParseError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn empty_answer_yields_no_items() {
        assert_eq!(parse_item_csv("").unwrap(), vec![]);
    }
}
