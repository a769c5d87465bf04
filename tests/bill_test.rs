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

//! Bill context integration tests: participants, assignments and price edits.

use receipt_split::{BillContext, ItemId, ParsedItem, ParticipantId, ValidationError, compute_owed};
use rust_decimal_macros::dec;

fn make_bill() -> BillContext {
    let mut bill = BillContext::new();
    bill.replace_items(vec![
        ParsedItem::new("Americano", 1, dec!(3.50)),
        ParsedItem::new("Chocolate Chip Cookie", 2, dec!(4.00)),
        ParsedItem::new("Coke", 2, dec!(5.00)),
    ]);
    bill
}

fn item(id: &str) -> ItemId {
    ItemId::from(id)
}

#[test]
fn replace_items_numbers_from_one_and_drops_assignments() {
    let mut bill = make_bill();
    bill.add_participant("Alice").unwrap();
    bill.assign(&item("1"), Some("Alice")).unwrap();

    bill.replace_items(vec![ParsedItem::new("Bagel", 1, dec!(2.25))]);

    assert_eq!(bill.items().len(), 1);
    let bagel = bill.items().get(&item("1")).unwrap();
    assert_eq!(bagel.name, "Bagel");
    assert_eq!(bagel.assigned_to, None);
}

#[test]
fn removing_participant_cascades_but_keeps_items() {
    let mut bill = make_bill();
    let alice = bill.add_participant("Alice").unwrap();
    bill.add_participant("Bob").unwrap();
    bill.assign(&item("1"), Some("Alice")).unwrap();
    bill.assign(&item("2"), Some("Bob")).unwrap();
    bill.assign(&item("3"), Some("Alice")).unwrap();
    bill.set_payer("Alice").unwrap();

    let removed = bill.remove_participant(&alice).unwrap();

    assert_eq!(removed.name, "Alice");
    assert_eq!(bill.items().len(), 3);
    assert_eq!(bill.payer(), None);
    assert!(
        bill.items()
            .items()
            .iter()
            .all(|item| item.assigned_to.as_deref() != Some("Alice"))
    );
    assert_eq!(
        bill.items().get(&item("2")).unwrap().assigned_to.as_deref(),
        Some("Bob")
    );
}

#[test]
fn removing_unknown_participant_is_a_no_op() {
    let mut bill = make_bill();
    bill.add_participant("Alice").unwrap();
    assert!(bill.remove_participant(&ParticipantId::from("p99")).is_none());
    assert_eq!(bill.participants().len(), 1);
}

#[test]
fn participant_ids_are_never_reused() {
    let mut bill = BillContext::new();
    let alice = bill.add_participant("Alice").unwrap();
    bill.remove_participant(&alice).unwrap();
    let alice_again = bill.add_participant("Alice").unwrap();
    assert_ne!(alice, alice_again);
}

#[test]
fn names_are_trimmed_and_unique() {
    let mut bill = BillContext::new();
    bill.add_participant("  Alice ").unwrap();
    assert!(bill.participants().contains("Alice"));
    assert_eq!(
        bill.add_participant("Alice"),
        Err(ValidationError::DuplicateParticipant("Alice".into()))
    );
    assert_eq!(bill.add_participant("   "), Err(ValidationError::EmptyName));
}

#[test]
fn payer_must_be_registered() {
    let mut bill = BillContext::new();
    assert_eq!(
        bill.set_payer("Bob"),
        Err(ValidationError::UnknownParticipant("Bob".into()))
    );
    bill.add_participant("Bob").unwrap();
    bill.set_payer("Bob").unwrap();
    assert_eq!(bill.payer(), Some("Bob"));
    bill.clear_payer();
    assert_eq!(bill.payer(), None);
}

#[test]
fn price_drafts_commit_on_demand() {
    let mut bill = make_bill();

    bill.edit_price(&item("1"), "").unwrap();
    bill.edit_price(&item("1"), "4.").unwrap();
    // Committed price is untouched while editing.
    assert_eq!(bill.items().get(&item("1")).unwrap().price, dec!(3.50));
    assert_eq!(bill.items().price_draft(&item("1")), Some("4."));

    assert_eq!(bill.commit_price(&item("1")), Ok(dec!(4)));
    assert_eq!(bill.items().get(&item("1")).unwrap().price, dec!(4));
    assert_eq!(bill.items().price_draft(&item("1")), None);

    bill.edit_price(&item("2"), ".5").unwrap();
    assert_eq!(bill.commit_price(&item("2")), Ok(dec!(0.5)));
}

#[test]
fn invalid_keystrokes_are_rejected() {
    let mut bill = make_bill();
    for input in ["4a", "-1", "1.2.3", "$5"] {
        assert_eq!(
            bill.edit_price(&item("1"), input),
            Err(ValidationError::InvalidPrice(input.into())),
            "{input}"
        );
    }
    assert_eq!(
        bill.set_price(&item("1"), dec!(-0.01)),
        Err(ValidationError::NegativePrice)
    );
}

#[test]
fn lone_point_cannot_be_committed() {
    let mut bill = make_bill();
    bill.edit_price(&item("3"), ".").unwrap();
    assert_eq!(
        bill.commit_price(&item("3")),
        Err(ValidationError::InvalidPrice(".".into()))
    );
    assert_eq!(bill.items().get(&item("3")).unwrap().price, dec!(5.00));
}

#[test]
fn unknown_item_is_reported() {
    let mut bill = make_bill();
    bill.add_participant("Alice").unwrap();
    assert_eq!(
        bill.assign(&item("42"), Some("Alice")),
        Err(ValidationError::UnknownItem(item("42")))
    );
}

#[test]
fn price_change_flows_into_allocation() {
    let mut bill = make_bill();
    bill.add_participant("Alice").unwrap();
    for id in ["1", "2", "3"] {
        bill.assign(&item(id), Some("Alice")).unwrap();
    }
    bill.set_price(&item("3"), dec!(2.50)).unwrap();

    assert_eq!(bill.totals().subtotal, dec!(10.00));
    assert_eq!(compute_owed(&bill).get("Alice"), Some(dec!(10.00)));
}

#[test]
fn from_parts_rejects_unknown_payer_and_negative_percent() {
    use receipt_split::{Item, Participant};

    let items = vec![Item::from_parsed(
        item("1"),
        ParsedItem::new("Coffee", 1, dec!(4.00)),
    )];
    let people = vec![Participant {
        id: ParticipantId::from("p1"),
        name: "Alice".into(),
    }];

    assert!(matches!(
        BillContext::from_parts(items.clone(), people.clone(), Some("Bob"), dec!(0), dec!(0)),
        Err(ValidationError::UnknownParticipant(_))
    ));
    assert_eq!(
        BillContext::from_parts(items.clone(), people.clone(), None, dec!(-5), dec!(0)).err(),
        Some(ValidationError::NegativePercent)
    );
    let bill = BillContext::from_parts(items, people, Some(" Alice "), dec!(10), dec!(15)).unwrap();
    assert_eq!(bill.payer(), Some("Alice"));
}

#[test]
fn from_parts_rejects_duplicate_ids_and_zero_quantity() {
    use receipt_split::Item;

    let coffee = Item::from_parsed(item("1"), ParsedItem::new("Coffee", 1, dec!(4.00)));
    let tea = Item::from_parsed(item("1"), ParsedItem::new("Tea", 1, dec!(3.00)));
    assert_eq!(
        BillContext::from_parts(vec![coffee.clone(), tea], vec![], None, dec!(0), dec!(0)).err(),
        Some(ValidationError::DuplicateItem(item("1")))
    );

    let free = Item::from_parsed(item("2"), ParsedItem::new("Water", 0, dec!(0)));
    assert_eq!(
        BillContext::from_parts(vec![coffee, free], vec![], None, dec!(0), dec!(0)).err(),
        Some(ValidationError::InvalidQuantity(item("2")))
    );
}

#[test]
fn oversized_amounts_are_rejected_before_allocation() {
    use receipt_split::{Item, MAX_PERCENT, MAX_PRICE};
    use rust_decimal::Decimal;

    let yacht = Item::from_parsed(item("1"), ParsedItem::new("Yacht", 1, Decimal::MAX));
    assert_eq!(
        BillContext::from_parts(vec![yacht], vec![], None, dec!(0), dec!(0)).err(),
        Some(ValidationError::PriceTooLarge(Decimal::MAX))
    );

    let mut bill = make_bill();
    assert_eq!(
        bill.set_price(&item("1"), MAX_PRICE + dec!(1)),
        Err(ValidationError::PriceTooLarge(MAX_PRICE + dec!(1)))
    );
    assert_eq!(
        bill.set_tax_percent(dec!(100000000000000000000)),
        Err(ValidationError::PercentTooLarge(dec!(100000000000000000000)))
    );

    bill.set_price(&item("1"), MAX_PRICE).unwrap();
    bill.set_tax_percent(MAX_PERCENT).unwrap();
    bill.set_tip_percent(MAX_PERCENT).unwrap();
    bill.add_participant("Alice").unwrap();
    bill.assign(&item("1"), Some("Alice")).unwrap();
    let owed = compute_owed(&bill).get("Alice").unwrap();
    assert!(owed > MAX_PRICE);
}
