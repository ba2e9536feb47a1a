//! Filtering and sorting of the reconciled collection.
//!
//! Everything here is a pure function of a transfer snapshot, a [`ViewState`]
//! and a `now` sample. The authoritative collection is only ever borrowed.

use crate::age::{age_seconds, format_age};
use crate::error::FilterError;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use types::Transfer;

lazy_static! {
    static ref ACCOUNT_ID: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
}

pub fn is_account_id(value: &str) -> bool {
    ACCOUNT_ID.is_match(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Amount,
    Age,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amount" | "quantity" => Ok(SortKey::Amount),
            "age" => Ok(SortKey::Age),
            other => Err(format!("unknown sort key {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortState {
    /// `None` keeps the collection order, newest first
    pub key: Option<SortKey>,
    pub ascending: bool,
}

impl Default for SortState {
    fn default() -> Self {
        SortState {
            key: None,
            ascending: false,
        }
    }
}

impl SortState {
    /// Same key flips the direction, another key inherits the current one.
    pub fn trigger(&mut self, key: SortKey) {
        if self.key == Some(key) {
            self.ascending = !self.ascending;
        } else {
            self.key = Some(key);
        }
    }
}

/// User selected predicates and ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    /// Lowercase account identifier or empty
    pub sender_filter: String,
    /// Lowercase account identifier or empty
    pub recipient_filter: String,
    pub sort: SortState,
}

impl ViewState {
    /// Empty clears the filter. A malformed value leaves the state untouched.
    pub fn set_sender_filter(&mut self, value: &str) -> Result<(), FilterError> {
        self.sender_filter = validate_filter(value)?;
        Ok(())
    }

    pub fn set_recipient_filter(&mut self, value: &str) -> Result<(), FilterError> {
        self.recipient_filter = validate_filter(value)?;
        Ok(())
    }

    pub fn trigger_sort(&mut self, key: SortKey) {
        self.sort.trigger(key);
    }

    fn admits(&self, transfer: &Transfer) -> bool {
        contains(&transfer.sender, &self.sender_filter)
            && contains(&transfer.recipient, &self.recipient_filter)
    }
}

fn validate_filter(value: &str) -> Result<String, FilterError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(String::new());
    }
    if !is_account_id(value) {
        return Err(FilterError::Malformed(value.to_string()));
    }
    Ok(value.to_ascii_lowercase())
}

fn contains(field: &str, filter: &str) -> bool {
    filter.is_empty() || field.to_ascii_lowercase().contains(filter)
}

/// One rendered line of the transfer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRow {
    pub transaction_hash: String,
    pub sender: String,
    pub recipient: String,
    pub amount: String,
    pub block_number: u64,
    pub timestamp: i64,
    pub age_in_seconds: u64,
    pub age: String,
}

impl TransferRow {
    fn new(transfer: &Transfer, now: i64) -> Self {
        let age_in_seconds = age_seconds(now, transfer.timestamp);
        TransferRow {
            transaction_hash: transfer.transaction_hash.clone(),
            sender: transfer.sender.clone(),
            recipient: transfer.recipient.clone(),
            amount: transfer.amount.clone(),
            block_number: transfer.block_number,
            timestamp: transfer.timestamp,
            age_in_seconds,
            age: format_age(age_in_seconds),
        }
    }
}

/// Numeric value of a formatted amount such as `1,234.5`.
pub fn parse_amount(amount: &str) -> Option<Decimal> {
    Decimal::from_str(&amount.replace(',', "")).ok()
}

/// Filters and sorts `transfers` into a fresh list of rows, with every age
/// taken from the single `now` sample.
pub fn project(transfers: &[Transfer], state: &ViewState, now: i64) -> Vec<TransferRow> {
    let mut rows: Vec<TransferRow> = transfers
        .iter()
        .filter(|transfer| state.admits(transfer))
        .map(|transfer| TransferRow::new(transfer, now))
        .collect();

    if let Some(key) = state.sort.key {
        let ascending = state.sort.ascending;
        // sort_by is stable, equal keys keep collection order in both directions
        rows.sort_by(|a, b| {
            let ordering = compare(key, a, b);
            if ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }
    rows
}

fn compare(key: SortKey, a: &TransferRow, b: &TransferRow) -> Ordering {
    match key {
        SortKey::Amount => parse_amount(&a.amount).cmp(&parse_amount(&b.amount)),
        SortKey::Age => a.age_in_seconds.cmp(&b.age_in_seconds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xa11ce00000000000000000000000000000000001";
    const BOB: &str = "0xb0b0000000000000000000000000000000000002";

    fn transfer(hash: &str, sender: &str, recipient: &str, amount: &str, block: u64) -> Transfer {
        Transfer {
            transaction_hash: hash.to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount: amount.to_string(),
            block_number: block,
            log_index: 0,
            timestamp: 1_000 + block as i64,
        }
    }

    fn hashes(rows: &[TransferRow]) -> Vec<&str> {
        rows.iter().map(|row| row.transaction_hash.as_str()).collect()
    }

    fn sample() -> Vec<Transfer> {
        vec![
            transfer("0x04", ALICE, BOB, "1,000", 4),
            transfer("0x03", BOB, ALICE, "20.5", 3),
            transfer("0x02", ALICE, BOB, "300", 2),
            transfer("0x01", BOB, BOB, "0.75", 1),
        ]
    }

    #[test]
    fn validates_account_identifiers() {
        assert!(is_account_id(ALICE));
        assert!(is_account_id(&format!("{:0<42}", "0xAbC")));
        assert!(!is_account_id("not-an-address"));
        assert!(!is_account_id("0xabc"));
        assert!(!is_account_id(&format!("{:0<43}", "0xabc")));
        assert!(!is_account_id(&format!("0x{}", "g".repeat(40))));
    }

    #[test]
    fn malformed_filter_keeps_previous_view() {
        let transfers = sample();
        let mut state = ViewState::default();
        state.set_sender_filter(ALICE).unwrap();
        let before = project(&transfers, &state, 2_000);
        assert_eq!(hashes(&before), vec!["0x04", "0x02"]);

        assert_eq!(
            state.set_sender_filter("not-an-address"),
            Err(FilterError::Malformed("not-an-address".to_string()))
        );
        assert_eq!(state.sender_filter, ALICE);
        assert_eq!(project(&transfers, &state, 2_000), before);
    }

    #[test]
    fn accepts_mixed_case_identifier() {
        let mut state = ViewState::default();
        let value = format!("{:0<42}", "0xAbC");
        state.set_recipient_filter(&value).unwrap();
        assert_eq!(state.recipient_filter, value.to_ascii_lowercase());

        let transfers = vec![transfer("0x09", BOB, &format!("{:0<42}", "0xabc"), "1", 9)];
        assert_eq!(project(&transfers, &state, 2_000).len(), 1);
    }

    #[test]
    fn empty_filter_clears() {
        let transfers = sample();
        let mut state = ViewState::default();
        state.set_recipient_filter(ALICE).unwrap();
        assert_eq!(hashes(&project(&transfers, &state, 2_000)), vec!["0x03"]);

        state.set_recipient_filter("  ").unwrap();
        assert_eq!(project(&transfers, &state, 2_000).len(), 4);
    }

    #[test]
    fn combines_sender_and_recipient() {
        let transfers = sample();
        let mut state = ViewState::default();
        state.set_sender_filter(BOB).unwrap();
        state.set_recipient_filter(BOB).unwrap();
        assert_eq!(hashes(&project(&transfers, &state, 2_000)), vec!["0x01"]);
    }

    #[test]
    fn amount_sort_toggles_to_reverse() {
        let transfers = sample();
        let mut state = ViewState::default();

        state.trigger_sort(SortKey::Amount);
        let first = project(&transfers, &state, 2_000);
        assert_eq!(hashes(&first), vec!["0x04", "0x02", "0x03", "0x01"]);

        state.trigger_sort(SortKey::Amount);
        let second = project(&transfers, &state, 2_000);
        let mut reversed = first.clone();
        reversed.reverse();
        assert_eq!(second, reversed);
    }

    #[test]
    fn equal_amounts_keep_collection_order() {
        let transfers = vec![
            transfer("0x05", ALICE, BOB, "10", 5),
            transfer("0x04", ALICE, BOB, "1,000", 4),
            transfer("0x03", ALICE, BOB, "10", 3),
            transfer("0x02", ALICE, BOB, "10.0", 2),
        ];
        let mut state = ViewState::default();
        state.trigger_sort(SortKey::Amount);
        assert_eq!(
            hashes(&project(&transfers, &state, 2_000)),
            vec!["0x04", "0x05", "0x03", "0x02"]
        );
        state.trigger_sort(SortKey::Amount);
        assert_eq!(
            hashes(&project(&transfers, &state, 2_000)),
            vec!["0x05", "0x03", "0x02", "0x04"]
        );
        // repeated application does not reshuffle
        assert_eq!(
            project(&transfers, &state, 2_000),
            project(&transfers, &state, 2_000)
        );
    }

    #[test]
    fn switching_key_keeps_direction() {
        let transfers = sample();
        let mut state = ViewState::default();
        state.trigger_sort(SortKey::Amount);
        state.trigger_sort(SortKey::Amount);
        assert!(state.sort.ascending);

        state.trigger_sort(SortKey::Age);
        assert_eq!(state.sort, SortState { key: Some(SortKey::Age), ascending: true });
        // youngest first
        assert_eq!(
            hashes(&project(&transfers, &state, 2_000)),
            vec!["0x04", "0x03", "0x02", "0x01"]
        );
    }

    #[test]
    fn projection_leaves_collection_untouched() {
        let transfers = sample();
        let copy = transfers.clone();
        let mut state = ViewState::default();
        state.trigger_sort(SortKey::Amount);
        state.set_sender_filter(ALICE).unwrap();
        let _ = project(&transfers, &state, 2_000);
        assert_eq!(transfers, copy);
    }

    #[test]
    fn rows_share_one_now() {
        let rows = project(&sample(), &ViewState::default(), 1_064);
        let ages: Vec<u64> = rows.iter().map(|row| row.age_in_seconds).collect();
        assert_eq!(ages, vec![60, 61, 62, 63]);
        assert_eq!(rows[0].age, "1 minute ago");
    }

    #[test]
    fn parses_grouped_amounts() {
        assert_eq!(parse_amount("1,234,567.5"), Decimal::from_str("1234567.5").ok());
        assert_eq!(parse_amount("420,690,000,000,000.123"), Decimal::from_str("420690000000000.123").ok());
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn parses_sort_keys() {
        assert_eq!("amount".parse::<SortKey>(), Ok(SortKey::Amount));
        assert_eq!("Age".parse::<SortKey>(), Ok(SortKey::Age));
        assert!("hash".parse::<SortKey>().is_err());
    }
}
