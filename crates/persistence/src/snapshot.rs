//! JSON snapshot of a ledger and its tolerant decoder.
//!
//! Wire shape:
//! `{teamName, currentCash, turn, history: [{id, turn, income, expense,
//! profit, balance, details}], inputs, unit}` with amounts as plain JSON
//! numbers in Major units.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use settle_codec::{to_canonical, CANONICAL_DECIMALS};
use settle_core::{initial_cash, max_balance, Category, DisplayUnit, InputBucket, LedgerState, TurnRecord};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Characters `encodeURIComponent` leaves untouched.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotOut<'a> {
    team_name: &'a str,
    current_cash: f64,
    turn: u32,
    history: Vec<RecordOut>,
    inputs: BTreeMap<&'static str, f64>,
    unit: DisplayUnit,
}

#[derive(Serialize)]
struct RecordOut {
    id: i64,
    turn: u32,
    income: f64,
    expense: f64,
    profit: f64,
    balance: f64,
    details: BTreeMap<&'static str, f64>,
}

fn num(d: Decimal) -> f64 {
    d.to_f64().unwrap_or_else(|| {
        warn!(amount = %d, "amount has no f64 form; stored as 0");
        0.0
    })
}

fn bucket_out(bucket: &InputBucket) -> BTreeMap<&'static str, f64> {
    bucket.iter().map(|(c, v)| (c.key(), num(v))).collect()
}

/// Serialise a ledger to snapshot JSON.
pub fn to_json(state: &LedgerState) -> Result<String, serde_json::Error> {
    let out = SnapshotOut {
        team_name: &state.team_name,
        current_cash: num(state.cash),
        turn: state.turn,
        history: state
            .history
            .iter()
            .map(|r| RecordOut {
                id: r.id,
                turn: r.turn,
                income: num(r.income),
                expense: num(r.expense),
                profit: num(r.profit),
                balance: num(r.balance_after),
                details: bucket_out(&r.details),
            })
            .collect(),
        inputs: bucket_out(&state.pending),
        unit: state.unit,
    };
    serde_json::to_string(&out)
}

/// Snapshot JSON, percent-encoded for the store.
pub fn encode(state: &LedgerState) -> Result<String, serde_json::Error> {
    let json = to_json(state)?;
    Ok(utf8_percent_encode(&json, COMPONENT).to_string())
}

/// Inverse of [`encode`]. `None` when the text is not a snapshot at all.
pub fn decode(stored: &str) -> Option<LedgerState> {
    let json = match percent_decode_str(stored).decode_utf8() {
        Ok(json) => json,
        Err(e) => {
            debug!(error = %e, "stored snapshot is not utf-8");
            return None;
        }
    };
    from_json(&json)
}

fn number_to_decimal(n: &Number) -> Option<Decimal> {
    let text = n.to_string();
    let d = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;
    Some(
        d.round_dp_with_strategy(CANONICAL_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
            .normalize(),
    )
}

/// Cash and record amounts; magnitudes past `max_balance()` count as absent.
fn amount(value: Option<&Value>) -> Option<Decimal> {
    let d = match value? {
        Value::Number(n) => number_to_decimal(n)?,
        _ => return None,
    };
    if d.abs() > max_balance() {
        warn!(amount = %d, "stored amount out of range; ignoring it");
        return None;
    }
    Some(d)
}

fn positive_u32(value: Option<&Value>) -> Option<u32> {
    value?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n >= 1)
}

/// Each category defaults to zero on its own. Older front-ends stored the
/// raw field text, which is read in the stored unit.
fn bucket_in(value: Option<&Value>, unit: DisplayUnit) -> InputBucket {
    let mut bucket = InputBucket::new();
    let Some(Value::Object(map)) = value else {
        return bucket;
    };
    for category in Category::ALL {
        let amount = match map.get(category.key()) {
            Some(Value::Number(n)) => number_to_decimal(n).unwrap_or(Decimal::ZERO),
            Some(Value::String(text)) => to_canonical(text, unit),
            _ => Decimal::ZERO,
        };
        bucket.set(category, amount);
    }
    bucket
}

/// `fallback_turn` numbers a record whose own turn is missing or invalid.
fn record_in(map: &Map<String, Value>, fallback_turn: u32) -> TurnRecord {
    TurnRecord {
        id: map.get("id").and_then(Value::as_i64).unwrap_or(0),
        turn: positive_u32(map.get("turn")).unwrap_or(fallback_turn),
        income: amount(map.get("income")).unwrap_or(Decimal::ZERO),
        expense: amount(map.get("expense")).unwrap_or(Decimal::ZERO),
        profit: amount(map.get("profit")).unwrap_or(Decimal::ZERO),
        balance_after: amount(map.get("balance")).unwrap_or(Decimal::ZERO),
        details: bucket_in(map.get("details"), DisplayUnit::Major),
    }
}

/// Decode snapshot JSON, defaulting every field independently.
///
/// Only text that is not a JSON object yields `None`; a missing or
/// mistyped field falls back to its fresh-game value without discarding
/// the rest.
pub fn from_json(json: &str) -> Option<LedgerState> {
    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "stored snapshot is not valid json");
            return None;
        }
    };
    let Value::Object(root) = value else {
        debug!("stored snapshot is not an object");
        return None;
    };

    let unit = root
        .get("unit")
        .and_then(Value::as_str)
        .and_then(DisplayUnit::from_code)
        .unwrap_or_default();

    let history = match root.get("history") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                Value::Object(map) => {
                    // Newest first, so the oldest entry is turn 1.
                    let position = u32::try_from(items.len() - index).unwrap_or(u32::MAX);
                    Some(record_in(map, position))
                }
                other => {
                    warn!(entry = %other, "skipping malformed history entry");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    Some(LedgerState {
        team_name: root
            .get("teamName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        cash: amount(root.get("currentCash")).unwrap_or_else(initial_cash),
        turn: positive_u32(root.get("turn")).unwrap_or(1),
        history,
        unit,
        pending: bucket_in(root.get("inputs"), unit),
    })
}
