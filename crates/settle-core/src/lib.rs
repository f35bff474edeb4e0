#![deny(warnings)]

//! Core ledger models and invariants for the settlement tool.
//!
//! This crate defines the state a team's settlement sheet is made of: the
//! pending inputs of the current turn, the archived turn records, and the
//! running cash balance. Every amount is a canonical Major-unit `Decimal`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Cash a team starts the game with, in Major units.
pub fn initial_cash() -> Decimal {
    Decimal::new(15, 0)
}

/// Largest amount one input field holds, in Major units (10^18).
pub fn max_amount() -> Decimal {
    Decimal::new(1_000_000_000_000_000_000, 0)
}

/// Largest cash balance or recorded amount the ledger carries, in Major
/// units (10^24). Leaves room to render it in Minor units.
pub fn max_balance() -> Decimal {
    max_amount() * Decimal::new(1_000_000, 0)
}

/// Minor units per Major unit.
pub fn minor_per_major() -> Decimal {
    Decimal::new(1000, 0)
}

/// Denomination amounts are shown and typed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayUnit {
    /// "M": fractional, the canonical storage unit.
    #[default]
    #[serde(rename = "M")]
    Major,
    /// "K": integer-only, 1 M = 1000 K.
    #[serde(rename = "K")]
    Minor,
}

impl DisplayUnit {
    pub const ALL: [DisplayUnit; 2] = [DisplayUnit::Major, DisplayUnit::Minor];

    /// Short code used in the UI and in persisted snapshots.
    pub fn code(self) -> &'static str {
        match self {
            DisplayUnit::Major => "M",
            DisplayUnit::Minor => "K",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(DisplayUnit::Major),
            "K" => Some(DisplayUnit::Minor),
            _ => None,
        }
    }

    /// Multiplier from a canonical Major amount to this unit.
    pub fn scale(self) -> Decimal {
        match self {
            DisplayUnit::Major => Decimal::ONE,
            DisplayUnit::Minor => minor_per_major(),
        }
    }

    /// Maximum digits a field may hold while typing.
    pub fn max_digits(self) -> usize {
        match self {
            DisplayUnit::Major => 99,
            DisplayUnit::Minor => 10,
        }
    }

    /// Fraction digits accepted while typing, and shown when formatting.
    pub fn typed_decimals(self) -> u32 {
        match self {
            DisplayUnit::Major => 3,
            DisplayUnit::Minor => 0,
        }
    }

    /// Fraction digits kept when a field is committed.
    pub fn committed_decimals(self) -> u32 {
        match self {
            DisplayUnit::Major => 1,
            DisplayUnit::Minor => 0,
        }
    }

    /// Settlement granularity expressed in this unit (0.1 M, 100 K).
    pub fn step(self) -> Decimal {
        match self {
            DisplayUnit::Major => Decimal::new(1, 1),
            DisplayUnit::Minor => Decimal::new(100, 0),
        }
    }
}

impl fmt::Display for DisplayUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether a category adds to or subtracts from the turn's profit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryKind {
    Income,
    Expense,
}

/// The fixed set of per-turn input categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Salary paid when passing start.
    #[serde(rename = "salary")]
    Salary,
    /// Tolls received from other teams.
    #[serde(rename = "rentIn")]
    RentIn,
    /// Proceeds of selling a business.
    #[serde(rename = "tradeIn")]
    TradeIn,
    /// Chance cards that pay out.
    #[serde(rename = "etcIn")]
    EtcIn,
    /// Business investment cost.
    #[serde(rename = "invest")]
    Invest,
    /// Tolls paid to other teams.
    #[serde(rename = "rentOut")]
    RentOut,
    /// Chance cards that cost money.
    #[serde(rename = "tradeOut")]
    TradeOut,
    /// Social contribution.
    #[serde(rename = "donation")]
    Donation,
    /// Losses and fines.
    #[serde(rename = "fine")]
    Fine,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Salary,
        Category::RentIn,
        Category::TradeIn,
        Category::EtcIn,
        Category::Invest,
        Category::RentOut,
        Category::TradeOut,
        Category::Donation,
        Category::Fine,
    ];

    pub const INCOME: [Category; 4] = [
        Category::Salary,
        Category::RentIn,
        Category::TradeIn,
        Category::EtcIn,
    ];

    pub const EXPENSE: [Category; 5] = [
        Category::Invest,
        Category::RentOut,
        Category::TradeOut,
        Category::Donation,
        Category::Fine,
    ];

    /// Stable key used in persisted snapshots.
    pub fn key(self) -> &'static str {
        match self {
            Category::Salary => "salary",
            Category::RentIn => "rentIn",
            Category::TradeIn => "tradeIn",
            Category::EtcIn => "etcIn",
            Category::Invest => "invest",
            Category::RentOut => "rentOut",
            Category::TradeOut => "tradeOut",
            Category::Donation => "donation",
            Category::Fine => "fine",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    pub fn kind(self) -> CategoryKind {
        match self {
            Category::Salary | Category::RentIn | Category::TradeIn | Category::EtcIn => {
                CategoryKind::Income
            }
            _ => CategoryKind::Expense,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Category::Salary => "Salary",
            Category::RentIn => "Toll income",
            Category::TradeIn => "Business sale",
            Category::EtcIn => "Chance card (in)",
            Category::Invest => "Business investment",
            Category::RentOut => "Toll paid",
            Category::TradeOut => "Chance card (out)",
            Category::Donation => "Donation",
            Category::Fine => "Loss",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Derived sums over an input bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub income: Decimal,
    pub expense: Decimal,
    /// income - expense; may be negative.
    pub profit: Decimal,
}

impl Totals {
    pub fn is_empty(&self) -> bool {
        self.income.is_zero() && self.expense.is_zero()
    }
}

/// Non-negative canonical amount per category.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputBucket {
    amounts: [Decimal; 9],
}

impl InputBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category) -> Decimal {
        self.amounts[category.index()]
    }

    /// Overwrites one category. Amounts are clamped into
    /// `0..=max_amount()`.
    pub fn set(&mut self, category: Category, amount: Decimal) {
        self.amounts[category.index()] = amount.clamp(Decimal::ZERO, max_amount());
    }

    pub fn clear(&mut self) {
        self.amounts = [Decimal::ZERO; 9];
    }

    pub fn is_zero(&self) -> bool {
        self.amounts.iter().all(|a| a.is_zero())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, Decimal)> + '_ {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Income, expense and profit, computed on every call.
    pub fn totals(&self) -> Totals {
        let income: Decimal = Category::INCOME.iter().map(|c| self.get(*c)).sum();
        let expense: Decimal = Category::EXPENSE.iter().map(|c| self.get(*c)).sum();
        Totals {
            income,
            expense,
            profit: income - expense,
        }
    }
}

/// One closed turn. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRecord {
    /// Millisecond timestamp, strictly increasing across the history.
    pub id: i64,
    pub turn: u32,
    pub income: Decimal,
    pub expense: Decimal,
    pub profit: Decimal,
    /// Cash balance right after this turn closed.
    pub balance_after: Decimal,
    /// Pending inputs at the moment of closing.
    pub details: InputBucket,
}

impl TurnRecord {
    /// Cash balance right before this turn closed.
    pub fn balance_before(&self) -> Decimal {
        self.balance_after.saturating_sub(self.profit)
    }
}

/// Full settlement sheet of one team.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerState {
    pub team_name: String,
    /// Canonical cash balance; may go negative.
    pub cash: Decimal,
    /// Turn currently being recorded, starting at 1.
    pub turn: u32,
    /// Closed turns, most recent first.
    pub history: Vec<TurnRecord>,
    pub unit: DisplayUnit,
    pub pending: InputBucket,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::fresh()
    }
}

impl LedgerState {
    /// State of a brand-new game.
    pub fn fresh() -> Self {
        Self {
            team_name: String::new(),
            cash: initial_cash(),
            turn: 1,
            history: Vec::new(),
            unit: DisplayUnit::Major,
            pending: InputBucket::new(),
        }
    }

    pub fn totals(&self) -> Totals {
        self.pending.totals()
    }

    /// Verify the balance, turn counter and history ordering agree.
    pub fn check_invariants(&self, initial: Decimal) -> Result<(), ValidationError> {
        let expected_turn = u32::try_from(self.history.len())
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or(ValidationError::HistoryTooLong)?;
        if self.turn != expected_turn {
            return Err(ValidationError::TurnMismatch {
                turn: self.turn,
                expected: expected_turn,
            });
        }
        for (index, pair) in self.history.windows(2).enumerate() {
            if pair[0].turn <= pair[1].turn {
                return Err(ValidationError::HistoryOrder { index: index + 1 });
            }
        }
        for (category, amount) in self.pending.iter() {
            if amount.is_sign_negative() && !amount.is_zero() {
                return Err(ValidationError::NegativeAmount(category));
            }
        }
        let expected_cash = self
            .history
            .iter()
            .try_fold(initial, |acc, r| acc.checked_add(r.profit))
            .ok_or(ValidationError::ProfitOverflow)?;
        if self.cash != expected_cash {
            return Err(ValidationError::CashMismatch {
                cash: self.cash,
                expected: expected_cash,
            });
        }
        Ok(())
    }
}

/// Violations of the ledger invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Turn counter must equal 1 + number of closed turns.
    #[error("turn {turn} does not follow history (expected {expected})")]
    TurnMismatch { turn: u32, expected: u32 },
    /// History must be ordered most-recent-first.
    #[error("history out of order at index {index}")]
    HistoryOrder { index: usize },
    /// Cash must equal the initial cash plus every recorded profit.
    #[error("cash {cash} does not match recorded profits (expected {expected})")]
    CashMismatch { cash: Decimal, expected: Decimal },
    /// Pending inputs are never negative.
    #[error("negative amount in {0}")]
    NegativeAmount(Category),
    #[error("history is too long to number")]
    HistoryTooLong,
    #[error("recorded profits exceed the representable range")]
    ProfitOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(turn: u32, profit: i64, balance_after: i64) -> TurnRecord {
        TurnRecord {
            id: i64::from(turn),
            turn,
            income: Decimal::new(profit.max(0), 0),
            expense: Decimal::new((-profit).max(0), 0),
            profit: Decimal::new(profit, 0),
            balance_after: Decimal::new(balance_after, 0),
            details: InputBucket::new(),
        }
    }

    #[test]
    fn fresh_state_defaults() {
        let s = LedgerState::fresh();
        assert_eq!(s.cash, Decimal::new(15, 0));
        assert_eq!(s.turn, 1);
        assert!(s.history.is_empty());
        assert_eq!(s.unit, DisplayUnit::Major);
        assert!(s.pending.is_zero());
        assert!(s.check_invariants(initial_cash()).is_ok());
    }

    #[test]
    fn unit_codes_roundtrip() {
        for u in DisplayUnit::ALL {
            assert_eq!(DisplayUnit::from_code(u.code()), Some(u));
        }
        assert_eq!(DisplayUnit::from_code("X"), None);
        assert_eq!(serde_json::to_string(&DisplayUnit::Minor).unwrap(), "\"K\"");
    }

    #[test]
    fn category_keys_are_unique_and_partitioned() {
        for c in Category::ALL {
            assert_eq!(Category::from_key(c.key()), Some(c));
        }
        assert_eq!(Category::INCOME.len() + Category::EXPENSE.len(), Category::ALL.len());
        assert!(Category::INCOME.iter().all(|c| c.kind() == CategoryKind::Income));
        assert!(Category::EXPENSE.iter().all(|c| c.kind() == CategoryKind::Expense));
    }

    #[test]
    fn bucket_never_negative() {
        let mut b = InputBucket::new();
        b.set(Category::Fine, Decimal::new(-5, 0));
        assert_eq!(b.get(Category::Fine), Decimal::ZERO);
    }

    #[test]
    fn bucket_caps_huge_amounts() {
        let mut b = InputBucket::new();
        for c in Category::ALL {
            b.set(c, Decimal::MAX);
        }
        assert_eq!(b.get(Category::Salary), max_amount());
        let t = b.totals();
        assert_eq!(t.income, max_amount() * Decimal::new(4, 0));
        assert_eq!(t.profit, -max_amount());
    }

    #[test]
    fn profit_sum_overflow_is_reported() {
        let mut s = LedgerState::fresh();
        let mut big = record(2, 0, 0);
        big.profit = Decimal::MAX;
        s.history = vec![big.clone(), TurnRecord { turn: 1, ..big }];
        s.turn = 3;
        assert_eq!(
            s.check_invariants(initial_cash()),
            Err(ValidationError::ProfitOverflow)
        );
    }

    #[test]
    fn totals_split_income_and_expense() {
        let mut b = InputBucket::new();
        b.set(Category::Salary, Decimal::new(2, 0));
        b.set(Category::RentIn, Decimal::new(15, 1));
        b.set(Category::Donation, Decimal::new(1, 0));
        b.set(Category::Invest, Decimal::new(3, 0));
        let t = b.totals();
        assert_eq!(t.income, Decimal::new(35, 1));
        assert_eq!(t.expense, Decimal::new(4, 0));
        assert_eq!(t.profit, Decimal::new(-5, 1));
        assert!(!t.is_empty());
        b.clear();
        assert!(b.totals().is_empty());
    }

    #[test]
    fn invariants_detect_drift() {
        let mut s = LedgerState::fresh();
        s.history = vec![record(2, -3, 14), record(1, 2, 17)];
        s.turn = 3;
        s.cash = Decimal::new(14, 0);
        assert!(s.check_invariants(initial_cash()).is_ok());

        s.turn = 2;
        assert_eq!(
            s.check_invariants(initial_cash()),
            Err(ValidationError::TurnMismatch { turn: 2, expected: 3 })
        );

        s.turn = 3;
        s.cash = Decimal::new(20, 0);
        assert!(matches!(
            s.check_invariants(initial_cash()),
            Err(ValidationError::CashMismatch { .. })
        ));

        s.cash = Decimal::new(14, 0);
        s.history.swap(0, 1);
        assert_eq!(
            s.check_invariants(initial_cash()),
            Err(ValidationError::HistoryOrder { index: 1 })
        );
    }

    #[test]
    fn record_balance_before() {
        let r = record(1, 2, 17);
        assert_eq!(r.balance_before(), Decimal::new(15, 0));
    }

    proptest! {
        #[test]
        fn profit_is_income_minus_expense(values in proptest::collection::vec(0i64..1_000_000, 9)) {
            let mut b = InputBucket::new();
            for (c, v) in Category::ALL.iter().zip(&values) {
                b.set(*c, Decimal::new(*v, 3));
            }
            let t = b.totals();
            prop_assert_eq!(t.profit, t.income - t.expense);
            let sum: Decimal = values.iter().map(|v| Decimal::new(*v, 3)).sum();
            prop_assert_eq!(t.income + t.expense, sum);
        }

        #[test]
        fn totals_hold_at_any_accepted_magnitude(
            mantissas in proptest::collection::vec(0i64..=1_000_000_000_000_000_000, 9),
            scale in 0u32..=3,
        ) {
            let mut b = InputBucket::new();
            for (c, m) in Category::ALL.iter().zip(&mantissas) {
                b.set(*c, Decimal::new(*m, scale));
            }
            let t = b.totals();
            prop_assert!(t.income <= max_amount() * Decimal::new(4, 0));
            prop_assert!(t.expense <= max_amount() * Decimal::new(5, 0));
            prop_assert!((t.profit * minor_per_major()).abs() <= max_balance() * minor_per_major());
        }
    }
}
