//! Account Simulator — one virtual all-in/all-out account per selected set.
//!
//! Each account is `Flat` or `Long`. A day's decision moves it through the
//! transition table below and then re-marks it at the decision price:
//!
//! | state | signal | action                         |
//! |-------|--------|--------------------------------|
//! | flat  | +1     | spend all cash, go long        |
//! | long  | -1     | sell the whole position        |
//! | any   | other  | no trade                       |
//!
//! Accounts with no decision for the day are carried forward untouched.
//! A day's starting state is exactly the previous snapshot; nothing older is read.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sweeplab_core::domain::{ParamId, Signal};
use tracing::{debug, warn};

use crate::live::TradeDecision;
use crate::scheduler::UnitFailure;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Flat,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Buy,
    Sell,
    None,
}

/// One snapshot row. Columns up to `last_updated` are the stable table shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub param_id: ParamId,
    pub cash: f64,
    pub position_size: f64,
    pub position_value: f64,
    pub total_value: f64,
    #[serde(with = "last_updated")]
    pub last_updated: Option<NaiveDate>,
    pub symbol: String,
}

impl Account {
    pub fn new(symbol: impl Into<String>, param_id: ParamId, initial_capital: f64) -> Self {
        Self {
            param_id,
            cash: initial_capital,
            position_size: 0.0,
            position_value: 0.0,
            total_value: initial_capital,
            last_updated: None,
            symbol: symbol.into(),
        }
    }

    pub fn state(&self) -> AccountState {
        if self.position_size > 0.0 {
            AccountState::Long
        } else {
            AccountState::Flat
        }
    }

    fn key(&self) -> AccountKey {
        (self.symbol.clone(), self.param_id.clone())
    }

    /// Apply one day's signal at `price`, then re-mark.
    pub fn apply(&mut self, signal: Signal, price: f64, date: NaiveDate) -> TradeAction {
        let action = match (self.state(), signal) {
            (AccountState::Flat, Signal::Buy) => {
                self.position_size = self.cash / price;
                self.cash = 0.0;
                TradeAction::Buy
            }
            (AccountState::Long, Signal::Sell) => {
                self.cash = self.position_size * price;
                self.position_size = 0.0;
                TradeAction::Sell
            }
            _ => TradeAction::None,
        };
        self.position_value = self.position_size * price;
        self.total_value = self.cash + self.position_value;
        self.last_updated = Some(date);
        action
    }
}

/// Snapshot identity. Grid ids are shared across symbols, so the symbol is part of it.
type AccountKey = (String, ParamId);

/// Result of simulating one day.
#[derive(Debug, Clone)]
pub struct DayOutcome {
    pub date: NaiveDate,
    /// Every account after the day, ordered by (symbol, param_id).
    pub accounts: Vec<Account>,
    pub created: usize,
    pub updated: usize,
    pub trades: usize,
    pub rejected: Vec<UnitFailure>,
}

impl DayOutcome {
    pub fn total_value(&self) -> f64 {
        self.accounts.iter().map(|a| a.total_value).sum()
    }
}

impl fmt::Display for DayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} accounts, total value {:.2}",
            self.date,
            self.accounts.len(),
            self.total_value()
        )
    }
}

/// Advance `prior` by one day of `decisions`.
///
/// Decisions with a non-positive or non-finite price are rejected. When one
/// account has several decisions for the day only the first is applied and
/// the rest are rejected.
pub fn simulate_day(
    prior: Vec<Account>,
    decisions: &[TradeDecision],
    date: NaiveDate,
    initial_capital: f64,
) -> DayOutcome {
    let mut book: BTreeMap<AccountKey, Account> =
        prior.into_iter().map(|a| (a.key(), a)).collect();

    let mut rejected = Vec::new();
    let mut todays: BTreeMap<AccountKey, &TradeDecision> = BTreeMap::new();
    for d in decisions {
        let unit = format!("{}/{}", d.symbol, d.param_id);
        if !(d.price.is_finite() && d.price > 0.0) {
            rejected.push(UnitFailure {
                unit,
                cause: format!("invalid price {}", d.price),
            });
            continue;
        }
        let key = (d.symbol.clone(), d.param_id.clone());
        if todays.contains_key(&key) {
            warn!(account = %unit, "duplicate decision for the day ignored");
            rejected.push(UnitFailure {
                unit,
                cause: "duplicate decision for the day".into(),
            });
            continue;
        }
        todays.insert(key, d);
    }

    let mut created = 0;
    let mut active: Vec<(Account, &TradeDecision)> = Vec::with_capacity(todays.len());
    for (key, decision) in todays {
        let account = match book.remove(&key) {
            Some(account) => account,
            None => {
                created += 1;
                Account::new(key.0, key.1, initial_capital)
            }
        };
        active.push((account, decision));
    }

    let actions: Vec<TradeAction> = active
        .par_iter_mut()
        .map(|(account, d)| account.apply(d.signal, d.price, date))
        .collect();

    let mut trades = 0;
    for ((account, _), action) in active.iter().zip(&actions) {
        if *action != TradeAction::None {
            trades += 1;
            debug!(
                symbol = %account.symbol,
                param_id = %account.param_id,
                action = ?action,
                total_value = account.total_value,
                "trade"
            );
        }
    }

    let updated = active.len();
    for (account, _) in active {
        book.insert(account.key(), account);
    }

    DayOutcome {
        date,
        accounts: book.into_values().collect(),
        created,
        updated,
        trades,
        rejected,
    }
}

/// `last_updated` column: a date, or `N/A` for an account never updated.
mod last_updated {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};
    use sweeplab_core::domain::DATE_FORMAT;

    const NEVER: &str = "N/A";

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_str(&d.format(DATE_FORMAT).to_string()),
            None => s.serialize_str(NEVER),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = String::deserialize(d)?;
        let raw = raw.trim();
        if raw.is_empty() || raw == NEVER {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeplab_core::domain::StrategyKind;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn decision(id: &str, signal: Signal, price: f64, date: NaiveDate) -> TradeDecision {
        TradeDecision {
            date,
            symbol: "AAPL".into(),
            strategy: StrategyKind::Rsi,
            param_id: ParamId::new(id),
            signal,
            price,
        }
    }

    fn assert_invariants(a: &Account, price: f64) {
        assert!((a.position_value - a.position_size * price).abs() < 1e-9);
        assert!((a.total_value - (a.cash + a.position_value)).abs() < 1e-9);
    }

    #[test]
    fn fresh_account_is_flat_with_capital() {
        let a = Account::new("AAPL", ParamId::new("x"), 10_000.0);
        assert_eq!(a.state(), AccountState::Flat);
        assert_eq!(a.total_value, 10_000.0);
        assert_eq!(a.last_updated, None);
    }

    #[test]
    fn buy_hold_sell_sequence() {
        let mut a = Account::new("AAPL", ParamId::new("x"), 10_000.0);

        assert_eq!(a.apply(Signal::Buy, 100.0, day(1)), TradeAction::Buy);
        assert_eq!(a.position_size, 100.0);
        assert_eq!(a.cash, 0.0);
        assert_invariants(&a, 100.0);

        assert_eq!(a.apply(Signal::Hold, 110.0, day(2)), TradeAction::None);
        assert_eq!(a.position_size, 100.0);
        assert_eq!(a.total_value, 11_000.0);

        assert_eq!(a.apply(Signal::Sell, 90.0, day(3)), TradeAction::Sell);
        assert_eq!(a.cash, 9_000.0);
        assert_eq!(a.position_size, 0.0);
        assert_eq!(a.total_value, 9_000.0);
        assert_eq!(a.last_updated, Some(day(3)));
    }

    #[test]
    fn redundant_signals_only_revalue() {
        let mut a = Account::new("AAPL", ParamId::new("x"), 1_000.0);
        assert_eq!(a.apply(Signal::Sell, 50.0, day(1)), TradeAction::None);
        assert_eq!(a.total_value, 1_000.0);
        a.apply(Signal::Buy, 50.0, day(2));
        assert_eq!(a.apply(Signal::Buy, 60.0, day(3)), TradeAction::None);
        assert_eq!(a.position_size, 20.0);
        assert_eq!(a.total_value, 1_200.0);
        assert_invariants(&a, 60.0);
    }

    #[test]
    fn accounts_without_decisions_carry_forward() {
        let first = simulate_day(
            Vec::new(),
            &[
                decision("a", Signal::Buy, 100.0, day(1)),
                decision("b", Signal::Hold, 100.0, day(1)),
            ],
            day(1),
            10_000.0,
        );
        assert_eq!(first.created, 2);
        let b_before = first.accounts[1].clone();

        let second = simulate_day(
            first.accounts,
            &[decision("a", Signal::Hold, 120.0, day(2))],
            day(2),
            10_000.0,
        );
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);
        assert_eq!(second.accounts.len(), 2);
        assert_eq!(second.accounts[0].total_value, 12_000.0);
        assert_eq!(second.accounts[1], b_before);
        assert_eq!(second.total_value(), 22_000.0);
    }

    #[test]
    fn same_id_on_two_symbols_are_separate_accounts() {
        let mut other = decision("a", Signal::Buy, 50.0, day(1));
        other.symbol = "MSFT".into();
        let out = simulate_day(
            Vec::new(),
            &[decision("a", Signal::Buy, 100.0, day(1)), other],
            day(1),
            10_000.0,
        );
        assert_eq!(out.accounts.len(), 2);
        assert_eq!(out.accounts[0].position_size, 100.0);
        assert_eq!(out.accounts[1].position_size, 200.0);
        assert_eq!(out.trades, 2);
    }

    #[test]
    fn bad_prices_and_duplicates_are_not_applied() {
        let out = simulate_day(
            Vec::new(),
            &[
                decision("a", Signal::Buy, f64::NAN, day(1)),
                decision("b", Signal::Buy, 100.0, day(1)),
                decision("b", Signal::Sell, 100.0, day(1)),
            ],
            day(1),
            10_000.0,
        );
        assert_eq!(out.rejected.len(), 2);
        assert!(out.rejected[0].cause.starts_with("invalid price"));
        assert_eq!(out.rejected[1].unit, "AAPL/b");
        assert_eq!(out.rejected[1].cause, "duplicate decision for the day");
        assert_eq!(out.updated + out.rejected.len(), 3);
        assert_eq!(out.accounts.len(), 1);
        assert_eq!(out.accounts[0].state(), AccountState::Long);
    }

    #[test]
    fn snapshot_row_shape() {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(Account::new("AAPL", ParamId::new("RSI_x"), 10_000.0))
            .unwrap();
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("param_id,cash,position_size,position_value,total_value,last_updated,symbol")
        );
        assert_eq!(lines.next(), Some("RSI_x,10000.0,0.0,0.0,10000.0,N/A,AAPL"));

        let mut rdr = csv::Reader::from_reader(text.as_bytes());
        let back: Account = rdr.deserialize().next().unwrap().unwrap();
        assert_eq!(back.last_updated, None);
    }
}
