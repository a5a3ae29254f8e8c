use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{IncomeError, Result};

// ── MonthKey ──────────────────────────────────────────────────────────────────

/// A calendar month, the join key between income rows, the price index and
/// the reference series.
///
/// Ordering is chronological and matches the ordering of the `"YYYY-MM"`
/// string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Build a key from a year and a month in `1..=12`.
    ///
    /// Out-of-range months are clamped into `1..=12`; use
    /// [`MonthKey::from_ym`] when the month comes from untrusted input.
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year,
            month: month.clamp(1, 12),
        }
    }

    /// Build a key, returning `None` when `(year, month)` is not a real month.
    pub fn from_ym(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    /// The reference month of a survey quarter: the last month of the
    /// quarter. Unknown quarter numbers map to December.
    pub fn from_quarter(year: i32, quarter: i64) -> Self {
        Self::new(year, quarter_end_month(quarter))
    }

    /// Parse `"YYYY-MM"` (a one-digit month is accepted).
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || IncomeError::InvalidMonth(trimmed.to_string());
        let (y, m) = trimmed.split_once('-').ok_or_else(invalid)?;
        if y.is_empty() || m.is_empty() || m.len() > 2 {
            return Err(invalid());
        }
        if !y.chars().all(|c| c.is_ascii_digit()) || !m.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        Self::from_ym(year, month).ok_or_else(invalid)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

/// Map a quarter number to the last month of that quarter.
///
/// `1 → 3`, `2 → 6`, `3 → 9`, `4 → 12`; anything else falls back to `12`.
pub fn quarter_end_month(quarter: i64) -> u32 {
    match quarter {
        1 => 3,
        2 => 6,
        3 => 9,
        _ => 12,
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = IncomeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── HouseholdId ───────────────────────────────────────────────────────────────

/// Opaque household identifier (the `dom_id` column).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HouseholdId(String);

impl HouseholdId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HouseholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── GroupKey ──────────────────────────────────────────────────────────────────

/// Code used for the national aggregate.
pub const NATIONAL_CODE: &str = "BR";
/// Display label of the national aggregate.
pub const NATIONAL_LABEL: &str = "Brasil";

/// Identity of one node in the national / state / macro-region hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    National,
    /// A state (UF), keyed by its normalised code.
    State(String),
    /// A macro-region, keyed by its name.
    MacroRegion(String),
}

impl GroupKey {
    /// The value emitted in the `group` field of a finalised group.
    pub fn code(&self) -> &str {
        match self {
            GroupKey::National => NATIONAL_CODE,
            GroupKey::State(code) => code,
            GroupKey::MacroRegion(name) => name,
        }
    }
}

// ── OrderedMap ────────────────────────────────────────────────────────────────

/// A map that remembers insertion order.
///
/// Used for every accumulator whose iteration order reaches the output, so
/// repeated runs over the same input serialize identically.
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K, usize>,
}

/// Equality is order-sensitive: two maps with the same entries inserted in
/// a different order are not equal.
impl<K: PartialEq, V: PartialEq> PartialEq for OrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: K, value: V) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Return the value for `key`, inserting `make()` at the end first if the
    /// key is new.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let i = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let i = self.entries.len();
                self.index.insert(key.clone(), i);
                self.entries.push((key, make()));
                i
            }
        };
        &mut self.entries[i].1
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl OrderedMap<String, f64> {
    /// Add `amount` to the counter for `key`, creating it at zero if needed.
    pub fn add(&mut self, key: &str, amount: f64) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 += amount,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), amount));
            }
        }
    }
}

/// Weighted category counter keyed by category label.
pub type Tally = OrderedMap<String, f64>;

impl<K, V> IntoIterator for OrderedMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Eq + Hash + Clone, V> FromIterator<(K, V)> for OrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<K: Serialize, V: Serialize> Serialize for OrderedMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
