//! Filter clauses and value comparison.
//!
//! Every predicate the builders accept is one of a small closed set of
//! [`Filter`] variants, evaluated against the JSON form of a row. Registered
//! filters combine as a conjunction; an [`Filter::Or`] group is a single
//! conjunct that holds if any of its clauses does.
//!
//! ```text
//! rows where  f1 = v1  ∧  f2 >= v2  ∧  (title ~ q ∨ location ~ q)
//! ```
//!
//! The `or` wire format (`"title.ilike.%q%,location.ilike.%q%"`) is parsed by
//! [`parse_or_expression`]; anything it cannot understand becomes a clause
//! that matches nothing.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use log::warn;
use serde_json::Value;

/// One registered predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field = value`
    Eq { field: String, value: Value },
    /// `field >= value`
    Gte { field: String, value: Value },
    /// `field <= value`
    Lte { field: String, value: Value },
    /// Case-insensitive containment of `needle` (already lower-cased, `%` stripped).
    Ilike { field: String, needle: String },
    /// Satisfied when any clause is.
    Or(Vec<OrClause>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Only substring containment is modeled: every `%` is dropped.
    pub fn ilike(field: impl Into<String>, pattern: &str) -> Self {
        Filter::Ilike {
            field: field.into(),
            needle: pattern.replace('%', "").to_lowercase(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq { field, value } => row.get(field).is_some_and(|v| loose_eq(v, value)),
            Filter::Gte { field, value } => row
                .get(field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(Ordering::is_ge),
            Filter::Lte { field, value } => row
                .get(field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(Ordering::is_le),
            Filter::Ilike { field, needle } => {
                stringify(row.get(field)).to_lowercase().contains(needle.as_str())
            }
            Filter::Or(clauses) => clauses.iter().any(|clause| clause.matches(row)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseOp {
    Ilike(String),
    Eq(String),
    /// Unknown operator or malformed clause. Never matches.
    Unsupported(String),
}

/// One `field.op.value` member of an `or` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrClause {
    pub field: String,
    pub op: ClauseOp,
}

impl OrClause {
    pub fn ilike(field: impl Into<String>, value: &str) -> Self {
        Self {
            field: field.into(),
            op: ClauseOp::Ilike(normalize_clause_value(value)),
        }
    }

    pub fn eq(field: impl Into<String>, value: &str) -> Self {
        Self {
            field: field.into(),
            op: ClauseOp::Eq(normalize_clause_value(value)),
        }
    }

    /// Parses `field.op.value`. The value may itself contain dots.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some("ilike"), Some(value)) => OrClause::ilike(field, value),
            (Some(field), Some("eq"), Some(value)) => OrClause::eq(field, value),
            (Some(field), op, _) => {
                warn!("Unsupported or-clause '{raw}'; it will match nothing");
                OrClause {
                    field: field.to_string(),
                    op: ClauseOp::Unsupported(op.unwrap_or_default().to_string()),
                }
            }
            (None, _, _) => OrClause {
                field: String::new(),
                op: ClauseOp::Unsupported(String::new()),
            },
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        let haystack = || stringify(row.get(&self.field)).to_lowercase();
        match &self.op {
            ClauseOp::Ilike(needle) => haystack().contains(needle.as_str()),
            ClauseOp::Eq(expected) => haystack() == *expected,
            ClauseOp::Unsupported(_) => false,
        }
    }
}

/// Splits a comma-separated `or` expression into clauses.
///
/// An empty expression yields no clauses, so the resulting group matches
/// nothing.
pub fn parse_or_expression(expr: &str) -> Vec<OrClause> {
    expr.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(OrClause::parse)
        .collect()
}

fn normalize_clause_value(value: &str) -> String {
    let value = value.strip_prefix('%').unwrap_or(value);
    let value = value.strip_suffix('%').unwrap_or(value);
    value.to_lowercase()
}

/// Equality with numbers compared by value, so `5` equals `5.0`.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// Ordering for range predicates; `None` when the operands are not comparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(compare_strings(a, b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Ordering for `order`.
///
/// Each value is reduced to one [`SortKey`] first, so the comparison is a
/// total order: numbers sort before timestamps, timestamps before other text.
/// Missing fields sort as the empty string.
pub fn sort_cmp(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    SortKey::of(left).cmp(&SortKey::of(right))
}

#[derive(Debug, Clone)]
enum SortKey {
    Number(f64),
    Instant(DateTime<FixedOffset>),
    Text(String),
}

impl SortKey {
    fn of(value: Option<&Value>) -> Self {
        if let Some(Value::Number(n)) = value {
            if let Some(n) = n.as_f64() {
                return SortKey::Number(n);
            }
        }
        let text = stringify(value);
        match DateTime::parse_from_rfc3339(&text) {
            Ok(instant) => SortKey::Instant(instant),
            Err(_) => SortKey::Text(text),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(_) => 0,
            SortKey::Instant(_) => 1,
            SortKey::Text(_) => 2,
        }
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Instant(a), SortKey::Instant(b)) => a.cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

// Range predicates compare one pair at a time. RFC 3339 timestamps may carry
// different fractional precision, which breaks plain byte order.
fn compare_strings(a: &str, b: &str) -> Ordering {
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// The text a field is matched against by `ilike` and `or`.
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| stringify(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}
