//! Catalog filtering: filter state, matching and derived option lists.
//!
//! Filtering is pure and runs over the full in-memory product list on every
//! filter change; the catalog is small enough that no incremental diffing is
//! needed.

use serde::{Deserialize, Serialize};

use super::Product;

/// One filter selection per dimension. Empty string or `ALL` (any case) is
/// the no-constraint sentinel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub term: String,
}

/// Deduplicated, sorted option values per filter dimension, derived from the
/// loaded catalog.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FilterOptions {
    pub grades: Vec<String>,
    pub subjects: Vec<String>,
    pub years: Vec<String>,
    pub terms: Vec<String>,
}

impl FilterOptions {
    /// Derive option lists from the product collection.
    ///
    /// Numeric dimensions (grade, year, term) sort numerically; subject
    /// sorts lexicographically with numeric-aware tie-breaking. Term values
    /// are normalized ("T1" and "1" collapse to "1") before deduplication.
    #[must_use]
    pub fn derive(products: &[Product]) -> Self {
        Self {
            grades: unique_sorted_numeric(products.iter().map(|p| p.grade.clone())),
            subjects: unique_sorted_natural(products.iter().map(|p| p.subject.clone())),
            years: unique_sorted_numeric(products.iter().map(|p| p.year.clone())),
            terms: unique_sorted_numeric(products.iter().map(|p| canon_term(&p.term))),
        }
    }
}

/// Filter a product list; the full list (same order) when every dimension is
/// the sentinel. Idempotent: re-filtering a result with the same state
/// returns the same set.
#[must_use]
pub fn apply_filter<'a>(products: &'a [Product], filter: &FilterState) -> Vec<&'a Product> {
    products.iter().filter(|p| matches(p, filter)).collect()
}

/// Case-insensitive equality per constrained dimension; term compares after
/// prefix normalization on both sides.
fn matches(product: &Product, filter: &FilterState) -> bool {
    if !is_all(&filter.grade) && canon(&product.grade) != canon(&filter.grade) {
        return false;
    }
    if !is_all(&filter.subject) && canon(&product.subject) != canon(&filter.subject) {
        return false;
    }
    if !is_all(&filter.year) && canon(&product.year) != canon(&filter.year) {
        return false;
    }
    if !is_all(&filter.term) && canon_term(&product.term) != canon_term(&filter.term) {
        return false;
    }
    true
}

/// The no-constraint sentinel: empty or `ALL`, case-insensitive.
fn is_all(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("ALL")
}

fn canon(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Canonical term value: uppercase with any leading non-digit prefix
/// stripped, so "T1", "Term 1" and "1" all compare equal.
fn canon_term(value: &str) -> String {
    let upper = canon(value);
    match upper.find(|c: char| c.is_ascii_digit()) {
        Some(pos) => upper.get(pos..).unwrap_or_default().to_string(),
        None => upper,
    }
}

/// Dedupe and sort values that are usually numbers; non-numeric stragglers
/// sort after the numeric block, lexicographically.
fn unique_sorted_numeric(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out = dedupe(values);
    out.sort_by(|a, b| match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    out
}

/// Dedupe and sort textual values with numeric-aware tie-breaking, so
/// "Grade 2" orders before "Grade 10".
fn unique_sorted_natural(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out = dedupe(values);
    out.sort_by(|a, b| natural_cmp(a, b));
    out
}

fn dedupe(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && seen.insert(value.to_uppercase()) {
            out.push(value);
        }
    }
    out
}

/// Case-insensitive comparison that treats digit runs as numbers.
fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(lc), Some(rc)) => {
                if lc.is_ascii_digit() && rc.is_ascii_digit() {
                    let ln = take_number(&mut left);
                    let rn = take_number(&mut right);
                    match ln.cmp(&rn) {
                        std::cmp::Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    let lc = lc.to_ascii_uppercase();
                    let rc = rc.to_ascii_uppercase();
                    match lc.cmp(&rc) {
                        std::cmp::Ordering::Equal => {
                            left.next();
                            right.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> u64 {
    let mut n: u64 = 0;
    while let Some(c) = chars.peek().copied() {
        let Some(digit) = c.to_digit(10) else { break };
        n = n.saturating_mul(10).saturating_add(u64::from(digit));
        chars.next();
    }
    n
}
