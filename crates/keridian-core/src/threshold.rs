//! Signing thresholds: simple counts and weighted multi-clause fractions.
//!
//! Weighted evaluation is exact rational arithmetic. Satisfaction is the
//! comparison `sum >= 1` per clause with no rounding step, so results are
//! identical across implementations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::ValidationError;

/// An exact rational weight in `[0, 1]`, stored in lowest terms.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weight {
    num: u64,
    den: u64,
}

impl Weight {
    /// Weight of exactly one: a single key satisfies its clause.
    pub const ONE: Weight = Weight { num: 1, den: 1 };

    /// Create a weight `num/den`, reduced to lowest terms.
    ///
    /// Fails if the denominator is zero or the fraction exceeds 1.
    pub fn new(num: u64, den: u64) -> Result<Self, ValidationError> {
        if den == 0 {
            return Err(ValidationError::InvalidThreshold(
                "weight denominator is zero".to_string(),
            ));
        }
        if num > den {
            return Err(ValidationError::InvalidThreshold(format!(
                "weight {}/{} exceeds 1",
                num, den
            )));
        }
        let g = gcd(num, den);
        Ok(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Numerator in lowest terms.
    pub const fn num(&self) -> u64 {
        self.num
    }

    /// Denominator in lowest terms.
    pub const fn den(&self) -> u64 {
        self.den
    }
}

impl fmt::Debug for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Euclid on u64; `gcd(0, d) == d`, so `0/d` reduces to `0/1`.
fn gcd(a: u64, b: u64) -> u64 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

fn gcd128(a: u128, b: u128) -> u128 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

/// Running exact sum of weights. `None` on arithmetic overflow, which
/// `validate` turns into a rejected threshold before any satisfaction
/// check can hit it.
fn add_weight(acc: (u128, u128), w: Weight) -> Option<(u128, u128)> {
    let (an, ad) = acc;
    let num = an
        .checked_mul(w.den as u128)?
        .checked_add((w.num as u128).checked_mul(ad)?)?;
    let den = ad.checked_mul(w.den as u128)?;
    let g = gcd128(num, den);
    Some((num / g, den / g))
}

/// Sum the given weights exactly; `Some(true)` if the sum reaches 1.
fn clause_reaches_one(weights: impl Iterator<Item = Weight>) -> Option<bool> {
    let mut acc = (0u128, 1u128);
    for w in weights {
        acc = add_weight(acc, w)?;
    }
    Some(acc.0 >= acc.1)
}

/// The signing threshold attached to a key list.
///
/// `Simple(n)` requires signatures from at least `n` distinct keys.
/// `Weighted` holds one or more clauses of per-key weights; key indices
/// run globally across the concatenated clauses, and satisfaction
/// requires every clause's selected weights to sum to at least 1.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningThreshold {
    /// At least `n` of the declared keys.
    Simple(u64),
    /// Weighted clauses; all clauses must be satisfied.
    Weighted(Vec<Vec<Weight>>),
}

impl SigningThreshold {
    /// A simple `n`-of-M threshold.
    pub const fn simple(n: u64) -> Self {
        SigningThreshold::Simple(n)
    }

    /// A weighted threshold from clauses of weights.
    pub fn weighted(clauses: Vec<Vec<Weight>>) -> Self {
        SigningThreshold::Weighted(clauses)
    }

    /// Number of keys this threshold spans, if it constrains the count.
    ///
    /// `Simple` fits any key list at least `n` long; `Weighted` requires
    /// exactly one weight per key.
    pub fn weight_count(&self) -> Option<usize> {
        match self {
            SigningThreshold::Simple(_) => None,
            SigningThreshold::Weighted(clauses) => {
                Some(clauses.iter().map(|c| c.len()).sum())
            }
        }
    }

    /// Check the threshold is well-formed for a key list of `key_count`.
    pub fn validate(&self, key_count: usize) -> Result<(), ValidationError> {
        match self {
            SigningThreshold::Simple(n) => {
                if *n == 0 {
                    return Err(ValidationError::InvalidThreshold(
                        "threshold must be at least 1".to_string(),
                    ));
                }
                if *n > key_count as u64 {
                    return Err(ValidationError::InvalidThreshold(format!(
                        "threshold {} exceeds {} keys",
                        n, key_count
                    )));
                }
                Ok(())
            }
            SigningThreshold::Weighted(clauses) => {
                if clauses.is_empty() {
                    return Err(ValidationError::InvalidThreshold(
                        "no weight clauses".to_string(),
                    ));
                }
                let total: usize = clauses.iter().map(|c| c.len()).sum();
                if total != key_count {
                    return Err(ValidationError::InvalidThreshold(format!(
                        "{} weights for {} keys",
                        total, key_count
                    )));
                }
                for clause in clauses {
                    if clause.is_empty() {
                        return Err(ValidationError::InvalidThreshold(
                            "empty weight clause".to_string(),
                        ));
                    }
                    match clause_reaches_one(clause.iter().copied()) {
                        Some(true) => {}
                        Some(false) => {
                            return Err(ValidationError::InvalidThreshold(
                                "clause weights sum below 1; unsatisfiable".to_string(),
                            ))
                        }
                        None => {
                            return Err(ValidationError::InvalidThreshold(
                                "weight denominators overflow".to_string(),
                            ))
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Whether signatures from the given key indices satisfy the
    /// threshold. Indices are deduplicated; a key counts once no matter
    /// how many signatures carry it. Out-of-range indices contribute
    /// nothing.
    pub fn satisfied(&self, indices: &[usize], key_count: usize) -> bool {
        let distinct: BTreeSet<usize> =
            indices.iter().copied().filter(|i| *i < key_count).collect();

        match self {
            SigningThreshold::Simple(n) => distinct.len() as u64 >= *n,
            SigningThreshold::Weighted(clauses) => {
                let mut offset = 0usize;
                for clause in clauses {
                    let selected = clause.iter().enumerate().filter_map(|(i, w)| {
                        distinct.contains(&(offset + i)).then_some(*w)
                    });
                    match clause_reaches_one(selected) {
                        Some(true) => {}
                        _ => return false,
                    }
                    offset += clause.len();
                }
                true
            }
        }
    }
}

impl fmt::Debug for SigningThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningThreshold::Simple(n) => write!(f, "Simple({})", n),
            SigningThreshold::Weighted(clauses) => {
                write!(f, "Weighted(")?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "[")?;
                    for (j, w) in clause.iter().enumerate() {
                        if j > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", w)?;
                    }
                    write!(f, "]")?;
                }
                write!(f, ")")
            }
        }
    }
}
