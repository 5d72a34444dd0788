//! Password-keyed masking of polynomial values into instruction tables.
//!
//! Each feature `i` owns two nodes of the hardening polynomial: `2i`
//! (the *alpha* branch, taken when the feature falls below its threshold)
//! and `2i + 1` (the *beta* branch). The stored values are the polynomial
//! values multiplied by a mask derived from the password and node index, so
//! only the right password divides them back out exactly.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_traits::Zero;
use sha2::{Digest, Sha256};

use crate::poly::Point;
use crate::Error;

/// Public modulus for masks (~164 bits).
pub const LARGE_PRIME: &str = "25262728293031323334353637383940414243444546474849";

/// [`LARGE_PRIME`] as little-endian 32-bit digits.
const LARGE_PRIME_DIGITS: [u32; 6] = [
    0x8c4a_1361,
    0x37bf_eedd,
    0xdfca_9180,
    0x0aae_a0c8,
    0x4913_ea63,
    0x0000_0011,
];

fn large_prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| BigUint::from_slice(&LARGE_PRIME_DIGITS))
}

/// Which of a feature's two table entries is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// Node `2i`, feature below threshold.
    Alpha,
    /// Node `2i + 1`, feature at or above threshold.
    Beta,
}

impl Branch {
    /// Pick the branch for an observed feature value.
    pub fn select(value: f64, threshold: f64) -> Self {
        if value < threshold {
            Branch::Alpha
        } else {
            Branch::Beta
        }
    }

    /// Node index of this branch for feature `feature`.
    pub fn node(self, feature: usize) -> usize {
        match self {
            Branch::Alpha => 2 * feature,
            Branch::Beta => 2 * feature + 1,
        }
    }

    /// The other branch.
    pub fn opposite(self) -> Self {
        match self {
            Branch::Alpha => Branch::Beta,
            Branch::Beta => Branch::Alpha,
        }
    }
}

/// SHA-256 of `password || node` (node in decimal), read as a big-endian
/// unsigned integer and reduced modulo [`LARGE_PRIME`].
pub fn derive_mask(password: &str, node: usize) -> BigInt {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(node.to_string().as_bytes());
    let digest = hasher.finalize();
    BigInt::from(BigUint::from_bytes_be(&digest) % large_prime())
}

/// One masked row of the instruction table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    /// Masked value at node `2i`.
    pub alpha: BigInt,
    /// Masked value at node `2i + 1`.
    pub beta: BigInt,
}

impl TableRow {
    /// Stored value for `branch`.
    pub fn value(&self, branch: Branch) -> &BigInt {
        match branch {
            Branch::Alpha => &self.alpha,
            Branch::Beta => &self.beta,
        }
    }
}

impl fmt::Display for TableRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.alpha, self.beta)
    }
}

impl FromStr for TableRow {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let (Some(alpha), Some(beta), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::Storage("Malformed table row: expected 2 fields".to_string()));
        };
        let parse = |field: &str| {
            BigInt::from_str(field)
                .map_err(|e| Error::Storage(format!("Malformed table value: {}", e)))
        };
        Ok(Self {
            alpha: parse(alpha)?,
            beta: parse(beta)?,
        })
    }
}

/// Mask `y0` and `y1` for feature `feature`.
///
/// The products are not reduced, so decoding is plain exact division.
pub fn encode_row(y0: &BigInt, y1: &BigInt, feature: usize, password: &str) -> TableRow {
    TableRow {
        alpha: y0 * derive_mask(password, Branch::Alpha.node(feature)),
        beta: y1 * derive_mask(password, Branch::Beta.node(feature)),
    }
}

/// Unmask the `branch` entry of `row` into an interpolation point.
///
/// Returns `None` when the mask does not divide the stored value exactly,
/// which is what a wrong password almost always produces.
pub fn decode_node(row: &TableRow, feature: usize, password: &str, branch: Branch) -> Option<Point> {
    let node = branch.node(feature);
    let mask = derive_mask(password, node);
    if mask.is_zero() {
        return None;
    }
    let (y, remainder) = row.value(branch).div_rem(&mask);
    if !remainder.is_zero() {
        return None;
    }
    Some(Point::new(node as i64, y))
}

/// Per-user table of masked polynomial values, one row per feature.
///
/// Always written and replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstructionTable {
    rows: Vec<TableRow>,
}

impl InstructionTable {
    /// Wrap a full set of rows.
    pub fn new(rows: Vec<TableRow>) -> Self {
        Self { rows }
    }

    /// Rows in feature order.
    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    /// Number of features covered.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Textual form: one `"<alpha> <beta>"` line per feature.
    pub fn to_text(&self) -> String {
        self.rows
            .iter()
            .map(TableRow::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse the textual form. Blank lines are ignored.
    pub fn from_text(text: &str) -> Result<Self, Error> {
        let rows = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(TableRow::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }
}
