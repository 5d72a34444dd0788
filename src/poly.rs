//! Exact polynomial arithmetic over arbitrary-precision integers.
//!
//! Polynomials are stored as coefficient vectors (`coeffs[i]` multiplies
//! `x^i`). Recovery of the hardened secret uses Newton's divided
//! differences, where every division must be exact: an inexact quotient
//! means the supplied points do not lie on a common integer polynomial.

use std::collections::HashSet;
use std::ops::Range;

use num_bigint::{BigInt, RandBigInt};
use num_integer::Integer;
use num_traits::Zero;
use rand::{CryptoRng, Rng};

/// Coefficient vector of a polynomial, lowest degree first.
pub type Polynomial = Vec<BigInt>;

/// Default bit-length range for random coefficients.
pub const COEFFICIENT_BITS: Range<u64> = 100..160;

/// An interpolation node `(x, f(x))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    /// Node index.
    pub x: i64,
    /// Value at the node.
    pub y: BigInt,
}

impl Point {
    /// Create a point.
    pub fn new(x: i64, y: BigInt) -> Self {
        Self { x, y }
    }
}

/// Reasons an interpolation can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpolationError {
    /// No points were supplied.
    #[error("Cannot interpolate an empty point set")]
    Empty,

    /// Two points share the same node.
    #[error("Duplicate interpolation node x={0}")]
    DuplicateNode(i64),

    /// A divided difference left a nonzero remainder.
    #[error("Inexact divided difference at order {order}")]
    InexactDivision { order: usize },
}

/// Draw a polynomial with `n` coefficients, each a non-negative integer whose
/// bit-length is drawn uniformly from `bits`.
pub fn random_polynomial<R: Rng + CryptoRng>(rng: &mut R, n: usize, bits: Range<u64>) -> Polynomial {
    (0..n)
        .map(|_| {
            let bit_len = rng.gen_range(bits.clone());
            BigInt::from(rng.gen_biguint(bit_len))
        })
        .collect()
}

/// Like [`random_polynomial`], with the constant term forced to `secret`.
pub fn random_polynomial_with_secret<R: Rng + CryptoRng>(
    rng: &mut R,
    n: usize,
    bits: Range<u64>,
    secret: &BigInt,
) -> Polynomial {
    let mut poly = random_polynomial(rng, n, bits);
    if let Some(constant) = poly.first_mut() {
        *constant = secret.clone();
    }
    poly
}

/// Evaluate `poly` at `x` exactly (Horner's rule).
pub fn evaluate(poly: &[BigInt], x: i64) -> BigInt {
    let x = BigInt::from(x);
    poly.iter()
        .rev()
        .fold(BigInt::zero(), |acc, coeff| acc * &x + coeff)
}

/// Polynomial in Newton form:
/// `p(z) = a[0] + a[1](z-c[0]) + a[2](z-c[0])(z-c[1]) + ...`
///
/// `centers` is always one shorter than `coefficients`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewtonForm {
    coefficients: Vec<BigInt>,
    centers: Vec<i64>,
}

impl NewtonForm {
    /// Divided-difference coefficients.
    pub fn coefficients(&self) -> &[BigInt] {
        &self.coefficients
    }

    /// Centers (the first `m - 1` interpolation nodes).
    pub fn centers(&self) -> &[i64] {
        &self.centers
    }

    /// Evaluate at `z` by nested multiplication.
    pub fn evaluate(&self, z: i64) -> BigInt {
        let mut coeffs = self.coefficients.iter().rev();
        let mut value = match coeffs.next() {
            Some(last) => last.clone(),
            None => return BigInt::zero(),
        };
        let z = BigInt::from(z);
        for (coeff, center) in coeffs.zip(self.centers.iter().rev()) {
            value = coeff + (&z - BigInt::from(*center)) * value;
        }
        value
    }

    /// Expand into monomial coefficients, lowest degree first.
    pub fn to_coefficients(&self) -> Polynomial {
        let mut coeffs = self.coefficients.iter().rev();
        let mut poly: Polynomial = match coeffs.next() {
            Some(last) => vec![last.clone()],
            None => return Vec::new(),
        };
        for (coeff, center) in coeffs.zip(self.centers.iter().rev()) {
            // poly <- poly * (z - center) + coeff
            let center = BigInt::from(*center);
            let mut next = vec![BigInt::zero(); poly.len() + 1];
            for (i, c) in poly.iter().enumerate() {
                next[i + 1] += c;
                next[i] -= c * &center;
            }
            next[0] += coeff;
            poly = next;
        }
        poly
    }
}

/// Interpolate the unique polynomial of degree `< points.len()` through
/// `points`, returning it in Newton form.
///
/// Fails on duplicate nodes and on any divided difference that does not
/// divide exactly.
pub fn interpolate(points: &[Point]) -> Result<NewtonForm, InterpolationError> {
    if points.is_empty() {
        return Err(InterpolationError::Empty);
    }

    let mut seen = HashSet::with_capacity(points.len());
    for point in points {
        if !seen.insert(point.x) {
            return Err(InterpolationError::DuplicateNode(point.x));
        }
    }

    let n = points.len();
    let xs: Vec<i64> = points.iter().map(|p| p.x).collect();
    let mut table: Vec<BigInt> = points.iter().map(|p| p.y.clone()).collect();
    let mut coefficients = Vec::with_capacity(n);
    coefficients.push(table[0].clone());

    for order in 1..n {
        for j in 0..n - order {
            let denominator = BigInt::from(xs[j + order]) - BigInt::from(xs[j]);
            let (quotient, remainder) = (&table[j + 1] - &table[j]).div_rem(&denominator);
            if !remainder.is_zero() {
                return Err(InterpolationError::InexactDivision { order });
            }
            table[j] = quotient;
        }
        coefficients.push(table[0].clone());
    }

    Ok(NewtonForm {
        coefficients,
        centers: xs[..n - 1].to_vec(),
    })
}
