//! Floating-point expansion arithmetic.
//!
//! An *expansion* is a sum of `f64` components, sorted by increasing magnitude and
//! pairwise non-overlapping, whose exact (unrounded) sum is the represented value.
//! The primitives below never round away information, so the sign of the most
//! significant component is the exact sign of the value. They back the exact tier of
//! [`crate::geometry::predicates`].
//!
//! # References
//!
//! - J. R. Shewchuk, "Adaptive Precision Floating-Point Arithmetic and Fast Robust
//!   Geometric Predicates", Discrete & Computational Geometry 18(3), 1997.

use smallvec::SmallVec;

/// Inline capacity of an [`Expansion`]; exact orientation determinants fit comfortably.
const EXPANSION_INLINE: usize = 16;

/// A non-overlapping expansion, least significant component first, zeros eliminated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    components: SmallVec<[f64; EXPANSION_INLINE]>,
}

/// `a + b = x + y` exactly, with `x = fl(a + b)`.
#[inline]
#[must_use]
pub fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let b_virtual = x - a;
    let a_virtual = x - b_virtual;
    let b_round = b - b_virtual;
    let a_round = a - a_virtual;
    (x, a_round + b_round)
}

/// `a - b = x + y` exactly, with `x = fl(a - b)`.
#[inline]
#[must_use]
pub fn two_diff(a: f64, b: f64) -> (f64, f64) {
    let x = a - b;
    let b_virtual = a - x;
    let a_virtual = x + b_virtual;
    let b_round = b_virtual - b;
    let a_round = a - a_virtual;
    (x, a_round + b_round)
}

/// `a + b = x + y` exactly; requires `|a| >= |b|`.
#[inline]
#[must_use]
pub fn fast_two_sum(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let b_virtual = x - a;
    (x, b - b_virtual)
}

/// `a * b = x + y` exactly, with `x = fl(a * b)`.
///
/// Uses a fused multiply-add for the error term instead of Dekker splitting.
#[inline]
#[must_use]
pub fn two_product(a: f64, b: f64) -> (f64, f64) {
    let x = a * b;
    (x, a.mul_add(b, -x))
}

#[allow(clippy::should_implement_trait)]
impl Expansion {
    /// The expansion representing zero.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// Single-component expansion.
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        let mut components = SmallVec::new();
        if value != 0.0 {
            components.push(value);
        }
        Self { components }
    }

    /// Exact difference `a - b` of two doubles.
    #[must_use]
    pub fn from_diff(a: f64, b: f64) -> Self {
        let (x, y) = two_diff(a, b);
        Self::from_pair(x, y)
    }

    /// Exact product `a * b` of two doubles.
    #[must_use]
    pub fn from_product(a: f64, b: f64) -> Self {
        let (x, y) = two_product(a, b);
        Self::from_pair(x, y)
    }

    fn from_pair(high: f64, low: f64) -> Self {
        let mut components = SmallVec::new();
        if low != 0.0 {
            components.push(low);
        }
        if high != 0.0 {
            components.push(high);
        }
        Self { components }
    }

    /// Components, least significant first.
    #[must_use]
    pub fn components(&self) -> &[f64] {
        &self.components
    }

    /// `true` if the value is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.components.is_empty()
    }

    /// Exact sign: `-1.0`, `0.0` or `1.0`.
    #[must_use]
    pub fn sign(&self) -> f64 {
        match self.components.last() {
            Some(&top) if top > 0.0 => 1.0,
            Some(_) => -1.0,
            None => 0.0,
        }
    }

    /// Rounded approximation of the value.
    #[must_use]
    pub fn estimate(&self) -> f64 {
        self.components.iter().sum()
    }

    /// Rounded approximation whose sign is guaranteed to equal [`Expansion::sign`].
    #[must_use]
    pub fn signed_estimate(&self) -> f64 {
        let value = self.estimate();
        let sign = self.sign();
        if value.signum() == sign || sign == 0.0 {
            value
        } else {
            sign * f64::MIN_POSITIVE
        }
    }

    /// Exact sum `self + b` (Shewchuk's `GROW-EXPANSION` with zero elimination).
    #[must_use]
    pub fn grow(&self, b: f64) -> Self {
        let mut out = SmallVec::with_capacity(self.components.len() + 1);
        let mut q = b;
        for &e in &self.components {
            let (sum, err) = two_sum(q, e);
            if err != 0.0 {
                out.push(err);
            }
            q = sum;
        }
        if q != 0.0 {
            out.push(q);
        }
        Self { components: out }
    }

    /// Exact sum of two expansions.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        let (small, large) = if self.components.len() < other.components.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .components
            .iter()
            .fold(large.clone(), |acc, &c| acc.grow(c))
    }

    /// Exact negation.
    #[must_use]
    pub fn neg(&self) -> Self {
        Self {
            components: self.components.iter().map(|c| -c).collect(),
        }
    }

    /// Exact difference of two expansions.
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    /// Exact product with a double (Shewchuk's `SCALE-EXPANSION` with zero elimination).
    #[must_use]
    pub fn scale(&self, b: f64) -> Self {
        let mut out = SmallVec::with_capacity(self.components.len() * 2);
        let mut iter = self.components.iter();
        let Some(&first) = iter.next() else {
            return Self::zero();
        };
        let (mut q, err) = two_product(first, b);
        if err != 0.0 {
            out.push(err);
        }
        for &e in iter {
            let (product_high, product_low) = two_product(e, b);
            let (sum, err) = two_sum(q, product_low);
            if err != 0.0 {
                out.push(err);
            }
            let (new_q, err) = fast_two_sum(product_high, sum);
            if err != 0.0 {
                out.push(err);
            }
            q = new_q;
        }
        if q != 0.0 {
            out.push(q);
        }
        Self { components: out }
    }

    /// Exact product of two expansions.
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        let (small, large) = if self.components.len() < other.components.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .components
            .iter()
            .fold(Self::zero(), |acc, &c| acc.add(&large.scale(c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sum_recovers_lost_bits() {
        let (x, y) = two_sum(1.0, 1e-20);
        assert_eq!(x, 1.0);
        assert_eq!(y, 1e-20);
    }

    #[test]
    fn test_two_product_is_exact() {
        let a = 1.0 + f64::EPSILON;
        let (x, y) = two_product(a, a);
        // (1 + e)^2 = 1 + 2e + e^2; the e^2 term lives in the error component.
        assert_eq!(x, 1.0 + 2.0 * f64::EPSILON);
        assert_eq!(y, f64::EPSILON * f64::EPSILON);
    }

    #[test]
    fn test_sign_of_cancelling_sum() {
        let big = Expansion::from_f64(1e300);
        let tiny = Expansion::from_f64(1e-300);
        let sum = big.add(&tiny).sub(&big);
        assert_eq!(sum.sign(), 1.0);
        assert_eq!(sum.estimate(), 1e-300);
        assert!(big.sub(&big).is_zero());
    }

    #[test]
    fn test_product_of_differences() {
        // (0.1 - 0.3) * (0.7 - 0.2) is not representable, but its sign is exact.
        let a = Expansion::from_diff(0.1, 0.3);
        let b = Expansion::from_diff(0.7, 0.2);
        let product = a.mul(&b);
        assert_eq!(product.sign(), -1.0);
        assert!((product.estimate() + 0.1).abs() < 1e-15);
    }

    #[test]
    fn test_components_are_ordered_and_nonzero() {
        let e = Expansion::from_f64(3.0)
            .grow(1e-17)
            .grow(1e-34)
            .scale(7.0);
        assert!(e.components().iter().all(|&c| c != 0.0));
        for pair in e.components().windows(2) {
            assert!(pair[0].abs() <= pair[1].abs());
        }
    }
}
