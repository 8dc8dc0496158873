use std::{
    cmp::Ordering,
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
};

/// How many more items a subscriber is willing to receive.
///
/// Demand is additive: every `request` adds to what is already outstanding and never
/// replaces it. Finite arithmetic saturates, so an overflowing sum becomes
/// [`Demand::Unbounded`] and a subtraction never goes below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Demand {
    /// A finite number of items.
    Finite(u64),
    /// As many items as the publisher can produce.
    Unbounded,
}

impl Demand {
    /// No demand at all.
    pub const fn none() -> Self {
        Self::Finite(0)
    }

    /// Demand for at most `n` items.
    pub const fn max(n: u64) -> Self {
        Self::Finite(n)
    }

    pub const fn unbounded() -> Self {
        Self::Unbounded
    }

    pub const fn is_unbounded(&self) -> bool {
        matches!(self, Self::Unbounded)
    }

    /// `true` while at least one more item may be delivered.
    pub const fn has_demand(&self) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Finite(n) => *n > 0,
        }
    }

    /// The finite count, or `None` when unbounded.
    pub const fn remaining(&self) -> Option<u64> {
        match self {
            Self::Finite(n) => Some(*n),
            Self::Unbounded => None,
        }
    }

    pub const fn saturating_add(self, other: Demand) -> Demand {
        match (self, other) {
            (Self::Finite(a), Self::Finite(b)) => match a.checked_add(b) {
                Some(total) => Self::Finite(total),
                None => Self::Unbounded,
            },
            _ => Self::Unbounded,
        }
    }

    /// Removes `k` items, clamping a finite demand at zero.
    pub const fn saturating_sub(self, k: u64) -> Demand {
        match self {
            Self::Unbounded => Self::Unbounded,
            Self::Finite(n) => Self::Finite(n.saturating_sub(k)),
        }
    }

    /// Removes `k` items, or returns `None` if that would take a finite demand below zero.
    pub const fn checked_sub(self, k: u64) -> Option<Demand> {
        match self {
            Self::Unbounded => Some(Self::Unbounded),
            Self::Finite(n) => match n.checked_sub(k) {
                Some(rest) => Some(Self::Finite(rest)),
                None => None,
            },
        }
    }

    /// Multiplies a finite demand, e.g. to ask upstream for `n` items per downstream item.
    pub const fn scaled(self, factor: u64) -> Demand {
        match self {
            Self::Unbounded => Self::Unbounded,
            Self::Finite(n) => match n.checked_mul(factor) {
                Some(total) => Self::Finite(total),
                None => Self::Unbounded,
            },
        }
    }

    /// Consumes a single unit of demand, returning `false` when none is left.
    pub fn consume_one(&mut self) -> bool {
        match self.checked_sub(1) {
            Some(rest) => {
                *self = rest;
                true
            }
            None => false,
        }
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::none()
    }
}

impl From<u64> for Demand {
    fn from(n: u64) -> Self {
        Self::Finite(n)
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(n) => write!(f, "max({n})"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl Ord for Demand {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Unbounded, Self::Unbounded) => Ordering::Equal,
            (Self::Unbounded, Self::Finite(_)) => Ordering::Greater,
            (Self::Finite(_), Self::Unbounded) => Ordering::Less,
            (Self::Finite(a), Self::Finite(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Demand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub<u64> for Demand {
    type Output = Demand;

    fn sub(self, rhs: u64) -> Demand {
        self.saturating_sub(rhs)
    }
}

impl SubAssign<u64> for Demand {
    fn sub_assign(&mut self, rhs: u64) {
        *self = self.saturating_sub(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_is_additive_and_saturates_to_unbounded() {
        assert_eq!(Demand::max(2) + Demand::max(3), Demand::max(5));
        assert_eq!(Demand::max(u64::MAX) + Demand::max(1), Demand::Unbounded);
        assert_eq!(Demand::Unbounded + Demand::max(7), Demand::Unbounded);
        assert_eq!(Demand::max(7) + Demand::Unbounded, Demand::Unbounded);
    }

    #[test]
    fn subtraction_clamps_and_checked_sub_reports_underflow() {
        assert_eq!(Demand::max(2) - 5, Demand::none());
        assert_eq!(Demand::Unbounded - 5, Demand::Unbounded);
        assert_eq!(Demand::max(2).checked_sub(5), None);
        assert_eq!(Demand::max(5).checked_sub(2), Some(Demand::max(3)));
    }

    #[test]
    fn consume_one_stops_at_zero() {
        let mut demand = Demand::max(1);
        assert!(demand.consume_one());
        assert!(!demand.consume_one());
        assert_eq!(demand, Demand::none());

        let mut unbounded = Demand::Unbounded;
        assert!(unbounded.consume_one());
        assert!(unbounded.is_unbounded());
    }

    #[test]
    fn unbounded_orders_above_every_finite_demand() {
        assert!(Demand::Unbounded > Demand::max(u64::MAX));
        assert!(Demand::max(1) > Demand::none());
        assert_eq!(Demand::max(3).scaled(4), Demand::max(12));
        assert_eq!(Demand::max(u64::MAX).scaled(2), Demand::Unbounded);
    }
}
