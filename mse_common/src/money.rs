use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Number of minor units in one major unit of the marketplace currency.
pub const MINOR_UNITS: i64 = 100;

//--------------------------------------        Money        ---------------------------------------------------------
/// An amount of money, held as a signed count of the currency's minor unit.
///
/// Signed so that the same type can express ledger deltas (credits are positive, debits negative). Balances themselves
/// are never negative; that is enforced by the ledger, not the type.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as Money: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| MoneyConversionError(format!("{value} is too large to convert to Money")))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let minor = MINOR_UNITS.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / minor, abs % minor)
    }
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(units: i64) -> Self {
        Self(units * MINOR_UNITS)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtracts `rhs`, but never returns less than zero.
    pub fn saturating_floor_sub(self, rhs: Self) -> Self {
        Self((self.0 - rhs.0).max(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Money::from(0).to_string(), "0.00");
        assert_eq!(Money::from(5).to_string(), "0.05");
        assert_eq!(Money::from_major(1_250).to_string(), "1250.00");
        assert_eq!(Money::from(-12_345).to_string(), "-123.45");
    }

    #[test]
    fn arithmetic() {
        let mut a = Money::from(1_000);
        a += Money::from(500);
        a -= Money::from(200);
        assert_eq!(a, Money::from(1_300));
        assert_eq!(-a, Money::from(-1_300));
        assert_eq!(Money::from(250) * 4, Money::from(1_000));
        let total: Money = [1, 2, 3].into_iter().map(Money::from).sum();
        assert_eq!(total, Money::from(6));
        assert_eq!(Money::from(100).saturating_floor_sub(Money::from(250)), Money::ZERO);
    }

    #[test]
    fn conversion() {
        assert_eq!(Money::try_from(42u64).unwrap(), Money::from(42));
        assert!(Money::try_from(u64::MAX).is_err());
    }

    #[test]
    fn serializes_as_plain_integer() {
        let json = serde_json::to_string(&Money::from(1999)).unwrap();
        assert_eq!(json, "1999");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::from(1999));
    }
}
