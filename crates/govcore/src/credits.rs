use crate::ResourceError;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

const UNLIMITED: &str = "unlimited";

/// Non-negative, arbitrary precision credit amount.
///
/// Credits travel as decimal strings on the wire and all arithmetic is
/// exact. Subtraction is only available in checked or saturating form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Credits(BigUint);

impl Credits {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn parse(field: &str, raw: &str) -> Result<Self, ResourceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ResourceError::MalformedAllocation {
                field: field.to_string(),
                value: raw.to_string(),
            });
        }
        BigUint::parse_bytes(trimmed.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| ResourceError::MalformedAllocation {
                field: field.to_string(),
                value: raw.to_string(),
            })
    }

    pub fn checked_sub(&self, other: &Credits) -> Option<Credits> {
        if other.0 > self.0 {
            None
        } else {
            Some(Credits(&self.0 - &other.0))
        }
    }

    pub fn saturating_sub(&self, other: &Credits) -> Credits {
        self.checked_sub(other).unwrap_or_default()
    }
}

impl FromStr for Credits {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Credits::parse("credits", s)
    }
}

impl From<u64> for Credits {
    fn from(n: u64) -> Self {
        Self(BigUint::from(n))
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Credits {
    type Output = Credits;

    fn add(self, rhs: Credits) -> Credits {
        Credits(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Credits> for &'a Credits {
    type Output = Credits;

    fn add(self, rhs: &'a Credits) -> Credits {
        Credits(&self.0 + &rhs.0)
    }
}

impl AddAssign<&Credits> for Credits {
    fn add_assign(&mut self, rhs: &Credits) {
        self.0 += &rhs.0;
    }
}

impl<'a> Sum<&'a Credits> for Credits {
    fn sum<I: Iterator<Item = &'a Credits>>(iter: I) -> Self {
        iter.fold(Credits::zero(), |mut acc, c| {
            acc += c;
            acc
        })
    }
}

impl Serialize for Credits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_any(CreditsVisitor {
                allow_unlimited: false,
            })
            .and_then(|c| match c {
                CreditCeiling::Limited(credits) => Ok(credits),
                CreditCeiling::Unlimited => {
                    Err(de::Error::custom("unlimited is not a credit amount"))
                }
            })
    }
}

/// Credit ceiling of an allocation or run limit.
///
/// `Unlimited` is a distinct sentinel, never a number. The derived ordering
/// places every limited ceiling below `Unlimited`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CreditCeiling {
    Limited(Credits),
    #[default]
    Unlimited,
}

impl CreditCeiling {
    pub fn limited(amount: impl Into<Credits>) -> Self {
        CreditCeiling::Limited(amount.into())
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, CreditCeiling::Unlimited)
    }

    /// True only when `used` is strictly greater than the ceiling.
    pub fn is_exceeded_by(&self, used: &Credits) -> bool {
        match self {
            CreditCeiling::Limited(max) => used > max,
            CreditCeiling::Unlimited => false,
        }
    }

    /// Remaining headroom, never negative. `None` for an unlimited ceiling.
    pub fn remaining(&self, used: &Credits) -> Option<Credits> {
        match self {
            CreditCeiling::Limited(max) => Some(max.saturating_sub(used)),
            CreditCeiling::Unlimited => None,
        }
    }

    pub fn parse(field: &str, raw: &str) -> Result<Self, ResourceError> {
        if raw.trim().eq_ignore_ascii_case(UNLIMITED) {
            Ok(CreditCeiling::Unlimited)
        } else {
            Credits::parse(field, raw).map(CreditCeiling::Limited)
        }
    }
}

impl From<Credits> for CreditCeiling {
    fn from(credits: Credits) -> Self {
        CreditCeiling::Limited(credits)
    }
}

impl fmt::Display for CreditCeiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditCeiling::Limited(c) => write!(f, "{}", c),
            CreditCeiling::Unlimited => write!(f, "{}", UNLIMITED),
        }
    }
}

impl Serialize for CreditCeiling {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CreditCeiling {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CreditsVisitor { allow_unlimited: true })
    }
}

struct CreditsVisitor {
    allow_unlimited: bool,
}

impl<'de> Visitor<'de> for CreditsVisitor {
    type Value = CreditCeiling;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.allow_unlimited {
            write!(f, "a non-negative decimal string or \"unlimited\"")
        } else {
            write!(f, "a non-negative decimal string")
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(CreditCeiling::Limited(Credits::from(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(|v| CreditCeiling::Limited(Credits::from(v)))
            .map_err(|_| {
                E::custom(ResourceError::MalformedAllocation {
                    field: "credits".into(),
                    value: v.to_string(),
                })
            })
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let parsed = if self.allow_unlimited {
            CreditCeiling::parse("credits", v)
        } else {
            Credits::parse("credits", v).map(CreditCeiling::Limited)
        };
        parsed.map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_beyond_u64_exactly() {
        let big: Credits = "18446744073709551615".parse().unwrap();
        let total = &big + &Credits::from(1);
        assert_eq!(total.to_string(), "18446744073709551616");
    }

    #[test]
    fn rejects_signs_and_garbage() {
        for raw in ["-1", "+3", "1.5", "abc", "", "unlimited"] {
            assert!(raw.parse::<Credits>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn saturating_sub_never_goes_negative() {
        let a = Credits::from(100);
        let b = Credits::from(250);
        assert!(a.checked_sub(&b).is_none());
        assert!(a.saturating_sub(&b).is_zero());
        assert_eq!(b.saturating_sub(&a), Credits::from(150));
    }

    #[test]
    fn ceiling_sentinel_is_not_a_number() {
        let c: CreditCeiling = serde_json::from_str("\"unlimited\"").unwrap();
        assert!(c.is_unlimited());
        let c: CreditCeiling = serde_json::from_str("\"500\"").unwrap();
        assert_eq!(c, CreditCeiling::limited(500));
        let err = serde_json::from_str::<CreditCeiling>("\"lots\"").unwrap_err();
        assert!(err.to_string().contains("Malformed allocation"));
    }

    #[test]
    fn ceiling_equality_is_not_a_breach() {
        let ceiling = CreditCeiling::limited(500);
        assert!(!ceiling.is_exceeded_by(&Credits::from(500)));
        assert!(ceiling.is_exceeded_by(&Credits::from(501)));
        assert!(!CreditCeiling::Unlimited.is_exceeded_by(&Credits::from(u64::MAX)));
    }

    #[test]
    fn limited_orders_below_unlimited() {
        assert!(CreditCeiling::limited(u64::MAX) < CreditCeiling::Unlimited);
        assert!(CreditCeiling::limited(1) < CreditCeiling::limited(2));
    }
}
