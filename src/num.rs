use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, Signed, Zero};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// Decimal places assumed for every BRC-20 tick when scaling raw amounts.
pub const DEFAULT_TICK_DECIMALS: u8 = 18;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum NumError {
  #[error("invalid number: {0}")]
  InvalidNum(String),
}

#[derive(PartialEq, PartialOrd, Debug, Clone, Default)]
pub struct Num(BigDecimal);

impl Num {
  pub fn zero() -> Self {
    Self(BigDecimal::zero())
  }

  pub fn is_zero(&self) -> bool {
    self.0.is_zero()
  }

  pub fn is_positive(&self) -> bool {
    self.0.is_positive()
  }

  /// Moves the decimal point `exp` places; negative values divide by a power of ten.
  pub fn shift(&self, exp: i64) -> Self {
    let (digits, scale) = self.0.as_bigint_and_exponent();
    Self(BigDecimal::new(digits, scale - exp)).normalized()
  }

  /// Parses a raw integer amount reported by the index and scales it down by the tick decimals.
  /// An empty string is zero.
  pub fn from_raw_amount(amount: &str) -> Result<Self, NumError> {
    if amount.is_empty() {
      return Ok(Self::zero());
    }
    Ok(Self::from_str(amount)?.shift(-i64::from(DEFAULT_TICK_DECIMALS)))
  }

  pub fn normalized(&self) -> Self {
    let normalized = self.0.normalized();
    let (_, scale) = normalized.as_bigint_and_exponent();
    if scale < 0 {
      Self(normalized.with_scale(0))
    } else {
      Self(normalized)
    }
  }
}

impl From<u64> for Num {
  fn from(n: u64) -> Self {
    Self(BigDecimal::from(n))
  }
}

impl From<u128> for Num {
  fn from(n: u128) -> Self {
    Self(BigDecimal::from(BigInt::from(n)))
  }
}

impl Add for Num {
  type Output = Num;

  fn add(self, rhs: Num) -> Num {
    Self(self.0 + rhs.0)
  }
}

impl<'a> Add<&'a Num> for &'a Num {
  type Output = Num;

  fn add(self, rhs: &'a Num) -> Num {
    Num(&self.0 + &rhs.0)
  }
}

impl Sub for Num {
  type Output = Num;

  fn sub(self, rhs: Num) -> Num {
    Self(self.0 - rhs.0)
  }
}

impl<'a> Sub<&'a Num> for &'a Num {
  type Output = Num;

  fn sub(self, rhs: &'a Num) -> Num {
    Num(&self.0 - &rhs.0)
  }
}

impl Neg for Num {
  type Output = Num;

  fn neg(self) -> Num {
    Self(-self.0)
  }
}

impl FromStr for Num {
  type Err = NumError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.starts_with('.') || s.ends_with('.') || s.find(&['e', 'E', '+', '-']).is_some() {
      return Err(NumError::InvalidNum(s.to_string()));
    }
    let num = BigDecimal::from_str(s).map_err(|_| NumError::InvalidNum(s.to_string()))?;
    Ok(Self(num))
  }
}

impl Display for Num {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

impl Serialize for Num {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for Num {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let s = String::deserialize(deserializer)?;
    Ok(Self(BigDecimal::from_str(&s).map_err(de::Error::custom)?))
  }
}
