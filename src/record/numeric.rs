//! JSON encoding for arbitrary-precision table numbers.
//!
//! The source store keeps numbers as decimals with up to 38 significant digits
//! and an exponent far outside the `f64` range for integers. JSON consumers
//! generally read numbers as `i64`/`u64`/`f64`, so:
//!
//! - integral values are written as JSON integers (lossless within `i64`/`u64`)
//! - values with a fractional part are written as JSON floats
//!
//! Integral values that do not fit 64 bits are downgraded to floats as well.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_traits::ToPrimitive;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Arbitrary-precision decimal read from the source store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Number(BigDecimal);

/// The JSON-compatible form chosen for a [`Number`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncodedNumber {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
}

/// Error produced when a number cannot be parsed or represented in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumericError {
    #[error("empty number")]
    Empty,

    #[error("invalid number '{text}': {reason}")]
    Invalid { text: String, reason: String },

    #[error("number {0} is out of range for a JSON float")]
    OutOfRange(String),
}

impl Number {
    /// Wraps an already parsed decimal.
    pub fn new(value: BigDecimal) -> Self {
        Self(value)
    }

    /// Returns the underlying decimal.
    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    /// True when the minimal representation of the value has no fractional part.
    pub fn is_integral(&self) -> bool {
        self.0.is_integer()
    }

    /// Nearest `f64`, rounded from the full decimal text.
    pub fn to_f64(&self) -> Option<f64> {
        self.0.to_string().parse::<f64>().ok()
    }

    /// Chooses the JSON representation for this value.
    ///
    /// # Errors
    ///
    /// Returns `NumericError` when the value has no finite `f64` form.
    pub fn encode(&self) -> Result<EncodedNumber, NumericError> {
        if self.is_integral() {
            if let Some(i) = self.0.to_i64() {
                return Ok(EncodedNumber::Integer(i));
            }
            if let Some(u) = self.0.to_u64() {
                return Ok(EncodedNumber::Unsigned(u));
            }
        }

        match self.to_f64() {
            Some(f) if f.is_finite() => Ok(EncodedNumber::Float(f)),
            _ => Err(NumericError::OutOfRange(self.0.to_string())),
        }
    }
}

impl FromStr for Number {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(NumericError::Empty);
        }
        BigDecimal::from_str(trimmed)
            .map(Number)
            .map_err(|e| NumericError::Invalid {
                text: trimmed.to_string(),
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.encode().map_err(serde::ser::Error::custom)? {
            EncodedNumber::Integer(i) => serializer.serialize_i64(i),
            EncodedNumber::Unsigned(u) => serializer.serialize_u64(u),
            EncodedNumber::Float(f) => serializer.serialize_f64(f),
        }
    }
}
