use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::Error;

/// Non-negative fixed-point price with 8 decimal places.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u64);

impl Price {
    const MULTIPLIER: u64 = 100_000_000;  // 10^8

    pub fn from_raw(value: u64) -> Self {
        Price(value)
    }

    pub fn raw_value(&self) -> u64 {
        self.0
    }

    /// Rejects negative, NaN and infinite values.
    pub fn from_f64(value: f64) -> Result<Self, Error> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::InvalidPrice(value.to_string()));
        }
        let scaled = (value * Self::MULTIPLIER as f64).round();
        if scaled > u64::MAX as f64 {
            return Err(Error::InvalidPrice(value.to_string()));
        }
        Ok(Price(scaled as u64))
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / Self::MULTIPLIER as f64
    }

    pub fn one() -> Self {
        Price(Self::MULTIPLIER)
    }

    pub fn zero() -> Self {
        Price(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for Price {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s.trim()
            .parse()
            .map_err(|_| Error::InvalidPrice(s.to_string()))?;
        Price::from_f64(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}
