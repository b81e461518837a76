//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub const DEFAULT_CURRENCY: &'static str = "INR";

    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn inr(amount: Decimal) -> Self { Self::new(amount, Self::DEFAULT_CURRENCY) }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch { left: self.currency.clone(), right: other.currency.clone() });
        }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: Quantity) -> Money { Money::new(self.amount * Decimal::from(qty.get()), &self.currency) }
}

impl Default for Money { fn default() -> Self { Self::zero(Self::DEFAULT_CURRENCY) } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.currency, self.amount) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

/// Line-item quantity, always at least one.
///
/// Out-of-range input is clamped rather than rejected, so a stored document holding `0` or a
/// negative count still loads as a single unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: i64) -> Self { Self(value.clamp(1, i64::from(u32::MAX)) as u32) }
    pub fn get(&self) -> u32 { self.0 }
    pub fn saturating_add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
    pub fn increment(&self) -> Self { Self(self.0.saturating_add(1)) }
    pub fn decrement(&self) -> Self { Self(self.0.saturating_sub(1).max(1)) }
}

impl Default for Quantity { fn default() -> Self { Self::ONE } }
impl From<i64> for Quantity { fn from(value: i64) -> Self { Self::new(value) } }
impl From<Quantity> for u32 { fn from(value: Quantity) -> Self { value.0 } }

/// Six-digit Indian postal code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Pincode(String);

impl Pincode {
    pub fn parse(value: &str) -> Result<Self, PincodeError> {
        let value = value.trim();
        if value.is_empty() { return Err(PincodeError::Empty); }
        if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_digit()) { return Err(PincodeError::Invalid); }
        Ok(Self(value.to_string()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Pincode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl<'de> Deserialize<'de> for Pincode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pincode::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PincodeError {
    #[error("Please enter a ZIP or postal code.")]
    Empty,
    #[error("Please enter a valid ZIP or postal code.")]
    Invalid,
}

/// Identity of an order across all three buckets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UniqueNumber(String);

impl UniqueNumber {
    pub fn generate() -> Self { Self(Uuid::now_v7().simple().to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for UniqueNumber { fn from(value: &str) -> Self { Self(value.to_string()) } }
impl From<String> for UniqueNumber { fn from(value: String) -> Self { Self(value) } }

impl fmt::Display for UniqueNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// Older order documents stored the number as a JSON integer.
impl<'de> Deserialize<'de> for UniqueNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw { Text(String), Number(u64) }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(number) => Self(number.to_string()),
        })
    }
}
