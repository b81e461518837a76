//! Shipping addresses and the checkout address form rules.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;
use validator::Validate;

static LETTERS_AND_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z\s]+$").expect("static regex"));
static MOBILE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{10}$").expect("static regex"));
static PINCODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("static regex"));

fn default_country() -> String { "India".to_string() }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(
        length(min = 1, message = "Please enter a name."),
        regex(path = "LETTERS_AND_SPACES", message = "Please enter a valid name.")
    )]
    pub name: String,
    #[validate(
        length(min = 1, message = "Please enter a phone number so we can call if there are any issues with delivery."),
        regex(path = "MOBILE", message = "Please enter a valid phone number")
    )]
    pub mobile: String,
    #[validate(length(min = 1, message = "Please enter an address."))]
    pub address: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub landmark: String,
    #[validate(
        length(min = 1, message = "Please enter a city name."),
        regex(path = "LETTERS_AND_SPACES", message = "Please enter a valid city name.")
    )]
    pub city: String,
    #[validate(
        length(min = 1, message = "Please enter a ZIP or postal code."),
        regex(path = "PINCODE", message = "Please enter a valid ZIP or postal code.")
    )]
    pub pincode: String,
    #[validate(length(min = 1, message = "please select your state"))]
    pub state: String,
    #[serde(default = "default_country")]
    pub country: String,
}

impl Address {
    /// Runs the form rules and reports the first failing message of every field.
    pub fn check(&self) -> Result<(), AddressError> {
        let Err(errors) = self.validate() else { return Ok(()) };
        let fields = errors
            .field_errors()
            .into_iter()
            .filter_map(|(field, errs)| {
                let first = errs.first()?;
                let message = first.message.as_ref().map_or_else(|| first.code.to_string(), ToString::to_string);
                Some((field.to_string(), message))
            })
            .collect();
        Err(AddressError::Invalid(fields))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is invalid: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
    Invalid(BTreeMap<String, String>),
}

impl AddressError {
    pub fn fields(&self) -> &BTreeMap<String, String> {
        match self { Self::Invalid(fields) => fields }
    }
}
