//! Phone number validation.

use crate::error::PairgateError;
use serde::{Deserialize, Serialize};
use std::fmt;

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// A validated phone number: 10-15 ASCII digits, no `+` or separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Validate raw user input. Nothing is trimmed or stripped: any character
    /// other than a digit rejects the whole input.
    pub fn parse(raw: &str) -> Result<Self, PairgateError> {
        let len_ok = (MIN_DIGITS..=MAX_DIGITS).contains(&raw.len());
        if len_ok && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(PairgateError::InvalidPhoneNumber(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
