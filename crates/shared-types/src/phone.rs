// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Phone number types and normalization
//!
//! This module provides the single validation boundary for caller phone
//! numbers. Every phone number entering the engine is normalized into a
//! [`PhoneNumber`] exactly once; everything downstream operates on the
//! canonical form or on its one-way [`PhoneHash`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Minimum number of digits in a canonical phone number
pub const MIN_PHONE_DIGITS: usize = 10;
/// Maximum number of digits in a canonical phone number
pub const MAX_PHONE_DIGITS: usize = 20;

/// A normalized, validated phone number
///
/// Construction strips all formatting (spaces, dashes, parentheses, a leading
/// `+`) and keeps only the digits. The canonical form must contain between
/// 10 and 20 digits; anything else is rejected at this boundary so internal
/// code never sees a malformed number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a raw phone number string
    ///
    /// # Errors
    ///
    /// Returns `PhoneParseError` if the input contains characters other than
    /// digits and common formatting, or if the digit count falls outside the
    /// 10..=20 range.
    pub fn parse(raw: &str) -> Result<Self, PhoneParseError> {
        if raw.trim().is_empty() {
            return Err(PhoneParseError::Empty);
        }

        let mut digits = String::with_capacity(raw.len());
        for (index, ch) in raw.trim().chars().enumerate() {
            match ch {
                '0'..='9' => digits.push(ch),
                // A plus sign is only meaningful as an international prefix
                '+' if index == 0 => {}
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return Err(PhoneParseError::InvalidCharacter(ch)),
            }
        }

        let count = digits.len();
        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&count) {
            return Err(PhoneParseError::InvalidLength(count));
        }

        Ok(Self(digits))
    }

    /// The canonical digit string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of digits in the canonical form
    pub fn digit_count(&self) -> usize {
        self.0.len()
    }

    /// One-way hash of this number, suitable for shared profile keys
    pub fn hash(&self) -> PhoneHash {
        PhoneHash::of(self)
    }

    /// A short, non-reversible prefix of the hash for log correlation
    ///
    /// Raw phone numbers must never appear in logs; this prefix is the
    /// loggable identity of a caller.
    pub fn log_id(&self) -> String {
        self.hash().short()
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhoneNumber {
    type Err = PhoneParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

/// One-way SHA-256 hash of a canonical phone number, hex encoded
///
/// Spam profiles are shared across users and keyed by this hash so that the
/// raw number is never stored in, or retrievable from, the shared records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneHash(String);

impl PhoneHash {
    /// Hash prefix length used for log correlation
    const SHORT_LEN: usize = 12;

    /// Compute the hash of a normalized phone number
    pub fn of(phone: &PhoneNumber) -> Self {
        let digest = Sha256::digest(phone.as_str().as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            use fmt::Write as _;
            // Writing to a String cannot fail
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// The full hex-encoded hash
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix for logging and metrics labels
    pub fn short(&self) -> String {
        self.0.chars().take(Self::SHORT_LEN).collect()
    }
}

impl fmt::Display for PhoneHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for phone number parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneParseError {
    /// Input was empty or whitespace only
    #[error("phone number is empty")]
    Empty,
    /// Input contained a character that is not a digit or formatting
    #[error("phone number contains invalid character: {0:?}")]
    InvalidCharacter(char),
    /// Digit count outside the accepted 10..=20 range
    #[error("phone number must contain {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits, got {0}")]
    InvalidLength(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_formatting() {
        let phone = PhoneNumber::parse("+86 138-0000-0001").unwrap();
        assert_eq!(phone.as_str(), "8613800000001");
        assert_eq!(phone.digit_count(), 13);
    }

    #[test]
    fn parse_accepts_parentheses_and_dots() {
        let phone = PhoneNumber::parse("(555) 123.4567 890").unwrap();
        assert_eq!(phone.as_str(), "5551234567890");
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(PhoneNumber::parse(""), Err(PhoneParseError::Empty));
        assert_eq!(PhoneNumber::parse("   "), Err(PhoneParseError::Empty));
    }

    #[test]
    fn parse_rejects_letters() {
        assert_eq!(
            PhoneNumber::parse("1800CALLNOW"),
            Err(PhoneParseError::InvalidCharacter('C'))
        );
    }

    #[test]
    fn parse_rejects_interior_plus() {
        assert_eq!(
            PhoneNumber::parse("86+13800000001"),
            Err(PhoneParseError::InvalidCharacter('+'))
        );
    }

    #[test]
    fn parse_rejects_short_and_long() {
        assert_eq!(
            PhoneNumber::parse("123456789"),
            Err(PhoneParseError::InvalidLength(9))
        );
        assert_eq!(
            PhoneNumber::parse("123456789012345678901"),
            Err(PhoneParseError::InvalidLength(21))
        );
    }

    #[test]
    fn boundary_lengths_accepted() {
        assert!(PhoneNumber::parse("1234567890").is_ok());
        assert!(PhoneNumber::parse("12345678901234567890").is_ok());
    }

    #[test]
    fn hash_is_stable_and_formatting_independent() {
        let a = PhoneNumber::parse("+8613800000001").unwrap();
        let b = PhoneNumber::parse("86 138 0000 0001").unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().as_str().len(), 64);
    }

    #[test]
    fn hash_differs_for_different_numbers() {
        let a = PhoneNumber::parse("8613800000001").unwrap();
        let b = PhoneNumber::parse("8613800000002").unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn log_id_is_short_prefix() {
        let phone = PhoneNumber::parse("8613800000001").unwrap();
        let id = phone.log_id();
        assert_eq!(id.len(), 12);
        assert!(phone.hash().as_str().starts_with(&id));
    }

    #[test]
    fn serde_round_trip_normalizes() {
        let parsed: PhoneNumber = serde_json::from_str("\"+86 138-0000-0001\"").unwrap();
        assert_eq!(parsed.as_str(), "8613800000001");
        assert_eq!(
            serde_json::to_string(&parsed).unwrap(),
            "\"8613800000001\""
        );
    }

    #[test]
    fn serde_rejects_malformed() {
        assert!(serde_json::from_str::<PhoneNumber>("\"123\"").is_err());
        assert!(serde_json::from_str::<PhoneNumber>("\"call-me\"").is_err());
    }
}
