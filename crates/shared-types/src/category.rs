// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Spam category types
//!
//! This module provides the closed set of spam categories a caller can be
//! classified into, shared between the classifier, the durable spam profiles
//! and the evaluation results.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Category of observed spam behavior for a phone number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamCategory {
    /// Unsolicited sales and telemarketing calls
    Sales,
    /// Loan offers and debt-related solicitation
    Loan,
    /// Investment and trading solicitation
    Investment,
    /// Insurance solicitation
    Insurance,
    /// Fraudulent or deceptive calls
    Scam,
    /// No category has been established
    Unknown,
}

impl SpamCategory {
    /// Returns the snake_case name used in serialized forms and metrics labels
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Loan => "loan",
            Self::Investment => "investment",
            Self::Insurance => "insurance",
            Self::Scam => "scam",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a concrete category has been established
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Whether this category describes financially motivated solicitation
    pub const fn is_financial(self) -> bool {
        matches!(self, Self::Loan | Self::Investment | Self::Insurance)
    }

    /// Returns all categories
    pub const fn all() -> &'static [Self] {
        &[
            Self::Sales,
            Self::Loan,
            Self::Investment,
            Self::Insurance,
            Self::Scam,
            Self::Unknown,
        ]
    }
}

impl Default for SpamCategory {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for SpamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpamCategory {
    type Err = CategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sales" => Ok(Self::Sales),
            "loan" => Ok(Self::Loan),
            "investment" => Ok(Self::Investment),
            "insurance" => Ok(Self::Insurance),
            "scam" => Ok(Self::Scam),
            "unknown" => Ok(Self::Unknown),
            _ => Err(CategoryParseError(s.to_string())),
        }
    }
}

/// Error type for category parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported spam category: {0}. Supported categories are: sales, loan, investment, insurance, scam, unknown")]
pub struct CategoryParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_predicates() {
        assert!(SpamCategory::Loan.is_known());
        assert!(SpamCategory::Loan.is_financial());
        assert!(SpamCategory::Investment.is_financial());
        assert!(!SpamCategory::Scam.is_financial());
        assert!(!SpamCategory::Unknown.is_known());
    }

    #[test]
    fn category_round_trip() {
        for &category in SpamCategory::all() {
            let parsed = SpamCategory::from_str(category.as_str()).unwrap();
            assert_eq!(category, parsed);
        }
        assert!(SpamCategory::from_str("robocall").is_err());
    }

    #[test]
    fn serde_snake_case() {
        let serialized = serde_json::to_string(&SpamCategory::Loan).unwrap();
        assert_eq!(serialized, "\"loan\"");

        let deserialized: SpamCategory = serde_json::from_str("\"scam\"").unwrap();
        assert_eq!(deserialized, SpamCategory::Scam);
    }

    #[test]
    fn default_is_unknown() {
        assert_eq!(SpamCategory::default(), SpamCategory::Unknown);
    }
}
