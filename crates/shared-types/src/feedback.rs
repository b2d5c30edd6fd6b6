// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! User feedback and whitelist provenance types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Feedback a user gives about a screened call after the fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFeedback {
    /// The call was spam
    Spam,
    /// The call was legitimate
    NotSpam,
    /// The user could not tell
    Unknown,
    /// The call was partly unwanted (e.g. legitimate business, pushy sales)
    PartialSpam,
}

impl UserFeedback {
    /// Returns the snake_case name used in serialized forms and metrics labels
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::NotSpam => "not_spam",
            Self::Unknown => "unknown",
            Self::PartialSpam => "partial_spam",
        }
    }

    /// Whether the feedback confirms the caller as spam
    pub const fn confirms_spam(self) -> bool {
        matches!(self, Self::Spam)
    }

    /// Whether the feedback clears the caller
    pub const fn clears_caller(self) -> bool {
        matches!(self, Self::NotSpam)
    }
}

impl fmt::Display for UserFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a whitelist entry came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitelistSource {
    /// Added explicitly by the user
    Manual,
    /// Added automatically from the user's contacts
    Auto,
    /// Added with an expiry (e.g. expected delivery call)
    Temporary,
    /// Promoted by the learning engine from observed outcomes
    Learned,
}

impl WhitelistSource {
    /// Returns the snake_case name used in serialized forms and metrics labels
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Temporary => "temporary",
            Self::Learned => "learned",
        }
    }

    /// Whether entries from this source were created without user action
    pub const fn is_machine_created(self) -> bool {
        matches!(self, Self::Auto | Self::Learned)
    }
}

impl fmt::Display for WhitelistSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
