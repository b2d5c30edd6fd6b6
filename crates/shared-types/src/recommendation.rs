// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Screening recommendation types

use std::fmt;

use serde::{Deserialize, Serialize};

/// The engine's recommended action for an incoming call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Let the call through
    Allow,
    /// Reject the call
    Block,
    /// Hand the call to the AI conversation handler for further analysis
    Analyze,
    /// Let the call through and promote the caller without confirmation
    AutoAllow,
}

impl Recommendation {
    /// Returns the snake_case name used in serialized forms and metrics labels
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
            Self::Analyze => "analyze",
            Self::AutoAllow => "auto_allow",
        }
    }

    /// Whether the call is let through
    pub const fn is_permissive(self) -> bool {
        matches!(self, Self::Allow | Self::AutoAllow)
    }

    /// Whether the call is rejected outright
    pub const fn is_block(self) -> bool {
        matches!(self, Self::Block)
    }

    /// Whether the decision defers to the conversation handler
    pub const fn is_deferred(self) -> bool {
        matches!(self, Self::Analyze)
    }

    /// Get a default message for this recommendation
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Allow => "caller is trusted, connecting the call",
            Self::Block => "caller risk exceeds the block threshold",
            Self::Analyze => "no definitive signal, screening the call",
            Self::AutoAllow => "caller classified safe with high confidence",
        }
    }

    /// Returns all recommendation variants
    pub const fn all() -> &'static [Self] {
        &[Self::Allow, Self::Block, Self::Analyze, Self::AutoAllow]
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendation_boolean_checks() {
        assert!(Recommendation::Allow.is_permissive());
        assert!(Recommendation::AutoAllow.is_permissive());
        assert!(!Recommendation::Block.is_permissive());
        assert!(Recommendation::Block.is_block());
        assert!(Recommendation::Analyze.is_deferred());
        assert!(!Recommendation::Allow.is_deferred());
    }

    #[test]
    fn serde_serialization() {
        assert_eq!(
            serde_json::to_string(&Recommendation::AutoAllow).unwrap(),
            "\"auto_allow\""
        );
        assert_eq!(
            serde_json::to_string(&Recommendation::Block).unwrap(),
            "\"block\""
        );
    }

    #[test]
    fn serde_deserialization() {
        let deserialized: Recommendation = serde_json::from_str("\"analyze\"").unwrap();
        assert_eq!(deserialized, Recommendation::Analyze);

        let deserialized: Recommendation = serde_json::from_str("\"auto_allow\"").unwrap();
        assert_eq!(deserialized, Recommendation::AutoAllow);
    }

    #[test]
    fn default_messages_non_empty() {
        for &recommendation in Recommendation::all() {
            assert!(!recommendation.default_message().is_empty());
        }
    }
}
