// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Shared types for the call screening service
//!
//! This crate provides common types that are shared across multiple crates
//! in the call screening workspace, avoiding circular dependencies.

pub mod category;
pub mod feedback;
pub mod phone;
pub mod recommendation;
pub mod score;

pub use category::SpamCategory;
pub use feedback::{UserFeedback, WhitelistSource};
pub use phone::{PhoneHash, PhoneNumber, PhoneParseError};
pub use recommendation::Recommendation;
pub use score::{ConfidenceScore, RiskScore, ScoreError};
