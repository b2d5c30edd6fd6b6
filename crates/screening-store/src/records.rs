// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Durable record types for whitelist entries, spam profiles and user
//! interaction history
//!
//! Every record carries a `version` counter used for optimistic concurrency:
//! an upsert must present the version it read, and stores reject writes whose
//! version no longer matches. Records are plain data; stores own persistence
//! and the learning engine owns score mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{
    ConfidenceScore, PhoneHash, PhoneNumber, RiskScore, SpamCategory, UserFeedback,
    WhitelistSource,
};
use uuid::Uuid;

/// A per-user record marking a phone number as always-allowed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Unique entry id
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// The whitelisted phone number (canonical form)
    pub phone: PhoneNumber,
    /// How the entry came to exist
    pub source: WhitelistSource,
    /// Confidence that the caller is wanted
    pub confidence_score: ConfidenceScore,
    /// Whether the entry participates in screening
    pub is_active: bool,
    /// Optional expiry; an expired entry is treated as absent
    pub expires_at: Option<DateTime<Utc>>,
    /// Number of times this entry short-circuited an evaluation
    pub hit_count: u64,
    /// When the entry last short-circuited an evaluation
    pub last_hit_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by the store on every write
    pub version: u64,
}

impl WhitelistEntry {
    /// Create an entry added explicitly by the user
    pub fn manual(user_id: Uuid, phone: PhoneNumber) -> Self {
        Self::with_source(user_id, phone, WhitelistSource::Manual, ConfidenceScore::high())
    }

    /// Create an entry promoted by the learning engine
    pub fn learned(user_id: Uuid, phone: PhoneNumber, confidence: ConfidenceScore) -> Self {
        Self::with_source(user_id, phone, WhitelistSource::Learned, confidence)
    }

    /// Create an entry that expires at the given time
    pub fn temporary(user_id: Uuid, phone: PhoneNumber, expires_at: DateTime<Utc>) -> Self {
        let mut entry =
            Self::with_source(user_id, phone, WhitelistSource::Temporary, ConfidenceScore::medium());
        entry.expires_at = Some(expires_at);
        entry
    }

    fn with_source(
        user_id: Uuid,
        phone: PhoneNumber,
        source: WhitelistSource,
        confidence_score: ConfidenceScore,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            phone,
            source,
            confidence_score,
            is_active: true,
            expires_at: None,
            hit_count: 0,
            last_hit_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Set an expiry on the entry
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the entry has passed its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether the entry may short-circuit an evaluation
    ///
    /// An expired entry is never usable, regardless of `is_active`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    /// Record a screening hit against this entry
    pub fn record_hit(&mut self, now: DateTime<Utc>) {
        self.hit_count += 1;
        self.last_hit_at = Some(now);
        self.updated_at = now;
    }

    /// Deactivate the entry without deleting it
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }
}

/// A global, phone-hash-keyed record of observed spam risk
///
/// Shared across all users who have interacted with the number; the raw phone
/// number is never stored here. Risk and confidence are only ever smoothed by
/// the learning engine, never reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamProfile {
    /// One-way hash of the phone number
    pub phone_hash: PhoneHash,
    /// Strongest established category for the number
    pub category: SpamCategory,
    /// Current smoothed risk
    pub risk_score: RiskScore,
    /// Certainty of the category call
    pub confidence_level: ConfidenceScore,
    /// Count of spam reports contributing to this profile
    pub total_reports: u64,
    /// Count of calls blocked on the strength of this profile
    pub successful_blocks: u64,
    /// Count of reports later contradicted by user feedback
    pub false_positive_count: u64,
    /// First time the number was reported
    pub first_reported: DateTime<Utc>,
    /// Most recent event touching this profile
    pub last_activity: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by the store on every write
    pub version: u64,
}

impl SpamProfile {
    /// Create an empty profile for a number with no history
    pub fn new(phone_hash: PhoneHash) -> Self {
        let now = Utc::now();
        Self {
            phone_hash,
            category: SpamCategory::Unknown,
            risk_score: RiskScore::zero(),
            confidence_level: ConfidenceScore::zero(),
            total_reports: 0,
            successful_blocks: 0,
            false_positive_count: 0,
            first_reported: now,
            last_activity: now,
            version: 0,
        }
    }

    /// Create a profile seeded from a classifier observation
    pub fn from_observation(
        phone_hash: PhoneHash,
        category: SpamCategory,
        risk_score: RiskScore,
        confidence_level: ConfidenceScore,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            phone_hash,
            category,
            risk_score,
            confidence_level,
            total_reports: 0,
            successful_blocks: 0,
            false_positive_count: 0,
            first_reported: observed_at,
            last_activity: observed_at,
            version: 0,
        }
    }

    /// Record a spam report against this profile
    pub fn note_report(&mut self, at: DateTime<Utc>) {
        self.total_reports += 1;
        self.last_activity = at;
    }

    /// Record a call blocked on the strength of this profile
    pub fn note_block(&mut self, at: DateTime<Utc>) {
        self.successful_blocks += 1;
        self.last_activity = at;
    }

    /// Record a report contradicted by user feedback
    pub fn note_false_positive(&mut self, at: DateTime<Utc>) {
        self.false_positive_count += 1;
        self.last_activity = at;
    }

    /// Hours elapsed between the last profile activity and `at`
    ///
    /// Returns zero when `at` precedes the last activity.
    pub fn staleness_hours(&self, at: DateTime<Utc>) -> f64 {
        let seconds = (at - self.last_activity).num_seconds();
        if seconds <= 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            seconds as f64 / 3600.0
        }
    }
}

/// Per-user interaction history with a spam-profiled number
///
/// Personalizes the shared [`SpamProfile`] risk for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSpamInteraction {
    /// The user
    pub user_id: Uuid,
    /// One-way hash of the phone number
    pub phone_hash: PhoneHash,
    /// Total screened calls between this user and number
    pub interaction_count: u64,
    /// Calls blocked for this user
    pub block_count: u64,
    /// Calls allowed for this user
    pub allow_count: u64,
    /// The user's most recent explicit feedback, if any
    pub user_feedback: Option<UserFeedback>,
    /// Smoothed agreement between engine decisions and user feedback
    pub ai_accuracy_score: ConfidenceScore,
    /// Most recent interaction timestamp
    pub last_interaction: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by the store on every write
    pub version: u64,
}

impl UserSpamInteraction {
    /// Accuracy smoothing step per feedback event
    const ACCURACY_ALPHA: f64 = 0.2;

    /// Create an empty interaction record
    pub fn new(user_id: Uuid, phone_hash: PhoneHash) -> Self {
        Self {
            user_id,
            phone_hash,
            interaction_count: 0,
            block_count: 0,
            allow_count: 0,
            user_feedback: None,
            ai_accuracy_score: ConfidenceScore::medium(),
            last_interaction: Utc::now(),
            version: 0,
        }
    }

    /// Record one screened call and its outcome
    pub fn note_interaction(&mut self, blocked: bool, at: DateTime<Utc>) {
        self.interaction_count += 1;
        if blocked {
            self.block_count += 1;
        } else {
            self.allow_count += 1;
        }
        self.last_interaction = at;
    }

    /// Record explicit user feedback and fold it into the accuracy score
    pub fn note_feedback(&mut self, feedback: UserFeedback, agreed: bool, at: DateTime<Utc>) {
        self.user_feedback = Some(feedback);
        let target = if agreed {
            ConfidenceScore::saturating(1.0)
        } else {
            ConfidenceScore::zero()
        };
        self.ai_accuracy_score = self
            .ai_accuracy_score
            .nudged_toward(target, Self::ACCURACY_ALPHA);
        self.last_interaction = at;
    }

    /// Fraction of interactions that ended in a block
    pub fn block_ratio(&self) -> f64 {
        if self.interaction_count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.block_count as f64 / self.interaction_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("+8613800000001").unwrap()
    }

    #[test]
    fn manual_entry_defaults() {
        let entry = WhitelistEntry::manual(Uuid::new_v4(), phone());
        assert_eq!(entry.source, WhitelistSource::Manual);
        assert!(entry.is_active);
        assert!(entry.expires_at.is_none());
        assert_eq!(entry.hit_count, 0);
        assert_eq!(entry.version, 0);
    }

    #[test]
    fn expired_entry_is_never_usable() {
        let now = Utc::now();
        let mut entry = WhitelistEntry::temporary(Uuid::new_v4(), phone(), now - Duration::hours(1));
        assert!(entry.is_active);
        assert!(entry.is_expired(now));
        assert!(!entry.is_usable(now));

        // Still unusable even if explicitly flagged active
        entry.is_active = true;
        assert!(!entry.is_usable(now));
    }

    #[test]
    fn future_expiry_is_usable_until_passed() {
        let now = Utc::now();
        let entry = WhitelistEntry::temporary(Uuid::new_v4(), phone(), now + Duration::hours(1));
        assert!(entry.is_usable(now));
        assert!(!entry.is_usable(now + Duration::hours(2)));
    }

    #[test]
    fn deactivated_entry_is_not_usable() {
        let now = Utc::now();
        let mut entry = WhitelistEntry::manual(Uuid::new_v4(), phone());
        entry.deactivate(now);
        assert!(!entry.is_usable(now));
    }

    #[test]
    fn record_hit_updates_counters() {
        let now = Utc::now();
        let mut entry = WhitelistEntry::manual(Uuid::new_v4(), phone());
        entry.record_hit(now);
        entry.record_hit(now);
        assert_eq!(entry.hit_count, 2);
        assert_eq!(entry.last_hit_at, Some(now));
    }

    #[test]
    fn profile_counters() {
        let now = Utc::now();
        let mut profile = SpamProfile::new(phone().hash());
        profile.note_report(now);
        profile.note_block(now);
        profile.note_report(now);
        assert_eq!(profile.total_reports, 2);
        assert_eq!(profile.successful_blocks, 1);
        assert_eq!(profile.false_positive_count, 0);
        assert_eq!(profile.last_activity, now);
    }

    #[test]
    fn profile_staleness() {
        let mut profile = SpamProfile::new(phone().hash());
        let observed = Utc::now();
        profile.last_activity = observed;
        let later = observed + Duration::hours(6);
        assert!((profile.staleness_hours(later) - 6.0).abs() < 0.01);
        assert!(profile.staleness_hours(observed - Duration::hours(1)).abs() < f64::EPSILON);
    }

    #[test]
    fn interaction_block_ratio() {
        let now = Utc::now();
        let mut interaction = UserSpamInteraction::new(Uuid::new_v4(), phone().hash());
        assert!(interaction.block_ratio().abs() < f64::EPSILON);

        interaction.note_interaction(true, now);
        interaction.note_interaction(true, now);
        interaction.note_interaction(false, now);
        assert_eq!(interaction.interaction_count, 3);
        assert!((interaction.block_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn feedback_moves_accuracy_toward_agreement() {
        let now = Utc::now();
        let mut interaction = UserSpamInteraction::new(Uuid::new_v4(), phone().hash());
        let before = interaction.ai_accuracy_score.value();

        interaction.note_feedback(UserFeedback::Spam, true, now);
        assert!(interaction.ai_accuracy_score.value() > before);

        let after_agree = interaction.ai_accuracy_score.value();
        interaction.note_feedback(UserFeedback::NotSpam, false, now);
        assert!(interaction.ai_accuracy_score.value() < after_agree);
        assert_eq!(interaction.user_feedback, Some(UserFeedback::NotSpam));
    }

    #[test]
    fn records_serde_round_trip() {
        let entry = WhitelistEntry::manual(Uuid::new_v4(), phone());
        let json = serde_json::to_string(&entry).unwrap();
        let back: WhitelistEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);

        let profile = SpamProfile::new(phone().hash());
        let json = serde_json::to_string(&profile).unwrap();
        let back: SpamProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(profile, back);
    }
}
