// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Feature extraction for caller classification
//!
//! [`FeatureExtractor`] derives a fixed, versioned [`PhoneFeatures`] vector
//! from a phone number and optional call context. Pattern and geographic
//! groups are pure functions of the number; behavioral fields come from
//! bounded-latency, cache-first store reads; contextual fields come from
//! keyword scans over the supplied transcript. Extraction is deterministic
//! for identical inputs, which is what makes the ml-features cache tier
//! sound. The schema version is part of the cache key, so changing the
//! vector shape requires bumping [`FEATURE_SCHEMA_VERSION`].

use std::sync::{Arc, LazyLock};

use chrono::{Datelike, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use shared_types::PhoneNumber;
use tracing::debug;
use uuid::Uuid;

use crate::{
    cache::{FeatureCacheKey, ScreeningCache},
    types::CallContext,
};
use screening_store::{SpamProfileStore, UserInteractionStore};

/// Version of the feature vector shape
///
/// Bump on any field addition, removal or semantic change.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

static MARKETING_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(promotion|discount|offer|free|deal|sale|limited time|exclusive|upgrade|trial|reward)\b",
    )
    .expect("marketing keyword pattern is valid")
});

static URGENCY_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(urgent|immediately|act now|expires?|final notice|last chance|right away|asap|deadline|suspended)\b",
    )
    .expect("urgency keyword pattern is valid")
});

static LOAN_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(loans?|mortgage|refinanc\w*|debt|credit|borrow|interest rate)\b")
        .expect("loan keyword pattern is valid")
});

static INVESTMENT_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(invest(ment)?s?|stocks?|bitcoin|crypto|trading|portfolio|returns)\b")
        .expect("investment keyword pattern is valid")
});

static INSURANCE_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insurance|policy|premium|coverage|claims?)\b")
        .expect("insurance keyword pattern is valid")
});

static SCAM_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(irs|wire transfer|gift cards?|warrant|arrest|social security|verify your account|bank account)\b",
    )
    .expect("scam keyword pattern is valid")
});

/// North American toll-free area codes
const NANP_TOLLFREE: [&str; 8] = ["800", "822", "833", "844", "855", "866", "877", "888"];
/// North American premium-rate area codes
const NANP_PREMIUM: [&str; 2] = ["900", "976"];
/// North American non-geographic area codes commonly routed over VoIP
const NANP_NON_GEOGRAPHIC: [&str; 6] = ["500", "533", "544", "566", "577", "588"];

/// Digit-pattern features of the number itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternFeatures {
    /// Length of the longest run of one repeated digit
    pub longest_repeat_run: u32,
    /// Length of the longest strictly ascending or descending digit run
    pub longest_sequential_run: u32,
    /// Number of distinct digits used
    pub distinct_digits: u32,
    /// Shannon entropy of the digit distribution, normalized to [0, 1]
    pub digit_entropy: f64,
}

impl PatternFeatures {
    /// Analyze the digit pattern of a canonical phone number
    pub fn from_phone(phone: &PhoneNumber) -> Self {
        let digits: Vec<u8> = phone.as_str().bytes().map(|b| b - b'0').collect();
        Self {
            longest_repeat_run: longest_repeat_run(&digits),
            longest_sequential_run: longest_sequential_run(&digits),
            distinct_digits: distinct_digits(&digits),
            digit_entropy: digit_entropy(&digits),
        }
    }

    /// Whether the pattern alone suggests a synthetic number
    ///
    /// Long repeated or sequential runs and very low digit diversity are
    /// characteristic of robocaller number blocks.
    pub fn is_suspicious(&self) -> bool {
        self.longest_repeat_run >= 5 || self.longest_sequential_run >= 5 || self.distinct_digits <= 2
    }
}

/// Prefix-derived geography and line-type flags
///
/// Derived from static prefix tables rather than a live carrier lookup; the
/// engine performs no network I/O.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographicFeatures {
    /// ISO-ish country tag when the prefix is recognized
    pub country: Option<String>,
    /// Area code or national destination code
    pub area_code: Option<String>,
    /// Toll-free number
    pub is_tollfree: bool,
    /// Premium-rate number
    pub is_premium: bool,
    /// Non-geographic number commonly routed over VoIP
    pub is_voip: bool,
    /// Mobile number
    pub is_mobile: bool,
}

impl GeographicFeatures {
    /// Classify a canonical phone number by prefix
    pub fn from_phone(phone: &PhoneNumber) -> Self {
        let digits = phone.as_str();

        if let Some(rest) = digits.strip_prefix("86") {
            // China: 1[3-9]xxxxxxxxx is the mobile plan
            let is_mobile = rest.len() == 11
                && rest.starts_with('1')
                && rest.as_bytes().get(1).is_some_and(|b| (b'3'..=b'9').contains(b));
            return Self {
                country: Some("cn".to_string()),
                area_code: rest.get(..3).map(str::to_string),
                is_mobile,
                ..Self::default()
            };
        }

        if digits.len() == 11 && digits.starts_with('1') {
            // North American Numbering Plan: 1 + 3-digit area code
            let area = &digits[1..4];
            return Self {
                country: Some("us".to_string()),
                area_code: Some(area.to_string()),
                is_tollfree: NANP_TOLLFREE.contains(&area),
                is_premium: NANP_PREMIUM.contains(&area),
                is_voip: NANP_NON_GEOGRAPHIC.contains(&area),
                is_mobile: false,
            };
        }

        if let Some(rest) = digits.strip_prefix("44") {
            return Self {
                country: Some("uk".to_string()),
                area_code: rest.get(..4).map(str::to_string),
                is_mobile: rest.starts_with('7'),
                ..Self::default()
            };
        }

        Self {
            country: None,
            area_code: digits.get(..3).map(str::to_string),
            ..Self::default()
        }
    }
}

/// Store-derived caller behavior, plus per-call timing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralFeatures {
    /// Whether a spam profile exists for this number
    pub known_profile: bool,
    /// Reports accumulated on the spam profile
    pub total_reports: u64,
    /// Successful blocks recorded on the spam profile
    pub successful_blocks: u64,
    /// False positives recorded on the spam profile
    pub false_positive_count: u64,
    /// Interactions between the receiving user and this number
    pub interaction_count: u64,
    /// Times the user blocked this number
    pub block_count: u64,
    /// Times the user allowed this number
    pub allow_count: u64,
    /// block_count over interaction_count, 0 when no interactions
    pub block_ratio: f64,
    /// Explicit user feedback marked this caller as spam
    pub user_flagged_spam: Option<bool>,
    /// Hour of day of the current call (0-23)
    pub call_hour: Option<u8>,
    /// Day of week of the current call (0 = Monday)
    pub call_weekday: Option<u8>,
    /// Call placed outside 08:00-21:00
    pub off_hours: bool,
    /// Duration of the most recent call in seconds
    pub call_duration_seconds: Option<u32>,
}

/// Transcript keyword flags
///
/// Per-category counts let the classifier name a category; the aggregate
/// counts drive the risk contribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextualFeatures {
    /// A transcript was supplied
    pub has_transcript: bool,
    /// Marketing keyword hits
    pub marketing_keyword_hits: u32,
    /// Urgency keyword hits
    pub urgency_keyword_hits: u32,
    /// Loan and credit keyword hits
    pub loan_keyword_hits: u32,
    /// Investment keyword hits
    pub investment_keyword_hits: u32,
    /// Insurance keyword hits
    pub insurance_keyword_hits: u32,
    /// Scam keyword hits
    pub scam_keyword_hits: u32,
    /// Loan, investment and insurance hits combined
    pub financial_keyword_hits: u32,
    /// Total keyword hits across all groups
    pub spam_indicator_count: u32,
}

impl ContextualFeatures {
    /// Scan the supplied text for spam keyword groups
    pub fn from_text(text: &str) -> Self {
        let marketing = count_hits(&MARKETING_KEYWORDS, text);
        let urgency = count_hits(&URGENCY_KEYWORDS, text);
        let loan = count_hits(&LOAN_KEYWORDS, text);
        let investment = count_hits(&INVESTMENT_KEYWORDS, text);
        let insurance = count_hits(&INSURANCE_KEYWORDS, text);
        let scam = count_hits(&SCAM_KEYWORDS, text);

        Self {
            has_transcript: true,
            marketing_keyword_hits: marketing,
            urgency_keyword_hits: urgency,
            loan_keyword_hits: loan,
            investment_keyword_hits: investment,
            insurance_keyword_hits: insurance,
            scam_keyword_hits: scam,
            financial_keyword_hits: loan + investment + insurance,
            spam_indicator_count: marketing + urgency + loan + investment + insurance + scam,
        }
    }
}

fn count_hits(pattern: &Regex, text: &str) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let count = pattern.find_iter(text).count() as u32;
    count
}

/// Fixed feature vector consumed by the classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhoneFeatures {
    /// Shape version of this vector
    pub schema_version: u32,
    /// Digit count of the canonical number
    pub digit_count: u32,
    /// Digit-pattern group
    pub pattern: PatternFeatures,
    /// Geography and line-type group
    pub geographic: GeographicFeatures,
    /// Store-derived behavior group
    pub behavioral: BehavioralFeatures,
    /// Transcript keyword group
    pub contextual: ContextualFeatures,
}

impl PhoneFeatures {
    /// A vector with only the schema version and digit count populated
    pub fn empty(phone: &PhoneNumber) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let digit_count = phone.digit_count() as u32;
        Self {
            schema_version: FEATURE_SCHEMA_VERSION,
            digit_count,
            ..Self::default()
        }
    }
}

/// Derives feature vectors with cache-first behavioral reads
pub struct FeatureExtractor {
    cache: Arc<ScreeningCache>,
    profiles: Arc<dyn SpamProfileStore>,
    interactions: Arc<dyn UserInteractionStore>,
}

impl FeatureExtractor {
    /// Create an extractor over the given cache and stores
    pub fn new(
        cache: Arc<ScreeningCache>,
        profiles: Arc<dyn SpamProfileStore>,
        interactions: Arc<dyn UserInteractionStore>,
    ) -> Self {
        Self {
            cache,
            profiles,
            interactions,
        }
    }

    /// The ml-features cache key for a (phone, context) pair
    pub fn cache_key(phone: &PhoneNumber, context: Option<&CallContext>) -> FeatureCacheKey {
        let fingerprint = context.map_or(0, CallContext::fingerprint);
        FeatureCacheKey::new(phone, fingerprint, FEATURE_SCHEMA_VERSION)
    }

    /// Extract a feature vector, serving from the ml-features tier when possible
    pub async fn extract_cached(
        &self,
        phone: &PhoneNumber,
        user_id: Option<Uuid>,
        context: Option<&CallContext>,
    ) -> PhoneFeatures {
        let key = Self::cache_key(phone, context);
        if !self.cache.is_degraded()
            && let Some(features) = self.cache.get_features(&key)
        {
            return features;
        }

        let features = self.extract(phone, user_id, context).await;
        if !self.cache.is_degraded() {
            self.cache.store_features(key, features.clone());
        }
        features
    }

    /// Extract a feature vector from the number, stores and context
    ///
    /// Store failures are absorbed: the affected behavioral fields stay at
    /// their defaults, which weakens the evidence and steers the classifier
    /// toward `unknown` rather than failing the evaluation.
    pub async fn extract(
        &self,
        phone: &PhoneNumber,
        user_id: Option<Uuid>,
        context: Option<&CallContext>,
    ) -> PhoneFeatures {
        let mut features = PhoneFeatures::empty(phone);
        features.pattern = PatternFeatures::from_phone(phone);
        features.geographic = GeographicFeatures::from_phone(phone);
        features.behavioral = self.behavioral(phone, user_id, context).await;
        features.contextual = Self::contextual(context);
        features
    }

    async fn behavioral(
        &self,
        phone: &PhoneNumber,
        user_id: Option<Uuid>,
        context: Option<&CallContext>,
    ) -> BehavioralFeatures {
        let mut behavioral = BehavioralFeatures::default();
        let phone_hash = phone.hash();

        let profile = if self.cache.is_degraded() {
            None
        } else {
            self.cache.get_spam_profile(&phone_hash)
        };
        let profile = match profile {
            Some(profile) => Some(profile),
            None => match self.profiles.get(&phone_hash).await {
                Ok(profile) => profile,
                Err(e) => {
                    debug!(
                        phone = %phone.log_id(),
                        error = %e,
                        "spam profile read failed during extraction"
                    );
                    None
                }
            },
        };
        if let Some(profile) = profile {
            behavioral.known_profile = true;
            behavioral.total_reports = profile.total_reports;
            behavioral.successful_blocks = profile.successful_blocks;
            behavioral.false_positive_count = profile.false_positive_count;
        }

        if let Some(user_id) = user_id {
            let interaction = if self.cache.is_degraded() {
                None
            } else {
                self.cache.get_user_interaction(user_id, &phone_hash)
            };
            let interaction = match interaction {
                Some(interaction) => Some(interaction),
                None => match self.interactions.get(user_id, &phone_hash).await {
                    Ok(interaction) => interaction,
                    Err(e) => {
                        debug!(
                            phone = %phone.log_id(),
                            error = %e,
                            "user interaction read failed during extraction"
                        );
                        None
                    }
                },
            };
            if let Some(interaction) = interaction {
                behavioral.interaction_count = interaction.interaction_count;
                behavioral.block_count = interaction.block_count;
                behavioral.allow_count = interaction.allow_count;
                behavioral.block_ratio = interaction.block_ratio();
                behavioral.user_flagged_spam =
                    interaction.user_feedback.map(|f| f.confirms_spam());
            }
        }

        if let Some(context) = context {
            if let Some(at) = context.occurred_at {
                #[allow(clippy::cast_possible_truncation)]
                let hour = at.hour() as u8;
                #[allow(clippy::cast_possible_truncation)]
                let weekday = at.weekday().num_days_from_monday() as u8;
                behavioral.call_hour = Some(hour);
                behavioral.call_weekday = Some(weekday);
                behavioral.off_hours = !(8..21).contains(&hour);
            }
            behavioral.call_duration_seconds = context.call_duration_seconds;
        }

        behavioral
    }

    fn contextual(context: Option<&CallContext>) -> ContextualFeatures {
        let Some(context) = context else {
            return ContextualFeatures::default();
        };

        let mut text = String::new();
        if let Some(transcript) = &context.transcript {
            text.push_str(transcript);
        }
        if let Some(caller_name) = &context.caller_name {
            text.push(' ');
            text.push_str(caller_name);
        }
        if text.trim().is_empty() {
            return ContextualFeatures::default();
        }

        let mut contextual = ContextualFeatures::from_text(&text);
        contextual.has_transcript = context.transcript.is_some();
        contextual
    }
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("schema_version", &FEATURE_SCHEMA_VERSION)
            .finish_non_exhaustive()
    }
}

/// Length of the longest run of one repeated digit
fn longest_repeat_run(digits: &[u8]) -> u32 {
    let mut longest = 0u32;
    let mut current = 0u32;
    let mut previous: Option<u8> = None;

    for &digit in digits {
        if previous == Some(digit) {
            current += 1;
        } else {
            current = 1;
        }
        longest = longest.max(current);
        previous = Some(digit);
    }
    longest
}

/// Length of the longest strictly ascending or descending run
fn longest_sequential_run(digits: &[u8]) -> u32 {
    if digits.is_empty() {
        return 0;
    }

    let mut longest = 1u32;
    let mut ascending = 1u32;
    let mut descending = 1u32;

    for pair in digits.windows(2) {
        if pair[1] == pair[0] + 1 {
            ascending += 1;
            descending = 1;
        } else if pair[0] == pair[1] + 1 {
            descending += 1;
            ascending = 1;
        } else {
            ascending = 1;
            descending = 1;
        }
        longest = longest.max(ascending).max(descending);
    }
    longest
}

fn distinct_digits(digits: &[u8]) -> u32 {
    let mut seen = [false; 10];
    for &digit in digits {
        if let Some(slot) = seen.get_mut(digit as usize) {
            *slot = true;
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    let count = seen.iter().filter(|&&s| s).count() as u32;
    count
}

/// Shannon entropy of the digit distribution, normalized by log2(10)
fn digit_entropy(digits: &[u8]) -> f64 {
    if digits.is_empty() {
        return 0.0;
    }

    let mut counts = [0usize; 10];
    for &digit in digits {
        if let Some(slot) = counts.get_mut(digit as usize) {
            *slot += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let total = digits.len() as f64;
    let mut entropy = 0.0;
    for &count in &counts {
        if count > 0 {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / total;
            entropy -= p * p.log2();
        }
    }
    (entropy / 10f64.log2()).clamp(0.0, 1.0)
}
