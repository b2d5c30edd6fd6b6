// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Request, result and learning event types for the evaluation engine
//!
//! The types here form the engine's external contract: the hosting layer
//! submits an [`EvaluateRequest`] and receives an [`EvaluationResult`];
//! after call completion it submits a [`LearningEvent`]. Everything inside
//! the engine operates on pre-validated types only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{
    ConfidenceScore, PhoneNumber, Recommendation, RiskScore, SpamCategory, UserFeedback,
};
use uuid::Uuid;

use crate::features::PhoneFeatures;

/// An evaluation request as submitted by the hosting layer
///
/// The phone number arrives raw; [`crate::ScreeningEngine::evaluate`]
/// normalizes and validates it before any lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Raw phone number, 10 to 20 digits after normalization
    pub phone: String,
    /// The user receiving the call, when known
    pub user_id: Option<Uuid>,
    /// Optional call context supplied by the telephony layer
    pub context: Option<CallContext>,
    /// Whether to include the extracted feature vector in the result
    pub include_features: bool,
}

impl EvaluateRequest {
    /// Create a request for a raw phone number
    pub fn new<T: Into<String>>(phone: T) -> Self {
        Self {
            phone: phone.into(),
            user_id: None,
            context: None,
            include_features: false,
        }
    }

    /// Attach the receiving user
    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach call context
    #[must_use]
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Request the extracted features in the result
    #[must_use]
    pub fn with_features(mut self) -> Self {
        self.include_features = true;
        self
    }
}

/// Typed call context supplied alongside an evaluation request
///
/// Derives `Hash` so the feature cache can key extracted vectors by
/// (phone, context fingerprint); the fingerprint is only ever used within a
/// single process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallContext {
    /// Transcript or announced purpose captured by the telephony layer
    pub transcript: Option<String>,
    /// Declared caller name from CNAM or the carrier, if any
    pub caller_name: Option<String>,
    /// Duration of the most recent call from this number, in seconds
    pub call_duration_seconds: Option<u32>,
    /// When the call occurred; defaults to evaluation time when absent
    pub occurred_at: Option<DateTime<Utc>>,
}

impl CallContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a transcript
    #[must_use]
    pub fn with_transcript<T: Into<String>>(mut self, transcript: T) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    /// Attach a declared caller name
    #[must_use]
    pub fn with_caller_name<T: Into<String>>(mut self, caller_name: T) -> Self {
        self.caller_name = Some(caller_name.into());
        self
    }

    /// Attach the call duration
    #[must_use]
    pub fn with_duration_seconds(mut self, seconds: u32) -> Self {
        self.call_duration_seconds = Some(seconds);
        self
    }

    /// Attach the call timestamp
    #[must_use]
    pub fn with_occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Process-local fingerprint for feature-cache keying
    pub fn fingerprint(&self) -> u64 {
        use std::hash::{DefaultHasher, Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Output of a classifier run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the caller is judged to be spam
    pub is_spam: bool,
    /// Strongest category signal
    pub category: SpamCategory,
    /// Certainty of the category call
    pub confidence: ConfidenceScore,
    /// Severity for blocking decisions
    pub risk_score: RiskScore,
    /// The rules that fired, in evaluation order
    pub reasoning: Vec<String>,
    /// Version of the scoring model that produced this output
    pub model_version: semver::Version,
}

impl Classification {
    /// Neutral fallback when the classifier times out or fails
    ///
    /// Deliberately weak on both axes so the orchestrator downgrades the
    /// recommendation to `analyze` instead of acting on it.
    pub fn neutral(model_version: semver::Version, reason: &str) -> Self {
        Self {
            is_spam: false,
            category: SpamCategory::Unknown,
            confidence: ConfidenceScore::low(),
            risk_score: RiskScore::zero(),
            reasoning: vec![reason.to_string()],
            model_version,
        }
    }

    /// Whether the confidence is strong enough to act on the category
    pub fn meets(&self, threshold: ConfidenceScore) -> bool {
        self.confidence.meets(threshold)
    }
}

/// The engine's answer for one evaluation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// The evaluated phone number, canonical form
    pub phone: PhoneNumber,
    /// Whether an active whitelist entry short-circuited the evaluation
    pub is_whitelisted: bool,
    /// Certainty of the classification backing the recommendation
    pub confidence_score: ConfidenceScore,
    /// Risk the recommendation was derived from
    pub risk_score: RiskScore,
    /// Established spam category, `unknown` when none
    pub classification: SpamCategory,
    /// The recommended action
    pub recommendation: Recommendation,
    /// The recommendation's standard message, then every rule and threshold
    /// that contributed
    pub reasons: Vec<String>,
    /// Extracted feature vector, present when the request asked for it
    pub ml_features: Option<PhoneFeatures>,
    /// Wall-clock time spent evaluating, in milliseconds
    pub processing_time_ms: u64,
    /// Whether step 2/3 short-circuited from the cache
    pub cache_hit: bool,
}

impl EvaluationResult {
    /// Result for an active whitelist hit
    pub fn whitelisted(phone: PhoneNumber, confidence: ConfidenceScore, cache_hit: bool) -> Self {
        Self {
            phone,
            is_whitelisted: true,
            confidence_score: confidence,
            risk_score: RiskScore::zero(),
            classification: SpamCategory::Unknown,
            recommendation: Recommendation::Allow,
            reasons: vec![Recommendation::Allow.default_message().to_string()],
            ml_features: None,
            processing_time_ms: 0,
            cache_hit,
        }
    }

    /// Result for a caller blocked on profile or classification risk
    pub fn blocked(
        phone: PhoneNumber,
        category: SpamCategory,
        confidence: ConfidenceScore,
        risk: RiskScore,
        cache_hit: bool,
    ) -> Self {
        Self {
            phone,
            is_whitelisted: false,
            confidence_score: confidence,
            risk_score: risk,
            classification: category,
            recommendation: Recommendation::Block,
            reasons: vec![Recommendation::Block.default_message().to_string()],
            ml_features: None,
            processing_time_ms: 0,
            cache_hit,
        }
    }

    /// Result for a caller let through on classification evidence
    pub fn allowed(
        phone: PhoneNumber,
        category: SpamCategory,
        confidence: ConfidenceScore,
        risk: RiskScore,
        recommendation: Recommendation,
    ) -> Self {
        Self {
            phone,
            is_whitelisted: false,
            confidence_score: confidence,
            risk_score: risk,
            classification: category,
            recommendation,
            reasons: vec![recommendation.default_message().to_string()],
            ml_features: None,
            processing_time_ms: 0,
            cache_hit: false,
        }
    }

    /// Safe fallback result deferring the call to the conversation handler
    pub fn deferred(phone: PhoneNumber, confidence: ConfidenceScore, risk: RiskScore) -> Self {
        Self {
            phone,
            is_whitelisted: false,
            confidence_score: confidence,
            risk_score: risk,
            classification: SpamCategory::Unknown,
            recommendation: Recommendation::Analyze,
            reasons: vec![Recommendation::Analyze.default_message().to_string()],
            ml_features: None,
            processing_time_ms: 0,
            cache_hit: false,
        }
    }

    /// Append a contributing reason
    #[must_use]
    pub fn with_reason<T: Into<String>>(mut self, reason: T) -> Self {
        self.reasons.push(reason.into());
        self
    }

    /// Append several contributing reasons
    #[must_use]
    pub fn with_reasons<I>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.reasons.extend(reasons);
        self
    }

    /// Attach the extracted feature vector
    #[must_use]
    pub fn with_features(mut self, features: PhoneFeatures) -> Self {
        self.ml_features = Some(features);
        self
    }

    /// Set the processing time
    #[must_use]
    pub fn with_timing(mut self, processing_time_ms: u64) -> Self {
        self.processing_time_ms = processing_time_ms;
        self
    }
}

/// Kind of outcome captured by a learning event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningEventKind {
    /// The call was let through
    Accept,
    /// The call was rejected
    Reject,
    /// The call reached screening without a definitive accept/reject
    Timeout,
    /// The user explicitly whitelisted the number
    ManualAdd,
    /// The user explicitly removed the number from the whitelist
    ManualRemove,
    /// The user gave post-call feedback
    UserFeedback,
}

impl LearningEventKind {
    /// Returns the snake_case name used in serialized forms and metrics labels
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Timeout => "timeout",
            Self::ManualAdd => "manual_add",
            Self::ManualRemove => "manual_remove",
            Self::UserFeedback => "user_feedback",
        }
    }
}

/// Immutable outcome record consumed exactly once by the learning engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    /// The user involved, when known
    pub user_id: Option<Uuid>,
    /// The evaluated phone number, canonical form
    pub phone: PhoneNumber,
    /// What happened
    pub kind: LearningEventKind,
    /// Confidence of the decision or feedback behind this event
    pub confidence: ConfidenceScore,
    /// Features the decision was derived from, when available
    pub features: Option<PhoneFeatures>,
    /// Explicit user feedback, for `user_feedback` events
    pub feedback: Option<UserFeedback>,
    /// Category observed by the classifier at decision time
    pub category: Option<SpamCategory>,
    /// Risk observed by the classifier at decision time
    pub observed_risk: Option<RiskScore>,
    /// When the outcome occurred
    pub timestamp: DateTime<Utc>,
}

impl LearningEvent {
    /// Create an event with the given kind and confidence
    pub fn new(phone: PhoneNumber, kind: LearningEventKind, confidence: ConfidenceScore) -> Self {
        Self {
            user_id: None,
            phone,
            kind,
            confidence,
            features: None,
            feedback: None,
            category: None,
            observed_risk: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an accept event
    pub fn accept(phone: PhoneNumber, confidence: ConfidenceScore) -> Self {
        Self::new(phone, LearningEventKind::Accept, confidence)
    }

    /// Create a reject event
    pub fn reject(phone: PhoneNumber, confidence: ConfidenceScore) -> Self {
        Self::new(phone, LearningEventKind::Reject, confidence)
    }

    /// Create a screening/no-outcome event
    pub fn screening_timeout(phone: PhoneNumber, confidence: ConfidenceScore) -> Self {
        Self::new(phone, LearningEventKind::Timeout, confidence)
    }

    /// Create a manual whitelist-add event
    pub fn manual_add(user_id: Uuid, phone: PhoneNumber) -> Self {
        Self::new(phone, LearningEventKind::ManualAdd, ConfidenceScore::high()).with_user(user_id)
    }

    /// Create a manual whitelist-remove event
    pub fn manual_remove(user_id: Uuid, phone: PhoneNumber) -> Self {
        Self::new(phone, LearningEventKind::ManualRemove, ConfidenceScore::high())
            .with_user(user_id)
    }

    /// Create a post-call feedback event
    pub fn user_feedback(user_id: Uuid, phone: PhoneNumber, feedback: UserFeedback) -> Self {
        let mut event =
            Self::new(phone, LearningEventKind::UserFeedback, ConfidenceScore::high())
                .with_user(user_id);
        event.feedback = Some(feedback);
        event
    }

    /// Attach the user
    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach the features the decision was derived from
    #[must_use]
    pub fn with_features(mut self, features: PhoneFeatures) -> Self {
        self.features = Some(features);
        self
    }

    /// Attach the classifier observation behind the decision
    #[must_use]
    pub fn with_observation(mut self, category: SpamCategory, risk: RiskScore) -> Self {
        self.category = Some(category);
        self.observed_risk = Some(risk);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders() {
        let user_id = Uuid::new_v4();
        let request = EvaluateRequest::new("+8613800000001")
            .with_user(user_id)
            .with_context(CallContext::new().with_transcript("limited time offer"))
            .with_features();

        assert_eq!(request.phone, "+8613800000001");
        assert_eq!(request.user_id, Some(user_id));
        assert!(request.include_features);
        assert_eq!(
            request.context.unwrap().transcript.as_deref(),
            Some("limited time offer")
        );
    }

    #[test]
    fn context_fingerprint_is_deterministic() {
        let a = CallContext::new().with_transcript("hello").with_duration_seconds(30);
        let b = CallContext::new().with_transcript("hello").with_duration_seconds(30);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = CallContext::new().with_transcript("goodbye");
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn neutral_classification_is_weak() {
        let neutral = Classification::neutral(semver::Version::new(1, 0, 0), "classifier timeout");
        assert!(!neutral.is_spam);
        assert_eq!(neutral.category, SpamCategory::Unknown);
        assert!(!neutral.meets(ConfidenceScore::new(0.7).unwrap()));
        assert_eq!(neutral.reasoning, vec!["classifier timeout".to_string()]);
    }

    #[test]
    fn result_factories_set_recommendation() {
        let phone = PhoneNumber::parse("8613800000001").unwrap();

        let whitelisted =
            EvaluationResult::whitelisted(phone.clone(), ConfidenceScore::high(), true);
        assert!(whitelisted.is_whitelisted);
        assert_eq!(whitelisted.recommendation, Recommendation::Allow);
        assert!(whitelisted.cache_hit);

        let blocked = EvaluationResult::blocked(
            phone.clone(),
            SpamCategory::Loan,
            ConfidenceScore::new(0.92).unwrap(),
            RiskScore::new(0.8).unwrap(),
            false,
        );
        assert_eq!(blocked.recommendation, Recommendation::Block);
        assert_eq!(blocked.classification, SpamCategory::Loan);
        assert!(!blocked.cache_hit);

        let auto_allowed = EvaluationResult::allowed(
            phone.clone(),
            SpamCategory::Unknown,
            ConfidenceScore::new(0.9).unwrap(),
            RiskScore::zero(),
            Recommendation::AutoAllow,
        );
        assert_eq!(auto_allowed.recommendation, Recommendation::AutoAllow);

        let deferred =
            EvaluationResult::deferred(phone, ConfidenceScore::low(), RiskScore::zero());
        assert_eq!(deferred.recommendation, Recommendation::Analyze);
    }

    #[test]
    fn result_reasons_open_with_the_standard_message() {
        let phone = PhoneNumber::parse("8613800000001").unwrap();

        let whitelisted =
            EvaluationResult::whitelisted(phone.clone(), ConfidenceScore::high(), true);
        assert_eq!(
            whitelisted.reasons,
            vec![Recommendation::Allow.default_message().to_string()]
        );

        let auto_allowed = EvaluationResult::allowed(
            phone.clone(),
            SpamCategory::Unknown,
            ConfidenceScore::new(0.9).unwrap(),
            RiskScore::zero(),
            Recommendation::AutoAllow,
        );
        assert_eq!(
            auto_allowed.reasons,
            vec![Recommendation::AutoAllow.default_message().to_string()]
        );

        let blocked = EvaluationResult::blocked(
            phone,
            SpamCategory::Loan,
            ConfidenceScore::new(0.92).unwrap(),
            RiskScore::new(0.8).unwrap(),
            false,
        );
        assert_eq!(blocked.reasons[0], Recommendation::Block.default_message());
    }

    #[test]
    fn result_reason_accumulation() {
        let phone = PhoneNumber::parse("8613800000001").unwrap();
        let result = EvaluationResult::deferred(phone, ConfidenceScore::low(), RiskScore::zero())
            .with_reason("classifier timeout")
            .with_reason("no spam profile")
            .with_timing(12);

        assert_eq!(result.reasons.len(), 3);
        assert_eq!(result.reasons[0], Recommendation::Analyze.default_message());
        assert_eq!(result.processing_time_ms, 12);
    }

    #[test]
    fn event_constructors() {
        let phone = PhoneNumber::parse("8613800000001").unwrap();
        let user_id = Uuid::new_v4();

        let reject = LearningEvent::reject(phone.clone(), ConfidenceScore::new(0.92).unwrap())
            .with_observation(SpamCategory::Loan, RiskScore::new(0.8).unwrap());
        assert_eq!(reject.kind, LearningEventKind::Reject);
        assert_eq!(reject.category, Some(SpamCategory::Loan));
        assert!(reject.user_id.is_none());

        let feedback = LearningEvent::user_feedback(user_id, phone, UserFeedback::NotSpam);
        assert_eq!(feedback.kind, LearningEventKind::UserFeedback);
        assert_eq!(feedback.feedback, Some(UserFeedback::NotSpam));
        assert_eq!(feedback.user_id, Some(user_id));
    }

    #[test]
    fn event_serde_round_trip() {
        let phone = PhoneNumber::parse("8613800000001").unwrap();
        let event = LearningEvent::accept(phone, ConfidenceScore::high());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"accept\""));
        let back: LearningEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
