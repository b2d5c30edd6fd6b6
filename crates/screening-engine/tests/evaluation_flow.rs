// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the evaluation pipeline
//!
//! Each test drives a full engine over in-memory repositories with a scripted
//! classifier, then inspects the recommendation and, after the learning
//! pipeline settles, the durable records it produced.

use std::time::{Duration, Instant};

use chrono::Utc;
use screening_engine::{EngineError, EvaluateRequest, LearningEvent};
use screening_store::{SpamProfile, SpamProfileStore, WhitelistEntry, WhitelistStore};
use shared_types::{
    ConfidenceScore, PhoneNumber, Recommendation, RiskScore, SpamCategory, UserFeedback,
};
use uuid::Uuid;

use fixtures::*;

const SPAM_PHONE: &str = "+8613800000001";
const CLEAN_PHONE: &str = "+12025550123";

/// First sighting of a spam number: blocked from the classifier alone, and
/// the learning pipeline seeds a durable profile from the observation
#[tokio::test]
async fn first_evaluation_blocks_and_seeds_profile() {
    let fixture = engine_with(ScriptedClassifier::loan_scam());

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(SPAM_PHONE))
        .await
        .expect("Evaluation failed");

    assert_eq!(result.recommendation, Recommendation::Block);
    assert!(!result.cache_hit);
    assert!(!result.is_whitelisted);
    assert_eq!(result.classification, SpamCategory::Loan);
    assert!((result.risk_score.value() - 0.8).abs() < 1e-9);
    assert!(!result.reasons.is_empty());

    fixture.engine.settle_learning().await;
    let phone = PhoneNumber::parse(SPAM_PHONE).unwrap();
    let profile = fixture
        .profiles
        .get(&phone.hash())
        .await
        .unwrap()
        .expect("Profile was not created");
    assert_eq!(profile.total_reports, 1);
    assert_eq!(profile.successful_blocks, 1);
    assert_eq!(profile.category, SpamCategory::Loan);
    assert!(profile.risk_score.meets(RiskScore::new(0.75).unwrap()));

    fixture.engine.shutdown().await;
}

/// Re-evaluation within the spam-profile TTL is served from the cache with
/// the same recommendation
#[tokio::test]
async fn repeat_evaluation_blocks_from_cache() {
    let fixture = engine_with(ScriptedClassifier::loan_scam());

    let first = fixture
        .engine
        .evaluate(EvaluateRequest::new(SPAM_PHONE))
        .await
        .unwrap();
    assert!(!first.cache_hit);

    let second = fixture
        .engine
        .evaluate(EvaluateRequest::new(SPAM_PHONE))
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.recommendation, first.recommendation);
    assert_eq!(second.recommendation, Recommendation::Block);

    fixture.engine.shutdown().await;
}

/// An active whitelist entry wins over a classifier that would block, and
/// the hit is recorded through the learning queue
#[tokio::test]
async fn whitelist_beats_spam_classifier() {
    let fixture = engine_with(ScriptedClassifier::loan_scam());
    let user_id = Uuid::new_v4();
    let phone = PhoneNumber::parse(SPAM_PHONE).unwrap();
    fixture
        .whitelist
        .upsert(WhitelistEntry::manual(user_id, phone.clone()))
        .await
        .unwrap();

    let request = EvaluateRequest::new(SPAM_PHONE).with_user(user_id);
    let first = fixture.engine.evaluate(request.clone()).await.unwrap();
    assert_eq!(first.recommendation, Recommendation::Allow);
    assert!(first.is_whitelisted);
    assert!(!first.cache_hit);

    let second = fixture.engine.evaluate(request).await.unwrap();
    assert!(second.is_whitelisted);
    assert!(second.cache_hit);

    fixture.engine.settle_learning().await;
    let entry = fixture.whitelist.get(user_id, &phone).await.unwrap().unwrap();
    assert_eq!(entry.hit_count, 2);
    assert!(entry.last_hit_at.is_some());

    fixture.engine.shutdown().await;
}

/// An entry past its expiry never allows, regardless of its active flag
#[tokio::test]
async fn expired_whitelist_entry_is_ignored() {
    let fixture = engine_with(ScriptedClassifier::loan_scam());
    let user_id = Uuid::new_v4();
    let phone = PhoneNumber::parse(SPAM_PHONE).unwrap();
    let mut entry = WhitelistEntry::manual(user_id, phone);
    entry.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
    assert!(entry.is_active);
    fixture.whitelist.upsert(entry).await.unwrap();

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(SPAM_PHONE).with_user(user_id))
        .await
        .unwrap();

    assert!(!result.is_whitelisted);
    assert_eq!(result.recommendation, Recommendation::Block);

    fixture.engine.shutdown().await;
}

/// A classifier that never answers still produces a decision inside the
/// evaluation budget
#[tokio::test]
async fn stalled_classifier_defers_within_budget() {
    let fixture = engine_with(StalledClassifier);
    let started = Instant::now();

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(CLEAN_PHONE))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.recommendation, Recommendation::Analyze);
    assert!(result.reasons.iter().any(|r| r.contains("timed out")));

    fixture.engine.shutdown().await;
}

#[tokio::test]
async fn failing_classifier_defers() {
    let fixture = engine_with(FailingClassifier);

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(CLEAN_PHONE))
        .await
        .unwrap();

    assert_eq!(result.recommendation, Recommendation::Analyze);

    fixture.engine.shutdown().await;
}

#[tokio::test]
async fn malformed_phone_is_rejected_before_lookup() {
    let fixture = engine_with(ScriptedClassifier::clean());

    for raw in ["", "123", "not-a-phone", "+12-ab-5550123"] {
        let err = fixture
            .engine
            .evaluate(EvaluateRequest::new(raw))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }), "raw: {raw}");
        assert_eq!(err.code(), "validation_error");
    }

    fixture.engine.shutdown().await;
}

/// With the cache degraded the engine reads repositories directly and says so
#[tokio::test]
async fn degraded_cache_serves_from_repositories() {
    let fixture = engine_with(ScriptedClassifier::clean());
    let phone = PhoneNumber::parse(SPAM_PHONE).unwrap();
    let profile = SpamProfile::from_observation(
        phone.hash(),
        SpamCategory::Scam,
        RiskScore::new(0.9).unwrap(),
        ConfidenceScore::high(),
        Utc::now(),
    );
    fixture.profiles.upsert(profile).await.unwrap();
    fixture.engine.mark_cache_degraded("test");

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(SPAM_PHONE))
        .await
        .unwrap();

    assert_eq!(result.recommendation, Recommendation::Block);
    assert!(!result.cache_hit);
    assert!(result.reasons.iter().any(|r| r.contains("degraded")));

    fixture.engine.clear_cache_degraded();
    fixture.engine.shutdown().await;
}

/// High-confidence clean verdict with no prior record auto-allows
#[tokio::test]
async fn unknown_trusted_caller_is_auto_allowed() {
    let fixture = engine_with(ScriptedClassifier::trusted());

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(CLEAN_PHONE))
        .await
        .unwrap();

    assert_eq!(result.recommendation, Recommendation::AutoAllow);
    assert!(result.reasons.iter().any(|r| r.contains("auto-learn")));

    fixture.engine.shutdown().await;
}

/// The same verdict against an existing record downgrades to a plain allow
#[tokio::test]
async fn reported_caller_is_not_auto_allowed() {
    let fixture = engine_with(ScriptedClassifier::trusted());
    let phone = PhoneNumber::parse(CLEAN_PHONE).unwrap();
    let mut profile = SpamProfile::from_observation(
        phone.hash(),
        SpamCategory::Sales,
        RiskScore::new(0.2).unwrap(),
        ConfidenceScore::medium(),
        Utc::now(),
    );
    profile.total_reports = 2;
    fixture.profiles.upsert(profile).await.unwrap();

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(CLEAN_PHONE))
        .await
        .unwrap();

    assert_eq!(result.recommendation, Recommendation::Allow);

    fixture.engine.shutdown().await;
}

#[tokio::test]
async fn uncertain_verdict_defers_to_analysis() {
    let fixture = engine_with(ScriptedClassifier::uncertain());

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(CLEAN_PHONE))
        .await
        .unwrap();

    assert_eq!(result.recommendation, Recommendation::Analyze);

    fixture.engine.shutdown().await;
}

/// Stored spam evidence blocks even when the fresh classification is clean
#[tokio::test]
async fn stored_profile_risk_overrides_clean_classification() {
    let fixture = engine_with(ScriptedClassifier::clean());
    let phone = PhoneNumber::parse(SPAM_PHONE).unwrap();
    let profile = SpamProfile::from_observation(
        phone.hash(),
        SpamCategory::Investment,
        RiskScore::new(0.8).unwrap(),
        ConfidenceScore::high(),
        Utc::now(),
    );
    fixture.profiles.upsert(profile).await.unwrap();

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(SPAM_PHONE))
        .await
        .unwrap();

    assert_eq!(result.recommendation, Recommendation::Block);
    assert!(!result.cache_hit);
    assert_eq!(result.classification, SpamCategory::Investment);
    assert!(result.reasons.iter().any(|r| r.contains("stored profile")));

    fixture.engine.shutdown().await;
}

#[tokio::test]
async fn features_attached_only_on_request() {
    let fixture = engine_with(ScriptedClassifier::clean());

    let bare = fixture
        .engine
        .evaluate(EvaluateRequest::new(CLEAN_PHONE))
        .await
        .unwrap();
    assert!(bare.ml_features.is_none());

    let with_features = fixture
        .engine
        .evaluate(EvaluateRequest::new(CLEAN_PHONE).with_features())
        .await
        .unwrap();
    let features = with_features.ml_features.expect("Features were not attached");
    assert_eq!(features.digit_count, 11);

    fixture.engine.shutdown().await;
}

/// Feedback recorded after calls shifts the durable profile and later
/// evaluations observe it
#[tokio::test]
async fn spam_feedback_escalates_to_block() {
    let fixture = engine_with(ScriptedClassifier::uncertain());
    let user_id = Uuid::new_v4();
    let phone = PhoneNumber::parse(SPAM_PHONE).unwrap();

    for _ in 0..6 {
        fixture.engine.record(LearningEvent::user_feedback(
            user_id,
            phone.clone(),
            UserFeedback::Spam,
        ));
    }
    fixture.engine.settle_learning().await;

    let profile = fixture.profiles.get(&phone.hash()).await.unwrap().unwrap();
    assert!(profile.total_reports >= 6);
    assert!(
        profile.risk_score.value() > 0.75,
        "risk after repeated spam feedback: {}",
        profile.risk_score.value()
    );

    let result = fixture
        .engine
        .evaluate(EvaluateRequest::new(SPAM_PHONE))
        .await
        .unwrap();
    assert_eq!(result.recommendation, Recommendation::Block);

    fixture.engine.shutdown().await;
}
