// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Call evaluation orchestrator
//!
//! [`ScreeningEngine`] ties the cache, repositories, feature extraction,
//! classification and the learning pipeline into a single `evaluate` entry
//! point. Lookups short-circuit in whitelist, spam-profile, classifier order;
//! internal failures are absorbed into a conservative recommendation and only
//! validation, not-found and conflict errors surface to callers.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use screening_store::{
    MemorySpamProfileStore, MemoryUserInteractionStore, MemoryWhitelistStore, SpamProfile,
    SpamProfileStore, UserInteractionStore, WhitelistEntry, WhitelistStore,
};
use serde::Serialize;
use shared_types::{ConfidenceScore, PhoneNumber, Recommendation, RiskScore, SpamCategory};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    cache::{CacheStats, ScreeningCache},
    classifier::{CallClassifier, RuleClassifier, ScoringModel},
    config::EngineConfig,
    error::EngineResult,
    features::{FeatureExtractor, PhoneFeatures},
    learning::{LearningEngine, LearningStats},
    metrics,
    types::{Classification, EvaluateRequest, EvaluationResult, LearningEvent},
};

/// Reserved fictional number used to probe stores during health checks
const HEALTH_PROBE_PHONE: &str = "+12025550199";

/// Caller evaluation engine
///
/// One instance owns its cache, repositories and learning workers; all state
/// is per-instance. Construction validates configuration and starts the
/// worker pool, [`ScreeningEngine::shutdown`] drains and stops it.
pub struct ScreeningEngine {
    config: EngineConfig,
    cache: Arc<ScreeningCache>,
    whitelist: Arc<dyn WhitelistStore>,
    profiles: Arc<dyn SpamProfileStore>,
    interactions: Arc<dyn UserInteractionStore>,
    extractor: FeatureExtractor,
    classifier: Arc<dyn CallClassifier>,
    learning: Arc<LearningEngine>,
}

/// Aggregated component health for the hosting layer
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealthStatus {
    /// Every component passed its probe
    pub overall_healthy: bool,
    /// Cache is not running degraded
    pub cache_healthy: bool,
    /// Whitelist repository answered a probe read
    pub whitelist_store_healthy: bool,
    /// Spam profile repository answered a probe read
    pub profile_store_healthy: bool,
    /// User interaction repository answered a probe read
    pub interaction_store_healthy: bool,
    /// Classifier produced a result within its budget
    pub classifier_healthy: bool,
    /// Learning queue has headroom
    pub learning_healthy: bool,
    /// Wall time spent probing
    pub check_duration_ms: u64,
    /// Cache snapshot at probe time
    pub cache_stats: CacheStats,
    /// Learning pipeline snapshot at probe time
    pub learning_stats: LearningStats,
}

impl ScreeningEngine {
    /// Create an engine with in-memory repositories and the rule classifier
    ///
    /// Loads the scoring model from `config.scoring_model_path` when set,
    /// embedded defaults otherwise.
    pub async fn new(config: EngineConfig) -> EngineResult<Self> {
        let model = ScoringModel::load_or_default(config.scoring_model_path.as_deref()).await?;
        let classifier: Arc<dyn CallClassifier> = Arc::new(RuleClassifier::new(model));
        Self::from_parts(
            config,
            classifier,
            Arc::new(MemoryWhitelistStore::new()),
            Arc::new(MemorySpamProfileStore::new()),
            Arc::new(MemoryUserInteractionStore::new()),
        )
    }

    /// Create an engine over caller-supplied repositories and classifier
    ///
    /// Validates the configuration and starts the learning worker pool.
    pub fn from_parts(
        config: EngineConfig,
        classifier: Arc<dyn CallClassifier>,
        whitelist: Arc<dyn WhitelistStore>,
        profiles: Arc<dyn SpamProfileStore>,
        interactions: Arc<dyn UserInteractionStore>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let cache = Arc::new(ScreeningCache::from_config(&config.cache));
        let extractor = FeatureExtractor::new(
            Arc::clone(&cache),
            Arc::clone(&profiles),
            Arc::clone(&interactions),
        );
        let learning = Arc::new(LearningEngine::new(
            config.learning.clone(),
            config.thresholds.clone(),
            Arc::clone(&cache),
            Arc::clone(&whitelist),
            Arc::clone(&profiles),
            Arc::clone(&interactions),
        ));
        learning.start();

        info!(
            environment = %config.environment,
            classifier = classifier.name(),
            model_version = %classifier.model_version(),
            workers = config.learning.workers.value(),
            "screening engine started"
        );

        Ok(Self {
            config,
            cache,
            whitelist,
            profiles,
            interactions,
            extractor,
            classifier,
            learning,
        })
    }

    /// Evaluate an incoming call and recommend how to handle it
    ///
    /// Malformed phone numbers surface as validation errors; every other
    /// failure is absorbed into the returned recommendation. The whole
    /// evaluation runs under the configured budget and downgrades to
    /// `analyze` when it elapses.
    #[instrument(skip_all, fields(has_user = request.user_id.is_some()))]
    pub async fn evaluate(&self, request: EvaluateRequest) -> EngineResult<EvaluationResult> {
        let started = Instant::now();

        // Malformed input is rejected before any lookup and outside the
        // timeout envelope: it is a validation failure, not a miss
        let phone = PhoneNumber::parse(&request.phone)?;

        let mut result = match tokio::time::timeout(
            self.config.timeouts.evaluation(),
            self.evaluate_phone(&phone, &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(
                    phone = %phone.log_id(),
                    budget_ms = self.config.timeouts.evaluation_ms,
                    "evaluation timed out, deferring to conversation handling"
                );
                let mut event =
                    LearningEvent::screening_timeout(phone.clone(), ConfidenceScore::low());
                if let Some(user_id) = request.user_id {
                    event = event.with_user(user_id);
                }
                self.learning.record(event);
                EvaluationResult::deferred(phone.clone(), ConfidenceScore::low(), RiskScore::zero())
                    .with_reason(format!(
                        "evaluation exceeded {}ms budget",
                        self.config.timeouts.evaluation_ms
                    ))
            }
        };

        if self.cache.is_degraded() {
            result = result.with_reason("cache degraded, served from repositories");
        }

        let elapsed = started.elapsed();
        result = result.with_timing(elapsed_ms(elapsed));
        metrics::record_evaluation(result.recommendation.as_str(), elapsed.as_secs_f64());
        info!(
            phone = %phone.log_id(),
            recommendation = result.recommendation.as_str(),
            cache_hit = result.cache_hit,
            whitelisted = result.is_whitelisted,
            risk = result.risk_score.value(),
            duration_ms = result.processing_time_ms,
            "evaluation completed"
        );
        Ok(result)
    }

    /// Lookup ladder for a validated phone, absorbing internal failures
    async fn evaluate_phone(
        &self,
        phone: &PhoneNumber,
        request: &EvaluateRequest,
    ) -> EvaluationResult {
        let degraded = self.cache.is_degraded();

        if let Some(user_id) = request.user_id
            && let Some(result) = self.check_whitelist(user_id, phone, degraded).await
        {
            return result;
        }

        let cached_profile = if degraded {
            None
        } else {
            self.cache.get_spam_profile(&phone.hash())
        };
        if let Some(profile) = &cached_profile
            && profile.risk_score.meets(self.config.thresholds.block_risk)
        {
            let result = EvaluationResult::blocked(
                phone.clone(),
                profile.category,
                profile.confidence_level,
                profile.risk_score,
                true,
            )
            .with_reason(format!(
                "cached spam profile risk {:.2} at or above block threshold {:.2}",
                profile.risk_score.value(),
                self.config.thresholds.block_risk.value()
            ));
            let mut event = LearningEvent::reject(phone.clone(), profile.confidence_level)
                .with_observation(profile.category, profile.risk_score);
            if let Some(user_id) = request.user_id {
                event = event.with_user(user_id);
            }
            self.learning.record(event);
            return result;
        }

        self.classify_and_combine(phone, request, cached_profile, degraded)
            .await
    }

    /// Whitelist short-circuit, `Some` when an active entry decides the call
    ///
    /// The cache copy is authoritative within its TTL; a cached entry that is
    /// expired or deactivated is dropped and the call continues to the spam
    /// checks without a repository re-read. Repository failures continue the
    /// evaluation unwhitelisted, they never allow by default.
    async fn check_whitelist(
        &self,
        user_id: Uuid,
        phone: &PhoneNumber,
        degraded: bool,
    ) -> Option<EvaluationResult> {
        let now = Utc::now();

        if !degraded && let Some(entry) = self.cache.get_whitelist(user_id, phone) {
            if entry.is_usable(now) {
                self.record_whitelist_hit(user_id, phone, &entry);
                return Some(
                    EvaluationResult::whitelisted(phone.clone(), entry.confidence_score, true)
                        .with_reason(format!("active {} whitelist entry", entry.source)),
                );
            }
            self.cache.invalidate_whitelist(user_id, phone);
            return None;
        }

        match self.whitelist.get(user_id, phone).await {
            Ok(Some(entry)) if entry.is_usable(now) => {
                if !degraded {
                    self.cache.store_whitelist(entry.clone());
                }
                self.record_whitelist_hit(user_id, phone, &entry);
                Some(
                    EvaluationResult::whitelisted(phone.clone(), entry.confidence_score, false)
                        .with_reason(format!("active {} whitelist entry", entry.source)),
                )
            }
            Ok(_) => None,
            Err(err) => {
                warn!(
                    phone = %phone.log_id(),
                    error = %err,
                    "whitelist lookup failed, continuing unwhitelisted"
                );
                None
            }
        }
    }

    /// Record a whitelist hit through the learning queue
    ///
    /// The evaluation path never writes repositories itself.
    fn record_whitelist_hit(&self, user_id: Uuid, phone: &PhoneNumber, entry: &WhitelistEntry) {
        self.learning.record(
            LearningEvent::accept(phone.clone(), entry.confidence_score).with_user(user_id),
        );
    }

    /// Classify the call and combine it with any stored evidence
    #[allow(clippy::too_many_lines)]
    async fn classify_and_combine(
        &self,
        phone: &PhoneNumber,
        request: &EvaluateRequest,
        cached_profile: Option<SpamProfile>,
        degraded: bool,
    ) -> EvaluationResult {
        let hash = phone.hash();
        let now = Utc::now();

        // An existing, possibly stale, profile still participates in the
        // combine even when its cache entry has lapsed
        let stored_profile = match cached_profile {
            Some(profile) => Some(profile),
            None => match self.profiles.get(&hash).await {
                Ok(profile) => {
                    if let Some(profile) = &profile
                        && !degraded
                    {
                        self.cache.store_spam_profile(profile.clone());
                    }
                    profile
                }
                Err(err) => {
                    warn!(
                        phone = %phone.log_id(),
                        error = %err,
                        "profile read failed, classifying without prior evidence"
                    );
                    None
                }
            },
        };

        let features = self
            .extractor
            .extract_cached(phone, request.user_id, request.context.as_ref())
            .await;
        let classification = self.classify_bounded(&features).await;

        let thresholds = &self.config.thresholds;
        let mut reasons = classification.reasoning.clone();

        // Blocking risk is the stronger of the fresh classification and the
        // stored evidence, one quiet call never dilutes an established profile
        let profile_risk = stored_profile.as_ref().map(|p| p.risk_score);
        let mut effective_risk = classification.risk_score;
        if let Some(risk) = profile_risk
            && risk.value() > effective_risk.value()
        {
            effective_risk = risk;
        }

        let classifier_blocked = classification.risk_score.meets(thresholds.block_risk);
        let confident_category =
            classification.is_spam && classification.meets(thresholds.act_confidence);
        let category = if confident_category {
            classification.category
        } else {
            stored_profile
                .as_ref()
                .map_or(SpamCategory::Unknown, |p| p.category)
        };

        let result = if effective_risk.meets(thresholds.block_risk) {
            if classifier_blocked {
                reasons.push(format!(
                    "classifier risk {:.2} at or above block threshold {:.2}",
                    classification.risk_score.value(),
                    thresholds.block_risk.value()
                ));
            }
            if let Some(risk) = profile_risk
                && risk.meets(thresholds.block_risk)
            {
                reasons.push(format!(
                    "stored profile risk {:.2} at or above block threshold {:.2}",
                    risk.value(),
                    thresholds.block_risk.value()
                ));
            }
            let decision_confidence = if classifier_blocked {
                classification.confidence
            } else {
                stored_profile
                    .as_ref()
                    .map_or(classification.confidence, |p| p.confidence_level)
            };
            EvaluationResult::blocked(
                phone.clone(),
                category,
                decision_confidence,
                effective_risk,
                false,
            )
        } else if !classification.is_spam
            && classification.meets(thresholds.auto_learn_confidence)
            && stored_profile.as_ref().is_none_or(|p| p.total_reports == 0)
        {
            reasons.push(format!(
                "confidence {:.2} at or above auto-learn threshold {:.2} with no reported history",
                classification.confidence.value(),
                thresholds.auto_learn_confidence.value()
            ));
            EvaluationResult::allowed(
                phone.clone(),
                category,
                classification.confidence,
                effective_risk,
                Recommendation::AutoAllow,
            )
        } else if !classification.is_spam && classification.meets(thresholds.act_confidence) {
            reasons.push(format!(
                "confidence {:.2} at or above action threshold {:.2}, not spam",
                classification.confidence.value(),
                thresholds.act_confidence.value()
            ));
            EvaluationResult::allowed(
                phone.clone(),
                category,
                classification.confidence,
                effective_risk,
                Recommendation::Allow,
            )
        } else {
            if classification.is_spam {
                reasons.push(format!(
                    "risk {:.2} below block threshold {:.2}, deferring",
                    effective_risk.value(),
                    thresholds.block_risk.value()
                ));
            } else {
                reasons.push(format!(
                    "confidence {:.2} below action threshold {:.2}",
                    classification.confidence.value(),
                    thresholds.act_confidence.value()
                ));
            }
            let mut deferred =
                EvaluationResult::deferred(phone.clone(), classification.confidence, effective_risk);
            deferred.classification = category;
            deferred
        };
        let mut result = result.with_reasons(reasons);

        // Write-through: the spam-profile tier sees the derived state before
        // this evaluation returns, the durable record follows via learning
        if !degraded {
            let derived = match stored_profile {
                Some(mut profile) => {
                    profile.risk_score = effective_risk;
                    profile
                }
                None => SpamProfile::from_observation(
                    hash,
                    category,
                    effective_risk,
                    classification.confidence,
                    now,
                ),
            };
            self.cache.store_spam_profile(derived);
        }

        let mut event = match result.recommendation {
            Recommendation::Block => {
                LearningEvent::reject(phone.clone(), result.confidence_score)
                    .with_observation(category, effective_risk)
            }
            Recommendation::Allow | Recommendation::AutoAllow => {
                LearningEvent::accept(phone.clone(), classification.confidence)
            }
            Recommendation::Analyze => {
                LearningEvent::screening_timeout(phone.clone(), classification.confidence)
            }
        };
        event = event.with_features(features.clone());
        if let Some(user_id) = request.user_id {
            event = event.with_user(user_id);
        }
        self.learning.record(event);

        if request.include_features {
            result = result.with_features(features);
        }
        result
    }

    /// Run the classifier under its latency budget
    ///
    /// Timeouts and classifier errors map to a neutral result so a stalled
    /// model can never block a call.
    async fn classify_bounded(&self, features: &PhoneFeatures) -> Classification {
        let started = Instant::now();
        match tokio::time::timeout(
            self.config.timeouts.classifier(),
            self.classifier.classify(features),
        )
        .await
        {
            Ok(Ok(classification)) => {
                metrics::observe_classifier_duration("ok", started.elapsed().as_secs_f64());
                classification
            }
            Ok(Err(err)) => {
                metrics::observe_classifier_duration("error", started.elapsed().as_secs_f64());
                warn!(
                    classifier = self.classifier.name(),
                    error = %err,
                    "classifier failed, using neutral result"
                );
                Classification::neutral(
                    self.classifier.model_version(),
                    "classifier error, neutral fallback",
                )
            }
            Err(_elapsed) => {
                metrics::observe_classifier_duration("timeout", started.elapsed().as_secs_f64());
                warn!(
                    classifier = self.classifier.name(),
                    budget_ms = self.config.timeouts.classifier_ms,
                    "classifier timed out, using neutral result"
                );
                Classification::neutral(
                    self.classifier.model_version(),
                    "classifier timed out, neutral fallback",
                )
            }
        }
    }

    /// Probe every component and report aggregated health
    pub async fn health(&self) -> EngineHealthStatus {
        let started = Instant::now();

        let (
            whitelist_store_healthy,
            profile_store_healthy,
            interaction_store_healthy,
            classifier_healthy,
        ) = match PhoneNumber::parse(HEALTH_PROBE_PHONE) {
            Ok(probe) => {
                let whitelist_store_healthy =
                    self.whitelist.get(Uuid::nil(), &probe).await.is_ok();
                let profile_store_healthy = self.profiles.get(&probe.hash()).await.is_ok();
                let interaction_store_healthy = self
                    .interactions
                    .get(Uuid::nil(), &probe.hash())
                    .await
                    .is_ok();
                let classifier_healthy = tokio::time::timeout(
                    self.config.timeouts.classifier(),
                    self.classifier.classify(&PhoneFeatures::empty(&probe)),
                )
                .await
                .is_ok_and(|outcome| outcome.is_ok());
                (
                    whitelist_store_healthy,
                    profile_store_healthy,
                    interaction_store_healthy,
                    classifier_healthy,
                )
            }
            Err(_) => (false, false, false, false),
        };

        let cache_healthy = !self.cache.is_degraded();
        let learning_stats = self.learning.stats();
        let learning_healthy =
            learning_stats.queue_depth < self.config.learning.queue_capacity.value();
        let overall_healthy = cache_healthy
            && whitelist_store_healthy
            && profile_store_healthy
            && interaction_store_healthy
            && classifier_healthy
            && learning_healthy;

        let status = EngineHealthStatus {
            overall_healthy,
            cache_healthy,
            whitelist_store_healthy,
            profile_store_healthy,
            interaction_store_healthy,
            classifier_healthy,
            learning_healthy,
            check_duration_ms: elapsed_ms(started.elapsed()),
            cache_stats: self.cache.stats(),
            learning_stats,
        };
        if !status.overall_healthy {
            warn!(?status, "engine health check failed");
        }
        status
    }

    /// Hand an after-call outcome or user action to the learning pipeline
    pub fn record(&self, event: LearningEvent) {
        self.learning.record(event);
    }

    /// Wait until the learning pipeline has consumed everything recorded so far
    pub async fn settle_learning(&self) {
        self.learning.settle().await;
    }

    /// Current cache snapshot
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Current learning pipeline snapshot
    pub fn learning_stats(&self) -> LearningStats {
        self.learning.stats()
    }

    /// Drop expired cache entries eagerly, returning how many were removed
    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup_expired()
    }

    /// Force the cache into degraded mode, repository reads take over
    pub fn mark_cache_degraded(&self, reason: &str) {
        self.cache.mark_degraded(reason);
    }

    /// Return the cache to normal operation
    pub fn clear_cache_degraded(&self) {
        self.cache.clear_degraded();
    }

    /// Engine configuration in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drain the learning queue and stop the worker pool
    pub async fn shutdown(&self) {
        self.learning.shutdown().await;
    }
}

impl fmt::Debug for ScreeningEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreeningEngine")
            .field("environment", &self.config.environment)
            .field("classifier", &self.classifier.name())
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    async fn engine() -> ScreeningEngine {
        ScreeningEngine::new(EngineConfig::for_testing()).await.unwrap()
    }

    #[tokio::test]
    async fn malformed_phone_is_a_validation_error() {
        let engine = engine().await;

        let err = engine
            .evaluate(EvaluateRequest::new("not-a-phone"))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation { .. }));
        assert_eq!(err.code(), "validation_error");
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn whitelist_hit_allows_from_store_then_cache() {
        let engine = engine().await;
        let user_id = Uuid::new_v4();
        let phone = PhoneNumber::parse("+12025550123").unwrap();
        engine
            .whitelist
            .upsert(WhitelistEntry::manual(user_id, phone))
            .await
            .unwrap();

        let request = EvaluateRequest::new("+12025550123").with_user(user_id);
        let first = engine.evaluate(request.clone()).await.unwrap();
        assert_eq!(first.recommendation, Recommendation::Allow);
        assert!(first.is_whitelisted);
        assert!(!first.cache_hit);

        let second = engine.evaluate(request).await.unwrap();
        assert!(second.is_whitelisted);
        assert!(second.cache_hit);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn degraded_cache_still_evaluates() {
        let engine = engine().await;
        engine.mark_cache_degraded("probe");

        let result = engine
            .evaluate(EvaluateRequest::new("+12025550123"))
            .await
            .unwrap();

        assert!(!result.cache_hit);
        assert!(result
            .reasons
            .iter()
            .any(|reason| reason.contains("degraded")));
        engine.shutdown().await;
    }
}
