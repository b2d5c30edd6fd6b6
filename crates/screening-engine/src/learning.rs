// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous outcome learning over a bounded event queue
//!
//! `record` enqueues without ever blocking the evaluation path; a small
//! worker pool drains the queue and folds each event into the durable
//! records. Risk and confidence move by exponential smoothing, so no single
//! event can swing a profile past its smoothing ceiling. All updates for one
//! phone hash serialize through a shard mutex, and the stores' version check
//! catches writers outside this process. On overflow the queue drops its
//! oldest events and counts them.

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use screening_store::{
    SpamProfile, SpamProfileStore, UserInteractionStore, UserSpamInteraction, WhitelistEntry,
    WhitelistStore,
};
use serde::Serialize;
use shared_types::{PhoneHash, RiskScore, SpamCategory, UserFeedback, WhitelistSource};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::ScreeningCache;
use crate::config::{LearningConfig, ThresholdConfig};
use crate::error::EngineResult;
use crate::metrics;
use crate::types::{LearningEvent, LearningEventKind};

/// Number of mutexes striping per-key update order
const KEY_SHARDS: usize = 32;

/// Base backoff before re-applying a conflicted update
const RETRY_BASE_MS: u64 = 10;

/// Backoff ceiling for conflicted updates
const RETRY_MAX_DELAY_MS: u64 = 250;

/// Risk target for a rejection that carries no classifier observation
const REJECT_RISK_TARGET: f64 = 0.9;

/// Risk target when a user confirms a caller as spam
const FEEDBACK_SPAM_TARGET: f64 = 0.95;

/// Risk target for partial-spam feedback
const PARTIAL_SPAM_TARGET: f64 = 0.6;

/// Risk target for a screening that ended without a definitive outcome
const AMBIGUOUS_RISK_TARGET: f64 = 0.6;

/// Ambiguous outcomes move risk at half strength
const TIMEOUT_DAMPING: f64 = 0.5;

/// Staleness horizon after which recency weighting saturates
const STALENESS_SATURATION_HOURS: f64 = 168.0;

/// Point-in-time counters for the learning pipeline
#[derive(Debug, Clone, Serialize)]
pub struct LearningStats {
    /// Events waiting in the queue
    pub queue_depth: usize,
    /// Events accepted by `record` since startup
    pub enqueued: u64,
    /// Events fully applied
    pub processed: u64,
    /// Events dropped by the overflow policy
    pub dropped: u64,
    /// Events abandoned after retries or discarded as unusable
    pub failed: u64,
}

/// Background learner that folds outcome events into durable records
///
/// The engine is the only writer of [`SpamProfile`] risk and confidence
/// fields. Construction is cheap and does nothing; call
/// [`LearningEngine::start`] to launch workers, or [`LearningEngine::drain`]
/// to apply queued events inline. Once shut down the engine does not restart.
pub struct LearningEngine {
    config: LearningConfig,
    thresholds: ThresholdConfig,
    cache: Arc<ScreeningCache>,
    whitelist: Arc<dyn WhitelistStore>,
    profiles: Arc<dyn SpamProfileStore>,
    interactions: Arc<dyn UserInteractionStore>,
    queue: Mutex<VecDeque<LearningEvent>>,
    notify: Notify,
    shards: Vec<AsyncMutex<()>>,
    shutdown_token: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    enqueued: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl LearningEngine {
    /// Create an engine over the given cache and stores; workers start separately
    pub fn new(
        config: LearningConfig,
        thresholds: ThresholdConfig,
        cache: Arc<ScreeningCache>,
        whitelist: Arc<dyn WhitelistStore>,
        profiles: Arc<dyn SpamProfileStore>,
        interactions: Arc<dyn UserInteractionStore>,
    ) -> Self {
        let shards = (0..KEY_SHARDS).map(|_| AsyncMutex::new(())).collect();
        Self {
            config,
            thresholds,
            cache,
            whitelist,
            profiles,
            interactions,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            shards,
            shutdown_token: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            enqueued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Launch the background worker pool
    ///
    /// Calling again while workers are running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() {
            warn!("learning workers already started");
            return;
        }
        let count = self.config.workers.value();
        info!(
            workers = count,
            capacity = self.config.queue_capacity.value(),
            "starting learning workers"
        );
        for index in 0..count {
            let engine = Arc::clone(self);
            let token = self.shutdown_token.child_token();
            workers.push(tokio::spawn(engine.worker_loop(token, index)));
        }
    }

    /// Enqueue an outcome event without blocking
    ///
    /// At capacity the oldest queued event is dropped and counted; the
    /// caller never waits.
    pub fn record(&self, event: LearningEvent) {
        let depth = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.len() >= self.config.queue_capacity.value() {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::inc_learning_event_dropped();
                debug!(
                    kind = event.kind.as_str(),
                    "learning queue full, dropped oldest event"
                );
            }
            queue.push_back(event);
            queue.len()
        };
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        metrics::set_learning_queue_depth(depth);
        self.notify.notify_one();
    }

    /// Apply every queued event on the calling task
    ///
    /// Intended for tests and embedders that do not run background workers.
    pub async fn drain(&self) {
        while let Some(event) = self.pop_event() {
            self.process(event).await;
        }
    }

    /// Wait until every accepted event has been applied or dropped
    ///
    /// Every enqueued event ends up in exactly one of the processed, dropped
    /// or failed counters, so equality means the pipeline is idle. Callers
    /// bound the wait with their own timeout.
    pub async fn settle(&self) {
        loop {
            let stats = self.stats();
            if stats.enqueued == stats.processed + stats.dropped + stats.failed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stop the worker pool; workers finish queued events before exiting
    pub async fn shutdown(&self) {
        info!("learning engine shutting down");
        self.shutdown_token.cancel();
        self.notify.notify_waiters();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "learning worker terminated abnormally");
            }
        }

        let stats = self.stats();
        info!(
            processed = stats.processed,
            dropped = stats.dropped,
            "learning engine stopped"
        );
    }

    /// Events currently waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Events dropped by the overflow policy since startup
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events fully applied since startup
    pub fn processed_events(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Point-in-time pipeline counters
    pub fn stats(&self) -> LearningStats {
        LearningStats {
            queue_depth: self.queue_depth(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    async fn worker_loop(self: Arc<Self>, token: CancellationToken, index: usize) {
        debug!(worker = index, "learning worker started");
        loop {
            if let Some(event) = self.pop_event() {
                self.process(event).await;
                continue;
            }
            tokio::select! {
                () = token.cancelled() => break,
                () = self.notify.notified() => {}
            }
        }
        // Finish whatever is still queued so accepted events survive shutdown
        while let Some(event) = self.pop_event() {
            self.process(event).await;
        }
        debug!(worker = index, "learning worker stopped");
    }

    fn pop_event(&self) -> Option<LearningEvent> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let event = queue.pop_front();
        if event.is_some() {
            metrics::set_learning_queue_depth(queue.len());
        }
        event
    }

    async fn process(&self, event: LearningEvent) {
        let shard = self.shard_index(&event.phone.hash());
        let _ordering = self.shards[shard].lock().await;

        let backoff = ExponentialBackoff::from_millis(RETRY_BASE_MS)
            .max_delay(Duration::from_millis(RETRY_MAX_DELAY_MS))
            .take(self.config.upsert_retry_limit)
            .map(jitter);

        let event = &event;
        let outcome = Retry::spawn(backoff, move || async move {
            match self.apply(event).await {
                Ok(()) => Ok(true),
                Err(err) if err.is_retryable() => {
                    debug!(
                        error = %err,
                        kind = event.kind.as_str(),
                        "learning update conflicted, retrying"
                    );
                    Err(err)
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        kind = event.kind.as_str(),
                        phone = %event.phone.log_id(),
                        "learning event discarded"
                    );
                    Ok(false)
                }
            }
        })
        .await;

        match outcome {
            Ok(true) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                metrics::inc_learning_event_processed(event.kind.as_str());
            }
            Ok(false) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %err,
                    kind = event.kind.as_str(),
                    phone = %event.phone.log_id(),
                    "learning event abandoned after retries"
                );
            }
        }
    }

    async fn apply(&self, event: &LearningEvent) -> EngineResult<()> {
        match event.kind {
            LearningEventKind::Accept => self.apply_accept(event).await,
            LearningEventKind::Reject => self.apply_reject(event).await,
            LearningEventKind::Timeout => self.apply_timeout(event).await,
            LearningEventKind::ManualAdd => self.apply_manual_add(event).await,
            LearningEventKind::ManualRemove => self.apply_manual_remove(event).await,
            LearningEventKind::UserFeedback => self.apply_user_feedback(event).await,
        }
    }

    async fn apply_accept(&self, event: &LearningEvent) -> EngineResult<()> {
        let hash = event.phone.hash();

        // An accepted call softens existing spam evidence; it never creates
        // a profile for a number nobody reported.
        if let Some(mut profile) = self.profiles.get(&hash).await? {
            let alpha = self.effective_alpha(&profile, event.timestamp);
            profile.risk_score = profile.risk_score.nudged_toward(RiskScore::zero(), alpha);
            profile.confidence_level = profile
                .confidence_level
                .nudged_toward(event.confidence, self.confidence_alpha(&profile));
            profile.last_activity = event.timestamp;
            let stored = self.profiles.upsert(profile).await?;
            self.refresh_profile_cache(&stored);
        }

        let Some(user_id) = event.user_id else {
            return Ok(());
        };
        self.note_interaction(user_id, &hash, false, event.timestamp)
            .await?;

        match self.whitelist.get(user_id, &event.phone).await? {
            Some(mut entry) => {
                if entry.is_usable(event.timestamp) {
                    entry.record_hit(event.timestamp);
                    let stored = self.whitelist.upsert(entry).await?;
                    self.refresh_whitelist_cache(stored);
                }
            }
            None if event
                .confidence
                .meets(self.thresholds.auto_learn_confidence) =>
            {
                let entry = WhitelistEntry::learned(user_id, event.phone.clone(), event.confidence);
                let stored = self.whitelist.upsert(entry).await?;
                info!(
                    user = %user_id,
                    phone = %event.phone.log_id(),
                    confidence = stored.confidence_score.value(),
                    "promoted caller to learned whitelist entry"
                );
                self.refresh_whitelist_cache(stored);
            }
            None => {}
        }
        Ok(())
    }

    async fn apply_reject(&self, event: &LearningEvent) -> EngineResult<()> {
        let hash = event.phone.hash();
        let mut profile = match self.profiles.get(&hash).await? {
            Some(profile) => profile,
            // First rejection seeds the profile straight from the observation
            None => SpamProfile::from_observation(
                hash.clone(),
                event.category.unwrap_or(SpamCategory::Unknown),
                event.observed_risk.unwrap_or_else(RiskScore::zero),
                event.confidence,
                event.timestamp,
            ),
        };

        let alpha = self.effective_alpha(&profile, event.timestamp);
        let target = event
            .observed_risk
            .unwrap_or_else(|| RiskScore::saturating(REJECT_RISK_TARGET));
        Self::adopt_category(&mut profile, event);
        profile.risk_score = profile.risk_score.nudged_toward(target, alpha);
        profile.confidence_level = profile
            .confidence_level
            .nudged_toward(event.confidence, self.confidence_alpha(&profile));
        profile.note_report(event.timestamp);
        profile.note_block(event.timestamp);

        let stored = self.profiles.upsert(profile).await?;
        self.refresh_profile_cache(&stored);

        if let Some(user_id) = event.user_id {
            self.note_interaction(user_id, &hash, true, event.timestamp)
                .await?;
        }
        Ok(())
    }

    async fn apply_timeout(&self, event: &LearningEvent) -> EngineResult<()> {
        // An ambiguous outcome drifts an existing profile toward the middle;
        // it never creates one.
        let hash = event.phone.hash();
        let Some(mut profile) = self.profiles.get(&hash).await? else {
            return Ok(());
        };
        let alpha = self.effective_alpha(&profile, event.timestamp) * TIMEOUT_DAMPING;
        profile.risk_score = profile
            .risk_score
            .nudged_toward(RiskScore::saturating(AMBIGUOUS_RISK_TARGET), alpha);
        profile.last_activity = event.timestamp;
        let stored = self.profiles.upsert(profile).await?;
        self.refresh_profile_cache(&stored);
        Ok(())
    }

    async fn apply_manual_add(&self, event: &LearningEvent) -> EngineResult<()> {
        let Some(user_id) = event.user_id else {
            debug!("manual whitelist add without user, skipped");
            return Ok(());
        };

        let entry = match self.whitelist.get(user_id, &event.phone).await? {
            Some(mut entry) => {
                entry.source = WhitelistSource::Manual;
                entry.is_active = true;
                entry.expires_at = None;
                entry.updated_at = event.timestamp;
                entry
            }
            None => WhitelistEntry::manual(user_id, event.phone.clone()),
        };
        let stored = self.whitelist.upsert(entry).await?;
        self.refresh_whitelist_cache(stored);

        // An explicit add counts against accumulated spam evidence
        let hash = event.phone.hash();
        if let Some(mut profile) = self.profiles.get(&hash).await? {
            let alpha = self.effective_alpha(&profile, event.timestamp);
            profile.risk_score = profile.risk_score.nudged_toward(RiskScore::zero(), alpha);
            if profile.total_reports > profile.false_positive_count {
                profile.note_false_positive(event.timestamp);
            } else {
                profile.last_activity = event.timestamp;
            }
            let stored = self.profiles.upsert(profile).await?;
            self.refresh_profile_cache(&stored);
        }
        Ok(())
    }

    async fn apply_manual_remove(&self, event: &LearningEvent) -> EngineResult<()> {
        let Some(user_id) = event.user_id else {
            debug!("manual whitelist remove without user, skipped");
            return Ok(());
        };
        let removed = self.whitelist.delete(user_id, &event.phone).await?;
        self.cache.invalidate_whitelist(user_id, &event.phone);
        if removed {
            debug!(
                user = %user_id,
                phone = %event.phone.log_id(),
                "whitelist entry removed"
            );
        }
        Ok(())
    }

    async fn apply_user_feedback(&self, event: &LearningEvent) -> EngineResult<()> {
        let Some(feedback) = event.feedback else {
            debug!("feedback event without feedback payload, skipped");
            return Ok(());
        };
        let hash = event.phone.hash();

        if feedback.confirms_spam() {
            let mut profile = match self.profiles.get(&hash).await? {
                Some(profile) => profile,
                None => SpamProfile::new(hash.clone()),
            };
            let alpha = self.effective_alpha(&profile, event.timestamp);
            Self::adopt_category(&mut profile, event);
            profile.risk_score = profile
                .risk_score
                .nudged_toward(RiskScore::saturating(FEEDBACK_SPAM_TARGET), alpha);
            profile.confidence_level = profile
                .confidence_level
                .nudged_toward(event.confidence, self.confidence_alpha(&profile));
            profile.note_report(event.timestamp);
            let stored = self.profiles.upsert(profile).await?;
            self.refresh_profile_cache(&stored);
        } else if feedback.clears_caller() {
            if let Some(mut profile) = self.profiles.get(&hash).await? {
                let alpha = self.effective_alpha(&profile, event.timestamp);
                profile.risk_score = profile.risk_score.nudged_toward(RiskScore::zero(), alpha);
                // A false positive needs a prior report to contradict
                if profile.total_reports > profile.false_positive_count {
                    profile.note_false_positive(event.timestamp);
                } else {
                    profile.last_activity = event.timestamp;
                }
                let stored = self.profiles.upsert(profile).await?;
                self.refresh_profile_cache(&stored);
            }
        } else if feedback == UserFeedback::PartialSpam {
            let mut profile = match self.profiles.get(&hash).await? {
                Some(profile) => profile,
                None => SpamProfile::new(hash.clone()),
            };
            let alpha = self.effective_alpha(&profile, event.timestamp);
            profile.risk_score = profile
                .risk_score
                .nudged_toward(RiskScore::saturating(PARTIAL_SPAM_TARGET), alpha);
            profile.note_report(event.timestamp);
            let stored = self.profiles.upsert(profile).await?;
            self.refresh_profile_cache(&stored);
        }
        // Unknown feedback leaves the profile untouched

        if let Some(user_id) = event.user_id {
            if feedback != UserFeedback::Unknown {
                let ai_judged_spam = event
                    .observed_risk
                    .is_some_and(|risk| risk.meets(self.thresholds.block_risk));
                let agreed = feedback.confirms_spam() == ai_judged_spam;
                let mut interaction = self
                    .interactions
                    .get(user_id, &hash)
                    .await?
                    .unwrap_or_else(|| UserSpamInteraction::new(user_id, hash.clone()));
                interaction.note_feedback(feedback, agreed, event.timestamp);
                let stored = self.interactions.upsert(interaction).await?;
                self.refresh_interaction_cache(&stored);
            }
        }
        Ok(())
    }

    async fn note_interaction(
        &self,
        user_id: Uuid,
        hash: &PhoneHash,
        blocked: bool,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut interaction = self
            .interactions
            .get(user_id, hash)
            .await?
            .unwrap_or_else(|| UserSpamInteraction::new(user_id, hash.clone()));
        interaction.note_interaction(blocked, at);
        let stored = self.interactions.upsert(interaction).await?;
        self.refresh_interaction_cache(&stored);
        Ok(())
    }

    /// Smoothing weight for one event against the current profile
    ///
    /// Fresh evidence against a stale profile moves it more; a history of
    /// false positives damps every subsequent move. The clamp bounds how far
    /// a single event can close the remaining gap.
    fn effective_alpha(&self, profile: &SpamProfile, at: DateTime<Utc>) -> f64 {
        let recency = 1.0 + (profile.staleness_hours(at) / STALENESS_SATURATION_HOURS).min(1.0);
        #[allow(clippy::cast_precision_loss)]
        let damping = 1.0 + self.config.false_positive_penalty * profile.false_positive_count as f64;
        (self.config.smoothing_alpha * recency / damping).clamp(0.0, self.config.max_smoothing_alpha)
    }

    /// Confidence moves freely on young profiles and stiffens with evidence
    fn confidence_alpha(&self, profile: &SpamProfile) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let evidence = 1.0 + profile.total_reports as f64 / self.config.confidence_shrink_reports;
        (self.config.smoothing_alpha / evidence).clamp(0.0, self.config.max_smoothing_alpha)
    }

    fn adopt_category(profile: &mut SpamProfile, event: &LearningEvent) {
        if let Some(category) = event.category {
            if profile.category == SpamCategory::Unknown
                || event.confidence.value() >= profile.confidence_level.value()
            {
                profile.category = category;
            }
        }
    }

    fn shard_index(&self, hash: &PhoneHash) -> usize {
        let mut hasher = DefaultHasher::new();
        hash.as_str().hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        {
            (hasher.finish() % self.shards.len() as u64) as usize
        }
    }

    fn refresh_profile_cache(&self, profile: &SpamProfile) {
        if self.cache.is_degraded() {
            return;
        }
        self.cache.store_spam_profile(profile.clone());
    }

    fn refresh_whitelist_cache(&self, entry: WhitelistEntry) {
        if self.cache.is_degraded() {
            return;
        }
        self.cache.store_whitelist(entry);
    }

    fn refresh_interaction_cache(&self, interaction: &UserSpamInteraction) {
        if self.cache.is_degraded() {
            return;
        }
        self.cache.store_user_interaction(interaction.clone());
    }
}

impl fmt::Debug for LearningEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearningEngine")
            .field("queue_depth", &self.queue_depth())
            .field("workers", &self.config.workers.value())
            .field("processed", &self.processed.load(Ordering::Relaxed))
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
