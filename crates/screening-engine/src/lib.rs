// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Real-time caller evaluation for call screening
//!
//! This crate decides, within a bounded latency budget, how an incoming call
//! should be handled: allow it through, block it, or hand it to deeper
//! conversational analysis. It combines per-user whitelists, globally shared
//! spam profiles, deterministic classification and a background learning
//! pipeline behind a single engine facade.
//!
//! # Key Features
//!
//! - **Tiered Caching**: TTL-bounded in-memory tiers for whitelist, spam-profile,
//!   user-config and ml-feature reads with lazy expiry and capacity eviction
//! - **Bounded Classification**: the classifier runs under a strict latency budget
//!   and maps timeouts to a neutral result, so a stalled model never blocks a call
//! - **Background Learning**: call outcomes smooth spam profiles through a bounded
//!   queue and worker pool with per-key serialization, producers are never blocked
//! - **Graceful Degradation**: cache and repository failures bias toward analysis
//!   or blocking, never toward silently allowing a caller
//! - **Observability**: structured tracing and Prometheus metrics throughout
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`evaluator`]: Evaluation orchestration and the [`ScreeningEngine`] facade
//! - [`cache`]: TTL-tiered cache with degraded-mode handling
//! - [`classifier`]: The [`CallClassifier`] trait and the rule-based reference model
//! - [`features`]: Pattern, geographic, behavioral and contextual feature extraction
//! - [`learning`]: Bounded-queue learning pipeline updating durable records
//! - [`config`]: Hierarchical configuration loading and validation
//! - [`error`]: Error taxonomy with stable machine-readable codes
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use screening_engine::{EngineConfig, EvaluateRequest, ScreeningEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start an engine with in-memory repositories and the rule classifier
//! let engine = ScreeningEngine::new(EngineConfig::default()).await?;
//!
//! // Evaluate an incoming call
//! let request = EvaluateRequest::new("+12025550123");
//! let result = engine.evaluate(request).await?;
//!
//! println!("Recommendation: {}", result.recommendation.as_str());
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod features;
pub mod learning;
pub mod metrics;
pub mod types;

// Re-export main types for convenience
pub use cache::{CacheStats, ScreeningCache};
pub use classifier::{CallClassifier, RuleClassifier, ScoringModel};
pub use config::{EngineConfig, LearningConfig, ThresholdConfig, TimeoutConfig};
pub use error::{EngineError, EngineResult};
pub use evaluator::{EngineHealthStatus, ScreeningEngine};
pub use features::{FeatureExtractor, PhoneFeatures};
pub use learning::{LearningEngine, LearningStats};
pub use types::{
    CallContext, Classification, EvaluateRequest, EvaluationResult, LearningEvent,
    LearningEventKind,
};
