// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Feature-vector classification
//!
//! [`CallClassifier`] is the seam between the evaluation cycle and whatever
//! scores callers; the engine treats it as a black box that turns a
//! [`PhoneFeatures`] vector into a [`Classification`]. The bundled
//! [`RuleClassifier`] scores against a versioned [`ScoringModel`] loaded
//! from YAML, with embedded defaults when no model file is configured.
//! Confidence and risk are independent axes: confidence reflects certainty
//! of the category call, risk drives the blocking decision.

use std::path::Path;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use shared_types::{ConfidenceScore, RiskScore, SpamCategory};
use tokio::fs;
use tracing::{debug, info};

use crate::{
    error::{EngineError, EngineResult},
    features::PhoneFeatures,
    types::Classification,
};

/// Keyword hits beyond this cap stop adding risk
const KEYWORD_PRESSURE_CAP: u32 = 6;

/// Scores a feature vector into a spam classification
#[async_trait]
pub trait CallClassifier: Send + Sync {
    /// Classify a feature vector
    ///
    /// # Errors
    ///
    /// Returns an error on internal failure; the orchestrator absorbs it
    /// into a neutral result rather than surfacing it.
    async fn classify(&self, features: &PhoneFeatures) -> EngineResult<Classification>;

    /// The classifier's name, for logs and metrics labels
    fn name(&self) -> &'static str;

    /// Version of the scoring model in use
    fn model_version(&self) -> Version;
}

/// Per-signal risk weights
///
/// Relief weights subtract from risk; everything else adds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Suspicious digit pattern (long runs, low diversity)
    pub pattern_suspicious: f64,
    /// Premium-rate line
    pub premium_line: f64,
    /// Non-geographic VoIP line
    pub voip_line: f64,
    /// Toll-free line
    pub tollfree_line: f64,
    /// Call placed outside daytime hours
    pub off_hours: f64,
    /// Per keyword hit, up to the pressure cap
    pub keyword_hit: f64,
    /// The receiving user has repeatedly blocked this caller
    pub user_block_history: f64,
    /// Explicit user feedback, added or subtracted by verdict
    pub user_feedback: f64,
    /// Accumulated community reports, scaled by volume
    pub profile_reports: f64,
    /// Recorded false positives, subtracted scaled by volume
    pub false_positive_relief: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            pattern_suspicious: 0.25,
            premium_line: 0.30,
            voip_line: 0.15,
            tollfree_line: 0.10,
            off_hours: 0.10,
            keyword_hit: 0.08,
            user_block_history: 0.30,
            user_feedback: 0.35,
            profile_reports: 0.25,
            false_positive_relief: 0.20,
        }
    }
}

impl ScoringWeights {
    fn all(&self) -> [(&'static str, f64); 10] {
        [
            ("pattern_suspicious", self.pattern_suspicious),
            ("premium_line", self.premium_line),
            ("voip_line", self.voip_line),
            ("tollfree_line", self.tollfree_line),
            ("off_hours", self.off_hours),
            ("keyword_hit", self.keyword_hit),
            ("user_block_history", self.user_block_history),
            ("user_feedback", self.user_feedback),
            ("profile_reports", self.profile_reports),
            ("false_positive_relief", self.false_positive_relief),
        ]
    }
}

/// Versioned scoring model loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringModel {
    /// Model version, carried into every classification
    pub version: Version,
    /// Risk at or above which the caller is judged spam
    pub spam_risk_cutoff: f64,
    /// Per-signal weights
    pub weights: ScoringWeights,
}

impl Default for ScoringModel {
    fn default() -> Self {
        Self {
            version: Version::new(1, 0, 0),
            spam_risk_cutoff: 0.5,
            weights: ScoringWeights::default(),
        }
    }
}

impl ScoringModel {
    /// Load a scoring model from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();
        debug!("Loading scoring model from: {}", path.display());

        let content = fs::read_to_string(path).await.map_err(|e| {
            EngineError::io(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let model: ScoringModel = serde_yaml::from_str(&content).map_err(|e| {
            EngineError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        info!(
            version = %model.version,
            spam_risk_cutoff = model.spam_risk_cutoff,
            "loaded scoring model from {}",
            path.display()
        );

        Ok(model)
    }

    /// Load from the configured path, or fall back to the embedded defaults
    pub async fn load_or_default(path: Option<&Path>) -> EngineResult<Self> {
        let model = match path {
            Some(path) => Self::from_file(path).await?,
            None => {
                debug!("no scoring model path configured, using embedded defaults");
                Self::default()
            }
        };
        model.validate()?;
        Ok(model)
    }

    /// Validate weight and cutoff bounds
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.spam_risk_cutoff > 0.0 && self.spam_risk_cutoff < 1.0) {
            return Err(EngineError::config(format!(
                "spam_risk_cutoff must be in (0, 1), got {}",
                self.spam_risk_cutoff
            )));
        }
        for (name, weight) in self.weights.all() {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(EngineError::config(format!(
                    "weight '{name}' must be in [0, 1], got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Deterministic classifier scoring against a [`ScoringModel`]
#[derive(Debug)]
pub struct RuleClassifier {
    model: ScoringModel,
}

impl RuleClassifier {
    /// Create a classifier over the given model
    pub fn new(model: ScoringModel) -> Self {
        Self { model }
    }

    /// Create a classifier with the embedded default model
    pub fn with_defaults() -> Self {
        Self::new(ScoringModel::default())
    }

    fn score(&self, features: &PhoneFeatures) -> Classification {
        let weights = &self.model.weights;
        let mut risk = 0.0f64;
        let mut signals = 0u32;
        let mut reasoning = Vec::new();

        if features.pattern.is_suspicious() {
            risk += weights.pattern_suspicious;
            signals += 1;
            reasoning.push("suspicious digit pattern".to_string());
        }
        if features.geographic.is_premium {
            risk += weights.premium_line;
            signals += 1;
            reasoning.push("premium-rate line".to_string());
        }
        if features.geographic.is_voip {
            risk += weights.voip_line;
            signals += 1;
            reasoning.push("non-geographic voip line".to_string());
        }
        if features.geographic.is_tollfree {
            risk += weights.tollfree_line;
            signals += 1;
            reasoning.push("toll-free line".to_string());
        }
        if features.behavioral.off_hours {
            risk += weights.off_hours;
            signals += 1;
            reasoning.push("off-hours call".to_string());
        }

        let keyword_hits = features.contextual.spam_indicator_count;
        if keyword_hits > 0 {
            let capped = keyword_hits.min(KEYWORD_PRESSURE_CAP);
            risk += weights.keyword_hit * f64::from(capped);
            signals += 1;
            reasoning.push(format!("{keyword_hits} spam keyword hits"));
        }

        if features.behavioral.interaction_count >= 2 && features.behavioral.block_ratio > 0.5 {
            risk += weights.user_block_history;
            signals += 1;
            reasoning.push("user repeatedly blocked this caller".to_string());
        }
        match features.behavioral.user_flagged_spam {
            Some(true) => {
                risk += weights.user_feedback;
                signals += 1;
                reasoning.push("user flagged this caller as spam".to_string());
            }
            Some(false) => {
                risk -= weights.user_feedback;
                signals += 1;
                reasoning.push("user cleared this caller".to_string());
            }
            None => {}
        }

        if features.behavioral.total_reports > 0 {
            let volume = features.behavioral.total_reports.min(10);
            #[allow(clippy::cast_precision_loss)]
            let scale = volume as f64 / 10.0;
            risk += weights.profile_reports * scale;
            signals += 1;
            reasoning.push(format!(
                "{} community reports on record",
                features.behavioral.total_reports
            ));
        }
        if features.behavioral.false_positive_count > 0 {
            let volume = features.behavioral.false_positive_count.min(5);
            #[allow(clippy::cast_precision_loss)]
            let scale = volume as f64 / 5.0;
            risk -= weights.false_positive_relief * scale;
            reasoning.push(format!(
                "{} recorded false positives",
                features.behavioral.false_positive_count
            ));
        }

        let risk_score = RiskScore::saturating(risk);
        let is_spam = risk_score.value() >= self.model.spam_risk_cutoff;
        let category = if is_spam {
            Self::dominant_category(features)
        } else {
            SpamCategory::Unknown
        };

        let capped_hits = keyword_hits.min(KEYWORD_PRESSURE_CAP);
        let confidence = ConfidenceScore::saturating(
            0.3 + 0.1 * f64::from(signals) + 0.04 * f64::from(capped_hits),
        );

        Classification {
            is_spam,
            category,
            confidence,
            risk_score,
            reasoning,
            model_version: self.model.version.clone(),
        }
    }

    /// Pick the category with the strongest keyword evidence
    ///
    /// Candidates are ordered most-specific first; a tie keeps the more
    /// specific category (scam over sales).
    fn dominant_category(features: &PhoneFeatures) -> SpamCategory {
        let contextual = &features.contextual;
        let candidates = [
            (SpamCategory::Scam, contextual.scam_keyword_hits),
            (SpamCategory::Loan, contextual.loan_keyword_hits),
            (SpamCategory::Investment, contextual.investment_keyword_hits),
            (SpamCategory::Insurance, contextual.insurance_keyword_hits),
            (SpamCategory::Sales, contextual.marketing_keyword_hits),
        ];

        let mut best = (SpamCategory::Unknown, 0u32);
        for (category, hits) in candidates {
            if hits > best.1 {
                best = (category, hits);
            }
        }
        best.0
    }
}

#[async_trait]
impl CallClassifier for RuleClassifier {
    async fn classify(&self, features: &PhoneFeatures) -> EngineResult<Classification> {
        Ok(self.score(features))
    }

    fn name(&self) -> &'static str {
        "rule-classifier"
    }

    fn model_version(&self) -> Version {
        self.model.version.clone()
    }
}
