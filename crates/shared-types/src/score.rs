// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Validated score newtypes
//!
//! Confidence and risk are independent axes: confidence reflects certainty of
//! a category call, risk reflects severity for blocking decisions. Both are
//! constrained to the closed interval [0, 1] at construction so threshold
//! comparisons downstream never meet NaN or out-of-range values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Certainty of a classification, in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
    /// Create a confidence score, validating the range
    ///
    /// # Errors
    ///
    /// Returns `ScoreError` if the value is NaN, infinite, or outside [0, 1].
    pub fn new(value: f64) -> Result<Self, ScoreError> {
        validate_unit(value).map(Self)
    }

    /// High confidence (0.9)
    pub fn high() -> Self {
        Self(0.9)
    }

    /// Medium confidence (0.6)
    pub fn medium() -> Self {
        Self(0.6)
    }

    /// Low confidence (0.3)
    pub fn low() -> Self {
        Self(0.3)
    }

    /// Zero confidence
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// The underlying value
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether this score meets the given threshold
    pub fn meets(self, threshold: Self) -> bool {
        self.0 >= threshold.0
    }

    /// Move this score toward `target` by fraction `alpha`
    ///
    /// `alpha` is clamped to [0, 1], making the result a convex combination
    /// of the current value and the target; a single step can therefore never
    /// overshoot the target. The result is clamped back into [0, 1].
    #[must_use]
    pub fn nudged_toward(self, target: Self, alpha: f64) -> Self {
        Self(convex_step(self.0, target.0, alpha))
    }

    /// Clamp an arbitrary value into a valid confidence score
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }
}

/// Severity of a caller for blocking decisions, in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RiskScore(f64);

impl RiskScore {
    /// Create a risk score, validating the range
    ///
    /// # Errors
    ///
    /// Returns `ScoreError` if the value is NaN, infinite, or outside [0, 1].
    pub fn new(value: f64) -> Result<Self, ScoreError> {
        validate_unit(value).map(Self)
    }

    /// Zero risk
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Maximum risk
    pub fn max() -> Self {
        Self(1.0)
    }

    /// The underlying value
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether this score meets the given threshold
    pub fn meets(self, threshold: Self) -> bool {
        self.0 >= threshold.0
    }

    /// Move this score toward `target` by fraction `alpha`
    ///
    /// Same convex-combination semantics as
    /// [`ConfidenceScore::nudged_toward`].
    #[must_use]
    pub fn nudged_toward(self, target: Self, alpha: f64) -> Self {
        Self(convex_step(self.0, target.0, alpha))
    }

    /// Clamp an arbitrary value into a valid risk score
    pub fn saturating(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }
}

fn validate_unit(value: f64) -> Result<f64, ScoreError> {
    if !value.is_finite() {
        return Err(ScoreError::NotFinite);
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ScoreError::OutOfRange(value));
    }
    Ok(value)
}

fn convex_step(current: f64, target: f64, alpha: f64) -> f64 {
    let alpha = alpha.clamp(0.0, 1.0);
    (current + alpha * (target - current)).clamp(0.0, 1.0)
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl TryFrom<f64> for ConfidenceScore {
    type Error = ScoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConfidenceScore> for f64 {
    fn from(value: ConfidenceScore) -> Self {
        value.0
    }
}

impl TryFrom<f64> for RiskScore {
    type Error = ScoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RiskScore> for f64 {
    fn from(value: RiskScore) -> Self {
        value.0
    }
}

/// Error type for score validation
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ScoreError {
    /// Value was NaN or infinite
    #[error("score must be a finite number")]
    NotFinite,
    /// Value fell outside the [0, 1] interval
    #[error("score must be between 0.0 and 1.0, got {0}")]
    OutOfRange(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_score_validation() {
        assert!(ConfidenceScore::new(0.0).is_ok());
        assert!(ConfidenceScore::new(0.5).is_ok());
        assert!(ConfidenceScore::new(1.0).is_ok());
        assert_eq!(
            ConfidenceScore::new(1.01),
            Err(ScoreError::OutOfRange(1.01))
        );
        assert_eq!(
            ConfidenceScore::new(-0.1),
            Err(ScoreError::OutOfRange(-0.1))
        );
        assert_eq!(ConfidenceScore::new(f64::NAN), Err(ScoreError::NotFinite));
        assert_eq!(
            ConfidenceScore::new(f64::INFINITY),
            Err(ScoreError::NotFinite)
        );
    }

    #[test]
    fn confidence_presets() {
        assert!(ConfidenceScore::high().value() > ConfidenceScore::medium().value());
        assert!(ConfidenceScore::medium().value() > ConfidenceScore::low().value());
        assert!(ConfidenceScore::low().value() > ConfidenceScore::zero().value());
    }

    #[test]
    fn meets_threshold() {
        let threshold = ConfidenceScore::new(0.7).unwrap();
        assert!(ConfidenceScore::new(0.7).unwrap().meets(threshold));
        assert!(ConfidenceScore::new(0.9).unwrap().meets(threshold));
        assert!(!ConfidenceScore::new(0.69).unwrap().meets(threshold));
    }

    #[test]
    fn nudge_never_overshoots() {
        let start = RiskScore::new(0.2).unwrap();
        let target = RiskScore::new(1.0).unwrap();

        let stepped = start.nudged_toward(target, 0.5);
        assert!((stepped.value() - 0.6).abs() < 1e-9);

        // alpha above 1 is clamped, landing exactly on the target
        let full = start.nudged_toward(target, 5.0);
        assert!((full.value() - 1.0).abs() < 1e-9);

        // stepping toward a lower target decreases the score
        let down = RiskScore::new(0.8)
            .unwrap()
            .nudged_toward(RiskScore::zero(), 0.25);
        assert!((down.value() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn saturating_clamps() {
        assert!((RiskScore::saturating(1.7).value() - 1.0).abs() < f64::EPSILON);
        assert!(RiskScore::saturating(-0.4).value().abs() < f64::EPSILON);
        assert!(RiskScore::saturating(f64::NAN).value().abs() < f64::EPSILON);
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: ConfidenceScore = serde_json::from_str("0.85").unwrap();
        assert!((ok.value() - 0.85).abs() < f64::EPSILON);
        assert!(serde_json::from_str::<ConfidenceScore>("1.5").is_err());
        assert!(serde_json::from_str::<RiskScore>("-0.2").is_err());
    }
}
