//! Confidence decay functions and the default policy

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::versioning::DataMap;
use crate::error::{Error, Result};

/// Shape of the decay curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayFunction {
    /// Halves every half-life
    #[default]
    Exponential,
    /// Reaches zero after four half-lives
    Linear,
    /// Fast early drop, slow tail; reaches zero after nine half-lives
    Logarithmic,
    /// Piecewise constant factors from a step table
    Step,
}

impl DecayFunction {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exponential => "exponential",
            Self::Linear => "linear",
            Self::Logarithmic => "logarithmic",
            Self::Step => "step",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "exponential" => Some(Self::Exponential),
            "linear" => Some(Self::Linear),
            "logarithmic" => Some(Self::Logarithmic),
            "step" => Some(Self::Step),
            _ => None,
        }
    }

    /// Get all decay functions
    pub fn all() -> &'static [DecayFunction] {
        &[
            Self::Exponential,
            Self::Linear,
            Self::Logarithmic,
            Self::Step,
        ]
    }
}

impl fmt::Display for DecayFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecayFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            Error::InvalidInput(format!(
                "unknown decay function '{}'; expected exponential, linear, logarithmic or step",
                s
            ))
        })
    }
}

/// One row of the step table: from `after` onwards confidence is scaled by `factor`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayStep {
    pub after: Duration,
    pub factor: f64,
}

impl DecayStep {
    pub fn new(after: Duration, factor: f64) -> Self {
        Self { after, factor }
    }

    /// 7d → 0.9, 30d → 0.7, 90d → 0.5, 180d → 0.3
    pub fn default_table() -> Vec<DecayStep> {
        vec![
            Self::new(Duration::days(7), 0.9),
            Self::new(Duration::days(30), 0.7),
            Self::new(Duration::days(90), 0.5),
            Self::new(Duration::days(180), 0.3),
        ]
    }
}

/// Original and effective confidence of one edge at one viewpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayOutcome {
    pub original_confidence: f64,
    pub decayed_confidence: f64,
}

impl DecayOutcome {
    /// How much confidence was lost
    pub fn decay_amount(&self) -> f64 {
        self.original_confidence - self.decayed_confidence
    }

    /// Loss as a percentage of the original; 0 when the original is 0
    pub fn decay_percentage(&self) -> f64 {
        if self.original_confidence == 0.0 {
            return 0.0;
        }
        self.decay_amount() / self.original_confidence * 100.0
    }
}

/// A confidence decay model
///
/// Implementations must be monotonically non-increasing in `elapsed`, must
/// return `original` for zero (or negative) elapsed time, and must never
/// return more than `original`.
pub trait DecayModel: Send + Sync + fmt::Debug {
    /// Effective confidence after `elapsed`
    fn decay(&self, original: f64, elapsed: Duration, critical: bool) -> f64;

    /// Effective confidence of a version recorded at `recorded_at`, seen from `viewpoint`
    fn decay_at(
        &self,
        original: f64,
        recorded_at: DateTime<Utc>,
        viewpoint: DateTime<Utc>,
        critical: bool,
    ) -> f64 {
        self.decay(original, viewpoint - recorded_at, critical)
    }

    fn outcome(&self, original: f64, elapsed: Duration, critical: bool) -> DecayOutcome {
        DecayOutcome {
            original_confidence: original,
            decayed_confidence: self.decay(original, elapsed, critical),
        }
    }

    /// Confidence expected at `at`, which must not be before `now`
    fn project(
        &self,
        original: f64,
        recorded_at: DateTime<Utc>,
        now: DateTime<Utc>,
        at: DateTime<Utc>,
        critical: bool,
    ) -> Result<f64> {
        if at < now {
            return Err(Error::InvalidInput(format!(
                "projection time {} is before the reference time {}",
                at.to_rfc3339(),
                now.to_rfc3339()
            )));
        }
        Ok(self.decay_at(original, recorded_at, at, critical))
    }

    /// Time until the next half-life mark; `None` when the edge does not decay
    fn half_life_remaining(&self, _original: f64, _elapsed: Duration, _critical: bool) -> Option<Duration> {
        None
    }

    /// Settings reported alongside decay statistics
    fn describe(&self) -> DataMap {
        DataMap::new()
    }
}

/// Default decay model
#[derive(Debug, Clone, PartialEq)]
pub struct DecayPolicy {
    pub function: DecayFunction,
    pub half_life: Duration,
    /// Floor for decayed confidence, capped at each edge's original
    pub minimum_confidence: f64,
    /// Exempt critical edges from decay
    pub preserve_critical: bool,
    /// Edges at or above this original confidence count as critical
    pub critical_threshold: Option<f64>,
    /// Used by [`DecayFunction::Step`]; offsets ascending
    pub steps: Vec<DecayStep>,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            function: DecayFunction::Exponential,
            half_life: Duration::days(30),
            minimum_confidence: 0.0,
            preserve_critical: true,
            critical_threshold: None,
            steps: DecayStep::default_table(),
        }
    }
}

impl DecayPolicy {
    /// Default policy with a different curve
    pub fn new(function: DecayFunction) -> Self {
        Self {
            function,
            ..Self::default()
        }
    }

    pub fn with_half_life(mut self, half_life: Duration) -> Self {
        self.half_life = half_life;
        self
    }

    pub fn with_minimum_confidence(mut self, minimum: f64) -> Self {
        self.minimum_confidence = minimum;
        self
    }

    pub fn with_preserve_critical(mut self, preserve: bool) -> Self {
        self.preserve_critical = preserve;
        self
    }

    pub fn with_critical_threshold(mut self, threshold: Option<f64>) -> Self {
        self.critical_threshold = threshold;
        self
    }

    pub fn with_steps(mut self, steps: Vec<DecayStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Check that the policy keeps every decay guarantee
    pub fn validate(&self) -> Result<()> {
        if self.half_life <= Duration::zero() {
            return Err(Error::InvalidInput("half-life must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.minimum_confidence) {
            return Err(Error::InvalidInput(format!(
                "minimum confidence must be within [0, 1], got {}",
                self.minimum_confidence
            )));
        }
        if let Some(threshold) = self.critical_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(Error::InvalidInput(format!(
                    "critical threshold must be within [0, 1], got {}",
                    threshold
                )));
            }
        }

        let mut previous: Option<&DecayStep> = None;
        for step in &self.steps {
            if !(0.0..=1.0).contains(&step.factor) {
                return Err(Error::InvalidInput(format!(
                    "step factor must be within [0, 1], got {}",
                    step.factor
                )));
            }
            if step.after < Duration::zero() {
                return Err(Error::InvalidInput("step offsets must not be negative".to_string()));
            }
            if let Some(previous) = previous {
                if step.after <= previous.after {
                    return Err(Error::InvalidInput(
                        "step offsets must be strictly increasing".to_string(),
                    ));
                }
                if step.factor > previous.factor {
                    return Err(Error::InvalidInput(
                        "step factors must not increase".to_string(),
                    ));
                }
            }
            previous = Some(step);
        }
        Ok(())
    }

    /// Whether an edge is exempt from decay
    pub fn is_exempt(&self, original: f64, critical: bool) -> bool {
        if !self.preserve_critical {
            return false;
        }
        critical
            || self
                .critical_threshold
                .is_some_and(|threshold| original >= threshold)
    }

    fn curve(&self, original: f64, elapsed: Duration) -> f64 {
        let ratio = hours(elapsed) / hours(self.half_life);
        match self.function {
            DecayFunction::Exponential => original * 0.5_f64.powf(ratio),
            DecayFunction::Linear => original * (1.0 - ratio / 4.0).max(0.0),
            DecayFunction::Logarithmic => {
                original * (1.0 - (1.0 + ratio).ln() / 10.0_f64.ln()).max(0.0)
            }
            DecayFunction::Step => {
                let factor = self
                    .steps
                    .iter()
                    .take_while(|step| step.after <= elapsed)
                    .last()
                    .map(|step| step.factor)
                    .unwrap_or(1.0);
                original * factor
            }
        }
    }
}

impl DecayModel for DecayPolicy {
    fn decay(&self, original: f64, elapsed: Duration, critical: bool) -> f64 {
        if elapsed <= Duration::zero() || self.is_exempt(original, critical) {
            return original;
        }
        if self.half_life <= Duration::zero() {
            return original;
        }

        let floor = self.minimum_confidence.min(original);
        self.curve(original, elapsed).max(floor).min(original)
    }

    fn half_life_remaining(&self, original: f64, elapsed: Duration, critical: bool) -> Option<Duration> {
        if self.is_exempt(original, critical) {
            return None;
        }
        match self.function {
            // Linear reaches zero at four half-lives; report half the time left
            DecayFunction::Linear => {
                let left = self.half_life * 4 - elapsed.max(Duration::zero());
                Some((left / 2).max(Duration::zero()))
            }
            _ => Some(self.half_life),
        }
    }

    fn describe(&self) -> DataMap {
        let mut map = DataMap::new();
        map.insert("decay_function".to_string(), json!(self.function.as_str()));
        map.insert("half_life_hours".to_string(), json!(hours(self.half_life)));
        map.insert("minimum_confidence".to_string(), json!(self.minimum_confidence));
        map.insert("preserve_critical".to_string(), json!(self.preserve_critical));
        map.insert("critical_threshold".to_string(), json!(self.critical_threshold));
        map
    }
}

fn hours(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 3_600_000.0
}
