//! Tagging of measured versus synthesized numbers.

use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::ops::Range;

use crate::error::ProbeFailure;

/// Why a value had to be synthesized instead of measured.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EstimateReason {
    /// A probe failed and its slot was filled with a plausible value.
    ProbeFailed(String),
    /// Some, not all, of the inputs were themselves estimates.
    PartialFailure { failed: usize, total: usize },
    /// Too few samples to compute the statistic.
    InsufficientSamples(usize),
    /// Every task in the phase failed.
    AllFailed,
    /// The phase machinery itself broke down.
    MechanismFailed(String),
    /// The whole pipeline failed and the result was synthesized.
    PipelineFailed(String),
    /// Measurement disabled by configuration.
    Skipped,
}

impl From<&ProbeFailure> for EstimateReason {
    fn from(failure: &ProbeFailure) -> Self {
        EstimateReason::ProbeFailed(failure.to_string())
    }
}

impl fmt::Display for EstimateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateReason::ProbeFailed(cause) => write!(f, "probe failed: {cause}"),
            EstimateReason::PartialFailure { failed, total } => {
                write!(f, "{failed} of {total} samples estimated")
            }
            EstimateReason::InsufficientSamples(n) => write!(f, "only {n} sample(s)"),
            EstimateReason::AllFailed => write!(f, "every task failed"),
            EstimateReason::MechanismFailed(cause) => write!(f, "phase failed: {cause}"),
            EstimateReason::PipelineFailed(cause) => write!(f, "test failed: {cause}"),
            EstimateReason::Skipped => f.write_str("not measured"),
        }
    }
}

/// A number that was either observed on the wire or made up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Sample<T> {
    Measured { value: T },
    Estimated { value: T, reason: EstimateReason },
}

impl<T> Sample<T> {
    pub fn measured(value: T) -> Self {
        Sample::Measured { value }
    }

    pub fn estimated(value: T, reason: EstimateReason) -> Self {
        Sample::Estimated { value, reason }
    }

    pub fn value(&self) -> &T {
        match self {
            Sample::Measured { value } | Sample::Estimated { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Sample::Measured { value } | Sample::Estimated { value, .. } => value,
        }
    }

    pub fn is_measured(&self) -> bool {
        matches!(self, Sample::Measured { .. })
    }

    pub fn reason(&self) -> Option<&EstimateReason> {
        match self {
            Sample::Measured { .. } => None,
            Sample::Estimated { reason, .. } => Some(reason),
        }
    }

    /// Transform the value, keeping the tag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sample<U> {
        match self {
            Sample::Measured { value } => Sample::Measured { value: f(value) },
            Sample::Estimated { value, reason } => Sample::Estimated {
                value: f(value),
                reason,
            },
        }
    }
}

impl Sample<f64> {
    pub fn get(&self) -> f64 {
        *self.value()
    }

    pub fn rounded(self) -> Self {
        self.map(round1)
    }
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Draw a fallback value from `range`.
pub(crate) fn synthesize(range: Range<f64>) -> f64 {
    rand::thread_rng().gen_range(range)
}

/// Draw a fallback value from `range`, rounded to one decimal.
///
/// The draw stops half a step short of `range.end` so rounding never
/// lands on the excluded bound.
pub(crate) fn synthesize_rounded(range: Range<f64>) -> f64 {
    round1(synthesize(range.start..range.end - 0.05))
}

/// Mean of the values; `None` for an empty slice.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Fold per-sample tags into one tag for an aggregate computed from them.
pub(crate) fn aggregate_tag(value: f64, samples: &[Sample<f64>]) -> Sample<f64> {
    let failed = samples.iter().filter(|s| !s.is_measured()).count();
    match failed {
        0 => Sample::measured(value),
        n if n == samples.len() => Sample::estimated(value, EstimateReason::AllFailed),
        n => Sample::estimated(
            value,
            EstimateReason::PartialFailure {
                failed: n,
                total: samples.len(),
            },
        ),
    }
}
