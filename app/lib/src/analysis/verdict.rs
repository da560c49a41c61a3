//! Result shapes shared by the analysis steps.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{Result, ValmapError};

/// Outcome of one analysis step.
///
/// A failed step keeps its message and serializes as `{"error": "..."}`, so
/// a multi-step report always carries every sibling result.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    /// The step produced a value.
    Done(T),
    /// The step failed with this message.
    Failed(String),
}

impl<T> StepOutcome<T> {
    /// The value, if the step succeeded.
    pub fn value(&self) -> Option<&T> {
        match self {
            StepOutcome::Done(v) => Some(v),
            StepOutcome::Failed(_) => None,
        }
    }

    /// The error message, if the step failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            StepOutcome::Done(_) => None,
            StepOutcome::Failed(msg) => Some(msg),
        }
    }

    /// Whether the step succeeded.
    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Done(_))
    }

    /// Convert back into a `Result`.
    pub fn into_result(self) -> Result<T> {
        match self {
            StepOutcome::Done(v) => Ok(v),
            StepOutcome::Failed(message) => Err(ValmapError::Analysis { message }),
        }
    }
}

impl<T> From<Result<T>> for StepOutcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => StepOutcome::Done(v),
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }
}

impl<T: Serialize> Serialize for StepOutcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            StepOutcome::Done(v) => v.serialize(serializer),
            StepOutcome::Failed(msg) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", msg)?;
                map.end()
            }
        }
    }
}

/// Family of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// `target = original + k`.
    Constant,
    /// `target = a * original + b`.
    Linear,
    /// Linear on each of several value ranges.
    PiecewiseLinear,
    /// Degree-2 polynomial.
    Polynomial,
    /// `y = c * x^a`.
    Power,
    /// `y = a ln(x) + b`.
    Logarithmic,
    /// `y = exp(a x + b)`.
    Exponential,
}

impl ModelKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Constant => "constant",
            ModelKind::Linear => "linear",
            ModelKind::PiecewiseLinear => "piecewise_linear",
            ModelKind::Polynomial => "polynomial",
            ModelKind::Power => "power",
            ModelKind::Logarithmic => "logarithmic",
            ModelKind::Exponential => "exponential",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModelParameters {
    /// Slope and intercept in raw space.
    Line {
        /// Slope.
        slope: f64,
        /// Intercept.
        intercept: f64,
    },
    /// Polynomial coefficients, highest degree first.
    Polynomial {
        /// `[a, b, c]` for `a x² + b x + c`.
        coefficients: Vec<f64>,
        /// Polynomial degree.
        degree: usize,
    },
    /// Slope `a` and intercept `b` of the line fitted in transformed space.
    Transformed {
        /// Transformed-space slope.
        a: f64,
        /// Transformed-space intercept.
        b: f64,
    },
}

/// One fitted model with its score and formula.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    /// Model family.
    pub kind: ModelKind,
    /// Family-specific parameters.
    pub parameters: ModelParameters,
    /// Coefficient of determination; negative when worse than the mean.
    pub r_squared: f64,
    /// Human-readable formula.
    pub formula: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_step_serializes_as_error_key() {
        let failed: StepOutcome<u32> = Err(ValmapError::degenerate("flat")).into();
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json, serde_json::json!({"error": "degenerate input: flat"}));
        assert_eq!(failed.error(), Some("degenerate input: flat"));
    }

    #[test]
    fn test_done_step_serializes_transparently() {
        let done: StepOutcome<u32> = Ok(7).into();
        assert_eq!(serde_json::to_value(&done).unwrap(), serde_json::json!(7));
        assert_eq!(done.value(), Some(&7));
        assert!(done.into_result().is_ok());
    }

    #[test]
    fn test_parameters_serialize_untagged() {
        let fit = FitResult {
            kind: ModelKind::Power,
            parameters: ModelParameters::Transformed { a: 2.0, b: 0.5 },
            r_squared: 0.9,
            formula: "y".to_string(),
        };
        let json = serde_json::to_value(&fit).unwrap();
        assert_eq!(json["kind"], "power");
        assert_eq!(json["parameters"]["a"], 2.0);
    }
}
