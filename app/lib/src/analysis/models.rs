//! Multi-family model fitting.
//!
//! Power, logarithmic and exponential models are fitted by linear regression
//! in transformed space; their R² is the transformed-space R². The quadratic
//! is fitted directly and scored against the mean baseline. Families whose
//! positivity requirement fails report a precondition error instead of a fit.

use log::debug;
use serde::Serialize;

use crate::analysis::verdict::{FitResult, ModelKind, ModelParameters, StepOutcome};
use crate::dataset::Dataset;
use crate::error::{Result, ValmapError};
use crate::stats::regression::{linregress, polyfit2};

/// Every family's fit or error, plus the selected best model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    /// Plain linear fit, reported for reference only.
    pub linear: StepOutcome<FitResult>,
    /// Degree-2 polynomial.
    pub polynomial: StepOutcome<FitResult>,
    /// `y = c x^a`.
    pub power: StepOutcome<FitResult>,
    /// `y = a ln(x) + b`.
    pub logarithmic: StepOutcome<FitResult>,
    /// `y = exp(a x + b)`.
    pub exponential: StepOutcome<FitResult>,
    /// Candidate with the strictly highest R², or why there is none.
    pub best_model: StepOutcome<FitResult>,
}

impl ModelReport {
    /// Selection candidates in tie-break order.
    pub fn candidates(&self) -> [&StepOutcome<FitResult>; 4] {
        [&self.polynomial, &self.power, &self.logarithmic, &self.exponential]
    }
}

fn signed(value: f64, precision: usize) -> String {
    let sign = if value < 0.0 { '-' } else { '+' };
    format!("{} {:.*}", sign, precision, value.abs())
}

fn require_positive(model: &'static str, what: &str, values: &[f64]) -> Result<()> {
    if values.iter().all(|&v| v > 0.0) {
        Ok(())
    } else {
        Err(ValmapError::Precondition {
            model,
            message: format!("requires strictly positive {} values", what),
        })
    }
}

fn ln_all(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| v.ln()).collect()
}

/// Fit `y = slope * x + intercept`.
pub fn fit_linear(x: &[f64], y: &[f64]) -> Result<FitResult> {
    let fit = linregress(x, y)?;
    Ok(FitResult {
        kind: ModelKind::Linear,
        parameters: ModelParameters::Line {
            slope: fit.slope,
            intercept: fit.intercept,
        },
        r_squared: fit.r_squared,
        formula: format!("y = {:.3}x {}", fit.slope, signed(fit.intercept, 1)),
    })
}

/// Fit `y = a x² + b x + c`.
pub fn fit_polynomial(x: &[f64], y: &[f64]) -> Result<FitResult> {
    let fit = polyfit2(x, y)?;
    let [a, b, c] = fit.coefficients;
    Ok(FitResult {
        kind: ModelKind::Polynomial,
        parameters: ModelParameters::Polynomial {
            coefficients: fit.coefficients.to_vec(),
            degree: 2,
        },
        r_squared: fit.r_squared,
        formula: format!("y = {:.3}x^2 {}x {}", a, signed(b, 3), signed(c, 3)),
    })
}

/// Fit `ln y = a ln x + b`, i.e. `y = e^b x^a`.
pub fn fit_power(x: &[f64], y: &[f64]) -> Result<FitResult> {
    require_positive("power", "original", x)?;
    require_positive("power", "target", y)?;
    let fit = linregress(&ln_all(x), &ln_all(y))?;
    Ok(FitResult {
        kind: ModelKind::Power,
        parameters: ModelParameters::Transformed {
            a: fit.slope,
            b: fit.intercept,
        },
        r_squared: fit.r_squared,
        formula: format!("y = {:.3}x^{:.3}", fit.intercept.exp(), fit.slope),
    })
}

/// Fit `y = a ln x + b`.
pub fn fit_logarithmic(x: &[f64], y: &[f64]) -> Result<FitResult> {
    require_positive("logarithmic", "original", x)?;
    let fit = linregress(&ln_all(x), y)?;
    Ok(FitResult {
        kind: ModelKind::Logarithmic,
        parameters: ModelParameters::Transformed {
            a: fit.slope,
            b: fit.intercept,
        },
        r_squared: fit.r_squared,
        formula: format!("y = {:.3}ln(x) {}", fit.slope, signed(fit.intercept, 1)),
    })
}

/// Fit `ln y = a x + b`.
pub fn fit_exponential(x: &[f64], y: &[f64]) -> Result<FitResult> {
    require_positive("exponential", "target", y)?;
    let fit = linregress(x, &ln_all(y))?;
    Ok(FitResult {
        kind: ModelKind::Exponential,
        parameters: ModelParameters::Transformed {
            a: fit.slope,
            b: fit.intercept,
        },
        r_squared: fit.r_squared,
        formula: format!("y = exp({:.3}x {})", fit.slope, signed(fit.intercept, 1)),
    })
}

/// Pick the candidate with the strictly highest finite R².
///
/// Earlier candidates win ties; failed fits are skipped.
pub fn select_best<'a, I>(candidates: I) -> StepOutcome<FitResult>
where
    I: IntoIterator<Item = &'a StepOutcome<FitResult>>,
{
    let mut best: Option<&FitResult> = None;
    for fit in candidates.into_iter().filter_map(StepOutcome::value) {
        if fit.r_squared.is_nan() {
            continue;
        }
        if best.map_or(true, |b| fit.r_squared > b.r_squared) {
            best = Some(fit);
        }
    }
    match best {
        Some(fit) => StepOutcome::Done(fit.clone()),
        None => StepOutcome::Failed("no usable model: every family failed".to_string()),
    }
}

/// Fits every model family against `(original, target)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelFitter;

impl ModelFitter {
    /// Create a fitter.
    pub fn new() -> Self {
        ModelFitter
    }

    /// Fit all families and select the best.
    pub fn fit_all(&self, dataset: &Dataset) -> ModelReport {
        let x = dataset.original_f64();
        let y = dataset.target_f64();
        self.fit_series(&x, &y)
    }

    /// Fit all families on raw series.
    pub fn fit_series(&self, x: &[f64], y: &[f64]) -> ModelReport {
        let mut report = ModelReport {
            linear: fit_linear(x, y).into(),
            polynomial: fit_polynomial(x, y).into(),
            power: fit_power(x, y).into(),
            logarithmic: fit_logarithmic(x, y).into(),
            exponential: fit_exponential(x, y).into(),
            best_model: StepOutcome::Failed(String::new()),
        };
        report.best_model = select_best(report.candidates());
        if let Some(best) = report.best_model.value() {
            debug!("Best model: {} (R² = {:.4})", best.kind, best.r_squared);
        }
        report
    }
}
