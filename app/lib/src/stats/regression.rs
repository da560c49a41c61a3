//! Least-squares fits.
//!
//! [`linregress`] follows the usual simple-regression conventions: `r` is
//! clipped to [-1, 1], it is 0 when either series has no variance, and the
//! p-value is the two-sided t-test of a zero slope with `n - 2` degrees of
//! freedom. [`polyfit2`] fits a quadratic on centred, scaled x for
//! conditioning and converts back to raw coefficients.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValmapError};
use crate::stats::numeric::student_t_two_sided;

const TINY: f64 = 1.0e-20;

/// Ordinary least-squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Fitted slope.
    pub slope: f64,
    /// Fitted intercept.
    pub intercept: f64,
    /// Pearson correlation coefficient.
    pub r_value: f64,
    /// Coefficient of determination, `r²`.
    pub r_squared: f64,
    /// Two-sided p-value for a zero slope.
    pub p_value: f64,
    /// Standard error of the slope.
    pub std_err: f64,
    /// Number of points.
    pub n: usize,
}

impl LinearFit {
    /// Predicted y for `x`.
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Simple linear regression of `y` on `x`.
///
/// Fails when the series differ in length, have fewer than two points, or
/// every x value is identical.
pub fn linregress(x: &[f64], y: &[f64]) -> Result<LinearFit> {
    if x.len() != y.len() {
        return Err(ValmapError::degenerate(format!(
            "series lengths differ ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    let n = x.len();
    if n < 2 {
        return Err(ValmapError::degenerate(format!(
            "linear regression needs at least 2 points, got {}",
            n
        )));
    }

    let x_mean = mean(x);
    let y_mean = mean(y);
    let (mut ssxm, mut ssym, mut ssxym) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ssxm += dx * dx;
        ssym += dy * dy;
        ssxym += dx * dy;
    }

    if ssxm == 0.0 {
        return Err(ValmapError::degenerate(
            "cannot fit a line when all x values are identical",
        ));
    }

    let r = if ssym == 0.0 {
        0.0
    } else {
        (ssxym / (ssxm * ssym).sqrt()).clamp(-1.0, 1.0)
    };
    let slope = ssxym / ssxm;
    let intercept = y_mean - slope * x_mean;

    let (p_value, std_err) = if n == 2 {
        (if ssym == 0.0 { 1.0 } else { 0.0 }, 0.0)
    } else {
        let df = (n - 2) as f64;
        let t = r * (df / ((1.0 - r + TINY) * (1.0 + r + TINY))).sqrt();
        let p = student_t_two_sided(t, df);
        let se = ((1.0 - r * r).max(0.0) * ssym / ssxm / df).sqrt();
        (p, se)
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_value: r,
        r_squared: r * r,
        p_value,
        std_err,
        n,
    })
}

/// Residual error measures of a fitted line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Residuals {
    /// Mean squared error.
    pub mse: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
}

/// MSE, RMSE and MAE of `fit` over the points.
pub fn residuals(fit: &LinearFit, x: &[f64], y: &[f64]) -> Residuals {
    let n = x.len().min(y.len()).max(1) as f64;
    let (mut sq, mut abs) = (0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let e = yi - fit.predict(xi);
        sq += e * e;
        abs += e.abs();
    }
    let mse = sq / n;
    Residuals {
        mse,
        rmse: mse.sqrt(),
        mae: abs / n,
    }
}

/// Pearson correlation; `None` when either series has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let x_mean = mean(x);
    let y_mean = mean(y);
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        None
    } else {
        Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
    }
}

/// Quadratic least-squares fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticFit {
    /// Coefficients, highest degree first: `[a, b, c]` for `a x² + b x + c`.
    pub coefficients: [f64; 3],
    /// `1 - SS_res / SS_tot` against the mean baseline.
    pub r_squared: f64,
}

impl QuadraticFit {
    /// Predicted y for `x`.
    pub fn predict(&self, x: f64) -> f64 {
        let [a, b, c] = self.coefficients;
        (a * x + b) * x + c
    }
}

fn solve3(mut m: [[f64; 4]; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        for row in 0..3 {
            if row != col {
                let factor = m[row][col] / m[col][col];
                for k in col..4 {
                    m[row][k] -= factor * m[col][k];
                }
            }
        }
    }
    Some([m[0][3] / m[0][0], m[1][3] / m[1][1], m[2][3] / m[2][2]])
}

/// Fit `y = a x² + b x + c`.
///
/// Fails with fewer than three distinct x values or when y has no variance.
pub fn polyfit2(x: &[f64], y: &[f64]) -> Result<QuadraticFit> {
    if x.len() != y.len() || x.len() < 3 {
        return Err(ValmapError::degenerate(
            "quadratic fit needs at least 3 points of equal-length series",
        ));
    }

    let x_mean = mean(x);
    let scale = x.iter().map(|v| (v - x_mean).abs()).fold(0.0, f64::max);
    if scale == 0.0 {
        return Err(ValmapError::degenerate(
            "cannot fit a quadratic when all x values are identical",
        ));
    }

    // normal equations on u = (x - mean) / scale
    let mut s = [0.0f64; 5];
    let mut t = [0.0f64; 3];
    for (&xi, &yi) in x.iter().zip(y) {
        let u = (xi - x_mean) / scale;
        let mut p = 1.0;
        for (k, sk) in s.iter_mut().enumerate() {
            *sk += p;
            if k < 3 {
                t[k] += p * yi;
            }
            p *= u;
        }
    }
    let system = [
        [s[0], s[1], s[2], t[0]],
        [s[1], s[2], s[3], t[1]],
        [s[2], s[3], s[4], t[2]],
    ];
    let [c0, c1, c2] = solve3(system).ok_or_else(|| {
        ValmapError::degenerate("quadratic fit is singular (fewer than 3 distinct x values)")
    })?;

    let m = x_mean;
    let a = c2 / (scale * scale);
    let b = c1 / scale - 2.0 * c2 * m / (scale * scale);
    let c = c0 - c1 * m / scale + c2 * m * m / (scale * scale);

    let y_mean = mean(y);
    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let u = (xi - x_mean) / scale;
        let e = yi - (c0 + c1 * u + c2 * u * u);
        ss_res += e * e;
        ss_tot += (yi - y_mean) * (yi - y_mean);
    }
    if ss_tot == 0.0 {
        return Err(ValmapError::degenerate(
            "R² is undefined when all y values are identical",
        ));
    }

    Ok(QuadraticFit {
        coefficients: [a, b, c],
        r_squared: 1.0 - ss_res / ss_tot,
    })
}
