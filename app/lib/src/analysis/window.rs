//! Sliding-window slopes and turning-point detection.
//!
//! Slopes are computed for every stride-1 window of `window_size` records
//! over data sorted by original value. A boundary `b` is a candidate when
//! the window ending at `b` and the window starting at `b` disagree in slope
//! by more than the threshold. Adjacent windows overlap in all but one
//! record, so they are never compared directly.
//!
//! Candidates form runs around each real change; every run collapses to its
//! strongest member, ties going to the earliest index.

use log::debug;
use serde::Serialize;

use crate::config::AnalyzerConfig;

/// A detected change in local slope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurningPoint {
    /// Position in the value-sorted data; the last record of the left segment.
    pub index: usize,
    /// Original value at `index`.
    pub original_value: u64,
    /// Absolute slope difference between the two windows meeting here.
    pub slope_change: f64,
}

#[derive(Default)]
struct WindowSums {
    sx: i128,
    sy: i128,
    sxx: i128,
    sxy: i128,
}

impl WindowSums {
    fn update(&mut self, x: u64, y: u64, add: bool) -> Option<()> {
        let (x, y) = (x as i128, y as i128);
        let xx = x.checked_mul(x)?;
        let xy = x.checked_mul(y)?;
        if add {
            self.sx = self.sx.checked_add(x)?;
            self.sy = self.sy.checked_add(y)?;
            self.sxx = self.sxx.checked_add(xx)?;
            self.sxy = self.sxy.checked_add(xy)?;
        } else {
            self.sx -= x;
            self.sy -= y;
            self.sxx -= xx;
            self.sxy -= xy;
        }
        Some(())
    }

    fn slope(&self, n: i128) -> Option<f64> {
        let num = n
            .checked_mul(self.sxy)?
            .checked_sub(self.sx.checked_mul(self.sy)?)?;
        let den = n
            .checked_mul(self.sxx)?
            .checked_sub(self.sx.checked_mul(self.sx)?)?;
        Some(if den == 0 { f64::NAN } else { num as f64 / den as f64 })
    }
}

fn exact_slopes(x: &[u64], y: &[u64], width: usize) -> Option<Vec<f64>> {
    let mut sums = WindowSums::default();
    for i in 0..width {
        sums.update(x[i], y[i], true)?;
    }
    let n = width as i128;
    let mut slopes = Vec::with_capacity(x.len() - width + 1);
    slopes.push(sums.slope(n)?);
    for k in 1..=x.len() - width {
        sums.update(x[k - 1], y[k - 1], false)?;
        sums.update(x[k + width - 1], y[k + width - 1], true)?;
        slopes.push(sums.slope(n)?);
    }
    Some(slopes)
}

fn direct_slope(x: &[u64], y: &[u64]) -> f64 {
    let n = x.len() as f64;
    let x_mean = x.iter().map(|&v| v as f64).sum::<f64>() / n;
    let y_mean = y.iter().map(|&v| v as f64).sum::<f64>() / n;
    let (mut sxx, mut sxy) = (0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi as f64 - x_mean;
        sxx += dx * dx;
        sxy += dx * (yi as f64 - y_mean);
    }
    if sxx == 0.0 {
        f64::NAN
    } else {
        sxy / sxx
    }
}

/// Least-squares slope of every stride-1 window of `width` records.
///
/// Window `k` covers `[k, k + width)`. A window whose x values are all equal
/// has a NaN slope. Empty when the data is shorter than one window.
pub fn window_slopes(x: &[u64], y: &[u64], width: usize) -> Vec<f64> {
    let n = x.len().min(y.len());
    if width < 2 || n < width {
        return Vec::new();
    }
    let (x, y) = (&x[..n], &y[..n]);
    exact_slopes(x, y, width).unwrap_or_else(|| {
        debug!("Window sums overflow; computing {} window slopes directly", n - width + 1);
        (0..=n - width)
            .map(|k| direct_slope(&x[k..k + width], &y[k..k + width]))
            .collect()
    })
}

/// Turning points of data sorted by `x`, earliest first.
///
/// Needs at least two full windows of data. Points within `edge_guard`
/// records of either end are dropped and at most `max_segments - 1` are kept.
pub fn find_turning_points(x: &[u64], y: &[u64], config: &AnalyzerConfig) -> Vec<TurningPoint> {
    let n = x.len().min(y.len());
    let width = config.window_size;
    if width < 2 || n < 2 * width {
        return Vec::new();
    }

    let slopes = window_slopes(x, y, width);
    let mut points: Vec<TurningPoint> = Vec::new();
    let mut last_flagged: Option<usize> = None;

    for k in 0..=n - 2 * width {
        let change = (slopes[k + width] - slopes[k]).abs();
        if change.is_nan() || change <= config.slope_threshold {
            continue;
        }
        let boundary = k + width;
        let candidate = TurningPoint {
            index: boundary,
            original_value: x[boundary],
            slope_change: change,
        };
        match (points.last_mut(), last_flagged) {
            (Some(peak), Some(previous)) if boundary - previous < config.merge_distance => {
                if change > peak.slope_change {
                    *peak = candidate;
                }
            }
            _ => points.push(candidate),
        }
        last_flagged = Some(boundary);
    }

    let guard = config.edge_guard;
    points.retain(|tp| tp.index > guard && tp.index < n.saturating_sub(guard));
    points.truncate(config.max_segments.saturating_sub(1));
    debug!("Found {} turning points in {} records", points.len(), n);
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hinge(n: u64, knee: u64, left: u64, right: u64) -> (Vec<u64>, Vec<u64>) {
        let x: Vec<u64> = (0..n).collect();
        let y = x
            .iter()
            .map(|&v| {
                if v < knee {
                    left * v
                } else {
                    left * knee + right * (v - knee)
                }
            })
            .collect();
        (x, y)
    }

    #[test]
    fn test_window_slopes_of_a_line() {
        let x: Vec<u64> = (0..20).collect();
        let y: Vec<u64> = x.iter().map(|v| 3 * v + 7).collect();
        let slopes = window_slopes(&x, &y, 5);
        assert_eq!(slopes.len(), 16);
        assert!(slopes.iter().all(|&s| s == 3.0));
    }

    #[test]
    fn test_constant_x_window_is_nan() {
        let x = vec![4u64; 6];
        let y: Vec<u64> = (0..6).collect();
        let slopes = window_slopes(&x, &y, 3);
        assert!(slopes.iter().all(|s| s.is_nan()));
        assert!(window_slopes(&x, &y, 10).is_empty());
    }

    #[test]
    fn test_overflowing_sums_fall_back_to_direct() {
        let x = vec![0, 1, u64::MAX / 2, u64::MAX];
        let y = vec![0, 1, 2, 3];
        let slopes = window_slopes(&x, &y, 2);
        assert_eq!(slopes.len(), 3);
        assert!((slopes[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_knee_is_one_turning_point() {
        let (x, y) = hinge(10_000, 5_000, 1, 5);
        let points = find_turning_points(&x, &y, &AnalyzerConfig::default());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].index, 5_000);
        assert_eq!(points[0].original_value, 5_000);
        assert!((points[0].slope_change - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_straight_line_has_no_turning_points() {
        let (x, y) = hinge(5_000, 5_000, 2, 2);
        assert!(find_turning_points(&x, &y, &AnalyzerConfig::default()).is_empty());
    }

    #[test]
    fn test_short_data_has_no_turning_points() {
        let (x, y) = hinge(1_999, 1_000, 1, 5);
        assert!(find_turning_points(&x, &y, &AnalyzerConfig::default()).is_empty());
    }

    #[test]
    fn test_cap_keeps_earliest_points() {
        let x: Vec<u64> = (0..1_000).collect();
        let mut y = Vec::with_capacity(x.len());
        let mut value = 0u64;
        for &v in &x {
            // slope alternates 1, 4, 1, 4, ... every 200 records
            value += if (v / 200) % 2 == 0 { 1 } else { 4 };
            y.push(value);
        }
        let config = AnalyzerConfig::new()
            .with_window_size(50)
            .with_edge_guard(10)
            .with_merge_distance(20)
            .with_max_segments(3);
        let points = find_turning_points(&x, &y, &config);
        let indices: Vec<usize> = points.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![199, 399]);
    }
}
