//! Window statistics over date-ordered series.
//!
//! All windows use `min_periods = 1` semantics: the first `window - 1`
//! outputs average over however many observations exist so far.

/// Trailing mean over up to `window` observations.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let n = (i + 1).min(window);
        out.push(sum / n as f64);
    }
    out
}

/// Trailing sample standard deviation (ddof = 1).
///
/// A window holding a single observation has no sample deviation and yields
/// `None`.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            sample_std(&values[start..=i])
        })
        .collect()
}

pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

pub fn cumulative_sum(values: &[f64]) -> Vec<f64> {
    let mut running = 0.0;
    values
        .iter()
        .map(|v| {
            running += v;
            running
        })
        .collect()
}

/// Running total over present values. Stays `None` until the first value.
pub fn cumulative_sum_skipping_none(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut running: Option<f64> = None;
    values
        .iter()
        .map(|v| {
            if let Some(v) = v {
                running = Some(running.unwrap_or(0.0) + v);
            }
            running
        })
        .collect()
}

/// Sum of present values, `None` when every value is missing.
pub fn sum_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percent change from `previous` to `current`; `None` when undefined.
pub fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_rolling_mean_min_periods_one() {
        let out = rolling_mean(&[10.0, 20.0, 30.0, 40.0], 3);
        assert_eq!(out, vec![10.0, 15.0, 20.0, 30.0]);
    }

    #[test]
    fn test_rolling_std_sample() {
        let out = rolling_std(&[1.0, 2.0, 3.0, 10.0], 3);
        assert_eq!(out[0], None);
        assert!(approx(out[1].unwrap(), (0.5f64).sqrt()));
        assert!(approx(out[2].unwrap(), 1.0));
        // window [2, 3, 10]: mean 5, squared deviations 9 + 4 + 25 = 38, / 2
        assert!(approx(out[3].unwrap(), 19.0f64.sqrt()));
    }

    #[test]
    fn test_cumulative_sum_skipping_none() {
        let out = cumulative_sum_skipping_none(&[None, Some(1.0), None, Some(2.5)]);
        assert_eq!(out, vec![None, Some(1.0), Some(1.0), Some(3.5)]);
    }

    #[test]
    fn test_sum_present() {
        assert_eq!(sum_present(vec![None, None]), None);
        assert_eq!(sum_present(vec![None, Some(2.0), Some(3.0)]), Some(5.0));
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(0.0, 5.0), None);
        assert!(approx(pct_change(100.0, 70.0).unwrap(), -30.0));
    }
}
