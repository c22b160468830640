// Peak interval - breathing rate from the spacing of signal crests
//
// Time-domain counterpart to the spectral path: smooth the uniform series
// with a centred moving average, keep local maxima above the series mean,
// and turn the mean crest spacing into a frequency. Crests closer than one
// fastest plausible breath are merged, keeping the higher one.

/// Half-width of the smoothing window, in samples
pub const SMOOTHING_HALF_WIDTH: usize = 3;

/// Rate recovered from crest spacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakRate {
    pub hz: f64,
    /// Crests used for the mean interval
    pub crests: usize,
}

/// Centred moving average; windows shrink at the edges
pub fn moving_average(values: &[f64], half_width: usize) -> Vec<f64> {
    let n = values.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half_width);
            let hi = (i + half_width + 1).min(n);
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

/// Indices of strict local maxima above the mean, at least `min_distance` apart
pub fn crests_above_mean(values: &[f64], min_distance: usize) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    let mut crests: Vec<usize> = Vec::new();
    for i in 1..values.len() - 1 {
        let v = values[i];
        if !(v > values[i - 1] && v > values[i + 1] && v > mean) {
            continue;
        }
        match crests.last().copied() {
            Some(last) if i - last < min_distance => {
                if v > values[last] {
                    let end = crests.len() - 1;
                    crests[end] = i;
                }
            }
            _ => crests.push(i),
        }
    }
    crests
}

/// Mean crest spacing of `values` sampled at `rate_hz`
///
/// Crests nearer than one period of `max_hz` count once. Returns `None`
/// with fewer than two crests.
pub fn peak_interval_rate(values: &[f64], rate_hz: f64, max_hz: f64) -> Option<PeakRate> {
    if !(rate_hz > 0.0 && max_hz > 0.0) {
        return None;
    }

    let smoothed = moving_average(values, SMOOTHING_HALF_WIDTH);
    let min_distance = ((rate_hz / max_hz).floor() as usize).max(1);
    let crests = crests_above_mean(&smoothed, min_distance);
    if crests.len() < 2 {
        return None;
    }

    let (first, last) = (crests[0], crests[crests.len() - 1]);
    let mean_period = (last - first) as f64 / (crests.len() - 1) as f64 / rate_hz;
    Some(PeakRate {
        hz: 1.0 / mean_period,
        crests: crests.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sinusoid(freq_hz: f64, rate_hz: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq_hz * i as f64 / rate_hz).sin())
            .collect()
    }

    #[test]
    fn test_moving_average_shrinks_at_edges() {
        let out = moving_average(&[3.0, 0.0, 0.0, 0.0, 6.0], 1);
        assert_eq!(out, vec![1.5, 1.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_crests_merge_within_min_distance() {
        let values = [0.0, 2.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 2.5, 0.0];
        assert_eq!(crests_above_mean(&values, 4), vec![3, 8]);
        assert_eq!(crests_above_mean(&values, 1), vec![1, 3, 8]);
    }

    #[test]
    fn test_crests_ignore_maxima_below_mean() {
        let values = [0.0, 10.0, 0.0, 1.0, 0.0, 10.0, 0.0];
        assert_eq!(crests_above_mean(&values, 1), vec![1, 5]);
    }

    #[test]
    fn test_sinusoid_rate_from_crests() {
        let rate = peak_interval_rate(&sinusoid(0.25, 10.0, 200), 10.0, 0.67).unwrap();
        assert_eq!(rate.crests, 5);
        assert!((rate.hz * 60.0 - 15.0).abs() < 0.5, "{} bpm", rate.hz * 60.0);
    }

    #[test]
    fn test_single_crest_has_no_rate() {
        assert!(peak_interval_rate(&sinusoid(0.1, 10.0, 80), 10.0, 0.67).is_none());
        assert!(peak_interval_rate(&[1.0; 50], 10.0, 0.67).is_none());
        assert!(peak_interval_rate(&sinusoid(0.25, 10.0, 200), 0.0, 0.67).is_none());
    }
}
