// Autocorrelation periodicity detector
//
// Alternative to the spectral peak: the breathing period is the lag with the
// strongest positive self-similarity inside the band's lag range.

use super::spectrum::parabolic_peak;

/// Strongest in-band autocorrelation peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LagPeak {
    /// Refined lag in samples
    pub lag: f64,
    /// Frequency implied by the lag
    pub hz: f64,
    /// Normalized correlation at the integer lag, -1.0..=1.0
    pub correlation: f64,
}

/// Biased autocorrelation normalized by signal energy, lags `0..=max_lag`
pub fn normalized_autocorrelation(signal: &[f64], max_lag: usize) -> Vec<f64> {
    let energy: f64 = signal.iter().map(|x| x * x).sum();
    let max_lag = max_lag.min(signal.len().saturating_sub(1));
    if energy <= 0.0 || !energy.is_finite() {
        return vec![0.0; max_lag + 1];
    }

    (0..=max_lag)
        .map(|lag| {
            signal
                .iter()
                .zip(&signal[lag..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / energy
        })
        .collect()
}

/// Highest positive local maximum for periods inside `[lo_hz, hi_hz]`
///
/// Lags are capped at two thirds of the signal so every candidate is backed
/// by at least a third of the window.
pub fn dominant_lag(signal: &[f64], rate_hz: f64, lo_hz: f64, hi_hz: f64) -> Option<LagPeak> {
    let n = signal.len();
    let min_lag = ((rate_hz / hi_hz).floor() as usize).max(1);
    let max_lag = ((rate_hz / lo_hz).ceil() as usize).min(n * 2 / 3);
    if max_lag <= min_lag {
        return None;
    }

    let acf = normalized_autocorrelation(signal, max_lag + 1);
    if acf.len() < max_lag + 2 {
        return None;
    }

    let mut best: Option<usize> = None;
    for lag in min_lag..=max_lag {
        let r = acf[lag];
        let is_local_max = r > 0.0 && r >= acf[lag - 1] && r >= acf[lag + 1];
        if is_local_max && best.map_or(true, |b| r > acf[b]) {
            best = Some(lag);
        }
    }

    let lag = best?;
    let (offset, _) = parabolic_peak(acf[lag - 1], acf[lag], acf[lag + 1]);
    let refined = lag as f64 + offset;

    Some(LagPeak {
        lag: refined,
        hz: rate_hz / refined,
        correlation: acf[lag],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_lag_is_one() {
        let signal: Vec<f64> = (0..64).map(|i| (i as f64 * 0.7).sin()).collect();
        let acf = normalized_autocorrelation(&signal, 10);
        assert_eq!(acf.len(), 11);
        assert!((acf[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_silent_signal_has_no_correlation() {
        let acf = normalized_autocorrelation(&[0.0; 16], 4);
        assert!(acf.iter().all(|&r| r == 0.0));
        assert!(dominant_lag(&[0.0; 100], 10.0, 0.1, 0.67).is_none());
    }

    #[test]
    fn test_finds_breathing_period() {
        // 0.25 Hz over 20 s at 10 Hz: period of 40 samples
        let signal: Vec<f64> = (0..200)
            .map(|i| (2.0 * std::f64::consts::PI * 0.25 * i as f64 / 10.0).sin())
            .collect();
        let peak = dominant_lag(&signal, 10.0, 0.1, 0.67).unwrap();
        assert!((peak.lag - 40.0).abs() < 0.5, "lag {}", peak.lag);
        assert!((peak.hz * 60.0 - 15.0).abs() < 0.5);
        assert!(peak.correlation > 0.5);
    }

    #[test]
    fn test_short_signal_has_no_lag_range() {
        let signal = vec![1.0, -1.0, 1.0, -1.0];
        assert!(dominant_lag(&signal, 10.0, 0.1, 0.67).is_none());
    }
}
