// Spectrum module - power spectrum of a detrended breathing signal
//
// The analysis window is short (a few breathing cycles), so it is Hann
// windowed and zero-padded to a long power-of-two FFT. Padding does not add
// resolution but gives enough bins for parabolic peak refinement to land
// well inside one breath per minute.

use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::{Arc, Mutex};

/// Default FFT length floor for rate estimation
pub const DEFAULT_FFT_MIN_SIZE: usize = 4096;

/// One-sided power spectrum with its frequency axis
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    /// Power per bin, `fft_size / 2 + 1` entries (DC through Nyquist)
    pub power: Vec<f64>,
    pub fft_size: usize,
    /// Number of real (unpadded) points in the analyzed signal
    pub signal_len: usize,
    pub sample_rate_hz: f64,
}

/// Dominant in-band peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Integer bin holding the maximum
    pub bin: usize,
    /// Parabolically refined frequency in Hz
    pub hz: f64,
    /// Parabolically refined peak power
    pub power: f64,
    /// Peak sits on a band edge while the spectrum keeps rising outside the band
    pub at_band_edge: bool,
}

impl PowerSpectrum {
    pub fn bin_hz(&self) -> f64 {
        self.sample_rate_hz / self.fft_size as f64
    }

    pub fn nyquist_bin(&self) -> usize {
        self.fft_size / 2
    }

    /// Half-width in bins of the Hann main lobe at this padding factor
    pub fn main_lobe_bins(&self) -> usize {
        let padding = self.fft_size as f64 / self.signal_len.max(1) as f64;
        (2.0 * padding).ceil() as usize + 1
    }

    /// Inclusive bin range covering `[lo_hz, hi_hz]`, clipped to `1..nyquist`
    pub fn band_bins(&self, lo_hz: f64, hi_hz: f64) -> Option<(usize, usize)> {
        let bin_hz = self.bin_hz();
        let lo = ((lo_hz / bin_hz).ceil() as usize).max(1);
        let hi = ((hi_hz / bin_hz).floor() as usize).min(self.nyquist_bin().saturating_sub(1));
        (lo <= hi).then_some((lo, hi))
    }

    /// Strongest bin inside `[lo_hz, hi_hz]`, refined by parabolic interpolation
    pub fn band_peak(&self, lo_hz: f64, hi_hz: f64) -> Option<SpectralPeak> {
        let (lo, hi) = self.band_bins(lo_hz, hi_hz)?;

        let mut bin = lo;
        for k in lo..=hi {
            if self.power[k] > self.power[bin] {
                bin = k;
            }
        }

        let at_band_edge = (bin == lo && self.power[lo - 1] > self.power[lo])
            || (bin == hi && self.power[hi + 1] > self.power[hi]);

        let (offset, power) = parabolic_peak(
            self.power[bin - 1],
            self.power[bin],
            self.power[bin + 1],
        );

        Some(SpectralPeak {
            bin,
            hz: (bin as f64 + offset) * self.bin_hz(),
            power,
            at_band_edge,
        })
    }

    /// Strongest bin within one resolution cell of `hz`
    pub fn lobe_power(&self, hz: f64) -> (usize, f64) {
        let center = ((hz / self.bin_hz()).round() as usize).min(self.nyquist_bin());
        let reach = self.fft_size.div_ceil(self.signal_len.max(1)).max(1);
        let lo = center.saturating_sub(reach);
        let hi = (center + reach).min(self.nyquist_bin());
        (lo..=hi)
            .map(|k| (k, self.power[k]))
            .fold((center, 0.0), |best, next| if next.1 > best.1 { next } else { best })
    }

    /// Mean power over `(0, Nyquist]` excluding the main lobe around `peak_bin`
    pub fn noise_floor(&self, peak_bin: usize) -> f64 {
        let half = self.main_lobe_bins();
        let (sum, count) = (1..=self.nyquist_bin())
            .filter(|&k| k.abs_diff(peak_bin) > half)
            .fold((0.0, 0usize), |(sum, count), k| (sum + self.power[k], count + 1));

        if count == 0 {
            return 0.0;
        }
        sum / count as f64
    }

    /// Strongest bin in `[lo_hz, hi_hz]` outside the main lobe around `peak_bin`
    pub fn strongest_outside_lobe(&self, peak_bin: usize, lo_hz: f64, hi_hz: f64) -> Option<f64> {
        let bin_hz = self.bin_hz();
        let lo = ((lo_hz / bin_hz).floor() as usize).max(1);
        let hi = ((hi_hz / bin_hz).ceil() as usize).min(self.nyquist_bin());
        let half = self.main_lobe_bins();
        (lo..=hi)
            .filter(|&k| k.abs_diff(peak_bin) > half)
            .map(|k| self.power[k])
            .reduce(f64::max)
    }
}

/// Vertex offset (in bins, clamped to +-0.5) and height of the parabola
/// through three equally spaced points
pub fn parabolic_peak(left: f64, center: f64, right: f64) -> (f64, f64) {
    let denom = left - 2.0 * center + right;
    if denom == 0.0 || !denom.is_finite() {
        return (0.0, center);
    }
    let offset = (0.5 * (left - right) / denom).clamp(-0.5, 0.5);
    (offset, center - 0.25 * (left - right) * offset)
}

/// FFT processor that computes power spectra of Hann-windowed signals
pub struct FftProcessor {
    fft_planner: Arc<Mutex<FftPlanner<f64>>>,
    min_fft_size: usize,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// # Arguments
    /// * `min_fft_size` - FFT length floor; rounded up to a power of two
    pub fn new(min_fft_size: usize) -> Self {
        Self {
            fft_planner: Arc::new(Mutex::new(FftPlanner::new())),
            min_fft_size: min_fft_size.max(2).next_power_of_two(),
        }
    }

    /// FFT length used for a signal of `signal_len` points
    pub fn fft_size_for(&self, signal_len: usize) -> usize {
        self.min_fft_size.max(signal_len.next_power_of_two())
    }

    /// Compute the one-sided power spectrum of `signal` sampled at `sample_rate_hz`
    ///
    /// Applies a Hann window over the signal, zero-pads, and returns
    /// `|X[k]|^2` for the positive frequencies only.
    pub fn power_spectrum(&self, signal: &[f64], sample_rate_hz: f64) -> PowerSpectrum {
        let n = signal.len();
        let fft_size = self.fft_size_for(n);

        let mut buffer: Vec<Complex<f64>> = Vec::with_capacity(fft_size);
        let denom = (n.max(2) - 1) as f64;
        for (i, &x) in signal.iter().enumerate() {
            let w = 0.5 * (1.0 - ((2.0 * std::f64::consts::PI * i as f64) / denom).cos());
            buffer.push(Complex::new(x * w, 0.0));
        }
        buffer.resize(fft_size, Complex::new(0.0, 0.0));

        let fft = {
            let mut planner = self
                .fft_planner
                .lock()
                .unwrap_or_else(|err| err.into_inner());
            planner.plan_fft_forward(fft_size)
        };
        fft.process(&mut buffer);

        PowerSpectrum {
            power: buffer[..fft_size / 2 + 1]
                .iter()
                .map(|c| c.norm_sqr())
                .collect(),
            fft_size,
            signal_len: n,
            sample_rate_hz,
        }
    }
}

impl Default for FftProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_MIN_SIZE)
    }
}
