//! DSP primitives shared by the demodulator family: power, resampling, a
//! single-pole IIR low-pass, FM de-emphasis, and a one-shot AGC.
//!
//! These are intentionally lightweight but functional for the prototype —
//! not anti-aliased, not reference-quality DSP. See `spec.md §4.2`.

use num_complex::Complex32;

/// Target RMS for [`simple_agc`].
const AGC_TARGET_RMS: f32 = 0.1;
/// Epsilon added to the denominator in [`simple_agc`] to avoid divide-by-zero.
const AGC_EPSILON: f32 = 1e-6;
/// FM de-emphasis time constant (75 microseconds, US/EU broadcast convention).
const DEEMPHASIS_TAU_SECONDS: f32 = 75e-6;

/// RMS magnitude of a complex block. Zero on empty input.
#[must_use]
pub fn rms(samples: &[Complex32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(Complex32::norm_sqr).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Linear interpolation resample of a real-valued signal from `src_rate` to
/// `tgt_rate`. Not anti-aliased. Output length is `ceil(N * tgt/src)`.
#[must_use]
pub fn resample(signal: &[f32], src_rate: f64, tgt_rate: f64) -> Vec<f32> {
    if signal.is_empty() || (src_rate - tgt_rate).abs() < f64::EPSILON {
        return signal.to_vec();
    }
    let ratio = tgt_rate / src_rate;
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, reason = "length is always >= 0")]
    let new_len = (signal.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(new_len);
    let n = signal.len();
    for i in 0..new_len {
        // Position in the source signal's index space, spanning [0, n).
        let src_pos = if new_len <= 1 {
            0.0
        } else {
            i as f64 * (n as f64) / (new_len as f64)
        };
        let lo = src_pos.floor() as usize;
        let frac = (src_pos - lo as f64) as f32;
        let lo = lo.min(n - 1);
        let hi = (lo + 1).min(n - 1);
        out.push(signal[lo] * (1.0 - frac) + signal[hi] * frac);
    }
    out
}

/// Single-pole IIR low-pass: `y[n] = alpha*y[n-1] + (1-alpha)*x[n]`,
/// `y[-1] = 0`.
#[must_use]
pub fn single_pole_iir(signal: &[f32], alpha: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(signal.len());
    let mut acc = 0.0f32;
    for &x in signal {
        acc = alpha * acc + (1.0 - alpha) * x;
        out.push(acc);
    }
    out
}

/// FM de-emphasis: a single-pole IIR with `alpha = exp(-1/(Fs*tau))`,
/// `tau = 75us`.
#[must_use]
pub fn fm_deemphasis(audio: &[f32], sample_rate: f64) -> Vec<f32> {
    if audio.is_empty() {
        return Vec::new();
    }
    #[allow(clippy::cast_possible_truncation, reason = "alpha stays in [0,1]")]
    let alpha = (-1.0 / (sample_rate as f32 * DEEMPHASIS_TAU_SECONDS)).exp();
    single_pole_iir(audio, alpha)
}

/// Scale `audio` so its RMS is `AGC_TARGET_RMS`.
#[must_use]
pub fn simple_agc(audio: &[f32]) -> Vec<f32> {
    if audio.is_empty() {
        return Vec::new();
    }
    let sum_sq: f32 = audio.iter().map(|x| x * x).sum();
    let rms = (sum_sq / audio.len() as f32).sqrt() + AGC_EPSILON;
    let gain = AGC_TARGET_RMS / rms;
    audio.iter().map(|x| x * gain).collect()
}

/// Linear squelch threshold from a dBFS value: `10^(db/20)`. Monotonically
/// increasing in `db`.
#[must_use]
pub fn squelch_linear(squelch_db: f64) -> f64 {
    10f64.powf(squelch_db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_empty_is_zero() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rms_is_nonnegative() {
        let samples = [Complex32::new(0.3, -0.4), Complex32::new(-1.0, 2.0)];
        assert!(rms(&samples) >= 0.0);
    }

    #[test]
    fn rms_of_unit_vectors() {
        let samples = vec![Complex32::new(1.0, 0.0); 8];
        assert!((rms(&samples) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn resample_length_matches_ceil_ratio() {
        let signal = vec![0.0f32; 1000];
        let out = resample(&signal, 250_000.0, 16_000.0);
        let expected = (1000.0 * 16_000.0 / 250_000.0).ceil() as usize;
        assert_eq!(out.len(), expected);
    }

    #[test]
    fn resample_empty_stays_empty() {
        assert!(resample(&[], 1.0, 2.0).is_empty());
    }

    #[test]
    fn squelch_linear_monotonic() {
        let a = squelch_linear(-80.0);
        let b = squelch_linear(-60.0);
        let c = squelch_linear(-20.0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn single_pole_iir_starts_from_zero() {
        let out = single_pole_iir(&[1.0, 1.0, 1.0], 0.5);
        assert_eq!(out[0], 0.5); // 0.5*0 + 0.5*1
        assert!(out[2] > out[0]); // converges upward toward 1.0
    }

    #[test]
    fn agc_scales_toward_target_rms() {
        let audio = vec![2.0f32; 100];
        let out = simple_agc(&audio);
        let sum_sq: f32 = out.iter().map(|x| x * x).sum();
        let rms = (sum_sq / out.len() as f32).sqrt();
        assert!((rms - AGC_TARGET_RMS).abs() < 1e-3);
    }

    #[test]
    fn agc_of_empty_is_empty() {
        assert!(simple_agc(&[]).is_empty());
    }
}
