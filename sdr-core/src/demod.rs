//! The demodulator family: FM, AM, and passthrough.
//!
//! All demodulators consume a complex block plus its source sample rate and
//! emit real audio resampled to a fixed `audio_rate`. They are pure
//! functions of `(block, Fs)` — no state is retained across calls, which
//! trades transient block-boundary artifacts for testability (see
//! `spec.md §4.3` and the Open Questions in `SPEC_FULL.md`).

use crate::dsp::{fm_deemphasis, resample, simple_agc};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Demodulation mode for a primary or multi-channel receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemodMode {
    Fm,
    Am,
    Passthrough,
}

impl fmt::Display for DemodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DemodMode::Fm => "FM",
            DemodMode::Am => "AM",
            DemodMode::Passthrough => "Passthrough",
        };
        f.write_str(s)
    }
}

impl DemodMode {
    /// Parse a mode name the way `DemodulatorFactory.get` does in the
    /// original implementation: anything not recognized falls back to
    /// passthrough rather than erroring.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "FM" => DemodMode::Fm,
            "AM" => DemodMode::Am,
            _ => DemodMode::Passthrough,
        }
    }
}

/// A demodulator: a pure function from `(block, source sample rate)` to real
/// audio at a fixed `audio_rate`.
pub trait Demodulator: fmt::Debug {
    /// Demodulate one block. Empty input returns empty output.
    fn demod(&self, samples: &[Complex32], sample_rate: f64) -> Vec<f32>;

    /// The mode this demodulator implements.
    fn mode(&self) -> DemodMode;
}

/// Build a boxed demodulator instance for `mode` at the given `audio_rate`.
#[must_use]
pub fn make_demodulator(mode: DemodMode, audio_rate: f64) -> Box<dyn Demodulator + Send + Sync> {
    match mode {
        DemodMode::Fm => Box::new(FmDemodulator { audio_rate }),
        DemodMode::Am => Box::new(AmDemodulator { audio_rate }),
        DemodMode::Passthrough => Box::new(PassthroughDemodulator { audio_rate }),
    }
}

/// Unwrap a sequence of wrapped phase angles (radians) the way
/// `numpy.unwrap` does: each step is adjusted by the nearest multiple of
/// 2*pi so consecutive samples never jump by more than pi.
fn unwrap_phase(angles: &[f32]) -> Vec<f32> {
    if angles.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(angles.len());
    out.push(angles[0]);
    let mut offset = 0.0f32;
    for i in 1..angles.len() {
        let mut delta = angles[i] - angles[i - 1];
        while delta > std::f32::consts::PI {
            delta -= 2.0 * std::f32::consts::PI;
            offset -= 2.0 * std::f32::consts::PI;
        }
        while delta < -std::f32::consts::PI {
            delta += 2.0 * std::f32::consts::PI;
            offset += 2.0 * std::f32::consts::PI;
        }
        out.push(angles[i] + offset);
    }
    out
}

/// FM demodulator: quadrature (phase-difference) demod, DC removal, FM
/// de-emphasis, resample, AGC.
#[derive(Debug, Clone, Copy)]
pub struct FmDemodulator {
    pub audio_rate: f64,
}

impl Demodulator for FmDemodulator {
    fn demod(&self, samples: &[Complex32], sample_rate: f64) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }
        let angles: Vec<f32> = samples.iter().map(|s| s.im.atan2(s.re)).collect();
        let phase = unwrap_phase(&angles);
        if phase.len() < 2 {
            return Vec::new();
        }
        let mut inst_freq: Vec<f32> = phase
            .windows(2)
            .map(|w| (w[1] - w[0]) * sample_rate as f32 / (2.0 * std::f32::consts::PI))
            .collect();
        let mean: f32 = inst_freq.iter().sum::<f32>() / inst_freq.len() as f32;
        for v in &mut inst_freq {
            *v -= mean;
        }
        let deemph = fm_deemphasis(&inst_freq, sample_rate);
        let audio = resample(&deemph, sample_rate, self.audio_rate);
        simple_agc(&audio)
    }

    fn mode(&self) -> DemodMode {
        DemodMode::Fm
    }
}

/// AM demodulator: envelope detection, DC removal, resample, AGC.
#[derive(Debug, Clone, Copy)]
pub struct AmDemodulator {
    pub audio_rate: f64,
}

impl Demodulator for AmDemodulator {
    fn demod(&self, samples: &[Complex32], sample_rate: f64) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }
        let envelope: Vec<f32> = samples.iter().map(Complex32::norm).collect();
        let mean: f32 = envelope.iter().sum::<f32>() / envelope.len() as f32;
        let centered: Vec<f32> = envelope.iter().map(|v| v - mean).collect();
        let audio = resample(&centered, sample_rate, self.audio_rate);
        simple_agc(&audio)
    }

    fn mode(&self) -> DemodMode {
        DemodMode::Am
    }
}

/// Passthrough demodulator: resample the real component directly.
#[derive(Debug, Clone, Copy)]
pub struct PassthroughDemodulator {
    pub audio_rate: f64,
}

impl Demodulator for PassthroughDemodulator {
    fn demod(&self, samples: &[Complex32], sample_rate: f64) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }
        let re: Vec<f32> = samples.iter().map(|s| s.re).collect();
        resample(&re, sample_rate, self.audio_rate)
    }

    fn mode(&self) -> DemodMode {
        DemodMode::Passthrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(freq_hz: f64, sample_rate: f64, n: usize) -> Vec<Complex32> {
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate;
                let phase = 2.0 * PI * freq_hz * t;
                #[allow(clippy::cast_possible_truncation, reason = "test fixture")]
                Complex32::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect()
    }

    #[test]
    fn fm_of_empty_is_empty() {
        let demod = FmDemodulator { audio_rate: 16_000.0 };
        assert!(demod.demod(&[], 250_000.0).is_empty());
    }

    #[test]
    fn am_of_empty_is_empty() {
        let demod = AmDemodulator { audio_rate: 16_000.0 };
        assert!(demod.demod(&[], 250_000.0).is_empty());
    }

    #[test]
    fn passthrough_of_empty_is_empty() {
        let demod = PassthroughDemodulator { audio_rate: 16_000.0 };
        assert!(demod.demod(&[], 250_000.0).is_empty());
    }

    #[test]
    fn fm_tone_has_near_zero_mean_audio() {
        let sample_rate = 250_000.0;
        let samples = tone(5_000.0, sample_rate, 4096);
        let demod = FmDemodulator { audio_rate: 16_000.0 };
        let audio = demod.demod(&samples, sample_rate);
        assert!(!audio.is_empty());
        let mean: f32 = audio.iter().sum::<f32>() / audio.len() as f32;
        assert!(mean.abs() < 0.05, "mean was {mean}");
    }

    #[test]
    fn fm_instantaneous_frequency_averages_tone_frequency() {
        let sample_rate = 250_000.0;
        let freq = 5_000.0;
        let samples = tone(freq, sample_rate, 4096);
        let angles: Vec<f32> = samples.iter().map(|s| s.im.atan2(s.re)).collect();
        let phase = unwrap_phase(&angles);
        let inst_freq: Vec<f32> = phase
            .windows(2)
            .map(|w| (w[1] - w[0]) * sample_rate as f32 / (2.0 * std::f32::consts::PI))
            .collect();
        let mean: f32 = inst_freq.iter().sum::<f32>() / inst_freq.len() as f32;
        assert!((mean - freq as f32).abs() < 1.0, "mean inst freq was {mean}");
    }

    #[test]
    fn am_envelope_of_constant_amplitude_tone_has_near_zero_output_mean() {
        let sample_rate = 250_000.0;
        let samples = tone(1_000.0, sample_rate, 2048);
        let demod = AmDemodulator { audio_rate: 16_000.0 };
        let audio = demod.demod(&samples, sample_rate);
        let mean: f32 = audio.iter().sum::<f32>() / audio.len() as f32;
        assert!(mean.abs() < 0.05);
    }

    #[test]
    fn demod_mode_parse_unknown_falls_back_to_passthrough() {
        assert_eq!(DemodMode::parse("fm"), DemodMode::Fm);
        assert_eq!(DemodMode::parse("AM"), DemodMode::Am);
        assert_eq!(DemodMode::parse("usb"), DemodMode::Passthrough);
    }
}
