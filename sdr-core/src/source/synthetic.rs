//! Synthetic IQ source: deterministic complex-Gaussian noise plus a gated
//! tone, for UI demos and smoke tests without hardware. See `spec.md §4.1`.

use super::IqSource;
use crate::error::SdrResult;
use num_complex::Complex32;
use std::collections::HashMap;
use std::f32::consts::PI;

/// RMS amplitude of the baseband noise floor.
const NOISE_AMPLITUDE: f32 = 0.08;
/// Tone frequency offset from center, in Hz.
const TONE_FREQ_HZ: f64 = 25_000.0;
/// Period of the tone gate, in nominal seconds.
const BURST_PERIOD_S: f64 = 10.0;
/// How long within each period the tone is on, in nominal seconds.
const BURST_ON_S: f64 = 3.0;

/// A small deterministic PRNG (splitmix64) feeding a Box-Muller transform.
///
/// The original Python reference used `numpy.random.randn`, which is not
/// reproducible across runs without an explicit seed; this generator is
/// seeded once per source instance so repeated test runs see identical
/// noise (`spec.md` design note: "Synthetic source ... must produce
/// identical outputs for identical inputs").
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform float in `(0, 1]`, avoiding exact zero so `ln` stays finite.
    fn next_f32(&mut self) -> f32 {
        let bits = self.next_u64() >> 11; // 53 bits of entropy
        #[allow(clippy::cast_precision_loss, reason = "53-bit mantissa fits f64 exactly")]
        let unit = (bits as f64 + 1.0) / ((1u64 << 53) as f64 + 1.0);
        unit as f32
    }

    /// Standard-normal sample via the Box-Muller transform.
    fn next_gaussian(&mut self) -> f32 {
        let u1 = self.next_f32();
        let u2 = self.next_f32();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

/// Deterministic synthetic IQ source: noise + a periodically gated tone.
#[derive(Debug)]
pub struct SyntheticSource {
    sample_rate: f64,
    center_freq: f64,
    sample_index: u64,
    rng: SplitMix64Debug,
}

/// Newtype so [`SyntheticSource`] can derive `Debug` without exposing RNG
/// internals as a public field.
struct SplitMix64Debug(SplitMix64);

impl std::fmt::Debug for SplitMix64Debug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SplitMix64Debug(..)")
    }
}

impl SyntheticSource {
    /// Create a new synthetic source with a fixed seed, so repeated runs
    /// produce identical sample streams.
    #[must_use]
    pub fn new(sample_rate: f64, center_freq: f64) -> Self {
        Self {
            sample_rate,
            center_freq,
            sample_index: 0,
            rng: SplitMix64Debug(SplitMix64::new(0xC0FF_EE00_1234_5678)),
        }
    }
}

impl IqSource for SyntheticSource {
    fn read_samples(&mut self, n: usize) -> SdrResult<Vec<Complex32>> {
        let sr = self.sample_rate;
        let n0 = self.sample_index;

        let phase = (n0 as f64 / sr) % BURST_PERIOD_S;
        let tone_on = phase < BURST_ON_S;

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let noise_i = self.rng.0.next_gaussian() * NOISE_AMPLITUDE;
            let noise_q = self.rng.0.next_gaussian() * NOISE_AMPLITUDE;
            let sample = if tone_on {
                let t = (n0 + i as u64) as f64 / sr;
                let arg = 2.0 * std::f64::consts::PI * TONE_FREQ_HZ * t;
                #[allow(clippy::cast_possible_truncation, reason = "audio-rate magnitudes fit f32")]
                Complex32::new(noise_i + arg.cos() as f32, noise_q + arg.sin() as f32)
            } else {
                Complex32::new(noise_i, noise_q)
            };
            out.push(sample);
        }
        self.sample_index += n as u64;
        Ok(out)
    }

    fn tune(&mut self, freq_hz: f64) -> SdrResult<()> {
        self.center_freq = freq_hz;
        Ok(())
    }

    fn close(&mut self) {}

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn info(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("name".to_string(), "Synthetic Source".to_string());
        m.insert("sample_rate".to_string(), self.sample_rate.to_string());
        m.insert("center_freq".to_string(), self.center_freq.to_string());
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_samples_never_exceeds_requested_length() {
        let mut src = SyntheticSource::new(250_000.0, 100e6);
        let block = src.read_samples(4096).unwrap();
        assert_eq!(block.len(), 4096);
    }

    #[test]
    fn tone_is_active_in_first_three_seconds_of_each_ten() {
        let sr = 250_000.0;
        let mut src = SyntheticSource::new(sr, 100e6);
        let block = src.read_samples((sr * 1.0) as usize).unwrap();
        let power: f32 = block.iter().map(num_complex::Complex32::norm_sqr).sum::<f32>() / block.len() as f32;
        // With the tone on, mean power is dominated by the unit-amplitude
        // tone rather than the 0.08-amplitude noise floor.
        assert!(power > 0.2, "power was {power}");
    }

    #[test]
    fn tone_is_silent_after_three_seconds() {
        let sr = 250_000.0;
        let mut src = SyntheticSource::new(sr, 100e6);
        // Burn through the first 3.5s so we land in the quiet part of the period.
        let _ = src.read_samples((sr * 3.5) as usize).unwrap();
        let block = src.read_samples((sr * 0.5) as usize).unwrap();
        let power: f32 = block.iter().map(num_complex::Complex32::norm_sqr).sum::<f32>() / block.len() as f32;
        assert!(power < 0.05, "power was {power}");
    }

    #[test]
    fn close_is_a_no_op() {
        let mut src = SyntheticSource::new(250_000.0, 100e6);
        src.close();
        src.close();
    }

    #[test]
    fn ordering_is_strictly_sequential_across_reads() {
        let mut src = SyntheticSource::new(250_000.0, 100e6);
        let a = src.read_samples(16).unwrap();
        let b = src.read_samples(16).unwrap();
        // Different nominal-time offsets should (almost certainly) differ.
        assert_ne!(a, b);
    }
}
