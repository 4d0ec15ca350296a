//! Digital-mixing multi-channel demodulator: runs several narrow-band
//! demodulators over one wideband block. Grounded in `core/multi_demod.py`'s
//! `MultiChannelDemod`.

use crate::demod::{make_demodulator, DemodMode, Demodulator};
use crate::dsp::rms;
use num_complex::Complex32;
use std::f64::consts::PI;

/// Static configuration for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub freq_hz: f64,
    pub mode: DemodMode,
    pub squelch_linear: f64,
    pub enabled: bool,
    /// Human-readable tag (e.g. a station or talkgroup name); may be empty.
    pub label: String,
}

/// One channel's demodulator plus its last observation, retained across
/// `process` calls for inspection (e.g. a UI channel list) even though the
/// demodulator itself is stateless per block.
pub struct ChannelState {
    pub config: ChannelConfig,
    demod: Box<dyn Demodulator + Send + Sync>,
    pub audio_rms: f32,
    pub last_audio: Option<Vec<f32>>,
    pub last_power_db: f64,
}

impl std::fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelState")
            .field("config", &self.config)
            .field("audio_rms", &self.audio_rms)
            .field("last_power_db", &self.last_power_db)
            .finish()
    }
}

/// Result of demodulating one channel for one block, returned only for
/// channels that passed squelch and produced non-empty audio.
#[derive(Debug, Clone)]
pub struct ChannelResult {
    pub freq_hz: f64,
    pub mode: DemodMode,
    pub audio: Vec<f32>,
    pub audio_rms: f32,
    pub power_db: f64,
}

/// Holds a set of channels and mixes/demodulates each out of a shared
/// wideband IQ block.
#[derive(Debug)]
pub struct MultiChannelDemod {
    sample_rate: f64,
    channels: Vec<ChannelState>,
}

impl MultiChannelDemod {
    #[must_use]
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate, channels: Vec::new() }
    }

    pub fn add_channel(&mut self, cfg: ChannelConfig) {
        let demod = make_demodulator(cfg.mode, 16_000.0);
        self.channels.push(ChannelState {
            config: cfg,
            demod,
            audio_rms: 0.0,
            last_audio: None,
            last_power_db: -120.0,
        });
    }

    pub fn remove_channel(&mut self, freq_hz: f64) {
        self.channels.retain(|c| (c.config.freq_hz - freq_hz).abs() > f64::EPSILON);
    }

    pub fn set_channels(&mut self, configs: &[ChannelConfig]) {
        self.channels.clear();
        for cfg in configs {
            self.add_channel(cfg.clone());
        }
    }

    #[must_use]
    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    /// Mix every enabled channel to baseband around `center_freq_hz`,
    /// measure power, gate by squelch, and demodulate channels that pass.
    /// The local oscillator's phase resets to zero at the start of each
    /// block — no cross-block phase continuity is required.
    pub fn process(&mut self, center_freq_hz: f64, samples: &[Complex32]) -> Vec<ChannelResult> {
        if samples.is_empty() || self.channels.is_empty() {
            return Vec::new();
        }
        let mut results = Vec::new();
        for ch in &mut self.channels {
            if !ch.config.enabled {
                continue;
            }
            let offset = ch.config.freq_hz - center_freq_hz;
            let baseband: Vec<Complex32> = samples
                .iter()
                .enumerate()
                .map(|(n, s)| {
                    let t = n as f64 / self.sample_rate;
                    let arg = -2.0 * PI * offset * t;
                    #[allow(clippy::cast_possible_truncation, reason = "LO magnitude fits f32")]
                    let lo = Complex32::new(arg.cos() as f32, arg.sin() as f32);
                    s * lo
                })
                .collect();

            let power_linear = rms(&baseband);
            let power_db = 20.0 * (f64::from(power_linear) + 1e-6).log10();
            ch.last_power_db = power_db;

            if f64::from(power_linear) < ch.config.squelch_linear {
                ch.last_audio = None;
                ch.audio_rms = 0.0;
                continue;
            }

            let audio = ch.demod.demod(&baseband, self.sample_rate);
            if audio.is_empty() {
                continue;
            }
            let audio_rms = rms_real(&audio);
            ch.last_audio = Some(audio.clone());
            ch.audio_rms = audio_rms;
            results.push(ChannelResult {
                freq_hz: ch.config.freq_hz,
                mode: ch.config.mode,
                audio,
                audio_rms,
                power_db,
            });
        }
        results
    }
}

fn rms_real(audio: &[f32]) -> f32 {
    if audio.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = audio.iter().map(|x| x * x).sum();
    (sum_sq / audio.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI as PI64;

    fn two_tone_block(sample_rate: f64, n: usize) -> Vec<Complex32> {
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate;
                let a = 2.0 * PI64 * 12_000.0 * t;
                let b = 2.0 * PI64 * 30_000.0 * t;
                #[allow(clippy::cast_possible_truncation, reason = "test fixture")]
                let sample = 0.2 * (Complex32::new(a.cos() as f32, a.sin() as f32))
                    + 0.2 * (Complex32::new(b.cos() as f32, b.sin() as f32));
                sample
            })
            .collect()
    }

    #[test]
    fn process_of_empty_block_is_empty() {
        let mut mcd = MultiChannelDemod::new(256_000.0);
        mcd.add_channel(ChannelConfig {
            freq_hz: 12_000.0,
            mode: DemodMode::Fm,
            squelch_linear: 0.001,
            enabled: true,
            label: String::new(),
        });
        assert!(mcd.process(0.0, &[]).is_empty());
    }

    #[test]
    fn process_with_no_channels_is_empty() {
        let mut mcd = MultiChannelDemod::new(256_000.0);
        let block = two_tone_block(256_000.0, 1024);
        assert!(mcd.process(0.0, &block).is_empty());
    }

    #[test]
    fn two_channels_above_squelch_both_produce_audio() {
        let sample_rate = 256_000.0;
        let mut mcd = MultiChannelDemod::new(sample_rate);
        let squelch = 10f64.powf(-60.0 / 20.0);
        mcd.add_channel(ChannelConfig { freq_hz: 12_000.0, mode: DemodMode::Am, squelch_linear: squelch, enabled: true, label: String::new() });
        mcd.add_channel(ChannelConfig { freq_hz: 30_000.0, mode: DemodMode::Am, squelch_linear: squelch, enabled: true, label: String::new() });

        let block = two_tone_block(sample_rate, 4096);
        let results = mcd.process(0.0, &block);
        assert_eq!(results.len(), 2);
        for r in &results {
            assert!(!r.audio.is_empty());
        }
    }

    #[test]
    fn disabled_channel_is_skipped() {
        let sample_rate = 256_000.0;
        let mut mcd = MultiChannelDemod::new(sample_rate);
        mcd.add_channel(ChannelConfig { freq_hz: 12_000.0, mode: DemodMode::Am, squelch_linear: 0.0001, enabled: false, label: String::new() });
        let block = two_tone_block(sample_rate, 4096);
        assert!(mcd.process(0.0, &block).is_empty());
    }

    #[test]
    fn remove_channel_drops_it_from_future_processing() {
        let mut mcd = MultiChannelDemod::new(256_000.0);
        mcd.add_channel(ChannelConfig { freq_hz: 12_000.0, mode: DemodMode::Am, squelch_linear: 0.0001, enabled: true, label: String::new() });
        mcd.remove_channel(12_000.0);
        assert!(mcd.channels().is_empty());
    }
}
