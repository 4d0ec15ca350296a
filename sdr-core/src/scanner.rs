//! The Scanner: the central run loop that ties together a source, the
//! demodulator family, squelch gating, event logging, and bundle writing.
//! Grounded closely in `core/scanner.py`'s `ScannerThread`.
//!
//! One deliberate deviation from the original: the Python constructor fires
//! a `now_playing` signal immediately at construction time, before any
//! frequency has gone ACTIVE. That violates the "at most one `now_playing`
//! per ACTIVE entry" invariant (`spec.md §8`) and is not reproduced here —
//! `now_playing` is only ever emitted on the IDLE→ACTIVE transition.

use crate::bundle;
use crate::demod::{make_demodulator, DemodMode, Demodulator};
use crate::dsp::{rms, squelch_linear};
use crate::event_logger::{Event, EventLogger};
use crate::multichannel::{ChannelConfig, MultiChannelDemod};
use crate::plan::FrequencyPlan;
use crate::source::{create_source, Gain, IqSource, SourceDescriptor, SourceKind};
use crate::transcriber::Transcriber;
use num_complex::Complex32;
use rustfft::FftPlanner;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Samples read per block. Fixed, per `spec.md §4.7`.
const BLOCK_SIZE: usize = 4096;
/// Consecutive below-squelch blocks required to close an ACTIVE event.
const QUIET_THRESHOLD_BLOCKS: u32 = 5;
/// FFT length for the rate-limited spectrum sink.
const SPECTRUM_FFT_SIZE: usize = 512;
/// Hunt-mode dwell ceiling, in seconds.
const HUNT_MODE_MAX_DWELL_SECONDS: f64 = 0.12;

/// Static construction parameters for a [`Scanner`] run.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub plan: FrequencyPlan,
    pub mode: DemodMode,
    pub gain: Option<Gain>,
    pub squelch_db: f64,
    pub scan_mode: bool,
    pub sample_rate_hz: f64,
    pub source_kind: SourceKind,
    pub file_path: Option<PathBuf>,
    pub dwell_seconds: f64,
    pub hold_seconds: f64,
    pub audio_rate: f64,
    pub enable_transcription: bool,
    pub transcription_model: String,
    pub ui_max_fps: f64,
    pub max_event_seconds: f64,
    pub min_event_seconds: f64,
    pub hunt_mode: bool,
    pub multi_channels: Vec<ChannelConfig>,
    pub save_bundles: bool,
    pub bundle_root: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            plan: FrequencyPlan::Range { start_hz: 100e6, stop_hz: 101e6, step_hz: 0.2e6 },
            mode: DemodMode::Fm,
            gain: None,
            squelch_db: -60.0,
            scan_mode: true,
            sample_rate_hz: 2.5e5,
            source_kind: SourceKind::Rtl,
            file_path: None,
            dwell_seconds: 0.25,
            hold_seconds: 0.5,
            audio_rate: 16_000.0,
            enable_transcription: false,
            transcription_model: "base.en".to_string(),
            ui_max_fps: 20.0,
            max_event_seconds: 6.0,
            min_event_seconds: 1.0,
            hunt_mode: false,
            multi_channels: Vec::new(),
            save_bundles: true,
            bundle_root: PathBuf::from("runs"),
        }
    }
}

/// What the `event` sink receives: either a logged event record or a
/// diagnostic string (init failure, transcriber failure, skipped bundle).
#[derive(Debug, Clone)]
pub enum EventSinkPayload {
    Event(Event),
    Diagnostic(String),
}

/// Fire-and-forget callbacks invoked from the run loop. Every invocation is
/// guarded against panics so a faulty sink cannot poison the loop, per
/// `spec.md §5`.
pub struct Sinks {
    pub spectrum: Box<dyn FnMut(&[f64], &[f32]) + Send>,
    pub event: Box<dyn FnMut(EventSinkPayload) + Send>,
    pub audio_level: Box<dyn FnMut(f32) + Send>,
    pub audio_frame: Box<dyn FnMut(&[f32]) + Send>,
    pub device_info: Box<dyn FnMut(&HashMap<String, String>) + Send>,
    pub now_playing: Box<dyn FnMut(f64, DemodMode) + Send>,
}

impl Sinks {
    /// All sinks are no-ops; useful for headless runs or tests.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            spectrum: Box::new(|_, _| {}),
            event: Box::new(|_| {}),
            audio_level: Box::new(|_| {}),
            audio_frame: Box::new(|_| {}),
            device_info: Box::new(|_| {}),
            now_playing: Box::new(|_, _| {}),
        }
    }
}

fn guarded<F: FnOnce()>(label: &str, f: F) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err() {
        log::warn!("sink '{label}' panicked; ignoring (fire-and-forget)");
    }
}

/// The central state machine: tunes the source, gates activity by squelch,
/// assembles events, and writes bundles.
pub struct Scanner {
    config: ScannerConfig,
    squelch_linear: f64,
    primary_demod: Box<dyn Demodulator + Send + Sync>,
    interrupt: Arc<AtomicBool>,
    transcriber_factory:
        Option<Box<dyn Fn(&str) -> crate::error::SdrResult<Box<dyn Transcriber>> + Send>>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("mode", &self.config.mode)
            .field("scan_mode", &self.config.scan_mode)
            .field("squelch_linear", &self.squelch_linear)
            .finish()
    }
}

impl Scanner {
    #[must_use]
    pub fn new(config: ScannerConfig) -> Self {
        let squelch_linear = squelch_linear(config.squelch_db);
        let primary_demod = make_demodulator(config.mode, config.audio_rate);
        Self {
            config,
            squelch_linear,
            primary_demod,
            interrupt: Arc::new(AtomicBool::new(false)),
            transcriber_factory: None,
        }
    }

    /// Supply a factory used to construct a [`Transcriber`] lazily at run
    /// start, if transcription is enabled and the source isn't synthetic.
    #[must_use]
    pub fn with_transcriber_factory(
        mut self,
        factory: Box<dyn Fn(&str) -> crate::error::SdrResult<Box<dyn Transcriber>> + Send>,
    ) -> Self {
        self.transcriber_factory = Some(factory);
        self
    }

    /// Request that the run loop stop at the next opportunity. Response
    /// time is bounded by one block read plus any active sleep.
    pub fn request_interrupt(&self) {
        self.interrupt.store(true, Ordering::Relaxed);
    }

    /// A clonable handle an external caller can use to request interruption
    /// from another thread without borrowing the Scanner itself — the
    /// Scanner is otherwise exclusively owned by its run loop.
    #[must_use]
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Run the scanner to completion (until interrupted or the source is
    /// exhausted). Consumes no ownership of `sinks`/`logger` beyond the
    /// call so the caller can inspect them afterward.
    pub fn run(&mut self, sinks: &mut Sinks, logger: &mut EventLogger) {
        let freq_list = self.config.plan.frequencies();
        let initial_freq = freq_list[0];

        let descriptor = SourceDescriptor {
            kind: self.config.source_kind,
            sample_rate_hz: self.config.sample_rate_hz,
            center_freq_hz: initial_freq,
            gain: self.config.gain,
            file_path: self.config.file_path.clone(),
        };
        let mut source = match create_source(&descriptor) {
            Ok(s) => s,
            Err(e) => {
                guarded("event", || {
                    (sinks.event)(EventSinkPayload::Diagnostic(format!("SDR init failed: {e}")));
                });
                return;
            }
        };

        guarded("device_info", || (sinks.device_info)(&source.info()));

        let mut transcriber: Option<Box<dyn Transcriber>> = None;
        if self.config.enable_transcription && self.config.source_kind != SourceKind::Synthetic {
            if let Some(factory) = self.transcriber_factory.as_ref() {
                match factory(&self.config.transcription_model) {
                    Ok(t) => transcriber = Some(t),
                    Err(e) => {
                        guarded("event", || {
                            (sinks.event)(EventSinkPayload::Diagnostic(format!(
                                "Transcriber init failed: {e}"
                            )));
                        });
                    }
                }
            }
        }

        let mut multi_demod = if self.config.multi_channels.is_empty() {
            None
        } else {
            let mut md = MultiChannelDemod::new(self.config.sample_rate_hz);
            md.set_channels(&self.config.multi_channels);
            Some(md)
        };

        let mut current_index = 0usize;
        let num_freqs = freq_list.len();
        let mut dwell_seconds = self.config.dwell_seconds;

        let mut active = false;
        let mut recording_freq = freq_list[0];
        let mut audio_buffer: Vec<Vec<f32>> = Vec::new();
        let mut iq_buffer: Vec<Vec<Complex32>> = Vec::new();
        let mut quiet_count: u32 = 0;
        let mut active_started_at: Option<Instant> = None;

        let ui_period = Duration::from_secs_f64(1.0 / self.config.ui_max_fps.max(1.0));
        let mut last_ui_update = Instant::now() - ui_period;

        let mut fft_planner = FftPlanner::<f32>::new();
        let fft = fft_planner.plan_fft_forward(SPECTRUM_FFT_SIZE);

        while !self.is_interrupted() {
            let freq = freq_list[current_index];
            if self.config.scan_mode && !active {
                if let Err(e) = source.tune(freq) {
                    log::warn!("tune to {freq} Hz failed: {e}");
                }
                std::thread::sleep(Duration::from_secs_f64(dwell_seconds));
            }

            let samples = match source.read_samples(BLOCK_SIZE) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("read_samples failed: {e}");
                    Vec::new()
                }
            };
            if samples.is_empty() {
                break;
            }

            if self.config.hunt_mode && !active && self.config.scan_mode {
                dwell_seconds = dwell_seconds.min(HUNT_MODE_MAX_DWELL_SECONDS);
            }

            let now = Instant::now();
            if now.duration_since(last_ui_update) >= ui_period {
                let (axis_mhz, power_db) = compute_spectrum(fft.as_ref(), &samples, source.sample_rate(), freq);
                guarded("spectrum", || (sinks.spectrum)(&axis_mhz, &power_db));
                last_ui_update = now;
            }

            let power_linear = rms(&samples);
            let power_db = 20.0 * (f64::from(power_linear) + 1e-6).log10();

            if let Some(md) = multi_demod.as_mut() {
                for result in md.process(freq, &samples) {
                    let audio = result.audio.clone();
                    guarded("audio_frame", || (sinks.audio_frame)(&audio));
                    guarded("audio_level", || (sinks.audio_level)(result.audio_rms));
                }
            }

            if !active && f64::from(power_linear) > self.squelch_linear {
                active = true;
                recording_freq = freq;
                audio_buffer.clear();
                iq_buffer.clear();
                quiet_count = 0;
                active_started_at = Some(Instant::now());
                let mode = self.config.mode;
                guarded("now_playing", || (sinks.now_playing)(recording_freq, mode));
            }

            if active && (freq - recording_freq).abs() < f64::EPSILON {
                iq_buffer.push(samples.clone());
                let audio_chunk = self.primary_demod.demod(&samples, source.sample_rate());
                if !audio_chunk.is_empty() {
                    let chunk_rms = {
                        let sum_sq: f32 = audio_chunk.iter().map(|x| x * x).sum();
                        (sum_sq / audio_chunk.len() as f32).sqrt()
                    };
                    audio_buffer.push(audio_chunk.clone());
                    guarded("audio_level", || (sinks.audio_level)(chunk_rms));
                    guarded("audio_frame", || (sinks.audio_frame)(&audio_chunk));
                }

                if f64::from(power_linear) < self.squelch_linear {
                    quiet_count += 1;
                } else {
                    quiet_count = 0;
                }

                let elapsed = active_started_at.map_or(0.0, |t| t.elapsed().as_secs_f64());
                let too_long = elapsed >= self.config.max_event_seconds;

                if quiet_count >= QUIET_THRESHOLD_BLOCKS || too_long {
                    active = false;
                    quiet_count = 0;

                    let audio_data: Vec<f32> = audio_buffer.drain(..).flatten().collect();
                    let iq_data: Vec<Complex32> = iq_buffer.drain(..).flatten().collect();
                    let event_elapsed = active_started_at.map_or(0.0, |t| t.elapsed().as_secs_f64());

                    let mut text = String::new();
                    if !audio_data.is_empty() {
                        if let Some(t) = transcriber.as_ref() {
                            match t.transcribe(&audio_data, self.config.audio_rate) {
                                Ok(s) => text = s,
                                Err(_) => text = "[Transcription Error]".to_string(),
                            }
                        }
                    }

                    let mut metadata = Map::new();
                    metadata.insert("power_db".to_string(), json!(power_db));
                    metadata.insert("duration_s".to_string(), json!(event_elapsed));
                    let event = logger.log_event(recording_freq, Some(&text), metadata);

                    guarded("event", || (sinks.event)(EventSinkPayload::Event(event.clone())));

                    if self.config.save_bundles && event_elapsed >= self.config.min_event_seconds {
                        if let Err(e) = bundle::write_event_bundle(
                            &event,
                            &iq_data,
                            source.sample_rate(),
                            recording_freq,
                            &self.config.mode.to_string(),
                            &self.config.bundle_root,
                            true,
                        ) {
                            log::warn!("bundle write failed: {e}");
                        }
                    } else if self.config.save_bundles {
                        guarded("event", || {
                            (sinks.event)(EventSinkPayload::Diagnostic(format!(
                                "Skipped saving bundle (duration {event_elapsed:.2}s below min {:.2}s).",
                                self.config.min_event_seconds
                            )));
                        });
                    }

                    if self.config.scan_mode {
                        std::thread::sleep(Duration::from_secs_f64(self.config.hold_seconds));
                    }
                    active_started_at = None;
                    guarded("audio_level", || (sinks.audio_level)(0.0));
                }
            }

            if self.config.scan_mode && !active {
                current_index = (current_index + 1) % num_freqs;
            }
        }

        source.close();
        logger.close();
    }
}

/// Compute a rate-limited spectrum frame: 512-point FFT, shifted, magnitude
/// in dB normalized so the peak is 0 dB, with a frequency axis in MHz
/// spanning `[-Fs/2, Fs/2) + freq`.
fn compute_spectrum(
    fft: &dyn rustfft::Fft<f32>,
    samples: &[Complex32],
    sample_rate: f64,
    center_freq_hz: f64,
) -> (Vec<f64>, Vec<f32>) {
    let n = SPECTRUM_FFT_SIZE;
    let mut buffer: Vec<Complex32> = samples.iter().take(n).copied().collect();
    buffer.resize(n, Complex32::new(0.0, 0.0));
    fft.process(&mut buffer);
    buffer.rotate_left(n / 2); // fftshift

    let mut power_db: Vec<f32> = buffer.iter().map(|c| 20.0 * (c.norm() + 1e-6).log10()).collect();
    let max = power_db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    for v in &mut power_db {
        *v -= max;
    }

    let axis_mhz: Vec<f64> = (0..n)
        .map(|i| {
            let frac = i as f64 / n as f64 - 0.5;
            (frac * sample_rate + center_freq_hz) / 1e6
        })
        .collect();

    (axis_mhz, power_db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;
    use std::sync::{Arc, Mutex};

    fn logger_at(tag: &str) -> EventLogger {
        let dir = std::env::temp_dir();
        EventLogger::new(
            &dir.join(format!("sdr_core_scanner_test_{tag}.csv")),
            &dir.join(format!("sdr_core_scanner_test_{tag}.jsonl")),
            None,
        )
    }

    #[test]
    fn synthetic_tone_produces_at_least_one_event_and_bundle() {
        let bundle_root = std::env::temp_dir().join("sdr_core_scanner_bundle_test");
        let _ = std::fs::remove_dir_all(&bundle_root);

        let config = ScannerConfig {
            plan: FrequencyPlan::Single(100e6),
            mode: DemodMode::Fm,
            squelch_db: -80.0,
            scan_mode: false,
            sample_rate_hz: 250_000.0,
            source_kind: SourceKind::Synthetic,
            max_event_seconds: 4.0,
            min_event_seconds: 0.2,
            save_bundles: true,
            bundle_root: bundle_root.clone(),
            ..ScannerConfig::default()
        };
        let mut scanner = Scanner::new(config);
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);

        let mut sinks = Sinks::silent();
        sinks.event = Box::new(move |payload| {
            if let EventSinkPayload::Event(e) = payload {
                events_clone.lock().unwrap().push(e);
            }
        });

        // At -80 dBFS the noise floor alone (RMS ~0.11) already clears
        // squelch (1e-4), so the event never closes on quiet blocks; it
        // only closes once wall-clock elapsed reaches `max_event_seconds`
        // (4.0s). Give the interrupt a safety margin beyond that so at
        // least one close-and-log cycle is observed before we cut it off.
        let interrupt_handle = scanner.interrupt_handle();
        let interrupt_deadline = Instant::now() + Duration::from_secs(6);
        std::thread::scope(|scope| {
            scope.spawn(move || {
                while Instant::now() < interrupt_deadline {
                    std::thread::sleep(Duration::from_millis(20));
                }
                interrupt_handle.store(true, Ordering::Relaxed);
            });
            let mut logger = logger_at("tone");
            scanner.run(&mut sinks, &mut logger);
        });

        let recorded = events.lock().unwrap();
        assert!(!recorded.is_empty(), "expected at least one event");

        let _ = std::fs::remove_dir_all(&bundle_root);
    }

    #[test]
    fn source_init_failure_emits_diagnostic_and_returns() {
        let config = ScannerConfig {
            source_kind: SourceKind::File,
            file_path: None,
            ..ScannerConfig::default()
        };
        let mut scanner = Scanner::new(config);
        let diagnostics = Arc::new(Mutex::new(Vec::new()));
        let diagnostics_clone = Arc::clone(&diagnostics);
        let mut sinks = Sinks::silent();
        sinks.event = Box::new(move |payload| {
            if let EventSinkPayload::Diagnostic(msg) = payload {
                diagnostics_clone.lock().unwrap().push(msg);
            }
        });
        let mut logger = logger_at("initfail");
        scanner.run(&mut sinks, &mut logger);
        assert!(!diagnostics.lock().unwrap().is_empty());
    }
}
