// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Headless command-line front end for `sdr-core`.
//!
//! Stands in for the GUI the specification declares out of scope: wires the
//! `Scanner`'s fire-and-forget sinks to `log::info!`/stdout, persists user
//! preferences through `confy` (see [`config`]), and exposes `run`,
//! `devices`, and `synth-file` subcommands.

mod config;

use clap::{Args, Parser, Subcommand};
use config::{AppConfig, PersistedPlan};
use sdr_core::{
    ChannelConfig, DemodMode, Event, EventLogger, EventSinkPayload, FrequencyPlan, Gain, Scanner,
    ScannerConfig, Sinks, SourceKind,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "SDR capture/scan/demodulation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scanner: sweep a frequency plan (or sit on one frequency),
    /// squelch-gate activity into events, and write bundles to disk.
    Run(RunArgs),
    /// Enumerate connected RTL-SDR devices.
    Devices,
    /// Write a deterministic multi-tone raw `cf32` IQ file, for exercising
    /// the `file` source without hardware.
    SynthFile(SynthFileArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Manual-receive frequency in Hz. Mutually exclusive with --start/--stop.
    #[arg(long)]
    freq: Option<f64>,

    /// Scan range start, in Hz.
    #[arg(long)]
    start: Option<f64>,
    /// Scan range stop, in Hz (inclusive).
    #[arg(long)]
    stop: Option<f64>,
    /// Scan step, in Hz.
    #[arg(long, default_value_t = 200_000.0)]
    step: f64,

    /// Demodulation mode: fm, am, or passthrough.
    #[arg(long, default_value = "fm")]
    mode: String,

    /// Tuner gain: "auto" or a numeric dB value.
    #[arg(long, default_value = "auto")]
    gain: String,

    /// Squelch threshold in dBFS. Defaults to the persisted config value.
    #[arg(long)]
    squelch_db: Option<f64>,

    /// Source backend: rtl, soapy, file, or synthetic.
    #[arg(long, default_value = "synthetic")]
    source: String,
    /// Path to an IQ file, required when --source file is used.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Nominal sample rate in Hz. Defaults to the persisted config value.
    #[arg(long)]
    sample_rate: Option<f64>,
    /// Demodulated audio rate in Hz. Defaults to the persisted config value.
    #[arg(long)]
    audio_rate: Option<f64>,

    /// Dwell time after tuning before sampling, in seconds (scan mode only).
    #[arg(long, default_value_t = 0.25)]
    dwell: f64,
    /// Hold time after an event closes before resuming the sweep, in seconds.
    #[arg(long, default_value_t = 0.5)]
    hold: f64,
    /// Maximum UI/spectrum emission rate, in frames per second.
    #[arg(long, default_value_t = 20.0)]
    ui_fps: f64,
    /// Hard cap on a single event's duration, in seconds.
    #[arg(long, default_value_t = 6.0)]
    max_event_secs: f64,
    /// Minimum event duration required to write a bundle, in seconds.
    #[arg(long, default_value_t = 1.0)]
    min_event_secs: f64,
    /// Accelerate sweeping by clamping dwell time while not ACTIVE.
    #[arg(long)]
    hunt: bool,

    /// Additional narrowband channel to demodulate concurrently, as
    /// `freq_hz:mode[:squelch_db[:label]]` (repeatable).
    #[arg(long = "channel", value_name = "FREQ_HZ:MODE:SQUELCH_DB:LABEL")]
    channels: Vec<String>,

    /// Disable bundle writing; events are still logged.
    #[arg(long)]
    no_bundles: bool,
    /// Directory event bundles are written under. Defaults to the persisted
    /// config value.
    #[arg(long)]
    bundle_root: Option<PathBuf>,

    /// Stop automatically after this many seconds (useful for scripted runs
    /// and smoke tests); absent means run until Ctrl-C.
    #[arg(long)]
    duration_secs: Option<f64>,
}

#[derive(Args, Debug)]
struct SynthFileArgs {
    /// Output path for the raw interleaved little-endian `cf32` file.
    path: PathBuf,
    /// Sample rate in Hz.
    #[arg(long, default_value_t = 2_000_000.0)]
    sample_rate: f64,
    /// Capture duration in seconds.
    #[arg(long, default_value_t = 1.0)]
    duration_secs: f64,
    /// Comma-separated tone frequencies in Hz, relative to baseband.
    #[arg(long, default_value = "100000,200000,300000")]
    tones: String,
}

fn parse_channel_spec(spec: &str) -> Result<ChannelConfig, String> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() < 2 || parts.len() > 4 {
        return Err(format!(
            "invalid --channel '{spec}': expected freq_hz:mode[:squelch_db[:label]]"
        ));
    }
    let freq_hz: f64 = parts[0]
        .parse()
        .map_err(|_| format!("invalid channel frequency '{}'", parts[0]))?;
    let mode = DemodMode::parse(parts[1]);
    let squelch_db: f64 = if parts.len() >= 3 {
        parts[2]
            .parse()
            .map_err(|_| format!("invalid channel squelch '{}'", parts[2]))?
    } else {
        -60.0
    };
    let label = parts.get(3).map(|s| (*s).to_string()).unwrap_or_default();
    Ok(ChannelConfig {
        freq_hz,
        mode,
        squelch_linear: sdr_core_squelch_linear(squelch_db),
        enabled: true,
        label,
    })
}

/// `sdr_core::dsp` isn't re-exported at the crate root (it's an internal DSP
/// primitive, not part of the public pipeline surface), so the CLI computes
/// the same `10^(db/20)` conversion locally for channel specs.
fn sdr_core_squelch_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args),
        Command::Devices => {
            devices();
            Ok(())
        }
        Command::SynthFile(args) => synth_file(&args),
    }
}

fn devices() {
    let found = sdr_core::list_rtlsdr_devices();
    if found.is_empty() {
        println!("No RTL-SDR devices found.");
        return;
    }
    for d in found {
        println!("[{}] {} (serial {})", d.index, d.name, d.serial);
    }
}

fn synth_file(args: &SynthFileArgs) -> Result<(), Box<dyn std::error::Error>> {
    use std::f64::consts::PI;
    use std::io::Write;

    let tones: Vec<f64> = args
        .tones
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()?;
    if tones.is_empty() {
        return Err("at least one tone frequency is required".into());
    }

    #[allow(
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "sample count is always non-negative and fits usize for test fixtures"
    )]
    let num_samples = (args.sample_rate * args.duration_secs) as usize;
    let mut file = std::fs::File::create(&args.path)?;
    let scale = 1.0 / tones.len() as f64;
    for n in 0..num_samples {
        let t = n as f64 / args.sample_rate;
        let mut i_sample = 0.0;
        let mut q_sample = 0.0;
        for &freq in &tones {
            let phase = 2.0 * PI * freq * t;
            i_sample += phase.cos();
            q_sample += phase.sin();
        }
        i_sample *= scale;
        q_sample *= scale;
        #[allow(clippy::cast_possible_truncation, reason = "IQ samples are f32 on disk")]
        file.write_all(&(i_sample as f32).to_le_bytes())?;
        #[allow(clippy::cast_possible_truncation, reason = "IQ samples are f32 on disk")]
        file.write_all(&(q_sample as f32).to_le_bytes())?;
    }
    println!(
        "Wrote {num_samples} samples ({:.2}s at {:.0} Hz) to {}",
        args.duration_secs,
        args.sample_rate,
        args.path.display()
    );
    Ok(())
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let stored = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load config, using defaults: {e}");
        AppConfig::default()
    });
    match AppConfig::config_path() {
        Ok(path) => log::debug!("using config file at {}", path.display()),
        Err(e) => log::debug!("could not resolve config file path: {e}"),
    }

    let squelch_db = args.squelch_db.unwrap_or(stored.squelch_db);
    let sample_rate_hz = args.sample_rate.unwrap_or(stored.sample_rate_hz);
    let audio_rate = args.audio_rate.unwrap_or(stored.audio_rate);
    let bundle_root = args.bundle_root.unwrap_or_else(|| PathBuf::from(&stored.bundle_root));

    let source_kind = SourceKind::parse(&args.source)
        .ok_or_else(|| format!("unknown source kind '{}'", args.source))?;
    let gain = match args.gain.as_str() {
        "auto" => Gain::Auto,
        db => db
            .parse::<f64>()
            .map(Gain::Db)
            .map_err(|_| format!("invalid --gain value '{db}'"))?,
    };

    let (plan, scan_mode) = match (args.freq, args.start, args.stop) {
        (Some(f), _, _) => (FrequencyPlan::Single(f), false),
        (None, Some(start), Some(stop)) => {
            (FrequencyPlan::Range { start_hz: start, stop_hz: stop, step_hz: args.step }, true)
        }
        (None, Some(start), None) => (FrequencyPlan::Single(start), false),
        _ => {
            let p = &stored.plan;
            (FrequencyPlan::Range { start_hz: p.start_hz, stop_hz: p.stop_hz, step_hz: p.step_hz }, true)
        }
    };

    // Persist this run's settings so a future `sdr-cli run` with no
    // arguments resumes where the user left off (only the swept range is
    // saved; a one-shot manual-receive `--freq` doesn't overwrite it).
    let mut to_persist = stored.clone();
    to_persist.squelch_db = squelch_db;
    to_persist.sample_rate_hz = sample_rate_hz;
    to_persist.audio_rate = audio_rate;
    to_persist.bundle_root = bundle_root.display().to_string();
    if let FrequencyPlan::Range { start_hz, stop_hz, step_hz } = plan {
        to_persist.plan = PersistedPlan { start_hz, stop_hz, step_hz };
    }
    if let Err(e) = to_persist.save() {
        log::warn!("failed to persist config: {e}");
    }

    let mut multi_channels = Vec::new();
    for spec in &args.channels {
        multi_channels.push(parse_channel_spec(spec)?);
    }

    let config = ScannerConfig {
        plan,
        mode: DemodMode::parse(&args.mode),
        gain: Some(gain),
        squelch_db,
        scan_mode,
        sample_rate_hz,
        source_kind,
        file_path: args.file.clone(),
        dwell_seconds: args.dwell,
        hold_seconds: args.hold,
        audio_rate,
        enable_transcription: false,
        transcription_model: String::new(),
        ui_max_fps: args.ui_fps,
        max_event_seconds: args.max_event_secs,
        min_event_seconds: args.min_event_secs,
        hunt_mode: args.hunt,
        multi_channels,
        save_bundles: !args.no_bundles,
        bundle_root,
    };

    let mut scanner = Scanner::new(config);
    let interrupt = scanner.interrupt_handle();

    let ctrlc_interrupt = Arc::clone(&interrupt);
    ctrlc::set_handler(move || {
        log::warn!("received Ctrl-C, stopping scanner");
        ctrlc_interrupt.store(true, Ordering::Relaxed);
    })
    .map_err(|e| format!("failed to install Ctrl-C handler: {e}"))?;

    if let Some(secs) = args.duration_secs {
        let timed_interrupt = Arc::clone(&interrupt);
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs_f64(secs));
            timed_interrupt.store(true, Ordering::Relaxed);
        });
    }

    let log_dir = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir).join("sdr-cli");
    std::fs::create_dir_all(&log_dir)?;
    let mut logger = EventLogger::new(&log_dir.join("sdr_events.log"), &log_dir.join("sdr_events.jsonl"), None);

    let mut sinks = build_sinks();
    log::info!("starting scanner: source={:?} mode={} squelch={squelch_db}dBFS", args.source, args.mode);
    scanner.run(&mut sinks, &mut logger);
    log::info!("scanner stopped");
    Ok(())
}

fn build_sinks() -> Sinks {
    Sinks {
        spectrum: Box::new(|_axis_mhz, _power_db| {
            // High-rate; logged at trace level only to avoid flooding stdout.
            log::trace!("spectrum frame emitted");
        }),
        event: Box::new(|payload| match payload {
            EventSinkPayload::Event(e) => print_event(&e),
            EventSinkPayload::Diagnostic(msg) => println!("[diagnostic] {msg}"),
        }),
        audio_level: Box::new(|rms| log::trace!("audio level rms={rms}")),
        audio_frame: Box::new(|frame| log::trace!("audio frame ({} samples)", frame.len())),
        device_info: Box::new(|info| {
            let mut entries: Vec<(&String, &String)> = info.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            let rendered: Vec<String> = entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
            println!("device: {}", rendered.join(", "));
        }),
        now_playing: Box::new(|freq_hz, mode| {
            println!("now playing: {:.4} MHz ({mode})", freq_hz / 1e6);
        }),
    }
}

fn print_event(e: &Event) {
    println!(
        "event: {} | {:.4} MHz | \"{}\"",
        e.time,
        e.freq / 1e6,
        e.text
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_channel_spec_with_squelch() {
        let cfg = parse_channel_spec("12000:fm:-50").unwrap();
        assert_eq!(cfg.freq_hz, 12_000.0);
        assert_eq!(cfg.mode, DemodMode::Fm);
        assert!((cfg.squelch_linear - sdr_core_squelch_linear(-50.0)).abs() < 1e-9);
    }

    #[test]
    fn parse_channel_spec_defaults_squelch() {
        let cfg = parse_channel_spec("30000:am").unwrap();
        assert!((cfg.squelch_linear - sdr_core_squelch_linear(-60.0)).abs() < 1e-9);
    }

    #[test]
    fn parse_channel_spec_with_label() {
        let cfg = parse_channel_spec("12000:fm:-50:tower1").unwrap();
        assert_eq!(cfg.label, "tower1");
    }

    #[test]
    fn parse_channel_spec_defaults_label_to_empty() {
        let cfg = parse_channel_spec("30000:am").unwrap();
        assert_eq!(cfg.label, "");
    }

    #[test]
    fn parse_channel_spec_rejects_malformed_input() {
        assert!(parse_channel_spec("not-a-spec").is_err());
        assert!(parse_channel_spec("1:2:3:4:5").is_err());
    }

    #[test]
    fn synth_file_writes_requested_sample_count() {
        let path = std::env::temp_dir().join("sdr_cli_test_synth.cf32");
        let args = SynthFileArgs {
            path: path.clone(),
            sample_rate: 1000.0,
            duration_secs: 0.1,
            tones: "100,200".to_string(),
        };
        synth_file(&args).unwrap();
        let bytes = std::fs::metadata(&path).unwrap().len();
        assert_eq!(bytes, 100 * 8); // 100 samples * 8 bytes (I+Q f32)
        let _ = std::fs::remove_file(&path);
    }
}
