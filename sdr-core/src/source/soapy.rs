//! SoapySDR source: a hardware-agnostic backend covering devices the
//! `rtlsdr` crate does not (HackRF, LimeSDR, USRP, ...), matching the Python
//! reference's `SoapySDRSource`.
//!
//! Grounded in `soapysdr_source.rs` from `ThomasHabets-rustradio`: a single
//! RX stream opened synchronously, read in blocking calls with a timeout.
//! Unlike the RTL-SDR source, no background thread is needed — the
//! `soapysdr` crate's stream handle supports direct synchronous reads.

use super::{Gain, IqSource, SourceDescriptor};
use crate::error::{SdrError, SdrResult};
use num_complex::Complex32;
use std::collections::HashMap;

const READ_TIMEOUT_US: i64 = 100_000;
/// Soapy device string used when the descriptor does not name one; an empty
/// arg string lets SoapySDR auto-select the first available device.
const DEFAULT_DEVICE_ARGS: &str = "";

pub struct SoapySource {
    stream: soapysdr::RxStream<Complex32>,
    device: soapysdr::Device,
    channel: usize,
    sample_rate: f64,
    center_freq: f64,
}

impl std::fmt::Debug for SoapySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoapySource")
            .field("channel", &self.channel)
            .field("sample_rate", &self.sample_rate)
            .field("center_freq", &self.center_freq)
            .finish()
    }
}

impl SoapySource {
    pub fn open(descriptor: &SourceDescriptor) -> SdrResult<Self> {
        let channel = 0usize;
        let device = soapysdr::Device::new(DEFAULT_DEVICE_ARGS)
            .map_err(|e| SdrError::BackendUnavailable(format!("SoapySDR device open failed: {e}")))?;

        device
            .set_frequency(
                soapysdr::Direction::Rx,
                channel,
                descriptor.center_freq_hz,
                soapysdr::Args::new(),
            )
            .map_err(|e| SdrError::BackendUnavailable(format!("failed to set frequency: {e}")))?;
        device
            .set_sample_rate(soapysdr::Direction::Rx, channel, descriptor.sample_rate_hz)
            .map_err(|e| SdrError::BackendUnavailable(format!("failed to set sample rate: {e}")))?;

        let gain_db = match descriptor.gain.unwrap_or(Gain::Auto) {
            Gain::Auto => {
                device
                    .set_gain_mode(soapysdr::Direction::Rx, channel, true)
                    .map_err(|e| SdrError::BackendUnavailable(format!("failed to set auto gain: {e}")))?;
                None
            }
            Gain::Db(db) => Some(db),
        };
        if let Some(db) = gain_db {
            device
                .set_gain(soapysdr::Direction::Rx, channel, db)
                .map_err(|e| SdrError::BackendUnavailable(format!("failed to set gain: {e}")))?;
        }

        let mut stream = device
            .rx_stream::<Complex32>(&[channel])
            .map_err(|e| SdrError::BackendUnavailable(format!("failed to open RX stream: {e}")))?;
        stream
            .activate(None)
            .map_err(|e| SdrError::BackendUnavailable(format!("failed to activate RX stream: {e}")))?;

        Ok(Self {
            stream,
            device,
            channel,
            sample_rate: descriptor.sample_rate_hz,
            center_freq: descriptor.center_freq_hz,
        })
    }
}

impl IqSource for SoapySource {
    fn read_samples(&mut self, n: usize) -> SdrResult<Vec<Complex32>> {
        let mut buf = vec![Complex32::new(0.0, 0.0); n];
        match self.stream.read(&mut [&mut buf[..]], READ_TIMEOUT_US) {
            Ok(count) => {
                buf.truncate(count);
                Ok(buf)
            }
            Err(e) if e.code == soapysdr::ErrorCode::Timeout => Ok(Vec::new()),
            Err(e) => Err(SdrError::SourceIo(format!("SoapySDR read error: {e}"))),
        }
    }

    fn tune(&mut self, freq_hz: f64) -> SdrResult<()> {
        self.device
            .set_frequency(
                soapysdr::Direction::Rx,
                self.channel,
                freq_hz,
                soapysdr::Args::new(),
            )
            .map_err(|e| SdrError::SourceIo(format!("failed to retune: {e}")))?;
        self.center_freq = freq_hz;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stream.deactivate(None);
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn info(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("name".to_string(), "SoapySDR".to_string());
        m.insert("sample_rate".to_string(), self.sample_rate.to_string());
        m.insert("center_freq".to_string(), self.center_freq.to_string());
        if let Ok(driver) = self.device.driver_key() {
            m.insert("driver".to_string(), driver);
        }
        m
    }
}

impl Drop for SoapySource {
    fn drop(&mut self) {
        self.close();
    }
}
