//! `IQSource`: a uniform interface for producing complex baseband samples
//! from hardware, file, or synthetic backends. See `spec.md §4.1`.

mod file;
#[cfg(feature = "hardware")]
mod rtlsdr;
#[cfg(feature = "soapy")]
mod soapy;
mod synthetic;

pub use file::FileSource;
#[cfg(feature = "hardware")]
pub use rtlsdr::RtlSdrSource;
#[cfg(feature = "soapy")]
pub use soapy::SoapySource;
pub use synthetic::SyntheticSource;

use crate::error::{SdrError, SdrResult};
use num_complex::Complex32;
use std::collections::HashMap;
use std::path::PathBuf;

/// Tuner gain: automatic, or a fixed value in dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gain {
    Auto,
    Db(f64),
}

/// Which backend kind to construct. Mirrors `spec.md §3`'s source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Rtl,
    Soapy,
    File,
    Synthetic,
}

impl SourceKind {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rtl" => Some(SourceKind::Rtl),
            "soapy" => Some(SourceKind::Soapy),
            "file" => Some(SourceKind::File),
            "synthetic" => Some(SourceKind::Synthetic),
            _ => None,
        }
    }
}

/// Immutable (except for `tune`) description of a source's construction
/// parameters, per `spec.md §3`.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub sample_rate_hz: f64,
    pub center_freq_hz: f64,
    pub gain: Option<Gain>,
    pub file_path: Option<PathBuf>,
}

/// Uniform interface for IQ sample producers: hardware, file, or synthetic.
///
/// `read_samples` may return fewer than `n` samples; an empty block means
/// "no more samples, terminate". `tune` and `close` are idempotent.
pub trait IqSource: Send {
    /// Read up to `n` complex samples. Empty result signals end-of-stream.
    fn read_samples(&mut self, n: usize) -> SdrResult<Vec<Complex32>>;

    /// Retune the source to a new center frequency. Idempotent for
    /// file/synthetic sources.
    fn tune(&mut self, freq_hz: f64) -> SdrResult<()>;

    /// Release underlying resources. Idempotent.
    fn close(&mut self);

    /// Current sample rate in Hz.
    fn sample_rate(&self) -> f64;

    /// Human-readable status, emitted once to the `device_info` sink.
    fn info(&self) -> HashMap<String, String>;
}

/// Identity of one connected RTL-SDR dongle, as reported by `list_rtlsdr_devices`.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub serial: String,
}

/// Enumerate connected RTL-SDR devices. Returns an empty list (with a
/// warning logged) when the `hardware` feature was not compiled in, rather
/// than failing — device enumeration is a query, not a capability the
/// caller depends on to proceed.
#[cfg(feature = "hardware")]
#[must_use]
pub fn list_rtlsdr_devices() -> Vec<DeviceInfo> {
    let count = rtlsdr::get_device_count();
    let mut devices = Vec::new();
    #[allow(clippy::cast_possible_wrap, reason = "device indices fit i32 in practice")]
    for i in 0..count {
        let name = rtlsdr::get_device_name(i);
        if let Ok(usb_strings) = rtlsdr::get_device_usb_strings(i) {
            devices.push(DeviceInfo { index: i, name, serial: usb_strings.serial });
        }
    }
    devices
}

/// Stub used when the `hardware` feature is disabled.
#[cfg(not(feature = "hardware"))]
#[must_use]
pub fn list_rtlsdr_devices() -> Vec<DeviceInfo> {
    log::warn!("RTL-SDR hardware support not compiled (enable the 'hardware' feature)");
    Vec::new()
}

/// Construct a source from a descriptor, dispatching on `kind`.
///
/// Hardware kinds fail with [`SdrError::BackendUnavailable`] if the driver
/// cannot be initialized or the `hardware`/`soapy` feature was not compiled
/// in; that is a first-class, catchable value rather than a panic.
pub fn create_source(descriptor: &SourceDescriptor) -> SdrResult<Box<dyn IqSource>> {
    match descriptor.kind {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(
            descriptor.sample_rate_hz,
            descriptor.center_freq_hz,
        ))),
        SourceKind::File => {
            let path = descriptor.file_path.clone().ok_or_else(|| {
                SdrError::SourceIo("file source requires a file_path".to_string())
            })?;
            Ok(Box::new(FileSource::open(
                &path,
                descriptor.sample_rate_hz,
                descriptor.center_freq_hz,
            )?))
        }
        SourceKind::Rtl => {
            #[cfg(feature = "hardware")]
            {
                Ok(Box::new(RtlSdrSource::open(descriptor)?))
            }
            #[cfg(not(feature = "hardware"))]
            {
                Err(SdrError::BackendUnavailable(
                    "RTL-SDR support not compiled (enable the 'hardware' feature)".to_string(),
                ))
            }
        }
        SourceKind::Soapy => {
            #[cfg(feature = "soapy")]
            {
                Ok(Box::new(SoapySource::open(descriptor)?))
            }
            #[cfg(not(feature = "soapy"))]
            {
                Err(SdrError::BackendUnavailable(
                    "SoapySDR support not compiled (enable the 'soapy' feature)".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_parse_is_case_insensitive() {
        assert_eq!(SourceKind::parse("RTL"), Some(SourceKind::Rtl));
        assert_eq!(SourceKind::parse("Synthetic"), Some(SourceKind::Synthetic));
        assert_eq!(SourceKind::parse("bogus"), None);
    }

    #[test]
    fn create_source_synthetic_always_succeeds() {
        let descriptor = SourceDescriptor {
            kind: SourceKind::Synthetic,
            sample_rate_hz: 250_000.0,
            center_freq_hz: 100e6,
            gain: None,
            file_path: None,
        };
        assert!(create_source(&descriptor).is_ok());
    }

    #[test]
    fn create_source_file_without_path_errors() {
        let descriptor = SourceDescriptor {
            kind: SourceKind::File,
            sample_rate_hz: 250_000.0,
            center_freq_hz: 100e6,
            gain: None,
            file_path: None,
        };
        assert!(create_source(&descriptor).is_err());
    }
}
