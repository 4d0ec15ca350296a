//! SigMF-compatible capture metadata, grounded in `core/sigmf.py`.
//!
//! Writes a raw `cf32_le` data file alongside a JSON sidecar describing it.
//! Both files are written by [`crate::bundle`], which also computes and
//! records their SHA-256 digests in `manifest.json`.

use crate::error::SdrResult;
use chrono::Utc;
use num_complex::Complex32;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

const SIGMF_VERSION: &str = "0.0.1";
const APP_NAME: &str = "sdr-core";

#[derive(Debug, Serialize)]
struct GlobalMeta {
    version: &'static str,
    #[serde(rename = "core:datatype")]
    datatype: &'static str,
    #[serde(rename = "core:sample_rate")]
    sample_rate: f64,
    #[serde(rename = "core:frequency")]
    frequency: f64,
    #[serde(rename = "core:description")]
    description: String,
    #[serde(rename = "core:author")]
    author: &'static str,
    #[serde(rename = "core:datetime")]
    datetime: String,
    #[serde(rename = "core:mode")]
    mode: String,
}

#[derive(Debug, Serialize)]
struct Capture {
    #[serde(rename = "core:sample_start")]
    sample_start: u64,
    #[serde(rename = "core:frequency")]
    frequency: f64,
    #[serde(rename = "core:datetime")]
    datetime: String,
}

#[derive(Debug, Serialize)]
struct SigMfMeta {
    global: GlobalMeta,
    captures: Vec<Capture>,
    annotations: Vec<serde_json::Value>,
}

/// Paths of the two files written by [`write_sigmf`].
pub struct SigMfPaths {
    pub data_path: PathBuf,
    pub meta_path: PathBuf,
}

/// Write `<base_path>.sigmf-data` (raw interleaved little-endian `cf32`) and
/// `<base_path>.sigmf-meta` (JSON sidecar) describing `iq` at `sample_rate`
/// and `center_freq`, tagged with the demodulation `mode`.
pub fn write_sigmf(
    iq: &[Complex32],
    sample_rate: f64,
    center_freq: f64,
    base_path: &Path,
    mode: &str,
) -> SdrResult<SigMfPaths> {
    if let Some(parent) = base_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data_path = base_path.with_extension("sigmf-data");
    let meta_path = base_path.with_extension("sigmf-meta");

    let mut data_file = std::fs::File::create(&data_path)?;
    for sample in iq {
        data_file.write_all(&sample.re.to_le_bytes())?;
        data_file.write_all(&sample.im.to_le_bytes())?;
    }
    data_file.flush()?;

    let now = Utc::now().to_rfc3339();
    let meta = SigMfMeta {
        global: GlobalMeta {
            version: SIGMF_VERSION,
            datatype: "cf32_le",
            sample_rate,
            frequency: center_freq,
            description: format!("{APP_NAME} event capture"),
            author: APP_NAME,
            datetime: now.clone(),
            mode: mode.to_string(),
        },
        captures: vec![Capture {
            sample_start: 0,
            frequency: center_freq,
            datetime: now,
        }],
        annotations: Vec::new(),
    };
    let meta_json = serde_json::to_string_pretty(&meta)?;
    std::fs::write(&meta_path, meta_json)?;

    Ok(SigMfPaths { data_path, meta_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_sigmf_round_trips_iq_bit_identical() {
        let dir = std::env::temp_dir().join("sdr_core_sigmf_test");
        let base = dir.join("capture");
        let iq = vec![
            Complex32::new(0.5, -0.25),
            Complex32::new(-1.0, 1.0),
            Complex32::new(0.0, 0.0),
        ];
        let paths = write_sigmf(&iq, 250_000.0, 100e6, &base, "FM").unwrap();

        let bytes = std::fs::read(&paths.data_path).unwrap();
        assert_eq!(bytes.len(), iq.len() * 8);
        let readback: Vec<Complex32> = bytes
            .chunks_exact(8)
            .map(|c| {
                Complex32::new(
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                )
            })
            .collect();
        assert_eq!(readback, iq);

        let meta_text = std::fs::read_to_string(&paths.meta_path).unwrap();
        let meta_value: serde_json::Value = serde_json::from_str(&meta_text).unwrap();
        assert_eq!(meta_value["global"]["core:datatype"], "cf32_le");
        assert_eq!(meta_value["global"]["core:mode"], "FM");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
