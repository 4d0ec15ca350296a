//! Per-event bundle writer: `event.json` + optional SigMF capture +
//! `manifest.json` with SHA-256 digests of every artifact. Grounded in
//! `core/bundles.py`'s `write_event_bundle`.

use crate::error::SdrResult;
use crate::event_logger::Event;
use crate::sigmf;
use num_complex::Complex32;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

const HASH_CHUNK_SIZE: usize = 8192;

#[derive(Debug, Serialize)]
struct ArtifactDigest {
    path: String,
    sha256: String,
}

#[derive(Debug, Serialize)]
struct ManifestMeta {
    sample_rate_hz: f64,
    center_freq_hz: f64,
    mode: String,
}

#[derive(Debug, Serialize)]
struct Manifest {
    event: ArtifactDigest,
    meta: ManifestMeta,
    artifacts: Vec<ArtifactDigest>,
}

/// Stream `path` in 8 KiB chunks and return its hex-encoded SHA-256 digest.
fn sha256_file(path: &Path) -> SdrResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write a self-contained bundle directory for one event.
///
/// The directory is named `<timestamp>_<freq_mhz>MHz` with colons and
/// spaces stripped from the timestamp (matching `bundles.py`). `manifest.json`
/// is written last, after every other artifact's hash has been computed, so
/// that a bundle missing or failing to hash-verify `manifest.json` can be
/// treated as incomplete by consumers.
pub fn write_event_bundle(
    event: &Event,
    iq: &[Complex32],
    sample_rate: f64,
    center_freq: f64,
    mode: &str,
    bundle_root: &Path,
    save_sigmf: bool,
) -> SdrResult<PathBuf> {
    let freq_mhz = center_freq / 1e6;
    let sanitized_time = event.time.replace(':', "").replace(' ', "_");
    let bundle_name = format!("{sanitized_time}_{freq_mhz:.3}MHz");
    let bundle_dir = bundle_root.join(bundle_name);
    std::fs::create_dir_all(&bundle_dir)?;

    let event_path = bundle_dir.join("event.json");
    let event_json = serde_json::to_string_pretty(event)?;
    std::fs::write(&event_path, event_json)?;
    let event_digest = ArtifactDigest {
        path: event_path.display().to_string(),
        sha256: sha256_file(&event_path)?,
    };

    let mut artifacts = Vec::new();
    if save_sigmf && !iq.is_empty() {
        let base = bundle_dir.join("capture");
        let paths = sigmf::write_sigmf(iq, sample_rate, center_freq, &base, mode)?;
        artifacts.push(ArtifactDigest {
            sha256: sha256_file(&paths.data_path)?,
            path: paths.data_path.display().to_string(),
        });
        artifacts.push(ArtifactDigest {
            sha256: sha256_file(&paths.meta_path)?,
            path: paths.meta_path.display().to_string(),
        });
    }

    let manifest = Manifest {
        event: event_digest,
        meta: ManifestMeta {
            sample_rate_hz: sample_rate,
            center_freq_hz: center_freq,
            mode: mode.to_string(),
        },
        artifacts,
    };
    let manifest_path = bundle_dir.join("manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    Ok(bundle_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn sample_event() -> Event {
        Event {
            time: "2026-01-02 03:04:05".to_string(),
            freq: 100_500_000.0,
            text: String::new(),
            extra: Map::new(),
        }
    }

    #[test]
    fn write_event_bundle_creates_verifiable_manifest() {
        let root = std::env::temp_dir().join("sdr_core_bundle_test_ok");
        let _ = std::fs::remove_dir_all(&root);
        let iq = vec![Complex32::new(1.0, 0.0); 16];
        let event = sample_event();

        let dir = write_event_bundle(&event, &iq, 250_000.0, 100.5e6, "FM", &root, true).unwrap();
        assert!(dir.join("event.json").exists());
        assert!(dir.join("capture.sigmf-data").exists());
        assert!(dir.join("capture.sigmf-meta").exists());
        assert!(dir.join("manifest.json").exists());

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("manifest.json")).unwrap()).unwrap();
        let expected = sha256_file(&dir.join("event.json")).unwrap();
        assert_eq!(manifest["event"]["sha256"], expected);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn write_event_bundle_without_sigmf_omits_capture_files() {
        let root = std::env::temp_dir().join("sdr_core_bundle_test_nosigmf");
        let _ = std::fs::remove_dir_all(&root);
        let event = sample_event();

        let dir = write_event_bundle(&event, &[], 250_000.0, 100.5e6, "FM", &root, true).unwrap();
        assert!(!dir.join("capture.sigmf-data").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn tampering_with_capture_data_invalidates_manifest_hash() {
        let root = std::env::temp_dir().join("sdr_core_bundle_test_tamper");
        let _ = std::fs::remove_dir_all(&root);
        let iq = vec![Complex32::new(0.1, 0.2); 8];
        let event = sample_event();
        let dir = write_event_bundle(&event, &iq, 250_000.0, 100.5e6, "FM", &root, true).unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("manifest.json")).unwrap()).unwrap();
        let recorded_hash = manifest["artifacts"][0]["sha256"].as_str().unwrap().to_string();

        let mut bytes = std::fs::read(dir.join("capture.sigmf-data")).unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(dir.join("capture.sigmf-data"), bytes).unwrap();

        let recomputed = sha256_file(&dir.join("capture.sigmf-data")).unwrap();
        assert_ne!(recomputed, recorded_hash);

        let _ = std::fs::remove_dir_all(&root);
    }
}
