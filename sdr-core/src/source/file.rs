//! File-backed IQ source: loads a pre-stored sample array and replays it,
//! wrapping to the start on exhaustion. See `spec.md §4.1` and the Open
//! Question about whether to wrap or terminate — this implementation wraps,
//! matching `FileSDRSource.read_samples` in the original reference.
//!
//! Two on-disk formats are accepted:
//! - raw interleaved little-endian `complex64` (`.cf32`/`.iq`/`.cfile`),
//! - 16-bit stereo WAV with I on the left channel and Q on the right,
//!   grounded in `WavSource` (`src/sdr/wav_source.rs` in the teacher repo).

use super::IqSource;
use crate::error::{SdrError, SdrResult};
use num_complex::Complex32;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    samples: Vec<Complex32>,
    cursor: usize,
    sample_rate: f64,
    center_freq: f64,
}

impl FileSource {
    /// Load `path` fully into memory. `.wav` files must be 16-bit stereo;
    /// anything else is treated as raw interleaved `cf32`.
    pub fn open(path: &Path, sample_rate: f64, center_freq: f64) -> SdrResult<Self> {
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);

        let samples = if is_wav {
            Self::load_wav(path)?
        } else {
            Self::load_raw_cf32(path)?
        };

        if samples.is_empty() {
            return Err(SdrError::SourceIo(format!(
                "IQ file {} contains no samples",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            samples,
            cursor: 0,
            sample_rate,
            center_freq,
        })
    }

    fn load_raw_cf32(path: &Path) -> SdrResult<Vec<Complex32>> {
        let file = File::open(path).map_err(|e| {
            SdrError::SourceIo(format!("failed to open IQ file {}: {e}", path.display()))
        })?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| SdrError::SourceIo(format!("failed to read IQ file: {e}")))?;
        if bytes.len() % 8 != 0 {
            return Err(SdrError::SourceIo(
                "IQ file length is not a multiple of 8 bytes (complex64 pairs)".to_string(),
            ));
        }
        let samples = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let i = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let q = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
                Complex32::new(i, q)
            })
            .collect();
        Ok(samples)
    }

    fn load_wav(path: &Path) -> SdrResult<Vec<Complex32>> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| SdrError::SourceIo(format!("failed to open WAV file: {e}")))?;
        let spec = reader.spec();
        if spec.channels != 2 {
            return Err(SdrError::SourceIo(format!(
                "WAV file must be stereo (2 channels), found {}",
                spec.channels
            )));
        }
        if spec.bits_per_sample != 16 {
            return Err(SdrError::SourceIo(format!(
                "WAV file must be 16-bit, found {} bits per sample",
                spec.bits_per_sample
            )));
        }
        let raw: Vec<i16> = reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| SdrError::SourceIo(format!("failed to decode WAV samples: {e}")))?;
        Ok(raw
            .chunks_exact(2)
            .map(|pair| {
                Complex32::new(
                    f32::from(pair[0]) / f32::from(i16::MAX),
                    f32::from(pair[1]) / f32::from(i16::MAX),
                )
            })
            .collect())
    }
}

impl IqSource for FileSource {
    fn read_samples(&mut self, n: usize) -> SdrResult<Vec<Complex32>> {
        let total = self.samples.len();
        let end = (self.cursor + n).min(total);
        let out = self.samples[self.cursor..end].to_vec();
        self.cursor = end;
        if self.cursor >= total {
            self.cursor = 0;
        }
        Ok(out)
    }

    fn tune(&mut self, freq_hz: f64) -> SdrResult<()> {
        self.center_freq = freq_hz;
        Ok(())
    }

    fn close(&mut self) {
        self.samples.clear();
        self.cursor = 0;
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn info(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("name".to_string(), "File Source".to_string());
        m.insert("sample_rate".to_string(), self.sample_rate.to_string());
        m.insert("center_freq".to_string(), self.center_freq.to_string());
        m.insert("filename".to_string(), self.path.display().to_string());
        m.insert("total_samples".to_string(), self.samples.len().to_string());
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_raw_cf32(path: &Path, samples: &[Complex32]) {
        let mut f = File::create(path).unwrap();
        for s in samples {
            f.write_all(&s.re.to_le_bytes()).unwrap();
            f.write_all(&s.im.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn read_samples_wraps_on_exhaustion() {
        let dir = std::env::temp_dir();
        let path = dir.join("sdr_core_test_wrap.cf32");
        let samples: Vec<Complex32> = (0..4).map(|i| Complex32::new(i as f32, 0.0)).collect();
        write_raw_cf32(&path, &samples);

        let mut src = FileSource::open(&path, 1.0, 0.0).unwrap();
        let first = src.read_samples(3).unwrap();
        assert_eq!(first.len(), 3);
        // Only 1 sample remains; this call returns that short tail and
        // wraps the cursor back to the start for the *next* call rather
        // than refilling within this one.
        let second = src.read_samples(3).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0], samples[3]);
        let third = src.read_samples(3).unwrap();
        assert_eq!(third.len(), 3);
        assert_eq!(third[0], samples[0]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_missing_file_errors() {
        let result = FileSource::open(Path::new("/nonexistent/path.cf32"), 1.0, 0.0);
        assert!(result.is_err());
    }
}
