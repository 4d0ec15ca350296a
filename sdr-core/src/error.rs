//! Error types for the SDR ingest/scanning/demodulation core.
//!
//! Per the error-handling design: only source construction and source
//! exhaustion are terminal to a [`crate::scanner::Scanner`] run. Everything
//! else in the hot path is swallowed by the caller and surfaced as a
//! diagnostic `event` sink message instead of an `Err`.

use thiserror::Error;

/// Errors produced by the core.
#[derive(Debug, Error)]
pub enum SdrError {
    /// A hardware backend (RTL-SDR, SoapySDR) could not be initialized.
    #[error("SDR backend unavailable: {0}")]
    BackendUnavailable(String),

    /// `read_samples` failed for a reason other than ordinary end-of-stream.
    #[error("source I/O error: {0}")]
    SourceIo(String),

    /// Transcriber construction failed; scanning continues without it.
    #[error("transcriber init failed: {0}")]
    TranscriberInitFailed(String),

    /// A single transcription call failed.
    #[error("transcription failed: {0}")]
    TranscribeFailed(String),

    /// A fire-and-forget sink callback failed.
    #[error("sink failed: {0}")]
    SinkFailed(String),

    /// Bundle directory or artifact write failed.
    #[error("bundle write failed: {0}")]
    BundleWriteFailed(#[from] std::io::Error),

    /// Journal (CSV/JSONL) append failed.
    #[error("journal write failed: {0}")]
    JournalWriteFailed(String),

    /// Transcript index `add` call failed.
    #[error("transcript index add failed: {0}")]
    IndexAddFailed(String),

    /// JSON (de)serialization failure while building event/manifest/SigMF
    /// records.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// User configuration could not be loaded or saved (`sdr-cli`'s `confy`
    /// layer). Never raised from within this crate directly; exposed so CLI
    /// front ends can report config failures through the same error type.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Convenience alias used throughout the core.
pub type SdrResult<T> = Result<T, SdrError>;
