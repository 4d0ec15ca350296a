//! Opaque collaborator boundaries for voice-to-text transcription and
//! semantic transcript search. Per `spec.md`'s Out-of-scope list, the core
//! only fixes these interfaces — it never implements Whisper inference or a
//! vector store itself. Grounded in `core/transcriber.py`'s `Transcriber`
//! and `core/vector_store.py`'s `TranscriptIndex`.

use crate::error::SdrResult;

/// Converts demodulated audio to text. Construction may fail if the
/// underlying model/runtime is unavailable ([`crate::error::SdrError::TranscriberInitFailed`]);
/// per-call failures are the caller's responsibility to substitute with a
/// placeholder, per `spec.md §4.7` step g.
pub trait Transcriber: Send {
    /// Transcribe `audio` (real samples at `audio_rate`) to text.
    fn transcribe(&self, audio: &[f32], audio_rate: f64) -> SdrResult<String>;
}

/// Accepts transcript text plus minimal metadata for later semantic or
/// keyword search. The Scanner assumes implementations are internally
/// synchronized, since it may be shared across logger instances.
pub trait TranscriptIndex: Send + Sync {
    /// Record one transcript. `freq_hz`/`time` mirror the owning event's
    /// fields, matching the `{time, freq}` metadata passed in the original
    /// implementation.
    fn add(&self, text: &str, freq_hz: f64, time: &str) -> SdrResult<()>;
}
