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

//! Real-time SDR ingest, scanning, demodulation, and event-bundle engine.
//!
//! This library provides the headless core of an SDR capture and analysis
//! pipeline: an abstract IQ sample source, a DSP/demodulator family, a
//! multi-channel mixer, and a scanning state machine that turns
//! above-squelch activity into reproducible on-disk bundles.
//!
//! - **Source layer** ([`source`]): hardware (RTL-SDR, SoapySDR), file, and
//!   synthetic IQ producers behind one [`source::IqSource`] trait.
//! - **DSP layer** ([`dsp`], [`demod`], [`multichannel`]): power/resampling
//!   primitives, the FM/AM/passthrough demodulator family, and digital
//!   mixing for multi-channel reception.
//! - **Capture layer** ([`event_logger`], [`bundle`], [`sigmf`]): an
//!   append-only event journal and a SigMF-compatible bundle writer with
//!   SHA-256 manifests.
//! - **Orchestration** ([`scanner`], [`plan`]): the [`scanner::Scanner`]
//!   state machine that ties everything together.
//! - **Collaborator boundaries** ([`transcriber`]): opaque traits for
//!   voice-to-text transcription and transcript indexing, implemented
//!   outside this crate.

pub mod bundle;
pub mod demod;
pub mod dsp;
pub mod error;
pub mod event_logger;
pub mod multichannel;
pub mod plan;
pub mod scanner;
pub mod sigmf;
pub mod source;
pub mod transcriber;

pub use demod::{DemodMode, Demodulator};
pub use error::{SdrError, SdrResult};
pub use event_logger::{Event, EventLogger};
pub use multichannel::{ChannelConfig, ChannelResult, MultiChannelDemod};
pub use plan::FrequencyPlan;
pub use scanner::{EventSinkPayload, Scanner, ScannerConfig, Sinks};
pub use source::{
    create_source, list_rtlsdr_devices, DeviceInfo, Gain, IqSource, SourceDescriptor, SourceKind,
};
