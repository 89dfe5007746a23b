//! # pitch-gauge-core
//!
//! Platform-agnostic core of the pitch gauge tuner.
//!
//! Provides the capture recovery state machine, the double-mapped history
//! buffer, autocorrelation pitch estimation, and the mapping to gauge needle
//! positions. Platform backends (ALSA on Linux) implement the `PcmDevice`
//! trait and plug into the generic `Tuner`.
//!
//! ## Architecture
//!
//! ```text
//! pitch-gauge-core (this crate)
//! ├── traits/       ← PcmDevice, GaugeOutput
//! ├── models/       ← CaptureError, DeviceState, TunerConfiguration, PitchEstimate
//! ├── processing/   ← VirtualRingBuffer, autocorrelation, musical mapping, meter
//! ├── session/      ← CaptureEngine, Tuner (generic orchestrator)
//! └── output/       ← GaugeFrame wire format, LogGauge, GaugeSweep
//! ```

pub mod models;
pub mod output;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::{AnalysisWindow, CaptureParams, RatePolicy, TunerConfiguration};
pub use models::error::{CaptureError, DeviceError, RingBufferError};
pub use models::pitch::{GaugeReading, PeriodLevels, PitchEstimate};
pub use models::state::DeviceState;
pub use output::gauge_frame::GaugeFrame;
pub use output::log_gauge::LogGauge;
pub use output::sweep::GaugeSweep;
pub use processing::estimator::PitchEstimator;
pub use processing::ring_buffer::VirtualRingBuffer;
pub use session::capture_engine::CaptureEngine;
pub use session::tuner::Tuner;
pub use traits::gauge_output::GaugeOutput;
pub use traits::pcm_device::{MappedArea, PcmDevice};
