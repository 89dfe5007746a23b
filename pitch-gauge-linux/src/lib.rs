//! # pitch-gauge-linux
//!
//! Linux backend for pitch-gauge.
//!
//! Provides:
//! - `AlsaCapture`: mono S16_LE capture with zero-copy mmap delivery
//! - `DeviceEnumerator`: capture-capable PCM discovery via the ALSA control API
//! - `SpiGauge`: analog needle board driven over spidev
//!
//! ## Platform Requirements
//! - ALSA (`libasound2-dev` for linking)
//! - spidev enabled for the gauge board (e.g. `dtparam=spi=on` on a Raspberry Pi)
//!
//! ## Usage
//! ```ignore
//! use pitch_gauge_core::{CaptureEngine, LogGauge, Tuner, TunerConfiguration};
//! use pitch_gauge_linux::{AlsaCapture, DeviceEnumerator};
//!
//! let config = TunerConfiguration::default();
//! let device = DeviceEnumerator::first_capture_device()?;
//! let (capture, params) = AlsaCapture::open(&device.id, &config)?;
//! let engine = CaptureEngine::new(capture, params);
//! let mut tuner = Tuner::new(engine, &config, Arc::new(LogGauge::new()))?;
//! tuner.run(&stop)?;
//! ```

#[cfg(target_os = "linux")]
pub mod alsa_capture;
#[cfg(target_os = "linux")]
pub mod device_enumerator;
#[cfg(target_os = "linux")]
pub mod spi_gauge;

#[cfg(target_os = "linux")]
pub use alsa_capture::AlsaCapture;
#[cfg(target_os = "linux")]
pub use device_enumerator::{CaptureDevice, DeviceEnumerator};
#[cfg(target_os = "linux")]
pub use spi_gauge::{SpiError, SpiGauge};
