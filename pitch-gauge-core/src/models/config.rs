use serde::{Deserialize, Serialize};

/// Semitones between A0 and A4.
const A0_BELOW_A4: f64 = 48.0;

/// How the capture rate is picked from what the hardware offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatePolicy {
    /// Smallest supported rate at or above twice the lowest note.
    Lowest,
    /// Largest supported rate.
    Highest,
}

/// Tuner configuration, loadable from JSON.
///
/// Missing fields take their defaults, so a config file only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfiguration {
    /// ALSA PCM name, or None for the first capture-capable hardware device.
    pub device: Option<String>,

    /// Pitch of A4 in Hz (default: 440).
    pub a4_hz: f64,

    /// Number of keys starting at A0 (default: 88).
    pub key_count: u32,

    /// Range extension below the lowest and above the highest key, in semitones.
    pub margin_semitones: f64,

    /// Frequency of C0, the zero point of the octave gauge.
    pub reference_c0_hz: f64,

    pub rate_policy: RatePolicy,

    /// Peak-detection threshold as a fraction of the lag-0 energy.
    pub peak_threshold: f32,

    /// Autocorrelation lag count, in periods.
    pub lag_periods: usize,

    /// Samples averaged per lag, in periods.
    pub window_periods: usize,

    /// Periods delivered between two estimates.
    pub analysis_interval: usize,

    /// Ring-buffer granularity in bytes (None = host page size).
    pub page_unit: Option<usize>,

    /// SPI device for the gauges, or None to log readings instead.
    pub gauge_device: Option<String>,
}

impl TunerConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.a4_hz > 0.0) {
            return Err("A4 frequency must be positive".into());
        }
        if !(self.reference_c0_hz > 0.0) {
            return Err("C0 reference must be positive".into());
        }
        if self.key_count == 0 {
            return Err("key count must be at least 1".into());
        }
        if !(self.margin_semitones >= 0.0) {
            return Err(format!("negative range margin: {}", self.margin_semitones));
        }
        if !(self.peak_threshold > 0.0 && self.peak_threshold < 1.0) {
            return Err(format!("peak threshold out of (0, 1): {}", self.peak_threshold));
        }
        if self.lag_periods == 0 || self.window_periods == 0 {
            return Err("analysis window must span at least one period".into());
        }
        if self.analysis_interval == 0 {
            return Err("analysis interval must be at least one period".into());
        }
        if self.page_unit == Some(0) {
            return Err("page unit must be positive".into());
        }
        Ok(())
    }

    /// Lowest frequency of interest: A0 minus the margin.
    pub fn f_min(&self) -> f64 {
        self.a4_hz * semitones(-A0_BELOW_A4 - self.margin_semitones)
    }

    /// Highest frequency of interest: the top key plus the margin.
    pub fn f_max(&self) -> f64 {
        let top_key = self.key_count as f64 - 1.0;
        self.a4_hz * semitones(top_key - A0_BELOW_A4 + self.margin_semitones)
    }

    /// Floor for the negotiated sample rate: Nyquist for the lowest note.
    pub fn min_sample_rate_hz(&self) -> u32 {
        (2.0 * self.f_min()).ceil() as u32
    }

    /// Autocorrelation sizes for the negotiated capture parameters.
    pub fn analysis_window(&self, params: &CaptureParams) -> AnalysisWindow {
        let lags = self.lag_periods * params.period_frames;
        AnalysisWindow {
            lags,
            history: lags + self.window_periods * params.period_frames,
        }
    }
}

impl Default for TunerConfiguration {
    fn default() -> Self {
        Self {
            device: None,
            a4_hz: 440.0,
            key_count: 88,
            margin_semitones: 1.0,
            reference_c0_hz: 440.0 * semitones(-57.0),
            rate_policy: RatePolicy::Lowest,
            peak_threshold: 1.0 / 16.0,
            lag_periods: 2,
            window_periods: 2,
            analysis_interval: 1,
            page_unit: None,
            gauge_device: None,
        }
    }
}

fn semitones(n: f64) -> f64 {
    (n / 12.0).exp2()
}

/// Capture timing derived from the negotiated rate. Immutable once streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureParams {
    pub sample_rate_hz: u32,
    /// Power of two, spans at least one cycle of the lowest note.
    pub period_frames: usize,
    pub buffer_frames: usize,
    /// One period plus 25% grace before a stall is declared.
    pub timeout_micros: u64,
}

impl CaptureParams {
    pub fn derive(sample_rate_hz: u32, f_min: f64) -> Self {
        let min_frames = (sample_rate_hz as f64 / f_min).ceil() as usize;
        let period_frames = min_frames.max(1).next_power_of_two();
        let timeout_micros =
            (period_frames as f64 * 1.25 / sample_rate_hz as f64 * 1e6).round() as u64;

        Self {
            sample_rate_hz,
            period_frames,
            buffer_frames: 2 * period_frames,
            timeout_micros,
        }
    }

    /// Device wait timeout, rounded up to whole milliseconds.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_micros.div_ceil(1000) as u32
    }
}

/// Sample counts for one autocorrelation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    /// `nac`: lags computed.
    pub lags: usize,
    /// `nf`: history consumed, always more than `lags`.
    pub history: usize,
}
