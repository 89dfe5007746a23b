use serde::Serialize;

/// Result of one analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchEstimate {
    /// Lag-0 autocorrelation (mean power of the analysed samples).
    pub energy: f32,
    /// None when no determinate pitch was found this cycle.
    pub frequency_hz: Option<f32>,
    pub loudness: f32,
    pub octave: f32,
    pub semitone: f32,
    pub deviation: f32,
}

impl PitchEstimate {
    /// The gauge needle positions for this estimate.
    pub fn reading(&self) -> GaugeReading {
        GaugeReading {
            loudness: self.loudness,
            octave: self.octave,
            semitone: self.semitone,
            deviation: self.deviation,
        }
    }
}

/// Needle positions for the four gauges, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugeReading {
    pub loudness: f32,
    pub octave: f32,
    pub semitone: f32,
    pub deviation: f32,
}

impl GaugeReading {
    /// Every needle centred.
    pub const NEUTRAL: Self = Self {
        loudness: 0.0,
        octave: 0.5,
        semitone: 0.5,
        deviation: 0.5,
    };
}

impl Default for GaugeReading {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Statistics over one delivered period, in raw sample units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodLevels {
    pub peak: f32,
    pub mean: f32,
    pub mean_abs: f32,
}
