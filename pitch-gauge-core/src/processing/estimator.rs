use crate::models::config::{AnalysisWindow, TunerConfiguration};
use crate::models::pitch::PitchEstimate;
use crate::processing::autocorrelation::{autocorrelate, estimate_frequency};
use crate::processing::musical::{to_loudness, to_musical_coordinates};

/// Turns a window of captured history into a pitch estimate.
///
/// Owns the autocorrelation scratch buffer so the analysis loop allocates
/// nothing after construction.
#[derive(Debug)]
pub struct PitchEstimator {
    window: AnalysisWindow,
    sample_rate_hz: u32,
    threshold: f32,
    reference_c0_hz: f64,
    ac: Vec<f32>,
}

impl PitchEstimator {
    pub fn new(window: AnalysisWindow, sample_rate_hz: u32, config: &TunerConfiguration) -> Self {
        Self {
            window,
            sample_rate_hz,
            threshold: config.peak_threshold,
            reference_c0_hz: config.reference_c0_hz,
            ac: vec![0.0; window.lags],
        }
    }

    pub fn window(&self) -> AnalysisWindow {
        self.window
    }

    /// Estimate pitch and loudness from the last `window().history` samples.
    ///
    /// # Panics
    /// If `history` is not exactly `window().history` samples long.
    pub fn estimate(&mut self, history: &[f32]) -> PitchEstimate {
        assert_eq!(
            history.len(),
            self.window.history,
            "estimator expects {} samples of history",
            self.window.history
        );

        self.ac.fill(0.0);
        autocorrelate(history, self.window.lags, &mut self.ac);

        let energy = self.ac[0];
        let frequency_hz = estimate_frequency(&self.ac, self.sample_rate_hz, self.threshold);
        let coords = to_musical_coordinates(frequency_hz, self.reference_c0_hz);

        PitchEstimate {
            energy,
            frequency_hz,
            loudness: to_loudness(energy),
            octave: coords.octave,
            semitone: coords.semitone,
            deviation: coords.deviation,
        }
    }

    /// Autocorrelation from the most recent `estimate` call.
    pub fn autocorrelation(&self) -> &[f32] {
        &self.ac
    }
}
