use parking_lot::Mutex;

use crate::models::pitch::GaugeReading;
use crate::traits::gauge_output::GaugeOutput;

/// Gauge output for machines without the needle board: each reading is
/// logged as a JSON line at `info` level.
#[derive(Debug, Default)]
pub struct LogGauge {
    shown: Mutex<u64>,
}

impl LogGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readings logged so far.
    pub fn shown(&self) -> u64 {
        *self.shown.lock()
    }
}

impl GaugeOutput for LogGauge {
    fn show(&self, reading: &GaugeReading) {
        match serde_json::to_string(reading) {
            Ok(json) => log::info!("gauge {}", json),
            Err(e) => log::warn!("failed to serialize gauge reading: {}", e),
        }
        *self.shown.lock() += 1;
    }
}
