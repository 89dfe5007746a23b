use crate::models::pitch::GaugeReading;

/// Sink for gauge readings, one per analysis cycle.
///
/// Implemented by:
/// - `LogGauge` (any platform, writes readings to the log)
/// - `SpiGauge` (Linux, drives the analog needles)
///
/// Called from the capture loop; implementations must not block for long
/// and report their own failures rather than returning them.
pub trait GaugeOutput: Send + Sync {
    fn show(&self, reading: &GaugeReading);
}
