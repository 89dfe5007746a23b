use crate::models::pitch::PeriodLevels;

/// Level statistics over raw 16-bit samples.
///
/// Used as a trace-level health check on each delivered period, so a dead or
/// clipping input shows up in the logs before the pitch gauges go quiet.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodMeter;

impl PeriodMeter {
    /// Peak absolute value, mean, and mean absolute value of `samples`.
    pub fn measure(samples: &[i16]) -> PeriodLevels {
        if samples.is_empty() {
            return PeriodLevels::default();
        }

        let mut peak = 0i32;
        let mut sum = 0i64;
        let mut sum_abs = 0i64;
        for &s in samples {
            let abs = (s as i32).abs();
            peak = peak.max(abs);
            sum += s as i64;
            sum_abs += abs as i64;
        }

        let n = samples.len() as f64;
        PeriodLevels {
            peak: peak as f32,
            mean: (sum as f64 / n) as f32,
            mean_abs: (sum_abs as f64 / n) as f32,
        }
    }
}
