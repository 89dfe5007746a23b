use crate::models::pitch::GaugeReading;

/// Needle exercise pattern for checking the gauge wiring.
///
/// Each needle ramps from 0.2 to 0.9 and wraps, starting at a different
/// phase, advancing `rate_per_sec * tick_secs` per reading.
#[derive(Debug, Clone)]
pub struct GaugeSweep {
    phases: [f32; 4],
    delta: f32,
}

impl GaugeSweep {
    const SPAN: f32 = 0.7;
    const FLOOR: f32 = 0.2;

    pub fn new(rate_per_sec: f32, tick_secs: f32) -> Self {
        Self {
            phases: [0.1, 0.3, 0.5, 0.7],
            delta: rate_per_sec * tick_secs,
        }
    }
}

impl Iterator for GaugeSweep {
    type Item = GaugeReading;

    fn next(&mut self) -> Option<GaugeReading> {
        let [a, b, c, d] = self.phases.map(|p| p + Self::FLOOR);
        for p in &mut self.phases {
            *p = (*p % Self::SPAN) + self.delta;
        }
        Some(GaugeReading { loudness: a, octave: b, semitone: c, deviation: d })
    }
}
