/// Fractional part, always rounding down: the result is in `[0, 1)` for
/// every finite input, including negative ones.
pub fn mod1rd(x: f32) -> f32 {
    let frac = x - x.floor();
    // x slightly below an integer can round up to exactly 1.0
    if frac >= 1.0 {
        0.0
    } else {
        frac
    }
}

/// Limit `x` to `[0, 1]`.
pub fn clip01(x: f32) -> f32 {
    x.min(1.0).max(0.0)
}

/// Position of a frequency on the octave, semitone and deviation gauges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalCoordinates {
    /// Octaves above C0, divided by 8 and clipped to `[0, 1]`.
    pub octave: f32,
    /// Position within the octave, in `[0, 1)`; each semitone is 1/12.
    pub semitone: f32,
    /// Position within the semitone, in `[0, 1)`.
    pub deviation: f32,
}

impl MusicalCoordinates {
    pub const NEUTRAL: Self = Self {
        octave: 0.5,
        semitone: 0.5,
        deviation: 0.5,
    };
}

/// Map a frequency to gauge coordinates relative to `reference_c0_hz`.
///
/// `semitone` is the position within the octave, and `deviation` the
/// position within the semitone. No pitch (or a non-positive frequency)
/// gives the neutral position.
pub fn to_musical_coordinates(frequency_hz: Option<f32>, reference_c0_hz: f64) -> MusicalCoordinates {
    let frequency = match frequency_hz {
        Some(f) if f > 0.0 => f as f64,
        _ => return MusicalCoordinates::NEUTRAL,
    };

    let raw_octave = (frequency / reference_c0_hz).log2() as f32;
    let semitone = mod1rd(raw_octave);
    MusicalCoordinates {
        octave: clip01(raw_octave / 8.0),
        semitone,
        deviation: mod1rd(12.0 * semitone),
    }
}

/// Map lag-0 autocorrelation energy (raw 16-bit sample units) to a
/// loudness needle position in `[0, 1]`.
pub fn to_loudness(energy: f32) -> f32 {
    if !(energy > 0.0) {
        return 0.0;
    }
    clip01((energy.log10() - 2.0) / 5.0)
}
