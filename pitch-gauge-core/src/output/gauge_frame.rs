use crate::models::pitch::GaugeReading;
use crate::processing::musical::clip01;

/// Channel index lives in the top three bits of each leading byte.
const INDEX_POS: u32 = 5;
const WIDE_MAX: f32 = ((1 << 10) - 1) as f32;
const NARROW_MAX: f32 = ((1 << 5) - 1) as f32;

const OCTAVE_CHANNEL: u8 = 1;
const LOUDNESS_CHANNEL: u8 = 2;
const SEMITONE_CHANNEL: u8 = 4;
const DEVIATION_CHANNEL: u8 = 5;

/// Bytes per gauge update.
pub const FRAME_LEN: usize = 7;

/// Wire message for the gauge driver board.
///
/// ```text
/// [1|oct hi] [oct lo] [2|loud hi] [loud lo] [5|dev hi] [dev lo] [4|semi]
/// ```
///
/// Octave, loudness and deviation are 10-bit values split across two bytes;
/// semitone is a single 5-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeFrame(pub [u8; FRAME_LEN]);

impl GaugeFrame {
    pub fn encode(reading: &GaugeReading) -> Self {
        let octave = scale(reading.octave, WIDE_MAX);
        let loudness = scale(reading.loudness, WIDE_MAX);
        let deviation = scale(reading.deviation, WIDE_MAX);
        let semitone = scale(reading.semitone, NARROW_MAX);

        let [oct_hi, oct_lo] = wide(OCTAVE_CHANNEL, octave);
        let [loud_hi, loud_lo] = wide(LOUDNESS_CHANNEL, loudness);
        let [dev_hi, dev_lo] = wide(DEVIATION_CHANNEL, deviation);

        Self([
            oct_hi,
            oct_lo,
            loud_hi,
            loud_lo,
            dev_hi,
            dev_lo,
            (SEMITONE_CHANNEL << INDEX_POS) | semitone as u8,
        ])
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

/// Truncating conversion, as the driver board expects.
fn scale(value: f32, max: f32) -> u16 {
    (clip01(value) * max) as u16
}

fn wide(channel: u8, value: u16) -> [u8; 2] {
    [(channel << INDEX_POS) | (value >> 8) as u8, value as u8]
}
