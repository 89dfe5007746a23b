//! Time-domain autocorrelation and first-peak frequency estimation.

/// Accumulate the normalized autocorrelation of `history` into `ac`.
///
/// For each lag `i < lags`, adds the mean product of the newest
/// `history.len() - lags` samples with the same span shifted `i` samples
/// into the past. Pass a zeroed `ac` for a fresh estimate, or keep adding to
/// integrate over several windows.
///
/// # Panics
/// If `history` is not longer than `lags`, or `ac` is shorter than `lags`.
pub fn autocorrelate(history: &[f32], lags: usize, ac: &mut [f32]) {
    let nf = history.len();
    assert!(nf > lags, "history of {} samples must exceed {} lags", nf, lags);
    assert!(ac.len() >= lags, "{} lags do not fit {} outputs", lags, ac.len());

    let span = nf - lags;
    let recent = &history[lags..];
    let scale = 1.0 / span as f32;

    for (i, out) in ac[..lags].iter_mut().enumerate() {
        *out += dot(recent, &history[lags - i..nf - i]) * scale;
    }
}

/// Dot product over four independent accumulators so the loop vectorizes.
fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let a_chunks = a.chunks_exact(4);
    let b_chunks = b.chunks_exact(4);
    let tail: f32 = a_chunks
        .remainder()
        .iter()
        .zip(b_chunks.remainder())
        .map(|(x, y)| x * y)
        .sum();

    let mut lanes = [0.0f32; 4];
    for (x, y) in a_chunks.zip(b_chunks) {
        for k in 0..4 {
            lanes[k] += x[k] * y[k];
        }
    }
    lanes.iter().sum::<f32>() + tail
}

/// Frequency of the first strong periodicity peak in `ac`, or None.
///
/// The scan skips the lobe around lag 0 (up to the first negative value),
/// then brackets the first peak by where it rises above and falls back
/// below `threshold * ac[0]`. A parabola through the bracket centre and its
/// two half-width neighbours refines the lag below one sample.
///
/// The first bracket is used rather than the global maximum: later
/// subharmonic peaks can be as tall as the fundamental's.
pub fn estimate_frequency(ac: &[f32], sample_rate_hz: u32, threshold: f32) -> Option<f32> {
    let n = ac.len();
    let energy = *ac.first()?;
    if !(energy > 0.0) {
        return None;
    }
    let level = threshold * energy;

    let mut i = 1;
    while i < n && ac[i] >= 0.0 {
        i += 1;
    }
    while i < n && ac[i] <= level {
        i += 1;
    }
    if i >= n {
        return None;
    }
    let start = i;

    while i < n && ac[i] >= level {
        i += 1;
    }
    if i >= n {
        return None;
    }
    let end = i;

    let j = (start + end) / 2;
    let dj = ((end - start) / 2).max(1);
    let lag = j as f32 + dj as f32 * parabolic_vertex(ac[j - dj], ac[j], ac[j + dj]);

    // A lag under two samples would be above Nyquist.
    if lag < 2.0 {
        return None;
    }
    Some(sample_rate_hz as f32 / lag)
}

/// Vertex offset of the parabola through `(-1, a)`, `(0, b)`, `(1, c)`,
/// clamped to `[-1, 1]`. Zero if the points do not form a maximum.
pub fn parabolic_vertex(a: f32, b: f32, c: f32) -> f32 {
    let curvature = a + c - 2.0 * b;
    if curvature >= 0.0 {
        return 0.0;
    }
    ((a - c) / (2.0 * curvature)).clamp(-1.0, 1.0)
}
