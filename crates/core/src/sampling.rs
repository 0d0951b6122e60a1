/// Upper bound on frames sampled from one video.
pub const MAX_SAMPLES: usize = 1_000_000;

/// Timestamps to sample for a video of `duration` seconds: `0, interval,
/// 2 * interval, …` up to and including the last multiple `<= duration`.
///
/// Each timestamp is `i * interval`, so long videos do not accumulate
/// floating point drift. Returns an empty list for a non-finite duration, a
/// non-positive interval, or more than [`MAX_SAMPLES`] frames.
pub fn sample_timestamps(duration: f64, interval: f64) -> Vec<f64> {
    if !duration.is_finite() || !interval.is_finite() || interval <= 0.0 {
        return Vec::new();
    }

    let duration = duration.max(0.0);
    let steps = (duration / interval).floor();
    if !steps.is_finite() || steps >= MAX_SAMPLES as f64 {
        return Vec::new();
    }
    let count = steps as usize + 1;

    (0..count)
        .map(|i| i as f64 * interval)
        .filter(|t| *t <= duration)
        .collect()
}
