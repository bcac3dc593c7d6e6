//! Sliding-window trajectory smoothing.
//!
//! Used only to visually de-jitter a rendered course line; the underlying
//! plot history is never mutated.

/// A time-stamped geographic sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lng: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: f64,
}

/// Centered moving average over lat, lng and timestamp independently.
///
/// The window is clamped at the sequence boundaries (asymmetric at the
/// ends). Sequences no longer than the window are returned unchanged.
/// Deterministic and pure.
pub fn smooth_path(points: &[TrackPoint], window_size: usize) -> Vec<TrackPoint> {
    if points.len() <= window_size {
        return points.to_vec();
    }

    let half = window_size / 2;
    let mut smoothed = Vec::with_capacity(points.len());

    for i in 0..points.len() {
        let start = i.saturating_sub(half);
        let end = (i + half).min(points.len() - 1);
        let slice = &points[start..=end];
        let n = slice.len() as f64;

        smoothed.push(TrackPoint {
            lat: slice.iter().map(|p| p.lat).sum::<f64>() / n,
            lng: slice.iter().map(|p| p.lng).sum::<f64>() / n,
            timestamp_ms: slice.iter().map(|p| p.timestamp_ms).sum::<f64>() / n,
        });
    }

    smoothed
}
