use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Default window for date-times when a bound is missing.
const DEFAULT_SPAN_DAYS: i64 = 365;

/// Uniform in `[min, max]`. Missing bounds fall back to the `f32` range so
/// every value survives a round trip through single precision consumers.
pub fn number<R: Rng + ?Sized>(rng: &mut R, min: Option<f64>, max: Option<f64>) -> f64 {
    let lo = min.unwrap_or(f32::MIN as f64);
    let hi = max.unwrap_or(f32::MAX as f64);
    // also catches NaN bounds
    if !(lo < hi) {
        return lo;
    }
    if (hi - lo).is_finite() {
        return rng.random_range(lo..=hi);
    }
    // the width overflows; scale by halves instead
    let u: f64 = rng.random_range(0.0..=1.0);
    (lo + (hi / 2.0 - lo / 2.0) * 2.0 * u).clamp(lo, hi)
}

/// Uniform over whole seconds in `[min, max]`. Without bounds the window is
/// the year ending at `now`; with one bound it is the year on the other side
/// of that bound.
pub fn date_time<R: Rng + ?Sized>(
    rng: &mut R,
    min: Option<DateTime<Utc>>,
    max: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let span = Duration::days(DEFAULT_SPAN_DAYS);
    let (lo, hi) = match (min, max) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, lo + span),
        (None, Some(hi)) => (hi - span, hi),
        (None, None) => (now - span, now),
    };
    let (lo_s, hi_s) = (lo.timestamp(), hi.timestamp());
    if lo_s >= hi_s {
        return lo;
    }
    let secs = rng.random_range(lo_s..=hi_s);
    DateTime::from_timestamp(secs, 0).unwrap_or(lo)
}
