use crate::models::{PerformanceLevel, ProgressRecord};

pub const ADVANCED_THRESHOLD: f64 = 80.0;
pub const ON_TRACK_THRESHOLD: f64 = 60.0;

/// Maps an average performance score to a level. A student without any
/// progress records (`None`) is treated as struggling.
pub fn classify(avg_performance: Option<f64>) -> PerformanceLevel {
    match avg_performance {
        Some(score) if score >= ADVANCED_THRESHOLD => PerformanceLevel::Advanced,
        Some(score) if score >= ON_TRACK_THRESHOLD => PerformanceLevel::OnTrack,
        _ => PerformanceLevel::Struggling,
    }
}

pub fn classify_records(records: &[ProgressRecord]) -> PerformanceLevel {
    if records.is_empty() {
        return classify(None);
    }
    classify(Some(average(records.iter().map(|r| r.performance_score))))
}

/// Arithmetic mean; an empty input averages to 0.
pub fn average<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Rounds half away from zero to two decimal places. Ties are decided on the
/// binary value, so a literal such as `1.005` (stored just below the tie)
/// rounds down to `1.0`.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
