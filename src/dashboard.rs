use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::classify::{average, round2};
use crate::models::{DashboardSnapshot, ProgressRecord, Student, TopPerformer};

pub const ACTIVE_WINDOW_DAYS: i64 = 7;
pub const RECENT_WINDOW_DAYS: i64 = 30;
pub const TOP_PERFORMER_LIMIT: usize = 5;

pub fn cutoff(as_of: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    as_of - Duration::days(days)
}

pub fn build_dashboard(students: &[Student], as_of: DateTime<Utc>) -> DashboardSnapshot {
    let records: Vec<&ProgressRecord> = students.iter().flat_map(|s| s.progress.iter()).collect();

    let active_since = cutoff(as_of, ACTIVE_WINDOW_DAYS);
    let active: HashSet<_> = records
        .iter()
        .filter(|r| r.last_activity >= active_since)
        .map(|r| r.student_id)
        .collect();

    let recent_since = cutoff(as_of, RECENT_WINDOW_DAYS);
    let recent: Vec<&ProgressRecord> = records
        .iter()
        .copied()
        .filter(|r| r.created_at >= recent_since)
        .collect();

    DashboardSnapshot {
        total_students: students.len(),
        active_students: active.len(),
        avg_performance: round2(average(recent.iter().map(|r| r.performance_score))),
        avg_completion: round2(average(recent.iter().map(|r| r.completion_percentage))),
        top_performers: top_performers(students, TOP_PERFORMER_LIMIT),
        generated_at: as_of,
    }
}

/// Students ranked by their own average performance, highest first. The sort
/// is stable, so equal averages keep input order.
pub fn top_performers(students: &[Student], limit: usize) -> Vec<TopPerformer> {
    let mut ranked: Vec<(&Student, f64)> = students
        .iter()
        .map(|s| (s, average(s.progress.iter().map(|r| r.performance_score))))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    ranked
        .into_iter()
        .take(limit)
        .map(|(student, avg)| TopPerformer {
            student_name: student.full_name.clone(),
            grade: student.grade,
            avg_performance: round2(avg),
        })
        .collect()
}
