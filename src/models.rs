use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub subject: String,
    pub completion_percentage: f64,
    pub performance_score: f64,
    pub time_spent_minutes: i64,
    pub assignment_completion_rate: f64,
    pub assessment_score: f64,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub grade: i32,
    pub email: String,
    pub assigned_teacher_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: Vec<ProgressRecord>,
}

/// Payload of the progress-update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInput {
    pub subject: String,
    pub completion_percentage: f64,
    pub performance_score: f64,
    pub time_spent_minutes: i64,
    pub assignment_completion_rate: f64,
    pub assessment_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PerformanceLevel {
    Advanced,
    OnTrack,
    Struggling,
}

impl PerformanceLevel {
    pub fn all() -> [PerformanceLevel; 3] {
        [
            PerformanceLevel::Advanced,
            PerformanceLevel::OnTrack,
            PerformanceLevel::Struggling,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub subject: String,
    pub student_count: usize,
    pub avg_completion: f64,
    pub avg_performance: f64,
    pub total_time_spent_minutes: i64,
    pub avg_assignment_completion_rate: f64,
    pub avg_assessment_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub total_students: usize,
    pub grade: Option<i32>,
    pub avg_completion: f64,
    pub avg_performance: f64,
    pub total_time_spent_minutes: i64,
    pub subject_summaries: BTreeMap<String, SubjectSummary>,
    pub performance_levels: BTreeMap<PerformanceLevel, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeDistribution {
    pub grade: i32,
    pub student_count: usize,
    pub avg_completion: f64,
    pub avg_performance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub bucket_start_date: DateTime<Utc>,
    /// Week-numbering year and week of a weekly bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_number: Option<u32>,
    pub avg_completion: f64,
    pub avg_performance: f64,
    pub active_student_count: usize,
    pub subject_performance: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub student_name: String,
    pub grade: i32,
    pub avg_performance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub total_students: usize,
    pub active_students: usize,
    pub avg_performance: f64,
    pub avg_completion: f64,
    pub top_performers: Vec<TopPerformer>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub student_name: String,
    pub grade: i32,
    pub subject: String,
    pub completion_percentage: f64,
    pub performance_score: f64,
    pub time_spent_minutes: i64,
    pub assignment_completion_rate: f64,
    pub assessment_score: f64,
    pub last_activity: DateTime<Utc>,
}

/// A student together with the fields derived from its progress records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub id: Uuid,
    pub full_name: String,
    pub grade: i32,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: Vec<ProgressRecord>,
    pub overall_completion: f64,
    pub overall_performance: f64,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page_number: usize,
    pub page_size: usize,
}
