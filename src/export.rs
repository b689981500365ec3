use std::fmt::Write;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::filter::RecordFilter;
use crate::models::{ExportRow, Student};

pub const CSV_HEADER: &str = "StudentName,Grade,Subject,CompletionPercentage,PerformanceScore,TimeSpentMinutes,AssignmentCompletionRate,AssessmentScore,LastActivity";
pub const CSV_CONTENT_TYPE: &str = "text/csv";
pub const LAST_ACTIVITY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Flattens every student's progress into export rows, ordered by student
/// name and then subject. Unlike the summary and trend views, the subject
/// filter here is an exact, case-sensitive match.
pub fn export_rows(students: &[Student], filter: &RecordFilter) -> Vec<ExportRow> {
    let mut rows: Vec<ExportRow> = students
        .iter()
        .filter(|s| filter.grade_matches(s.grade))
        .flat_map(|s| {
            s.progress
                .iter()
                .filter(move |r| filter.subject_matches_exact(&r.subject) && filter.in_range(r.created_at))
                .map(move |r| ExportRow {
                    student_name: s.full_name.clone(),
                    grade: s.grade,
                    subject: r.subject.clone(),
                    completion_percentage: r.completion_percentage,
                    performance_score: r.performance_score,
                    time_spent_minutes: r.time_spent_minutes,
                    assignment_completion_rate: r.assignment_completion_rate,
                    assessment_score: r.assessment_score,
                    last_activity: r.last_activity,
                })
        })
        .collect();

    rows.sort_by(|a, b| {
        a.student_name
            .cmp(&b.student_name)
            .then_with(|| a.subject.cmp(&b.subject))
    });
    rows
}

pub fn to_csv(rows: &[ExportRow]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{CSV_HEADER}");

    for row in rows {
        let _ = writeln!(
            output,
            "{},{},{},{},{},{},{},{},{}",
            quoted(&row.student_name),
            quoted(&row.grade.to_string()),
            quoted(&row.subject),
            row.completion_percentage,
            row.performance_score,
            row.time_spent_minutes,
            row.assignment_completion_rate,
            row.assessment_score,
            row.last_activity.format(LAST_ACTIVITY_FORMAT)
        );
    }

    output
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Reads rows written by [`to_csv`] back.
pub fn parse_csv(text: &str) -> anyhow::Result<Vec<ExportRow>> {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct CsvRow {
        student_name: String,
        grade: i32,
        subject: String,
        completion_percentage: f64,
        performance_score: f64,
        time_spent_minutes: i64,
        assignment_completion_rate: f64,
        assessment_score: f64,
        last_activity: String,
    }

    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut rows = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let last_activity = NaiveDateTime::parse_from_str(&row.last_activity, LAST_ACTIVITY_FORMAT)
            .with_context(|| format!("invalid LastActivity '{}'", row.last_activity))?
            .and_utc();
        rows.push(ExportRow {
            student_name: row.student_name,
            grade: row.grade,
            subject: row.subject,
            completion_percentage: row.completion_percentage,
            performance_score: row.performance_score,
            time_spent_minutes: row.time_spent_minutes,
            assignment_completion_rate: row.assignment_completion_rate,
            assessment_score: row.assessment_score,
            last_activity,
        });
    }

    Ok(rows)
}

pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("student_progress_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
