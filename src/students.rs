use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{AnalyticsError, Result};
use crate::filter::{eq_ignore_case, validate_grade, validate_range};
use crate::models::{Page, ProgressInput, ProgressRecord, Student, StudentView};
use crate::summary::student_view;

pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_SUBJECT_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Grade,
    Progress,
    LastActivity,
}

impl SortKey {
    /// Case-insensitive; anything unrecognised sorts by name.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "grade" => SortKey::Grade,
            "progress" => SortKey::Progress,
            "lastactivity" => SortKey::LastActivity,
            _ => SortKey::Name,
        }
    }

    fn compare(self, a: &StudentView, b: &StudentView) -> Ordering {
        match self {
            SortKey::Name => a.full_name.cmp(&b.full_name),
            SortKey::Grade => a.grade.cmp(&b.grade),
            SortKey::Progress => b
                .overall_completion
                .partial_cmp(&a.overall_completion)
                .unwrap_or(Ordering::Equal),
            SortKey::LastActivity => b.last_activity.cmp(&a.last_activity),
        }
    }
}

impl FromStr for SortKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(SortKey::parse(s))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentQuery {
    pub grade: Option<i32>,
    pub subject: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub page_number: usize,
    pub page_size: usize,
    pub sort: SortKey,
}

impl Default for StudentQuery {
    fn default() -> Self {
        Self {
            grade: None,
            subject: None,
            start: None,
            end: None,
            search: None,
            page_number: 1,
            page_size: 10,
            sort: SortKey::Name,
        }
    }
}

impl StudentQuery {
    pub fn validate(&self) -> Result<()> {
        validate_grade(self.grade)?;
        validate_range(self.start, self.end)?;
        if self.page_number < 1 {
            return Err(AnalyticsError::bad_request("Page number must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(AnalyticsError::bad_request(format!(
                "Page size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    fn matches(&self, student: &Student) -> bool {
        if self.grade.map_or(false, |g| g != student.grade) {
            return false;
        }
        let progress = &student.progress;
        if let Some(subject) = self.subject.as_deref().filter(|s| !s.is_empty()) {
            if !progress.iter().any(|r| eq_ignore_case(&r.subject, subject)) {
                return false;
            }
        }
        if let Some(start) = self.start {
            if !progress.iter().any(|r| r.last_activity >= start) {
                return false;
            }
        }
        if let Some(end) = self.end {
            if !progress.iter().any(|r| r.last_activity <= end) {
                return false;
            }
        }
        if let Some(term) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let term = term.to_lowercase();
            return student.full_name.to_lowercase().contains(&term)
                || student.email.to_lowercase().contains(&term);
        }
        true
    }
}

/// Filters, sorts and pages the student directory. Callers validate the
/// query first.
pub fn list_students(students: &[Student], query: &StudentQuery) -> Page<StudentView> {
    let mut views: Vec<StudentView> = students
        .iter()
        .filter(|s| query.matches(s))
        .map(student_view)
        .collect();
    views.sort_by(|a, b| query.sort.compare(a, b));

    let total_count = views.len();
    let items = views
        .into_iter()
        .skip(
            query
                .page_number
                .saturating_sub(1)
                .saturating_mul(query.page_size),
        )
        .take(query.page_size)
        .collect();

    Page {
        items,
        total_count,
        page_number: query.page_number,
        page_size: query.page_size,
    }
}

/// A student's records ordered by subject.
pub fn progress_by_subject(student: &Student) -> Vec<ProgressRecord> {
    let mut records = student.progress.clone();
    records.sort_by(|a, b| a.subject.cmp(&b.subject));
    records
}

impl ProgressInput {
    pub fn validate(&self) -> Result<()> {
        let subject = self.subject.trim();
        if subject.is_empty() {
            return Err(AnalyticsError::bad_request("Subject is required"));
        }
        if subject.chars().count() > MAX_SUBJECT_LEN {
            return Err(AnalyticsError::bad_request(format!(
                "Subject must be at most {MAX_SUBJECT_LEN} characters"
            )));
        }
        for (name, value) in [
            ("CompletionPercentage", self.completion_percentage),
            ("PerformanceScore", self.performance_score),
            ("AssignmentCompletionRate", self.assignment_completion_rate),
            ("AssessmentScore", self.assessment_score),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(AnalyticsError::bad_request(format!(
                    "{name} must be between 0 and 100"
                )));
            }
        }
        if self.time_spent_minutes < 0 {
            return Err(AnalyticsError::bad_request(
                "TimeSpentMinutes must not be negative",
            ));
        }
        Ok(())
    }
}
