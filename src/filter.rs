use chrono::{DateTime, Utc};

use crate::error::{AnalyticsError, Result};

pub const MIN_GRADE: i32 = 1;
pub const MAX_GRADE: i32 = 12;

/// Grade, subject and creation-date restrictions shared by the record source
/// and the derived views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub grade: Option<i32>,
    pub subject: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn validate(&self) -> Result<()> {
        validate_grade(self.grade)?;
        validate_range(self.start, self.end)
    }

    /// The subject filter, with an empty string meaning "no filter".
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref().filter(|s| !s.is_empty())
    }

    pub fn grade_matches(&self, grade: i32) -> bool {
        self.grade.map_or(true, |wanted| wanted == grade)
    }

    pub fn subject_matches(&self, subject: &str) -> bool {
        self.subject().map_or(true, |wanted| eq_ignore_case(subject, wanted))
    }

    pub fn subject_matches_exact(&self, subject: &str) -> bool {
        self.subject().map_or(true, |wanted| subject == wanted)
    }

    /// Inclusive on both bounds.
    pub fn in_range(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

pub fn validate_grade(grade: Option<i32>) -> Result<()> {
    match grade {
        Some(g) if !(MIN_GRADE..=MAX_GRADE).contains(&g) => Err(AnalyticsError::bad_request(
            format!("Grade must be between {MIN_GRADE} and {MAX_GRADE}"),
        )),
        _ => Ok(()),
    }
}

pub fn validate_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(AnalyticsError::bad_request(
            "Start date cannot be greater than end date",
        )),
        _ => Ok(()),
    }
}

pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
