//! Fixture builders shared by the unit tests.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::models::{ProgressRecord, Student};

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap()
}

pub fn student(name: &str, grade: i32) -> Student {
    let created = at(2024, 9, 1);
    Student {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        grade,
        email: format!("{}@school.test", name.to_lowercase().replace(' ', ".")),
        assigned_teacher_id: "teacher-1".to_string(),
        created_at: created,
        updated_at: created,
        progress: Vec::new(),
    }
}

pub fn record(student: &Student, subject: &str, performance: f64) -> ProgressRecord {
    let created = at(2025, 3, 3);
    ProgressRecord {
        id: Uuid::new_v4(),
        student_id: student.id,
        subject: subject.to_string(),
        completion_percentage: 50.0,
        performance_score: performance,
        time_spent_minutes: 30,
        assignment_completion_rate: 75.0,
        assessment_score: performance,
        last_activity: created,
        created_at: created,
        updated_at: created,
    }
}

/// Attaches a record for `subject` to `student` and returns it for tweaking.
pub fn add_record<'a>(
    student: &'a mut Student,
    subject: &str,
    performance: f64,
) -> &'a mut ProgressRecord {
    let record = record(student, subject, performance);
    student.progress.push(record);
    student.progress.last_mut().unwrap()
}
