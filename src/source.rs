use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::filter::RecordFilter;
use crate::models::{ProgressInput, ProgressRecord, Student};

/// Supplies student snapshots with their progress records attached.
///
/// Implementations may narrow the result with `filter`, but must return every
/// progress record of each student they return: class summaries classify
/// students on their full record set.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_students(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Student>>;

    async fn fetch_student(&self, id: Uuid) -> anyhow::Result<Option<Student>>;

    /// Inserts or overwrites the `(student, subject)` record. Returns `false`
    /// when the student does not exist.
    async fn record_progress(
        &self,
        student_id: Uuid,
        input: &ProgressInput,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
}

/// Keeps students in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    students: RwLock<Vec<Student>>,
}

impl MemorySource {
    pub fn new(students: Vec<Student>) -> Self {
        Self {
            students: RwLock::new(students),
        }
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch_students(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Student>> {
        let students = self
            .students
            .read()
            .map_err(|_| anyhow::anyhow!("student store lock poisoned"))?;
        Ok(students
            .iter()
            .filter(|s| filter.grade_matches(s.grade))
            .cloned()
            .collect())
    }

    async fn fetch_student(&self, id: Uuid) -> anyhow::Result<Option<Student>> {
        let students = self
            .students
            .read()
            .map_err(|_| anyhow::anyhow!("student store lock poisoned"))?;
        Ok(students.iter().find(|s| s.id == id).cloned())
    }

    async fn record_progress(
        &self,
        student_id: Uuid,
        input: &ProgressInput,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut students = self
            .students
            .write()
            .map_err(|_| anyhow::anyhow!("student store lock poisoned"))?;
        let Some(student) = students.iter_mut().find(|s| s.id == student_id) else {
            return Ok(false);
        };

        match student.progress.iter_mut().find(|r| r.subject == input.subject) {
            Some(record) => {
                apply_input(record, input);
                record.last_activity = now;
                record.updated_at = now;
            }
            None => {
                let mut record = ProgressRecord {
                    id: Uuid::new_v4(),
                    student_id,
                    subject: input.subject.clone(),
                    completion_percentage: 0.0,
                    performance_score: 0.0,
                    time_spent_minutes: 0,
                    assignment_completion_rate: 0.0,
                    assessment_score: 0.0,
                    last_activity: now,
                    created_at: now,
                    updated_at: now,
                };
                apply_input(&mut record, input);
                student.progress.push(record);
            }
        }
        Ok(true)
    }
}

fn apply_input(record: &mut ProgressRecord, input: &ProgressInput) {
    record.completion_percentage = input.completion_percentage;
    record.performance_score = input.performance_score;
    record.time_spent_minutes = input.time_spent_minutes;
    record.assignment_completion_rate = input.assignment_completion_rate;
    record.assessment_score = input.assessment_score;
}
