use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::filter::RecordFilter;
use crate::models::{ProgressInput, ProgressRecord, Student};
use crate::source::RecordSource;

const STUDENT_COLUMNS: &str =
    "id, full_name, grade, email, assigned_teacher_id, created_at, updated_at";
const PROGRESS_COLUMNS: &str = "id, student_id, subject, completion_percentage, \
     performance_score, time_spent_minutes, assignment_completion_rate, assessment_score, \
     last_activity, created_at, updated_at";

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Record source backed by the `progress_tracker` schema.
#[derive(Debug, Clone)]
pub struct PgRecordSource {
    pool: PgPool,
}

impl PgRecordSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_progress(&self, rows: Vec<PgRow>) -> anyhow::Result<Vec<Student>> {
        let mut students = rows
            .iter()
            .map(student_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        if students.is_empty() {
            return Ok(students);
        }

        let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
        let query = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress_tracker.progress \
             WHERE student_id = ANY($1) ORDER BY subject"
        );
        let progress_rows = sqlx::query(&query)
            .bind(&ids[..])
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch progress records")?;

        let mut by_student: HashMap<Uuid, Vec<ProgressRecord>> = HashMap::new();
        for row in progress_rows.iter() {
            let record = progress_from_row(row)?;
            by_student.entry(record.student_id).or_default().push(record);
        }
        for student in students.iter_mut() {
            student.progress = by_student.remove(&student.id).unwrap_or_default();
        }

        Ok(students)
    }
}

/// Only the grade restriction is pushed into SQL; subject and date filters
/// are left to the views so that each student keeps all of their records.
#[async_trait]
impl RecordSource for PgRecordSource {
    async fn fetch_students(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Student>> {
        let mut query = format!("SELECT {STUDENT_COLUMNS} FROM progress_tracker.students");
        if filter.grade.is_some() {
            query.push_str(" WHERE grade = $1");
        }
        query.push_str(" ORDER BY full_name");

        let mut rows = sqlx::query(&query);
        if let Some(grade) = filter.grade {
            rows = rows.bind(grade);
        }

        let rows = rows
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch students")?;
        let students = self.attach_progress(rows).await?;
        debug!(students = students.len(), grade = ?filter.grade, "fetched student snapshot");
        Ok(students)
    }

    async fn fetch_student(&self, id: Uuid) -> anyhow::Result<Option<Student>> {
        let query = format!("SELECT {STUDENT_COLUMNS} FROM progress_tracker.students WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to fetch student {id}"))?;

        match row {
            Some(row) => Ok(self.attach_progress(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn record_progress(
        &self,
        student_id: Uuid,
        input: &ProgressInput,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM progress_tracker.students WHERE id = $1)",
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Ok(false);
        }

        upsert_progress(&self.pool, student_id, input, now, now).await?;
        Ok(true)
    }
}

async fn upsert_progress(
    pool: &PgPool,
    student_id: Uuid,
    input: &ProgressInput,
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO progress_tracker.progress
        (id, student_id, subject, completion_percentage, performance_score, time_spent_minutes,
         assignment_completion_rate, assessment_score, last_activity, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
        ON CONFLICT (student_id, subject) DO UPDATE
        SET completion_percentage = EXCLUDED.completion_percentage,
            performance_score = EXCLUDED.performance_score,
            time_spent_minutes = EXCLUDED.time_spent_minutes,
            assignment_completion_rate = EXCLUDED.assignment_completion_rate,
            assessment_score = EXCLUDED.assessment_score,
            last_activity = EXCLUDED.last_activity,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(&input.subject)
    .bind(input.completion_percentage)
    .bind(input.performance_score)
    .bind(input.time_spent_minutes)
    .bind(input.assignment_completion_rate)
    .bind(input.assessment_score)
    .bind(last_activity)
    .bind(now)
    .execute(pool)
    .await
    .with_context(|| format!("failed to record {} progress for {student_id}", input.subject))?;
    Ok(())
}

async fn upsert_student(
    pool: &PgPool,
    full_name: &str,
    grade: i32,
    email: &str,
    teacher: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO progress_tracker.students (id, full_name, grade, email, assigned_teacher_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            grade = EXCLUDED.grade,
            assigned_teacher_id = EXCLUDED.assigned_teacher_id,
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(grade)
    .bind(email)
    .bind(teacher)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

fn student_from_row(row: &PgRow) -> sqlx::Result<Student> {
    Ok(Student {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        grade: row.try_get("grade")?,
        email: row.try_get("email")?,
        assigned_teacher_id: row.try_get("assigned_teacher_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        progress: Vec::new(),
    })
}

fn progress_from_row(row: &PgRow) -> sqlx::Result<ProgressRecord> {
    Ok(ProgressRecord {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject: row.try_get("subject")?,
        completion_percentage: row.try_get("completion_percentage")?,
        performance_score: row.try_get("performance_score")?,
        time_spent_minutes: row.try_get("time_spent_minutes")?,
        assignment_completion_rate: row.try_get("assignment_completion_rate")?,
        assessment_score: row.try_get("assessment_score")?,
        last_activity: row.try_get("last_activity")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = [
        ("Avery Lee", 3, "avery.lee@school.example", "teacher1@school.example"),
        ("Jules Moreno", 3, "jules.moreno@school.example", "teacher1@school.example"),
        ("Kiara Patel", 5, "kiara.patel@school.example", "teacher2@school.example"),
        ("Noah Brooks", 8, "noah.brooks@school.example", "teacher3@school.example"),
        ("Mina Sato", 8, "mina.sato@school.example", "teacher3@school.example"),
    ];
    let subjects = ["Math", "Reading", "Science", "Social Studies"];
    let now = Utc::now();

    for (i, (name, grade, email, teacher)) in students.into_iter().enumerate() {
        let student_id = upsert_student(pool, name, grade, email, teacher).await?;

        for (j, subject) in subjects.iter().enumerate() {
            // Spread scores and activity so every level and several weeks show up.
            let spread = ((i * 17 + j * 11) % 45) as f64;
            let input = ProgressInput {
                subject: subject.to_string(),
                completion_percentage: 50.0 + spread,
                performance_score: 45.0 + spread + (i as f64) * 2.5,
                time_spent_minutes: 60 + (i * 40 + j * 25) as i64,
                assignment_completion_rate: 55.0 + spread * 0.8,
                assessment_score: 48.0 + spread,
            };
            let last_activity = now - Duration::days(((i + j) * 3) as i64);
            upsert_progress(pool, student_id, &input, last_activity, last_activity).await?;
        }
    }

    info!(students = students.len(), "seed data inserted");
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        grade: i32,
        assigned_teacher_id: String,
        subject: String,
        completion_percentage: f64,
        performance_score: f64,
        time_spent_minutes: i64,
        assignment_completion_rate: f64,
        assessment_score: f64,
        last_activity: Option<DateTime<Utc>>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;
    let now = Utc::now();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        crate::filter::validate_grade(Some(row.grade))
            .with_context(|| format!("row {}", line + 1))?;
        let input = ProgressInput {
            subject: row.subject,
            completion_percentage: row.completion_percentage,
            performance_score: row.performance_score,
            time_spent_minutes: row.time_spent_minutes,
            assignment_completion_rate: row.assignment_completion_rate,
            assessment_score: row.assessment_score,
        };
        input
            .validate()
            .with_context(|| format!("row {}", line + 1))?;

        let student_id = upsert_student(
            pool,
            &row.full_name,
            row.grade,
            &row.email,
            &row.assigned_teacher_id,
        )
        .await?;
        upsert_progress(pool, student_id, &input, row.last_activity.unwrap_or(now), now).await?;
        imported += 1;
    }

    Ok(imported)
}
