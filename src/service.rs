//! Request-level entry points: validate, fetch one snapshot, derive the view.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::dashboard::build_dashboard;
use crate::error::{AnalyticsError, Result};
use crate::export::{export_rows, to_csv};
use crate::filter::{validate_grade, RecordFilter};
use crate::models::{
    ClassSummary, DashboardSnapshot, ExportRow, GradeDistribution, Page, ProgressInput,
    ProgressRecord, Student, StudentView, TrendPoint,
};
use crate::source::RecordSource;
use crate::students::{list_students, progress_by_subject, StudentQuery};
use crate::summary::{grade_distribution, student_view, summarize};
use crate::trends::{build_trends, graded_records, Interval, TrendConfig};

#[derive(Clone)]
pub struct AnalyticsService {
    source: Arc<dyn RecordSource>,
    trend_config: TrendConfig,
}

impl AnalyticsService {
    pub fn new(source: Arc<dyn RecordSource>, trend_config: TrendConfig) -> Self {
        Self {
            source,
            trend_config,
        }
    }

    async fn snapshot(&self, filter: &RecordFilter, operation: &str) -> Result<Vec<Student>> {
        self.source.fetch_students(filter).await.map_err(|err| {
            error!(operation, error = %format!("{err:#}"), "record source failed");
            AnalyticsError::DataSource(err)
        })
    }

    #[instrument(skip(self))]
    pub async fn class_summary(
        &self,
        grade: Option<i32>,
        subject: Option<&str>,
    ) -> Result<ClassSummary> {
        validate_grade(grade)?;
        let filter = RecordFilter {
            grade,
            ..Default::default()
        };
        let students = self.snapshot(&filter, "class summary").await?;
        Ok(summarize(&students, grade, subject))
    }

    #[instrument(skip(self))]
    pub async fn progress_trends(
        &self,
        filter: &RecordFilter,
        interval: Interval,
    ) -> Result<Vec<TrendPoint>> {
        filter.validate()?;
        let students = self.snapshot(filter, "progress trends").await?;
        let records = graded_records(&students);
        let points = build_trends(&records, filter, interval, &self.trend_config);
        info!(buckets = points.len(), "built progress trends");
        Ok(points)
    }

    #[instrument(skip(self))]
    pub async fn export(&self, filter: &RecordFilter) -> Result<Vec<ExportRow>> {
        filter.validate()?;
        let students = self.snapshot(filter, "student export").await?;
        Ok(export_rows(&students, filter))
    }

    pub async fn export_csv(&self, filter: &RecordFilter) -> Result<String> {
        let rows = self.export(filter).await?;
        Ok(to_csv(&rows))
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self, as_of: DateTime<Utc>) -> Result<DashboardSnapshot> {
        let students = self.snapshot(&RecordFilter::default(), "dashboard").await?;
        Ok(build_dashboard(&students, as_of))
    }

    pub async fn grade_distribution(&self) -> Result<Vec<GradeDistribution>> {
        let students = self
            .snapshot(&RecordFilter::default(), "grade distribution")
            .await?;
        Ok(grade_distribution(&students))
    }

    #[instrument(skip(self))]
    pub async fn students(&self, query: &StudentQuery) -> Result<Page<StudentView>> {
        query.validate()?;
        let filter = RecordFilter {
            grade: query.grade,
            ..Default::default()
        };
        let students = self.snapshot(&filter, "student list").await?;
        Ok(list_students(&students, query))
    }

    pub async fn student(&self, id: Uuid) -> Result<StudentView> {
        Ok(student_view(&self.find_student(id).await?))
    }

    pub async fn student_progress(&self, id: Uuid) -> Result<Vec<ProgressRecord>> {
        Ok(progress_by_subject(&self.find_student(id).await?))
    }

    #[instrument(skip(self, input), fields(subject = %input.subject))]
    pub async fn record_progress(
        &self,
        student_id: Uuid,
        input: &ProgressInput,
        now: DateTime<Utc>,
    ) -> Result<()> {
        input.validate()?;
        let found = self
            .source
            .record_progress(student_id, input, now)
            .await
            .map_err(|err| {
                error!(%student_id, error = %format!("{err:#}"), "failed to record progress");
                AnalyticsError::DataSource(err)
            })?;
        if !found {
            return Err(AnalyticsError::NotFound(student_id));
        }
        info!(%student_id, "progress recorded");
        Ok(())
    }

    async fn find_student(&self, id: Uuid) -> Result<Student> {
        self.source
            .fetch_student(id)
            .await
            .map_err(|err| {
                error!(%id, error = %format!("{err:#}"), "failed to fetch student");
                AnalyticsError::DataSource(err)
            })?
            .ok_or(AnalyticsError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PerformanceLevel;
    use crate::source::MemorySource;
    use crate::testing::{add_record, at, student};
    use async_trait::async_trait;

    struct FailingSource;

    #[async_trait]
    impl RecordSource for FailingSource {
        async fn fetch_students(&self, _: &RecordFilter) -> anyhow::Result<Vec<Student>> {
            anyhow::bail!("connection refused")
        }

        async fn fetch_student(&self, _: Uuid) -> anyhow::Result<Option<Student>> {
            anyhow::bail!("connection refused")
        }

        async fn record_progress(
            &self,
            _: Uuid,
            _: &ProgressInput,
            _: DateTime<Utc>,
        ) -> anyhow::Result<bool> {
            anyhow::bail!("connection refused")
        }
    }

    fn service_with(students: Vec<Student>) -> AnalyticsService {
        AnalyticsService::new(
            Arc::new(MemorySource::new(students)),
            TrendConfig::default(),
        )
    }

    fn class() -> Vec<Student> {
        let mut ada = student("Ada Park", 3);
        add_record(&mut ada, "Math", 85.0);
        let mut ben = student("Ben Ortiz", 3);
        add_record(&mut ben, "Math", 55.0);
        let mut cy = student("Cy Lane", 9);
        add_record(&mut cy, "Science", 65.0);
        vec![ada, ben, cy]
    }

    #[tokio::test]
    async fn class_summary_for_a_grade() {
        let service = service_with(class());
        let summary = service.class_summary(Some(3), None).await.unwrap();
        assert_eq!(summary.total_students, 2);
        assert_eq!(summary.performance_levels[&PerformanceLevel::Advanced], 1);
        assert_eq!(summary.performance_levels[&PerformanceLevel::Struggling], 1);
        assert_eq!(summary.subject_summaries["Math"].avg_performance, 70.0);
    }

    #[tokio::test]
    async fn validation_happens_before_fetching() {
        let service = AnalyticsService::new(Arc::new(FailingSource), TrendConfig::default());

        let err = service.class_summary(Some(13), None).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::BadRequest(_)));

        let filter = RecordFilter {
            start: Some(at(2025, 5, 1)),
            end: Some(at(2025, 4, 1)),
            ..Default::default()
        };
        let err = service
            .progress_trends(&filter, Interval::Weekly)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn source_failures_surface_as_data_source_errors() {
        let service = AnalyticsService::new(Arc::new(FailingSource), TrendConfig::default());
        let err = service.dashboard(at(2025, 5, 1)).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::DataSource(_)));
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn export_csv_contains_one_line_per_record() {
        let service = service_with(class());
        let csv = service.export_csv(&RecordFilter::default()).await.unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("\"Ada Park\",\"3\",\"Math\","));
    }

    #[tokio::test]
    async fn record_progress_then_read_it_back() {
        let students = class();
        let id = students[2].id;
        let service = service_with(students);
        let input = ProgressInput {
            subject: "Art".to_string(),
            completion_percentage: 10.0,
            performance_score: 95.0,
            time_spent_minutes: 5,
            assignment_completion_rate: 20.0,
            assessment_score: 30.0,
        };

        service
            .record_progress(id, &input, at(2025, 6, 1))
            .await
            .unwrap();
        let progress = service.student_progress(id).await.unwrap();
        let subjects: Vec<_> = progress.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, ["Art", "Science"]);

        let view = service.student(id).await.unwrap();
        assert_eq!(view.overall_performance, 80.0);
        assert_eq!(view.last_activity, at(2025, 6, 1));

        let missing = service
            .record_progress(Uuid::new_v4(), &input, at(2025, 6, 1))
            .await
            .unwrap_err();
        assert_eq!(missing.status_code(), 404);
    }

    #[tokio::test]
    async fn student_listing_is_paged() {
        let service = service_with(class());
        let page = service
            .students(&StudentQuery {
                page_size: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.items.len(), 2);

        let err = service
            .students(&StudentQuery {
                page_size: 500,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
