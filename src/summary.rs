use std::collections::{BTreeMap, HashSet};

use crate::classify::{average, classify_records, round2};
use crate::filter::eq_ignore_case;
use crate::models::{
    ClassSummary, GradeDistribution, PerformanceLevel, ProgressRecord, Student, StudentView,
    SubjectSummary,
};

/// Builds the class-level summary for the students in `grade` (all grades when
/// `None`). The subject filter only narrows the records that feed the averages;
/// performance levels always use every record a student has.
pub fn summarize(students: &[Student], grade: Option<i32>, subject: Option<&str>) -> ClassSummary {
    let subject = subject.filter(|s| !s.is_empty());
    let filtered: Vec<&Student> = students
        .iter()
        .filter(|s| grade.map_or(true, |g| s.grade == g))
        .collect();

    let records: Vec<&ProgressRecord> = filtered
        .iter()
        .flat_map(|s| s.progress.iter())
        .filter(|r| subject.map_or(true, |wanted| eq_ignore_case(&r.subject, wanted)))
        .collect();

    let mut by_subject: BTreeMap<String, Vec<&ProgressRecord>> = BTreeMap::new();
    for record in records.iter().copied() {
        by_subject
            .entry(record.subject.clone())
            .or_default()
            .push(record);
    }

    let subject_summaries = by_subject
        .into_iter()
        .map(|(subject, group)| {
            let summary = summarize_subject(&subject, &group);
            (subject, summary)
        })
        .collect();

    ClassSummary {
        total_students: filtered.len(),
        grade,
        avg_completion: round2(average(records.iter().map(|r| r.completion_percentage))),
        avg_performance: round2(average(records.iter().map(|r| r.performance_score))),
        total_time_spent_minutes: records.iter().map(|r| r.time_spent_minutes).sum(),
        subject_summaries,
        performance_levels: performance_levels(&filtered),
    }
}

fn summarize_subject(subject: &str, group: &[&ProgressRecord]) -> SubjectSummary {
    let students: HashSet<_> = group.iter().map(|r| r.student_id).collect();
    SubjectSummary {
        subject: subject.to_string(),
        student_count: students.len(),
        avg_completion: round2(average(group.iter().map(|r| r.completion_percentage))),
        avg_performance: round2(average(group.iter().map(|r| r.performance_score))),
        total_time_spent_minutes: group.iter().map(|r| r.time_spent_minutes).sum(),
        avg_assignment_completion_rate: round2(average(
            group.iter().map(|r| r.assignment_completion_rate),
        )),
        avg_assessment_score: round2(average(group.iter().map(|r| r.assessment_score))),
    }
}

fn performance_levels(students: &[&Student]) -> BTreeMap<PerformanceLevel, usize> {
    let mut levels: BTreeMap<PerformanceLevel, usize> =
        PerformanceLevel::all().into_iter().map(|l| (l, 0)).collect();
    for student in students {
        *levels.entry(classify_records(&student.progress)).or_insert(0) += 1;
    }
    levels
}

/// Per-grade head count and record averages, ascending by grade.
pub fn grade_distribution(students: &[Student]) -> Vec<GradeDistribution> {
    let mut by_grade: BTreeMap<i32, Vec<&Student>> = BTreeMap::new();
    for student in students {
        by_grade.entry(student.grade).or_default().push(student);
    }

    by_grade
        .into_iter()
        .map(|(grade, group)| {
            let records: Vec<&ProgressRecord> =
                group.iter().flat_map(|s| s.progress.iter()).collect();
            GradeDistribution {
                grade,
                student_count: group.len(),
                avg_completion: round2(average(records.iter().map(|r| r.completion_percentage))),
                avg_performance: round2(average(records.iter().map(|r| r.performance_score))),
            }
        })
        .collect()
}

pub fn student_view(student: &Student) -> StudentView {
    let progress = &student.progress;
    StudentView {
        id: student.id,
        full_name: student.full_name.clone(),
        grade: student.grade,
        email: student.email.clone(),
        created_at: student.created_at,
        updated_at: student.updated_at,
        progress: progress.clone(),
        overall_completion: round2(average(progress.iter().map(|r| r.completion_percentage))),
        overall_performance: round2(average(progress.iter().map(|r| r.performance_score))),
        last_activity: progress
            .iter()
            .map(|r| r.last_activity)
            .max()
            .unwrap_or(student.created_at),
    }
}
