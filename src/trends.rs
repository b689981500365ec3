//! Time-bucketed progress trends.
//!
//! Week numbering never depends on the host locale: the first day of the week
//! and the rule that decides which year owns a week that straddles New Year are
//! both carried in [`TrendConfig`]. The default is ISO-8601 (weeks start on
//! Monday, week 1 is the first week with at least four days in January).

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};

use crate::classify::{average, round2};
use crate::filter::RecordFilter;
use crate::models::{ProgressRecord, Student, TrendPoint};

/// Which year owns a week that crosses from December into January.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekRule {
    /// The week containing January 1st is week 1.
    FirstDay,
    /// Week 1 is the first week lying entirely in the new year.
    FirstFullWeek,
    /// Week 1 is the first week with at least four days in the new year.
    FirstFourDayWeek,
}

impl WeekRule {
    /// Whether a week with `days_in_new_year` (1..=6) of its days in January
    /// counts as week 1 of the new year.
    fn owned_by_new_year(self, days_in_new_year: i64) -> bool {
        match self {
            WeekRule::FirstDay => true,
            WeekRule::FirstFullWeek => false,
            WeekRule::FirstFourDayWeek => days_in_new_year >= 4,
        }
    }
}

impl FromStr for WeekRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "first-day" => Ok(WeekRule::FirstDay),
            "first-full-week" => Ok(WeekRule::FirstFullWeek),
            "first-four-day-week" => Ok(WeekRule::FirstFourDayWeek),
            other => bail!("unknown week rule '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interval {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            "monthly" => Ok(Interval::Monthly),
            other => bail!("Interval must be 'daily', 'weekly', or 'monthly', got '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendConfig {
    pub week_start: Weekday,
    pub week_rule: WeekRule,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            week_start: Weekday::Mon,
            week_rule: WeekRule::FirstFourDayWeek,
        }
    }
}

impl TrendConfig {
    /// First day of the week containing `date`.
    pub fn week_start_of(&self, date: NaiveDate) -> NaiveDate {
        let offset = (7 + date.weekday().num_days_from_monday()
            - self.week_start.num_days_from_monday())
            % 7;
        date - Duration::days(offset as i64)
    }

    /// `(week-numbering year, week number)` of `date`. A straddling week is
    /// assigned wholly to one year, so keys and week start dates correspond
    /// one-to-one.
    pub fn week_key(&self, date: NaiveDate) -> WeekKey {
        let start = self.week_start_of(date);
        let end = start + Duration::days(6);

        let year = if start.year() == end.year() {
            start.year()
        } else if self.week_rule.owned_by_new_year(end.ordinal() as i64) {
            end.year()
        } else {
            start.year()
        };

        // Offset of this week's start from January 1st of `year`.
        let offset = if year == start.year() {
            start.ordinal0() as i64
        } else {
            end.ordinal0() as i64 - 6
        };

        // Offset of the start of the week that contains January 1st.
        let lead = offset.rem_euclid(7);
        let containing = if lead == 0 { 0 } else { lead - 7 };
        let first = if containing == 0 || self.week_rule.owned_by_new_year(lead) {
            containing
        } else {
            containing + 7
        };

        WeekKey {
            year,
            week: ((offset - first) / 7 + 1) as u32,
        }
    }

    /// First day of the week identified by `key`; inverse of [`week_key`].
    ///
    /// [`week_key`]: TrendConfig::week_key
    pub fn week_start_for(&self, key: WeekKey) -> NaiveDate {
        let jan1 = NaiveDate::from_yo_opt(key.year, 1).unwrap_or_default();
        let containing = self.week_start_of(jan1);
        let lead = (jan1 - containing).num_days();
        let first = if lead == 0 || self.week_rule.owned_by_new_year(7 - lead) {
            containing
        } else {
            containing + Duration::days(7)
        };
        first + Duration::weeks(i64::from(key.week) - 1)
    }

    pub fn bucket_start(&self, interval: Interval, at: DateTime<Utc>) -> NaiveDate {
        self.bucket_of(interval, at).0
    }

    /// Bucket start for `at`, plus the week key when bucketing weekly. Weekly
    /// buckets are keyed by week number and their start date is derived from
    /// the key.
    fn bucket_of(&self, interval: Interval, at: DateTime<Utc>) -> (NaiveDate, Option<WeekKey>) {
        let date = at.date_naive();
        match interval {
            Interval::Daily => (date, None),
            Interval::Weekly => {
                let key = self.week_key(date);
                (self.week_start_for(key), Some(key))
            }
            Interval::Monthly => (date - Duration::days(date.day0() as i64), None),
        }
    }
}

/// A progress record paired with its owner's grade.
#[derive(Debug, Clone, Copy)]
pub struct GradedRecord<'a> {
    pub grade: i32,
    pub record: &'a ProgressRecord,
}

pub fn graded_records(students: &[Student]) -> Vec<GradedRecord<'_>> {
    students
        .iter()
        .flat_map(|s| {
            s.progress.iter().map(move |record| GradedRecord {
                grade: s.grade,
                record,
            })
        })
        .collect()
}

/// Groups the records that pass `filter` into buckets and averages each one.
/// Subject matching is case-insensitive and the date range applies to the
/// record's creation time. Only populated buckets are returned, oldest first.
pub fn build_trends(
    records: &[GradedRecord<'_>],
    filter: &RecordFilter,
    interval: Interval,
    config: &TrendConfig,
) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<(NaiveDate, Option<WeekKey>), Vec<&ProgressRecord>> =
        BTreeMap::new();

    for graded in records {
        let record = graded.record;
        if !filter.grade_matches(graded.grade)
            || !filter.subject_matches(&record.subject)
            || !filter.in_range(record.created_at)
        {
            continue;
        }
        buckets
            .entry(config.bucket_of(interval, record.created_at))
            .or_default()
            .push(record);
    }

    buckets
        .into_iter()
        .map(|((start, week), group)| trend_point(start, week, &group))
        .collect()
}

fn trend_point(
    start: NaiveDate,
    week: Option<WeekKey>,
    group: &[&ProgressRecord],
) -> TrendPoint {
    let students: HashSet<_> = group.iter().map(|r| r.student_id).collect();

    let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in group {
        by_subject
            .entry(record.subject.clone())
            .or_default()
            .push(record.performance_score);
    }

    TrendPoint {
        bucket_start_date: start.and_time(NaiveTime::MIN).and_utc(),
        week_year: week.map(|k| k.year),
        week_number: week.map(|k| k.week),
        avg_completion: round2(average(group.iter().map(|r| r.completion_percentage))),
        avg_performance: round2(average(group.iter().map(|r| r.performance_score))),
        active_student_count: students.len(),
        subject_performance: by_subject
            .into_iter()
            .map(|(subject, scores)| (subject, round2(average(scores))))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_record, at, student};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn iso_keys_match_chrono_iso_week() {
        let config = TrendConfig::default();
        let mut day = date(2019, 12, 1);
        while day <= date(2027, 1, 31) {
            let iso = day.iso_week();
            let key = config.week_key(day);
            assert_eq!((key.year, key.week), (iso.year(), iso.week()), "{day}");
            day += Duration::days(1);
        }
    }

    #[test]
    fn keys_and_week_starts_are_one_to_one() {
        for rule in [
            WeekRule::FirstDay,
            WeekRule::FirstFullWeek,
            WeekRule::FirstFourDayWeek,
        ] {
            let config = TrendConfig {
                week_start: Weekday::Sun,
                week_rule: rule,
            };
            let mut seen: BTreeMap<WeekKey, NaiveDate> = BTreeMap::new();
            let mut day = date(2020, 12, 1);
            while day <= date(2026, 2, 1) {
                let key = config.week_key(day);
                let start = config.week_start_of(day);
                assert!(key.week >= 1 && key.week <= 53, "{rule:?} {day} {key:?}");
                assert_eq!(*seen.entry(key).or_insert(start), start, "{rule:?} {day}");
                assert_eq!(config.week_start_for(key), start, "{rule:?} {day}");
                day += Duration::days(1);
            }
            let starts: Vec<_> = seen.values().collect();
            assert!(starts.windows(2).all(|w| w[0] < w[1]), "{rule:?}");
        }
    }

    #[test]
    fn straddling_week_follows_rule() {
        // 2025-12-28 is a Sunday; that week has three days in 2026.
        let day = date(2025, 12, 30);
        let sunday = |rule| TrendConfig {
            week_start: Weekday::Sun,
            week_rule: rule,
        };
        assert_eq!(
            sunday(WeekRule::FirstDay).week_key(day),
            WeekKey { year: 2026, week: 1 }
        );
        assert_eq!(
            sunday(WeekRule::FirstFourDayWeek).week_key(day),
            WeekKey { year: 2025, week: 53 }
        );
        assert_eq!(
            sunday(WeekRule::FirstFullWeek).week_key(day),
            WeekKey { year: 2025, week: 52 }
        );
        assert_eq!(sunday(WeekRule::FirstDay).week_start_of(day), date(2025, 12, 28));
    }

    #[test]
    fn week_rule_labels_buckets_across_new_year() {
        let mut ada = student("Ada Park", 5);
        add_record(&mut ada, "Math", 80.0).created_at = at(2025, 12, 30);
        add_record(&mut ada, "Math", 60.0).created_at = at(2026, 1, 2);
        add_record(&mut ada, "Math", 40.0).created_at = at(2026, 1, 5);
        let students = vec![ada];
        let records = graded_records(&students);

        let labels = |rule| {
            let config = TrendConfig {
                week_start: Weekday::Sun,
                week_rule: rule,
            };
            build_trends(&records, &RecordFilter::default(), Interval::Weekly, &config)
                .into_iter()
                .map(|p| {
                    (
                        p.bucket_start_date.date_naive(),
                        p.week_year.unwrap(),
                        p.week_number.unwrap(),
                        p.avg_performance,
                    )
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(
            labels(WeekRule::FirstDay),
            [
                (date(2025, 12, 28), 2026, 1, 70.0),
                (date(2026, 1, 4), 2026, 2, 40.0),
            ]
        );
        assert_eq!(
            labels(WeekRule::FirstFourDayWeek),
            [
                (date(2025, 12, 28), 2025, 53, 70.0),
                (date(2026, 1, 4), 2026, 1, 40.0),
            ]
        );
        assert_eq!(
            labels(WeekRule::FirstFullWeek),
            [
                (date(2025, 12, 28), 2025, 52, 70.0),
                (date(2026, 1, 4), 2026, 1, 40.0),
            ]
        );
    }

    #[test]
    fn daily_buckets_carry_no_week_label() {
        let mut ada = student("Ada Park", 5);
        add_record(&mut ada, "Math", 80.0).created_at = at(2025, 12, 30);
        let students = vec![ada];
        let records = graded_records(&students);
        let points = build_trends(
            &records,
            &RecordFilter::default(),
            Interval::Daily,
            &TrendConfig::default(),
        );
        assert_eq!(points[0].week_year, None);
        assert_eq!(points[0].week_number, None);
    }

    #[test]
    fn weekly_buckets_average_and_count_distinct_students() {
        let mut ada = student("Ada Park", 5);
        add_record(&mut ada, "Math", 80.0).created_at = at(2025, 3, 4);
        add_record(&mut ada, "Reading", 60.0).created_at = at(2025, 3, 6);
        let mut ben = student("Ben Ortiz", 5);
        add_record(&mut ben, "Math", 90.0).created_at = at(2025, 3, 9);
        add_record(&mut ben, "Reading", 70.0).created_at = at(2025, 3, 12);
        let students = vec![ada, ben];

        let records = graded_records(&students);
        let points = build_trends(
            &records,
            &RecordFilter::default(),
            Interval::Weekly,
            &TrendConfig::default(),
        );

        assert_eq!(points.len(), 2);
        let first = &points[0];
        assert_eq!(first.bucket_start_date, date(2025, 3, 3).and_time(NaiveTime::MIN).and_utc());
        assert_eq!(first.active_student_count, 2);
        assert_eq!(first.avg_performance, 76.67);
        assert_eq!(first.subject_performance["Math"], 85.0);
        assert_eq!(first.subject_performance["Reading"], 60.0);
        assert_eq!(points[1].active_student_count, 1);
        assert_eq!(points[1].avg_performance, 70.0);
    }

    #[test]
    fn filters_apply_before_bucketing_and_empty_weeks_are_skipped() {
        let mut ada = student("Ada Park", 5);
        add_record(&mut ada, "Math", 80.0).created_at = at(2025, 1, 6);
        add_record(&mut ada, "Math", 40.0).created_at = at(2025, 2, 24);
        add_record(&mut ada, "Reading", 10.0).created_at = at(2025, 1, 7);
        let mut cy = student("Cy Lane", 8);
        add_record(&mut cy, "Math", 20.0).created_at = at(2025, 1, 8);
        let students = vec![ada, cy];

        let filter = RecordFilter {
            grade: Some(5),
            subject: Some("math".to_string()),
            start: Some(at(2025, 1, 1)),
            end: Some(at(2025, 3, 1)),
        };
        let records = graded_records(&students);
        let points = build_trends(&records, &filter, Interval::Weekly, &TrendConfig::default());

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].avg_performance, 80.0);
        assert_eq!(points[1].avg_performance, 40.0);
        assert!(points[0].bucket_start_date < points[1].bucket_start_date);

        let again = build_trends(&records, &filter, Interval::Weekly, &TrendConfig::default());
        assert_eq!(points, again);
    }

    #[test]
    fn monthly_and_daily_intervals() {
        let config = TrendConfig::default();
        assert_eq!(config.bucket_start(Interval::Monthly, at(2025, 7, 19)), date(2025, 7, 1));
        assert_eq!(config.bucket_start(Interval::Daily, at(2025, 7, 19)), date(2025, 7, 19));
        assert_eq!("Monthly".parse::<Interval>().unwrap(), Interval::Monthly);
        assert!("hourly".parse::<Interval>().is_err());
        assert_eq!(
            "first-full-week".parse::<WeekRule>().unwrap(),
            WeekRule::FirstFullWeek
        );
    }
}
