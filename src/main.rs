use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use progress_analytics::config::AppConfig;
use progress_analytics::db::{self, PgRecordSource};
use progress_analytics::export::{export_file_name, CSV_CONTENT_TYPE};
use progress_analytics::filter::RecordFilter;
use progress_analytics::models::ProgressInput;
use progress_analytics::ratelimit::{ClientKey, RateLimiter};
use progress_analytics::students::{SortKey, StudentQuery};
use progress_analytics::trends::Interval;
use progress_analytics::AnalyticsService;

#[derive(Parser)]
#[command(name = "progress-analytics")]
#[command(about = "Student progress tracking and class analytics", long_about = None)]
struct Cli {
    /// Authenticated subject the request is counted against
    #[arg(long, global = true)]
    client: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    #[arg(long)]
    grade: Option<i32>,
    #[arg(long)]
    subject: Option<String>,
    /// Inclusive lower bound on record creation (RFC 3339)
    #[arg(long)]
    start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on record creation (RFC 3339)
    #[arg(long)]
    end: Option<DateTime<Utc>>,
}

impl From<FilterArgs> for RecordFilter {
    fn from(args: FilterArgs) -> Self {
        RecordFilter {
            grade: args.grade,
            subject: args.subject,
            start: args.start,
            end: args.end,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students and progress
    Seed,
    /// Import students and progress records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Class-level summary
    Summary {
        #[arg(long)]
        grade: Option<i32>,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Progress trends bucketed by day, week or month
    Trends {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "weekly")]
        interval: Interval,
    },
    /// Dashboard snapshot as of now
    Dashboard,
    /// Student counts and averages per grade
    Grades,
    /// Export progress rows as CSV (or JSON)
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        /// Output file; defaults to a timestamped name in the current directory
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print rows as JSON instead of writing CSV
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List students
    Students {
        #[arg(long)]
        grade: Option<i32>,
        #[arg(long)]
        subject: Option<String>,
        /// Keep students with activity at or after this time
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Keep students with activity at or before this time
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
        /// name, grade, progress or lastactivity
        #[arg(long, default_value = "name")]
        sort: SortKey,
    },
    /// Show one student with derived progress fields
    Student { id: Uuid },
    /// List a student's progress records by subject
    Progress { id: Uuid },
    /// Record progress for a student in one subject
    RecordProgress {
        id: Uuid,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        completion: f64,
        #[arg(long)]
        performance: f64,
        #[arg(long, default_value_t = 0)]
        minutes: i64,
        #[arg(long)]
        assignment_rate: f64,
        #[arg(long)]
        assessment: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let pool = db::connect(config.database_url()?, config.max_connections).await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            info!("schema ready");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            info!(imported, path = %csv.display(), "imported progress records");
        }
        command => {
            let service = AnalyticsService::new(Arc::new(PgRecordSource::new(pool)), config.trend);
            let limiter = RateLimiter::new(config.rate_limit);
            let client = ClientKey::from_request(cli.client.as_deref(), None);

            match limiter.guard(&client, || run(&service, command)).await {
                Ok(admitted) => {
                    debug!(headers = ?admitted.headers.pairs(), "request admitted");
                    admitted.value?;
                }
                Err(rejection) => {
                    warn!(client = client.as_str(), status = rejection.status, "request rejected");
                    anyhow::bail!(rejection.body);
                }
            }
        }
    }

    Ok(())
}

async fn run(service: &AnalyticsService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Summary { grade, subject } => {
            print_json(&service.class_summary(grade, subject.as_deref()).await?)?;
        }
        Commands::Trends { filter, interval } => {
            print_json(&service.progress_trends(&filter.into(), interval).await?)?;
        }
        Commands::Dashboard => {
            print_json(&service.dashboard(Utc::now()).await?)?;
        }
        Commands::Grades => {
            print_json(&service.grade_distribution().await?)?;
        }
        Commands::Export { filter, out, json } => {
            let filter: RecordFilter = filter.into();
            if json {
                print_json(&service.export(&filter).await?)?;
            } else {
                let csv = service.export_csv(&filter).await?;
                let path = out.unwrap_or_else(|| PathBuf::from(export_file_name(Utc::now())));
                std::fs::write(&path, csv)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), content_type = CSV_CONTENT_TYPE, "export written");
            }
        }
        Commands::Students {
            grade,
            subject,
            start,
            end,
            search,
            page,
            page_size,
            sort,
        } => {
            let query = StudentQuery {
                grade,
                subject,
                start,
                end,
                search,
                page_number: page,
                page_size,
                sort,
            };
            print_json(&service.students(&query).await?)?;
        }
        Commands::Student { id } => {
            print_json(&service.student(id).await?)?;
        }
        Commands::Progress { id } => {
            print_json(&service.student_progress(id).await?)?;
        }
        Commands::RecordProgress {
            id,
            subject,
            completion,
            performance,
            minutes,
            assignment_rate,
            assessment,
        } => {
            let input = ProgressInput {
                subject,
                completion_percentage: completion,
                performance_score: performance,
                time_spent_minutes: minutes,
                assignment_completion_rate: assignment_rate,
                assessment_score: assessment,
            };
            service.record_progress(id, &input, Utc::now()).await?;
            println!("Progress updated successfully.");
        }
        Commands::InitDb | Commands::Seed | Commands::Import { .. } => {
            anyhow::bail!("database commands do not go through the analytics service");
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
