use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("student {0} not found")]
    NotFound(Uuid),

    #[error("data source error: {0:#}")]
    DataSource(#[source] anyhow::Error),
}

impl AnalyticsError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AnalyticsError::BadRequest(message.into())
    }

    /// HTTP status a caller should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AnalyticsError::BadRequest(_) => 400,
            AnalyticsError::NotFound(_) => 404,
            AnalyticsError::DataSource(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
