//! Student progress analytics: class summaries, weekly trends, a dashboard
//! snapshot and CSV export computed from a snapshot of student records, plus a
//! per-client request limiter.

pub mod classify;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod export;
pub mod filter;
pub mod models;
pub mod ratelimit;
pub mod service;
pub mod source;
pub mod students;
pub mod summary;
pub mod trends;

#[cfg(test)]
mod testing;

pub use error::{AnalyticsError, Result};
pub use service::AnalyticsService;
