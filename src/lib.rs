//! Cross-dataset protein search over locally stored curtain sessions.

pub mod aggregate;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod export;
pub mod matrix;
pub mod output;
pub mod report;
pub mod saved;
pub mod sort;
pub mod status;
pub mod store;
pub mod terms;

pub use app::{App, CancellationToken};
pub use error::CurtainError;
