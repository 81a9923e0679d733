use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CurtainError {
    #[error("no search terms found in input")]
    EmptyInput,

    #[error("search requires at least one term")]
    EmptySearchTerms,

    #[error("search requires at least one dataset")]
    EmptyDatasetSelection,

    #[error("invalid regular expression {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("invalid search type: {0}")]
    InvalidSearchType(String),

    #[error("invalid sort option: {0}")]
    InvalidSort(String),

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("invalid dataset id: {0:?}")]
    InvalidDatasetId(String),

    #[error("dataset not found locally: {0}")]
    DatasetNotFound(String),

    #[error("dataset {link_id} unavailable: {message}")]
    DatasetUnavailable { link_id: String, message: String },

    #[error("dataset {link_id} is malformed: {message}")]
    MalformedDataset { link_id: String, message: String },

    #[error("invalid status transition for {link_id}: {from} -> {to}")]
    InvalidTransition {
        link_id: String,
        from: String,
        to: String,
    },

    #[error("failed to start search workers: {0}")]
    WorkerPool(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("saved search error: {0}")]
    SavedSearch(String),

    #[error("saved search not found: {0}")]
    SavedSearchNotFound(u64),

    #[error("export failed: {0}")]
    Export(String),
}

impl CurtainError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CurtainError::EmptyInput
                | CurtainError::EmptySearchTerms
                | CurtainError::EmptyDatasetSelection
                | CurtainError::InvalidRegex { .. }
                | CurtainError::InvalidSearchType(_)
                | CurtainError::InvalidSort(_)
                | CurtainError::UnknownCollection(_)
                | CurtainError::InvalidDatasetId(_)
        )
    }
}
