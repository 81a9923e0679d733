use std::io::{self, Write};

use serde::Serialize;

use crate::domain::{CrossDatasetSearchResult, DatasetProcessingStatus};
use crate::matrix::CrossDatasetMatrix;
use crate::report::ProteinDetailedReport;
use crate::saved::SavedSearch;
use crate::status::StatusSink;
use crate::store::DatasetListing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_result(result: &CrossDatasetSearchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_report(report: &ProteinDetailedReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_matrix(matrix: &CrossDatasetMatrix) -> io::Result<()> {
        Self::print_json(matrix)
    }

    pub fn print_datasets(datasets: &[DatasetListing]) -> io::Result<()> {
        Self::print_json(&datasets)
    }

    pub fn print_saved(searches: &[SavedSearchEntry]) -> io::Result<()> {
        Self::print_json(&searches)
    }

    pub fn print_text(text: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            stdout.write_all(b"\n")?;
        }
        Ok(())
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        Self::print_text(&json)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearchEntry {
    pub id: u64,
    pub name: String,
    pub protein_count: usize,
    pub dataset_count: usize,
    pub created_at: String,
    pub last_opened_at: Option<String>,
}

impl From<&SavedSearch> for SavedSearchEntry {
    fn from(value: &SavedSearch) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            protein_count: value.protein_count,
            dataset_count: value.dataset_count,
            created_at: value.created_at.clone(),
            last_opened_at: value.last_opened_at.clone(),
        }
    }
}

pub struct StderrStatus;

impl StatusSink for StderrStatus {
    fn status(&self, status: &DatasetProcessingStatus) {
        let line = match &status.error {
            Some(error) => format!("[{}] {} ({}): {error}", status.state, status.dataset_name, status.id),
            None => format!("[{}] {} ({})", status.state, status.dataset_name, status.id),
        };
        let _ = writeln!(io::stderr(), "{line}");
    }
}
