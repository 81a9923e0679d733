use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CurtainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum SearchType {
    PrimaryId,
    GeneName,
    Description,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchType::PrimaryId => write!(f, "primaryId"),
            SearchType::GeneName => write!(f, "geneName"),
            SearchType::Description => write!(f, "description"),
        }
    }
}

impl FromStr for SearchType {
    type Err = CurtainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace(['-', '_'], "").to_ascii_lowercase();
        match normalized.as_str() {
            "primaryid" | "id" => Ok(SearchType::PrimaryId),
            "genename" | "gene" => Ok(SearchType::GeneName),
            "description" => Ok(SearchType::Description),
            _ => Err(CurtainError::InvalidSearchType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum SortOption {
    #[serde(rename = "nameAsc")]
    NameAsc,
    #[serde(rename = "nameDesc")]
    NameDesc,
    #[default]
    #[serde(rename = "matchCountDesc")]
    MatchCountDesc,
    #[serde(rename = "avgFCAsc")]
    AvgFcAsc,
    #[serde(rename = "avgFCDesc")]
    AvgFcDesc,
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOption::NameAsc => write!(f, "nameAsc"),
            SortOption::NameDesc => write!(f, "nameDesc"),
            SortOption::MatchCountDesc => write!(f, "matchCountDesc"),
            SortOption::AvgFcAsc => write!(f, "avgFCAsc"),
            SortOption::AvgFcDesc => write!(f, "avgFCDesc"),
        }
    }
}

impl FromStr for SortOption {
    type Err = CurtainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace(['-', '_'], "").to_ascii_lowercase();
        match normalized.as_str() {
            "nameasc" => Ok(SortOption::NameAsc),
            "namedesc" => Ok(SortOption::NameDesc),
            "matchcountdesc" => Ok(SortOption::MatchCountDesc),
            "avgfcasc" => Ok(SortOption::AvgFcAsc),
            "avgfcdesc" => Ok(SortOption::AvgFcDesc),
            _ => Err(CurtainError::InvalidSort(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedFilterParams {
    // Fold-change bounds are magnitudes: left covers fc < 0, right covers fc >= 0.
    #[serde(default)]
    pub min_p: Option<f64>,
    #[serde(default)]
    pub max_p: Option<f64>,
    #[serde(default, rename = "minFCLeft")]
    pub min_fc_left: Option<f64>,
    #[serde(default, rename = "maxFCLeft")]
    pub max_fc_left: Option<f64>,
    #[serde(default, rename = "minFCRight")]
    pub min_fc_right: Option<f64>,
    #[serde(default, rename = "maxFCRight")]
    pub max_fc_right: Option<f64>,
    #[serde(default)]
    pub search_left: bool,
    #[serde(default)]
    pub search_right: bool,
}

impl AdvancedFilterParams {
    pub fn accepts(&self, fold_change: Option<f64>, p_value: Option<f64>) -> bool {
        self.accepts_p_value(p_value) && self.accepts_fold_change(fold_change)
    }

    fn accepts_p_value(&self, p_value: Option<f64>) -> bool {
        if self.min_p.is_none() && self.max_p.is_none() {
            return true;
        }
        let Some(p) = p_value else {
            return false;
        };
        within(p, self.min_p, self.max_p)
    }

    fn accepts_fold_change(&self, fold_change: Option<f64>) -> bool {
        if !self.search_left && !self.search_right {
            return true;
        }
        let Some(fc) = fold_change else {
            return false;
        };
        let left = self.search_left && fc < 0.0 && within(-fc, self.min_fc_left, self.max_fc_left);
        let right =
            self.search_right && fc >= 0.0 && within(fc, self.min_fc_right, self.max_fc_right);
        left || right
    }
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossDatasetSearchConfig {
    pub search_terms: Vec<String>,
    pub search_type: SearchType,
    pub dataset_link_ids: Vec<String>,
    #[serde(default)]
    pub significant_only: bool,
    #[serde(default)]
    pub use_regex: bool,
    #[serde(default)]
    pub advanced_filtering: Option<AdvancedFilterParams>,
}

impl CrossDatasetSearchConfig {
    pub fn new(
        search_terms: Vec<String>,
        search_type: SearchType,
        dataset_link_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            search_terms,
            search_type,
            dataset_link_ids: dedup_preserving_order(dataset_link_ids),
            significant_only: false,
            use_regex: false,
            advanced_filtering: None,
        }
    }

    pub fn with_significant_only(mut self, significant_only: bool) -> Self {
        self.significant_only = significant_only;
        self
    }

    pub fn with_regex(mut self, use_regex: bool) -> Self {
        self.use_regex = use_regex;
        self
    }

    pub fn with_advanced_filtering(mut self, filters: Option<AdvancedFilterParams>) -> Self {
        self.advanced_filtering = filters;
        self
    }

    pub fn validate(&self) -> Result<(), CurtainError> {
        if self.search_terms.iter().all(|term| term.trim().is_empty()) {
            return Err(CurtainError::EmptySearchTerms);
        }
        if self.dataset_link_ids.is_empty() {
            return Err(CurtainError::EmptyDatasetSelection);
        }
        Ok(())
    }
}

pub fn dedup_preserving_order(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetState {
    Pending,
    Loading,
    Building,
    Searching,
    Completed,
    Failed,
    Cancelled,
}

impl DatasetState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DatasetState::Completed | DatasetState::Failed | DatasetState::Cancelled
        )
    }

    pub fn can_advance_to(self, next: DatasetState) -> bool {
        use DatasetState::*;
        match (self, next) {
            (Pending, Loading) | (Pending, Cancelled) => true,
            (Loading, Building) | (Loading, Searching) => true,
            (Building, Searching) => true,
            (Searching, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DatasetState::Pending => "pending",
            DatasetState::Loading => "loading",
            DatasetState::Building => "building",
            DatasetState::Searching => "searching",
            DatasetState::Completed => "completed",
            DatasetState::Failed => "failed",
            DatasetState::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetProcessingStatus {
    pub id: String,
    pub dataset_name: String,
    pub state: DatasetState,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    pub search_term: String,
    pub primary_id: String,
    pub gene_name: Option<String>,
    pub fold_change: Option<f64>,
    pub p_value: Option<f64>,
    pub is_significant: bool,
    pub comparison: String,
    pub dataset_link_id: String,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProteinSearchSummary {
    pub search_term: String,
    pub primary_id: Option<String>,
    pub gene_name: Option<String>,
    pub datasets_found_in: usize,
    pub total_datasets_searched: usize,
    pub average_fold_change: Option<f64>,
    pub has_significant_result: bool,
}

impl ProteinSearchSummary {
    pub fn display_name(&self) -> &str {
        self.gene_name.as_deref().unwrap_or(&self.search_term)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossDatasetSearchResult {
    pub config: CrossDatasetSearchConfig,
    pub protein_summaries: Vec<ProteinSearchSummary>,
    pub search_timestamp: String,
    #[serde(default)]
    pub dataset_statuses: Vec<DatasetProcessingStatus>,
}

impl CrossDatasetSearchResult {
    pub fn sort_by(&mut self, option: SortOption) {
        crate::sort::sort_summaries(&mut self.protein_summaries, option);
    }

    pub fn failed_datasets(&self) -> impl Iterator<Item = &DatasetProcessingStatus> {
        self.dataset_statuses
            .iter()
            .filter(|status| status.state == DatasetState::Failed)
    }

    pub fn completed_dataset_ids(&self) -> Vec<String> {
        self.dataset_statuses
            .iter()
            .filter(|status| status.state == DatasetState::Completed)
            .map(|status| status.id.clone())
            .collect()
    }
}

pub fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
