use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ProteinSearchSummary, RawMatch, SearchType};
use crate::executor::{RowFilter, TermMatcher, search_table};
use crate::store::{Comparison, DatasetStore, DatasetTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetComparisonInfo {
    pub dataset_link_id: String,
    pub dataset_name: String,
    pub comparison: String,
    pub condition_left: Option<String>,
    pub condition_right: Option<String>,
}

impl DatasetComparisonInfo {
    fn new(table: &DatasetTable, comparison: &Comparison) -> Self {
        Self {
            dataset_link_id: table.link_id.clone(),
            dataset_name: table.name.clone(),
            comparison: comparison.name.clone(),
            condition_left: comparison.condition_left.clone(),
            condition_right: comparison.condition_right.clone(),
        }
    }

    fn unavailable(link_id: &str) -> Self {
        Self {
            dataset_link_id: link_id.to_string(),
            dataset_name: link_id.to_string(),
            comparison: String::new(),
            condition_left: None,
            condition_right: None,
        }
    }

    pub fn id(&self) -> String {
        row_id(&self.dataset_link_id, &self.comparison)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub fold_change: Option<f64>,
    pub p_value: Option<f64>,
    pub is_significant: bool,
    pub found: bool,
}

impl Observation {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub(crate) fn from_match(hit: &RawMatch) -> Self {
        Self {
            fold_change: hit.fold_change,
            p_value: hit.p_value,
            is_significant: hit.is_significant,
            found: hit.found,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetComparisonResult {
    pub id: String,
    #[serde(flatten)]
    pub info: DatasetComparisonInfo,
    pub primary_id: Option<String>,
    pub gene_name: Option<String>,
    pub fold_change: Option<f64>,
    pub p_value: Option<f64>,
    pub is_significant: bool,
    pub found: bool,
}

impl DatasetComparisonResult {
    fn new(info: DatasetComparisonInfo, hit: Option<&RawMatch>) -> Self {
        let observation = hit.map(Observation::from_match).unwrap_or_else(Observation::not_found);
        Self {
            id: info.id(),
            info,
            primary_id: hit.map(|hit| hit.primary_id.clone()),
            gene_name: hit.and_then(|hit| hit.gene_name.clone()),
            fold_change: observation.fold_change,
            p_value: observation.p_value,
            is_significant: observation.is_significant,
            found: observation.found,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProteinDetailedReport {
    pub search_term: String,
    pub primary_id: Option<String>,
    pub gene_name: Option<String>,
    pub results: Vec<DatasetComparisonResult>,
}

impl ProteinDetailedReport {
    pub fn found_count(&self) -> usize {
        self.results.iter().filter(|result| result.found).count()
    }
}

pub fn row_id(dataset_link_id: &str, comparison: &str) -> String {
    format!("{dataset_link_id}:{comparison}")
}

pub fn build_detailed_report<S: DatasetStore + ?Sized>(
    store: &S,
    search_term: &str,
    primary_id: Option<&str>,
    dataset_link_ids: &[String],
    search_type: SearchType,
    use_regex: bool,
) -> ProteinDetailedReport {
    let matcher = match TermMatcher::compile(search_term, search_type, use_regex) {
        Ok(matcher) => Some(matcher),
        Err(err) => {
            tracing::warn!(search_term, "report term not usable: {err}");
            None
        }
    };

    let mut results = Vec::new();
    for link_id in dataset_link_ids {
        match store.load(link_id) {
            Ok(table) => results.extend(report_rows(&table, matcher.as_ref(), primary_id)),
            Err(err) => {
                tracing::debug!(link_id = %link_id, "dataset skipped in report: {err}");
                results.push(DatasetComparisonResult::new(
                    DatasetComparisonInfo::unavailable(link_id),
                    None,
                ));
            }
        }
    }

    let gene_name = results
        .iter()
        .find(|result| result.found)
        .and_then(|result| result.gene_name.clone());
    ProteinDetailedReport {
        search_term: search_term.to_string(),
        primary_id: primary_id.map(str::to_string),
        gene_name,
        results,
    }
}

pub fn report_for_summary<S: DatasetStore + ?Sized>(
    store: &S,
    summary: &ProteinSearchSummary,
    dataset_link_ids: &[String],
    search_type: SearchType,
    use_regex: bool,
) -> ProteinDetailedReport {
    build_detailed_report(
        store,
        &summary.search_term,
        summary.primary_id.as_deref(),
        dataset_link_ids,
        search_type,
        use_regex,
    )
}

fn report_rows(
    table: &DatasetTable,
    matcher: Option<&TermMatcher>,
    primary_id: Option<&str>,
) -> Vec<DatasetComparisonResult> {
    let hits: Vec<RawMatch> = match (matcher, primary_id) {
        (Some(matcher), Some(primary_id)) => {
            search_table(table, std::slice::from_ref(matcher), RowFilter::default())
                .into_iter()
                .filter(|hit| hit.primary_id == primary_id)
                .collect()
        }
        _ => Vec::new(),
    };
    let mut by_comparison: HashMap<&str, &RawMatch> = HashMap::new();
    for hit in &hits {
        by_comparison.entry(hit.comparison.as_str()).or_insert(hit);
    }

    table
        .sorted_comparisons()
        .into_iter()
        .map(|comparison| {
            DatasetComparisonResult::new(
                DatasetComparisonInfo::new(table, comparison),
                by_comparison.get(comparison.name.as_str()).copied(),
            )
        })
        .collect()
}

pub(crate) fn load_selection<S: DatasetStore + ?Sized>(
    store: &S,
    dataset_link_ids: &[String],
) -> Vec<std::sync::Arc<DatasetTable>> {
    dataset_link_ids
        .iter()
        .filter_map(|link_id| match store.load(link_id) {
            Ok(table) => Some(table),
            Err(err) => {
                tracing::debug!(link_id = %link_id, "dataset unavailable: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::store::{ComparisonValue, MemoryDatasetStore, ProteinRow, SignificanceSettings};

    fn comparison(name: &str) -> Comparison {
        Comparison {
            name: name.to_string(),
            condition_left: Some("WT".to_string()),
            condition_right: Some(name.to_string()),
        }
    }

    fn table(link_id: &str, comparisons: &[&str], values: &[(&str, f64, f64)]) -> DatasetTable {
        DatasetTable {
            link_id: link_id.to_string(),
            name: format!("Session {link_id}"),
            settings: SignificanceSettings::default(),
            comparisons: comparisons.iter().map(|name| comparison(name)).collect(),
            rows: vec![ProteinRow {
                primary_id: "Q2M2I8".to_string(),
                gene_name: Some("AAK1".to_string()),
                description: None,
                values: values
                    .iter()
                    .map(|(name, fc, p)| {
                        (
                            name.to_string(),
                            ComparisonValue {
                                fold_change: Some(*fc),
                                p_value: Some(*p),
                            },
                        )
                    })
                    .collect::<BTreeMap<String, ComparisonValue>>(),
            }],
        }
    }

    fn store() -> MemoryDatasetStore {
        let mut other = table("b", &["Treated"], &[("Treated", 2.0, 0.001)]);
        other.rows[0].primary_id = "P12345".to_string();
        other.rows[0].gene_name = Some("BRCA1".to_string());
        MemoryDatasetStore::new()
            .with_table(table("a", &["KO", "DKO"], &[("KO", 1.0, 0.01), ("DKO", 0.1, 0.5)]))
            .unwrap()
            .with_table(other)
            .unwrap()
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn one_row_per_dataset_comparison() {
        let report = build_detailed_report(
            &store(),
            "AAK1",
            Some("Q2M2I8"),
            &ids(&["b", "a"]),
            SearchType::GeneName,
            false,
        );
        let rows: Vec<_> = report.results.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(rows, vec!["b:Treated", "a:DKO", "a:KO"]);
        assert_eq!(report.found_count(), 2);
        assert_eq!(report.gene_name.as_deref(), Some("AAK1"));
    }

    #[test]
    fn misses_carry_no_values() {
        let report = build_detailed_report(
            &store(),
            "AAK1",
            Some("Q2M2I8"),
            &ids(&["b"]),
            SearchType::GeneName,
            false,
        );
        let row = &report.results[0];
        assert!(!row.found);
        assert_eq!(row.fold_change, None);
        assert_eq!(row.p_value, None);
        assert!(!row.is_significant);
        assert_eq!(row.info.condition_left.as_deref(), Some("WT"));
    }

    #[test]
    fn significance_follows_dataset_cutoffs() {
        let report = build_detailed_report(
            &store(),
            "q2m2i8",
            Some("Q2M2I8"),
            &ids(&["a"]),
            SearchType::PrimaryId,
            false,
        );
        let by_comparison: HashMap<_, _> = report
            .results
            .iter()
            .map(|row| (row.info.comparison.as_str(), row))
            .collect();
        assert!(by_comparison["KO"].is_significant);
        assert!(!by_comparison["DKO"].is_significant);
        assert_eq!(by_comparison["DKO"].fold_change, Some(0.1));
    }

    #[test]
    fn unreadable_dataset_yields_placeholder() {
        let report = build_detailed_report(
            &store(),
            "AAK1",
            Some("Q2M2I8"),
            &ids(&["missing", "a"]),
            SearchType::GeneName,
            false,
        );
        assert_eq!(report.results.len(), 3);
        let placeholder = &report.results[0];
        assert_eq!(placeholder.info.dataset_link_id, "missing");
        assert_eq!(placeholder.info.comparison, "");
        assert!(!placeholder.found);
    }

    #[test]
    fn other_protein_is_not_reported_as_found() {
        let report = build_detailed_report(
            &store(),
            "AAK1",
            Some("P00000"),
            &ids(&["a"]),
            SearchType::GeneName,
            false,
        );
        assert_eq!(report.found_count(), 0);
        assert_eq!(report.gene_name, None);
    }
}
