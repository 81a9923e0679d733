use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::{CrossDatasetSearchResult, RawMatch, dedup_preserving_order};
use crate::executor::{RowFilter, TermMatcher, search_table};
use crate::report::{Observation, load_selection, row_id};
use crate::store::DatasetStore;

pub type MatrixCell = Observation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRow {
    pub id: String,
    pub dataset_link_id: String,
    pub dataset_name: String,
    pub comparison: String,
    pub condition_left: Option<String>,
    pub condition_right: Option<String>,
    pub cells: BTreeMap<String, MatrixCell>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossDatasetMatrix {
    pub protein_ids: Vec<String>,
    pub rows: Vec<MatrixRow>,
    pub protein_gene_names: BTreeMap<String, Option<String>>,
}

impl CrossDatasetMatrix {
    pub fn column_label<'a>(&'a self, protein_id: &'a str) -> &'a str {
        self.protein_gene_names
            .get(protein_id)
            .and_then(|gene| gene.as_deref())
            .unwrap_or(protein_id)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixFilterOptions {
    #[serde(default)]
    pub show_significant_only: bool,
    #[serde(default)]
    pub hide_not_found: bool,
    #[serde(default)]
    pub min_fold_change: Option<f64>,
    #[serde(default)]
    pub max_p_value: Option<f64>,
    #[serde(default)]
    pub selected_datasets: Option<BTreeSet<String>>,
}

impl MatrixFilterOptions {
    fn keeps_dataset(&self, link_id: &str) -> bool {
        self.selected_datasets
            .as_ref()
            .is_none_or(|selected| selected.contains(link_id))
    }

    fn keeps_cell(&self, cell: &MatrixCell) -> bool {
        if self.hide_not_found && !cell.found {
            return false;
        }
        if self.show_significant_only && !cell.is_significant {
            return false;
        }
        if let Some(min) = self.min_fold_change
            && !cell.fold_change.is_some_and(|fc| fc.abs() >= min)
        {
            return false;
        }
        if let Some(max) = self.max_p_value
            && !cell.p_value.is_some_and(|p| p <= max)
        {
            return false;
        }
        true
    }
}

pub fn build_matrix<S: DatasetStore + ?Sized>(
    store: &S,
    result: &CrossDatasetSearchResult,
    options: &MatrixFilterOptions,
) -> CrossDatasetMatrix {
    let protein_ids = dedup_preserving_order(
        result
            .protein_summaries
            .iter()
            .filter_map(|summary| summary.primary_id.clone()),
    );
    let mut protein_gene_names = BTreeMap::new();
    let mut pairs = HashSet::new();
    for summary in &result.protein_summaries {
        if let Some(primary_id) = &summary.primary_id {
            protein_gene_names
                .entry(primary_id.clone())
                .or_insert_with(|| summary.gene_name.clone());
            pairs.insert((summary.search_term.as_str(), primary_id.as_str()));
        }
    }

    let terms = dedup_preserving_order(
        result
            .protein_summaries
            .iter()
            .filter(|summary| summary.primary_id.is_some())
            .map(|summary| summary.search_term.clone()),
    );
    let matchers: Vec<TermMatcher> = terms
        .iter()
        .filter_map(|term| {
            TermMatcher::compile(term, result.config.search_type, result.config.use_regex)
                .inspect_err(|err| tracing::warn!(search_term = %term, "matrix term not usable: {err}"))
                .ok()
        })
        .collect();

    let tables = load_selection(store, &result.config.dataset_link_ids);
    let mut rows = Vec::new();
    for table in &tables {
        let hits = search_table(table, &matchers, RowFilter::default());
        let mut by_cell: HashMap<(&str, &str), &RawMatch> = HashMap::new();
        for hit in hits
            .iter()
            .filter(|hit| pairs.contains(&(hit.search_term.as_str(), hit.primary_id.as_str())))
        {
            by_cell
                .entry((hit.primary_id.as_str(), hit.comparison.as_str()))
                .or_insert(hit);
        }
        for comparison in table.sorted_comparisons() {
            let cells = protein_ids
                .iter()
                .map(|protein_id| {
                    let cell = by_cell
                        .get(&(protein_id.as_str(), comparison.name.as_str()))
                        .map(|hit| Observation::from_match(hit))
                        .unwrap_or_else(Observation::not_found);
                    (protein_id.clone(), cell)
                })
                .collect();
            rows.push(MatrixRow {
                id: row_id(&table.link_id, &comparison.name),
                dataset_link_id: table.link_id.clone(),
                dataset_name: table.name.clone(),
                comparison: comparison.name.clone(),
                condition_left: comparison.condition_left.clone(),
                condition_right: comparison.condition_right.clone(),
                cells,
            });
        }
    }

    tracing::debug!(
        proteins = protein_ids.len(),
        rows = rows.len(),
        "matrix derived"
    );
    apply_filters(
        CrossDatasetMatrix {
            protein_ids,
            rows,
            protein_gene_names,
        },
        options,
    )
}

// Order: dataset selection, not-found, significance, thresholds. Emptied rows stay.
pub fn apply_filters(mut matrix: CrossDatasetMatrix, options: &MatrixFilterOptions) -> CrossDatasetMatrix {
    matrix
        .rows
        .retain(|row| options.keeps_dataset(&row.dataset_link_id));
    for row in &mut matrix.rows {
        row.cells.retain(|_, cell| options.keeps_cell(cell));
    }
    matrix
}

pub fn found_counts(matrix: &CrossDatasetMatrix) -> HashMap<&str, usize> {
    let mut counts: HashMap<&str, usize> = matrix
        .protein_ids
        .iter()
        .map(|protein_id| (protein_id.as_str(), 0))
        .collect();
    for row in &matrix.rows {
        for (protein_id, cell) in &row.cells {
            if cell.found {
                *counts.entry(protein_id.as_str()).or_default() += 1;
            }
        }
    }
    counts
}
