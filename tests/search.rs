use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use curtain_search::app::{App, CancellationToken};
use curtain_search::domain::{
    AdvancedFilterParams, CrossDatasetSearchConfig, DatasetProcessingStatus, DatasetState,
    SearchType, SortOption,
};
use curtain_search::error::CurtainError;
use curtain_search::status::{ChannelSink, NoopSink};
use curtain_search::store::{
    Comparison, ComparisonValue, DatasetStore, DatasetTable, FileDatasetStore, MemoryDatasetStore,
    ProteinRow, SignificanceSettings,
};

fn row(primary_id: &str, gene: &str, values: &[(&str, f64, f64)]) -> ProteinRow {
    ProteinRow {
        primary_id: primary_id.to_string(),
        gene_name: Some(gene.to_string()),
        description: Some(format!("{gene} protein")),
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
            .collect(),
    }
}

fn table(link_id: &str, rows: Vec<ProteinRow>) -> DatasetTable {
    DatasetTable {
        link_id: link_id.to_string(),
        name: format!("Session {link_id}"),
        settings: SignificanceSettings {
            p_value_cutoff: 0.05,
            log2fc_cutoff: 0.3,
        },
        comparisons: vec![Comparison {
            name: "KO vs WT".to_string(),
            condition_left: Some("WT".to_string()),
            condition_right: Some("KO".to_string()),
        }],
        rows,
    }
}

/// Serves tables from memory but fails or panics for chosen link ids.
struct FlakyStore {
    inner: MemoryDatasetStore,
    failing: Vec<String>,
    panicking: Vec<String>,
    loads: Mutex<HashMap<String, usize>>,
}

impl FlakyStore {
    fn new(inner: MemoryDatasetStore) -> Self {
        Self {
            inner,
            failing: Vec::new(),
            panicking: Vec::new(),
            loads: Mutex::new(HashMap::new()),
        }
    }
}

impl DatasetStore for FlakyStore {
    fn dataset_exists(&self, link_id: &str) -> bool {
        self.inner.dataset_exists(link_id)
            || self.failing.iter().any(|id| id == link_id)
            || self.panicking.iter().any(|id| id == link_id)
    }

    fn load(&self, link_id: &str) -> Result<Arc<DatasetTable>, CurtainError> {
        *self
            .loads
            .lock()
            .unwrap()
            .entry(link_id.to_string())
            .or_default() += 1;
        if self.failing.iter().any(|id| id == link_id) {
            return Err(CurtainError::DatasetUnavailable {
                link_id: link_id.to_string(),
                message: "disk on fire".to_string(),
            });
        }
        if self.panicking.iter().any(|id| id == link_id) {
            panic!("corrupt dataset {link_id}");
        }
        self.inner.load(link_id)
    }
}

fn two_datasets() -> MemoryDatasetStore {
    MemoryDatasetStore::new()
        .with_table(table(
            "A",
            vec![
                row("Q2M2I8", "AAK1", &[("KO vs WT", 0.5, 0.01)]),
                row("P38398", "BRCA1", &[("KO vs WT", -1.2, 0.2)]),
            ],
        ))
        .unwrap()
        .with_table(table("B", vec![row("P04637", "TP53", &[("KO vs WT", 2.0, 0.001)])]))
        .unwrap()
}

fn config(terms: &[&str], datasets: &[&str]) -> CrossDatasetSearchConfig {
    CrossDatasetSearchConfig::new(
        terms.iter().map(|term| term.to_string()).collect(),
        SearchType::GeneName,
        datasets.iter().map(|id| id.to_string()),
    )
}

#[test]
fn found_in_one_of_two_datasets() {
    let app = App::new(two_datasets());
    let result = app
        .search_across_datasets(config(&["AAK1"], &["A", "B"]), &NoopSink)
        .unwrap();

    assert_eq!(result.protein_summaries.len(), 1);
    let summary = &result.protein_summaries[0];
    assert_eq!(summary.primary_id.as_deref(), Some("Q2M2I8"));
    assert_eq!(summary.datasets_found_in, 1);
    assert_eq!(summary.total_datasets_searched, 2);
    assert_eq!(summary.average_fold_change, Some(0.5));
    assert!(summary.has_significant_result);
}

#[test]
fn failed_dataset_does_not_fail_the_run() {
    let mut store = FlakyStore::new(two_datasets());
    store.failing.push("broken".to_string());
    let app = App::new(store);

    let result = app
        .search_across_datasets(config(&["AAK1"], &["A", "broken"]), &NoopSink)
        .unwrap();

    let states: Vec<_> = result
        .dataset_statuses
        .iter()
        .map(|status| (status.id.as_str(), status.state))
        .collect();
    assert_eq!(
        states,
        vec![("A", DatasetState::Completed), ("broken", DatasetState::Failed)]
    );
    let failed: Vec<_> = result.failed_datasets().collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("disk on fire"));
    assert_eq!(result.protein_summaries[0].datasets_found_in, 1);
}

#[test]
fn panicking_dataset_is_reported_as_failed() {
    let mut store = FlakyStore::new(two_datasets());
    store.panicking.push("bomb".to_string());
    let app = App::new(store).with_max_workers(2);

    let result = app
        .search_across_datasets(config(&["TP53"], &["B", "bomb"]), &NoopSink)
        .unwrap();

    assert_eq!(result.dataset_statuses[1].state, DatasetState::Failed);
    assert_eq!(result.protein_summaries[0].datasets_found_in, 1);
}

#[test]
fn missing_dataset_fails_without_loading() {
    let store = FlakyStore::new(two_datasets());
    let app = App::new(store);
    let result = app
        .search_across_datasets(config(&["AAK1"], &["A", "ghost"]), &NoopSink)
        .unwrap();

    let ghost = &result.dataset_statuses[1];
    assert_eq!(ghost.state, DatasetState::Failed);
    assert!(!app.store().loads.lock().unwrap().contains_key("ghost"));
}

#[test]
fn statuses_stream_in_order_per_dataset() {
    let (sender, receiver) = mpsc::channel::<DatasetProcessingStatus>();
    let sink = ChannelSink::new(sender);
    let app = App::new(two_datasets()).with_max_workers(2);
    app.search_across_datasets(config(&["AAK1"], &["A", "B"]), &sink)
        .unwrap();
    drop(sink);

    let mut per_dataset: BTreeMap<String, Vec<DatasetState>> = BTreeMap::new();
    for status in receiver.iter() {
        per_dataset.entry(status.id).or_default().push(status.state);
    }
    let expected = vec![
        DatasetState::Pending,
        DatasetState::Loading,
        DatasetState::Searching,
        DatasetState::Completed,
    ];
    assert_eq!(per_dataset["A"], expected);
    assert_eq!(per_dataset["B"], expected);
}

#[test]
fn compressed_dataset_passes_through_building() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = FileDatasetStore::new(root);
    store
        .save_table(&table("gz", vec![row("Q2M2I8", "AAK1", &[("KO vs WT", 1.0, 0.01)])]), true)
        .unwrap();

    let (sender, receiver) = mpsc::channel();
    let sink = ChannelSink::new(sender);
    let result = App::new(store)
        .search_across_datasets(config(&["AAK1"], &["gz"]), &sink)
        .unwrap();
    drop(sink);

    let states: Vec<DatasetState> = receiver.iter().map(|status| status.state).collect();
    assert_eq!(
        states,
        vec![
            DatasetState::Pending,
            DatasetState::Loading,
            DatasetState::Building,
            DatasetState::Searching,
            DatasetState::Completed,
        ]
    );
    assert_eq!(result.dataset_statuses[0].dataset_name, "Session gz");
    assert_eq!(result.protein_summaries[0].datasets_found_in, 1);
}

#[test]
fn found_never_exceeds_searched() {
    let mut store = FlakyStore::new(two_datasets());
    store.failing.push("broken".to_string());
    let app = App::new(store);
    let result = app
        .search_across_datasets(
            config(&["AAK1", "BRCA1", "TP53", "NOPE"], &["A", "B", "broken"]),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(result.protein_summaries.len(), 4);
    for summary in &result.protein_summaries {
        assert!(summary.datasets_found_in <= summary.total_datasets_searched);
        if summary.datasets_found_in == 0 {
            assert_eq!(summary.average_fold_change, None);
            assert!(!summary.has_significant_result);
        }
    }
    let missing = result
        .protein_summaries
        .iter()
        .find(|summary| summary.search_term == "NOPE")
        .unwrap();
    assert_eq!(missing.primary_id, None);
}

#[test]
fn significant_only_drops_weak_hits() {
    let app = App::new(two_datasets());
    let result = app
        .search_across_datasets(
            config(&["AAK1", "BRCA1"], &["A"]).with_significant_only(true),
            &NoopSink,
        )
        .unwrap();
    let brca1 = result
        .protein_summaries
        .iter()
        .find(|summary| summary.search_term == "BRCA1")
        .unwrap();
    assert_eq!(brca1.datasets_found_in, 0);
}

#[test]
fn advanced_filter_keeps_enabled_side() {
    let app = App::new(two_datasets());
    let advanced = AdvancedFilterParams {
        search_left: true,
        min_fc_left: Some(1.0),
        ..AdvancedFilterParams::default()
    };
    let result = app
        .search_across_datasets(
            config(&["AAK1", "BRCA1"], &["A"]).with_advanced_filtering(Some(advanced)),
            &NoopSink,
        )
        .unwrap();
    let found: Vec<_> = result
        .protein_summaries
        .iter()
        .filter(|summary| summary.datasets_found_in > 0)
        .map(|summary| summary.search_term.as_str())
        .collect();
    assert_eq!(found, vec!["BRCA1"]);
}

#[test]
fn regex_terms_match_gene_names() {
    let app = App::new(two_datasets()).with_default_sort(SortOption::NameAsc);
    let result = app
        .search_across_datasets(config(&["^(aak|brca)1$"], &["A", "B"]).with_regex(true), &NoopSink)
        .unwrap();
    let genes: Vec<_> = result
        .protein_summaries
        .iter()
        .map(|summary| summary.gene_name.as_deref().unwrap())
        .collect();
    assert_eq!(genes, vec!["AAK1", "BRCA1"]);
}

#[test]
fn invalid_regex_is_a_validation_error() {
    let app = App::new(two_datasets());
    let error = app
        .search_across_datasets(config(&["[unclosed"], &["A"]).with_regex(true), &NoopSink)
        .unwrap_err();
    assert_matches!(error, CurtainError::InvalidRegex { .. });
    assert!(error.is_validation());
}

#[test]
fn empty_selection_is_rejected() {
    let app = App::new(two_datasets());
    assert_matches!(
        app.search_across_datasets(config(&["AAK1"], &[]), &NoopSink),
        Err(CurtainError::EmptyDatasetSelection)
    );
}

#[test]
fn cancellation_before_start_cancels_everything() {
    let token = CancellationToken::new();
    token.cancel();
    let result = App::new(two_datasets())
        .search_with_cancellation(config(&["AAK1"], &["A", "B"]), &NoopSink, &token)
        .unwrap();
    assert!(
        result
            .dataset_statuses
            .iter()
            .all(|status| status.state == DatasetState::Cancelled)
    );
}

#[test]
fn cancelling_mid_run_lets_the_running_dataset_finish() {
    let store = two_datasets()
        .with_table(table("C", vec![row("Q2M2I8", "AAK1", &[("KO vs WT", 1.0, 0.01)])]))
        .unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    let sink = move |status: &DatasetProcessingStatus| {
        if status.state == DatasetState::Completed {
            trigger.cancel();
        }
    };

    let result = App::new(store)
        .with_max_workers(1)
        .search_with_cancellation(config(&["AAK1"], &["A", "B", "C"]), &sink, &token)
        .unwrap();

    let states: Vec<_> = result
        .dataset_statuses
        .iter()
        .map(|status| (status.id.as_str(), status.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("A", DatasetState::Completed),
            ("B", DatasetState::Cancelled),
            ("C", DatasetState::Cancelled),
        ]
    );
    let summary = &result.protein_summaries[0];
    assert_eq!(summary.datasets_found_in, 1);
    assert_eq!(summary.total_datasets_searched, 1);
}
