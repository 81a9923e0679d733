use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::aggregate::aggregate;
use crate::config::{DEFAULT_MAX_WORKERS, ResolvedConfig};
use crate::domain::{
    CrossDatasetSearchConfig, CrossDatasetSearchResult, DatasetProcessingStatus, DatasetState,
    ProteinSearchSummary, RawMatch, SearchType, SortOption, iso_timestamp,
};
use crate::error::CurtainError;
use crate::executor::{RowFilter, TermMatcher, compile_terms, search_dataset};
use crate::matrix::{CrossDatasetMatrix, MatrixFilterOptions, build_matrix};
use crate::report::{ProteinDetailedReport, build_detailed_report, report_for_summary};
use crate::sort::sort_summaries;
use crate::status::{StatusSink, StatusTracker};
use crate::store::DatasetStore;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct DatasetOutcome {
    status: DatasetProcessingStatus,
    matches: Vec<RawMatch>,
}

pub struct App<S: DatasetStore> {
    store: S,
    max_workers: usize,
    default_sort: SortOption,
}

impl<S: DatasetStore> App<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_workers: DEFAULT_MAX_WORKERS,
            default_sort: SortOption::default(),
        }
    }

    pub fn from_config(store: S, config: &ResolvedConfig) -> Self {
        Self::new(store)
            .with_max_workers(config.max_workers)
            .with_default_sort(config.default_sort)
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_default_sort(mut self, sort: SortOption) -> Self {
        self.default_sort = sort;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn search_across_datasets(
        &self,
        config: CrossDatasetSearchConfig,
        sink: &dyn StatusSink,
    ) -> Result<CrossDatasetSearchResult, CurtainError> {
        self.search_with_cancellation(config, sink, &CancellationToken::new())
    }

    pub fn search_with_cancellation(
        &self,
        config: CrossDatasetSearchConfig,
        sink: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<CrossDatasetSearchResult, CurtainError> {
        config.validate()?;
        let matchers = compile_terms(&config)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers.min(config.dataset_link_ids.len()).max(1))
            .thread_name(|index| format!("curtain-search-{index}"))
            .build()
            .map_err(|err| CurtainError::WorkerPool(err.to_string()))?;

        tracing::info!(
            terms = matchers.len(),
            datasets = config.dataset_link_ids.len(),
            search_type = %config.search_type,
            "cross-dataset search started"
        );

        let trackers: Vec<StatusTracker<'_>> = config
            .dataset_link_ids
            .iter()
            .map(|link_id| StatusTracker::new(link_id, link_id, sink))
            .collect();
        let filter = RowFilter::from_config(&config);
        let outcomes: Vec<DatasetOutcome> = pool.install(|| {
            trackers
                .into_par_iter()
                .map(|tracker| self.run_dataset(tracker, &matchers, filter, cancel))
                .collect()
        });

        let attempted = outcomes
            .iter()
            .filter(|outcome| outcome.status.state != DatasetState::Cancelled)
            .count();
        let mut statuses = Vec::with_capacity(outcomes.len());
        let mut matches = Vec::new();
        for outcome in outcomes {
            if outcome.status.state == DatasetState::Completed {
                matches.extend(outcome.matches);
            }
            statuses.push(outcome.status);
        }

        let mut protein_summaries = aggregate(
            matchers.iter().map(TermMatcher::term),
            &matches,
            attempted,
        );
        sort_summaries(&mut protein_summaries, self.default_sort);

        let failed = statuses
            .iter()
            .filter(|status| status.state == DatasetState::Failed)
            .count();
        tracing::info!(
            summaries = protein_summaries.len(),
            matches = matches.len(),
            failed,
            "cross-dataset search finished"
        );

        Ok(CrossDatasetSearchResult {
            config,
            protein_summaries,
            search_timestamp: iso_timestamp(),
            dataset_statuses: statuses,
        })
    }

    fn run_dataset(
        &self,
        mut tracker: StatusTracker<'_>,
        matchers: &[TermMatcher],
        filter: RowFilter<'_>,
        cancel: &CancellationToken,
    ) -> DatasetOutcome {
        let link_id = tracker.status().id.clone();
        if cancel.is_cancelled() {
            if let Err(err) = tracker.advance(DatasetState::Cancelled) {
                tracing::error!(link_id = %link_id, "{err}");
            }
            tracing::info!(link_id = %link_id, "dataset skipped after cancellation");
            return DatasetOutcome {
                status: tracker.into_status(),
                matches: Vec::new(),
            };
        }

        let searched = catch_unwind(AssertUnwindSafe(|| {
            search_dataset(&self.store, &link_id, matchers, filter, &mut tracker)
        }))
        .unwrap_or_else(|_| {
            Err(CurtainError::DatasetUnavailable {
                link_id: link_id.clone(),
                message: "dataset search panicked".to_string(),
            })
        });

        let (transition, matches) = match searched {
            Ok(matches) => (tracker.advance(DatasetState::Completed), matches),
            Err(err) => {
                tracing::warn!(link_id = %link_id, "dataset search failed: {err}");
                (tracker.fail(err.to_string()), Vec::new())
            }
        };
        if let Err(err) = transition {
            tracing::error!(link_id = %link_id, "{err}");
        }
        tracing::debug!(link_id = %link_id, matches = matches.len(), state = %tracker.state(), "dataset done");

        DatasetOutcome {
            status: tracker.into_status(),
            matches,
        }
    }

    pub fn build_detailed_report(
        &self,
        search_term: &str,
        primary_id: Option<&str>,
        dataset_link_ids: &[String],
        search_type: SearchType,
    ) -> ProteinDetailedReport {
        build_detailed_report(
            &self.store,
            search_term,
            primary_id,
            dataset_link_ids,
            search_type,
            false,
        )
    }

    pub fn report_for(
        &self,
        result: &CrossDatasetSearchResult,
        summary: &ProteinSearchSummary,
    ) -> ProteinDetailedReport {
        report_for_summary(
            &self.store,
            summary,
            &result.config.dataset_link_ids,
            result.config.search_type,
            result.config.use_regex,
        )
    }

    pub fn build_matrix(
        &self,
        result: &CrossDatasetSearchResult,
        options: &MatrixFilterOptions,
    ) -> CrossDatasetMatrix {
        build_matrix(&self.store, result, options)
    }
}
