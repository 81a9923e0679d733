use regex::{Regex, RegexBuilder};

use crate::domain::{
    AdvancedFilterParams, CrossDatasetSearchConfig, DatasetState, RawMatch, SearchType,
};
use crate::error::CurtainError;
use crate::status::StatusTracker;
use crate::store::{DatasetStore, DatasetTable, ProteinRow};

#[derive(Debug, Clone, Copy, Default)]
pub struct RowFilter<'a> {
    pub significant_only: bool,
    pub advanced: Option<&'a AdvancedFilterParams>,
}

impl<'a> RowFilter<'a> {
    pub fn from_config(config: &'a CrossDatasetSearchConfig) -> Self {
        Self {
            significant_only: config.significant_only,
            advanced: config.advanced_filtering.as_ref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TermMatcher {
    term: String,
    search_type: SearchType,
    pattern: Pattern,
}

#[derive(Debug, Clone)]
enum Pattern {
    Regex(Regex),
    Literal(String),
}

impl TermMatcher {
    pub fn compile(term: &str, search_type: SearchType, use_regex: bool) -> Result<Self, CurtainError> {
        let term = term.trim().to_string();
        let pattern = if use_regex {
            let regex = RegexBuilder::new(&term)
                .case_insensitive(true)
                .build()
                .map_err(|err| CurtainError::InvalidRegex {
                    pattern: term.clone(),
                    message: err.to_string(),
                })?;
            Pattern::Regex(regex)
        } else {
            Pattern::Literal(term.to_lowercase())
        };
        Ok(Self {
            term,
            search_type,
            pattern,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn matches(&self, row: &ProteinRow) -> bool {
        let field = match self.search_type {
            SearchType::PrimaryId => Some(row.primary_id.as_str()),
            SearchType::GeneName => row.gene_name.as_deref(),
            SearchType::Description => row.description.as_deref(),
        };
        let Some(field) = field else {
            return false;
        };
        match &self.pattern {
            Pattern::Regex(regex) => regex.is_match(field),
            Pattern::Literal(needle) => match self.search_type {
                SearchType::PrimaryId | SearchType::GeneName => field
                    .split(';')
                    .any(|token| token.trim().to_lowercase() == *needle),
                SearchType::Description => field.to_lowercase().contains(needle.as_str()),
            },
        }
    }
}

pub fn compile_terms(config: &CrossDatasetSearchConfig) -> Result<Vec<TermMatcher>, CurtainError> {
    config
        .search_terms
        .iter()
        .filter(|term| !term.trim().is_empty())
        .map(|term| TermMatcher::compile(term, config.search_type, config.use_regex))
        .collect()
}

pub fn search_table(
    table: &DatasetTable,
    matchers: &[TermMatcher],
    filter: RowFilter<'_>,
) -> Vec<RawMatch> {
    let comparisons = table.sorted_comparisons();
    let mut matches = Vec::new();
    for matcher in matchers {
        for row in table.rows.iter().filter(|row| matcher.matches(row)) {
            for comparison in &comparisons {
                let value = row.values.get(&comparison.name).copied().unwrap_or_default();
                let is_significant = table.is_significant(&value);
                if filter.significant_only && !is_significant {
                    continue;
                }
                if let Some(advanced) = filter.advanced
                    && !advanced.accepts(value.fold_change, value.p_value)
                {
                    continue;
                }
                matches.push(RawMatch {
                    search_term: matcher.term().to_string(),
                    primary_id: row.primary_id.clone(),
                    gene_name: row.gene_name.clone(),
                    fold_change: value.fold_change,
                    p_value: value.p_value,
                    is_significant,
                    comparison: comparison.name.clone(),
                    dataset_link_id: table.link_id.clone(),
                    found: true,
                });
            }
        }
    }
    matches
}

// Leaves the tracker in `searching`; the caller owns the terminal transition.
pub fn search_dataset<S: DatasetStore + ?Sized>(
    store: &S,
    link_id: &str,
    matchers: &[TermMatcher],
    filter: RowFilter<'_>,
    tracker: &mut StatusTracker<'_>,
) -> Result<Vec<RawMatch>, CurtainError> {
    tracker.advance(DatasetState::Loading)?;
    if !store.dataset_exists(link_id) {
        return Err(CurtainError::DatasetNotFound(link_id.to_string()));
    }
    if store.needs_build(link_id) {
        tracker.advance(DatasetState::Building)?;
        store.build(link_id)?;
    }
    let table = store.load(link_id)?;
    tracker.set_dataset_name(&table.name);
    tracker.advance(DatasetState::Searching)?;
    Ok(search_table(&table, matchers, filter))
}

pub fn query<S: DatasetStore + ?Sized>(
    store: &S,
    link_id: &str,
    search_term: &str,
    search_type: SearchType,
    use_regex: bool,
    filter: RowFilter<'_>,
) -> Result<Vec<RawMatch>, CurtainError> {
    let matcher = TermMatcher::compile(search_term, search_type, use_regex)?;
    let table = store.load(link_id)?;
    Ok(search_table(&table, std::slice::from_ref(&matcher), filter))
}
