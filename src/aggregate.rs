use std::collections::{HashMap, HashSet};

use crate::domain::{ProteinSearchSummary, RawMatch};

#[derive(Default)]
struct Group<'a> {
    search_term: &'a str,
    primary_id: &'a str,
    gene_name: Option<&'a str>,
    datasets: HashSet<&'a str>,
    fold_change_sum: f64,
    fold_change_count: usize,
    any_significant: bool,
}

pub fn aggregate<'t>(
    search_terms: impl IntoIterator<Item = &'t str>,
    matches: &[RawMatch],
    total_datasets_searched: usize,
) -> Vec<ProteinSearchSummary> {
    let mut positions: HashMap<(&str, &str), usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();

    for hit in matches.iter().filter(|hit| hit.found) {
        let key = (hit.search_term.as_str(), hit.primary_id.as_str());
        let position = *positions.entry(key).or_insert_with(|| {
            groups.push(Group {
                search_term: key.0,
                primary_id: key.1,
                gene_name: hit.gene_name.as_deref(),
                ..Group::default()
            });
            groups.len() - 1
        });
        let group = &mut groups[position];
        group.datasets.insert(hit.dataset_link_id.as_str());
        if let Some(fold_change) = hit.fold_change {
            group.fold_change_sum += fold_change;
            group.fold_change_count += 1;
        }
        group.any_significant |= hit.is_significant;
    }

    let found_terms: HashSet<&str> = groups.iter().map(|group| group.search_term).collect();
    let mut summaries: Vec<ProteinSearchSummary> = groups
        .iter()
        .map(|group| ProteinSearchSummary {
            search_term: group.search_term.to_string(),
            primary_id: Some(group.primary_id.to_string()),
            gene_name: group.gene_name.map(str::to_string),
            datasets_found_in: group.datasets.len(),
            total_datasets_searched,
            average_fold_change: (group.fold_change_count > 0)
                .then(|| group.fold_change_sum / group.fold_change_count as f64),
            has_significant_result: group.any_significant,
        })
        .collect();

    let mut missing_seen = HashSet::new();
    for term in search_terms {
        if found_terms.contains(term) || !missing_seen.insert(term) {
            continue;
        }
        summaries.push(ProteinSearchSummary {
            search_term: term.to_string(),
            primary_id: None,
            gene_name: None,
            datasets_found_in: 0,
            total_datasets_searched,
            average_fold_change: None,
            has_significant_result: false,
        });
    }
    summaries
}
