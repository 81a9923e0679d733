use std::cmp::Ordering;

use crate::domain::{ProteinSearchSummary, SortOption};

pub fn sort_summaries(summaries: &mut [ProteinSearchSummary], option: SortOption) {
    summaries.sort_by(|a, b| compare(a, b, option));
}

pub fn compare(a: &ProteinSearchSummary, b: &ProteinSearchSummary, option: SortOption) -> Ordering {
    match option {
        SortOption::NameAsc => a.display_name().cmp(b.display_name()),
        SortOption::NameDesc => b.display_name().cmp(a.display_name()),
        SortOption::MatchCountDesc => b
            .datasets_found_in
            .cmp(&a.datasets_found_in)
            .then_with(|| abs_average(b).total_cmp(&abs_average(a))),
        SortOption::AvgFcAsc => average(a).total_cmp(&average(b)),
        SortOption::AvgFcDesc => average(b).total_cmp(&average(a)),
    }
}

fn average(summary: &ProteinSearchSummary) -> f64 {
    summary.average_fold_change.unwrap_or(0.0)
}

fn abs_average(summary: &ProteinSearchSummary) -> f64 {
    average(summary).abs()
}
