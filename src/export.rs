use csv::{ReaderBuilder, Writer};

use crate::domain::{CrossDatasetSearchResult, ProteinSearchSummary};
use crate::error::CurtainError;
use crate::matrix::CrossDatasetMatrix;

const SUMMARY_HEADER: [&str; 7] = [
    "searchTerm",
    "primaryId",
    "geneName",
    "datasetsFoundIn",
    "totalDatasetsSearched",
    "averageFoldChange",
    "hasSignificantResult",
];

const MATRIX_HEADER: [&str; 4] = ["datasetLinkId", "comparison", "conditionLeft", "conditionRight"];

pub fn export_summaries_csv(result: &CrossDatasetSearchResult) -> Result<String, CurtainError> {
    summaries_to_csv(&result.protein_summaries)
}

pub fn summaries_to_csv(summaries: &[ProteinSearchSummary]) -> Result<String, CurtainError> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(SUMMARY_HEADER).map_err(export_error)?;
    for summary in summaries {
        writer
            .write_record([
                summary.search_term.clone(),
                summary.primary_id.clone().unwrap_or_default(),
                summary.gene_name.clone().unwrap_or_default(),
                summary.datasets_found_in.to_string(),
                summary.total_datasets_searched.to_string(),
                summary
                    .average_fold_change
                    .map(|value| value.to_string())
                    .unwrap_or_default(),
                summary.has_significant_result.to_string(),
            ])
            .map_err(export_error)?;
    }
    finish(writer)
}

pub fn import_summaries_csv(content: &str) -> Result<Vec<ProteinSearchSummary>, CurtainError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());
    let header = reader.headers().map_err(export_error)?.clone();
    if header.iter().ne(SUMMARY_HEADER) {
        return Err(CurtainError::Export(format!(
            "unexpected summary header: {}",
            header.iter().collect::<Vec<_>>().join(",")
        )));
    }
    reader
        .deserialize::<ProteinSearchSummary>()
        .map(|record| record.map_err(export_error))
        .collect()
}

pub fn export_matrix_csv(matrix: &CrossDatasetMatrix) -> Result<String, CurtainError> {
    let mut writer = Writer::from_writer(Vec::new());
    let header = MATRIX_HEADER
        .iter()
        .map(|column| column.to_string())
        .chain(
            matrix
                .protein_ids
                .iter()
                .map(|protein_id| matrix.column_label(protein_id).to_string()),
        );
    writer.write_record(header).map_err(export_error)?;

    for row in &matrix.rows {
        let fixed = [
            row.dataset_link_id.clone(),
            row.comparison.clone(),
            row.condition_left.clone().unwrap_or_default(),
            row.condition_right.clone().unwrap_or_default(),
        ];
        let values = matrix.protein_ids.iter().map(|protein_id| {
            row.cells
                .get(protein_id)
                .filter(|cell| cell.found)
                .and_then(|cell| cell.fold_change)
                .map(|fc| format!("{fc:.4}"))
                .unwrap_or_default()
        });
        writer
            .write_record(fixed.into_iter().chain(values))
            .map_err(export_error)?;
    }
    finish(writer)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String, CurtainError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| CurtainError::Export(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| CurtainError::Export(err.to_string()))
}

fn export_error(err: csv::Error) -> CurtainError {
    CurtainError::Export(err.to_string())
}
