use std::collections::BTreeSet;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use curtain_search::app::App;
use curtain_search::config::{ConfigLoader, ResolvedConfig};
use curtain_search::domain::{
    AdvancedFilterParams, CrossDatasetSearchConfig, CrossDatasetSearchResult, SearchType,
    SortOption,
};
use curtain_search::error::CurtainError;
use curtain_search::export::{export_matrix_csv, export_summaries_csv};
use curtain_search::matrix::{CrossDatasetMatrix, MatrixFilterOptions};
use curtain_search::output::{JsonOutput, OutputFormat, SavedSearchEntry, StderrStatus};
use curtain_search::report::build_detailed_report;
use curtain_search::saved::{JsonSavedSearchStore, SavedSearchStore};
use curtain_search::status::{NoopSink, StatusSink};
use curtain_search::store::{DatasetRepository, FileDatasetStore, resolve_selection};
use curtain_search::terms::normalize_terms;

#[derive(Parser)]
#[command(name = "curtain-search")]
#[command(about = "Search proteins across locally stored curtain sessions")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true, help = "Do not stream dataset status to stderr")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List locally available datasets")]
    Datasets,
    #[command(about = "Search terms across datasets")]
    Search(SearchCommand),
    #[command(about = "Show one protein's per-comparison report")]
    Report(ReportArgs),
    #[command(about = "Pivot a search into a protein x comparison matrix")]
    Matrix(MatrixArgs),
    #[command(about = "Manage saved searches")]
    Saved(SavedArgs),
}

#[derive(Args, Clone)]
struct SelectionArgs {
    #[arg(long = "dataset", help = "Dataset link id (repeatable)")]
    datasets: Vec<String>,

    #[arg(long = "collection", help = "Named collection from the config (repeatable)")]
    collections: Vec<String>,

    #[arg(long = "type", value_enum, default_value = "gene-name")]
    search_type: SearchType,

    #[arg(long)]
    regex: bool,
}

#[derive(Args, Clone)]
struct SearchArgs {
    #[arg(help = "Search terms; `;` separates several terms in one argument")]
    terms: Vec<String>,

    #[arg(long)]
    terms_file: Option<String>,

    #[command(flatten)]
    selection: SelectionArgs,

    #[arg(long)]
    significant_only: bool,

    #[arg(long)]
    min_p: Option<f64>,

    #[arg(long)]
    max_p: Option<f64>,

    #[arg(long)]
    min_fc_left: Option<f64>,

    #[arg(long)]
    max_fc_left: Option<f64>,

    #[arg(long)]
    min_fc_right: Option<f64>,

    #[arg(long)]
    max_fc_right: Option<f64>,

    #[arg(long)]
    search_left: bool,

    #[arg(long)]
    search_right: bool,

    #[arg(long, value_enum)]
    sort: Option<SortOption>,
}

#[derive(Args)]
struct SearchCommand {
    #[command(flatten)]
    search: SearchArgs,

    #[arg(long)]
    csv: bool,

    #[arg(long, help = "Store the result as a saved search with this name")]
    save: Option<String>,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    term: String,

    #[arg(long)]
    primary_id: Option<String>,

    #[command(flatten)]
    selection: SelectionArgs,
}

#[derive(Args)]
struct MatrixArgs {
    #[command(flatten)]
    search: SearchArgs,

    #[arg(long, help = "Build from a saved search instead of searching again")]
    saved: Option<u64>,

    #[arg(long)]
    show_significant_only: bool,

    #[arg(long)]
    hide_not_found: bool,

    #[arg(long)]
    min_fold_change: Option<f64>,

    #[arg(long)]
    max_p_value: Option<f64>,

    #[arg(long = "only-dataset", help = "Restrict matrix rows to these datasets")]
    only_datasets: Vec<String>,

    #[arg(long)]
    csv: bool,
}

#[derive(Args)]
struct SavedArgs {
    #[command(subcommand)]
    command: SavedCommand,
}

#[derive(Subcommand)]
enum SavedCommand {
    #[command(about = "List saved searches")]
    List,
    #[command(about = "Print a saved search result")]
    Open {
        id: u64,
        #[arg(long)]
        csv: bool,
    },
    #[command(about = "Rename a saved search")]
    Rename { id: u64, name: String },
    #[command(about = "Delete a saved search")]
    Delete { id: u64 },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CurtainError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CurtainError) -> u8 {
    match error {
        error if error.is_validation() => 2,
        CurtainError::DatasetNotFound(_)
        | CurtainError::DatasetUnavailable { .. }
        | CurtainError::MalformedDataset { .. } => 3,
        CurtainError::SavedSearch(_) | CurtainError::SavedSearchNotFound(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = FileDatasetStore::new(config.data_root.clone())
        .with_collections(config.collections.clone());
    let saved = JsonSavedSearchStore::in_data_root(&config.data_root);
    let sink: &dyn StatusSink = if cli.quiet { &NoopSink } else { &StderrStatus };

    match cli.command {
        Commands::Datasets => {
            let datasets = store.list_available_datasets()?;
            JsonOutput::print_datasets(&datasets).into_diagnostic()
        }
        Commands::Search(args) => {
            let search_config = build_search_config(&args.search, &store)?;
            let app = build_app(store, &config, args.search.sort);
            let result = app.search_across_datasets(search_config, sink)?;
            if let Some(name) = &args.save {
                let id = saved.save(name, &result.config, &result.protein_summaries)?;
                eprintln!("saved search {id}: {name}");
            }
            print_result(&result, output_format(args.csv))
        }
        Commands::Report(args) => {
            let datasets = resolve_selection(
                &store,
                &args.selection.datasets,
                &args.selection.collections,
            )?;
            if datasets.is_empty() {
                return Err(CurtainError::EmptyDatasetSelection.into());
            }
            let report = build_detailed_report(
                &store,
                &args.term,
                args.primary_id.as_deref(),
                &datasets,
                args.selection.search_type,
                args.selection.regex,
            );
            JsonOutput::print_report(&report).into_diagnostic()
        }
        Commands::Matrix(args) => {
            let options = MatrixFilterOptions {
                show_significant_only: args.show_significant_only,
                hide_not_found: args.hide_not_found,
                min_fold_change: args.min_fold_change,
                max_p_value: args.max_p_value,
                selected_datasets: (!args.only_datasets.is_empty())
                    .then(|| args.only_datasets.iter().cloned().collect::<BTreeSet<_>>()),
            };
            let app = build_app(store, &config, args.search.sort);
            let result = match args.saved {
                Some(id) => {
                    let search = saved.get(id)?;
                    saved.touch_last_opened(id)?;
                    search.restore()?
                }
                None => {
                    let search_config = build_search_config(&args.search, app.store())?;
                    app.search_across_datasets(search_config, sink)?
                }
            };
            let matrix = app.build_matrix(&result, &options);
            print_matrix(&matrix, output_format(args.csv))
        }
        Commands::Saved(args) => run_saved(args.command, &saved),
    }
}

fn run_saved(command: SavedCommand, saved: &JsonSavedSearchStore) -> miette::Result<()> {
    match command {
        SavedCommand::List => {
            let searches = saved.load_all()?;
            let entries: Vec<SavedSearchEntry> = searches.iter().map(SavedSearchEntry::from).collect();
            JsonOutput::print_saved(&entries).into_diagnostic()
        }
        SavedCommand::Open { id, csv } => {
            let search = saved.get(id)?;
            saved.touch_last_opened(id)?;
            let result = search.restore()?;
            print_result(&result, output_format(csv))
        }
        SavedCommand::Rename { id, name } => {
            saved.rename(id, &name)?;
            Ok(())
        }
        SavedCommand::Delete { id } => {
            saved.delete(id)?;
            Ok(())
        }
    }
}

fn build_app(
    store: FileDatasetStore,
    config: &ResolvedConfig,
    sort: Option<SortOption>,
) -> App<FileDatasetStore> {
    let app = App::from_config(store, config);
    match sort {
        Some(sort) => app.with_default_sort(sort),
        None => app,
    }
}

fn build_search_config(
    args: &SearchArgs,
    store: &FileDatasetStore,
) -> Result<CrossDatasetSearchConfig, CurtainError> {
    let mut raw = args.terms.join("\n");
    if let Some(path) = &args.terms_file {
        let content = std::fs::read_to_string(path)
            .map_err(|err| CurtainError::Filesystem(format!("read {path}: {err}")))?;
        raw.push('\n');
        raw.push_str(&content);
    }
    let terms = normalize_terms(&raw)?;
    let datasets = resolve_selection(store, &args.selection.datasets, &args.selection.collections)?;

    let advanced = AdvancedFilterParams {
        min_p: args.min_p,
        max_p: args.max_p,
        min_fc_left: args.min_fc_left,
        max_fc_left: args.max_fc_left,
        min_fc_right: args.min_fc_right,
        max_fc_right: args.max_fc_right,
        search_left: args.search_left,
        search_right: args.search_right,
    };
    let advanced = (advanced != AdvancedFilterParams::default()).then_some(advanced);

    let config = CrossDatasetSearchConfig::new(terms, args.selection.search_type, datasets)
        .with_regex(args.selection.regex)
        .with_significant_only(args.significant_only)
        .with_advanced_filtering(advanced);
    config.validate()?;
    Ok(config)
}

fn output_format(csv: bool) -> OutputFormat {
    if csv { OutputFormat::Csv } else { OutputFormat::Json }
}

fn print_result(result: &CrossDatasetSearchResult, format: OutputFormat) -> miette::Result<()> {
    match format {
        OutputFormat::Json => JsonOutput::print_result(result).into_diagnostic(),
        OutputFormat::Csv => JsonOutput::print_text(&export_summaries_csv(result)?).into_diagnostic(),
    }
}

fn print_matrix(
    matrix: &CrossDatasetMatrix,
    format: OutputFormat,
) -> miette::Result<()> {
    match format {
        OutputFormat::Json => JsonOutput::print_matrix(matrix).into_diagnostic(),
        OutputFormat::Csv => JsonOutput::print_text(&export_matrix_csv(matrix)?).into_diagnostic(),
    }
}
