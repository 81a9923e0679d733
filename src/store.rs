use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::dedup_preserving_order;
use crate::error::CurtainError;

const TABLE_FILE: &str = "dataset.json";
const TABLE_FILE_GZ: &str = "dataset.json.gz";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetTable {
    pub link_id: String,
    pub name: String,
    #[serde(default)]
    pub settings: SignificanceSettings,
    pub comparisons: Vec<Comparison>,
    pub rows: Vec<ProteinRow>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignificanceSettings {
    pub p_value_cutoff: f64,
    pub log2fc_cutoff: f64,
}

impl Default for SignificanceSettings {
    fn default() -> Self {
        Self {
            p_value_cutoff: 0.05,
            log2fc_cutoff: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub name: String,
    #[serde(default)]
    pub condition_left: Option<String>,
    #[serde(default)]
    pub condition_right: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProteinRow {
    pub primary_id: String,
    #[serde(default)]
    pub gene_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, ComparisonValue>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonValue {
    #[serde(default)]
    pub fold_change: Option<f64>,
    #[serde(default)]
    pub p_value: Option<f64>,
}

impl DatasetTable {
    pub fn is_significant(&self, value: &ComparisonValue) -> bool {
        match (value.fold_change, value.p_value) {
            (Some(fc), Some(p)) => {
                p <= self.settings.p_value_cutoff && fc.abs() >= self.settings.log2fc_cutoff
            }
            _ => false,
        }
    }

    pub fn sorted_comparisons(&self) -> Vec<&Comparison> {
        let mut comparisons: Vec<&Comparison> = self.comparisons.iter().collect();
        comparisons.sort_by(|a, b| a.name.cmp(&b.name));
        comparisons
    }

    pub fn validate(&self) -> Result<(), CurtainError> {
        let malformed = |message: String| CurtainError::MalformedDataset {
            link_id: self.link_id.clone(),
            message,
        };
        let mut names = HashSet::new();
        for comparison in &self.comparisons {
            if comparison.name.trim().is_empty() {
                return Err(malformed("comparison with empty name".to_string()));
            }
            if !names.insert(comparison.name.as_str()) {
                return Err(malformed(format!(
                    "duplicate comparison {}",
                    comparison.name
                )));
            }
        }
        for (position, row) in self.rows.iter().enumerate() {
            if row.primary_id.trim().is_empty() {
                return Err(malformed(format!("row {position} has no primary id")));
            }
            if let Some(unknown) = row.values.keys().find(|key| !names.contains(key.as_str())) {
                return Err(malformed(format!(
                    "row {} references unknown comparison {unknown}",
                    row.primary_id
                )));
            }
        }
        Ok(())
    }
}

pub trait DatasetStore: Send + Sync {
    fn dataset_exists(&self, link_id: &str) -> bool;

    fn load(&self, link_id: &str) -> Result<Arc<DatasetTable>, CurtainError>;

    fn needs_build(&self, _link_id: &str) -> bool {
        false
    }

    fn build(&self, _link_id: &str) -> Result<(), CurtainError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetListing {
    pub link_id: String,
    pub display_name: String,
}

pub trait DatasetRepository {
    fn list_available_datasets(&self) -> Result<Vec<DatasetListing>, CurtainError>;

    fn resolve_collection(&self, name: &str) -> Result<Vec<String>, CurtainError>;
}

pub fn resolve_selection<R: DatasetRepository + ?Sized>(
    repository: &R,
    link_ids: &[String],
    collections: &[String],
) -> Result<Vec<String>, CurtainError> {
    let mut selection = link_ids.to_vec();
    for collection in collections {
        selection.extend(repository.resolve_collection(collection)?);
    }
    Ok(dedup_preserving_order(selection))
}

#[derive(Debug)]
pub struct FileDatasetStore {
    root: Utf8PathBuf,
    collections: BTreeMap<String, Vec<String>>,
    loaded: Mutex<HashMap<String, Arc<DatasetTable>>>,
}

impl FileDatasetStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            collections: BTreeMap::new(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_collections(mut self, collections: BTreeMap<String, Vec<String>>) -> Self {
        self.collections = collections;
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn datasets_dir(&self) -> Utf8PathBuf {
        self.root.join("datasets")
    }

    pub fn dataset_dir(&self, link_id: &str) -> Utf8PathBuf {
        self.datasets_dir().join(link_id)
    }

    pub fn table_path(&self, link_id: &str) -> Utf8PathBuf {
        self.dataset_dir(link_id).join(TABLE_FILE)
    }

    pub fn compressed_table_path(&self, link_id: &str) -> Utf8PathBuf {
        self.dataset_dir(link_id).join(TABLE_FILE_GZ)
    }

    pub fn save_table(&self, table: &DatasetTable, compressed: bool) -> Result<(), CurtainError> {
        checked_link_id(&table.link_id)?;
        table.validate()?;
        let content = serde_json::to_vec_pretty(table)
            .map_err(|err| CurtainError::Filesystem(err.to_string()))?;
        let plain = self.table_path(&table.link_id);
        let packed = self.compressed_table_path(&table.link_id);
        if compressed {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&content)
                .map_err(|err| CurtainError::Filesystem(err.to_string()))?;
            let bytes = encoder
                .finish()
                .map_err(|err| CurtainError::Filesystem(err.to_string()))?;
            write_bytes_atomic(&packed, &bytes)?;
            remove_if_exists(&plain)?;
        } else {
            write_bytes_atomic(&plain, &content)?;
            remove_if_exists(&packed)?;
        }
        if let Ok(mut loaded) = self.loaded.lock() {
            loaded.remove(&table.link_id);
        }
        Ok(())
    }

    fn read_table(&self, link_id: &str) -> Result<DatasetTable, CurtainError> {
        let path = self.table_path(link_id);
        let content = fs::read(path.as_std_path()).map_err(|err| {
            CurtainError::DatasetUnavailable {
                link_id: link_id.to_string(),
                message: format!("read {path}: {err}"),
            }
        })?;
        let table: DatasetTable =
            serde_json::from_slice(&content).map_err(|err| CurtainError::MalformedDataset {
                link_id: link_id.to_string(),
                message: err.to_string(),
            })?;
        if table.link_id != link_id {
            return Err(CurtainError::MalformedDataset {
                link_id: link_id.to_string(),
                message: format!("table declares link id {}", table.link_id),
            });
        }
        table.validate()?;
        Ok(table)
    }

    fn dataset_ids(&self) -> Result<Vec<String>, CurtainError> {
        let dir = self.datasets_dir();
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(dir.as_std_path()).map_err(|err| CurtainError::Filesystem(err.to_string()))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CurtainError::Filesystem(err.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.dataset_exists(&name) {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl DatasetStore for FileDatasetStore {
    fn dataset_exists(&self, link_id: &str) -> bool {
        if checked_link_id(link_id).is_err() {
            return false;
        }
        self.table_path(link_id).as_std_path().exists()
            || self.compressed_table_path(link_id).as_std_path().exists()
    }

    fn load(&self, link_id: &str) -> Result<Arc<DatasetTable>, CurtainError> {
        checked_link_id(link_id)?;
        if let Some(table) = self
            .loaded
            .lock()
            .ok()
            .and_then(|loaded| loaded.get(link_id).cloned())
        {
            return Ok(table);
        }
        if !self.dataset_exists(link_id) {
            return Err(CurtainError::DatasetNotFound(link_id.to_string()));
        }
        if self.needs_build(link_id) {
            self.build(link_id)?;
        }
        let table = Arc::new(self.read_table(link_id)?);
        if let Ok(mut loaded) = self.loaded.lock() {
            loaded.insert(link_id.to_string(), table.clone());
        }
        Ok(table)
    }

    fn needs_build(&self, link_id: &str) -> bool {
        checked_link_id(link_id).is_ok()
            && !self.table_path(link_id).as_std_path().exists()
            && self.compressed_table_path(link_id).as_std_path().exists()
    }

    fn build(&self, link_id: &str) -> Result<(), CurtainError> {
        checked_link_id(link_id)?;
        let packed = self.compressed_table_path(link_id);
        let file = fs::File::open(packed.as_std_path()).map_err(|err| {
            CurtainError::DatasetUnavailable {
                link_id: link_id.to_string(),
                message: format!("open {packed}: {err}"),
            }
        })?;
        let mut content = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut content)
            .map_err(|err| CurtainError::MalformedDataset {
                link_id: link_id.to_string(),
                message: format!("decompress {packed}: {err}"),
            })?;
        tracing::debug!(link_id, bytes = content.len(), "materialized dataset table");
        write_bytes_atomic(&self.table_path(link_id), &content)
    }
}

impl DatasetRepository for FileDatasetStore {
    fn list_available_datasets(&self) -> Result<Vec<DatasetListing>, CurtainError> {
        self.dataset_ids()?
            .into_iter()
            .map(|link_id| {
                let table = self.load(&link_id)?;
                Ok(DatasetListing {
                    display_name: table.name.clone(),
                    link_id,
                })
            })
            .collect()
    }

    fn resolve_collection(&self, name: &str) -> Result<Vec<String>, CurtainError> {
        self.collections
            .get(name)
            .map(|members| dedup_preserving_order(members.iter().cloned()))
            .ok_or_else(|| CurtainError::UnknownCollection(name.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    tables: HashMap<String, Arc<DatasetTable>>,
}

impl MemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: DatasetTable) -> Result<(), CurtainError> {
        table.validate()?;
        self.tables.insert(table.link_id.clone(), Arc::new(table));
        Ok(())
    }

    pub fn with_table(mut self, table: DatasetTable) -> Result<Self, CurtainError> {
        self.insert(table)?;
        Ok(self)
    }
}

impl DatasetStore for MemoryDatasetStore {
    fn dataset_exists(&self, link_id: &str) -> bool {
        self.tables.contains_key(link_id)
    }

    fn load(&self, link_id: &str) -> Result<Arc<DatasetTable>, CurtainError> {
        self.tables
            .get(link_id)
            .cloned()
            .ok_or_else(|| CurtainError::DatasetNotFound(link_id.to_string()))
    }
}

fn checked_link_id(link_id: &str) -> Result<(), CurtainError> {
    let invalid = link_id.trim().is_empty()
        || link_id.contains(['/', '\\'])
        || link_id == "."
        || link_id.contains("..");
    if invalid {
        return Err(CurtainError::InvalidDatasetId(link_id.to_string()));
    }
    Ok(())
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CurtainError> {
    let parent = path
        .parent()
        .ok_or_else(|| CurtainError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CurtainError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("curtain-search")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CurtainError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CurtainError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CurtainError::Filesystem(err.to_string()))?;
    Ok(())
}

fn remove_if_exists(path: &Utf8Path) -> Result<(), CurtainError> {
    if path.as_std_path().exists() {
        fs::remove_file(path.as_std_path())
            .map_err(|err| CurtainError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
