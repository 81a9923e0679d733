use std::collections::HashSet;
use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CrossDatasetSearchConfig, CrossDatasetSearchResult, ProteinSearchSummary, iso_timestamp,
};
use crate::error::CurtainError;
use crate::store::write_bytes_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: u64,
    pub name: String,
    pub config_json: String,
    pub summaries_json: String,
    pub protein_count: usize,
    pub dataset_count: usize,
    pub created_at: String,
    #[serde(default)]
    pub last_opened_at: Option<String>,
}

impl SavedSearch {
    pub fn config(&self) -> Result<CrossDatasetSearchConfig, CurtainError> {
        serde_json::from_str(&self.config_json)
            .map_err(|err| CurtainError::SavedSearch(format!("config of {}: {err}", self.id)))
    }

    pub fn summaries(&self) -> Result<Vec<ProteinSearchSummary>, CurtainError> {
        serde_json::from_str(&self.summaries_json)
            .map_err(|err| CurtainError::SavedSearch(format!("summaries of {}: {err}", self.id)))
    }

    pub fn restore(&self) -> Result<CrossDatasetSearchResult, CurtainError> {
        Ok(CrossDatasetSearchResult {
            config: self.config()?,
            protein_summaries: self.summaries()?,
            search_timestamp: self.created_at.clone(),
            dataset_statuses: Vec::new(),
        })
    }
}

pub trait SavedSearchStore {
    fn save(
        &self,
        name: &str,
        config: &CrossDatasetSearchConfig,
        summaries: &[ProteinSearchSummary],
    ) -> Result<u64, CurtainError>;

    fn load_all(&self) -> Result<Vec<SavedSearch>, CurtainError>;

    fn rename(&self, id: u64, name: &str) -> Result<(), CurtainError>;

    fn delete(&self, id: u64) -> Result<(), CurtainError>;

    fn touch_last_opened(&self, id: u64) -> Result<(), CurtainError>;

    fn get(&self, id: u64) -> Result<SavedSearch, CurtainError> {
        self.load_all()?
            .into_iter()
            .find(|search| search.id == id)
            .ok_or(CurtainError::SavedSearchNotFound(id))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedSearchFile {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    searches: Vec<SavedSearch>,
}

#[derive(Debug)]
pub struct JsonSavedSearchStore {
    path: Utf8PathBuf,
    lock: Mutex<()>,
}

impl JsonSavedSearchStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn in_data_root(root: &Utf8Path) -> Self {
        Self::new(root.join("saved_searches.json"))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn read(&self) -> Result<SavedSearchFile, CurtainError> {
        if !self.path.as_std_path().exists() {
            return Ok(SavedSearchFile::default());
        }
        let content = fs::read_to_string(self.path.as_std_path())
            .map_err(|err| CurtainError::SavedSearch(format!("read {}: {err}", self.path)))?;
        serde_json::from_str(&content)
            .map_err(|err| CurtainError::SavedSearch(format!("parse {}: {err}", self.path)))
    }

    fn write(&self, file: &SavedSearchFile) -> Result<(), CurtainError> {
        let content = serde_json::to_vec_pretty(file)
            .map_err(|err| CurtainError::SavedSearch(err.to_string()))?;
        write_bytes_atomic(&self.path, &content)
            .map_err(|err| CurtainError::SavedSearch(err.to_string()))
    }

    fn update<F>(&self, id: u64, change: F) -> Result<(), CurtainError>
    where
        F: FnOnce(&mut SavedSearch),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CurtainError::SavedSearch("store lock poisoned".to_string()))?;
        let mut file = self.read()?;
        let search = file
            .searches
            .iter_mut()
            .find(|search| search.id == id)
            .ok_or(CurtainError::SavedSearchNotFound(id))?;
        change(search);
        self.write(&file)
    }
}

impl SavedSearchStore for JsonSavedSearchStore {
    fn save(
        &self,
        name: &str,
        config: &CrossDatasetSearchConfig,
        summaries: &[ProteinSearchSummary],
    ) -> Result<u64, CurtainError> {
        let name = validated_name(name)?;
        let config_json = serde_json::to_string(config)
            .map_err(|err| CurtainError::SavedSearch(err.to_string()))?;
        let summaries_json = serde_json::to_string(summaries)
            .map_err(|err| CurtainError::SavedSearch(err.to_string()))?;
        let protein_count = summaries
            .iter()
            .filter(|summary| summary.datasets_found_in > 0)
            .filter_map(|summary| summary.primary_id.as_deref())
            .collect::<HashSet<_>>()
            .len();

        let _guard = self
            .lock
            .lock()
            .map_err(|_| CurtainError::SavedSearch("store lock poisoned".to_string()))?;
        let mut file = self.read()?;
        let id = file.searches.iter().map(|search| search.id).max().unwrap_or(0) + 1;
        file.schema_version = Some(1);
        file.searches.push(SavedSearch {
            id,
            name,
            config_json,
            summaries_json,
            protein_count,
            dataset_count: config.dataset_link_ids.len(),
            created_at: iso_timestamp(),
            last_opened_at: None,
        });
        self.write(&file)?;
        tracing::info!(id, path = %self.path, "saved search stored");
        Ok(id)
    }

    fn load_all(&self) -> Result<Vec<SavedSearch>, CurtainError> {
        Ok(self.read()?.searches)
    }

    fn rename(&self, id: u64, name: &str) -> Result<(), CurtainError> {
        let name = validated_name(name)?;
        self.update(id, |search| search.name = name)
    }

    fn delete(&self, id: u64) -> Result<(), CurtainError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| CurtainError::SavedSearch("store lock poisoned".to_string()))?;
        let mut file = self.read()?;
        let before = file.searches.len();
        file.searches.retain(|search| search.id != id);
        if file.searches.len() == before {
            return Err(CurtainError::SavedSearchNotFound(id));
        }
        self.write(&file)
    }

    fn touch_last_opened(&self, id: u64) -> Result<(), CurtainError> {
        let now = iso_timestamp();
        self.update(id, |search| search.last_opened_at = Some(now))
    }
}

fn validated_name(name: &str) -> Result<String, CurtainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CurtainError::SavedSearch(
            "saved search name must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::SearchType;

    fn store() -> (tempfile::TempDir, JsonSavedSearchStore) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, JsonSavedSearchStore::in_data_root(&root))
    }

    fn config() -> CrossDatasetSearchConfig {
        CrossDatasetSearchConfig::new(
            vec!["AAK1".to_string(), "NOPE".to_string()],
            SearchType::GeneName,
            ["a".to_string(), "b".to_string()],
        )
    }

    fn summaries() -> Vec<ProteinSearchSummary> {
        vec![
            ProteinSearchSummary {
                search_term: "AAK1".to_string(),
                primary_id: Some("Q2M2I8".to_string()),
                gene_name: Some("AAK1".to_string()),
                datasets_found_in: 1,
                total_datasets_searched: 2,
                average_fold_change: Some(0.5),
                has_significant_result: true,
            },
            ProteinSearchSummary {
                search_term: "NOPE".to_string(),
                primary_id: None,
                gene_name: None,
                datasets_found_in: 0,
                total_datasets_searched: 2,
                average_fold_change: None,
                has_significant_result: false,
            },
        ]
    }

    #[test]
    fn save_and_restore() {
        let (_temp, store) = store();
        let id = store.save("kinases", &config(), &summaries()).unwrap();
        let saved = store.get(id).unwrap();
        assert_eq!(saved.name, "kinases");
        assert_eq!(saved.protein_count, 1);
        assert_eq!(saved.dataset_count, 2);

        let restored = saved.restore().unwrap();
        assert_eq!(restored.config, config());
        assert_eq!(restored.protein_summaries, summaries());
    }

    #[test]
    fn ids_increase() {
        let (_temp, store) = store();
        let first = store.save("one", &config(), &[]).unwrap();
        let second = store.save("two", &config(), &[]).unwrap();
        assert!(second > first);
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn rename_touch_delete() {
        let (_temp, store) = store();
        let id = store.save("one", &config(), &summaries()).unwrap();

        store.rename(id, "  renamed ").unwrap();
        store.touch_last_opened(id).unwrap();
        let saved = store.get(id).unwrap();
        assert_eq!(saved.name, "renamed");
        assert!(saved.last_opened_at.is_some());

        assert_matches!(store.rename(id, " "), Err(CurtainError::SavedSearch(_)));
        store.delete(id).unwrap();
        assert_matches!(store.delete(id), Err(CurtainError::SavedSearchNotFound(_)));
        assert_matches!(store.touch_last_opened(id), Err(CurtainError::SavedSearchNotFound(_)));
    }

    #[test]
    fn corrupt_file_is_a_saved_search_error() {
        let (_temp, store) = store();
        write_bytes_atomic(store.path(), b"[not valid").unwrap();
        assert_matches!(store.load_all(), Err(CurtainError::SavedSearch(_)));
    }
}
