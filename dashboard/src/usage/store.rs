use beaglegaze::StorageError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::models::{LibraryUsage, UsageInput};
use super::UsageError;

/// File name used by [`LibraryUsageStore::open_in_dir`]
pub const USAGE_FILE: &str = "library-usage.json";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageDocument {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    usages: Vec<LibraryUsage>,
}

/// File-backed usage log
///
/// Ids are assigned in insertion order and never reused. Every mutation
/// writes the whole document back to disk.
pub struct LibraryUsageStore {
    path: PathBuf,
    doc: UsageDocument,
}

impl LibraryUsageStore {
    /// Load the log from `path`; a missing or unreadable file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut doc = match Self::read(&path) {
            Ok(Some(doc)) => {
                log::info!(
                    "Loaded {} library usage record(s) from {}",
                    doc.usages.len(),
                    path.display()
                );
                doc
            }
            Ok(None) => UsageDocument::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable usage log {}: {}", path.display(), e);
                UsageDocument::default()
            }
        };
        // A hand-edited file may carry a stale counter
        let max_id = doc.usages.iter().map(|u| u.id).max().unwrap_or(0);
        doc.next_id = doc.next_id.max(max_id + 1);
        Self { path, doc }
    }

    pub fn open_in_dir(dir: &Path) -> Self {
        Self::open(dir.join(USAGE_FILE))
    }

    fn read(path: &Path) -> Result<Option<UsageDocument>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn persist(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.doc)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> Vec<LibraryUsage> {
        self.doc.usages.clone()
    }

    pub fn get(&self, id: u64) -> Option<LibraryUsage> {
        self.doc.usages.iter().find(|u| u.id == id).cloned()
    }

    pub fn by_library(&self, library_name: &str) -> Vec<LibraryUsage> {
        self.filtered(|u| u.library_name == library_name)
    }

    pub fn by_project(&self, project_name: &str) -> Vec<LibraryUsage> {
        self.filtered(|u| u.project_name == project_name)
    }

    pub fn by_library_and_version(&self, library_name: &str, version: &str) -> Vec<LibraryUsage> {
        self.filtered(|u| u.library_name == library_name && u.version == version)
    }

    /// Highest usage count first
    pub fn top_used(&self) -> Vec<LibraryUsage> {
        let mut usages = self.all();
        usages.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        usages
    }

    /// Most recently used first
    pub fn recent(&self) -> Vec<LibraryUsage> {
        let mut usages = self.all();
        usages.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        usages
    }

    fn filtered<F>(&self, keep: F) -> Vec<LibraryUsage>
    where
        F: Fn(&LibraryUsage) -> bool,
    {
        self.doc.usages.iter().filter(|u| keep(u)).cloned().collect()
    }

    /// Record a new usage; `lastUsed` defaults to now
    pub fn create(&mut self, input: &UsageInput) -> Result<LibraryUsage, UsageError> {
        let fields = input.validate()?;
        let id = self.doc.next_id;
        let usage = LibraryUsage::from_fields(id, fields, Utc::now());
        self.doc.next_id += 1;
        self.doc.usages.push(usage.clone());
        self.persist()?;
        log::debug!(
            "Recorded usage #{} {}::{} for {}",
            id,
            usage.library_name,
            usage.method_name,
            usage.project_name
        );
        Ok(usage)
    }

    pub fn update(&mut self, id: u64, input: &UsageInput) -> Result<LibraryUsage, UsageError> {
        let fields = input.validate()?;
        let usage = self
            .doc
            .usages
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(UsageError::NotFound(id))?;
        usage.apply(fields);
        let updated = usage.clone();
        self.persist()?;
        Ok(updated)
    }

    pub fn delete(&mut self, id: u64) -> Result<(), UsageError> {
        let before = self.doc.usages.len();
        self.doc.usages.retain(|u| u.id != id);
        if self.doc.usages.len() == before {
            return Err(UsageError::NotFound(id));
        }
        self.persist()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn input(library: &str, project: &str, method: &str, count: u64) -> UsageInput {
        UsageInput {
            library_name: Some(library.to_string()),
            version: Some("1.0.0".to_string()),
            project_name: Some(project.to_string()),
            method_name: Some(method.to_string()),
            usage_count: Some(count),
            ..UsageInput::default()
        }
    }

    #[test]
    fn test_create_assigns_ids_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = LibraryUsageStore::open_in_dir(dir.path());
        let first = store.create(&input("json", "api", "parse", 3)).unwrap();
        let second = store.create(&input("json", "cli", "write", 1)).unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let reopened = LibraryUsageStore::open_in_dir(dir.path());
        assert_eq!(reopened.all(), vec![first.clone(), second]);
        assert_eq!(reopened.get(1), Some(first));
        assert_eq!(reopened.get(9), None);
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let dir = TempDir::new().unwrap();
        let mut store = LibraryUsageStore::open_in_dir(dir.path());
        store.create(&input("a", "p", "m", 1)).unwrap();
        let second = store.create(&input("b", "p", "m", 1)).unwrap();
        store.delete(second.id).unwrap();

        let mut reopened = LibraryUsageStore::open_in_dir(dir.path());
        let third = reopened.create(&input("c", "p", "m", 1)).unwrap();
        assert_eq!(third.id, 3);
        assert!(matches!(reopened.delete(second.id), Err(UsageError::NotFound(2))));
    }

    #[test]
    fn test_queries() {
        let dir = TempDir::new().unwrap();
        let mut store = LibraryUsageStore::open_in_dir(dir.path());
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        for (i, (library, project, count)) in
            [("json", "api", 5), ("http", "api", 40), ("json", "cli", 12)]
                .iter()
                .enumerate()
        {
            let mut record = input(library, project, "call", *count);
            record.last_used = Some(base + Duration::hours(i as i64));
            store.create(&record).unwrap();
        }
        let mut v2 = input("json", "api", "call", 1);
        v2.version = Some("2.0.0".to_string());
        v2.last_used = Some(base - Duration::days(1));
        store.create(&v2).unwrap();

        let ids = |list: Vec<LibraryUsage>| list.iter().map(|u| u.id).collect::<Vec<_>>();
        assert_eq!(ids(store.by_library("json")), vec![1, 3, 4]);
        assert_eq!(ids(store.by_project("api")), vec![1, 2, 4]);
        assert_eq!(ids(store.by_library_and_version("json", "2.0.0")), vec![4]);
        assert_eq!(ids(store.top_used()), vec![2, 3, 1, 4]);
        assert_eq!(ids(store.recent()), vec![3, 2, 1, 4]);
        assert!(store.by_library("Json").is_empty());
    }

    #[test]
    fn test_update_replaces_fields() {
        let dir = TempDir::new().unwrap();
        let mut store = LibraryUsageStore::open_in_dir(dir.path());
        let created = store.create(&input("json", "api", "parse", 3)).unwrap();

        let mut change = input("json", "api", "parse", 10);
        change.metadata = Some(r#"{"host":"ci"}"#.to_string());
        let updated = store.update(created.id, &change).unwrap();
        assert_eq!(updated.usage_count, 10);
        assert_eq!(updated.last_used, created.last_used);
        assert_eq!(updated.metadata.as_deref(), Some(r#"{"host":"ci"}"#));

        assert!(matches!(
            store.update(99, &change),
            Err(UsageError::NotFound(99))
        ));
        assert!(matches!(
            store.update(created.id, &UsageInput::default()),
            Err(UsageError::Invalid(_))
        ));
        assert_eq!(store.get(created.id), Some(updated));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(USAGE_FILE), "{not json").unwrap();
        let mut store = LibraryUsageStore::open_in_dir(dir.path());
        assert!(store.all().is_empty());
        assert_eq!(store.create(&input("a", "p", "m", 1)).unwrap().id, 1);
    }
}
