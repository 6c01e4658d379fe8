//! Contract address book
//!
//! - In-memory book with case-insensitive merge semantics
//! - JSON persistence under the fixed `beaglegaze.contracts.v1` key

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Storage key the persisted document is named after
pub const STORAGE_KEY: &str = "beaglegaze.contracts.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEntry {
    pub name: String,
    pub address: Address,
}

/// Named contract addresses plus the active selection
///
/// `Address` equality is byte equality, so textual case never matters once
/// an entry is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    #[serde(rename = "contracts", default)]
    entries: Vec<ContractEntry>,
    #[serde(default)]
    selected: Option<Address>,
}

impl AddressBook {
    pub fn entries(&self) -> &[ContractEntry] {
        &self.entries
    }

    pub fn selected(&self) -> Option<Address> {
        self.selected
    }

    /// Selected entry, if the selection names a known address
    pub fn current(&self) -> Option<&ContractEntry> {
        let selected = self.selected?;
        self.entries.iter().find(|e| e.address == selected)
    }

    /// Insert or rename an entry; selects it if nothing is selected yet
    pub fn add(&mut self, entry: ContractEntry) {
        match self.entries.iter_mut().find(|e| e.address == entry.address) {
            Some(existing) => existing.name = entry.name,
            None => self.entries.push(entry.clone()),
        }
        if self.selected.is_none() {
            self.selected = Some(entry.address);
        }
    }

    /// Remove an entry; clears the selection if it pointed at it
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&mut self, address: Address) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.address != address);
        if self.selected == Some(address) {
            self.selected = None;
        }
        self.entries.len() != before
    }

    pub fn select(&mut self, address: Option<Address>) {
        self.selected = address;
    }

    /// Contract the client should bind to
    pub fn active_contract(&self, default: Address) -> Address {
        self.current().map(|e| e.address).unwrap_or(default)
    }
}

/// File-backed address book
///
/// Every mutation writes the whole document back to disk.
pub struct AddressBookStore {
    path: PathBuf,
    book: AddressBook,
}

impl AddressBookStore {
    /// Load the book from `path`
    ///
    /// A missing file is an empty book. A file that does not parse is logged
    /// and treated as empty so a corrupt document never blocks startup.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let book = match Self::read(&path) {
            Ok(Some(book)) => {
                log::info!(
                    "Loaded {} contract(s) from {}",
                    book.entries.len(),
                    path.display()
                );
                book
            }
            Ok(None) => AddressBook::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable address book {}: {}", path.display(), e);
                AddressBook::default()
            }
        };
        Self { path, book }
    }

    /// Store in `dir` using the standard file name
    pub fn open_in_dir(dir: &Path) -> Self {
        Self::open(dir.join(format!("{}.json", STORAGE_KEY)))
    }

    fn read(path: &Path) -> Result<Option<AddressBook>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        let book = serde_json::from_str(&contents)?;
        Ok(Some(book))
    }

    fn persist(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.book)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn book(&self) -> &AddressBook {
        &self.book
    }

    pub fn add(&mut self, entry: ContractEntry) -> Result<(), StorageError> {
        self.book.add(entry);
        self.persist()
    }

    pub fn remove(&mut self, address: Address) -> Result<bool, StorageError> {
        let removed = self.book.remove(address);
        self.persist()?;
        Ok(removed)
    }

    pub fn select(&mut self, address: Option<Address>) -> Result<(), StorageError> {
        self.book.select(address);
        self.persist()
    }
}
