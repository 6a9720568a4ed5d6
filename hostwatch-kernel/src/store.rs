/**
 * HOST STORE - Persistent table of host records
 *
 * ROLE:
 * Single source of truth for the inventory. Every other component reads and
 * writes hosts through the `HostStore` trait.
 *
 * OPERATION:
 * - In-memory table (records + id sequence) behind a mutex
 * - Persisted as one JSON file, rewritten on each mutation (temp file + rename)
 * - Each mutating call is one transaction: validate, apply to a draft, persist,
 *   then commit the draft. A failed write leaves the table untouched.
 * - Ids are allocated from a monotonic sequence, so id order is creation order
 *
 * INVARIANTS:
 * - address is non-empty (after trimming) and unique across records
 * - id and image_ref never change after insert
 */

use crate::models::{HostId, HostRecord, HostStatus, NewHost};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("host {0} not found")]
    NotFound(HostId),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Contract of the record store. Lookups return `Ok(None)` for a missing key;
/// errors are reserved for constraint and storage failures.
pub trait HostStore: Send + Sync {
    /// Inserts a new record, assigning its id. `image_ref` is chosen by the caller.
    fn insert(&self, host: NewHost, image_ref: String) -> Result<HostRecord, StoreError>;

    fn get_by_id(&self, id: HostId) -> Result<Option<HostRecord>, StoreError>;

    fn get_by_address(&self, address: &str) -> Result<Option<HostRecord>, StoreError>;

    fn get_by_address_and_id(&self, address: &str, id: HostId) -> Result<Option<HostRecord>, StoreError>;

    /// Replaces the record with the same id. The stored `image_ref` is kept.
    fn update(&self, record: HostRecord) -> Result<HostRecord, StoreError>;

    /// Changes only the status of the current row; other fields are left as stored.
    fn set_status(&self, id: HostId, status: HostStatus) -> Result<HostRecord, StoreError>;

    /// Returns `false` when no record had this id.
    fn delete_by_id(&self, id: HostId) -> Result<bool, StoreError>;

    /// At most `limit` records, in creation order.
    fn list(&self, limit: usize) -> Result<Vec<HostRecord>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HostTable {
    next_id: HostId,
    hosts: Vec<HostRecord>,
}

impl Default for HostTable {
    fn default() -> Self {
        Self { next_id: 1, hosts: Vec::new() }
    }
}

/// Trimmed address, or a constraint violation when it is empty or absent.
pub fn normalize_address(address: Option<&str>) -> Result<&str, StoreError> {
    let address = address.map(str::trim).unwrap_or_default();
    if address.is_empty() {
        return Err(StoreError::ConstraintViolation("IP address cannot be empty or null".into()));
    }
    Ok(address)
}

pub fn duplicate_address(address: &str) -> StoreError {
    StoreError::ConstraintViolation(format!("IP address {address} is already registered"))
}

impl HostTable {
    fn check_address(&self, address: Option<&str>, own_id: Option<HostId>) -> Result<String, StoreError> {
        let address = normalize_address(address)?;
        let taken = self
            .hosts
            .iter()
            .any(|h| h.address == address && Some(h.id) != own_id);
        if taken {
            return Err(duplicate_address(address));
        }
        Ok(address.to_string())
    }
}

/// JSON file backed store. `new_in_memory` gives the same semantics without a file.
pub struct JsonHostStore {
    path: Option<PathBuf>,
    table: Mutex<HostTable>,
}

impl JsonHostStore {
    /// Opens (or creates) the store file at `path`.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let table = Self::load_from_disk(&path)?;
        info!(path = %path.display(), hosts = table.hosts.len(), "host store opened");
        Ok(Self { path: Some(path), table: Mutex::new(table) })
    }

    pub fn new_in_memory() -> Self {
        Self { path: None, table: Mutex::new(HostTable::default()) }
    }

    fn load_from_disk(path: &Path) -> Result<HostTable, StoreError> {
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let table = HostTable::default();
            fs::write(path, serde_json::to_string_pretty(&table)?)?;
            return Ok(table);
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(HostTable::default());
        }
        let mut table: HostTable = serde_json::from_str(&content)?;
        // keep the sequence ahead of any hand-edited ids
        let max_id = table.hosts.iter().map(|h| h.id).max().unwrap_or(0);
        table.next_id = table.next_id.max(max_id + 1);
        Ok(table)
    }

    fn save_to_disk(&self, table: &HostTable) -> Result<(), StoreError> {
        let Some(path) = &self.path else { return Ok(()) };
        let json = serde_json::to_string_pretty(table)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Runs `op` against a draft of the table and commits it only once persisted.
    fn transact<T>(&self, op: impl FnOnce(&mut HostTable) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut table = self.table.lock();
        let mut draft = table.clone();
        let out = op(&mut draft)?;
        self.save_to_disk(&draft)?;
        *table = draft;
        Ok(out)
    }

    fn find(&self, pred: impl Fn(&HostRecord) -> bool) -> Option<HostRecord> {
        self.table.lock().hosts.iter().find(|h| pred(h)).cloned()
    }
}

impl HostStore for JsonHostStore {
    fn insert(&self, host: NewHost, image_ref: String) -> Result<HostRecord, StoreError> {
        let record = self.transact(|table| {
            let address = table.check_address(host.address.as_deref(), None)?;
            let record = HostRecord {
                id: table.next_id,
                address,
                name: host.name,
                memory: host.memory,
                class: host.class,
                image_ref,
                status: host.status.unwrap_or_default(),
            };
            table.next_id += 1;
            table.hosts.push(record.clone());
            Ok(record)
        })?;
        debug!(id = record.id, address = %record.address, "host inserted");
        Ok(record)
    }

    fn get_by_id(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        Ok(self.find(|h| h.id == id))
    }

    fn get_by_address(&self, address: &str) -> Result<Option<HostRecord>, StoreError> {
        let address = address.trim();
        Ok(self.find(|h| h.address == address))
    }

    fn get_by_address_and_id(&self, address: &str, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        let address = address.trim();
        Ok(self.find(|h| h.id == id && h.address == address))
    }

    fn update(&self, record: HostRecord) -> Result<HostRecord, StoreError> {
        let updated = self.transact(|table| {
            let address = table.check_address(Some(&record.address), Some(record.id))?;
            let slot = table
                .hosts
                .iter_mut()
                .find(|h| h.id == record.id)
                .ok_or(StoreError::NotFound(record.id))?;
            slot.address = address;
            slot.name = record.name;
            slot.memory = record.memory;
            slot.class = record.class;
            slot.status = record.status;
            Ok(slot.clone())
        })?;
        debug!(id = updated.id, status = updated.status.as_str(), "host updated");
        Ok(updated)
    }

    fn set_status(&self, id: HostId, status: HostStatus) -> Result<HostRecord, StoreError> {
        let updated = self.transact(|table| {
            let slot = table.hosts.iter_mut().find(|h| h.id == id).ok_or(StoreError::NotFound(id))?;
            slot.status = status;
            Ok(slot.clone())
        })?;
        debug!(id, status = status.as_str(), "host status set");
        Ok(updated)
    }

    fn delete_by_id(&self, id: HostId) -> Result<bool, StoreError> {
        // nothing to persist when the id is unknown
        if self.find(|h| h.id == id).is_none() {
            return Ok(false);
        }
        self.transact(|table| {
            let before = table.hosts.len();
            table.hosts.retain(|h| h.id != id);
            Ok(table.hosts.len() != before)
        })
    }

    fn list(&self, limit: usize) -> Result<Vec<HostRecord>, StoreError> {
        let table = self.table.lock();
        Ok(table.hosts.iter().take(limit).cloned().collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.table.lock().hosts.len())
    }
}
