use crate::images::ImageRotation;
use crate::models::{HostId, HostRecord, HostUpdate, NewHost};
use crate::store::{duplicate_address, normalize_address, HostStore, StoreError};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_LIST_LIMIT: usize = 30;

/// CRUD over the host store. Owns image assignment for new hosts.
pub struct Inventory {
    store: Arc<dyn HostStore>,
    images: Arc<ImageRotation>,
}

impl Inventory {
    pub fn new(store: Arc<dyn HostStore>, images: Arc<ImageRotation>) -> Self {
        Self { store, images }
    }

    /// The image slot is only consumed once the address is known to be valid and free.
    pub fn create(&self, host: NewHost) -> Result<HostRecord, StoreError> {
        info!(name = %host.name, "saving new host");
        let address = normalize_address(host.address.as_deref())?;
        if self.store.get_by_address(address)?.is_some() {
            return Err(duplicate_address(address));
        }
        self.store.insert(host, self.images.next_image_ref())
    }

    pub fn get(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        self.store.get_by_id(id)
    }

    pub fn list(&self, limit: usize) -> Result<Vec<HostRecord>, StoreError> {
        self.store.list(limit)
    }

    /// Full-record update. An omitted status keeps the stored one.
    pub fn update(&self, update: HostUpdate) -> Result<HostRecord, StoreError> {
        info!(id = update.id, name = %update.name, "updating host");
        let current = self.store.get_by_id(update.id)?.ok_or(StoreError::NotFound(update.id))?;
        self.store.update(HostRecord {
            id: current.id,
            address: update.address.unwrap_or_default(),
            name: update.name,
            memory: update.memory,
            class: update.class,
            image_ref: current.image_ref,
            status: update.status.unwrap_or(current.status),
        })
    }

    pub fn delete(&self, id: HostId) -> Result<bool, StoreError> {
        info!(id, "deleting host");
        self.store.delete_by_id(id)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.store.len()
    }
}
