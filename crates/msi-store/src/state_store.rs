use std::collections::HashMap;
use std::sync::Arc;

use msi_types::{Perms, StateHandle};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::{StoreError, StoreResult};

#[derive(Debug)]
struct Region {
    name: String,
    perms: Perms,
    buf: Vec<u8>,
    dirty: bool,
}

impl Region {
    fn check_bounds(&self, offset: usize, len: usize) -> StoreResult<()> {
        let size = self.buf.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(StoreError::OutOfBounds { offset, len, size }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub handle: StateHandle,
    pub name: String,
    pub perms: Perms,
    pub size: usize,
    pub dirty: bool,
}

/// Named fixed-size byte regions.
///
/// Each region sits behind its own lock, so a read or write is a single
/// critical section and never observable half done.
#[derive(Debug, Default)]
pub struct StateStore {
    regions: RwLock<HashMap<StateHandle, Arc<Mutex<Region>>>>,
    max_region_bytes: Option<usize>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_region_bytes(max: Option<usize>) -> Self {
        Self {
            max_region_bytes: max,
            ..Self::default()
        }
    }

    pub fn map(&self, name: impl Into<String>, size: usize, perms: Perms) -> StoreResult<StateHandle> {
        if size == 0 {
            return Err(StoreError::InvalidSize(size));
        }
        if let Some(max) = self.max_region_bytes {
            if size > max {
                return Err(StoreError::RegionTooLarge { size, max });
            }
        }
        let handle = StateHandle::generate();
        let region = Region {
            name: name.into(),
            perms,
            buf: vec![0; size],
            dirty: false,
        };
        debug!(handle = %handle, name = %region.name, size, perms = %perms, "state region mapped");
        self.regions
            .write()
            .insert(handle.clone(), Arc::new(Mutex::new(region)));
        Ok(handle)
    }

    pub fn read(&self, handle: &StateHandle, offset: usize, len: usize) -> StoreResult<Vec<u8>> {
        let region = self.region_ref(handle)?;
        let region = region.lock();
        region.check_bounds(offset, len)?;
        Ok(region.buf[offset..offset + len].to_vec())
    }

    pub fn write(&self, handle: &StateHandle, offset: usize, data: &[u8]) -> StoreResult<()> {
        let region = self.region_ref(handle)?;
        let mut region = region.lock();
        if !region.perms.can_write() {
            return Err(StoreError::PermissionDenied {
                name: region.name.clone(),
            });
        }
        region.check_bounds(offset, data.len())?;
        region.buf[offset..offset + data.len()].copy_from_slice(data);
        region.dirty = true;
        Ok(())
    }

    /// Marks the region clean. Nothing is persisted; this is the hook where a
    /// durable backend would flush.
    pub fn commit(&self, handle: &StateHandle) -> StoreResult<()> {
        let region = self.region_ref(handle)?;
        region.lock().dirty = false;
        Ok(())
    }

    pub fn region(&self, handle: &StateHandle) -> Option<RegionInfo> {
        let region = self.regions.read().get(handle).cloned()?;
        let region = region.lock();
        Some(RegionInfo {
            handle: handle.clone(),
            name: region.name.clone(),
            perms: region.perms,
            size: region.buf.len(),
            dirty: region.dirty,
        })
    }

    pub fn region_name(&self, handle: &StateHandle) -> Option<String> {
        self.region(handle).map(|r| r.name)
    }

    pub fn region_perms(&self, handle: &StateHandle) -> Option<Perms> {
        self.region(handle).map(|r| r.perms)
    }

    pub fn region_size(&self, handle: &StateHandle) -> Option<usize> {
        self.region(handle).map(|r| r.size)
    }

    pub fn is_dirty(&self, handle: &StateHandle) -> bool {
        self.region(handle).map(|r| r.dirty).unwrap_or(false)
    }

    pub fn exists(&self, handle: &StateHandle) -> bool {
        self.regions.read().contains_key(handle)
    }

    pub fn unmap(&self, handle: &StateHandle) -> bool {
        self.regions.write().remove(handle).is_some()
    }

    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    pub fn list_handles(&self) -> Vec<StateHandle> {
        self.regions.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.regions.write().clear();
    }

    fn region_ref(&self, handle: &StateHandle) -> StoreResult<Arc<Mutex<Region>>> {
        self.regions
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| StoreError::UnknownHandle(handle.clone()))
    }
}
