//! In-memory metadata store

use super::MetaStore;
use crate::bloom::Meta;
use crate::{BloomError, FingerprintBounds, Result, SegmentId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Point-in-time view of one tenant's segments and metas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tenant: String,
    pub ownership: FingerprintBounds,
    pub segments: Vec<SegmentId>,
    #[serde(default)]
    pub metas: Vec<Meta>,
}

impl Snapshot {
    /// Load a snapshot from a JSON file
    ///
    /// Well-formed JSON with invalid contents, such as inverted bounds, is
    /// an [`BloomError::InvalidFormat`].
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| {
            if e.is_data() {
                BloomError::InvalidFormat(format!("snapshot {}: {}", path.display(), e))
            } else {
                BloomError::Json(e)
            }
        })
    }
}

#[derive(Debug, Default)]
struct TenantState {
    segments: Vec<SegmentId>,
    metas: Vec<Meta>,
}

/// Metadata store kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryMetaStore {
    tenants: RwLock<HashMap<String, TenantState>>,
}

impl InMemoryMetaStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding one snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        store.tenants.write().insert(
            snapshot.tenant,
            TenantState {
                segments: snapshot.segments,
                metas: snapshot.metas,
            },
        );
        store
    }

    /// Register a segment for a tenant
    pub fn add_segment(&self, tenant: &str, segment: SegmentId) {
        let mut tenants = self.tenants.write();
        let state = tenants.entry(tenant.to_string()).or_default();
        if !state.segments.contains(&segment) {
            state.segments.push(segment);
        }
    }

    /// Number of metas stored for a tenant
    pub fn meta_count(&self, tenant: &str) -> usize {
        self.tenants
            .read()
            .get(tenant)
            .map_or(0, |state| state.metas.len())
    }
}

impl MetaStore for InMemoryMetaStore {
    fn segments(&self, tenant: &str, _ownership: &FingerprintBounds) -> Result<Vec<SegmentId>> {
        Ok(self
            .tenants
            .read()
            .get(tenant)
            .map(|state| state.segments.clone())
            .unwrap_or_default())
    }

    fn metas(&self, tenant: &str, ownership: &FingerprintBounds) -> Result<Vec<Meta>> {
        Ok(self
            .tenants
            .read()
            .get(tenant)
            .map(|state| {
                state
                    .metas
                    .iter()
                    .filter(|meta| meta.bounds.overlaps(ownership))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn put_meta(&self, tenant: &str, meta: Meta) -> Result<()> {
        let mut tenants = self.tenants.write();
        tenants
            .entry(tenant.to_string())
            .or_default()
            .metas
            .push(meta);
        Ok(())
    }
}
