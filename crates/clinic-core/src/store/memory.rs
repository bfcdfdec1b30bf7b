//! In-memory store shared between handles.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::warn;

use super::{RawRecord, RawWrite, Store, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<(&'static str, String), RawRecord>,
    /// Insertion order per kind
    index: HashMap<&'static str, Vec<String>>,
}

/// Map-backed [`Store`]. Wrap in an `Arc` to share it between writers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn load_raw(&self, kind: &'static str, id: &str) -> StoreResult<Option<RawRecord>> {
        let inner = self.lock()?;
        Ok(inner.records.get(&(kind, id.to_string())).cloned())
    }

    fn store_all_raw(&self, writes: Vec<RawWrite>, at: DateTime<Utc>) -> StoreResult<Vec<u64>> {
        let mut inner = self.lock()?;

        // Check the whole batch before touching anything
        for (i, w) in writes.iter().enumerate() {
            if writes[..i].iter().any(|o| o.kind == w.kind && o.id == w.id) {
                return Err(StoreError::Backend(format!(
                    "{} {} appears twice in one batch",
                    w.kind, w.id
                )));
            }
            let actual = inner
                .records
                .get(&(w.kind, w.id.clone()))
                .map_or(0, |r| r.version);
            if actual != w.expected {
                warn!(kind = w.kind, id = %w.id, expected = w.expected, actual, "stale write rejected");
                return Err(StoreError::Stale {
                    kind: w.kind,
                    id: w.id.clone(),
                    expected: w.expected,
                    actual,
                });
            }
        }

        let mut versions = Vec::with_capacity(writes.len());
        for w in writes {
            let version = w.expected + 1;
            if w.expected == 0 {
                inner.index.entry(w.kind).or_default().push(w.id.clone());
            }
            inner.records.insert(
                (w.kind, w.id),
                RawRecord {
                    version,
                    updated_at: at,
                    payload: w.payload,
                },
            );
            versions.push(version);
        }
        Ok(versions)
    }

    fn list_raw(&self, kind: &'static str) -> StoreResult<Vec<RawRecord>> {
        let inner = self.lock()?;
        let ids = match inner.index.get(kind) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.records.get(&(kind, id.clone())).cloned())
            .collect())
    }
}
