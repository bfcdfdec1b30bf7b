//! Versioned entity storage with optimistic concurrency.
//!
//! Several handles (browser tabs, processes) may read and write the same
//! entity. Every write names the version it was derived from and is
//! rejected with [`StoreError::Stale`] when another writer got there first.

mod memory;

pub use memory::*;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Case, Slip, Visit};

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("stale write on {kind} {id}: expected version {expected}, stored version {actual}")]
    Stale {
        kind: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A persisted entity kind.
pub trait Entity: Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn id(&self) -> &str;
}

impl Entity for Case {
    const KIND: &'static str = "case";

    fn id(&self) -> &str {
        Case::id(self)
    }
}

impl Entity for Visit {
    const KIND: &'static str = "visit";

    fn id(&self) -> &str {
        Visit::id(self)
    }
}

impl Entity for Slip {
    const KIND: &'static str = "slip";

    fn id(&self) -> &str {
        &self.id
    }
}

/// An entity together with its storage stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Starts at 1, incremented by every successful write
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub value: T,
}

/// Serialized form exchanged with a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub payload: String,
}

/// One conditional write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWrite {
    pub kind: &'static str,
    pub id: String,
    pub payload: String,
    /// Version the payload was derived from, 0 for an insert
    pub expected: u64,
}

impl RawWrite {
    pub fn of<E: Entity>(entity: &E, expected: u64) -> StoreResult<Self> {
        Ok(Self {
            kind: E::KIND,
            id: entity.id().to_string(),
            payload: serde_json::to_string(entity)?,
            expected,
        })
    }
}

/// Storage backend.
///
/// Backends implement the raw methods; the typed methods are provided.
/// `expected == 0` means the entity must not exist yet.
pub trait Store {
    fn load_raw(&self, kind: &'static str, id: &str) -> StoreResult<Option<RawRecord>>;

    /// Apply every write or none of them.
    ///
    /// Returns the new versions in input order. If any write is stale the
    /// whole batch is rejected with that write's [`StoreError::Stale`].
    fn store_all_raw(&self, writes: Vec<RawWrite>, at: DateTime<Utc>) -> StoreResult<Vec<u64>>;

    /// All records of one kind, oldest insert first.
    fn list_raw(&self, kind: &'static str) -> StoreResult<Vec<RawRecord>>;

    /// Conditionally write a single payload, returning the new version.
    fn store_raw(&self, write: RawWrite, at: DateTime<Utc>) -> StoreResult<u64> {
        let id = write.id.clone();
        self.store_all_raw(vec![write], at)?
            .pop()
            .ok_or_else(|| StoreError::Backend(format!("no version returned for {}", id)))
    }

    fn read<E: Entity>(&self, id: &str) -> StoreResult<Versioned<E>>
    where
        Self: Sized,
    {
        let raw = self
            .load_raw(E::KIND, id)?
            .ok_or_else(|| StoreError::NotFound {
                kind: E::KIND,
                id: id.to_string(),
            })?;
        decode(raw)
    }

    /// Write `entity` if the stored version still equals `expected`.
    fn write_if_version<E: Entity>(
        &self,
        entity: &E,
        expected: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<u64>
    where
        Self: Sized,
    {
        self.store_raw(RawWrite::of(entity, expected)?, at)
    }

    fn list<E: Entity>(&self) -> StoreResult<Vec<Versioned<E>>>
    where
        Self: Sized,
    {
        self.list_raw(E::KIND)?.into_iter().map(decode).collect()
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn load_raw(&self, kind: &'static str, id: &str) -> StoreResult<Option<RawRecord>> {
        (**self).load_raw(kind, id)
    }

    fn store_all_raw(&self, writes: Vec<RawWrite>, at: DateTime<Utc>) -> StoreResult<Vec<u64>> {
        (**self).store_all_raw(writes, at)
    }

    fn list_raw(&self, kind: &'static str) -> StoreResult<Vec<RawRecord>> {
        (**self).list_raw(kind)
    }
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn load_raw(&self, kind: &'static str, id: &str) -> StoreResult<Option<RawRecord>> {
        (**self).load_raw(kind, id)
    }

    fn store_all_raw(&self, writes: Vec<RawWrite>, at: DateTime<Utc>) -> StoreResult<Vec<u64>> {
        (**self).store_all_raw(writes, at)
    }

    fn list_raw(&self, kind: &'static str) -> StoreResult<Vec<RawRecord>> {
        (**self).list_raw(kind)
    }
}

fn decode<E: Entity>(raw: RawRecord) -> StoreResult<Versioned<E>> {
    Ok(Versioned {
        version: raw.version,
        updated_at: raw.updated_at,
        value: serde_json::from_str(&raw.payload)?,
    })
}
