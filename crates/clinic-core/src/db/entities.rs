//! Versioned entity rows and the [`Store`] implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::warn;

use super::{Database, DbError, DbResult};
use crate::store::{RawRecord, RawWrite, Store, StoreError, StoreResult};

/// Raw row from the `entities` table.
struct EntityRow {
    version: i64,
    payload: String,
    updated_at: String,
}

impl TryFrom<EntityRow> for RawRecord {
    type Error = DbError;

    fn try_from(row: EntityRow) -> Result<Self, Self::Error> {
        let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
            .map_err(|e| DbError::CorruptRow(format!("bad updated_at '{}': {}", row.updated_at, e)))?
            .with_timezone(&Utc);
        let version = u64::try_from(row.version)
            .map_err(|_| DbError::CorruptRow(format!("negative version {}", row.version)))?;

        Ok(RawRecord {
            version,
            updated_at,
            payload: row.payload,
        })
    }
}

fn get_entity(conn: &Connection, kind: &str, id: &str) -> DbResult<Option<RawRecord>> {
    conn.query_row(
        "SELECT version, payload, updated_at FROM entities WHERE kind = ?1 AND id = ?2",
        params![kind, id],
        |row| {
            Ok(EntityRow {
                version: row.get(0)?,
                payload: row.get(1)?,
                updated_at: row.get(2)?,
            })
        },
    )
    .optional()?
    .map(RawRecord::try_from)
    .transpose()
}

fn stored_version(conn: &Connection, kind: &str, id: &str) -> DbResult<u64> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT version FROM entities WHERE kind = ?1 AND id = ?2",
            params![kind, id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.map_or(0, |v| v.max(0) as u64))
}

/// Insert when `expected == 0`, otherwise update only if the stored
/// version matches. Returns `false` when no row was written.
fn put_entity(conn: &Connection, write: &RawWrite, updated_at: &str) -> DbResult<bool> {
    let expected = i64::try_from(write.expected)
        .map_err(|_| DbError::CorruptRow(format!("version {} out of range", write.expected)))?;

    let rows_affected = if expected == 0 {
        conn.execute(
            r#"
            INSERT INTO entities (kind, id, version, payload, updated_at, inserted_seq)
            VALUES (?1, ?2, 1, ?3, ?4,
                    (SELECT COALESCE(MAX(inserted_seq), 0) + 1 FROM entities))
            ON CONFLICT (kind, id) DO NOTHING
            "#,
            params![write.kind, write.id, write.payload, updated_at],
        )?
    } else {
        conn.execute(
            r#"
            UPDATE entities SET
                version = version + 1,
                payload = ?3,
                updated_at = ?4
            WHERE kind = ?1 AND id = ?2 AND version = ?5
            "#,
            params![write.kind, write.id, write.payload, updated_at, expected],
        )?
    };
    Ok(rows_affected == 1)
}

fn list_entities(conn: &Connection, kind: &str) -> DbResult<Vec<RawRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT version, payload, updated_at
        FROM entities
        WHERE kind = ?
        ORDER BY inserted_seq
        "#,
    )?;

    let rows = stmt.query_map([kind], |row| {
        Ok(EntityRow {
            version: row.get(0)?,
            payload: row.get(1)?,
            updated_at: row.get(2)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.try_into()?);
    }
    Ok(records)
}

impl Store for Database {
    fn load_raw(&self, kind: &'static str, id: &str) -> StoreResult<Option<RawRecord>> {
        Ok(get_entity(&self.conn, kind, id)?)
    }

    fn store_all_raw(&self, writes: Vec<RawWrite>, at: DateTime<Utc>) -> StoreResult<Vec<u64>> {
        let updated_at = at.to_rfc3339();
        // IMMEDIATE takes the write lock up front so two handles cannot
        // interleave inside one batch; dropping `tx` rolls back.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(DbError::from)?;

        let mut versions = Vec::with_capacity(writes.len());
        for write in &writes {
            if !put_entity(&tx, write, &updated_at)? {
                let actual = stored_version(&tx, write.kind, &write.id)?;
                warn!(kind = write.kind, id = %write.id, expected = write.expected, actual, "stale write rejected");
                return Err(StoreError::Stale {
                    kind: write.kind,
                    id: write.id.clone(),
                    expected: write.expected,
                    actual,
                });
            }
            versions.push(write.expected + 1);
        }

        tx.commit().map_err(DbError::from)?;
        Ok(versions)
    }

    fn list_raw(&self, kind: &'static str) -> StoreResult<Vec<RawRecord>> {
        Ok(list_entities(&self.conn, kind)?)
    }
}
