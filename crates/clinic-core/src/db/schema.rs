//! SQLite schema definition.

/// Complete database schema for the clinic store.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Versioned entities (cases, visits, slips)
-- ============================================================================

CREATE TABLE IF NOT EXISTS entities (
    kind TEXT NOT NULL,                 -- 'case' | 'visit' | 'slip'
    id TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version >= 1),
    payload TEXT NOT NULL,              -- JSON document
    updated_at TEXT NOT NULL,           -- RFC 3339
    inserted_seq INTEGER NOT NULL,
    PRIMARY KEY (kind, id)
);

CREATE INDEX IF NOT EXISTS idx_entities_kind_seq ON entities(kind, inserted_seq);
"#;
