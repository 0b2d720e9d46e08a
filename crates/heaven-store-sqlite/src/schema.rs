//! SQL schema for the Heaven SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS identities (
    remote_id           TEXT PRIMARY KEY,   -- Discord user snowflake
    remote_display_name TEXT NOT NULL,
    local_username      TEXT NOT NULL,      -- as registered (case preserved)
    username_key        TEXT NOT NULL,      -- normalised per UsernamePolicy
    registered_at       TEXT NOT NULL,      -- RFC 3339 UTC
    updated_at          TEXT NOT NULL,
    UNIQUE (username_key)
);

CREATE INDEX IF NOT EXISTS identities_registered_idx ON identities(registered_at);

PRAGMA user_version = 1;
";
