//! SQL schema for the OTP SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS otp_codes (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    principal_kind  TEXT NOT NULL,
    principal_id    TEXT NOT NULL,
    phone_number    TEXT NOT NULL,
    code            TEXT NOT NULL,
    verified        INTEGER,        -- NULL pending | 0 rejected | 1 verified
    created_at      TEXT NOT NULL,  -- RFC 3339 UTC, fixed width
    UNIQUE (principal_kind, principal_id, phone_number, created_at)
);

-- Attempts are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS otp_attempts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    principal_kind  TEXT NOT NULL,
    principal_id    TEXT NOT NULL,
    phone_number    TEXT NOT NULL,
    submitted_code  TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS otp_attempts_key_idx
    ON otp_attempts(principal_kind, principal_id, phone_number);

PRAGMA user_version = 1;
";
