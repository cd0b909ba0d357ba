//! v002 -- upload records.
//!
//! `token_id` doubles as the on-chain token id. `AUTOINCREMENT` guarantees it
//! is assigned atomically by the insert and never reused after deletes.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS uploads (
    token_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    id             TEXT NOT NULL UNIQUE,       -- UUID v4
    email          TEXT NOT NULL,              -- owner, matched by string equality
    filename       TEXT NOT NULL,
    content_type   TEXT NOT NULL,
    size_bytes     INTEGER NOT NULL,
    upload_date    TEXT NOT NULL,              -- RFC-3339, fixed microsecond width
    content_cid    TEXT NOT NULL,
    content_url    TEXT NOT NULL,
    metadata       TEXT NOT NULL,              -- opaque JSON object
    metadata_cid   TEXT,                       -- write-once
    blockchain_tx  TEXT                        -- write-once
);

CREATE INDEX IF NOT EXISTS idx_uploads_email_date
    ON uploads(email, upload_date DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
