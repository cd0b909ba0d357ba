//! v001 -- user accounts.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,        -- external identifier, one user per email
    password_hash TEXT NOT NULL,               -- Argon2id PHC string
    created_at    TEXT NOT NULL                -- RFC-3339
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
