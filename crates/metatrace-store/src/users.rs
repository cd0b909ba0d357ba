use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use metatrace_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{User, UserUpdate};

use crate::uploads::{format_timestamp, parse_timestamp};

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";

impl Database {
    /// Insert a new user. Fails with [`StoreError::Conflict`] when the email
    /// is already registered.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, name, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.name,
                user.email,
                user.password_hash,
                format_timestamp(&user.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_id(&self, id: UserId) -> Result<User> {
        let user = self.conn().query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            row_to_user,
        )?;
        Ok(user)
    }

    /// Apply a profile change. The password hash is only touched when the
    /// update carries one.
    pub fn update_user(&self, id: UserId, update: &UserUpdate<'_>) -> Result<()> {
        let affected = match update.password_hash {
            Some(hash) => self.conn().execute(
                "UPDATE users SET name = ?1, email = ?2, password_hash = ?3 WHERE id = ?4",
                params![update.name, update.email, hash, id.to_string()],
            )?,
            None => self.conn().execute(
                "UPDATE users SET name = ?1, email = ?2 WHERE id = ?3",
                params![update.name, update.email, id.to_string()],
            )?,
        };

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn count_users_with_email(&self, email: &str) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let email: String = row.get(2)?;
    let password_hash: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    let id = id_str.parse::<UserId>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at: DateTime<Utc> = parse_timestamp(4, &created_str)?;

    Ok(User {
        id,
        name,
        email,
        password_hash,
        created_at,
    })
}
