use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;

use metatrace_shared::{Metadata, UploadId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewUpload, UploadRecord};

const UPLOAD_COLUMNS: &str = "token_id, id, email, filename, content_type, size_bytes, upload_date, \
     content_cid, content_url, metadata, metadata_cid, blockchain_tx";

impl Database {
    /// Persist a pinned upload and return it with its assigned token id.
    pub fn insert_upload(&self, upload: &NewUpload) -> Result<UploadRecord> {
        let id = UploadId::new();
        let metadata = serde_json::to_string(&upload.metadata)
            .map_err(|e| StoreError::Corrupt(format!("metadata not serializable: {e}")))?;

        self.conn().execute(
            "INSERT INTO uploads (id, email, filename, content_type, size_bytes, upload_date,
                                  content_cid, content_url, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id.to_string(),
                upload.email,
                upload.filename,
                upload.content_type,
                upload.size_bytes as i64,
                format_timestamp(&upload.upload_date),
                upload.content_identifier,
                upload.content_url,
                metadata,
            ],
        )?;

        tracing::debug!(
            id = %id,
            token_id = self.conn().last_insert_rowid(),
            "inserted upload"
        );

        self.get_upload(id)
    }

    pub fn get_upload(&self, id: UploadId) -> Result<UploadRecord> {
        let record = self.conn().query_row(
            &format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?1"),
            params![id.to_string()],
            row_to_upload,
        )?;
        Ok(record)
    }

    /// All uploads owned by `email`, newest first.
    pub fn find_uploads_by_email(&self, email: &str) -> Result<Vec<UploadRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {UPLOAD_COLUMNS}
             FROM uploads
             WHERE email = ?1
             ORDER BY upload_date DESC, token_id DESC"
        ))?;

        let rows = stmt.query_map(params![email], row_to_upload)?;

        let mut uploads = Vec::new();
        for row in rows {
            uploads.push(row?);
        }
        Ok(uploads)
    }

    /// Record the pinned metadata CID and chain transaction of an upload.
    ///
    /// Both columns are write-once: returns `false` when the row is missing
    /// or already anchored.
    pub fn attach_chain_anchor(
        &self,
        id: UploadId,
        metadata_cid: &str,
        tx_hash: &str,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE uploads SET metadata_cid = ?1, blockchain_tx = ?2
             WHERE id = ?3 AND blockchain_tx IS NULL",
            params![metadata_cid, tx_hash, id.to_string()],
        )?;
        Ok(affected > 0)
    }

    // only removes the db record, the pinned content is the caller's concern
    pub fn delete_upload(&self, id: UploadId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM uploads WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Delete every listed upload in one transaction; returns how many rows
    /// matched.
    pub fn delete_uploads(&self, ids: &[UploadId]) -> Result<usize> {
        let tx = self.conn().unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM uploads WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }
}

/// Fixed-width RFC-3339 so that lexical order in SQL matches time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadRecord> {
    let token_id: i64 = row.get(0)?;
    let id_str: String = row.get(1)?;
    let email: String = row.get(2)?;
    let filename: String = row.get(3)?;
    let content_type: String = row.get(4)?;
    let size_bytes: i64 = row.get(5)?;
    let date_str: String = row.get(6)?;
    let content_identifier: String = row.get(7)?;
    let content_url: String = row.get(8)?;
    let metadata_json: String = row.get(9)?;
    let metadata_content_identifier: Option<String> = row.get(10)?;
    let blockchain_tx_hash: Option<String> = row.get(11)?;

    let id = id_str.parse::<UploadId>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let upload_date = parse_timestamp(6, &date_str)?;
    let metadata: Metadata = serde_json::from_str(&metadata_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(UploadRecord {
        id,
        token_id: token_id.max(0) as u64,
        email,
        filename,
        content_type,
        size_bytes: size_bytes.max(0) as u64,
        upload_date,
        content_identifier,
        content_url,
        metadata,
        metadata_content_identifier,
        blockchain_tx_hash,
    })
}
