//! Upload orchestration.
//!
//! An upload runs strictly in order: pin the file, extract metadata, insert
//! the record (which assigns the token id), pin the metadata JSON, store its
//! CID on chain and finally anchor the row. [`UploadProgress`] records each
//! completed step so a failure can be logged with the exact partial state.
//! Only a pin made before the record exists is rolled back; after that the
//! partial record is left visible.

use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use metatrace_chain::ReferenceRegistry;
use metatrace_shared::types::gateway_url;
use metatrace_shared::UploadId;
use metatrace_store::{NewUpload, UploadRecord};

use crate::analysis::MetadataAnalyzer;
use crate::api::AppState;
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::pinning::Pinning;
use crate::staging::{ReceivedUpload, StagedFile, StagingArea};

const METADATA_DOCUMENT_NAME: &str = "metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    FilePinned,
    MetadataExtracted,
    RecordInserted,
    MetadataPinned,
    ReferenceStored,
    Anchored,
}

/// Saga record of one upload.
#[derive(Debug, Default)]
pub struct UploadProgress {
    completed: Vec<UploadStep>,
    content_id: Option<String>,
    upload_id: Option<UploadId>,
}

impl UploadProgress {
    fn complete(&mut self, step: UploadStep) {
        self.completed.push(step);
    }

    pub fn completed(&self) -> &[UploadStep] {
        &self.completed
    }

    pub fn has(&self, step: UploadStep) -> bool {
        self.completed.contains(&step)
    }
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: UploadRecord,
    pub metadata_content_id: String,
    pub tx_hash: String,
}

pub struct UploadOrchestrator {
    credentials: CredentialStore,
    pinning: Arc<dyn Pinning>,
    analyzer: Arc<dyn MetadataAnalyzer>,
    registry: Arc<dyn ReferenceRegistry>,
    gateway: String,
}

impl UploadOrchestrator {
    pub fn new(
        credentials: CredentialStore,
        pinning: Arc<dyn Pinning>,
        analyzer: Arc<dyn MetadataAnalyzer>,
        registry: Arc<dyn ReferenceRegistry>,
        gateway: String,
    ) -> Self {
        Self {
            credentials,
            pinning,
            analyzer,
            registry,
            gateway,
        }
    }

    pub async fn run(&self, file: &ReceivedUpload, email: &str) -> Result<UploadOutcome, ApiError> {
        let mut progress = UploadProgress::default();
        match self.drive(file, email, &mut progress).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(
                    email,
                    filename = %file.filename,
                    completed = ?progress.completed(),
                    upload_id = ?progress.upload_id,
                    error = %e,
                    "Upload failed"
                );
                self.compensate(&progress).await;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        file: &ReceivedUpload,
        email: &str,
        progress: &mut UploadProgress,
    ) -> Result<UploadOutcome, ApiError> {
        let bytes = file.bytes.clone();

        let content_id = self
            .pinning
            .pin_file(bytes.clone(), &file.filename)
            .await
            .map_err(|e| ApiError::upstream("Error uploading file to Pinata", e))?;
        progress.content_id = Some(content_id.clone());
        progress.complete(UploadStep::FilePinned);
        let content_url = gateway_url(&self.gateway, &content_id);

        let metadata = self
            .analyzer
            .analyze(bytes, &file.filename, email)
            .await
            .map_err(|e| ApiError::upstream("Metadata extraction failed", e))?;
        progress.complete(UploadStep::MetadataExtracted);

        let mut record = self.credentials.insert_upload(&NewUpload {
            email: email.to_string(),
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            size_bytes: file.size as u64,
            upload_date: Utc::now(),
            content_identifier: content_id,
            content_url,
            metadata,
        })?;
        progress.upload_id = Some(record.id);
        progress.complete(UploadStep::RecordInserted);
        info!(upload_id = %record.id, token_id = record.token_id, "Upload record stored");

        let metadata_content_id = self
            .pinning
            .pin_json(METADATA_DOCUMENT_NAME, &Value::Object(record.metadata.clone()))
            .await
            .map_err(|e| ApiError::upstream("Error pinning metadata JSON", e))?;
        progress.complete(UploadStep::MetadataPinned);

        let tx_hash = self
            .registry
            .store_reference(record.token_id, &metadata_content_id)
            .await?;
        progress.complete(UploadStep::ReferenceStored);

        if !self
            .credentials
            .attach_chain_anchor(record.id, &metadata_content_id, &tx_hash)?
        {
            warn!(upload_id = %record.id, "Upload was already anchored");
        }
        progress.complete(UploadStep::Anchored);
        record.metadata_content_identifier = Some(metadata_content_id.clone());
        record.blockchain_tx_hash = Some(tx_hash.clone());

        info!(
            upload_id = %record.id,
            token_id = record.token_id,
            tx_hash = %tx_hash,
            "Upload complete"
        );
        Ok(UploadOutcome {
            record,
            metadata_content_id,
            tx_hash,
        })
    }

    async fn compensate(&self, progress: &UploadProgress) {
        if progress.has(UploadStep::RecordInserted) {
            return;
        }
        if let Some(cid) = &progress.content_id {
            match self.pinning.unpin(cid).await {
                Ok(()) => info!(cid = %cid, "Released pin of failed upload"),
                Err(e) => warn!(cid = %cid, error = %e, "Failed to release pin of failed upload"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    message: &'static str,
    metadata: UploadRecord,
    metadata_json_ipfs_hash: String,
    blockchain_tx: String,
}

#[derive(Default)]
struct ReceivedForm {
    email: Option<String>,
    file: Option<StagedFile>,
}

async fn stage_field(staging: &StagingArea, mut field: Field<'_>) -> Result<StagedFile, ApiError> {
    let filename = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let mut writer = staging.create(&filename, &content_type).await?;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = writer.write_chunk(&chunk).await {
                    writer.abort().await;
                    return Err(e);
                }
            }
            Ok(None) => break,
            Err(e) => {
                writer.abort().await;
                return Err(ApiError::BadRequest(format!("Failed to read upload: {e}")));
            }
        }
    }
    writer.finish().await
}

async fn read_form(
    staging: &StagingArea,
    multipart: &mut Multipart,
    form: &mut ReceivedForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "email" => {
                let email = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {e}")))?;
                form.email = Some(email.trim().to_string());
            }
            "file" if form.file.is_none() => {
                form.file = Some(stage_field(staging, field).await?);
            }
            _ => {}
        }
    }
    Ok(())
}

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut form = ReceivedForm::default();
    let received = read_form(&state.staging, &mut multipart, &mut form).await;

    let file = match (received, form.file) {
        (Ok(()), Some(file)) if file.size > 0 => file,
        (result, file) => {
            if let Some(file) = file {
                file.discard().await;
            }
            result?;
            return Err(ApiError::BadRequest("Missing file or email".into()));
        }
    };
    let Some(email) = form.email.filter(|e| !e.is_empty()) else {
        file.discard().await;
        return Err(ApiError::BadRequest("Missing file or email".into()));
    };

    // The staged file is gone before any remote call. The saga runs on its
    // own task so a dropped connection cannot stop it between steps.
    let received = file.into_upload().await?;
    let uploads = state.uploads.clone();
    let outcome = tokio::spawn(async move { uploads.run(&received, &email).await }).await??;

    Ok(Json(UploadResponse {
        message: "Upload complete!",
        metadata: outcome.record,
        metadata_json_ipfs_hash: outcome.metadata_content_id,
        blockchain_tx: outcome.tx_hash,
    }))
}
