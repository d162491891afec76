use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::models::{Identity, ModerationStatus, ResourceType};
use crate::services::catalog::LookupTables;
use crate::services::storage::StorageService;
use crate::utils::clock::Clock;
use crate::utils::validation::{detect_content_type, is_blank, storage_path};
use bytes::Bytes;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const CHOOSE_SUBJECT: &str = "Please choose a Subject.";
pub const FILL_REQUIRED: &str = "Please fill Title, Type and choose a file.";
pub const LOGIN_REQUIRED: &str = "Please login before uploading.";
pub const AWAITING_APPROVAL: &str = "Uploaded successfully. Waiting for admin approval.";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

/// Raw submission input, exactly as the form sent it.
#[derive(Debug, Clone, Default)]
pub struct SubmissionForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub resource_type: Option<String>,
    pub department_ids: Vec<String>,
    pub semester_ids: Vec<String>,
    pub subject_names: Vec<String>,
    pub file: Option<UploadedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmissionReceipt {
    pub file_path: String,
    pub resource_ids: Vec<String>,
    pub message: String,
}

pub struct SubmissionService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

impl SubmissionService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            storage,
            clock,
            config,
        }
    }

    /// Stores the file once and records a pending resource per chosen subject.
    /// Every validation failure returns before storage or the database is touched.
    pub async fn submit(
        &self,
        uploader: Option<&Identity>,
        lookups: &LookupTables,
        form: SubmissionForm,
    ) -> Result<SubmissionReceipt, AppError> {
        let subject_ids = lookups.resolve_subject_selection(
            &form.department_ids,
            &form.semester_ids,
            &form.subject_names,
        );
        if subject_ids.is_empty() {
            return Err(AppError::Validation(CHOOSE_SUBJECT.to_string()));
        }

        let resource_type = form
            .resource_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .and_then(|t| t.parse::<ResourceType>().ok());
        let (Some(resource_type), Some(file)) = (resource_type, form.file) else {
            return Err(AppError::Validation(FILL_REQUIRED.to_string()));
        };
        if is_blank(form.title.as_deref()) {
            return Err(AppError::Validation(FILL_REQUIRED.to_string()));
        }
        let title = form.title.unwrap_or_default().trim().to_string();

        if file.data.len() > self.config.max_file_size {
            return Err(AppError::Validation(format!(
                "File is too large. Maximum allowed size is {}.",
                self.config.max_file_size_label()
            )));
        }

        let uploader = uploader.ok_or_else(|| AppError::Unauthorized(LOGIN_REQUIRED.to_string()))?;

        let path = storage_path(&uploader.id, self.clock.now_millis(), &file.filename);
        let content_type = detect_content_type(&file.data);
        self.storage
            .upload_file(&path, file.data.to_vec(), &content_type)
            .await
            .map_err(|e| AppError::Storage(format!("Upload failed: {}", e)))?;

        info!(
            "📤 Stored {} ({} bytes) for {} subject(s)",
            path,
            file.data.len(),
            subject_ids.len()
        );

        let description = form
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let created_at = self.clock.now();
        let resource_ids: Vec<String> = subject_ids
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        let rows: Vec<resources::ActiveModel> = resource_ids
            .iter()
            .zip(&subject_ids)
            .map(|(id, subject_id)| resources::ActiveModel {
                id: Set(id.clone()),
                title: Set(title.clone()),
                description: Set(description.clone()),
                resource_type: Set(resource_type.as_str().to_string()),
                subject_id: Set(subject_id.clone()),
                file_path: Set(Some(path.clone())),
                status: Set(ModerationStatus::Pending.as_str().to_string()),
                uploader_id: Set(uploader.id.clone()),
                created_at: Set(created_at),
            })
            .collect();

        if let Err(e) = Resources::insert_many(rows).exec(&self.db).await {
            // The blob stays behind; the caller is told so.
            warn!("Orphaned upload at {}: insert failed: {}", path, e);
            return Err(AppError::Query(format!(
                "Saved file but DB insert failed: {}",
                e
            )));
        }

        Ok(SubmissionReceipt {
            file_path: path,
            resource_ids,
            message: AWAITING_APPROVAL.to_string(),
        })
    }
}
