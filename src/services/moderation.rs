use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::models::{Decision, Identity, ModerationStatus, ResourceType, Role};
use crate::services::catalog::{CatalogService, LookupTables};
use crate::services::grouping::{ModerationGroup, ResourceRow, group_for_moderation};
use crate::services::storage::StorageService;
use crate::utils::clock::Clock;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

pub const ADMIN_ONLY: &str = "Admin access only.";
pub const ALREADY_MODERATED: &str =
    "No pending resources for this file; it may already be moderated.";
pub const NOT_APPROVED: &str = "No approved resources use this file.";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecisionRequest {
    /// Shared file path of the group; absent for rows that never had a file
    pub file_path: Option<String>,
    /// Resource ids the reviewer saw in the group
    #[serde(default)]
    pub resource_ids: Vec<String>,
    pub decision: Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecisionOutcome {
    pub file_path: Option<String>,
    pub decision: Decision,
    pub resource_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeletedGroup {
    pub file_path: String,
    pub deleted: u64,
}

pub struct ModerationService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    catalog: Arc<CatalogService>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

impl ModerationService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        catalog: Arc<CatalogService>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            storage,
            catalog,
            clock,
            config,
        }
    }

    /// Looks up the caller's profile role; anything but admin is refused.
    pub async fn require_admin<'a>(
        &self,
        caller: Option<&'a Identity>,
    ) -> Result<&'a Identity, AppError> {
        let caller = caller.ok_or_else(|| AppError::Forbidden(ADMIN_ONLY.to_string()))?;
        let profile = Profiles::find_by_id(caller.id.as_str())
            .one(&self.db)
            .await?;

        match profile.and_then(|p| p.role.parse::<Role>().ok()) {
            Some(Role::Admin) => Ok(caller),
            _ => {
                tracing::warn!("Moderation refused for {}", caller.email);
                Err(AppError::Forbidden(ADMIN_ONLY.to_string()))
            }
        }
    }

    /// Pending groups, oldest first.
    pub async fn list_pending(
        &self,
        caller: Option<&Identity>,
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<ModerationGroup>, AppError> {
        self.require_admin(caller).await?;
        let lookups = self.catalog.load_lookups().await?;

        let mut select = Resources::find()
            .filter(resources::Column::Status.eq(ModerationStatus::Pending.as_str()));
        if let Some(t) = resource_type {
            select = select.filter(resources::Column::ResourceType.eq(t.as_str()));
        }
        let rows = select
            .order_by_asc(resources::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(group_for_moderation(to_rows(rows, &lookups)))
    }

    /// Approved groups, newest first, for review and removal. Only the rows
    /// of the newest `approved_list_limit` groups are loaded.
    pub async fn list_approved(
        &self,
        caller: Option<&Identity>,
    ) -> Result<Vec<ModerationGroup>, AppError> {
        self.require_admin(caller).await?;
        let lookups = self.catalog.load_lookups().await?;
        let limit = self.config.approved_list_limit;
        let approved = resources::Column::Status.eq(ModerationStatus::Approved.as_str());

        let paths: Vec<String> = Resources::find()
            .select_only()
            .column(resources::Column::FilePath)
            .filter(approved.clone())
            .filter(resources::Column::FilePath.is_not_null())
            .group_by(resources::Column::FilePath)
            .order_by(Expr::col(resources::Column::CreatedAt).max(), Order::Desc)
            .limit(limit)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut rows = if paths.is_empty() {
            Vec::new()
        } else {
            Resources::find()
                .filter(approved.clone())
                .filter(resources::Column::FilePath.is_in(paths))
                .all(&self.db)
                .await?
        };

        // Rows without a file are groups of one.
        rows.extend(
            Resources::find()
                .filter(approved)
                .filter(resources::Column::FilePath.is_null())
                .order_by_desc(resources::Column::CreatedAt)
                .limit(limit)
                .all(&self.db)
                .await?,
        );
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut groups = group_for_moderation(to_rows(rows, &lookups));
        groups.truncate(limit as usize);
        Ok(groups)
    }

    /// Moves every pending row of a file group to `decision` and records one
    /// approval per row. Rejection deletes the blob first and stops there if
    /// the delete fails.
    pub async fn decide(
        &self,
        caller: Option<&Identity>,
        request: DecisionRequest,
    ) -> Result<DecisionOutcome, AppError> {
        let reviewer = self.require_admin(caller).await?;

        let group_filter = match request.file_path.as_deref() {
            Some(path) => Condition::all().add(resources::Column::FilePath.eq(path)),
            None if !request.resource_ids.is_empty() => Condition::all()
                .add(resources::Column::FilePath.is_null())
                .add(resources::Column::Id.is_in(request.resource_ids.clone())),
            None => {
                return Err(AppError::Validation(
                    "A file path or resource ids are required.".to_string(),
                ));
            }
        };

        let pending: Vec<String> = Resources::find()
            .select_only()
            .column(resources::Column::Id)
            .filter(group_filter.clone())
            .filter(resources::Column::Status.eq(ModerationStatus::Pending.as_str()))
            .order_by_asc(resources::Column::CreatedAt)
            .into_tuple()
            .all(&self.db)
            .await?;

        if pending.is_empty() {
            return Err(AppError::NotFound(ALREADY_MODERATED.to_string()));
        }
        let pending_set: HashSet<&str> = pending.iter().map(String::as_str).collect();
        if let Some(stray) = request
            .resource_ids
            .iter()
            .find(|id| !pending_set.contains(id.as_str()))
        {
            return Err(AppError::Validation(format!(
                "Resource {} is not pending in this group.",
                stray
            )));
        }

        if request.decision == Decision::Rejected {
            if let Some(path) = request.file_path.as_deref() {
                self.storage
                    .delete_files(&[path.to_string()])
                    .await
                    .map_err(|e| AppError::Storage(e.to_string()))?;
            }
        }

        let txn = self.db.begin().await?;

        let updated = Resources::update_many()
            .col_expr(
                resources::Column::Status,
                Expr::value(request.decision.status().as_str()),
            )
            .filter(group_filter)
            .filter(resources::Column::Id.is_in(pending.clone()))
            .filter(resources::Column::Status.eq(ModerationStatus::Pending.as_str()))
            .exec(&txn)
            .await?;
        // Another reviewer got there between the read and the update.
        if updated.rows_affected != pending.len() as u64 {
            txn.rollback().await?;
            return Err(AppError::NotFound(ALREADY_MODERATED.to_string()));
        }

        let now = self.clock.now();
        let approvals_rows: Vec<approvals::ActiveModel> = pending
            .iter()
            .map(|resource_id| approvals::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                resource_id: Set(resource_id.clone()),
                reviewer_id: Set(reviewer.id.clone()),
                decision: Set(request.decision.as_str().to_string()),
                created_at: Set(now),
            })
            .collect();
        Approvals::insert_many(approvals_rows).exec(&txn).await?;

        txn.commit().await?;

        info!(
            target: "audit",
            reviewer = %reviewer.id,
            file_path = ?request.file_path,
            decision = %request.decision,
            rows = pending.len(),
            "Moderation decision recorded"
        );

        Ok(DecisionOutcome {
            file_path: request.file_path,
            decision: request.decision,
            resource_ids: pending,
        })
    }

    /// Removes an approved file group: blob first, then its approved rows.
    /// Paths with no approved rows are refused before storage is touched.
    pub async fn delete_approved(
        &self,
        caller: Option<&Identity>,
        file_path: &str,
    ) -> Result<DeletedGroup, AppError> {
        let admin = self.require_admin(caller).await?;

        let approved = Resources::find()
            .filter(resources::Column::FilePath.eq(file_path))
            .filter(resources::Column::Status.eq(ModerationStatus::Approved.as_str()))
            .count(&self.db)
            .await?;
        if approved == 0 {
            return Err(AppError::NotFound(NOT_APPROVED.to_string()));
        }

        let exists = self
            .storage
            .file_exists(file_path)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        if exists {
            self.storage
                .delete_files(&[file_path.to_string()])
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        let res = Resources::delete_many()
            .filter(resources::Column::FilePath.eq(file_path))
            .filter(resources::Column::Status.eq(ModerationStatus::Approved.as_str()))
            .exec(&self.db)
            .await?;

        info!(
            target: "audit",
            admin = %admin.id,
            file_path = %file_path,
            rows = res.rows_affected,
            "Approved group deleted"
        );

        Ok(DeletedGroup {
            file_path: file_path.to_string(),
            deleted: res.rows_affected,
        })
    }
}

fn to_rows(rows: Vec<resources::Model>, lookups: &LookupTables) -> Vec<ResourceRow> {
    rows.into_iter()
        .filter_map(|r| {
            let resource_type = r.resource_type.parse().ok()?;
            let subject = lookups.subject(&r.subject_id);
            Some(ResourceRow {
                id: r.id,
                title: r.title,
                resource_type,
                created_at: r.created_at,
                file_path: r.file_path,
                subject_name: subject.map(|s| s.name.clone()),
                department_code: subject
                    .and_then(|s| lookups.department_code(&s.department_id))
                    .map(str::to_string),
                semester_number: subject.and_then(|s| lookups.semester_number(&s.semester_id)),
            })
        })
        .collect()
}
