use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::models::{ModerationStatus, ResourceType};
use crate::services::browse_cache::BrowseCache;
use crate::services::catalog::LookupTables;
use crate::services::grouping::{ResourceGroup, ResourceRow, group_for_display};
use crate::services::storage::StorageService;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
    sea_query::{Expr, Func},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

pub const SELECT_ALL_FILTERS: &str =
    "Please select Department, Semester, Type and Subject to view resources.";
pub const SERVICE_DEGRADED: &str =
    "Service temporarily unavailable. Showing last saved results, if any.";

/// Browse filters passed explicitly on every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
pub struct BrowseFilter {
    /// Department code, e.g. "CSE"
    pub dept: Option<String>,
    /// Semester number 1-8
    pub sem: Option<String>,
    /// notes | pyq | syllabus | lab
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    /// Subject id
    pub sub: Option<String>,
    /// Free-text search on title or subject name
    pub q: Option<String>,
}

fn chosen(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl BrowseFilter {
    pub fn cache_key(&self) -> String {
        [&self.dept, &self.sem, &self.resource_type, &self.sub, &self.q]
            .iter()
            .map(|v| chosen(v).unwrap_or("").to_lowercase())
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Filter with every required field resolved against the lookup tables.
#[derive(Debug, Clone)]
struct ResolvedFilter {
    department_id: String,
    semester_id: String,
    resource_type: ResourceType,
    subject_id: String,
    search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BrowseResult {
    pub items: Vec<ResourceGroup>,
    pub status: Option<String>,
    /// Results came from the fallback cache (or are empty) because the query failed
    pub degraded: bool,
}

pub struct BrowseService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    cache: Arc<BrowseCache>,
    config: AppConfig,
}

impl BrowseService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        cache: Arc<BrowseCache>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            storage,
            cache,
            config,
        }
    }

    fn resolve(lookups: &LookupTables, filter: &BrowseFilter) -> Option<ResolvedFilter> {
        let department_id = lookups.resolve_department(chosen(&filter.dept)?)?;
        let semester_id = lookups.resolve_semester(chosen(&filter.sem)?)?;
        let resource_type = chosen(&filter.resource_type)?.parse().ok()?;
        let subject_id = chosen(&filter.sub)?;

        Some(ResolvedFilter {
            department_id: department_id.to_string(),
            semester_id: semester_id.to_string(),
            resource_type,
            subject_id: subject_id.to_string(),
            search: chosen(&filter.q).map(str::to_string),
        })
    }

    /// Approved resources for a complete filter, grouped by file. Falls back
    /// to the last cached result for the same filter when the query fails.
    pub async fn browse(&self, lookups: &LookupTables, filter: &BrowseFilter) -> BrowseResult {
        let Some(resolved) = Self::resolve(lookups, filter) else {
            return BrowseResult {
                items: Vec::new(),
                status: Some(SELECT_ALL_FILTERS.to_string()),
                degraded: false,
            };
        };

        let key = filter.cache_key();
        match self.query(&resolved).await {
            Ok(items) => {
                self.cache.store(&key, &items);
                BrowseResult {
                    items,
                    status: None,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!("Browse query failed, serving cached results: {}", e);
                self.fallback(filter)
            }
        }
    }

    /// Last cached result for `filter`, or nothing, flagged as degraded.
    pub fn fallback(&self, filter: &BrowseFilter) -> BrowseResult {
        let items = self
            .cache
            .last_good(&filter.cache_key())
            .map(|entry| entry.items)
            .unwrap_or_default();
        BrowseResult {
            items,
            status: Some(SERVICE_DEGRADED.to_string()),
            degraded: true,
        }
    }

    async fn query(&self, filter: &ResolvedFilter) -> Result<Vec<ResourceGroup>, DbErr> {
        let mut select = Resources::find()
            .find_also_related(Subjects)
            .filter(resources::Column::Status.eq(ModerationStatus::Approved.as_str()))
            .filter(resources::Column::ResourceType.eq(filter.resource_type.as_str()))
            .filter(resources::Column::SubjectId.eq(filter.subject_id.as_str()))
            .filter(subjects::Column::DepartmentId.eq(filter.department_id.as_str()))
            .filter(subjects::Column::SemesterId.eq(filter.semester_id.as_str()));

        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search.to_lowercase());
            select = select.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            resources::Entity,
                            resources::Column::Title,
                        ))))
                        .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            subjects::Entity,
                            subjects::Column::Name,
                        ))))
                        .like(pattern),
                    ),
            );
        }

        let rows = select
            .order_by_desc(resources::Column::CreatedAt)
            .limit(self.config.browse_page_size)
            .all(&self.db)
            .await?;

        Ok(group_for_display(rows.into_iter().filter_map(
            |(resource, subject)| {
                let resource_type = resource.resource_type.parse().ok()?;
                Some(ResourceRow {
                    id: resource.id,
                    title: resource.title,
                    resource_type,
                    created_at: resource.created_at,
                    file_path: resource.file_path,
                    subject_name: subject.map(|s| s.name),
                    department_code: None,
                    semester_number: None,
                })
            },
        )))
    }

    /// Signed read URL for a stored file. Non-admins may only open files
    /// referenced by an approved resource.
    pub async fn open_file(&self, path: &str, include_unapproved: bool) -> Result<String, AppError> {
        let mut select = Resources::find().filter(resources::Column::FilePath.eq(path));
        if !include_unapproved {
            select =
                select.filter(resources::Column::Status.eq(ModerationStatus::Approved.as_str()));
        }

        if select.count(&self.db).await? == 0 {
            return Err(AppError::NotFound("File not found".to_string()));
        }

        let url = self
            .storage
            .generate_presigned_url(path, self.config.signed_url_ttl_secs)
            .await
            .map_err(|e| {
                AppError::Storage(format!("Unable to open file. Please try again later. ({})", e))
            })?;

        info!("🔗 Signed URL issued for {}", path);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_normalizes_blank_and_case() {
        let a = BrowseFilter {
            dept: Some("CSE".into()),
            sem: Some("3".into()),
            resource_type: Some("Notes".into()),
            sub: Some("abc".into()),
            q: Some("  ".into()),
        };
        let b = BrowseFilter {
            dept: Some(" cse ".into()),
            sem: Some("3".into()),
            resource_type: Some("notes".into()),
            sub: Some("ABC".into()),
            q: None,
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
