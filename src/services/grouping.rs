//! Folding resource rows into per-file groups.
//!
//! One submission fans a single stored file out into a row per subject, so
//! every listing collapses rows sharing a `file_path` into one record. Rows
//! without a path stand alone, keyed by their own id. Groups keep the order in
//! which their first row appears, and the first row supplies the title, type
//! and timestamp.

use crate::models::ResourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// A resource row with its subject context already resolved.
#[derive(Debug, Clone)]
pub struct ResourceRow {
    pub id: String,
    pub title: String,
    pub resource_type: ResourceType,
    pub created_at: DateTime<Utc>,
    pub file_path: Option<String>,
    pub subject_name: Option<String>,
    pub department_code: Option<String>,
    pub semester_number: Option<i32>,
}

impl ResourceRow {
    fn group_key(&self) -> &str {
        self.file_path.as_deref().unwrap_or(&self.id)
    }
}

/// What a student sees for one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResourceGroup {
    pub file_path: Option<String>,
    pub title: String,
    pub resource_type: ResourceType,
    pub created_at: DateTime<Utc>,
    pub subject_names: Vec<String>,
}

/// What an admin reviews for one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModerationGroup {
    pub file_path: Option<String>,
    pub title: String,
    pub resource_type: ResourceType,
    pub created_at: DateTime<Utc>,
    pub subject_names: Vec<String>,
    pub department_codes: Vec<String>,
    pub semester_numbers: Vec<i32>,
    pub resource_ids: Vec<String>,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, value: T) {
    if !items.contains(&value) {
        items.push(value);
    }
}

fn fold<G>(
    rows: impl IntoIterator<Item = ResourceRow>,
    mut start: impl FnMut(&ResourceRow) -> G,
    mut merge: impl FnMut(&mut G, ResourceRow),
) -> Vec<G> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<G> = Vec::new();

    for row in rows {
        let slot = match index.get(row.group_key()) {
            Some(&slot) => slot,
            None => {
                index.insert(row.group_key().to_string(), groups.len());
                groups.push(start(&row));
                groups.len() - 1
            }
        };
        merge(&mut groups[slot], row);
    }

    groups
}

pub fn group_for_display(rows: impl IntoIterator<Item = ResourceRow>) -> Vec<ResourceGroup> {
    fold(
        rows,
        |row| ResourceGroup {
            file_path: row.file_path.clone(),
            title: row.title.clone(),
            resource_type: row.resource_type,
            created_at: row.created_at,
            subject_names: Vec::new(),
        },
        |group, row| {
            if let Some(name) = row.subject_name {
                push_unique(&mut group.subject_names, name);
            }
        },
    )
}

pub fn group_for_moderation(rows: impl IntoIterator<Item = ResourceRow>) -> Vec<ModerationGroup> {
    fold(
        rows,
        |row| ModerationGroup {
            file_path: row.file_path.clone(),
            title: row.title.clone(),
            resource_type: row.resource_type,
            created_at: row.created_at,
            subject_names: Vec::new(),
            department_codes: Vec::new(),
            semester_numbers: Vec::new(),
            resource_ids: Vec::new(),
        },
        |group, row| {
            if let Some(name) = row.subject_name {
                push_unique(&mut group.subject_names, name);
            }
            if let Some(code) = row.department_code {
                push_unique(&mut group.department_codes, code);
            }
            if let Some(number) = row.semester_number {
                push_unique(&mut group.semester_numbers, number);
            }
            push_unique(&mut group.resource_ids, row.id);
        },
    )
}
