use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::models::{ModerationStatus, ResourceType};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DepartmentView {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SemesterView {
    pub id: String,
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubjectView {
    pub id: String,
    pub name: String,
    pub department_id: String,
    pub semester_id: String,
}

/// Subjects sharing a name, offered as one choice on the submission form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SubjectChoice {
    pub name: String,
    pub ids: Vec<String>,
}

/// Reference data loaded once per request and threaded into the workflows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LookupTables {
    pub departments: Vec<DepartmentView>,
    pub semesters: Vec<SemesterView>,
    pub subjects: Vec<SubjectView>,
}

impl LookupTables {
    pub fn resolve_department(&self, code: &str) -> Option<&str> {
        let code = code.trim();
        self.departments
            .iter()
            .find(|d| d.code == code)
            .map(|d| d.id.as_str())
    }

    pub fn resolve_semester(&self, number: &str) -> Option<&str> {
        let number: i32 = number.trim().parse().ok()?;
        self.semesters
            .iter()
            .find(|s| s.number == number)
            .map(|s| s.id.as_str())
    }

    pub fn subject(&self, id: &str) -> Option<&SubjectView> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn department_code(&self, id: &str) -> Option<&str> {
        self.departments
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.code.as_str())
    }

    pub fn semester_number(&self, id: &str) -> Option<i32> {
        self.semesters.iter().find(|s| s.id == id).map(|s| s.number)
    }

    /// Subjects under the given department and semester ids; `None` means any.
    pub fn subjects_in<'a>(
        &'a self,
        department_id: Option<&'a str>,
        semester_id: Option<&'a str>,
    ) -> impl Iterator<Item = &'a SubjectView> + 'a {
        self.subjects.iter().filter(move |s| {
            department_id.is_none_or(|d| s.department_id == d)
                && semester_id.is_none_or(|sem| s.semester_id == sem)
        })
    }

    /// Subjects matching the selected department and semester sets (an empty
    /// set matches everything), deduplicated by name in name order.
    pub fn submission_subjects(
        &self,
        department_ids: &[String],
        semester_ids: &[String],
    ) -> Vec<SubjectChoice> {
        let departments: HashSet<&str> = department_ids.iter().map(String::as_str).collect();
        let semesters: HashSet<&str> = semester_ids.iter().map(String::as_str).collect();

        let mut by_name: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for subject in &self.subjects {
            let dept_ok =
                departments.is_empty() || departments.contains(subject.department_id.as_str());
            let sem_ok = semesters.is_empty() || semesters.contains(subject.semester_id.as_str());
            if dept_ok && sem_ok {
                let ids = by_name.entry(subject.name.as_str()).or_default();
                if !ids.contains(&subject.id) {
                    ids.push(subject.id.clone());
                }
            }
        }

        by_name
            .into_iter()
            .map(|(name, ids)| SubjectChoice {
                name: name.to_string(),
                ids,
            })
            .collect()
    }

    /// Expands selected subject names to every matching id inside the
    /// department/semester selection. Names outside the selection drop out.
    pub fn resolve_subject_selection(
        &self,
        department_ids: &[String],
        semester_ids: &[String],
        subject_names: &[String],
    ) -> Vec<String> {
        let wanted: HashSet<&str> = subject_names.iter().map(|n| n.trim()).collect();
        let mut ids = Vec::new();
        for choice in self.submission_subjects(department_ids, semester_ids) {
            if wanted.contains(choice.name.as_str()) {
                for id in choice.ids {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
        }
        ids
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct SubjectOptionsQuery {
    /// Department code, e.g. "CSE"
    pub dept: Option<String>,
    /// Semester number 1-8
    pub sem: Option<String>,
    /// Resource type; narrows to subjects with approved resources of that type
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubjectOptions {
    pub subjects: Vec<SubjectView>,
    /// Department, semester and type are chosen but nothing is approved yet
    pub unavailable: bool,
}

fn chosen(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub struct CatalogService {
    db: DatabaseConnection,
    config: AppConfig,
}

impl CatalogService {
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        Self { db, config }
    }

    pub async fn load_lookups(&self) -> Result<LookupTables, AppError> {
        let (departments, semesters, subjects) = tokio::try_join!(
            Departments::find()
                .order_by_asc(departments::Column::Code)
                .all(&self.db),
            Semesters::find()
                .order_by_asc(semesters::Column::Number)
                .all(&self.db),
            Subjects::find()
                .order_by_asc(subjects::Column::Name)
                .all(&self.db),
        )?;

        Ok(LookupTables {
            departments: departments
                .into_iter()
                .map(|d| DepartmentView {
                    id: d.id,
                    code: d.code,
                    name: d.name,
                })
                .collect(),
            semesters: semesters
                .into_iter()
                .map(|s| SemesterView {
                    id: s.id,
                    number: s.number,
                })
                .collect(),
            subjects: subjects
                .into_iter()
                .map(|s| SubjectView {
                    id: s.id,
                    name: s.name,
                    department_id: s.department_id,
                    semester_id: s.semester_id,
                })
                .collect(),
        })
    }

    /// Subject filter options for browsing.
    pub async fn subject_options(
        &self,
        lookups: &LookupTables,
        query: &SubjectOptionsQuery,
    ) -> Result<SubjectOptions, AppError> {
        let dept = chosen(&query.dept);
        let sem = chosen(&query.sem);
        let resource_type = match chosen(&query.resource_type) {
            Some(raw) => Some(
                raw.parse::<ResourceType>()
                    .map_err(|e| AppError::Validation(e.to_string()))?,
            ),
            None => None,
        };

        let department_id = match dept {
            Some(code) => match lookups.resolve_department(code) {
                Some(id) => Some(id),
                None => return Ok(empty_options(dept, sem, resource_type)),
            },
            None => None,
        };
        let semester_id = match sem {
            Some(number) => match lookups.resolve_semester(number) {
                Some(id) => Some(id),
                None => return Ok(empty_options(dept, sem, resource_type)),
            },
            None => None,
        };

        let available = match resource_type {
            Some(t) => Some(
                self.subjects_with_approved(department_id, semester_id, t)
                    .await,
            ),
            None => None,
        };

        let subjects: Vec<SubjectView> = lookups
            .subjects_in(department_id, semester_id)
            .filter(|s| available.as_ref().is_none_or(|ids| ids.contains(&s.id)))
            .cloned()
            .collect();

        let unavailable =
            dept.is_some() && sem.is_some() && resource_type.is_some() && subjects.is_empty();

        Ok(SubjectOptions {
            subjects,
            unavailable,
        })
    }

    /// Ids of subjects holding at least one approved resource of `resource_type`.
    /// A failed side query narrows to nothing rather than failing the listing.
    async fn subjects_with_approved(
        &self,
        department_id: Option<&str>,
        semester_id: Option<&str>,
        resource_type: ResourceType,
    ) -> HashSet<String> {
        let mut select = Resources::find()
            .inner_join(Subjects)
            .filter(resources::Column::Status.eq(ModerationStatus::Approved.as_str()))
            .filter(resources::Column::ResourceType.eq(resource_type.as_str()));

        if let Some(id) = department_id {
            select = select.filter(subjects::Column::DepartmentId.eq(id));
        }
        if let Some(id) = semester_id {
            select = select.filter(subjects::Column::SemesterId.eq(id));
        }

        match select
            .limit(self.config.availability_scan_limit)
            .all(&self.db)
            .await
        {
            Ok(rows) => rows.into_iter().map(|r| r.subject_id).collect(),
            Err(e) => {
                tracing::warn!("Subject availability query failed: {}", e);
                HashSet::new()
            }
        }
    }
}

fn empty_options(
    dept: Option<&str>,
    sem: Option<&str>,
    resource_type: Option<ResourceType>,
) -> SubjectOptions {
    SubjectOptions {
        subjects: Vec::new(),
        unavailable: dept.is_some() && sem.is_some() && resource_type.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, name: &str, dept: &str, sem: &str) -> SubjectView {
        SubjectView {
            id: id.to_string(),
            name: name.to_string(),
            department_id: dept.to_string(),
            semester_id: sem.to_string(),
        }
    }

    fn tables() -> LookupTables {
        LookupTables {
            departments: vec![
                DepartmentView {
                    id: "d-cse".into(),
                    code: "CSE".into(),
                    name: "Computer Science".into(),
                },
                DepartmentView {
                    id: "d-it".into(),
                    code: "IT".into(),
                    name: "Information Technology".into(),
                },
            ],
            semesters: vec![
                SemesterView {
                    id: "s-3".into(),
                    number: 3,
                },
                SemesterView {
                    id: "s-4".into(),
                    number: 4,
                },
            ],
            subjects: vec![
                subject("dbms-cse", "DBMS", "d-cse", "s-3"),
                subject("dbms-it", "DBMS", "d-it", "s-3"),
                subject("os-cse", "Operating Systems", "d-cse", "s-4"),
            ],
        }
    }

    #[test]
    fn test_resolves_codes_and_numbers() {
        let t = tables();
        assert_eq!(t.resolve_department("CSE"), Some("d-cse"));
        assert_eq!(t.resolve_department("ME"), None);
        assert_eq!(t.resolve_semester(" 4 "), Some("s-4"));
        assert_eq!(t.resolve_semester("nine"), None);
    }

    #[test]
    fn test_submission_subjects_dedupe_by_name() {
        let t = tables();
        let choices = t.submission_subjects(&[], &["s-3".to_string()]);
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].name, "DBMS");
        assert_eq!(choices[0].ids, vec!["dbms-cse", "dbms-it"]);
    }

    #[test]
    fn test_selection_outside_filter_is_ignored() {
        let t = tables();
        let ids = t.resolve_subject_selection(
            &["d-cse".to_string()],
            &["s-3".to_string()],
            &["DBMS".to_string(), "Operating Systems".to_string()],
        );
        assert_eq!(ids, vec!["dbms-cse"]);

        let none = t.resolve_subject_selection(
            &["d-it".to_string()],
            &[],
            &["Operating Systems".to_string()],
        );
        assert!(none.is_empty());
    }

    #[test]
    fn test_subjects_in_filters_both_axes() {
        let t = tables();
        let ids: Vec<&str> = t
            .subjects_in(Some("d-cse"), None)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["dbms-cse", "os-cse"]);
        assert_eq!(t.subjects_in(Some("d-it"), Some("s-4")).count(), 0);
    }
}
