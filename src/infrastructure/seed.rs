use crate::entities::{departments, prelude::*, semesters, subjects};
use anyhow::Context;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEPARTMENTS: [(&str, &str); 8] = [
    ("CSE", "Computer Science and Engineering"),
    ("CSE(DS)", "Computer Science and Engineering (Data Science)"),
    ("CSE(AIML)", "Computer Science and Engineering (AI & ML)"),
    ("IOT", "Internet of Things"),
    ("IT", "Information Technology"),
    ("EC", "Electronics and Communication"),
    ("ME", "Mechanical Engineering"),
    ("CE", "Civil Engineering"),
];

pub const SEMESTERS: std::ops::RangeInclusive<i32> = 1..=8;

/// Inserts any missing department or semester. Safe to run on every start.
pub async fn seed_reference_data(db: &DatabaseConnection) -> anyhow::Result<()> {
    let mut inserted = 0;

    for (code, name) in DEPARTMENTS {
        let exists = Departments::find()
            .filter(departments::Column::Code.eq(code))
            .one(db)
            .await?;

        if exists.is_none() {
            let model = departments::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                code: Set(code.to_string()),
                name: Set(name.to_string()),
            };
            Departments::insert(model).exec(db).await?;
            inserted += 1;
        }
    }

    for number in SEMESTERS {
        let exists = Semesters::find()
            .filter(semesters::Column::Number.eq(number))
            .one(db)
            .await?;

        if exists.is_none() {
            let model = semesters::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                number: Set(number),
            };
            Semesters::insert(model).exec(db).await?;
            inserted += 1;
        }
    }

    if inserted > 0 {
        info!("🌱 Seeded {} reference rows", inserted);
    }
    Ok(())
}

/// Subject list shipped with the service, used when no catalog file is set.
pub const BUNDLED_SUBJECTS: &str = include_str!("../../data/subjects.json");

/// Subjects taught in one department and semester.
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectCatalogEntry {
    /// Department code, e.g. "CSE"
    pub department: String,
    pub semester: i32,
    pub subjects: Vec<String>,
}

pub fn parse_subject_catalog(json: &str) -> anyhow::Result<Vec<SubjectCatalogEntry>> {
    serde_json::from_str(json).context("Invalid subject catalog")
}

/// Reads the catalog at `path`, or the bundled one.
pub async fn load_subject_catalog(path: Option<&str>) -> anyhow::Result<Vec<SubjectCatalogEntry>> {
    match path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read subject catalog {}", path))?;
            parse_subject_catalog(&raw)
        }
        None => parse_subject_catalog(BUNDLED_SUBJECTS),
    }
}

/// Inserts catalog subjects missing from their department and semester.
/// Entries naming an unknown department or semester are skipped.
pub async fn seed_subjects(
    db: &DatabaseConnection,
    catalog: &[SubjectCatalogEntry],
) -> anyhow::Result<usize> {
    let mut inserted = 0;

    for entry in catalog {
        let department = Departments::find()
            .filter(departments::Column::Code.eq(entry.department.trim()))
            .one(db)
            .await?;
        let semester = Semesters::find()
            .filter(semesters::Column::Number.eq(entry.semester))
            .one(db)
            .await?;
        let (Some(department), Some(semester)) = (department, semester) else {
            warn!(
                "⚠️ Skipping subjects for unknown {} semester {}",
                entry.department, entry.semester
            );
            continue;
        };

        for name in entry.subjects.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let exists = Subjects::find()
                .filter(subjects::Column::Name.eq(name))
                .filter(subjects::Column::DepartmentId.eq(department.id.as_str()))
                .filter(subjects::Column::SemesterId.eq(semester.id.as_str()))
                .one(db)
                .await?;

            if exists.is_none() {
                let model = subjects::ActiveModel {
                    id: Set(Uuid::new_v4().to_string()),
                    name: Set(name.to_string()),
                    department_id: Set(department.id.clone()),
                    semester_id: Set(semester.id.clone()),
                };
                Subjects::insert(model).exec(db).await?;
                inserted += 1;
            }
        }
    }

    if inserted > 0 {
        info!("🌱 Seeded {} subjects", inserted);
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_catalog_uses_known_codes() {
        let catalog = parse_subject_catalog(BUNDLED_SUBJECTS).unwrap();
        assert!(!catalog.is_empty());
        for entry in &catalog {
            assert!(
                DEPARTMENTS.iter().any(|(code, _)| *code == entry.department),
                "unknown department {}",
                entry.department
            );
            assert!(SEMESTERS.contains(&entry.semester));
            assert!(!entry.subjects.is_empty());
        }
    }

    #[test]
    fn test_malformed_catalog_is_an_error() {
        assert!(parse_subject_catalog("{\"department\": \"CSE\"}").is_err());
    }
}
