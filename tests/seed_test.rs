mod common;

use common::{create_profile, setup_test_db};
use resource_hub::config::AppConfig;
use resource_hub::entities::prelude::*;
use resource_hub::infrastructure::seed::{
    BUNDLED_SUBJECTS, load_subject_catalog, parse_subject_catalog, seed_subjects,
};
use resource_hub::models::Role;
use resource_hub::services::catalog::CatalogService;
use resource_hub::services::submission::{SubmissionForm, SubmissionService, UploadedFile};
use resource_hub::utils::clock::SystemClock;
use sea_orm::{EntityTrait, PaginatorTrait};
use std::io::Write;
use std::sync::Arc;

#[tokio::test]
async fn test_bundled_subjects_seed_once() {
    let db = setup_test_db().await;
    assert_eq!(Subjects::find().count(&db).await.unwrap(), 0);

    let catalog = load_subject_catalog(None).await.unwrap();
    let expected: usize = catalog.iter().map(|e| e.subjects.len()).sum();

    let inserted = seed_subjects(&db, &catalog).await.unwrap();
    assert_eq!(inserted, expected);
    assert_eq!(Subjects::find().count(&db).await.unwrap(), expected as u64);

    // Restarting changes nothing.
    assert_eq!(seed_subjects(&db, &catalog).await.unwrap(), 0);
    assert_eq!(Subjects::find().count(&db).await.unwrap(), expected as u64);
}

#[tokio::test]
async fn test_catalog_file_skips_unknown_departments() {
    let db = setup_test_db().await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{ "department": "CSE", "semester": 3, "subjects": ["Data Structures", " ", "Data Structures"] }},
            {{ "department": "MBA", "semester": 1, "subjects": ["Marketing"] }},
            {{ "department": "IT", "semester": 9, "subjects": ["Thesis"] }}
        ]"#
    )
    .unwrap();

    let catalog = load_subject_catalog(file.path().to_str()).await.unwrap();
    assert_eq!(catalog.len(), 3);
    assert_eq!(seed_subjects(&db, &catalog).await.unwrap(), 1);

    assert!(load_subject_catalog(Some("/no/such/catalog.json")).await.is_err());
}

#[tokio::test]
async fn test_fresh_deployment_accepts_submissions() {
    let db = setup_test_db().await;
    seed_subjects(&db, &parse_subject_catalog(BUNDLED_SUBJECTS).unwrap())
        .await
        .unwrap();

    let config = AppConfig::development();
    let catalog = CatalogService::new(db.clone(), config.clone());
    let storage = Arc::new(common::MockStorageService::new());
    let submissions =
        SubmissionService::new(db.clone(), storage.clone(), Arc::new(SystemClock), config);
    let student = create_profile(&db, "first@college.test", Role::Student).await;

    let lookups = catalog.load_lookups().await.unwrap();
    let form = SubmissionForm {
        title: Some("Stacks and queues".to_string()),
        description: None,
        resource_type: Some("notes".to_string()),
        department_ids: vec![lookups.resolve_department("CSE").unwrap().to_string()],
        semester_ids: vec![lookups.resolve_semester("3").unwrap().to_string()],
        subject_names: vec!["Data Structures".to_string()],
        file: Some(UploadedFile {
            filename: "stacks.pdf".to_string(),
            data: common::pdf_bytes(1024),
        }),
    };

    let receipt = submissions.submit(Some(&student), &lookups, form).await.unwrap();
    assert!(storage.contains(&receipt.file_path));
}
