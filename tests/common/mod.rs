#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use resource_hub::config::AppConfig;
use resource_hub::entities::{departments, prelude::*, profiles, semesters, subjects};
use resource_hub::infrastructure::database;
use resource_hub::models::{Identity, Role};
use resource_hub::services::auth::CodeMailer;
use resource_hub::services::browse_cache::BrowseCache;
use resource_hub::services::catalog::LookupTables;
use resource_hub::services::storage::StorageService;
use resource_hub::services::submission::{SubmissionForm, UploadedFile};
use resource_hub::utils::clock::ManualClock;
use resource_hub::AppState;
use sea_orm::{
    ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, Set,
    Statement,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// In-memory blob store with call counters and failure switches.
#[derive(Default)]
pub struct MockStorageService {
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_upload: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn upload_file(&self, key: &str, data: Vec<u8>, _content_type: &str) -> anyhow::Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("bucket unreachable"));
        }
        let mut files = self.files.lock().unwrap();
        if files.contains_key(key) {
            return Err(anyhow::anyhow!("object already exists: {}", key));
        }
        files.insert(key.to_string(), data);
        Ok(())
    }

    async fn generate_presigned_url(&self, key: &str, expires_in_secs: u64) -> anyhow::Result<String> {
        Ok(format!(
            "https://blobs.test/resources/{}?X-Amz-Expires={}",
            key, expires_in_secs
        ))
    }

    async fn delete_files(&self, keys: &[String]) -> anyhow::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("delete refused"));
        }
        let mut files = self.files.lock().unwrap();
        for key in keys {
            files.remove(key);
        }
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.contains(key))
    }
}

/// Keeps the last code sent to each address.
#[derive(Default)]
pub struct CapturingMailer {
    codes: Mutex<HashMap<String, String>>,
}

impl CapturingMailer {
    pub fn code_for(&self, email: &str) -> Option<String> {
        self.codes.lock().unwrap().get(email).cloned()
    }
}

#[async_trait]
impl CodeMailer for CapturingMailer {
    async fn send_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        self.codes
            .lock()
            .unwrap()
            .insert(email.to_string(), code.to_string());
        Ok(())
    }
}

pub async fn create_profile(db: &DatabaseConnection, email: &str, role: Role) -> Identity {
    let id = Uuid::new_v4().to_string();
    Profiles::insert(profiles::ActiveModel {
        id: Set(id.clone()),
        email: Set(email.to_string()),
        role: Set(role.as_str().to_string()),
        created_at: Set(Some(Utc::now())),
    })
    .exec(db)
    .await
    .unwrap();

    Identity {
        id,
        email: email.to_string(),
    }
}

pub async fn department_id(db: &DatabaseConnection, code: &str) -> String {
    Departments::find()
        .filter(departments::Column::Code.eq(code))
        .one(db)
        .await
        .unwrap()
        .unwrap()
        .id
}

pub async fn semester_id(db: &DatabaseConnection, number: i32) -> String {
    Semesters::find()
        .filter(semesters::Column::Number.eq(number))
        .one(db)
        .await
        .unwrap()
        .unwrap()
        .id
}

pub async fn create_subject(db: &DatabaseConnection, name: &str, dept: &str, sem: i32) -> String {
    let id = Uuid::new_v4().to_string();
    Subjects::insert(subjects::ActiveModel {
        id: Set(id.clone()),
        name: Set(name.to_string()),
        department_id: Set(department_id(db, dept).await),
        semester_id: Set(semester_id(db, sem).await),
    })
    .exec(db)
    .await
    .unwrap();
    id
}

/// Makes every later query on `resources` fail.
pub async fn break_resources_table(db: &DatabaseConnection) {
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "ALTER TABLE resources RENAME TO resources_offline;".to_string(),
    ))
    .await
    .unwrap();
}

pub fn pdf_bytes(len: usize) -> Bytes {
    let mut data = b"%PDF-1.7\n".to_vec();
    data.resize(len.max(data.len()), b'x');
    Bytes::from(data)
}

pub struct Fixture {
    pub db: DatabaseConnection,
    pub storage: Arc<MockStorageService>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<BrowseCache>,
    pub mailer: Arc<CapturingMailer>,
    pub state: AppState,
    pub admin: Identity,
    pub student: Identity,
    /// "Data Structures" under CSE semester 3
    pub ds_cse: String,
    /// "Data Structures" under CSE(DS) semester 3
    pub ds_cse_ds: String,
    /// "Operating Systems" under CSE semester 3
    pub os_cse: String,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::development()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let db = setup_test_db().await;
        let storage = Arc::new(MockStorageService::new());
        // Session tokens are checked against wall time, so start from now.
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(BrowseCache::in_memory(clock.clone(), 8));
        let mailer = Arc::new(CapturingMailer::default());

        let admin = create_profile(&db, "admin@college.test", Role::Admin).await;
        let student = create_profile(&db, "student@college.test", Role::Student).await;
        let ds_cse = create_subject(&db, "Data Structures", "CSE", 3).await;
        let ds_cse_ds = create_subject(&db, "Data Structures", "CSE(DS)", 3).await;
        let os_cse = create_subject(&db, "Operating Systems", "CSE", 3).await;

        let state = AppState::new(
            db.clone(),
            storage.clone(),
            config,
            clock.clone(),
            mailer.clone(),
            cache.clone(),
        );

        Self {
            db,
            storage,
            clock,
            cache,
            mailer,
            state,
            admin,
            student,
            ds_cse,
            ds_cse_ds,
            os_cse,
        }
    }

    pub async fn lookups(&self) -> LookupTables {
        self.state.catalog.load_lookups().await.unwrap()
    }

    /// Form for `subject_names` across the given departments, semester 3.
    pub async fn form(
        &self,
        title: &str,
        resource_type: &str,
        departments: &[&str],
        subject_names: &[&str],
    ) -> SubmissionForm {
        let mut department_ids = Vec::new();
        for code in departments {
            department_ids.push(department_id(&self.db, code).await);
        }
        SubmissionForm {
            title: Some(title.to_string()),
            description: Some("Unit 1 to 5".to_string()),
            resource_type: Some(resource_type.to_string()),
            department_ids,
            semester_ids: vec![semester_id(&self.db, 3).await],
            subject_names: subject_names.iter().map(|s| s.to_string()).collect(),
            file: Some(UploadedFile {
                filename: "unit-notes.pdf".to_string(),
                data: pdf_bytes(2048),
            }),
        }
    }

    /// Submits as the student and returns the stored file path.
    pub async fn submit(&self, form: SubmissionForm) -> String {
        let lookups = self.lookups().await;
        let receipt = self
            .state
            .submissions
            .submit(Some(&self.student), &lookups, form)
            .await
            .unwrap();
        self.clock.advance(chrono::Duration::seconds(5));
        receipt.file_path
    }
}
