mod common;

use common::{Fixture, break_resources_table};
use resource_hub::api::error::AppError;
use resource_hub::models::Decision;
use resource_hub::services::browse::{BrowseFilter, SELECT_ALL_FILTERS, SERVICE_DEGRADED};
use resource_hub::services::catalog::SubjectOptionsQuery;
use resource_hub::services::moderation::DecisionRequest;

fn filter(dept: &str, sem: &str, resource_type: &str, sub: &str) -> BrowseFilter {
    BrowseFilter {
        dept: Some(dept.to_string()),
        sem: Some(sem.to_string()),
        resource_type: Some(resource_type.to_string()),
        sub: Some(sub.to_string()),
        q: None,
    }
}

async fn approve(fx: &Fixture, path: &str) {
    fx.state
        .moderation
        .decide(
            Some(&fx.admin),
            DecisionRequest {
                file_path: Some(path.to_string()),
                resource_ids: Vec::new(),
                decision: Decision::Approved,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_incomplete_filter_asks_for_every_field() {
    let fx = Fixture::new().await;
    let lookups = fx.lookups().await;

    let mut missing_subject = filter("CSE", "3", "notes", &fx.ds_cse);
    missing_subject.sub = None;
    let unknown_department = filter("MBA", "3", "notes", &fx.ds_cse);
    let blank_type = filter("CSE", "3", "  ", &fx.ds_cse);

    for f in [BrowseFilter::default(), missing_subject, unknown_department, blank_type] {
        let result = fx.state.browse.browse(&lookups, &f).await;
        assert!(result.items.is_empty());
        assert_eq!(result.status.as_deref(), Some(SELECT_ALL_FILTERS));
        assert!(!result.degraded);
    }
}

#[tokio::test]
async fn test_pending_resources_are_hidden() {
    let fx = Fixture::new().await;
    fx.submit(fx.form("Heaps", "notes", &["CSE"], &["Data Structures"]).await)
        .await;
    let lookups = fx.lookups().await;

    let result = fx
        .state
        .browse
        .browse(&lookups, &filter("CSE", "3", "notes", &fx.ds_cse))
        .await;
    assert!(result.items.is_empty());
    assert!(result.status.is_none());
}

#[tokio::test]
async fn test_multi_subject_upload_is_visible_under_each_subject() {
    let fx = Fixture::new().await;
    let path = fx
        .submit(
            fx.form("Trees", "notes", &["CSE", "CSE(DS)"], &["Data Structures"])
                .await,
        )
        .await;
    approve(&fx, &path).await;
    let lookups = fx.lookups().await;

    for f in [
        filter("CSE", "3", "notes", &fx.ds_cse),
        filter("CSE(DS)", "3", "notes", &fx.ds_cse_ds),
    ] {
        let result = fx.state.browse.browse(&lookups, &f).await;
        assert_eq!(result.items.len(), 1);
        let group = &result.items[0];
        assert_eq!(group.file_path.as_deref(), Some(path.as_str()));
        assert_eq!(group.title, "Trees");
        assert_eq!(group.subject_names, vec!["Data Structures"]);
    }

    // Wrong type or wrong subject shows nothing.
    let result = fx
        .state
        .browse
        .browse(&lookups, &filter("CSE", "3", "pyq", &fx.ds_cse))
        .await;
    assert!(result.items.is_empty());
    let result = fx
        .state
        .browse
        .browse(&lookups, &filter("CSE", "3", "notes", &fx.os_cse))
        .await;
    assert!(result.items.is_empty());
}

#[tokio::test]
async fn test_results_are_newest_first() {
    let fx = Fixture::new().await;
    let older = fx
        .submit(fx.form("Heaps", "notes", &["CSE"], &["Data Structures"]).await)
        .await;
    let newer = fx
        .submit(fx.form("Tries", "notes", &["CSE"], &["Data Structures"]).await)
        .await;
    approve(&fx, &older).await;
    approve(&fx, &newer).await;
    let lookups = fx.lookups().await;

    let result = fx
        .state
        .browse
        .browse(&lookups, &filter("CSE", "3", "notes", &fx.ds_cse))
        .await;
    let titles: Vec<_> = result.items.iter().map(|g| g.title.as_str()).collect();
    assert_eq!(titles, vec!["Tries", "Heaps"]);
}

#[tokio::test]
async fn test_search_matches_title_or_subject_name() {
    let fx = Fixture::new().await;
    let path = fx
        .submit(fx.form("Heaps and Tries", "notes", &["CSE"], &["Data Structures"]).await)
        .await;
    approve(&fx, &path).await;
    let lookups = fx.lookups().await;

    for (q, hits) in [("HEAP", 1), ("structures", 1), ("graphs", 0)] {
        let mut f = filter("CSE", "3", "notes", &fx.ds_cse);
        f.q = Some(q.to_string());
        let result = fx.state.browse.browse(&lookups, &f).await;
        assert_eq!(result.items.len(), hits, "query {}", q);
    }
}

#[tokio::test]
async fn test_query_failure_serves_last_good_result() {
    let fx = Fixture::new().await;
    let path = fx
        .submit(fx.form("Heaps", "notes", &["CSE"], &["Data Structures"]).await)
        .await;
    approve(&fx, &path).await;
    let lookups = fx.lookups().await;
    let f = filter("CSE", "3", "notes", &fx.ds_cse);

    let fresh = fx.state.browse.browse(&lookups, &f).await;
    assert_eq!(fresh.items.len(), 1);

    break_resources_table(&fx.db).await;
    let degraded = fx.state.browse.browse(&lookups, &f).await;

    assert!(degraded.degraded);
    assert_eq!(degraded.status.as_deref(), Some(SERVICE_DEGRADED));
    assert_eq!(degraded.items, fresh.items);
}

#[tokio::test]
async fn test_query_failure_without_cache_is_empty() {
    let fx = Fixture::new().await;
    let lookups = fx.lookups().await;
    break_resources_table(&fx.db).await;

    let result = fx
        .state
        .browse
        .browse(&lookups, &filter("CSE", "3", "notes", &fx.ds_cse))
        .await;

    assert!(result.degraded);
    assert!(result.items.is_empty());
    assert_eq!(result.status.as_deref(), Some(SERVICE_DEGRADED));
}

#[tokio::test]
async fn test_cache_is_kept_per_filter() {
    let fx = Fixture::new().await;
    let path = fx
        .submit(fx.form("Heaps", "notes", &["CSE"], &["Data Structures"]).await)
        .await;
    approve(&fx, &path).await;
    let lookups = fx.lookups().await;

    fx.state
        .browse
        .browse(&lookups, &filter("CSE", "3", "notes", &fx.ds_cse))
        .await;
    break_resources_table(&fx.db).await;

    // A different filter never sees another filter's results.
    let other = fx
        .state
        .browse
        .browse(&lookups, &filter("CSE", "3", "notes", &fx.os_cse))
        .await;
    assert!(other.degraded);
    assert!(other.items.is_empty());
}

#[tokio::test]
async fn test_open_file_requires_approval_unless_admin() {
    let fx = Fixture::new().await;
    let path = fx
        .submit(fx.form("Heaps", "notes", &["CSE"], &["Data Structures"]).await)
        .await;

    let err = fx.state.browse.open_file(&path, false).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let url = fx.state.browse.open_file(&path, true).await.unwrap();
    assert!(url.contains(&path));

    approve(&fx, &path).await;
    let url = fx.state.browse.open_file(&path, false).await.unwrap();
    assert!(url.ends_with("X-Amz-Expires=3600"));

    let err = fx
        .state
        .browse
        .open_file("someone/123.pdf", true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_subject_options_follow_approved_resources() {
    let fx = Fixture::new().await;
    let path = fx
        .submit(fx.form("Heaps", "notes", &["CSE"], &["Data Structures"]).await)
        .await;
    approve(&fx, &path).await;
    let lookups = fx.lookups().await;

    let query = |resource_type: Option<&str>| SubjectOptionsQuery {
        dept: Some("CSE".to_string()),
        sem: Some("3".to_string()),
        resource_type: resource_type.map(str::to_string),
    };

    let all = fx
        .state
        .catalog
        .subject_options(&lookups, &query(None))
        .await
        .unwrap();
    let names: Vec<_> = all.subjects.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Data Structures", "Operating Systems"]);
    assert!(!all.unavailable);

    let notes = fx
        .state
        .catalog
        .subject_options(&lookups, &query(Some("notes")))
        .await
        .unwrap();
    assert_eq!(notes.subjects.len(), 1);
    assert_eq!(notes.subjects[0].id, fx.ds_cse);

    let labs = fx
        .state
        .catalog
        .subject_options(&lookups, &query(Some("lab")))
        .await
        .unwrap();
    assert!(labs.subjects.is_empty());
    assert!(labs.unavailable);

    let unknown = fx
        .state
        .catalog
        .subject_options(
            &lookups,
            &SubjectOptionsQuery {
                dept: Some("MBA".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(unknown.subjects.is_empty());
}
