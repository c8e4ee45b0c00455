use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

use barback::catalog::{CatalogDoc, CatalogStore, Collection, MemoryCatalog};
use barback::jobs::JobStore;
use barback::{create_router_with_config, RouterConfig};

const ADMIN_KEY: &str = "test-admin-key";

// Helper to create a test app over a seeded in-memory catalog
fn create_app(catalog: Arc<MemoryCatalog>) -> (axum::Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let jobs = Arc::new(JobStore::new(dir.path().join("jobs.redb")).unwrap());
    let app = create_router_with_config(RouterConfig {
        catalog,
        jobs,
        backup_dir: dir.path().join("backups"),
        admin_key: Some(ADMIN_KEY.to_string()),
    });
    (app, dir)
}

fn doc(id: &str, description: Option<&str>, tags: &[&str]) -> CatalogDoc {
    CatalogDoc {
        id: id.to_string(),
        name: Some(format!("Name {}", id)),
        description: description.map(|d| d.to_string()),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

// Helper to get response body as string
async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn admin_post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap()
}

async fn json_response(response: axum::response::Response) -> Value {
    let body = body_to_string(response.into_body()).await;
    serde_json::from_str(&body).unwrap()
}

/// Poll a job over HTTP until it reaches done or failed, collecting every
/// observed status along the way.
async fn poll_until_terminal(app: &axum::Router, job_id: &str) -> (Value, Vec<String>) {
    let mut observed = Vec::new();
    for _ in 0..500 {
        let response = app
            .clone()
            .oneshot(admin_get(&format!("/admin/batch/jobs/{}", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job = json_response(response).await;
        let status = job["status"].as_str().unwrap().to_string();
        observed.push(status.clone());
        if status == "done" || status == "failed" {
            return (job, observed);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach a terminal state", job_id);
}

#[tokio::test]
async fn test_health_check_requires_no_key() {
    let (app, _dir) = create_app(Arc::new(MemoryCatalog::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_admin_routes_reject_missing_or_wrong_key() {
    let (app, _dir) = create_app(Arc::new(MemoryCatalog::new()));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/batch/jobs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/batch/jobs")
                .header("x-admin-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_unavailable_without_configured_key() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = Arc::new(JobStore::new(dir.path().join("jobs.redb")).unwrap());
    let app = create_router_with_config(RouterConfig {
        catalog: Arc::new(MemoryCatalog::new()),
        jobs,
        backup_dir: dir.path().join("backups"),
        admin_key: None,
    });

    let response = app.oneshot(admin_get("/admin/batch/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_preview_query_mode() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .insert(Collection::Ingredients, doc("ing-1", None, &["stale", "citrus"]))
        .await;
    catalog
        .insert(Collection::Ingredients, doc("ing-2", None, &["citrus"]))
        .await;
    let (app, _dir) = create_app(catalog);

    let body = json!({
        "mode": "query",
        "collection": "ingredients",
        "filters": {"field": "tags", "mode": "tags_any", "value": ["stale"]},
        "operation": {"type": "tags_remove", "payload": {"remove": ["stale"]}}
    });
    let response = app
        .oneshot(admin_post("/admin/batch/preview", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let preview = json_response(response).await;
    assert!(preview["jobId"].as_str().unwrap().starts_with("temp-"));
    assert_eq!(preview["willUpdate"], 1);
    assert_eq!(preview["skipped"], 0);
    let rows = preview["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "ing-1");
    assert_eq!(rows[0]["current"]["tags"], json!(["stale", "citrus"]));
    assert_eq!(rows[0]["proposed"]["tags"], json!(["citrus"]));
}

#[tokio::test]
async fn test_preview_rejects_invalid_filter() {
    let (app, _dir) = create_app(Arc::new(MemoryCatalog::new()));

    // tags_any against the description field is a shape error
    let body = json!({
        "mode": "query",
        "collection": "cocktails",
        "filters": {"field": "description", "mode": "tags_any", "value": ["x"]},
        "operation": {"type": "description_set", "payload": {"newText": "y"}}
    });
    let response = app
        .oneshot(admin_post("/admin/batch/preview", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_commit_end_to_end() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .insert(Collection::Ingredients, doc("ing-1", None, &["stale", "citrus"]))
        .await;
    let (app, _dir) = create_app(catalog.clone());

    let body = json!({
        "mode": "query",
        "collection": "ingredients",
        "filters": {"field": "tags", "mode": "tags_any", "value": ["stale"]},
        "operation": {"type": "tags_remove", "payload": {"remove": ["stale"]}},
        "selectIds": ["ing-1"],
        "note": "drop the stale marker"
    });
    let response = app
        .clone()
        .oneshot(admin_post("/admin/batch/commit", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let accepted = json_response(response).await;
    assert_eq!(accepted["status"], "pending");
    let job_id = accepted["jobId"].as_str().unwrap().to_string();

    let (job, observed) = poll_until_terminal(&app, &job_id).await;
    assert_eq!(job["status"], "done");
    assert_eq!(job["counts"]["matched"], 1);
    assert_eq!(job["counts"]["written"], 1);
    assert_eq!(job["mode"], "query");
    assert_eq!(job["note"], "drop the stale marker");
    assert!(job["finishedAt"].is_string());

    // Observed statuses never regress through the state machine
    let rank = |s: &str| match s {
        "pending" => 0,
        "in_progress" => 1,
        _ => 2,
    };
    assert!(observed
        .windows(2)
        .all(|pair| rank(&pair[0]) <= rank(&pair[1])));

    let live = catalog.get(Collection::Ingredients, "ing-1").await.unwrap().unwrap();
    assert_eq!(live.tags, vec!["citrus"]);
}

#[tokio::test]
async fn test_commit_empty_selection_is_bad_request() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .insert(Collection::Cocktails, doc("c1", Some("something"), &[]))
        .await;
    let (app, _dir) = create_app(catalog);

    let body = json!({
        "mode": "query",
        "collection": "cocktails",
        "filters": {"field": "description", "mode": "exact", "value": "no match"},
        "operation": {"type": "description_set", "payload": {"newText": "x"}}
    });
    let response = app
        .oneshot(admin_post("/admin/batch/commit", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_paste_mode_preview_reports_missing_and_duplicates() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .insert(Collection::Cocktails, doc("c1", Some("old"), &[]))
        .await;
    let (app, _dir) = create_app(catalog);

    let body = json!({
        "mode": "paste",
        "collection": "cocktails",
        "rows": [
            {"id": "c1", "proposed": {"description": "first"}},
            {"id": "c1", "proposed": {"description": "second"}},
            {"id": "ghost", "proposed": {"description": "x"}}
        ]
    });
    let response = app
        .oneshot(admin_post("/admin/batch/preview", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let preview = json_response(response).await;
    assert_eq!(preview["warnings"]["duplicates"], 1);
    assert_eq!(preview["missing"], json!(["ghost"]));
    let rows = preview["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["proposed"]["description"], "second");
}

#[tokio::test]
async fn test_jobs_listing_newest_first() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.insert(Collection::Cocktails, doc("c1", Some("A"), &[])).await;
    catalog.insert(Collection::Cocktails, doc("c2", Some("B"), &[])).await;
    let (app, _dir) = create_app(catalog);

    for (value, text) in [("A", "A2"), ("B", "B2")] {
        let body = json!({
            "mode": "query",
            "collection": "cocktails",
            "filters": {"field": "description", "mode": "exact", "value": value},
            "operation": {"type": "description_set", "payload": {"newText": text}}
        });
        let response = app
            .clone()
            .oneshot(admin_post("/admin/batch/commit", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let accepted = json_response(response).await;
        poll_until_terminal(&app, accepted["jobId"].as_str().unwrap()).await;
    }

    let response = app.oneshot(admin_get("/admin/batch/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let jobs = json_response(response).await;
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    let newest =
        chrono::DateTime::parse_from_rfc3339(jobs[0]["startedAt"].as_str().unwrap()).unwrap();
    let older =
        chrono::DateTime::parse_from_rfc3339(jobs[1]["startedAt"].as_str().unwrap()).unwrap();
    assert!(newest >= older);
}

#[tokio::test]
async fn test_get_unknown_job_is_404() {
    let (app, _dir) = create_app(Arc::new(MemoryCatalog::new()));

    let response = app
        .oneshot(admin_get("/admin/batch/jobs/nonexistent"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rollback_via_api() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .insert(Collection::Cocktails, doc("c1", Some("A"), &[]))
        .await;
    let (app, _dir) = create_app(catalog.clone());

    let body = json!({
        "mode": "query",
        "collection": "cocktails",
        "filters": {"field": "description", "mode": "exact", "value": "A"},
        "operation": {"type": "description_set", "payload": {"newText": "B"}}
    });
    let response = app
        .clone()
        .oneshot(admin_post("/admin/batch/commit", &body))
        .await
        .unwrap();
    let accepted = json_response(response).await;
    let job_id = accepted["jobId"].as_str().unwrap().to_string();
    poll_until_terminal(&app, &job_id).await;

    let response = app
        .clone()
        .oneshot(admin_post(
            &format!("/admin/batch/jobs/{}/rollback", job_id),
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = json_response(response).await;
    assert_eq!(accepted["status"], "pending");

    let (rollback_job, _) = poll_until_terminal(&app, accepted["jobId"].as_str().unwrap()).await;
    assert_eq!(rollback_job["status"], "done");
    assert_eq!(rollback_job["mode"], "rollback");
    assert_eq!(rollback_job["originalJobId"], job_id.as_str());

    let live = catalog.get(Collection::Cocktails, "c1").await.unwrap().unwrap();
    assert_eq!(live.description.as_deref(), Some("A"));
}

#[tokio::test]
async fn test_preview_rate_limited() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .insert(Collection::Cocktails, doc("c1", Some("A"), &[]))
        .await;
    let (app, _dir) = create_app(catalog);

    let body = json!({
        "mode": "query",
        "collection": "cocktails",
        "filters": {"field": "description", "mode": "exact", "value": "A"},
        "operation": {"type": "description_set", "payload": {"newText": "B"}}
    });

    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(admin_post("/admin/batch/preview", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(admin_post("/admin/batch/preview", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Job polling is not rate limited
    let response = app.oneshot(admin_get("/admin/batch/jobs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_export_endpoints() {
    let catalog = Arc::new(MemoryCatalog::new());
    catalog
        .insert(Collection::Cocktails, doc("c1", Some("Shake"), &["tiki", "rum"]))
        .await;
    catalog
        .insert(Collection::Ingredients, doc("i1", None, &[]))
        .await;
    let (app, _dir) = create_app(catalog);

    let response = app
        .clone()
        .oneshot(admin_get("/admin/batch/list-cocktails"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rows = json_response(response).await;
    assert_eq!(rows[0]["id"], "c1");
    assert_eq!(rows[0]["tags"], "tiki, rum");

    let response = app
        .oneshot(admin_get("/admin/batch/list-ingredients"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rows = json_response(response).await;
    assert_eq!(rows[0]["id"], "i1");
    assert_eq!(rows[0]["description"], "");
    assert_eq!(rows[0]["tags"], "");
}
