//! Integration tests for the status page backend.

use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::db::{init_database, Repository};
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let database_url = format!(
            "sqlite://{}?mode=rwc",
            temp_dir.path().join("test.sqlite").display()
        );

        // Initialize database
        let pool = init_database(&database_url)
            .await
            .expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        let state = AppState { repo: repo.clone() };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestFixture {
            client: Client::new(),
            base_url,
            repo,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), 200, "GET {} failed", path);
        resp.json().await.unwrap()
    }

    async fn create_service(&self, name: &str) -> Value {
        let resp = self
            .post(
                "/api/services",
                json!({ "name": name, "description": "Test service", "status": "operational" }),
            )
            .await;
        assert_eq!(resp.status(), 201);
        resp.json().await.unwrap()
    }

    async fn create_incident(&self, service_id: &str) -> Value {
        let resp = self
            .post(
                "/api/incidents",
                json!({
                    "title": "Elevated error rates",
                    "description": "5xx responses from the API",
                    "status": "investigating",
                    "impact": "major",
                    "service_id": service_id
                }),
            )
            .await;
        assert_eq!(resp.status(), 201);
        resp.json().await.unwrap()
    }
}

fn tag_names(component: &Value) -> Vec<String> {
    let mut names: Vec<String> = component["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    names
}

fn component_names(components: &Value) -> Vec<String> {
    components
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_liveness_endpoints() {
    let fixture = TestFixture::new().await;

    let root = fixture.get_json("/").await;
    assert_eq!(root["status"], "ok");
    assert!(root["message"].is_string());

    let health = fixture.get_json("/health").await;
    assert_eq!(health, json!({ "status": "UP" }));

    let api = fixture.get_json("/api").await;
    assert_eq!(api["status"], "ok");
}

#[tokio::test]
async fn test_cors_allows_any_origin_with_credentials() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .request(reqwest::Method::OPTIONS, fixture.url("/api/services"))
        .header("Origin", "http://dashboard.example")
        .header("Access-Control-Request-Method", "PUT")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(
        headers["access-control-allow-origin"],
        "http://dashboard.example"
    );
    assert_eq!(headers["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn test_service_crud() {
    let fixture = TestFixture::new().await;

    // Create service
    let created = fixture.create_service("API").await;
    let service_id = created["id"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&service_id).is_ok());
    assert_eq!(created["name"], "API");
    assert_eq!(created["status"], "operational");
    assert!(created["created_at"].is_string());

    // Update service
    let update_resp = fixture
        .put(
            &format!("/api/services/{}", service_id),
            json!({ "name": "Public API", "status": "degraded" }),
        )
        .await;
    assert_eq!(update_resp.status(), 200);
    let updated: Value = update_resp.json().await.unwrap();
    assert_eq!(updated["name"], "Public API");
    assert_eq!(updated["status"], "degraded");
    // Omitted fields are overwritten with empty values
    assert_eq!(updated["description"], "");
    assert_eq!(updated["created_at"], created["created_at"]);

    // Get service
    let fetched = fixture
        .get_json(&format!("/api/services/{}", service_id))
        .await;
    assert_eq!(fetched["name"], "Public API");

    // List services
    let services = fixture.get_json("/api/services").await;
    assert_eq!(services.as_array().unwrap().len(), 1);
    assert_eq!(services[0]["name"], "Public API");

    // Delete service
    let delete_resp = fixture
        .client
        .delete(fixture.url(&format!("/api/services/{}", service_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete_resp.status(), 204);

    let services = fixture.get_json("/api/services").await;
    assert!(services.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_service_validation_errors() {
    let fixture = TestFixture::new().await;

    // Missing name
    let resp = fixture
        .post("/api/services", json!({ "description": "nameless" }))
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].is_string());

    // Unknown status value
    let resp = fixture
        .post("/api/services", json!({ "name": "API", "status": "on-fire" }))
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "BAD_REQUEST");

    // Malformed JSON
    let resp = fixture
        .client
        .post(fixture.url("/api/services"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let services = fixture.get_json("/api/services").await;
    assert!(services.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_missing_service_not_found() {
    let fixture = TestFixture::new().await;
    fixture.create_service("API").await;

    let resp = fixture
        .put(
            &format!("/api/services/{}", uuid::Uuid::new_v4()),
            json!({ "name": "Ghost" }),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "NOT_FOUND");

    let resp = fixture
        .put("/api/services/not-a-uuid", json!({ "name": "Ghost" }))
        .await;
    assert_eq!(resp.status(), 404);

    let services = fixture.get_json("/api/services").await;
    assert_eq!(services[0]["name"], "API");
}

#[tokio::test]
async fn test_delete_service_with_incidents_conflicts() {
    let fixture = TestFixture::new().await;
    let service = fixture.create_service("API").await;
    let service_id = service["id"].as_str().unwrap();
    fixture.create_incident(service_id).await;

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/services/{}", service_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "CONFLICT");

    let services = fixture.get_json("/api/services").await;
    assert_eq!(services.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_unknown_service_is_no_content() {
    let fixture = TestFixture::new().await;
    fixture.create_service("API").await;

    for id in [uuid::Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
        let resp = fixture
            .client
            .delete(fixture.url(&format!("/api/services/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204, "DELETE {} failed", id);
    }

    let services = fixture.get_json("/api/services").await;
    assert_eq!(services.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_incident_lifecycle() {
    let fixture = TestFixture::new().await;
    let service = fixture.create_service("API").await;
    let service_id = service["id"].as_str().unwrap();

    // Create incident with service attached
    let incident = fixture.create_incident(service_id).await;
    let incident_id = incident["id"].as_str().unwrap().to_string();
    assert_eq!(incident["service_id"], service_id);
    assert_eq!(incident["service"]["name"], "API");
    assert!(incident.get("resolved_at").is_none());

    // List incidents
    let incidents = fixture.get_json("/api/incidents").await;
    assert_eq!(incidents.as_array().unwrap().len(), 1);
    assert_eq!(incidents[0]["service"]["id"], service_id);

    // Resolve
    let resp = fixture
        .put(
            &format!("/api/incidents/{}", incident_id),
            json!({
                "title": "Elevated error rates",
                "description": "Fixed by rollback",
                "status": "resolved",
                "impact": "major"
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let resolved: Value = resp.json().await.unwrap();
    assert_eq!(resolved["status"], "resolved");
    let resolved_at = resolved["resolved_at"].as_str().unwrap().to_string();

    // Moving away from resolved keeps the first resolution timestamp
    let resp = fixture
        .put(
            &format!("/api/incidents/{}", incident_id),
            json!({
                "title": "Elevated error rates",
                "description": "Regression spotted",
                "status": "monitoring",
                "impact": "minor"
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let reopened: Value = resp.json().await.unwrap();
    assert_eq!(reopened["status"], "monitoring");
    assert_eq!(reopened["impact"], "minor");
    assert_eq!(reopened["resolved_at"], resolved_at.as_str());

    // Details with timeline entries written through the repository
    fixture
        .repo
        .create_incident_update(
            uuid::Uuid::parse_str(&incident_id).unwrap(),
            "Monitoring the fix",
            crate::models::IncidentStatus::Monitoring,
        )
        .await
        .unwrap();

    let details = fixture
        .get_json(&format!("/api/incidents/{}", incident_id))
        .await;
    assert_eq!(details["incident"]["id"], incident_id.as_str());
    assert_eq!(details["incident"]["service"]["name"], "API");
    let updates = details["updates"].as_array().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["message"], "Monitoring the fix");
    assert_eq!(updates[0]["status"], "monitoring");
}

#[tokio::test]
async fn test_incident_not_found_and_validation() {
    let fixture = TestFixture::new().await;
    let missing = uuid::Uuid::new_v4();

    let resp = fixture
        .client
        .get(fixture.url(&format!("/api/incidents/{}", missing)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .put(
            &format!("/api/incidents/{}", missing),
            json!({ "title": "x", "status": "resolved", "impact": "minor" }),
        )
        .await;
    assert_eq!(resp.status(), 404);

    // Missing impact
    let resp = fixture
        .post(
            "/api/incidents",
            json!({ "title": "x", "status": "investigating", "service_id": missing }),
        )
        .await;
    assert_eq!(resp.status(), 400);

    // Empty title
    let resp = fixture
        .post(
            "/api/incidents",
            json!({ "title": "", "status": "investigating", "impact": "minor", "service_id": missing }),
        )
        .await;
    assert_eq!(resp.status(), 400);

    let incidents = fixture.get_json("/api/incidents").await;
    assert!(incidents.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_tag_crud() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .post(
            "/api/tags",
            json!({ "name": "database", "description": "Storage" }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let tag: Value = resp.json().await.unwrap();
    assert!(uuid::Uuid::parse_str(tag["id"].as_str().unwrap()).is_ok());
    assert_eq!(tag["name"], "database");

    // Duplicate name
    let resp = fixture.post("/api/tags", json!({ "name": "database" })).await;
    assert_eq!(resp.status(), 409);

    // Missing name
    let resp = fixture.post("/api/tags", json!({ "description": "x" })).await;
    assert_eq!(resp.status(), 400);

    let tags = fixture.get_json("/api/tags").await;
    assert_eq!(tags.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_component_scenario_reuses_tag() {
    let fixture = TestFixture::new().await;

    let resp = fixture.post("/api/tags", json!({ "name": "database" })).await;
    assert_eq!(resp.status(), 201);
    let database: Value = resp.json().await.unwrap();

    let resp = fixture
        .post(
            "/api/components",
            json!({ "name": "API", "tags": ["database", "network"] }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let component: Value = resp.json().await.unwrap();
    assert_eq!(tag_names(&component), vec!["database", "network"]);
    assert_eq!(component["status"], "operational");
    let reused = component["tags"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "database")
        .unwrap();
    assert_eq!(reused["id"], database["id"]);

    let filtered = fixture.get_json("/api/components?tags=database").await;
    assert_eq!(component_names(&filtered), vec!["API"]);
}

#[tokio::test]
async fn test_component_update_replaces_tags() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .post("/api/components", json!({ "name": "API", "tags": ["a", "b"] }))
        .await;
    let component: Value = resp.json().await.unwrap();
    let id = component["id"].as_str().unwrap();

    let resp = fixture
        .put(
            &format!("/api/components/{}", id),
            json!({ "name": "API", "status": "degraded", "tags": ["b", "c"] }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(tag_names(&updated), vec!["b", "c"]);
    assert_eq!(updated["status"], "degraded");
    assert_eq!(updated["created_at"], component["created_at"]);

    // Tag "a" is no longer associated but still exists
    let tags = fixture.get_json("/api/tags").await;
    let mut all: Vec<&str> = tags
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    all.sort();
    assert_eq!(all, vec!["a", "b", "c"]);

    let by_a = fixture.get_json("/api/components?tags=a").await;
    assert!(by_a.as_array().unwrap().is_empty());

    let resp = fixture
        .put("/api/components/missing", json!({ "name": "X", "tags": [] }))
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_component_filter_union() {
    let fixture = TestFixture::new().await;

    for (name, tags) in [
        ("API", vec!["a"]),
        ("Database", vec!["c", "storage"]),
        ("Website", vec!["d"]),
        ("Worker", vec!["a", "c"]),
    ] {
        let resp = fixture
            .post("/api/components", json!({ "name": name, "tags": tags }))
            .await;
        assert_eq!(resp.status(), 201);
    }

    let by_a = fixture.get_json("/api/components?tags=a").await;
    assert_eq!(component_names(&by_a), vec!["API", "Worker"]);

    let by_a_or_c = fixture.get_json("/api/components?tags=a&tags=c").await;
    assert_eq!(
        component_names(&by_a_or_c),
        vec!["API", "Database", "Worker"]
    );
    // Each match carries its full tag set, not just the matching tags
    let database = &by_a_or_c[1];
    assert_eq!(tag_names(database), vec!["c", "storage"]);

    let all = fixture.get_json("/api/components").await;
    assert_eq!(all.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_component_delete_removes_associations() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .post("/api/components", json!({ "name": "API", "tags": ["a", "b"] }))
        .await;
    let component: Value = resp.json().await.unwrap();
    let id = component["id"].as_str().unwrap();

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/api/components/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let all = fixture.get_json("/api/components").await;
    assert!(all.as_array().unwrap().is_empty());

    // Same name, disjoint tags: nothing from the deleted component leaks through
    let resp = fixture
        .post("/api/components", json!({ "name": "API", "tags": ["c"] }))
        .await;
    let recreated: Value = resp.json().await.unwrap();
    assert_eq!(tag_names(&recreated), vec!["c"]);

    let by_a = fixture.get_json("/api/components?tags=a").await;
    assert!(by_a.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_component_requires_name() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .post("/api/components", json!({ "name": "", "tags": ["a"] }))
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let all = fixture.get_json("/api/components").await;
    assert!(all.as_array().unwrap().is_empty());
    let tags = fixture.get_json("/api/tags").await;
    assert!(tags.as_array().unwrap().is_empty());
}
