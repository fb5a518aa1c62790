//! End-to-end tests: definitions on disk, loaded and run against a mock server.

use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rust_loadplan::loader::load_plan;
use rust_loadplan::report::{MemoryReporter, ReportLine};
use rust_loadplan::runner::run;

/// Writes a definition tree: one file per definition, named after it.
struct PlanTree {
    dir: TempDir,
}

impl PlanTree {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        for kind in ["requests", "tasks", "steps"] {
            fs::create_dir(dir.path().join(kind)).unwrap();
        }
        Self { dir }
    }

    fn write(&self, kind: &str, def: Value) -> &Self {
        let name = def["name"].as_str().unwrap().to_string();
        let file = self.dir.path().join(kind).join(format!("{}.json", name));
        fs::write(file, def.to_string()).unwrap();
        self
    }

    fn plan(&self, def: Value) -> &Self {
        fs::write(self.dir.path().join("plan.json"), def.to_string()).unwrap();
        self
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

async fn run_tree(tree: &PlanTree) -> Arc<MemoryReporter> {
    let loaded = load_plan(tree.root(), "plan.json").unwrap();
    let reporter = Arc::new(MemoryReporter::new());
    run(&loaded.plan, reqwest::Client::new(), reporter.clone())
        .await
        .unwrap();
    reporter
}

fn count_lines(reporter: &MemoryReporter, pred: impl Fn(&ReportLine) -> bool) -> usize {
    reporter.lines().iter().filter(|l| pred(*l)).count()
}

#[tokio::test]
async fn chained_create_then_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_json(json!({"name": "alice"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "42", "name": "alice"})))
        .expect(4)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42"})))
        .expect(4)
        .mount(&server)
        .await;

    let tree = PlanTree::new();
    tree.write("requests", json!({
            "name": "create-user",
            "method": "POST",
            "path": "/users",
            "body": {"name": "alice"}
        }))
        .write("requests", json!({
            "name": "get-user",
            "method": "GET",
            "path": "/users/{{id}}",
            "paramsURL": ["id"]
        }))
        .write("tasks", json!({
            "name": "create",
            "nextData": ["id"],
            "expectedStatus": 201,
            "request": "create-user"
        }))
        .write("tasks", json!({
            "name": "fetch",
            "previusData": ["id"],
            "expectedStatus": 200,
            "request": "get-user"
        }))
        .write("steps", json!({
            "name": "users",
            "numPetitions": 4,
            "concurrentUsers": 2,
            "tasks": ["create", "fetch"]
        }))
        .plan(json!({
            "type": "load",
            "name": "user-flow",
            "url": server.uri(),
            "steps": ["users"]
        }));

    let reporter = run_tree(&tree).await;

    assert_eq!(count_lines(&reporter, |l| matches!(l, ReportLine::TaskSucceeded { .. })), 8);
    assert_eq!(count_lines(&reporter, |l| matches!(l, ReportLine::TaskFailed { .. })), 0);
    assert_eq!(count_lines(&reporter, |l| matches!(l, ReportLine::IterationTotal { .. })), 4);
}

#[tokio::test]
async fn chain_value_is_injected_into_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc", "ttl": 60})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/profile"))
        .and(body_json(json!({"token": "abc", "theme": "dark"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let tree = PlanTree::new();
    tree.write("requests", json!({"name": "login", "method": "post", "path": "/sessions"}))
        .write("requests", json!({
            "name": "update-profile",
            "method": "put",
            "path": "/profile",
            "ParamsBody": ["token"],
            "body": {"token": "", "theme": "dark"}
        }))
        .write("tasks", json!({
            "name": "login",
            "nextData": ["token"],
            "expectedStatus": 200,
            "request": "login"
        }))
        .write("tasks", json!({
            "name": "update",
            "previousData": ["token"],
            "expectedStatus": 204,
            "request": "update-profile"
        }))
        .write("steps", json!({
            "name": "profile",
            "numPetitions": 1,
            "concurrentUsers": 1,
            "tasks": ["login", "update"]
        }))
        .plan(json!({"name": "profile", "url": server.uri(), "steps": ["profile"]}));

    let reporter = run_tree(&tree).await;

    assert_eq!(count_lines(&reporter, |l| matches!(l, ReportLine::TaskSucceeded { .. })), 2);
}

#[tokio::test]
async fn basic_auth_header_is_sent() {
    let server = MockServer::start().await;

    // base64("user:pass")
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let tree = PlanTree::new();
    tree.write("requests", json!({"name": "health", "method": "GET", "path": "health"}))
        .write("tasks", json!({"name": "health", "expectedStatus": 200, "request": "health"}))
        .write("steps", json!({
            "name": "health-check",
            "numPetitions": 2,
            "concurrentUsers": 1,
            "tasks": ["health"]
        }))
        .plan(json!({
            "name": "auth",
            "authType": "basic",
            "authUser": "user",
            "authPass": "pass",
            "url": server.uri(),
            "path": "/api/",
            "steps": ["health-check"]
        }));

    let reporter = run_tree(&tree).await;

    assert_eq!(count_lines(&reporter, |l| matches!(l, ReportLine::TaskSucceeded { .. })), 2);
}

#[tokio::test]
async fn request_url_overrides_plan_url() {
    let plan_server = MockServer::start().await;
    let other_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&plan_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&other_server)
        .await;

    let tree = PlanTree::new();
    tree.write("requests", json!({
            "name": "status",
            "method": "GET",
            "url": other_server.uri(),
            "path": "/status"
        }))
        .write("tasks", json!({"name": "status", "expectedStatus": 200, "request": "status"}))
        .write("steps", json!({
            "name": "external",
            "numPetitions": 3,
            "concurrentUsers": 3,
            "tasks": ["status"]
        }))
        .plan(json!({"name": "override", "url": plan_server.uri(), "steps": ["external"]}));

    run_tree(&tree).await;
}

#[tokio::test]
async fn status_mismatch_fails_iteration_and_skips_rest() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tree = PlanTree::new();
    tree.write("requests", json!({"name": "create-order", "method": "POST", "path": "/orders"}))
        .write("requests", json!({"name": "list-orders", "method": "GET", "path": "/orders"}))
        .write("tasks", json!({"name": "create", "expectedStatus": 201, "request": "create-order"}))
        .write("tasks", json!({"name": "list", "expectedStatus": 200, "request": "list-orders"}))
        .write("steps", json!({
            "name": "orders",
            "numPetitions": 2,
            "concurrentUsers": 1,
            "tasks": ["create", "list"]
        }))
        .plan(json!({"name": "orders", "url": server.uri(), "steps": ["orders"]}));

    let reporter = run_tree(&tree).await;
    let rendered = reporter.rendered();

    assert_eq!(
        rendered[0],
        "orders|U0|FAIL|create|0|status not expected: expected 201, got 500"
    );
    assert_eq!(rendered[1], "T|orders|U0|0 ns|0");
    assert_eq!(
        rendered[2],
        "orders|U0|FAIL|create|1|status not expected: expected 201, got 500"
    );
    assert_eq!(rendered[3], "T|orders|U0|0 ns|1");
    assert!(rendered[4].starts_with("Full Plan: "));
    assert_eq!(rendered.len(), 5);
}

#[tokio::test]
async fn petitions_are_split_between_users() {
    let server = MockServer::start().await;

    // 10 petitions over 3 users: 3 iterations each, remainder dropped
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .expect(9)
        .mount(&server)
        .await;

    let tree = PlanTree::new();
    tree.write("requests", json!({"name": "ping", "method": "GET", "path": "/ping"}))
        .write("tasks", json!({"name": "ping", "expectedStatus": 200, "request": "ping"}))
        .write("steps", json!({
            "name": "pings",
            "numPetitions": 10,
            "concurrentUsers": 3,
            "tasks": ["ping"]
        }))
        .plan(json!({"name": "split", "url": server.uri(), "steps": ["pings"]}));

    let reporter = run_tree(&tree).await;

    for user in 0..3 {
        let iterations = count_lines(&reporter, |l| {
            matches!(l, ReportLine::IterationTotal { user: u, .. } if *u == user)
        });
        assert_eq!(iterations, 3, "user {}", user);
    }
    assert_eq!(reporter.lines().len(), 9 + 9 + 1);
}

#[tokio::test]
async fn single_user_lines_are_in_iteration_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(10)
        .mount(&server)
        .await;

    let tree = PlanTree::new();
    tree.write("requests", json!({"name": "a", "method": "GET", "path": "/a"}))
        .write("requests", json!({"name": "b", "method": "GET", "path": "/b"}))
        .write("tasks", json!({"name": "first", "expectedStatus": 200, "request": "a"}))
        .write("tasks", json!({"name": "second", "expectedStatus": 200, "request": "b"}))
        .write("steps", json!({
            "name": "seq",
            "numPetitions": 5,
            "concurrentUsers": 1,
            "tasks": ["first", "second"]
        }))
        .plan(json!({"name": "ordering", "url": server.uri(), "steps": ["seq"]}));

    let reporter = run_tree(&tree).await;
    let lines = reporter.lines();

    assert_eq!(lines.len(), 16);
    for iteration in 0..5 {
        let chunk = &lines[iteration * 3..iteration * 3 + 3];
        assert!(matches!(&chunk[0], ReportLine::TaskSucceeded { task, iteration: i, .. } if task == "first" && *i == iteration));
        assert!(matches!(&chunk[1], ReportLine::TaskSucceeded { task, iteration: i, .. } if task == "second" && *i == iteration));
        assert!(matches!(&chunk[2], ReportLine::IterationTotal { iteration: i, .. } if *i == iteration));
    }
}
