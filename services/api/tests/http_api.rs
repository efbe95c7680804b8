//! End-to-end tests of the HTTP API against an in-memory session store.

use api_lib::{
    adapters::{DbAdapter, ResolverDomainAdapter, StaticCatalog},
    config::{Config, KopsConfig},
    web::{self, AppState},
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const TOOL: &str = r#"
case "$1" in
  create)
    for i in 1 2 3 4; do echo "[$i/4] working"; done
    echo "apiVersion: v1" > "$5"
    ;;
esac
"#;

struct TestApp {
    router: Router,
    _work_dir: TempDir,
}

async fn app() -> TestApp {
    let work_dir = tempfile::tempdir().unwrap();
    let script = work_dir.path().join("tool.sh");
    std::fs::write(&script, TOOL).unwrap();

    let config = Arc::new(Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "sqlite::memory:".to_string(),
        log_level: tracing::Level::INFO,
        auth_expire: Duration::from_secs(3600),
        cleanup_interval: Duration::from_secs(1800),
        known_domains: vec!["example.com".to_string()],
        kops: KopsConfig {
            program: PathBuf::from("/bin/sh"),
            extra_args: vec![script.to_string_lossy().into_owned()],
            work_dir: work_dir.path().join("runs"),
            timeout: Duration::from_secs(30),
        },
    });

    let store = Arc::new(DbAdapter::in_memory(config.auth_expire).await.unwrap());
    store.run_migrations().await.unwrap();
    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        Arc::new(StaticCatalog::new()),
        Arc::new(ResolverDomainAdapter::new(config.known_domains.clone())),
    ));

    TestApp {
        router: web::router(state),
        _work_dir: work_dir,
    }
}

impl TestApp {
    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.call_raw(method, uri, token, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn call_raw(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("x-api-key", token);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn token(&self) -> String {
        let (status, body) = self.call("GET", "/session-id", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], true);
        body["token"].as_str().unwrap().to_string()
    }

    async fn complete_wizard(&self, token: &str) {
        let steps = [
            (
                "/credentials",
                json!({
                    "accessKey": "AKIA",
                    "secretKey": "secret",
                    "region": "eu-west-1",
                    "sshPublicKey": "ssh-rsa AAAA"
                }),
            ),
            (
                "/cluster",
                json!({"domain": "example.com", "name": "demo", "clusterType": 1}),
            ),
            (
                "/nodes",
                json!({
                    "master": {"instances": 1, "zones": ["eu-west-1a"]},
                    "workers": {"instances": 2, "zones": ["eu-west-1a", "eu-west-1b"], "instanceType": "m4.large"}
                }),
            ),
            ("/software", json!({"products": [1, 2]})),
        ];
        for (uri, body) in steps {
            let (status, reply) = self.call("PUT", uri, Some(token), Some(body)).await;
            assert_eq!(status, StatusCode::OK, "{uri}: {reply}");
            assert_eq!(reply["status"], true);
        }
    }
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = app().await;

    let (status, body) = app.call("GET", "/regions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], false);
    assert_eq!(body["error"], "invalid_token");

    let (status, _) = app.call("GET", "/regions", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.token().await;
    let (status, body) = app.call("GET", "/regions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["regions"].as_array().unwrap().len() > 1);
}

#[tokio::test]
async fn reference_data_endpoints() {
    let app = app().await;
    let token = app.token().await;

    let (status, body) = app
        .call("GET", "/nodes/zones?region=us-west-1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["zones"], json!(["us-west-1a", "us-west-1c"]));

    let (status, body) = app
        .call("GET", "/nodes/zones?region=nowhere", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (_, body) = app
        .call("GET", "/software/products?search=graf&tags=ui", Some(&token), None)
        .await;
    let names: Vec<&str> = body["products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Grafana"]);

    let (status, body) = app.call("GET", "/software/tags", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tags"].as_array().unwrap().contains(&json!("monitoring")));
}

#[tokio::test]
async fn steps_out_of_order_are_precondition_failures() {
    let app = app().await;
    let token = app.token().await;

    let (status, body) = app
        .call("PUT", "/software", Some(&token), Some(json!({"products": [1]})))
        .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], "precondition_failed");
    assert!(body["message"].as_str().unwrap().contains("credentials"));

    let (status, _) = app.call("POST", "/install", Some(&token), None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn malformed_json_uses_the_error_body() {
    let app = app().await;
    let token = app.token().await;

    let (status, body) = app
        .call("PUT", "/credentials", Some(&token), Some(json!({"accessKey": 1})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], false);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn sessions_are_isolated() {
    let app = app().await;
    let first = app.token().await;
    let second = app.token().await;
    assert_ne!(first, second);

    app.complete_wizard(&first).await;

    let (status, _) = app.call("GET", "/install/config", Some(&first), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.call("GET", "/install/config", Some(&second), None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[cfg(unix)]
#[tokio::test]
async fn install_then_vanish() {
    let app = app().await;
    let token = app.token().await;
    app.complete_wizard(&token).await;

    let (status, body) = app.call("GET", "/install/config", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fqdn"], "demo.example.com");
    assert_eq!(body["products"][1]["name"], "Grafana");

    let (status, body) = app.call("GET", "/install/kubeconfig", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_ready");

    let (status, body) = app.call("POST", "/install", Some(&token), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["phase"], "running");

    let mut last = Value::Null;
    for _ in 0..200 {
        let (status, body) = app.call("GET", "/install/status", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        if body["phase"] != "running" {
            last = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(last["phase"], "succeeded");
    assert_eq!(last["total"], 4);
    assert_eq!(last["completed"], 4);

    let (status, _) = app
        .call("PUT", "/software", Some(&token), Some(json!({"products": [3]})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, bytes) = app.call_raw("GET", "/install/kubeconfig", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"apiVersion: v1\n");

    let (status, body) = app.call("POST", "/install/vanish", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app.call("GET", "/install/status", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn boom() -> &'static str {
    panic!("secret internals")
}

#[tokio::test]
async fn panics_become_generic_errors() {
    let router: Router = web::with_edge_layers(Router::new().route("/boom", get(boom)));

    let response = router
        .oneshot(
            Request::builder()
                .uri("/boom")
                .header(header::ORIGIN, "http://console.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // CORS sits inside the panic boundary, so the panic response carries no CORS headers.
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], false);
    assert!(!body["message"].as_str().unwrap().contains("secret"));
}

#[tokio::test]
async fn cors_mirrors_the_request_origin() {
    let app = app().await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/session-id")
                .header(header::ORIGIN, "http://console.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://console.example.com"
    );
}
