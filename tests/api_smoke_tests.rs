use axum::body::Body;
use axum::http::{Request, StatusCode};
use hearthd::config::Config;
use hearthd::engine::Engine;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

async fn test_engine() -> Arc<Engine> {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        database_url: "sqlite::memory:".to_string(),
        servers_base_dir: tmp.path().to_path_buf(),
        host_servers_path: None,
        catalog_api_key: None,
        default_java_opts: String::new(),
        backup_retention_days: 14,
        backup_cron: None,
        log_level: "error".to_string(),
    };
    std::mem::forget(tmp);
    Engine::build(config).await.unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let engine = test_engine().await;
    let app = hearthd::api::router().with_state(engine);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn server_lifecycle_through_http() {
    let engine = test_engine().await;
    let app = hearthd::api::router().with_state(engine);

    let create_body = json!({
        "name": "alpha",
        "description": null,
        "engine": "Vanilla",
        "version": "1.20.4",
        "port": 25565,
        "memory_mb": 2048,
        "jvm_opts": null,
        "auto_start": false,
        "backup_schedule_enabled": false,
        "storage_path": null,
        "game_options": null
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/servers")
                .header("content-type", "application/json")
                .body(Body::from(create_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let id = created["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/servers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let listed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let patch_body = json!({ "memory_mb": 4096 });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/servers/{id}"))
                .header("content-type", "application/json")
                .body(Body::from(patch_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let patched: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(patched["memory_mb"], 4096);
    assert_eq!(patched["name"], "alpha");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/servers/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri(format!("/servers/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_server_name_is_reported_as_conflict() {
    let engine = test_engine().await;
    let app = hearthd::api::router().with_state(engine);

    let body = json!({
        "name": "dup",
        "description": null,
        "engine": "Vanilla",
        "version": "1.20.4",
        "port": 25566,
        "memory_mb": 2048,
        "jvm_opts": null,
        "auto_start": false,
        "backup_schedule_enabled": false,
        "storage_path": null,
        "game_options": null
    });

    let make_request = || {
        Request::builder()
            .method("POST")
            .uri("/servers")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(make_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(make_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}
