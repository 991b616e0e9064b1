//! End-to-end HTTP scenarios from spec.md §8, driven through the full
//! actix-web stack via `actix_web::test::init_service` — the standard
//! actix-web integration-test harness (the teacher repo carries no
//! `tests/` precedent of its own to ground this on).

use std::sync::Arc;

use actix_web::{test, web, App};
use serde_json::json;

use shortener_api::bus::log_bus::LogBus;
use shortener_api::fraud_scanner::{FraudScanner, SubstringReputationCheck};
use shortener_api::kv::memory_kv::MemoryKv;
use shortener_api::store::sqlite_store::SqliteStore;
use shortener_api::api;
use shortener_core::Engine;

fn temp_store() -> Arc<SqliteStore> {
    let path = std::env::temp_dir().join(format!(
        "shortener-api-test-{}-{}.sqlite3",
        std::process::id(),
        rand::random::<u64>()
    ));
    Arc::new(SqliteStore::open(path.to_str().unwrap()).unwrap())
}

#[actix_web::test]
async fn healthz_reports_ok() {
    let store = temp_store();
    let engine = Engine::start(
        store.clone(),
        store.clone(),
        Arc::new(MemoryKv::new()),
        store.clone(),
        Arc::new(LogBus::new(crossbeam_channel::unbounded().0)),
        Some(2),
    )
    .await
    .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine))
            .configure(api::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn create_then_resolve_within_the_same_request_cycle() {
    let store = temp_store();
    let engine = Engine::start(
        store.clone(),
        store.clone(),
        Arc::new(MemoryKv::new()),
        store.clone(),
        Arc::new(LogBus::new(crossbeam_channel::unbounded().0)),
        Some(2),
    )
    .await
    .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine))
            .configure(api::configure),
    )
    .await;

    let create_req = test::TestRequest::post()
        .uri("/short")
        .insert_header(("Content-Type", "application/json"))
        .set_json(json!({ "origin": "https://example.com/x" }))
        .to_request();
    let created: serde_json::Value = test::call_and_read_body_json(&app, create_req).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let get_req = test::TestRequest::get()
        .uri(&format!("/short/{id}"))
        .to_request();
    let resolved: serde_json::Value = test::call_and_read_body_json(&app, get_req).await;
    assert_eq!(resolved["origin"], "https://example.com/x");
}

#[actix_web::test]
async fn create_without_json_content_type_is_rejected() {
    let store = temp_store();
    let engine = Engine::start(
        store.clone(),
        store.clone(),
        Arc::new(MemoryKv::new()),
        store.clone(),
        Arc::new(LogBus::new(crossbeam_channel::unbounded().0)),
        Some(2),
    )
    .await
    .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine))
            .configure(api::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/short")
        .set_payload(r#"{"origin":"https://example.com"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn unknown_id_resolves_to_404() {
    let store = temp_store();
    let engine = Engine::start(
        store.clone(),
        store.clone(),
        Arc::new(MemoryKv::new()),
        store.clone(),
        Arc::new(LogBus::new(crossbeam_channel::unbounded().0)),
        Some(2),
    )
    .await
    .unwrap();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine))
            .configure(api::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/short/zzzz").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn fraud_mark_propagates_from_scanner_to_fraud_endpoint() {
    let store = temp_store();
    let (fraud_tx, fraud_rx) = crossbeam_channel::unbounded();
    let engine = Engine::start(
        store.clone(),
        store.clone(),
        Arc::new(MemoryKv::new()),
        store.clone(),
        Arc::new(LogBus::new(fraud_tx)),
        Some(2),
    )
    .await
    .unwrap();

    let scanner = FraudScanner::new(
        fraud_rx,
        store.clone(),
        Arc::new(SubstringReputationCheck),
        tokio::runtime::Handle::current(),
    );
    let _scanner_handle = scanner.spawn();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(engine))
            .configure(api::configure),
    )
    .await;

    let create_req = test::TestRequest::post()
        .uri("/short")
        .insert_header(("Content-Type", "application/json"))
        .set_json(json!({ "origin": "https://malicious.example.com" }))
        .to_request();
    let created: serde_json::Value = test::call_and_read_body_json(&app, create_req).await;
    let id = created["id"].as_str().unwrap().to_string();

    let before_req = test::TestRequest::get()
        .uri(&format!("/fraud/{id}"))
        .to_request();
    let before: serde_json::Value = test::call_and_read_body_json(&app, before_req).await;
    assert_eq!(before["fraud"], false);

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let after_req = test::TestRequest::get()
        .uri(&format!("/fraud/{id}"))
        .to_request();
    let after: serde_json::Value = test::call_and_read_body_json(&app, after_req).await;
    assert_eq!(after["fraud"], true);
}
