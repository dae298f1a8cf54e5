//! Integration tests for the npm registry HTTP API
//!
//! Drives the router with `oneshot` requests against an in-memory database
//! and a filesystem storage backend in a temp directory.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{
    build_tgz, extract_body, extract_json_body, publish_document, publish_request, TestContext,
    BASE_URL, PUBLISH_KEY,
};
use registry_server::ApiErrorResponse;
use serde_json::Value;

#[tokio::test]
async fn test_ping() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/-/ping").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = extract_json_body(response).await;
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn test_publish_then_fetch_metadata() {
    let ctx = TestContext::new().await;
    let tgz = build_tgz(&[
        ("package/package.json", br#"{"name":"foo","version":"1.0.0"}"#),
        ("package/index.js", b"module.exports = () => 'foo';\n"),
        ("package/lib/util.js", b"exports.x = 1;\n"),
    ]);

    let response = ctx
        .publish("foo", &publish_document("foo", "1.0.0", "latest", &tgz))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_body(response).await.is_empty());

    let response = ctx.get("/foo").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = extract_json_body(response).await;

    assert_eq!(body["name"], "foo");
    assert_eq!(body["description"], "A test package");
    assert_eq!(body["dist-tags"]["latest"], "1.0.0");

    let version = &body["versions"]["1.0.0"];
    assert_eq!(version["name"], "foo");
    assert_eq!(version["version"], "1.0.0");
    assert_eq!(version["author"]["name"], "Test Author");
    assert_eq!(version["dependencies"]["left-pad"], "^1.3.0");
    assert_eq!(version["engines"]["node"], ">=18");
    assert_eq!(version["dist"]["integrity"], "sha512-test-integrity");
    assert_eq!(
        version["dist"]["shasum"],
        "0123456789abcdef0123456789abcdef01234567"
    );
    assert_eq!(version["dist"]["fileCount"], 3);
    assert_eq!(version["dist"]["unpackedSize"], 32 + 30 + 15);
    assert_eq!(
        version["dist"]["tarball"],
        format!("{}/foo/-/foo-1.0.0.tgz", BASE_URL)
    );

    let created = body["time"]["created"].as_str().unwrap();
    assert_eq!(created.len(), "2024-01-01T00:00:00.000Z".len());
    assert!(created.ends_with('Z'));
    assert!(body["time"]["modified"].is_string());
    assert!(body["time"]["1.0.0"].is_string());
}

#[tokio::test]
async fn test_download_streams_artifact() {
    let ctx = TestContext::new().await;
    let tgz = build_tgz(&[("package/index.js", b"console.log('hi');\n")]);
    ctx.publish("foo", &publish_document("foo", "1.0.0", "latest", &tgz))
        .await;

    let response = ctx.get("/foo/-/foo-1.0.0.tgz").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(extract_body(response).await, tgz);

    let response = ctx.get("/foo/-/foo-2.0.0.tgz").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ApiErrorResponse = extract_json_body(response).await;
    assert!(!body.error.is_empty());
}

#[tokio::test]
async fn test_scoped_package_round_trip() {
    let ctx = TestContext::new().await;
    let tgz = build_tgz(&[("package/index.js", b"1")]);

    let response = ctx
        .publish(
            "@scope/foo",
            &publish_document("@scope/foo", "1.0.0", "latest", &tgz),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(ctx.storage_dir.join("@scope").join("foo-1.0.0.tgz").is_file());

    for uri in ["/@scope%2ffoo", "/@scope/foo"] {
        let response = ctx.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        let body: Value = extract_json_body(response).await;
        assert_eq!(
            body["versions"]["1.0.0"]["dist"]["tarball"],
            format!("{}/@scope/foo/-/foo-1.0.0.tgz", BASE_URL)
        );
    }

    for uri in ["/@scope/foo/-/foo-1.0.0.tgz", "/@scope%2ffoo/-/foo-1.0.0.tgz"] {
        let response = ctx.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(extract_body(response).await, tgz);
    }
}

#[tokio::test]
async fn test_duplicate_publish_is_rejected() {
    let ctx = TestContext::new().await;
    let first = build_tgz(&[("package/index.js", b"first")]);
    let second = build_tgz(&[("package/index.js", b"second release")]);

    let response = ctx
        .publish("foo", &publish_document("foo", "1.0.0", "latest", &first))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .publish("foo", &publish_document("foo", "1.0.0", "next", &second))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiErrorResponse = extract_json_body(response).await;
    assert!(body.error.contains("1.0.0"));

    // First publish is untouched
    let package = ctx.store.get_package("foo").await.unwrap();
    assert_eq!(package.dist_tags.len(), 1);
    assert_eq!(ctx.store.list_versions(package.id).await.unwrap().len(), 1);

    let response = ctx.get("/foo/-/foo-1.0.0.tgz").await;
    assert_eq!(extract_body(response).await, first);
}

#[tokio::test]
async fn test_length_mismatch_is_rejected_before_storage() {
    let ctx = TestContext::new().await;
    let tgz = build_tgz(&[("package/index.js", b"1")]);

    let mut document = publish_document("foo", "1.0.0", "latest", &tgz);
    document["_attachments"]["foo-1.0.0.tgz"]["length"] = Value::from(tgz.len() + 1);

    let response = ctx.publish("foo", &document).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiErrorResponse = extract_json_body(response).await;
    assert_eq!(
        body.error,
        "Data length does not match attachment length value"
    );

    assert_eq!(ctx.stored_file_count(), 0);
    assert!(ctx.store.find_package("foo").await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupted_gzip_is_rejected_without_side_effects() {
    let ctx = TestContext::new().await;
    let mut tgz = build_tgz(&[("package/index.js", b"console.log('hello world');\n")]);
    let middle = tgz.len() / 2;
    for byte in &mut tgz[middle..middle + 6] {
        *byte ^= 0xa5;
    }

    let response = ctx
        .publish("foo", &publish_document("foo", "1.0.0", "latest", &tgz))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(ctx.stored_file_count(), 0);
    assert!(ctx.store.find_package("foo").await.unwrap().is_none());
}

#[tokio::test]
async fn test_wrong_attachment_type_is_unsupported_media_type() {
    let ctx = TestContext::new().await;
    let tgz = build_tgz(&[("package/index.js", b"1")]);

    let mut document = publish_document("foo", "1.0.0", "latest", &tgz);
    document["_attachments"]["foo-1.0.0.tgz"]["content_type"] = Value::from("text/plain");

    let response = ctx.publish("foo", &document).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(ctx.stored_file_count(), 0);
}

#[tokio::test]
async fn test_invalid_name_and_malformed_body() {
    let ctx = TestContext::new().await;
    let tgz = build_tgz(&[("package/index.js", b"1")]);

    let response = ctx
        .publish("Foo", &publish_document("Foo", "1.0.0", "latest", &tgz))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiErrorResponse = extract_json_body(response).await;
    assert_eq!(body.error, "Invalid package name");

    let request = Request::builder()
        .method("PUT")
        .uri("/foo")
        .header(header::AUTHORIZATION, format!("Bearer {}", PUBLISH_KEY))
        .body(Body::from("{ this is not json"))
        .unwrap();
    let response = ctx.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_package_is_not_found() {
    let ctx = TestContext::new().await;

    let response = ctx.get("/does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = extract_json_body(response).await;
    let envelope = body.as_object().unwrap();
    assert_eq!(envelope.len(), 1);
    assert!(envelope["error"].is_string());
}

#[tokio::test]
async fn test_publish_requires_valid_bearer_token() {
    let ctx = TestContext::new().await;
    let tgz = build_tgz(&[("package/index.js", b"1")]);
    let document = publish_document("foo", "1.0.0", "latest", &tgz);

    let response = ctx.send(publish_request("foo", &document, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ApiErrorResponse = extract_json_body(response).await;
    assert!(!body.error.is_empty());

    let response = ctx
        .send(publish_request("foo", &document, Some("wrong-key")))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert_eq!(ctx.stored_file_count(), 0);
    assert!(ctx.store.find_package("foo").await.unwrap().is_none());
}

#[tokio::test]
async fn test_publish_records_audit_log() {
    let ctx = TestContext::new().await;
    let tgz = build_tgz(&[("package/index.js", b"1")]);

    ctx.publish("foo", &publish_document("foo", "1.0.0", "latest", &tgz))
        .await;

    let logs = ctx.store.list_audit_logs("foo").await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_key, PUBLISH_KEY);
    assert_eq!(logs[0].version.as_deref(), Some("1.0.0"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let ctx = TestContext::new().await;
    let padding = "x".repeat(2 * 1024 * 1024);
    let document = serde_json::json!({ "name": "foo", "padding": padding });

    let response = ctx.publish("foo", &document).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
