//! Full submit-to-artifact flow through the HTTP surface, with stand-in
//! fetcher/transcoder scripts.

#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{build_test_app, test_config};

const FETCHER_OK: &str = r#"#!/bin/sh
tmpl="$4"
out=$(printf '%s' "$tmpl" | sed 's/%(ext)s$/webm/')
printf '[download]  50.0%% of 10MiB at 1MiB/s ETA 00:05\n'
printf '[download] 100%% of 10MiB in 00:10\n'
: > "$out"
exit 0
"#;

const TRANSCODER_OK: &str = r#"#!/bin/sh
for last in "$@"; do :; done
printf '  Duration: 00:00:10.00, start: 0.000000, bitrate: 1000 kb/s\n' >&2
printf 'out_time_ms=10000000\nprogress=end\n'
: > "$last"
exit 0
"#;

fn write_script(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().into_owned()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn submitted_url_becomes_a_served_artifact() {
    let scripts = tempfile::tempdir().unwrap();
    let media = tempfile::tempdir().unwrap();

    let mut config = test_config(media.path());
    config.fetcher_bin = write_script(scripts.path(), "fetcher.sh", FETCHER_OK);
    config.transcoder_bin = write_script(scripts.path(), "transcoder.sh", TRANSCODER_OK);
    let (app, _state) = build_test_app(config);

    // Submit.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/jobs")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"url": "https://example.com/watch?v=abc"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = json_body(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Poll the snapshot until the job reaches a terminal state.
    let snapshot = poll_until_terminal(&app, &id).await;

    assert_eq!(snapshot["status"], "done");
    assert_eq!(snapshot["progress"], 100);
    assert_eq!(snapshot["url"], format!("/media/{id}.mp4"));
    assert!(snapshot["error"].is_null());

    // The produced artifact is reachable at the advertised URL.
    let response = app
        .oneshot(
            Request::builder()
                .uri(snapshot["url"].as_str().unwrap())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn poll_until_terminal(app: &axum::Router, id: &str) -> serde_json::Value {
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/jobs/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let snapshot = json_body(response).await["data"].clone();
        if snapshot["status"] == "done" || snapshot["status"] == "error" {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job did not reach a terminal state in time");
}
