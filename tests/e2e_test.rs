//! End-to-end tests against a live stega server.
//!
//! These tests require the ImageProcess server running and reachable.
//! Set API_BASE_URL to override the default (http://127.0.0.1:6100) and
//! TEST_IMAGE to point at a JPEG or PNG on disk.
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stega_queue::config::ApiConfig;
use stega_queue::models::job::{JobFile, JobOrigin, JobResult, JobStatus};
use stega_queue::queue::TaskQueue;
use stega_queue::services::gallery::DirGallery;
use stega_queue::services::stego::HttpStegoClient;

fn api_config() -> ApiConfig {
    ApiConfig {
        base_url: std::env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:6100".to_string()),
        timeout_ms: 30_000,
    }
}

fn test_image() -> PathBuf {
    PathBuf::from(
        std::env::var("TEST_IMAGE").unwrap_or_else(|_| "tests/test_photo.jpg".to_string()),
    )
}

#[tokio::test]
#[ignore] // Requires a running stega server
async fn test_e2e_ping() {
    let client = HttpStegoClient::new(api_config());

    assert!(
        client.ping(Duration::from_secs(5)).await,
        "server unreachable"
    );
    println!("✓ ping ok");
}

#[tokio::test]
#[ignore] // Requires a running stega server
async fn test_e2e_models_listed() {
    let client = HttpStegoClient::new(api_config());

    let models = client.list_models().await.expect("models call failed");
    println!("✓ server models: {models:?}");
    assert!(!models.is_empty(), "server reports no models");
}

#[tokio::test]
#[ignore] // Requires a running stega server and a test image
async fn test_e2e_encode_then_decode_roundtrip() {
    let image = test_image();
    assert!(
        image.exists(),
        "test image not found: {}",
        image.display()
    );

    let gallery_dir = std::env::temp_dir().join("stega-queue-e2e-gallery");
    let client = Arc::new(HttpStegoClient::new(api_config()));
    let queue = TaskQueue::new(client.clone(), Arc::new(DirGallery::new(&gallery_dir)));

    // 1. Encode a short id into the test image
    let ids = queue.enqueue_encode(vec![JobFile::new(&image)], "AB12xy9", JobOrigin::Gallery);
    assert_eq!(ids.len(), 1);
    queue.join_idle().await;

    let job = queue.get(ids[0]).expect("encode job vanished");
    assert_eq!(
        job.status,
        JobStatus::Success,
        "encode failed: {:?}",
        job.error
    );
    let Some(JobResult::Encode {
        output_path,
        saved_asset_id,
        saved,
    }) = job.result
    else {
        panic!("encode job carries no encode result");
    };
    assert!(saved);
    assert!(gallery_dir.join(&saved_asset_id).exists());
    println!("✓ encode produced {}", output_path.display());

    // 2. Decode the produced artifact and expect the embedded id back
    let ids = queue.enqueue_decode(vec![JobFile::new(&output_path)], JobOrigin::Gallery);
    queue.join_idle().await;

    let job = queue.get(ids[0]).expect("decode job vanished");
    assert_eq!(
        job.status,
        JobStatus::Success,
        "decode failed: {:?}",
        job.error
    );
    let Some(JobResult::Decode {
        extracted_id,
        model_used,
    }) = job.result
    else {
        panic!("decode job carries no decode result");
    };
    assert_eq!(extracted_id, "AB12xy9");
    println!("✓ decode recovered id via model {model_used:?}");
}
