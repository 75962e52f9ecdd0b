//! End-to-end tests for the conversion flow: submit, poll, download.

mod common;

use axum::http::StatusCode;
use common::TestFixture;
use convertifile_core::converter::ConverterError;

#[tokio::test]
async fn test_submit_poll_download_happy_path() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_convert("track.flac", b"flac-bytes", &[("convert_to", "mp3")])
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED, "{:?}", response.body);
    let task_id = response.body["task_id"].as_str().unwrap().to_string();

    let status = fixture.wait_terminal(&task_id).await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["status"], "succeeded");
    assert_eq!(status.body["source_format"], "flac");
    assert_eq!(status.body["target_format"], "mp3");
    assert_eq!(status.body["filename"], "track.mp3");
    let download_url = status.body["download_url"].as_str().unwrap().to_string();
    assert_eq!(download_url, format!("/api/v1/result/{task_id}"));

    let (status, bytes) = fixture.get_bytes(&download_url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"converted");
}

#[tokio::test]
async fn test_download_sets_filename_and_content_type() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_convert("holiday photo.png", b"png", &[("convert_to", "jpg")])
        .await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    fixture.wait_terminal(&task_id).await;

    let request = axum::http::Request::builder()
        .uri(format!("/api/v1/result/{task_id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(fixture.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let disposition = response
        .headers()
        .get(axum::http::header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap();
    // jpg normalizes to jpeg at submission
    assert_eq!(
        disposition,
        "attachment; filename=\"holiday photo.jpeg\""
    );

    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("image/"), "{content_type}");
}

#[tokio::test]
async fn test_unsupported_pair_rejected_with_415() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_convert("song.mp3", b"mp3", &[("convert_to", "png")])
        .await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("not supported"));

    // Nothing was recorded
    assert!(fixture.converter.recorded_conversions().await.is_empty());
}

#[tokio::test]
async fn test_missing_target_format_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_convert("song.mp3", b"mp3", &[]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_filename_without_extension_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_convert("noextension", b"data", &[("convert_to", "mp3")])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_quality_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_convert(
            "song.flac",
            b"flac",
            &[("convert_to", "mp3"), ("quality", "250")],
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_options_reach_the_converter() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post_convert(
            "clip.mkv",
            b"mkv",
            &[
                ("convert_to", "mp4"),
                ("quality", "80"),
                ("remove_metadata", "true"),
                ("bitrate", "2M"),
            ],
        )
        .await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();
    fixture.wait_terminal(&task_id).await;

    let recorded = fixture.converter.recorded_conversions().await;
    assert_eq!(recorded.len(), 1);
    let request = &recorded[0].request;
    assert_eq!(request.options.quality, Some(80));
    assert!(request.options.remove_metadata);
    assert_eq!(request.options.bitrate.as_deref(), Some("2M"));
}

#[tokio::test]
async fn test_converter_failure_surfaces_category() {
    let fixture = TestFixture::new().await;
    fixture
        .converter
        .fail_next(ConverterError::InputCorrupt {
            reason: "moov atom not found".to_string(),
        })
        .await;

    let response = fixture
        .post_convert("clip.mp4", b"junk", &[("convert_to", "webm")])
        .await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();

    let status = fixture.wait_terminal(&task_id).await;
    assert_eq!(status.body["status"], "failed");
    assert_eq!(status.body["error"]["category"], "input-corrupt");
    assert!(status.body["download_url"].is_null());

    // No artifact, so no download
    let result = fixture.get(&format!("/api/v1/result/{task_id}")).await;
    assert_eq!(result.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_result_before_completion_is_404() {
    let fixture = TestFixture::new().await;
    fixture
        .converter
        .set_conversion_duration(std::time::Duration::from_millis(500))
        .await;

    let response = fixture
        .post_convert("track.wav", b"wav", &[("convert_to", "flac")])
        .await;
    let task_id = response.body["task_id"].as_str().unwrap().to_string();

    let result = fixture.get(&format!("/api/v1/result/{task_id}")).await;
    assert_eq!(result.status, StatusCode::NOT_FOUND);

    fixture.wait_terminal(&task_id).await;
}
