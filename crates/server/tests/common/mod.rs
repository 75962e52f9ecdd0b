//! Common test utilities for E2E testing with mocks.
//!
//! Builds an in-process server against an in-memory job store, a temp-dir
//! result store and a mock converter, so the full submit/poll/download
//! flow runs without external tools.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use convertifile_core::testing::MockConverter;
use convertifile_core::{
    Config, ConverterSet, Dispatcher, FsResultStore, JobQueue, JobStatus, JobStore, MemoryQueue,
    ResultStore, RetentionSweeper, SqliteJobStore, WorkerPool,
};

use convertifile_server::{create_router, AppState};

/// Test fixture for E2E testing against the real router.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock converter - control conversion outcomes
    pub converter: Arc<MockConverter>,
    /// Direct store access for assertions and setup
    pub job_store: Arc<dyn JobStore>,
    /// Sweeper, driven manually via `run_once`
    pub sweeper: Arc<RetentionSweeper>,
    /// Worker pool, kept alive for the fixture's lifetime
    pub pool: WorkerPool,
    /// Temp dir backing intake, results and mock scratch
    _temp_dir: TempDir,
}

/// Response from a test request.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let intake_dir = temp_dir.path().join("intake");
        let result_dir = temp_dir.path().join("results");
        let scratch_dir = temp_dir.path().join("scratch");
        std::fs::create_dir_all(&intake_dir).unwrap();
        std::fs::create_dir_all(&scratch_dir).unwrap();

        let mut config = Config::default();
        config.storage.intake_dir = intake_dir;
        config.storage.result_dir = result_dir.clone();

        let job_store: Arc<dyn JobStore> =
            Arc::new(SqliteJobStore::in_memory().expect("in-memory job store"));
        let result_store: Arc<dyn ResultStore> =
            Arc::new(FsResultStore::new(&result_dir).expect("result store"));
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());

        let converter = Arc::new(MockConverter::new(&scratch_dir));
        let mut converters = ConverterSet::new();
        converters.register(Arc::clone(&converter) as Arc<dyn convertifile_core::FileConverter>);
        let converters = Arc::new(converters);

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&job_store), Arc::clone(&queue)));

        let pool = WorkerPool::new(
            2,
            Arc::clone(&job_store),
            Arc::clone(&queue),
            Arc::clone(&result_store),
            Arc::clone(&converters),
        );
        pool.start();

        let sweeper = Arc::new(RetentionSweeper::new(
            config.retention.clone(),
            Arc::clone(&job_store),
            Arc::clone(&result_store),
            Arc::clone(&dispatcher),
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&job_store),
            result_store,
            dispatcher,
        ));
        let router = create_router(state);

        Self {
            router,
            converter,
            job_store,
            sweeper,
            pool,
            _temp_dir: temp_dir,
        }
    }

    /// GET a path, parsing the body as JSON (null for empty bodies).
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .uri(path)
            .body(Body::empty())
            .expect("build request");
        self.send(request).await
    }

    /// GET a path, returning the raw body bytes.
    pub async fn get_bytes(&self, path: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .uri(path)
            .body(Body::empty())
            .expect("build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    /// POST a multipart conversion submission.
    ///
    /// `fields` are extra form fields beyond the file part, e.g.
    /// `[("target_format", "mp3")]`.
    pub async fn post_convert(
        &self,
        file_name: &str,
        file_bytes: &[u8],
        fields: &[(&str, &str)],
    ) -> TestResponse {
        let boundary = "----convertifile-test-boundary";
        let mut body = Vec::new();

        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file_bytes);
        body.extend_from_slice(b"\r\n");

        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("build request");
        self.send(request).await
    }

    /// Poll a job's status until it reaches a terminal state.
    pub async fn wait_terminal(&self, task_id: &str) -> TestResponse {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/status/{task_id}")).await;
            if let Some(status) = response.body["status"].as_str() {
                if JobStatus::parse(status).is_some_and(|s| s.is_terminal()) {
                    return response;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {task_id} never reached a terminal state");
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, body }
    }
}
