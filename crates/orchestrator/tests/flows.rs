//! End-to-end orchestrator flows against in-memory collaborators.
//!
//! Everything here runs on a paused tokio clock, so backoff and budget
//! behavior is exercised without real waiting.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use lumen_core::types::{DbId, GenerationKind};
use lumen_db::models::generation::Generation;
use lumen_db::models::status::GenerationStatus;
use lumen_orchestrator::{
    AssetPublisher, CreditLedger, GenerationOrchestrator, JobStore, OrchestrateError,
    OrchestratorConfig, PublishError, RecoverySweeper,
};
use lumen_promptchan::{
    ImageArtifact, ImageGeneration, ImageRequest, ProviderError, ProviderPhase, VideoGeneration,
    VideoRequest, VideoResult, VideoStatus,
};
use lumen_storage::{ArtifactStore, StorageError};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeJobStore {
    rows: Mutex<HashMap<DbId, Generation>>,
}

impl FakeJobStore {
    fn insert(&self, job: Generation) {
        self.rows.lock().unwrap().insert(job.id, job);
    }

    fn get(&self, id: DbId) -> Generation {
        self.rows.lock().unwrap().get(&id).cloned().unwrap()
    }
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn find(&self, id: DbId) -> Result<Option<Generation>, sqlx::Error> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn mark_processing(&self, id: DbId) -> Result<bool, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).unwrap();
        if row.status_id != GenerationStatus::Pending.id() {
            return Ok(false);
        }
        row.status_id = GenerationStatus::Processing.id();
        row.started_at = Some(Utc::now());
        Ok(true)
    }

    async fn set_request_id(&self, id: DbId, request_id: &str) -> Result<(), sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        rows.get_mut(&id).unwrap().request_id = Some(request_id.to_string());
        Ok(())
    }

    async fn complete(&self, id: DbId, asset_id: DbId) -> Result<bool, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).unwrap();
        if row.status_id != GenerationStatus::Processing.id() {
            return Ok(false);
        }
        row.status_id = GenerationStatus::Completed.id();
        row.asset_id = Some(asset_id);
        row.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn fail(&self, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).unwrap();
        if row.status_id == GenerationStatus::Completed.id()
            || row.status_id == GenerationStatus::Failed.id()
        {
            return Ok(false);
        }
        row.status_id = GenerationStatus::Failed.id();
        row.error_message = Some(error.to_string());
        row.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn stale_processing(
        &self,
        stale_after: Duration,
    ) -> Result<Vec<Generation>, sqlx::Error> {
        let cutoff = Utc::now() - chrono::Duration::from_std(stale_after).unwrap();
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|row| {
                row.status_id == GenerationStatus::Processing.id()
                    && row.started_at.is_some_and(|t| t < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn reclaim_stale(&self, id: DbId, stale_after: Duration) -> Result<bool, sqlx::Error> {
        let cutoff = Utc::now() - chrono::Duration::from_std(stale_after).unwrap();
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&id).unwrap();
        if row.status_id != GenerationStatus::Processing.id()
            || !row.started_at.is_some_and(|t| t < cutoff)
        {
            return Ok(false);
        }
        row.started_at = Some(Utc::now());
        Ok(true)
    }
}

/// Refund ledger with the same idempotence guard as the real one: at
/// most one refund per generation, whoever asks.
#[derive(Default)]
struct FakeLedger {
    refunded: Mutex<HashSet<DbId>>,
    entries: Mutex<Vec<(DbId, DbId, i32)>>,
    attempts: AtomicUsize,
}

#[async_trait]
impl CreditLedger for FakeLedger {
    async fn refund(
        &self,
        generation_id: DbId,
        user_id: DbId,
        amount: i32,
    ) -> Result<bool, sqlx::Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.refunded.lock().unwrap().insert(generation_id) {
            return Ok(false);
        }
        self.entries
            .lock()
            .unwrap()
            .push((generation_id, user_id, amount));
        Ok(true)
    }
}

#[derive(Debug, Clone)]
struct Published {
    job_id: DbId,
    storage_key: String,
    public_url: String,
}

#[derive(Default)]
struct FakePublisher {
    next_id: AtomicI64,
    assets: Mutex<Vec<Published>>,
}

#[async_trait]
impl AssetPublisher for FakePublisher {
    async fn publish(
        &self,
        job: &Generation,
        storage_key: &str,
        public_url: &str,
    ) -> Result<DbId, PublishError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
        self.assets.lock().unwrap().push(Published {
            job_id: job.id,
            storage_key: storage_key.to_string(),
            public_url: public_url.to_string(),
        });
        Ok(id)
    }
}

struct FakeStore {
    fail: bool,
    uploads: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeStore {
    fn new() -> Self {
        Self {
            fail: false,
            uploads: Mutex::new(Vec::new()),
            downloads: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn url_for(key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn put(
        &self,
        _bytes: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "bucket unavailable".to_string(),
            });
        }
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(Self::url_for(key))
    }

    async fn put_from_url(&self, remote_url: &str, key: &str) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "bucket unavailable".to_string(),
            });
        }
        self.downloads.lock().unwrap().push(remote_url.to_string());
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(Self::url_for(key))
    }
}

enum ImageBehavior {
    Bytes(Vec<u8>),
    Url(String),
    Reject(String),
}

enum SubmitBehavior {
    Accept(String),
    Reject(String),
}

struct FakeProvider {
    image: ImageBehavior,
    submit: SubmitBehavior,
    submit_calls: AtomicUsize,
    /// Scripted status snapshots; once exhausted, every further poll
    /// reports `Processing`.
    polls: Mutex<VecDeque<VideoStatus>>,
    result_urls: Vec<String>,
}

impl FakeProvider {
    fn images(image: ImageBehavior) -> Self {
        Self {
            image,
            submit: SubmitBehavior::Reject("not a video provider".to_string()),
            submit_calls: AtomicUsize::new(0),
            polls: Mutex::new(VecDeque::new()),
            result_urls: Vec::new(),
        }
    }

    fn videos(request_id: &str, phases: Vec<ProviderPhase>, result_urls: Vec<String>) -> Self {
        let polls = phases
            .into_iter()
            .map(|phase| VideoStatus {
                phase,
                progress: None,
                queue_position: None,
                error: None,
            })
            .collect();
        Self {
            image: ImageBehavior::Reject("not an image provider".to_string()),
            submit: SubmitBehavior::Accept(request_id.to_string()),
            submit_calls: AtomicUsize::new(0),
            polls: Mutex::new(polls),
            result_urls,
        }
    }
}

#[async_trait]
impl ImageGeneration for FakeProvider {
    async fn generate(&self, _request: &ImageRequest) -> Result<ImageArtifact, ProviderError> {
        match &self.image {
            ImageBehavior::Bytes(bytes) => Ok(ImageArtifact::Bytes(bytes.clone())),
            ImageBehavior::Url(url) => Ok(ImageArtifact::Url(url.clone())),
            ImageBehavior::Reject(text) => Err(ProviderError::Rejected(text.clone())),
        }
    }
}

#[async_trait]
impl VideoGeneration for FakeProvider {
    async fn submit(&self, _request: &VideoRequest) -> Result<String, ProviderError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match &self.submit {
            SubmitBehavior::Accept(id) => Ok(id.clone()),
            SubmitBehavior::Reject(text) => Err(ProviderError::Rejected(text.clone())),
        }
    }

    async fn poll_status(&self, _request_id: &str) -> Result<VideoStatus, ProviderError> {
        Ok(self.polls.lock().unwrap().pop_front().unwrap_or(VideoStatus {
            phase: ProviderPhase::Processing,
            progress: Some(0.5),
            queue_position: None,
            error: None,
        }))
    }

    async fn fetch_result(&self, _request_id: &str) -> Result<VideoResult, ProviderError> {
        Ok(VideoResult {
            artifact_urls: self.result_urls.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const USER_ID: DbId = 7;

struct Harness {
    jobs: Arc<FakeJobStore>,
    ledger: Arc<FakeLedger>,
    publisher: Arc<FakePublisher>,
    store: Arc<FakeStore>,
    provider: Arc<FakeProvider>,
    orchestrator: Arc<GenerationOrchestrator>,
}

impl Harness {
    fn new(provider: FakeProvider, store: FakeStore) -> Self {
        let jobs = Arc::new(FakeJobStore::default());
        let ledger = Arc::new(FakeLedger::default());
        let publisher = Arc::new(FakePublisher::default());
        let store = Arc::new(store);
        let provider = Arc::new(provider);
        let config = OrchestratorConfig {
            poll_initial_interval: Duration::from_secs(1),
            poll_max_interval: Duration::from_secs(4),
            poll_budget: Duration::from_secs(20),
            stale_after: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        };
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            provider.clone(),
            store.clone(),
            jobs.clone(),
            ledger.clone(),
            publisher.clone(),
            config,
        ));
        Self {
            jobs,
            ledger,
            publisher,
            store,
            provider,
            orchestrator,
        }
    }

    fn seed(&self, id: DbId, kind: GenerationKind, status: GenerationStatus, credits: i32) {
        self.jobs.insert(Generation {
            id,
            user_id: USER_ID,
            kind_id: kind.id(),
            prompt: "a red fox in snow".to_string(),
            negative_prompt: None,
            settings: serde_json::json!({ "quality": "standard" }),
            engine: "promptchan".to_string(),
            status_id: status.id(),
            request_id: None,
            credits_used: credits,
            asset_id: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: if status == GenerationStatus::Pending {
                None
            } else {
                Some(Utc::now())
            },
            completed_at: None,
        });
    }

    fn refunds(&self) -> Vec<(DbId, DbId, i32)> {
        self.ledger.entries.lock().unwrap().clone()
    }

    fn published(&self) -> Vec<Published> {
        self.publisher.assets.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Image flows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn image_happy_path_completes_and_publishes() {
    let h = Harness::new(
        FakeProvider::images(ImageBehavior::Bytes(vec![0xff, 0xd8, 0xff])),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Image, GenerationStatus::Pending, 1);

    h.orchestrator.process(1).await.unwrap();

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Completed);
    assert!(job.asset_id.is_some());
    assert!(job.error_message.is_none());
    assert!(job.completed_at.is_some());

    let published = h.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].job_id, 1);
    assert_eq!(published[0].storage_key, "assets/7/1/original.jpg");
    assert_eq!(
        published[0].public_url,
        "https://cdn.test/assets/7/1/original.jpg"
    );
    assert!(h.refunds().is_empty());
}

#[tokio::test]
async fn image_url_artifact_is_downloaded_into_storage() {
    let h = Harness::new(
        FakeProvider::images(ImageBehavior::Url(
            "https://img.provider.example/tmp/42.jpg".to_string(),
        )),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Image, GenerationStatus::Pending, 1);

    h.orchestrator.process(1).await.unwrap();

    assert_eq!(h.jobs.get(1).status().unwrap(), GenerationStatus::Completed);
    let downloads = h.store.downloads.lock().unwrap().clone();
    assert_eq!(downloads, vec!["https://img.provider.example/tmp/42.jpg"]);
}

#[tokio::test]
async fn provider_rejection_fails_job_and_refunds_once() {
    let h = Harness::new(
        FakeProvider::images(ImageBehavior::Reject("content policy violation".to_string())),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Image, GenerationStatus::Pending, 5);

    h.orchestrator.process(1).await.unwrap();

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Failed);
    assert!(job.asset_id.is_none());
    let diagnostic = job.error_message.unwrap();
    assert!(diagnostic.contains("content policy violation"), "{diagnostic}");

    assert_eq!(h.refunds(), vec![(1, USER_ID, 5)]);
}

#[tokio::test]
async fn storage_failure_fails_job_without_refund() {
    let h = Harness::new(
        FakeProvider::images(ImageBehavior::Bytes(vec![1, 2, 3])),
        FakeStore::failing(),
    );
    h.seed(1, GenerationKind::Image, GenerationStatus::Pending, 2);

    h.orchestrator.process(1).await.unwrap();

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Failed);
    assert!(job.error_message.unwrap().starts_with("Storage error:"));

    // The provider delivered; the user keeps what they paid for the work.
    assert!(h.refunds().is_empty());
    assert_eq!(h.ledger.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_failure_delivery_refunds_exactly_once() {
    let h = Harness::new(
        FakeProvider::images(ImageBehavior::Reject("upstream 500".to_string())),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Image, GenerationStatus::Pending, 1);

    h.orchestrator.process(1).await.unwrap();
    // Re-delivery of the same job: terminal, so a no-op.
    h.orchestrator.process(1).await.unwrap();

    assert_eq!(h.jobs.get(1).status().unwrap(), GenerationStatus::Failed);
    assert_eq!(h.refunds().len(), 1);
    assert_eq!(h.ledger.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn processing_an_unknown_job_is_an_error() {
    let h = Harness::new(
        FakeProvider::images(ImageBehavior::Bytes(vec![1])),
        FakeStore::new(),
    );

    let err = h.orchestrator.process(42).await.unwrap_err();
    assert_matches!(err, OrchestrateError::JobNotFound { id: 42 });
}

#[tokio::test]
async fn terminal_job_is_left_untouched() {
    let h = Harness::new(
        FakeProvider::images(ImageBehavior::Bytes(vec![1])),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Image, GenerationStatus::Completed, 1);

    h.orchestrator.process(1).await.unwrap();

    assert_eq!(h.jobs.get(1).status().unwrap(), GenerationStatus::Completed);
    assert!(h.published().is_empty());
    assert!(h.store.uploads.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Video flows
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn video_happy_path_polls_to_completion() {
    let h = Harness::new(
        FakeProvider::videos(
            "abc123",
            vec![
                ProviderPhase::Pending,
                ProviderPhase::Processing,
                ProviderPhase::Completed,
            ],
            vec!["https://video.provider.example/out/abc123.mp4".to_string()],
        ),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Video, GenerationStatus::Pending, 100);

    h.orchestrator.process(1).await.unwrap();

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Completed);
    assert_eq!(job.request_id.as_deref(), Some("abc123"));
    assert!(job.asset_id.is_some());

    // The asset points at our storage, never at the provider's URL.
    let published = h.published();
    assert_eq!(published[0].storage_key, "assets/7/1/original.mp4");
    assert_eq!(
        published[0].public_url,
        "https://cdn.test/assets/7/1/original.mp4"
    );
    let downloads = h.store.downloads.lock().unwrap().clone();
    assert_eq!(
        downloads,
        vec!["https://video.provider.example/out/abc123.mp4"]
    );
}

#[tokio::test(start_paused = true)]
async fn video_poll_budget_exhaustion_fails_and_refunds() {
    // Empty script: the provider reports Processing forever.
    let h = Harness::new(
        FakeProvider::videos("abc123", vec![], vec![]),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Video, GenerationStatus::Pending, 200);

    h.orchestrator.process(1).await.unwrap();

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Failed);
    let diagnostic = job.error_message.unwrap();
    assert!(diagnostic.contains("poll budget"), "{diagnostic}");

    assert_eq!(h.refunds(), vec![(1, USER_ID, 200)]);
}

#[tokio::test(start_paused = true)]
async fn video_resume_skips_submit_when_request_id_is_persisted() {
    let h = Harness::new(
        FakeProvider::videos(
            "should-not-be-issued",
            vec![ProviderPhase::Completed],
            vec!["https://video.provider.example/out/earlier.mp4".to_string()],
        ),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Video, GenerationStatus::Processing, 100);
    h.jobs.set_request_id(1, "earlier-submit").await.unwrap();

    h.orchestrator.process(1).await.unwrap();

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Completed);
    assert_eq!(job.request_id.as_deref(), Some("earlier-submit"));
    assert_eq!(
        h.provider.submit_calls.load(Ordering::SeqCst),
        0,
        "resume must not re-submit"
    );
}

// ---------------------------------------------------------------------------
// Recovery sweep
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sweep_fails_and_refunds_stale_image_jobs() {
    let h = Harness::new(
        FakeProvider::images(ImageBehavior::Bytes(vec![1])),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Image, GenerationStatus::Processing, 2);
    // Backdate the attempt past the staleness threshold.
    h.jobs.rows.lock().unwrap().get_mut(&1).unwrap().started_at =
        Some(Utc::now() - chrono::Duration::hours(2));

    let sweeper = RecoverySweeper::new(
        h.jobs.clone(),
        h.orchestrator.clone(),
        OrchestratorConfig {
            stale_after: Duration::from_secs(60),
            ..OrchestratorConfig::default()
        },
    );
    sweeper.sweep_once().await.unwrap();

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Failed);
    assert!(job.error_message.unwrap().contains("crashed"));
    assert_eq!(h.refunds(), vec![(1, USER_ID, 2)]);
}

#[tokio::test(start_paused = true)]
async fn sweep_resumes_stale_video_jobs_with_a_request_id() {
    let h = Harness::new(
        FakeProvider::videos(
            "unused",
            vec![ProviderPhase::Completed],
            vec!["https://video.provider.example/out/v.mp4".to_string()],
        ),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Video, GenerationStatus::Processing, 100);
    {
        let mut rows = h.jobs.rows.lock().unwrap();
        let row = rows.get_mut(&1).unwrap();
        row.started_at = Some(Utc::now() - chrono::Duration::hours(2));
        row.request_id = Some("abc123".to_string());
    }

    let sweeper = RecoverySweeper::new(
        h.jobs.clone(),
        h.orchestrator.clone(),
        OrchestratorConfig {
            stale_after: Duration::from_secs(60),
            ..OrchestratorConfig::default()
        },
    );
    sweeper.sweep_once().await.unwrap();

    // The resume runs on a spawned task; let it finish.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Completed);
    assert_eq!(job.request_id.as_deref(), Some("abc123"));
    assert!(h.refunds().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sweep_claims_a_resumed_job_so_later_passes_skip_it() {
    // Two Completed snapshots: if a second worker were ever spawned for
    // the same job, both would reach publication.
    let h = Harness::new(
        FakeProvider::videos(
            "unused",
            vec![ProviderPhase::Completed, ProviderPhase::Completed],
            vec!["https://video.provider.example/out/v.mp4".to_string()],
        ),
        FakeStore::new(),
    );
    h.seed(1, GenerationKind::Video, GenerationStatus::Processing, 100);
    {
        let mut rows = h.jobs.rows.lock().unwrap();
        let row = rows.get_mut(&1).unwrap();
        row.started_at = Some(Utc::now() - chrono::Duration::hours(2));
        row.request_id = Some("abc123".to_string());
    }

    let sweeper = RecoverySweeper::new(
        h.jobs.clone(),
        h.orchestrator.clone(),
        OrchestratorConfig {
            stale_after: Duration::from_secs(60),
            ..OrchestratorConfig::default()
        },
    );
    // A resumed attempt can outlive a sweep interval: the second pass
    // runs while the first resume is still in flight.
    sweeper.sweep_once().await.unwrap();
    sweeper.sweep_once().await.unwrap();

    // Let the spawned resume finish.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let job = h.jobs.get(1);
    assert_eq!(job.status().unwrap(), GenerationStatus::Completed);
    assert_eq!(h.published().len(), 1, "exactly one worker per job");
    assert!(h.refunds().is_empty());
}
