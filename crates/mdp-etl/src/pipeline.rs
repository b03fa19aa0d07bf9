//! Pipeline orchestration
//!
//! Wires extractor, transformer, and loader into one run per stream, decides
//! what "changed" means through the checkpoint state, and exposes the trigger
//! surface for on-demand runs.
//!
//! A run: read watermark -> scan changed ids -> fetch + transform each ->
//! flush fixed-size batches -> advance the in-memory watermark candidate
//! after every clean flush -> persist the watermark once on completion.
//! The checkpoint advances at batch granularity: a batch with any rejection
//! freezes the candidate, so the failed records (and their succeeded
//! siblings) are reprocessed on the next run. Fatal failures abort without
//! touching persisted state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EtlConfig;
use crate::error::{EtlError, LoadError, Result};
use crate::extract::MovieExtractor;
use crate::load::{BulkLoader, LoaderConfig};
use crate::state::{JsonFileStorage, State};
use crate::transform::{Movie, Transformer};

/// Shared checkpoint state; the one mutable resource streams share.
pub type SharedState = Arc<Mutex<State>>;

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Outcome of one completed run over one stream.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stream: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Records the index accepted.
    pub records_loaded: usize,
    /// Records skipped over local transform failures.
    pub records_skipped: usize,
    /// Per-record rejections reported by the index.
    pub errors: Vec<LoadError>,
}

/// Aggregated outcome of a run across every configured stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub streams_processed: usize,
    pub records_loaded: usize,
    pub errors: Vec<LoadError>,
    /// First fatal failure encountered, if any.
    pub fatal: Option<String>,
}

/// What happened to a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A run was scheduled (immediately or queued behind the active run).
    Scheduled,
    /// A follow-up run was already pending; this trigger was dropped.
    Coalesced,
}

/// One ETL pipeline bound to a named stream.
pub struct Etl {
    stream: String,
    batch_size: usize,
    scan_page_size: usize,
    extractor: MovieExtractor,
    transformer: Transformer,
    loader: BulkLoader,
    state: SharedState,
}

impl Etl {
    pub fn new(
        stream: impl Into<String>,
        extractor: MovieExtractor,
        transformer: Transformer,
        loader: BulkLoader,
        state: SharedState,
        batch_size: usize,
        scan_page_size: usize,
    ) -> Self {
        Self {
            stream: stream.into(),
            batch_size,
            scan_page_size,
            extractor,
            transformer,
            loader,
            state,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Execute one run over this stream.
    ///
    /// Transform failures skip the record; per-record index rejections land
    /// in the report. Only source/target/state failures return `Err`, and
    /// none of those paths mutate the persisted watermark.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(stream = %self.stream, %run_id, "run started");

        self.loader.ensure_index().await?;

        let since = self.load_watermark().await?;
        debug!(stream = %self.stream, watermark = ?since, "resuming from watermark");

        let mut pages = self.extractor.changed_ids(since, self.scan_page_size);
        let mut flusher = BatchFlusher::new(&self.loader, self.batch_size);
        let mut records_skipped = 0usize;

        loop {
            let ids = pages.next_page().await?;
            if ids.is_empty() {
                break;
            }

            for id in ids {
                let Some(raw) = self.extractor.fetch_raw(&id).await? else {
                    // Row vanished between the scan and the fetch; the next
                    // clean batch carries the watermark past it.
                    flusher.mark_seen(id);
                    continue;
                };

                match self.transformer.transform(&raw).await {
                    Ok(movie) => flusher.push(id, movie),
                    Err(EtlError::Transform { id: record_id, reason }) => {
                        warn!(stream = %self.stream, record = %record_id, %reason, "skipping record");
                        records_skipped += 1;
                        flusher.mark_seen(id);
                    },
                    Err(err) => return Err(err),
                }

                if flusher.is_full() {
                    flusher.flush().await?;
                }
            }
        }

        flusher.flush().await?;
        let (records_loaded, errors, candidate) = flusher.finish();

        // Persist exactly once, and only if the run moved the watermark.
        if let Some(watermark) = candidate {
            let mut state = self.state.lock().await;
            state
                .set_watermark(&self.stream, Value::String(watermark))
                .await?;
        }

        let report = RunReport {
            run_id,
            stream: self.stream.clone(),
            started_at,
            finished_at: Utc::now(),
            records_loaded,
            records_skipped,
            errors,
        };

        info!(
            stream = %self.stream,
            %run_id,
            loaded = report.records_loaded,
            skipped = report.records_skipped,
            rejected = report.errors.len(),
            "run completed"
        );

        Ok(report)
    }

    async fn load_watermark(&self) -> Result<Option<String>> {
        let state = self.state.lock().await;
        match state.watermark(&self.stream) {
            None => Ok(None),
            Some(Value::String(id)) => Ok(Some(id.clone())),
            Some(other) => Err(EtlError::StateCorruption(format!(
                "watermark for stream {} is not an id string: {other}",
                self.stream
            ))),
        }
    }
}

impl std::fmt::Debug for Etl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Etl")
            .field("stream", &self.stream)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Accumulates documents into batches and tracks the watermark candidate.
///
/// The candidate only advances when a flush reports zero rejections and no
/// earlier flush failed; after the first rejected batch it is frozen so the
/// persisted checkpoint never moves past unloaded records.
struct BatchFlusher<'a> {
    loader: &'a BulkLoader,
    batch_size: usize,
    batch: Vec<Movie>,
    /// Last id seen since the previous flush (loaded, skipped, or vanished).
    last_seen: Option<String>,
    candidate: Option<String>,
    frozen: bool,
    records_loaded: usize,
    errors: Vec<LoadError>,
}

impl<'a> BatchFlusher<'a> {
    fn new(loader: &'a BulkLoader, batch_size: usize) -> Self {
        Self {
            loader,
            batch_size,
            batch: Vec::with_capacity(batch_size),
            last_seen: None,
            candidate: None,
            frozen: false,
            records_loaded: 0,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, id: String, movie: Movie) {
        self.batch.push(movie);
        self.last_seen = Some(id);
    }

    /// Record an id that produced no document but is part of this run.
    fn mark_seen(&mut self, id: String) {
        self.last_seen = Some(id);
    }

    fn is_full(&self) -> bool {
        self.batch.len() >= self.batch_size
    }

    async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            // Nothing to load, but skipped ids still move the candidate.
            if !self.frozen {
                if let Some(id) = self.last_seen.take() {
                    self.candidate = Some(id);
                }
            }
            return Ok(());
        }

        let batch_len = self.batch.len();
        let rejected = self.loader.load(&self.batch).await?;
        self.records_loaded += batch_len - rejected.len();

        if rejected.is_empty() {
            if !self.frozen {
                self.candidate = self.last_seen.take();
            }
        } else {
            self.frozen = true;
            self.errors.extend(rejected);
        }

        self.batch.clear();
        self.last_seen = None;
        Ok(())
    }

    fn finish(self) -> (usize, Vec<LoadError>, Option<String>) {
        (self.records_loaded, self.errors, self.candidate)
    }
}

/// Per-stream slot: one serialized pipeline plus its trigger bookkeeping.
struct StreamSlot {
    etl: Mutex<Etl>,
    queued: AtomicBool,
    status: std::sync::Mutex<RunStatus>,
}

impl StreamSlot {
    fn new(etl: Etl) -> Self {
        Self {
            etl: Mutex::new(etl),
            queued: AtomicBool::new(false),
            status: std::sync::Mutex::new(RunStatus::Idle),
        }
    }

    fn set_status(&self, status: RunStatus) {
        let mut current = self.status.lock().unwrap_or_else(|e| e.into_inner());
        *current = status;
    }

    fn status(&self) -> RunStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run(&self) -> Result<RunReport> {
        let etl = self.etl.lock().await;
        self.set_status(RunStatus::Running);
        let result = etl.run().await;
        self.set_status(match result {
            Ok(_) => RunStatus::Completed,
            Err(_) => RunStatus::Failed,
        });
        result
    }
}

/// Serializes and triggers runs across the configured streams.
///
/// Never runs two pipelines over the same stream concurrently; a trigger
/// arriving during an active run queues at most one follow-up, and further
/// triggers drop with a log until that follow-up starts.
#[derive(Clone)]
pub struct EtlRunner {
    slots: Arc<BTreeMap<String, Arc<StreamSlot>>>,
}

impl EtlRunner {
    /// Build a runner from pre-constructed pipelines, keyed by stream name.
    pub fn new(etls: Vec<Etl>) -> Self {
        let slots = etls
            .into_iter()
            .map(|etl| (etl.stream().to_string(), Arc::new(StreamSlot::new(etl))))
            .collect();
        Self {
            slots: Arc::new(slots),
        }
    }

    /// Build a fully wired runner from configuration.
    ///
    /// Owns collaborator lifecycles: one source pool and one HTTP client are
    /// created here and handed to each stream's extractor and loader. A
    /// corrupted checkpoint is fatal at startup.
    pub async fn from_config(config: &EtlConfig) -> Result<Self> {
        config.validate()?;

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(config.source_timeout())
            .connect(&config.database_url)
            .await
            .map_err(|err| EtlError::SourceUnavailable(err.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| {
                EtlError::InvalidConfiguration(format!("http client setup failed: {err}"))
            })?;

        let storage = JsonFileStorage::new(config.state_path.clone());
        let state: SharedState = Arc::new(Mutex::new(State::new(Box::new(storage)).await?));

        let loader_config = LoaderConfig {
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        };

        let mut etls = Vec::with_capacity(config.streams.len());
        for stream in &config.streams {
            let extractor = MovieExtractor::new(pool.clone(), config.source_timeout());
            let transformer = Transformer::new(Arc::new(extractor.clone()));
            let loader = BulkLoader::new(
                client.clone(),
                &config.index_url,
                &config.index_name,
                loader_config.clone(),
            )?;
            etls.push(Etl::new(
                stream.clone(),
                extractor,
                transformer,
                loader,
                state.clone(),
                config.batch_size,
                config.scan_page_size,
            ));
        }

        Ok(Self::new(etls))
    }

    /// Stream names this runner serves, in stable order.
    pub fn streams(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    /// Last observed run status for a stream.
    pub fn status(&self, stream: &str) -> Result<RunStatus> {
        self.slot(stream).map(|slot| slot.status())
    }

    /// Request an immediate run for a stream.
    ///
    /// Returns [`TriggerOutcome::Coalesced`] when a follow-up run is already
    /// pending; unknown streams are a defined error, never silently ignored.
    pub fn trigger(&self, stream: &str) -> Result<TriggerOutcome> {
        let slot = self.slot(stream)?;

        if slot.queued.swap(true, Ordering::SeqCst) {
            debug!(stream, "trigger coalesced into pending run");
            return Ok(TriggerOutcome::Coalesced);
        }

        let name = stream.to_string();
        tokio::spawn(async move {
            // Hold the stream lock before consuming the pending flag, so a
            // trigger landing mid-run stays pending until this worker can
            // actually start it.
            loop {
                let etl = slot.etl.lock().await;
                if !slot.queued.swap(false, Ordering::SeqCst) {
                    break;
                }

                slot.set_status(RunStatus::Running);
                let result = etl.run().await;
                match &result {
                    Ok(report) => {
                        slot.set_status(RunStatus::Completed);
                        info!(
                            stream = %name,
                            loaded = report.records_loaded,
                            rejected = report.errors.len(),
                            "triggered run finished"
                        );
                    },
                    Err(err) => {
                        slot.set_status(RunStatus::Failed);
                        error!(stream = %name, error = %err, "triggered run failed");
                    },
                }
                drop(etl);
            }
        });

        Ok(TriggerOutcome::Scheduled)
    }

    /// Run one stream to completion, waiting for any active run first.
    pub async fn run_now(&self, stream: &str) -> Result<RunReport> {
        let slot = self.slot(stream)?;
        slot.run().await
    }

    /// Run every configured stream once, sequentially.
    ///
    /// Streams are independent: a fatal failure in one is recorded and the
    /// remaining streams still run.
    pub async fn run_all(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        for (name, slot) in self.slots.iter() {
            match slot.run().await {
                Ok(report) => {
                    summary.streams_processed += 1;
                    summary.records_loaded += report.records_loaded;
                    summary.errors.extend(report.errors);
                },
                Err(err) => {
                    error!(stream = %name, error = %err, "stream run failed");
                    if summary.fatal.is_none() {
                        summary.fatal = Some(format!("{name}: {err}"));
                    }
                },
            }
        }

        summary
    }

    fn slot(&self, stream: &str) -> Result<Arc<StreamSlot>> {
        self.slots
            .get(stream)
            .cloned()
            .ok_or_else(|| EtlError::UnknownStream(stream.to_string()))
    }
}

impl std::fmt::Debug for EtlRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtlRunner")
            .field("streams", &self.streams())
            .finish()
    }
}
