//! Batch execution core — drives the full worklist → rows → synthesis loop.
//!
//! [`BatchRunner`] executes one ordered worklist of [`Job`]s on a dedicated
//! tokio task, reporting progress and failures over a `tokio::sync::mpsc`
//! channel and observing a [`CancelToken`] at two checkpoints (between jobs
//! and between rows).  [`BatchProcessor`] is the caller-facing controller
//! that owns at most one live run and the independent preview path.
//!
//! # Run flow
//!
//! ```text
//! BatchProcessor::start_batch(jobs)
//!   └─▶ cancel + join any previous run
//!   └─▶ tokio::spawn(worker)
//!         ├─ SynthesizerFactory::create()     ── error ▶ Failed, no results
//!         └─ per job (ordered):
//!              ├─ cancel checkpoint           ── set ▶ Cancelled + partial results
//!              ├─ extract_rows()              ── error ▶ non-fatal, next job
//!              └─ per row (ordered):
//!                   ├─ cancel checkpoint      ── set ▶ Cancelled + partial results
//!                   ├─ build + synthesize     ── error ▶ non-fatal, next row
//!                   └─ fixed inter-row delay
//!         └─ Completed + full results
//! ```
//!
//! Progress values are monotonically non-decreasing in `[0, job_count]`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::AppPaths;
use crate::source::{extract_rows, SourceError};
use crate::speech::{SpeechRequest, SpeechSynthesizer, SynthesisError, SynthesizerFactory};

use super::job::{Job, ResultRecord};
use super::state::{new_shared_phase, CancelToken, RunPhase, SharedPhase};

/// Fixed pause after every row, successful or not, to stay under the remote
/// rate limit.  Tunable via [`BatchRunner::with_row_delay`], never adaptive.
pub const ROW_DELAY: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// BatchEvent
// ---------------------------------------------------------------------------

/// Notifications crossing from a worker to its caller, delivered in emission
/// order within one run.
#[derive(Debug)]
pub enum BatchEvent {
    /// Incremental progress: `completed` grows monotonically from `0.0` to
    /// `total as f64` (whole jobs plus fractional rows within the current
    /// job).
    Progress {
        completed: f64,
        total: usize,
        message: String,
    },

    /// Terminal: every job was processed; the full ordered result sequence.
    Completed { results: Vec<ResultRecord> },

    /// Terminal: cancellation was observed; everything accumulated up to the
    /// checkpoint.  Not an error.
    Cancelled { results: Vec<ResultRecord> },

    /// A non-fatal (job- or row-scoped) or fatal (run-init) failure.  Fatal
    /// failures are recognizable by the absence of a later terminal event.
    Error { title: String, message: String },

    /// A preview file is ready to play.
    PreviewReady { path: PathBuf },
}

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

/// Executes one ordered worklist of jobs sequentially.
///
/// Create with [`BatchRunner::new`], then call [`run`](Self::run) inside a
/// tokio task.  Most callers go through [`BatchProcessor`] instead.
pub struct BatchRunner {
    jobs: Vec<Job>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    events: mpsc::Sender<BatchEvent>,
    token: CancelToken,
    phase: SharedPhase,
    row_delay: Duration,
}

impl BatchRunner {
    pub fn new(
        jobs: Vec<Job>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        events: mpsc::Sender<BatchEvent>,
        token: CancelToken,
    ) -> Self {
        Self {
            jobs,
            synthesizer,
            events,
            token,
            phase: new_shared_phase(),
            row_delay: ROW_DELAY,
        }
    }

    /// Replace the inter-row delay (tests use [`Duration::ZERO`]).
    pub fn with_row_delay(mut self, row_delay: Duration) -> Self {
        self.row_delay = row_delay;
        self
    }

    /// Publish the run phase through an externally owned handle.
    pub fn with_phase(mut self, phase: SharedPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Handle through which the current phase can be observed.
    pub fn phase_handle(&self) -> SharedPhase {
        Arc::clone(&self.phase)
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Process every job in order and return the terminal phase.
    ///
    /// Never panics on send failure: a dropped receiver only silences
    /// notifications, the audio files still land on disk.
    pub async fn run(self) -> RunPhase {
        self.set_phase(RunPhase::Running);

        let total = self.jobs.len();
        let mut results: Vec<ResultRecord> = Vec::new();

        for (job_index, job) in self.jobs.iter().enumerate() {
            // Checkpoint 1: between jobs.
            if self.token.is_cancelled() {
                return self.finish_cancelled(results).await;
            }

            let file_name = job.file_name();
            self.progress(
                job_index as f64,
                total,
                format!("Processing {file_name} ({}/{total})", job_index + 1),
            )
            .await;

            let rows = match extract_rows(&job.source_path, job.column_index) {
                Ok(rows) => rows,
                Err(e) => {
                    log::warn!("skipping unreadable source {}: {e}", job.source_path.display());
                    self.job_error(&job.source_path, &e).await;
                    continue;
                }
            };

            let row_count = rows.len();
            for (row_index, text) in rows.into_iter().enumerate() {
                // Checkpoint 2: between rows.
                if self.token.is_cancelled() {
                    return self.finish_cancelled(results).await;
                }

                let seq = row_index + 1;
                let dest = job.output_path(seq);
                let request = SpeechRequest::build(
                    &text,
                    &job.voice,
                    &job.model,
                    job.format,
                    job.instructions.as_deref(),
                );

                match self.synthesizer.synthesize(&request, &dest).await {
                    Ok(()) => {
                        results.push(ResultRecord {
                            input_path: job.source_path.clone(),
                            output_path: dest,
                            text,
                            voice: job.voice.clone(),
                            model: job.model.clone(),
                        });
                        let completed = job_index as f64 + seq as f64 / row_count as f64;
                        self.progress(
                            completed,
                            total,
                            format!("Processing {file_name}: {seq}/{row_count}"),
                        )
                        .await;
                    }
                    Err(e) => {
                        log::warn!("row {seq} of {file_name} failed: {e}");
                        self.row_error(job, seq, &file_name, &e).await;
                    }
                }

                tokio::time::sleep(self.row_delay).await;
            }
        }

        self.progress(total as f64, total, "Processing complete".into()).await;
        self.set_phase(RunPhase::Completed);
        self.send(BatchEvent::Completed { results }).await;
        RunPhase::Completed
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn finish_cancelled(&self, results: Vec<ResultRecord>) -> RunPhase {
        log::info!("batch run cancelled with {} result(s) accumulated", results.len());
        self.set_phase(RunPhase::Cancelled);
        self.send(BatchEvent::Cancelled { results }).await;
        RunPhase::Cancelled
    }

    async fn progress(&self, completed: f64, total: usize, message: String) {
        self.send(BatchEvent::Progress {
            completed,
            total,
            message,
        })
        .await;
    }

    async fn job_error(&self, source_path: &std::path::Path, error: &SourceError) {
        self.send(BatchEvent::Error {
            title: "Processing Error".into(),
            message: format!("Error processing {}: {error}", source_path.display()),
        })
        .await;
    }

    async fn row_error(&self, job: &Job, seq: usize, file_name: &str, error: &SynthesisError) {
        let (title, message) = if error.is_instructions_rejection() {
            (
                "API Error",
                format!(
                    "The model '{}' rejected the style instructions: {error}",
                    job.model
                ),
            )
        } else {
            (
                "Synthesis Error",
                format!("Row {seq} of {file_name} failed: {error}"),
            )
        };
        self.send(BatchEvent::Error {
            title: title.into(),
            message,
        })
        .await;
    }

    async fn send(&self, event: BatchEvent) {
        let _ = self.events.send(event).await;
    }

    fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock().unwrap() = phase;
    }
}

// ---------------------------------------------------------------------------
// PreviewRequest
// ---------------------------------------------------------------------------

/// One caller-supplied text to synthesize outside any batch — the degenerate
/// single-row case with no cancellation checkpoint and no inter-row delay.
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub text: String,
    pub voice: String,
    pub model: String,
    pub instructions: Option<String>,
    pub format: crate::speech::OutputFormat,
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Handle to one in-flight batch run.
pub struct RunHandle {
    token: CancelToken,
    phase: SharedPhase,
    join: JoinHandle<RunPhase>,
}

impl RunHandle {
    /// Current phase of the run.
    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap()
    }

    /// Clone of the run's cancellation token (e.g. for a signal handler).
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Request cancellation and wait until the worker has observably
    /// stopped, returning the terminal phase.
    pub async fn cancel(self) -> RunPhase {
        self.token.cancel();
        self.join.await.unwrap_or(RunPhase::Failed)
    }

    /// Wait for the run to finish on its own.
    pub async fn wait(self) -> RunPhase {
        self.join.await.unwrap_or(RunPhase::Failed)
    }
}

// ---------------------------------------------------------------------------
// BatchProcessor
// ---------------------------------------------------------------------------

/// Caller-facing controller over batch and preview runs.
///
/// At most one batch run is live at a time: [`start_batch`](Self::start_batch)
/// first cancels and joins any predecessor, so two workers never race on the
/// same output directory.  Preview runs are independent tasks.
///
/// The caller must keep draining the event channel while runs are live;
/// events are delivered in emission order within one run.
pub struct BatchProcessor {
    factory: Arc<dyn SynthesizerFactory>,
    events: mpsc::Sender<BatchEvent>,
    temp_dir: PathBuf,
    row_delay: Duration,
    current: Option<RunHandle>,
}

impl BatchProcessor {
    pub fn new(factory: Arc<dyn SynthesizerFactory>, events: mpsc::Sender<BatchEvent>) -> Self {
        Self {
            factory,
            events,
            temp_dir: AppPaths::new().temp_dir,
            row_delay: ROW_DELAY,
            current: None,
        }
    }

    /// Replace the preview destination directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Replace the inter-row delay (tests use [`Duration::ZERO`]).
    pub fn with_row_delay(mut self, row_delay: Duration) -> Self {
        self.row_delay = row_delay;
        self
    }

    /// Start a new batch run, superseding any live one.
    ///
    /// Returns the new run's cancellation token.
    pub async fn start_batch(&mut self, jobs: Vec<Job>) -> CancelToken {
        // Never two workers mutating the same output state.
        self.cancel().await;

        let token = CancelToken::new();
        let phase = new_shared_phase();

        let factory = Arc::clone(&self.factory);
        let events = self.events.clone();
        let worker_token = token.clone();
        let worker_phase = Arc::clone(&phase);
        let row_delay = self.row_delay;

        let join = tokio::spawn(async move {
            let synthesizer = match factory.create() {
                Ok(synthesizer) => synthesizer,
                Err(e) => {
                    log::error!("batch run failed to initialize: {e}");
                    *worker_phase.lock().unwrap() = RunPhase::Failed;
                    let _ = events
                        .send(BatchEvent::Error {
                            title: "Synthesis Unavailable".into(),
                            message: e.to_string(),
                        })
                        .await;
                    return RunPhase::Failed;
                }
            };

            BatchRunner::new(jobs, synthesizer, events, worker_token)
                .with_phase(worker_phase)
                .with_row_delay(row_delay)
                .run()
                .await
        });

        self.current = Some(RunHandle {
            token: token.clone(),
            phase,
            join,
        });
        token
    }

    /// Cancel the live run, if any, blocking until its worker has stopped.
    pub async fn cancel(&mut self) -> Option<RunPhase> {
        match self.current.take() {
            Some(handle) => Some(handle.cancel().await),
            None => None,
        }
    }

    /// Wait for the live run, if any, to finish on its own.
    pub async fn wait(&mut self) -> Option<RunPhase> {
        match self.current.take() {
            Some(handle) => Some(handle.wait().await),
            None => None,
        }
    }

    /// Cancellation token of the live run, if any.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.current.as_ref().map(|handle| handle.cancel_token())
    }

    /// Current phase of the live run, if any.
    pub fn phase(&self) -> Option<RunPhase> {
        self.current.as_ref().map(|handle| handle.phase())
    }

    /// Synthesize one caller-supplied text into the temp directory,
    /// independent of any batch run.
    ///
    /// Emits [`BatchEvent::PreviewReady`] or a non-fatal
    /// [`BatchEvent::Error`].
    pub fn generate_preview(&self, preview: PreviewRequest) -> JoinHandle<()> {
        let factory = Arc::clone(&self.factory);
        let events = self.events.clone();
        let temp_dir = self.temp_dir.clone();

        tokio::spawn(async move {
            match run_preview(factory.as_ref(), &preview, &temp_dir).await {
                Ok(path) => {
                    let _ = events.send(BatchEvent::PreviewReady { path }).await;
                }
                Err(e) => {
                    log::warn!("preview failed: {e}");
                    let _ = events
                        .send(BatchEvent::Error {
                            title: "Preview Error".into(),
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        })
    }
}

/// Shared single-row execution path: build the request (capability gate
/// included) and run it through the same client the batch loop uses.
async fn run_preview(
    factory: &dyn SynthesizerFactory,
    preview: &PreviewRequest,
    temp_dir: &std::path::Path,
) -> Result<PathBuf, SynthesisError> {
    let synthesizer = factory.create()?;

    std::fs::create_dir_all(temp_dir).map_err(|source| SynthesisError::Io {
        path: temp_dir.to_path_buf(),
        source,
    })?;

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let dest = temp_dir.join(format!("preview_{stamp}.{}", preview.format.extension()));

    let request = SpeechRequest::build(
        &preview.text,
        &preview.voice,
        &preview.model,
        preview.format,
        preview.instructions.as_deref(),
    );
    synthesizer.synthesize(&request, &dest).await?;

    Ok(dest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{MockSynthesizer, OutputFormat};
    use std::io::Write;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    // -----------------------------------------------------------------------
    // Test doubles & helpers
    // -----------------------------------------------------------------------

    /// Factory handing out one pre-built synthesizer.
    struct FixedFactory(Arc<MockSynthesizer>);

    impl SynthesizerFactory for FixedFactory {
        fn create(&self) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError> {
            Ok(Arc::clone(&self.0) as Arc<dyn SpeechSynthesizer>)
        }
    }

    /// Factory that always fails like a missing API key.
    struct FailingFactory;

    impl SynthesizerFactory for FailingFactory {
        fn create(&self) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError> {
            Err(SynthesisError::Credentials)
        }
    }

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).expect("create csv");
        file.write_all(content.as_bytes()).expect("write csv");
        path
    }

    fn make_job(source: PathBuf, out: &TempDir) -> Job {
        Job {
            source_path: source,
            column_index: 0,
            voice: "nova".into(),
            model: "tts-1-hd".into(),
            instructions: None,
            output_dir: out.path().to_path_buf(),
            format: OutputFormat::Mp3,
        }
    }

    fn make_runner(
        jobs: Vec<Job>,
        mock: Arc<MockSynthesizer>,
        token: CancelToken,
    ) -> (BatchRunner, mpsc::Receiver<BatchEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let runner = BatchRunner::new(jobs, mock, tx, token).with_row_delay(Duration::ZERO);
        (runner, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<BatchEvent>) -> Vec<BatchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn completed_results(events: &[BatchEvent]) -> Option<&[ResultRecord]> {
        events.iter().find_map(|event| match event {
            BatchEvent::Completed { results } => Some(results.as_slice()),
            _ => None,
        })
    }

    fn cancelled_results(events: &[BatchEvent]) -> Option<&[ResultRecord]> {
        events.iter().find_map(|event| match event {
            BatchEvent::Cancelled { results } => Some(results.as_slice()),
            _ => None,
        })
    }

    fn error_titles(events: &[BatchEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|event| match event {
                BatchEvent::Error { title, .. } => Some(title.as_str()),
                _ => None,
            })
            .collect()
    }

    fn rejection(message: &str) -> SynthesisError {
        SynthesisError::Api {
            status: 400,
            message: message.into(),
        }
    }

    // -----------------------------------------------------------------------
    // BatchRunner
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn completed_run_collects_results_in_order() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let first = write_csv(src.path(), "first.csv", "text\nhello\n\nworld\n");
        let second = write_csv(src.path(), "second.csv", "text\nagain\n");

        let mock = Arc::new(MockSynthesizer::ok());
        let jobs = vec![make_job(first.clone(), &out), make_job(second.clone(), &out)];
        let (runner, mut rx) = make_runner(jobs, Arc::clone(&mock), CancelToken::new());
        let phase_handle = runner.phase_handle();

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Completed);
        assert_eq!(*phase_handle.lock().unwrap(), RunPhase::Completed);

        let events = drain(&mut rx);
        let results = completed_results(&events).expect("completed event");
        assert_eq!(results.len(), 3);

        // Source order, 1-based sequence numbers, derived file names.
        assert_eq!(results[0].text, "hello");
        assert_eq!(results[0].input_path, first);
        assert_eq!(results[0].output_path, out.path().join("first_1.mp3"));
        assert_eq!(results[1].output_path, out.path().join("first_2.mp3"));
        assert_eq!(results[2].text, "again");
        assert_eq!(results[2].output_path, out.path().join("second_1.mp3"));

        // One request per extracted row, carrying the job's parameters.
        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0.input, "hello");
        assert_eq!(calls[0].0.voice, "nova");
        assert_eq!(calls[0].0.model, "tts-1-hd");
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_job_count() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let first = write_csv(src.path(), "a.csv", "text\none\ntwo\nthree\n");
        let second = write_csv(src.path(), "b.csv", "text\nfour\n");

        let jobs = vec![make_job(first, &out), make_job(second, &out)];
        let (runner, mut rx) = make_runner(jobs, Arc::new(MockSynthesizer::ok()), CancelToken::new());

        runner.run().await;

        let events = drain(&mut rx);
        let mut last = 0.0;
        for event in &events {
            if let BatchEvent::Progress {
                completed, total, ..
            } = event
            {
                assert_eq!(*total, 2);
                assert!(
                    *completed >= last,
                    "progress went backwards: {completed} < {last}"
                );
                assert!(*completed <= 2.0);
                last = *completed;
            }
        }
        assert_eq!(last, 2.0);
    }

    #[tokio::test]
    async fn unreadable_source_skips_job_and_continues() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let missing = src.path().join("absent.csv");
        let good = write_csv(src.path(), "good.csv", "text\nhello\n");

        let mock = Arc::new(MockSynthesizer::ok());
        let jobs = vec![make_job(missing, &out), make_job(good, &out)];
        let (runner, mut rx) = make_runner(jobs, Arc::clone(&mock), CancelToken::new());

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Completed);

        let events = drain(&mut rx);
        assert_eq!(error_titles(&events), vec!["Processing Error"]);
        let results = completed_results(&events).expect("completed event");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "hello");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_row_is_skipped_and_the_batch_continues() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let source = write_csv(src.path(), "data.csv", "text\none\ntwo\nthree\n");

        let mock = Arc::new(MockSynthesizer::with_script(vec![
            Err(rejection("Invalid voice 'banana'")),
            Ok(()),
            Ok(()),
        ]));
        let jobs = vec![make_job(source, &out)];
        let (runner, mut rx) = make_runner(jobs, Arc::clone(&mock), CancelToken::new());

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Completed);

        let events = drain(&mut rx);
        assert_eq!(error_titles(&events), vec!["Synthesis Error"]);
        let results = completed_results(&events).expect("completed event");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "two");
        // The failed row still cost one request; no row was retried here.
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn instructions_rejection_gets_distinct_diagnostic() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let source = write_csv(src.path(), "data.csv", "text\nhello\n");

        let mock = Arc::new(MockSynthesizer::with_script(vec![Err(rejection(
            "Unknown parameter: 'instructions'.",
        ))]));
        let jobs = vec![make_job(source, &out)];
        let (runner, mut rx) = make_runner(jobs, mock, CancelToken::new());

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Completed);

        let events = drain(&mut rx);
        assert_eq!(error_titles(&events), vec!["API Error"]);
        assert!(completed_results(&events).expect("completed event").is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_run_delivers_no_results() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let source = write_csv(src.path(), "data.csv", "text\nhello\n");

        let token = CancelToken::new();
        token.cancel();

        let mock = Arc::new(MockSynthesizer::ok());
        let jobs = vec![make_job(source, &out)];
        let (runner, mut rx) = make_runner(jobs, Arc::clone(&mock), token);
        let phase_handle = runner.phase_handle();

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Cancelled);
        assert_eq!(*phase_handle.lock().unwrap(), RunPhase::Cancelled);

        let events = drain(&mut rx);
        assert!(cancelled_results(&events).expect("cancelled event").is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    /// Cancellation observed at the row checkpoint: rows synthesized before
    /// the request are delivered, nothing after it is attempted.
    #[tokio::test]
    async fn cancellation_mid_job_delivers_partial_results() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let source = write_csv(src.path(), "data.csv", "text\none\ntwo\nthree\nfour\n");

        let token = CancelToken::new();
        let hook_token = token.clone();
        let mock = Arc::new(MockSynthesizer::ok().with_call_hook(move |count| {
            if count == 2 {
                hook_token.cancel();
            }
        }));

        let jobs = vec![make_job(source, &out)];
        let (runner, mut rx) = make_runner(jobs, Arc::clone(&mock), token);

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Cancelled);

        let events = drain(&mut rx);
        let results = cancelled_results(&events).expect("cancelled event");
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].text, "two");
        assert_eq!(mock.call_count(), 2);
    }

    /// Cancellation observed at the job checkpoint: no results from later
    /// jobs appear at all.
    #[tokio::test]
    async fn cancellation_between_jobs_stops_later_jobs() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let first = write_csv(src.path(), "a.csv", "text\none\ntwo\n");
        let second = write_csv(src.path(), "b.csv", "text\nthree\n");

        let token = CancelToken::new();
        let hook_token = token.clone();
        let mock = Arc::new(MockSynthesizer::ok().with_call_hook(move |count| {
            if count == 2 {
                hook_token.cancel();
            }
        }));

        let jobs = vec![make_job(first.clone(), &out), make_job(second, &out)];
        let (runner, mut rx) = make_runner(jobs, Arc::clone(&mock), token);

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Cancelled);

        let events = drain(&mut rx);
        let results = cancelled_results(&events).expect("cancelled event");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.input_path == first));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn empty_worklist_completes_immediately() {
        let mock = Arc::new(MockSynthesizer::ok());
        let (runner, mut rx) = make_runner(Vec::new(), Arc::clone(&mock), CancelToken::new());

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Completed);

        let events = drain(&mut rx);
        assert!(completed_results(&events).expect("completed event").is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn header_only_source_produces_no_requests() {
        let src = tempdir().expect("src dir");
        let out = tempdir().expect("out dir");
        let source = write_csv(src.path(), "data.csv", "text\n");

        let mock = Arc::new(MockSynthesizer::ok());
        let jobs = vec![make_job(source, &out)];
        let (runner, mut rx) = make_runner(jobs, Arc::clone(&mock), CancelToken::new());

        let phase = runner.run().await;
        assert_eq!(phase, RunPhase::Completed);

        let events = drain(&mut rx);
        assert!(completed_results(&events).expect("completed event").is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    // -----------------------------------------------------------------------
    // BatchProcessor
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn factory_failure_fails_the_run_with_no_results() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut processor = BatchProcessor::new(Arc::new(FailingFactory), tx)
            .with_row_delay(Duration::ZERO);

        processor.start_batch(Vec::new()).await;
        let phase = processor.wait().await;
        assert_eq!(phase, Some(RunPhase::Failed));

        let events = drain(&mut rx);
        assert_eq!(error_titles(&events), vec!["Synthesis Unavailable"]);
        assert!(completed_results(&events).is_none());
        assert!(cancelled_results(&events).is_none());
    }

    #[tokio::test]
    async fn start_batch_supersedes_the_previous_run() {
        let src = tempdir().expect("src dir");
        let out_a = tempdir().expect("out dir a");
        let out_b = tempdir().expect("out dir b");
        let source = write_csv(src.path(), "data.csv", "text\n1\n2\n3\n4\n5\n");

        let mock = Arc::new(MockSynthesizer::ok().with_delay(Duration::from_millis(30)));
        let (tx, mut rx) = mpsc::channel(64);
        let mut processor = BatchProcessor::new(Arc::new(FixedFactory(Arc::clone(&mock))), tx)
            .with_row_delay(Duration::ZERO);

        processor.start_batch(vec![make_job(source.clone(), &out_a)]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Starting the second run must cancel and join the first before its
        // own worker spawns.
        processor.start_batch(vec![make_job(source, &out_b)]).await;
        let phase = processor.wait().await;
        assert_eq!(phase, Some(RunPhase::Completed));

        let events = drain(&mut rx);
        let cancelled = cancelled_results(&events).expect("first run cancelled");
        assert!(cancelled.len() < 5);
        let completed = completed_results(&events).expect("second run completed");
        assert_eq!(completed.len(), 5);
        assert!(completed
            .iter()
            .all(|r| r.output_path.starts_with(out_b.path())));

        // The cancelled run's terminal event precedes every second-run event.
        let cancel_pos = events
            .iter()
            .position(|e| matches!(e, BatchEvent::Cancelled { .. }))
            .unwrap();
        let complete_pos = events
            .iter()
            .position(|e| matches!(e, BatchEvent::Completed { .. }))
            .unwrap();
        assert!(cancel_pos < complete_pos);
    }

    #[tokio::test]
    async fn cancel_without_a_live_run_is_a_noop() {
        let (tx, _rx) = mpsc::channel(8);
        let mock = Arc::new(MockSynthesizer::ok());
        let mut processor = BatchProcessor::new(Arc::new(FixedFactory(mock)), tx);

        assert_eq!(processor.cancel().await, None);
        assert!(processor.phase().is_none());
        assert!(processor.cancel_token().is_none());
    }

    // -----------------------------------------------------------------------
    // Preview
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn preview_emits_ready_event_with_derived_path() {
        let temp = tempdir().expect("temp dir");
        let mock = Arc::new(MockSynthesizer::ok());
        let (tx, mut rx) = mpsc::channel(8);
        let processor = BatchProcessor::new(Arc::new(FixedFactory(Arc::clone(&mock))), tx)
            .with_temp_dir(temp.path().to_path_buf());

        let handle = processor.generate_preview(PreviewRequest {
            text: "hello".into(),
            voice: "nova".into(),
            model: "tts-1".into(),
            instructions: Some("ignored by this model".into()),
            format: OutputFormat::Mp3,
        });
        handle.await.expect("preview task");

        let events = drain(&mut rx);
        let path = events
            .iter()
            .find_map(|event| match event {
                BatchEvent::PreviewReady { path } => Some(path.clone()),
                _ => None,
            })
            .expect("preview ready event");

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("preview_"));
        assert!(name.ends_with(".mp3"));
        assert!(path.starts_with(temp.path()));

        // The capability gate ran: a basic model never sends instructions.
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.instructions.is_none());
        assert_eq!(calls[0].0.input, "hello");
    }

    #[tokio::test]
    async fn preview_factory_failure_emits_error() {
        let temp = tempdir().expect("temp dir");
        let (tx, mut rx) = mpsc::channel(8);
        let processor = BatchProcessor::new(Arc::new(FailingFactory), tx)
            .with_temp_dir(temp.path().to_path_buf());

        let handle = processor.generate_preview(PreviewRequest {
            text: "hello".into(),
            voice: "nova".into(),
            model: "tts-1".into(),
            instructions: None,
            format: OutputFormat::Mp3,
        });
        handle.await.expect("preview task");

        let events = drain(&mut rx);
        assert_eq!(error_titles(&events), vec!["Preview Error"]);
    }
}
