//! Worker pool: fans a fixed batch of jobs out over a bounded set of workers.
//!
//! The coordinator enqueues every job on a shared queue and closes it; `N`
//! workers (`N = min(configured workers, jobs)`) drain the queue, each job
//! reaching exactly one worker, and push their [`ProcessResult`]s into a result
//! channel. The coordinator waits for every worker to finish before it closes
//! the result set, then hands back one result per job in input order.
//!
//! Failures stay inside their job: a read, network, server or write error is
//! recorded on that job's result and the worker moves on to the next job. A
//! panic inside a job is caught the same way and reported as
//! [`ProcessError::Aborted`].
//!
//! # Cancellation
//! A [`CancelToken`] is checked before each dequeue and raced against the
//! network call. Jobs that never ran, or were interrupted, are reported as
//! [`ProcessError::Cancelled`]; cancellation never drops a job from the result
//! set.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::contract::{NoopProgress, ProcessError, ProcessResult, ProgressSink, Synthesizer};
use crate::synthesis::process_single_file;

/// Shared, cloneable cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signals every clone. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One queued file together with its position in the input.
#[derive(Debug)]
struct Job {
    index: usize,
    path: PathBuf,
}

struct WorkerContext<S: ?Sized> {
    config: Arc<AppConfig>,
    synthesizer: Arc<S>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

/// Processes batches of text files with at most `config.workers()` jobs in flight.
pub struct WorkerPool<S: ?Sized> {
    config: Arc<AppConfig>,
    synthesizer: Arc<S>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl<S> WorkerPool<S>
where
    S: Synthesizer + ?Sized + 'static,
{
    pub fn new(config: Arc<AppConfig>, synthesizer: Arc<S>) -> Self {
        Self {
            config,
            synthesizer,
            progress: Arc::new(NoopProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Runs every file through the synthesis step and returns one result per
    /// file, in the order the files were given. An empty batch is a no-op.
    pub async fn process_files(&self, files: Vec<PathBuf>) -> Vec<ProcessResult> {
        if files.is_empty() {
            info!("No files to process");
            self.progress.finish();
            return Vec::new();
        }

        let total = files.len();
        let worker_count = self.config.workers().min(total);
        info!(jobs = total, workers = worker_count, "Starting worker pool");

        let sources: Vec<PathBuf> = files.clone();
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        for (index, path) in files.into_iter().enumerate() {
            // The receiver is owned by this function, so the queue is open here.
            if job_tx.send(Job { index, path }).is_err() {
                error!(index, "Job queue closed while enqueuing");
            }
        }
        // No more jobs: workers stop once the queue is drained.
        drop(job_tx);

        let jobs = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, ProcessResult)>();
        let context = Arc::new(WorkerContext {
            config: Arc::clone(&self.config),
            synthesizer: Arc::clone(&self.synthesizer),
            progress: Arc::clone(&self.progress),
            cancel: self.cancel.clone(),
        });

        let handles = (1..=worker_count)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&context),
                    Arc::clone(&jobs),
                    result_tx.clone(),
                ))
            })
            .collect::<Vec<_>>();
        drop(result_tx);

        for (id, outcome) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = outcome {
                error!(worker = id + 1, error = %e, "Worker terminated abnormally");
            }
        }

        // Every sender is gone once the workers are joined, so this drains and ends.
        let mut slots: Vec<Option<ProcessResult>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = result_rx.recv().await {
            match slots.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(result),
                _ => error!(index, file = %result.source_path.display(), "Duplicate or unknown job result"),
            }
        }

        let results: Vec<ProcessResult> = slots
            .into_iter()
            .zip(sources)
            .map(|(slot, source)| {
                slot.unwrap_or_else(|| {
                    warn!(file = %source.display(), "Job produced no result; marking as aborted");
                    self.progress.inc();
                    ProcessResult::from_outcome(
                        source,
                        Err(ProcessError::Aborted("worker stopped before reporting".into())),
                        Default::default(),
                    )
                })
            })
            .collect();

        self.progress.finish();
        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            jobs = total,
            successful = total - failed,
            failed,
            "Worker pool finished"
        );
        results
    }
}

async fn worker<S>(
    id: usize,
    context: Arc<WorkerContext<S>>,
    jobs: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    results: mpsc::UnboundedSender<(usize, ProcessResult)>,
) where
    S: Synthesizer + ?Sized,
{
    debug!(
        worker = id,
        timeout_secs = context.config.timeout().as_secs_f64(),
        "Worker starting"
    );

    loop {
        // The lock is held only while taking the next job.
        let next = jobs.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let file = job
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let started = Instant::now();

        let outcome = if context.cancel.is_cancelled() {
            Err(ProcessError::Cancelled)
        } else {
            debug!(worker = id, file = %file, "Processing");
            // A panic is confined to its job; the worker keeps draining the queue.
            AssertUnwindSafe(process_single_file(
                &job.path,
                context.synthesizer.as_ref(),
                &context.config,
                &context.cancel,
            ))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(ProcessError::Aborted(panic_message(payload.as_ref()))))
        };
        let duration = started.elapsed();

        match &outcome {
            Ok(destination) => debug!(
                worker = id,
                file = %file,
                output = %destination.display(),
                duration_ms = duration.as_millis() as u64,
                "Success"
            ),
            Err(ProcessError::Cancelled) => debug!(worker = id, file = %file, "Skipped (cancelled)"),
            Err(e) => warn!(
                worker = id,
                file = %file,
                category = e.category(),
                error = %e,
                "Failed"
            ),
        }

        let result = ProcessResult::from_outcome(job.path, outcome, duration);
        if results.send((job.index, result)).is_err() {
            error!(worker = id, "Result collector closed; stopping worker");
            break;
        }
        context.progress.inc();
    }

    debug!(worker = id, "Worker finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("job panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("job panicked: {message}")
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockProgressSink, MockSynthesizer, SynthesisRequest};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(workers: usize) -> Arc<AppConfig> {
        Arc::new(AppConfig::new(workers, "http://127.0.0.1:9", Duration::from_secs(5)).unwrap())
    }

    fn write_sources(dir: &std::path::Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("part{i}.txt"));
                std::fs::write(&path, format!("text {i}")).unwrap();
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_batch_returns_no_results_and_never_calls_synthesizer() {
        let mut synth = MockSynthesizer::new();
        synth.expect_synthesize().times(0);
        let mut progress = MockProgressSink::new();
        progress.expect_inc().times(0);
        progress.expect_finish().times(1).return_const(());

        let pool = WorkerPool::new(config(4), Arc::new(synth)).with_progress(Arc::new(progress));
        let results = pool.process_files(Vec::new()).await;

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn every_job_yields_exactly_one_result_in_input_order() {
        let dir = tempdir().unwrap();
        let files = write_sources(dir.path(), 12);

        let mut synth = MockSynthesizer::new();
        synth
            .expect_synthesize()
            .times(12)
            .returning(|req: &SynthesisRequest| Ok(req.text.clone().into_bytes()));
        let mut progress = MockProgressSink::new();
        progress.expect_inc().times(12).return_const(());
        progress.expect_finish().times(1).return_const(());

        let pool = WorkerPool::new(config(4), Arc::new(synth)).with_progress(Arc::new(progress));
        let results = pool.process_files(files.clone()).await;

        assert_eq!(results.len(), files.len());
        let unique: HashSet<_> = results.iter().map(|r| r.source_path.clone()).collect();
        assert_eq!(unique.len(), files.len());
        for (i, (result, source)) in results.iter().zip(&files).enumerate() {
            assert_eq!(&result.source_path, source);
            assert!(result.is_success(), "{:?}", result.error);
            let written = std::fs::read(result.destination_path.as_ref().unwrap()).unwrap();
            assert_eq!(written, format!("text {i}").into_bytes());
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_other_jobs() {
        let dir = tempdir().unwrap();
        let mut files = write_sources(dir.path(), 3);
        files.insert(1, dir.path().join("ghost.txt"));

        let mut synth = MockSynthesizer::new();
        synth.expect_synthesize().times(3).returning(|_| Ok(b"mp3".to_vec()));

        let pool = WorkerPool::new(config(2), Arc::new(synth));
        let results = pool.process_files(files).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 3);
        assert_eq!(results[1].error.as_ref().map(|e| e.category()), Some("read"));
    }

    struct CountingSynthesizer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Synthesizer for CountingSynthesizer {
        async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Vec<u8>, ProcessError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(b"mp3".to_vec())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_configured_workers() {
        let dir = tempdir().unwrap();
        let files = write_sources(dir.path(), 10);
        let synth = Arc::new(CountingSynthesizer {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        let pool = WorkerPool::new(config(3), Arc::clone(&synth));
        let results = pool.process_files(files).await;

        assert_eq!(results.len(), 10);
        let peak = synth.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn cancelled_run_still_reports_every_job() {
        let dir = tempdir().unwrap();
        let files = write_sources(dir.path(), 5);

        let mut synth = MockSynthesizer::new();
        synth.expect_synthesize().times(0);

        let cancel = CancelToken::new();
        cancel.cancel();
        let pool = WorkerPool::new(config(2), Arc::new(synth)).with_cancel_token(cancel);
        let results = pool.process_files(files).await;

        assert_eq!(results.len(), 5);
        assert!(results
            .iter()
            .all(|r| matches!(r.error, Some(ProcessError::Cancelled))));
        assert!(!dir.path().join("part0.mp3").exists());
    }

    struct PanickingSynthesizer;

    #[async_trait::async_trait]
    impl Synthesizer for PanickingSynthesizer {
        async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Vec<u8>, ProcessError> {
            panic!("synthesizer blew up");
        }
    }

    #[tokio::test]
    async fn panicking_jobs_are_reported_as_aborted() {
        let dir = tempdir().unwrap();
        let files = write_sources(dir.path(), 2);

        let pool = WorkerPool::new(config(1), Arc::new(PanickingSynthesizer));
        let results = pool.process_files(files).await;

        assert_eq!(results.len(), 2);
        for result in &results {
            match &result.error {
                Some(ProcessError::Aborted(message)) => {
                    assert!(message.contains("synthesizer blew up"), "{message}")
                }
                other => panic!("expected aborted, got {other:?}"),
            }
        }
    }

    /// Panics on one particular input only.
    struct Picky;

    #[async_trait::async_trait]
    impl Synthesizer for Picky {
        async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProcessError> {
            if request.text == "text 1" {
                panic!("bad input");
            }
            Ok(b"mp3".to_vec())
        }
    }

    #[tokio::test]
    async fn a_panicking_job_does_not_take_down_the_rest_of_the_queue() {
        let dir = tempdir().unwrap();
        let files = write_sources(dir.path(), 4);

        let mut progress = MockProgressSink::new();
        progress.expect_inc().times(4).return_const(());
        progress.expect_finish().times(1).return_const(());

        let pool = WorkerPool::new(config(1), Arc::new(Picky)).with_progress(Arc::new(progress));
        let results = pool.process_files(files).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[1].error.as_ref().map(|e| e.category()), Some("aborted"));
        for index in [0, 2, 3] {
            assert!(results[index].is_success(), "{:?}", results[index].error);
        }
    }
}
