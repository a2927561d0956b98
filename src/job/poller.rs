// ABOUTME: Polls the backend for one job's status until it reaches a terminal phase
// ABOUTME: Publishes the reconciled record and poll errors on separate channels

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::record::{JobPhase, JobStatusRecord};
use crate::config::ClientConfig;
use crate::error::{FetchError, PollError, ProtocolError};
use crate::remote::models::StatusResponse;

/// Where the poller gets status responses from.
pub trait StatusSource: Send + Sync + 'static {
    fn fetch_status(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<StatusResponse, FetchError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerOptions {
    /// Delay between the end of one query and the start of the next.
    pub interval: Duration,
    pub query_timeout: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for PollerOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            query_timeout: config.query_timeout(),
            max_consecutive_errors: config.max_consecutive_errors.max(1),
        }
    }
}

/// State shared between the poller handle and its polling task.
struct Shared {
    record: watch::Sender<JobStatusRecord>,
    errors: broadcast::Sender<PollError>,
    /// Bumped by every start/stop; a task only acts while it holds the current value.
    generation: AtomicU64,
    queries: AtomicU64,
}

#[derive(Debug, PartialEq)]
enum Applied {
    Stale,
    Updated(JobPhase),
    Rejected(ProtocolError),
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Reconcile `response` into the record unless `generation` is out of date.
    ///
    /// The generation is checked while holding the record lock, so a stop or
    /// restart either happens before (and the response is dropped) or after.
    fn apply(&self, generation: u64, response: &StatusResponse) -> Applied {
        let mut applied = Applied::Stale;
        self.record.send_if_modified(|record| {
            if !self.is_current(generation) {
                return false;
            }
            match record.reconcile(response) {
                Ok(changed) => {
                    applied = Applied::Updated(record.phase);
                    changed
                }
                Err(e) => {
                    applied = Applied::Rejected(e);
                    false
                }
            }
        });
        applied
    }

    fn report(&self, generation: u64, error: PollError) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        tracing::warn!("Status check failed: {}", error);
        // No subscribers is fine; the warning above still surfaces it.
        let _ = self.errors.send(error);
        true
    }
}

/// Trim `job_id`, rejecting it when nothing is left.
pub fn require_job_id(job_id: &str) -> Result<&str, PollError> {
    let job_id = job_id.trim();
    if job_id.is_empty() {
        return Err(PollError::Configuration(
            "A job id is required to check processing status".to_string(),
        ));
    }
    Ok(job_id)
}

/// Tracks one background job at a time.
///
/// Presentation code reads the record through [`JobPoller::subscribe`] and
/// poll failures through [`JobPoller::errors`]; only the poller writes.
/// Dropping the poller stops it.
pub struct JobPoller<S: StatusSource> {
    source: Arc<S>,
    options: PollerOptions,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl<S: StatusSource> JobPoller<S> {
    pub fn new(source: Arc<S>, options: PollerOptions) -> Self {
        let (record, _) = watch::channel(JobStatusRecord::idle());
        let (errors, _) = broadcast::channel(32);
        Self {
            source,
            options,
            shared: Arc::new(Shared {
                record,
                errors,
                generation: AtomicU64::new(0),
                queries: AtomicU64::new(0),
            }),
            task: None,
        }
    }

    /// Begin tracking `job_id`, replacing any job tracked so far.
    ///
    /// The record is `PENDING` with zero progress when this returns, and the
    /// first query goes out without waiting for an interval.
    pub fn start(&mut self, job_id: &str) -> Result<(), PollError> {
        let job_id = require_job_id(job_id)?;

        self.stop();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .record
            .send_replace(JobStatusRecord::pending(job_id));

        tracing::info!("Tracking job {}", job_id);
        self.task = Some(tokio::spawn(poll_loop(
            Arc::clone(&self.source),
            Arc::clone(&self.shared),
            self.options.clone(),
            generation,
            job_id.to_string(),
        )));
        Ok(())
    }

    /// Stop polling. The record keeps its last reconciled state.
    pub fn stop(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Status polling stopped");
        }
    }

    /// Stop polling and return the record to `IDLE`.
    pub fn reset(&mut self) {
        self.stop();
        self.shared.record.send_replace(JobStatusRecord::idle());
    }

    pub fn subscribe(&self) -> watch::Receiver<JobStatusRecord> {
        self.shared.record.subscribe()
    }

    pub fn errors(&self) -> broadcast::Receiver<PollError> {
        self.shared.errors.subscribe()
    }

    pub fn snapshot(&self) -> JobStatusRecord {
        self.shared.record.borrow().clone()
    }

    /// Total status queries issued since the poller was created.
    pub fn queries_issued(&self) -> u64 {
        self.shared.queries.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl<S: StatusSource> Drop for JobPoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<S: StatusSource>(
    source: Arc<S>,
    shared: Arc<Shared>,
    options: PollerOptions,
    generation: u64,
    job_id: String,
) {
    let mut failures = 0u32;

    loop {
        shared.queries.fetch_add(1, Ordering::SeqCst);
        let result =
            match tokio::time::timeout(options.query_timeout, source.fetch_status(&job_id)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(options.query_timeout)),
            };

        let error = match result {
            Ok(response) => match shared.apply(generation, &response) {
                Applied::Stale => return,
                Applied::Updated(phase) if phase.is_terminal() => {
                    tracing::info!("Job {} finished with status {}", job_id, phase);
                    return;
                }
                Applied::Updated(phase) => {
                    tracing::debug!("Job {} is {}", job_id, phase);
                    failures = 0;
                    None
                }
                Applied::Rejected(e) => Some(PollError::Protocol(e)),
            },
            Err(e) => Some(PollError::Transport(e)),
        };

        if let Some(error) = error {
            if !shared.report(generation, error) {
                return;
            }
            failures += 1;
            if failures >= options.max_consecutive_errors {
                shared.report(generation, PollError::GaveUp(failures));
                return;
            }
        }

        tokio::time::sleep(options.interval).await;
        if !shared.is_current(generation) {
            return;
        }
    }
}
