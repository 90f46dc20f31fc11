//! Background execution for asynchronous OCR submissions.
//!
//! [`JobQueue`] is a bounded `mpsc` channel drained by one dispatcher task.
//! The dispatcher hands each job to its own task, and at most
//! `worker_count` of those run OCR at once. Failures inside a run are
//! logged and swallowed: the caller of `submit` has already returned, and
//! the job row (FAILED + message) is the only place the outcome is visible.
//!
//! [`DocumentLocks`] serialises runs per document. A run takes its worker
//! slot only after it holds its document's lock, so submissions queued
//! behind one document never starve the others.

use crate::db::{job_repo, Database};
use crate::error::{Result, ServiceError};
use crate::model::ProcessingJob;
use crate::processor::JobProcessor;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info};

// ── Per-document locks ───────────────────────────────────────────────────

/// One async mutex per document id, present only while in use.
#[derive(Clone, Default)]
pub struct DocumentLocks {
    inner: Arc<DashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl DocumentLocks {
    /// Waits until no other holder has `document_id`, then holds it until
    /// the guard is dropped.
    pub async fn acquire(&self, document_id: i64) -> DocumentGuard {
        // Clone the Arc out first: the dashmap shard lock must not be held
        // across the await.
        let lock = Arc::clone(&self.inner.entry(document_id).or_default());
        let guard = lock.lock_owned().await;
        DocumentGuard {
            locks: self.clone(),
            document_id,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl std::fmt::Debug for DocumentLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLocks")
            .field("documents", &self.inner.len())
            .finish()
    }
}

/// Holds one document's lock. Dropping it releases the lock and removes
/// the map entry when nobody else holds or waits for it.
pub struct DocumentGuard {
    locks: DocumentLocks,
    document_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the Arc, and new clones are only
        // made under the shard lock that `remove_if` takes.
        self.locks
            .inner
            .remove_if(&self.document_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ── Job queue ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct QueuedJob {
    document_id: i64,
    job_id: i64,
}

/// Bounded queue + worker pool for asynchronous runs.
pub struct JobQueue {
    db: Database,
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("open", &self.sender.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Starts the dispatcher on the current tokio runtime.
    pub fn start(processor: JobProcessor, db: Database, worker_count: usize, capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        let dispatcher = tokio::spawn(dispatch_loop(receiver, processor, worker_count, capacity));
        info!("Job queue started: {} workers, capacity {}", worker_count, capacity);

        Self {
            db,
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Creates a PENDING job for `document_id` and queues it.
    ///
    /// Capacity is reserved before the row is written, so a closed queue
    /// never leaves an orphaned PENDING job. When the queue is full this
    /// waits for a slot.
    pub async fn submit(&self, document_id: i64) -> Result<ProcessingJob> {
        let sender = self.sender.lock().clone().ok_or(ServiceError::QueueClosed)?;
        let permit = sender.reserve().await.map_err(|_| ServiceError::QueueClosed)?;

        let job = job_repo::insert_pending(&self.db, document_id)?;
        permit.send(QueuedJob {
            document_id,
            job_id: job.id,
        });
        debug!("Queued job {} for document {}", job.id, document_id);
        Ok(job)
    }

    /// Stops accepting work and waits until every queued job has run.
    ///
    /// In-flight runs are not interrupted.
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);

        let Some(dispatcher) = self.dispatcher.lock().take() else {
            return;
        };
        info!("Job queue shutting down, draining queued jobs");
        if let Err(e) = dispatcher.await {
            error!("Job dispatcher ended abnormally: {}", e);
        }
    }
}

type RunOutcome = (QueuedJob, Result<ProcessingJob>);

async fn dispatch_loop(
    mut receiver: mpsc::Receiver<QueuedJob>,
    processor: JobProcessor,
    worker_count: usize,
    capacity: usize,
) {
    let slots = Arc::new(Semaphore::new(worker_count));
    // Bounds the jobs taken off the channel but not yet finished.
    let admitted = Arc::new(Semaphore::new(worker_count + capacity));
    let mut running: JoinSet<RunOutcome> = JoinSet::new();

    loop {
        tokio::select! {
            Some(done) = running.join_next(), if !running.is_empty() => log_outcome(done),
            next = admit(&mut receiver, &admitted) => {
                let Some((task, admission)) = next else { break };
                let processor = processor.clone();
                let slots = Arc::clone(&slots);
                running.spawn(async move {
                    let outcome = processor.run_in_slot(task.document_id, Some(task.job_id), &slots).await;
                    drop(admission);
                    (task, outcome)
                });
            }
        }
    }

    while let Some(done) = running.join_next().await {
        log_outcome(done);
    }
    debug!("Job dispatcher stopped");
}

/// Next queued job, once there is room to admit it. `None` when the
/// channel is closed and empty.
async fn admit(
    receiver: &mut mpsc::Receiver<QueuedJob>,
    admitted: &Arc<Semaphore>,
) -> Option<(QueuedJob, OwnedSemaphorePermit)> {
    let admission = Arc::clone(admitted).acquire_owned().await.ok()?;
    let task = receiver.recv().await?;
    Some((task, admission))
}

fn log_outcome(done: std::result::Result<RunOutcome, JoinError>) {
    match done {
        Ok((_, Ok(job))) => debug!("Job {} finished as {}", job.id, job.status),
        Ok((task, Err(e))) => error!(
            "Background OCR for document {} (job {}) failed: {}",
            task.document_id, task.job_id, e
        ),
        // Runs are separate tasks, so a panic fails one job and the
        // dispatcher keeps going.
        Err(e) => error!("Background OCR run panicked: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_document_is_serialised() {
        let locks = DocumentLocks::default();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let active = Arc::clone(&active);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let _g = locks.acquire(7).await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_documents_do_not_block() {
        let locks = DocumentLocks::default();
        let _a = locks.acquire(1).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
        drop(b);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn entries_are_dropped_once_nobody_needs_them() {
        let locks = DocumentLocks::default();
        let first = locks.acquire(3).await;

        let waiter = tokio::spawn({
            let locks = locks.clone();
            async move {
                let _g = locks.acquire(3).await;
            }
        });
        tokio::task::yield_now().await;

        drop(first);
        assert_eq!(locks.len(), 1, "entry removed while a waiter still needs it");
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
