//! Bounded background dispatcher for mutation-triggered sync.
//!
//! Local mutations enqueue [`SyncTask`]s without waiting. A single run loop
//! drains the queue and keeps up to `dispatch_workers` tasks in flight, each
//! bounded by the remote timeout. Failures are logged and recorded on the
//! orchestrator; they never reach the code that made the mutation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use keepsake_core::{Error, RecordRef, RecordSnapshot, Result};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::orchestrator::SyncOrchestrator;

/// One unit of background sync work.
#[derive(Debug, Clone)]
pub enum SyncTask {
    /// Mirror the snapshot's current values.
    Upsert(RecordSnapshot),
    /// Remove the record's remote row.
    Delete(RecordRef),
}

impl SyncTask {
    pub fn record_ref(&self) -> RecordRef {
        match self {
            SyncTask::Upsert(snapshot) => snapshot.record_ref(),
            SyncTask::Delete(record) => *record,
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            SyncTask::Upsert(_) => "upsert",
            SyncTask::Delete(_) => "delete",
        }
    }
}

/// Tasks queued or running; wakes `wait_idle` when it reaches zero.
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Marks a task done even if it panics.
struct PendingGuard(Arc<Pending>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// Handle to the background dispatch loop.
pub struct SyncDispatcher {
    tx: mpsc::Sender<SyncTask>,
    shutdown_tx: mpsc::Sender<()>,
    orchestrator: SyncOrchestrator,
    pending: Arc<Pending>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncDispatcher {
    /// Spawn the run loop. Must be called from within a Tokio runtime.
    pub fn start(orchestrator: SyncOrchestrator, config: &SyncConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.dispatch_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let pending = Arc::new(Pending {
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let run_loop = RunLoop {
            orchestrator: orchestrator.clone(),
            pending: pending.clone(),
            workers: config.dispatch_workers.max(1),
            timeout: config.remote_timeout(),
        };
        let handle = tokio::spawn(run_loop.run(rx, shutdown_rx));

        info!(
            workers = config.dispatch_workers.max(1),
            queue_capacity = config.dispatch_queue_capacity.max(1),
            "Sync dispatcher started"
        );

        Self {
            tx,
            shutdown_tx,
            orchestrator,
            pending,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Enqueue a task without waiting.
    ///
    /// Returns false when the task was dropped because the queue is full or
    /// the dispatcher has stopped. A dropped upsert is picked up again by the
    /// next full sync.
    pub fn dispatch(&self, task: SyncTask) -> bool {
        self.pending.add();
        let (task, reason) = match self.tx.try_send(task) {
            Ok(()) => return true,
            Err(TrySendError::Full(task)) => (task, "sync queue full"),
            Err(TrySendError::Closed(task)) => (task, "sync dispatcher stopped"),
        };
        self.pending.done();

        let record = task.record_ref();
        error!(
            subsystem = "dispatch",
            op = task.op(),
            record_kind = %record.kind,
            client_id = %record.client_id,
            reason,
            "Dropped background sync task"
        );
        self.orchestrator
            .record_failure(record, &Error::Internal(reason.to_string()));
        false
    }

    /// Tasks queued or in flight.
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Resolve once every dispatched task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.pending.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop the loop once in-flight tasks complete. Queued tasks that have
    /// not started are dropped.
    pub async fn shutdown(&self) -> Result<()> {
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        let Some(handle) = handle else {
            return Ok(());
        };

        // A closed channel means the loop already exited
        let _ = self.shutdown_tx.send(()).await;
        handle
            .await
            .map_err(|e| Error::Internal(format!("Sync dispatcher task failed: {}", e)))?;
        Ok(())
    }
}

struct RunLoop {
    orchestrator: SyncOrchestrator,
    pending: Arc<Pending>,
    workers: usize,
    timeout: Duration,
}

impl RunLoop {
    async fn run(self, mut rx: mpsc::Receiver<SyncTask>, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Sync dispatcher received shutdown signal");
                    break;
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        error!(error = ?e, "Background sync task panicked");
                    }
                }
                received = rx.recv(), if tasks.len() < self.workers => {
                    let Some(task) = received else {
                        break;
                    };
                    let guard = PendingGuard(self.pending.clone());
                    let orchestrator = self.orchestrator.clone();
                    let timeout = self.timeout;
                    tasks.spawn(async move {
                        let _guard = guard;
                        execute(orchestrator, task, timeout).await;
                    });
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Background sync task panicked");
            }
        }

        rx.close();
        let mut dropped = 0usize;
        while let Ok(task) = rx.try_recv() {
            debug!(
                op = task.op(),
                client_id = %task.record_ref().client_id,
                "Dropping queued task"
            );
            self.pending.done();
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Queued sync tasks dropped at shutdown");
        }
        info!("Sync dispatcher stopped");
    }
}

async fn execute(orchestrator: SyncOrchestrator, task: SyncTask, timeout: Duration) {
    let record = task.record_ref();
    let Some(owner_id) = orchestrator.session().current_user_id() else {
        debug!(
            op = task.op(),
            record_kind = %record.kind,
            client_id = %record.client_id,
            "No signed-in owner, background sync skipped"
        );
        return;
    };

    let start = Instant::now();
    let work = async {
        match &task {
            SyncTask::Upsert(snapshot) => orchestrator.sync_one(snapshot, &owner_id).await,
            SyncTask::Delete(record) => orchestrator.delete_one(*record, &owner_id).await,
        }
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok(())) => debug!(
            op = task.op(),
            record_kind = %record.kind,
            client_id = %record.client_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Background sync completed"
        ),
        // Already logged and recorded by the orchestrator
        Ok(Err(_)) => {}
        Err(_) => {
            let err = Error::Network(format!(
                "background {} exceeded timeout of {}s",
                task.op(),
                timeout.as_secs()
            ));
            orchestrator.record_failure(record, &err);
        }
    }
}
