//! Task queue for index and delete requests.
//!
//! Producers call [`TaskQueue::enqueue_index`] / [`TaskQueue::enqueue_delete`];
//! both return as soon as the task is queued or rejected. A single dispatcher
//! pops tasks in FIFO order and runs each on a worker slot from a bounded
//! pool (default 2). Every outcome is reported to the requesting user
//! through the [`Notifier`].
//!
//! Two tasks for the same file never run at the same time: when the head of
//! the queue names a file that is still in flight, the dispatcher waits for
//! it instead of skipping ahead. This keeps FIFO order and makes the
//! delete half of a reindex finish before its index half starts.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::{Config, StorageConfig};
use crate::db;
use crate::decode::PdfDecoder;
use crate::error::{IndexingError, Result};
use crate::ingest::{self, format_duration, CancelFlag, IngestReport};
use crate::notify::{Notifier, Severity};
use crate::repository::{self, DeleteReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Index,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Index => f.write_str("indexing"),
            Action::Delete => f.write_str("deleting"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub action: Action,
    pub file_ref: String,
    pub user: String,
}

struct InFlight {
    action: Action,
    cancel: CancelFlag,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Task>,
    in_flight: HashMap<String, InFlight>,
    shutdown: bool,
}

impl State {
    fn has_pending(&self, action: Action, file_ref: &str) -> bool {
        self.pending
            .iter()
            .any(|t| t.action == action && t.file_ref == file_ref)
    }

    fn in_flight_action(&self, file_ref: &str) -> Option<Action> {
        self.in_flight.get(file_ref).map(|f| f.action)
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

struct Shared {
    config: Config,
    pool: SqlitePool,
    decoder: Arc<dyn PdfDecoder>,
    notifier: Arc<Notifier>,
    state: Mutex<State>,
    /// Serializes enqueue decisions, which span a database lookup.
    enqueue_lock: tokio::sync::Mutex<()>,
    /// Signals the dispatcher: a task was queued or a task finished.
    wake: Notify,
    /// Signals `wait_idle` callers: a task finished.
    settled: Notify,
    workers: Arc<Semaphore>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct TaskQueue {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Open the queue's lookup pool and start the dispatcher.
    pub async fn start(
        config: Config,
        decoder: Arc<dyn PdfDecoder>,
        notifier: Arc<Notifier>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| IndexingError::Config(format!("{:#}", e)))?;
        let pool = db::connect(&config).await?;
        let workers = Arc::new(Semaphore::new(config.queue.max_workers.max(1)));
        let shared = Arc::new(Shared {
            config,
            pool,
            decoder,
            notifier,
            state: Mutex::new(State::default()),
            enqueue_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            settled: Notify::new(),
            workers,
        });
        let dispatcher = tokio::spawn(dispatch(shared.clone()));
        log::info!(
            "task queue started with {} workers",
            shared.config.queue.max_workers
        );
        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    fn reject(&self, user: &str, err: IndexingError) -> Result<()> {
        log::warn!("rejected request from {}: {}", user, err);
        self.shared
            .notifier
            .send(user, rejection_message(&err), err.severity());
        Err(err)
    }

    fn push(&self, tasks: &[(Action, &str)], user: &str) -> Result<()> {
        let mut st = self.shared.state();
        if st.shutdown {
            return Err(IndexingError::Cancelled("task queue is shut down".to_string()));
        }
        for (action, file_ref) in tasks {
            st.pending.push_back(Task {
                action: *action,
                file_ref: file_ref.to_string(),
                user: user.to_string(),
            });
        }
        drop(st);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Queue indexing of `file_ref`, or a delete-then-index pair when the
    /// document is already indexed.
    pub async fn enqueue_index(&self, file_ref: &str, user: &str) -> Result<()> {
        if let Err(err) = StorageConfig::check_ref(file_ref) {
            return self.reject(user, err);
        }
        let _guard = self.shared.enqueue_lock.lock().await;

        let (queued, running, delete_ahead) = {
            let st = self.shared.state();
            (
                st.has_pending(Action::Index, file_ref),
                st.in_flight_action(file_ref),
                st.has_pending(Action::Delete, file_ref),
            )
        };
        if queued {
            return self.reject(
                user,
                IndexingError::AlreadyQueued {
                    file_ref: file_ref.to_string(),
                    action: Action::Index.to_string(),
                },
            );
        }
        if running == Some(Action::Index) {
            return self.reject(user, IndexingError::AlreadyIndexing(file_ref.to_string()));
        }
        if delete_ahead || running == Some(Action::Delete) {
            // The document is on its way out; index it again afterwards.
            self.push(&[(Action::Index, file_ref)], user)?;
            self.shared.notifier.send(
                user,
                "Document added to tasklist for indexing",
                Severity::Info,
            );
            return Ok(());
        }

        match repository::find_by_file(&self.shared.pool, file_ref).await? {
            Some(doc) if doc.is_indexing() => {
                self.reject(user, IndexingError::AlreadyIndexing(file_ref.to_string()))
            }
            Some(_) => {
                self.push(&[(Action::Delete, file_ref), (Action::Index, file_ref)], user)?;
                self.shared
                    .notifier
                    .send(user, "Reindexing the document", Severity::Info);
                Ok(())
            }
            None => {
                self.push(&[(Action::Index, file_ref)], user)?;
                self.shared.notifier.send(
                    user,
                    "Document added to tasklist for indexing",
                    Severity::Info,
                );
                Ok(())
            }
        }
    }

    /// Queue deletion of the document stored for `file_ref`.
    pub async fn enqueue_delete(&self, file_ref: &str, user: &str) -> Result<()> {
        if let Err(err) = StorageConfig::check_ref(file_ref) {
            return self.reject(user, err);
        }
        let _guard = self.shared.enqueue_lock.lock().await;

        let (queued, index_ahead) = {
            let st = self.shared.state();
            (
                st.has_pending(Action::Delete, file_ref),
                st.has_pending(Action::Index, file_ref) || st.in_flight_action(file_ref).is_some(),
            )
        };
        if queued {
            return self.reject(
                user,
                IndexingError::AlreadyQueued {
                    file_ref: file_ref.to_string(),
                    action: Action::Delete.to_string(),
                },
            );
        }

        // A document still to be created by an earlier task is resolved when
        // the delete runs.
        if !index_ahead && repository::find_by_file(&self.shared.pool, file_ref).await?.is_none() {
            return self.reject(user, IndexingError::NotFound(file_ref.to_string()));
        }

        self.push(&[(Action::Delete, file_ref)], user)?;
        self.shared.notifier.send(
            user,
            "Document added to tasklist for deleting",
            Severity::Info,
        );
        Ok(())
    }

    /// Snapshot of tasks not yet dispatched, oldest first.
    pub fn pending(&self) -> Vec<Task> {
        self.shared.state().pending.iter().cloned().collect()
    }

    /// File references of tasks currently running.
    pub fn in_flight(&self) -> Vec<String> {
        let mut files: Vec<String> = self.shared.state().in_flight.keys().cloned().collect();
        files.sort();
        files
    }

    /// Request cancellation of the running task for `file_ref`. Takes effect
    /// at the next page boundary.
    pub fn cancel(&self, file_ref: &str) -> bool {
        match self.shared.state().in_flight.get(file_ref) {
            Some(f) => {
                f.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Resolve once nothing is pending and nothing is running.
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.shared.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();
            {
                let st = self.shared.state();
                if st.is_idle() || (st.shutdown && st.in_flight.is_empty()) {
                    return;
                }
            }
            settled.await;
        }
    }

    /// Stop the dispatcher, drop pending tasks and cancel running ones.
    /// Returns the tasks that were dropped without running.
    pub async fn shutdown(&self) -> Vec<Task> {
        let dropped: Vec<Task> = {
            let mut st = self.shared.state();
            st.shutdown = true;
            for f in st.in_flight.values() {
                f.cancel.cancel();
            }
            st.pending.drain(..).collect()
        };
        self.shared.wake.notify_one();
        self.shared.workers.close();

        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("dispatcher ended abnormally: {}", e);
            }
        }
        self.wait_idle().await;
        self.shared.pool.close().await;
        log::info!("task queue stopped, {} pending tasks dropped", dropped.len());
        dropped
    }
}

fn rejection_message(err: &IndexingError) -> String {
    match err {
        IndexingError::AlreadyQueued { action, .. } => {
            format!("Document already in tasklist for {}", action)
        }
        IndexingError::AlreadyIndexing(_) => {
            "Document is indexing wait till end of indexing".to_string()
        }
        other => other.to_string(),
    }
}

/// Clears the in-flight entry even if the task panics.
struct Finished {
    shared: Arc<Shared>,
    file_ref: String,
}

impl Drop for Finished {
    fn drop(&mut self) {
        self.shared.state().in_flight.remove(&self.file_ref);
        self.shared.wake.notify_one();
        self.shared.settled.notify_waiters();
    }
}

async fn dispatch(shared: Arc<Shared>) {
    loop {
        let permit = match shared.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let next = loop {
            let wake = shared.wake.notified();
            {
                let mut st = shared.state();
                if st.shutdown {
                    break None;
                }
                let head_ready = st
                    .pending
                    .front()
                    .is_some_and(|t| !st.in_flight.contains_key(&t.file_ref));
                if head_ready {
                    if let Some(task) = st.pending.pop_front() {
                        let cancel = CancelFlag::new();
                        st.in_flight.insert(
                            task.file_ref.clone(),
                            InFlight {
                                action: task.action,
                                cancel: cancel.clone(),
                            },
                        );
                        break Some((task, cancel));
                    }
                }
            }
            wake.await;
        };

        let Some((task, cancel)) = next else { break };
        log::info!("dispatching {} of {} for {}", task.action, task.file_ref, task.user);
        tokio::spawn(run_task(shared.clone(), task, cancel, permit));
    }
    log::debug!("dispatcher stopped");
    shared.settled.notify_waiters();
}

enum Outcome {
    Indexed(IngestReport),
    Deleted(DeleteReport),
}

async fn run_task(shared: Arc<Shared>, task: Task, cancel: CancelFlag, _permit: OwnedSemaphorePermit) {
    let _finished = Finished {
        shared: shared.clone(),
        file_ref: task.file_ref.clone(),
    };

    let secs = shared.config.queue.task_timeout_secs;
    let result = if secs > 0 {
        match tokio::time::timeout(Duration::from_secs(secs), execute(&shared, &task, &cancel)).await {
            Ok(result) => result,
            Err(_) => Err(IndexingError::Timeout {
                file_ref: task.file_ref.clone(),
                secs,
            }),
        }
    } else {
        execute(&shared, &task, &cancel).await
    };

    report(&shared.notifier, &task, result);
}

async fn execute(shared: &Shared, task: &Task, cancel: &CancelFlag) -> Result<Outcome> {
    let pool = db::connect_for_task(&shared.config).await?;
    let result = match task.action {
        Action::Index => ingest::ingest(
            &pool,
            &shared.config,
            shared.decoder.clone(),
            &shared.notifier,
            &task.user,
            &task.file_ref,
            cancel,
        )
        .await
        .map(Outcome::Indexed),
        Action::Delete => delete(&pool, &shared.config, &task.file_ref)
            .await
            .map(Outcome::Deleted),
    };
    pool.close().await;
    result
}

async fn delete(pool: &SqlitePool, config: &Config, file_ref: &str) -> Result<DeleteReport> {
    let doc = repository::find_by_file(pool, file_ref)
        .await?
        .ok_or_else(|| IndexingError::NotFound(file_ref.to_string()))?;
    repository::delete_document(pool, &config.storage, doc.id).await
}

fn report(notifier: &Notifier, task: &Task, result: Result<Outcome>) {
    match result {
        Ok(Outcome::Indexed(r)) => {
            log::info!(
                "indexed {}: {} pages, {} blocks in {}ms",
                r.file_ref,
                r.pages,
                r.blocks,
                r.duration_ms
            );
            notifier.send(
                &task.user,
                format!(
                    "The document has been indexed {} in {}",
                    r.file_ref,
                    format_duration(r.duration_ms)
                ),
                Severity::Success,
            );
        }
        Ok(Outcome::Deleted(r)) => {
            log::info!("deleted {}: {} pages, {} blocks", r.file_ref, r.pages, r.blocks);
            notifier.send(
                &task.user,
                format!("The document has been deleted {}", r.file_ref),
                Severity::Success,
            );
        }
        Err(e) => {
            log::error!("{} of {} failed: {}", task.action, task.file_ref, e);
            let message = match task.action {
                Action::Index => format!("Error during indexing the document: {}", e),
                Action::Delete => format!("Error during deleting the document: {}", e),
            };
            notifier.send(&task.user, message, e.severity());
        }
    }
}
