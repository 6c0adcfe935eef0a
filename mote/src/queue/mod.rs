//! Per-session run queue. Grounded on the teacher's `serve::run` module,
//! which spawns one task per run over a bounded `mpsc` channel and reports
//! completion through the spawned task's `JoinHandle`; generalized here into
//! a long-lived worker per session so tasks queued against the same session
//! execute strictly in order while different sessions run independently.

mod cancellation;
mod worker;

pub use cancellation::{cancellation_pair, Cancellation, CancellationHandle};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::EngineError;

use worker::{Worker, WorkerTask};

/// A unit of queued work. `f` receives a cancellation token it should poll
/// (or select on) while running.
pub type RunFn = Box<dyn FnOnce(Cancellation) -> BoxFuture<'static, Result<(), EngineError>> + Send>;

struct SessionHandle {
    sender: mpsc::Sender<WorkerTask>,
    cancel: CancellationHandle,
    join: JoinHandle<()>,
}

/// Owns one worker task per active session. Workers are spawned lazily on
/// the first `enqueue` call and self-terminate after `idle_timeout` of
/// inactivity, removing their own registry entry.
pub struct RunQueue {
    sessions: Arc<DashMap<String, SessionHandle>>,
    capacity: usize,
    idle_timeout: Duration,
}

impl RunQueue {
    pub fn new(capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            capacity,
            idle_timeout,
        }
    }

    /// Queues `f` to run on `session_id`'s worker, spawning the worker if
    /// this is its first task. `ctx` is this call's own cancellation context
    /// (per spec's `Enqueue(sessionID, ctx, fn)` contract) and is merged with
    /// the session-wide token `cancel(session_id)` signals, so `f` observes
    /// either source without needing to know which fired. Returns a receiver
    /// that resolves with the task's result once it has run (or been
    /// cancelled/skipped).
    ///
    /// A context that is already cancelled never reaches the worker: the
    /// caller learns immediately, and nothing is scheduled.
    pub fn enqueue(
        &self,
        session_id: &str,
        ctx: Cancellation,
        f: RunFn,
    ) -> Result<oneshot::Receiver<Result<(), EngineError>>, EngineError> {
        if ctx.is_cancelled() {
            return Err(EngineError::RunCancelled(session_id.to_string()));
        }

        let (result_tx, result_rx) = oneshot::channel();
        let mut task = WorkerTask {
            f,
            ctx,
            result_tx,
        };

        // A worker can exit (idle timeout) between us reading its sender and
        // sending to it; retry once against a freshly spawned worker in that
        // case rather than failing a live caller.
        for _ in 0..2 {
            let sender = self.worker_sender(session_id);
            match sender.try_send(task) {
                Ok(()) => return Ok(result_rx),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    return Err(EngineError::QueueFull(session_id.to_string()));
                }
                Err(mpsc::error::TrySendError::Closed(returned)) => {
                    self.sessions.remove(session_id);
                    task = returned;
                }
            }
        }
        Err(EngineError::QueueFull(session_id.to_string()))
    }

    /// Signals the session's current and future tasks to observe
    /// cancellation. Does not remove the worker.
    pub fn cancel(&self, session_id: &str) {
        if let Some(handle) = self.sessions.get(session_id) {
            handle.cancel.cancel();
        }
    }

    /// Number of tasks currently queued (not counting one in flight) for a
    /// session; `None` if the session has no active worker.
    pub fn pending(&self, session_id: &str) -> Option<usize> {
        self.sessions
            .get(session_id)
            .map(|h| self.capacity - h.sender.capacity())
    }

    pub fn active_sessions(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Cancels every session, drops all senders so workers drain and exit,
    /// then waits up to `deadline` for them to finish.
    pub async fn shutdown(&self, deadline: Duration) {
        let handles: Vec<(String, SessionHandle)> = self
            .sessions
            .iter()
            .map(|e| e.key().clone())
            .filter_map(|k| self.sessions.remove(&k))
            .collect();
        for (_, h) in &handles {
            h.cancel.cancel();
        }
        let joins = handles.into_iter().map(|(_, h)| h.join);
        let _ = tokio::time::timeout(deadline, futures::future::join_all(joins)).await;
    }

    fn worker_sender(&self, session_id: &str) -> mpsc::Sender<WorkerTask> {
        if let Some(handle) = self.sessions.get(session_id) {
            return handle.sender.clone();
        }
        // Racing spawns are resolved by `entry`: the loser's channel and
        // task are simply dropped.
        let (cancel_handle, cancel_token) = cancellation_pair();
        let (tx, rx) = mpsc::channel(self.capacity);
        let sessions = self.sessions.clone();
        let session_id_owned = session_id.to_string();
        let idle_timeout = self.idle_timeout;
        let worker = Worker {
            session_id: session_id_owned.clone(),
            rx,
            cancel: cancel_token,
            idle_timeout,
            sessions: sessions.clone(),
        };
        let join = tokio::spawn(worker.run());
        match self.sessions.entry(session_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                join.abort();
                existing.get().sender.clone()
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(SessionHandle {
                    sender: tx.clone(),
                    cancel: cancel_handle,
                    join,
                });
                tx
            }
        }
    }
}
