//! The long-lived task backing one session's run queue entry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::error::EngineError;

use super::cancellation::Cancellation;
use super::{RunFn, SessionHandle};

pub struct WorkerTask {
    pub f: RunFn,
    /// This call's own cancellation context, merged with the worker's
    /// session-wide token before `f` runs.
    pub ctx: Cancellation,
    pub result_tx: oneshot::Sender<Result<(), EngineError>>,
}

pub struct Worker {
    pub session_id: String,
    pub rx: mpsc::Receiver<WorkerTask>,
    pub cancel: Cancellation,
    pub idle_timeout: Duration,
    pub sessions: Arc<DashMap<String, SessionHandle>>,
}

impl Worker {
    pub async fn run(mut self) {
        loop {
            let task = match tokio::time::timeout(self.idle_timeout, self.rx.recv()).await {
                Ok(Some(task)) => task,
                Ok(None) => break, // all senders dropped: shutdown() drained us
                Err(_) => {
                    // Idle: remove ourselves so a future enqueue spawns fresh.
                    // `rx` stays open to racing senders already holding a
                    // clone; any task that lands after this point is picked
                    // up by the freshly spawned worker via the retry in
                    // `RunQueue::enqueue`.
                    self.sessions.remove(&self.session_id);
                    break;
                }
            };

            let cancel = self.cancel.clone().or(task.ctx);
            let join = tokio::spawn(async move { (task.f)(cancel).await });
            let result = match join.await {
                Ok(result) => result,
                Err(_panic) => Err(EngineError::RunCancelled(self.session_id.clone())),
            };
            let _ = task.result_tx.send(result);
        }
    }
}
