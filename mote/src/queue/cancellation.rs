//! Lightweight cooperative cancellation token, built on `watch` rather than a
//! dedicated crate since the teacher's stack does not carry one.

use tokio::sync::watch;

/// Cheaply cloneable handle a task observes to learn it has been cancelled.
#[derive(Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled. A task's main loop selects on
    /// this alongside its own work.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|v| *v).await;
    }
}

/// The writer half; held by the run queue and signaled by `Cancel`.
#[derive(Clone)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Builds a fresh, un-cancelled token pair.
pub fn cancellation_pair() -> (CancellationHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, Cancellation { rx })
}

impl Cancellation {
    /// Combines two tokens into one that cancels as soon as either source
    /// does. Used to merge a caller's own per-call context with a session's
    /// coarser-grained cancellation without threading both through every
    /// `RunFn`.
    pub fn or(mut self, mut other: Cancellation) -> Cancellation {
        let (handle, combined) = cancellation_pair();
        if self.is_cancelled() || other.is_cancelled() {
            handle.cancel();
            return combined;
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = self.cancelled() => {}
                _ = other.cancelled() => {}
            }
            handle.cancel();
        });
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_observed_by_clones() {
        let (handle, token) = cancellation_pair();
        let mut clone = token.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        clone.cancelled().await;
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn or_cancels_when_either_source_does() {
        let (handle_a, a) = cancellation_pair();
        let (_handle_b, b) = cancellation_pair();
        let mut combined = a.or(b);
        assert!(!combined.is_cancelled());
        handle_a.cancel();
        combined.cancelled().await;
        assert!(combined.is_cancelled());
    }

    #[tokio::test]
    async fn or_is_already_cancelled_if_either_source_already_is() {
        let (handle, a) = cancellation_pair();
        let (_unused, b) = cancellation_pair();
        handle.cancel();
        let combined = a.or(b);
        assert!(combined.is_cancelled());
    }
}
