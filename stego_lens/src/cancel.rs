// THEORY:
// Cancellation is a single shared flag that only ever goes from "running" to
// "cancelled". It is built on a `tokio::sync::watch` channel so that synchronous
// code can poll it (`is_cancelled`) while async code can wait on it
// (`cancelled().await`) and race it against a blocking computation.
//
// `CancelSource` is the owning side (held by the session and the scheduler handle);
// `CancelToken` is the read-only side handed to every task.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancelSource {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag: Arc::new(flag) }
    }

    /// Raises the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.send_if_modified(|cancelled| {
            let changed = !*cancelled;
            *cancelled = true;
            changed
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            flag: self.flag.subscribe(),
        }
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once the flag is raised. Never resolves if every `CancelSource`
    /// was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut flag = self.flag.clone();
        if flag.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
