//! Result promise: single-assignment container for the task's final outcome.
//!
//! The workflow driver resolves it exactly once on every exit path. A second
//! resolution is a programming defect: it is logged and ignored, never
//! surfaced to callers. Any number of handles may await the same outcome.

use tokio::sync::watch;
use tracing::error;

use crate::domain::ExecutionOutcome;

/// Build a connected promise/handle pair.
pub fn result_promise() -> (ResultPromise, ResultHandle) {
    let (tx, rx) = watch::channel(None);
    (ResultPromise { tx }, ResultHandle { rx })
}

/// Resolver half, owned by the workflow driver.
pub struct ResultPromise {
    tx: watch::Sender<Option<ExecutionOutcome>>,
}

impl ResultPromise {
    /// Resolve with the final outcome. The first call wins; later calls are
    /// logged as defects and dropped.
    pub fn resolve(&self, outcome: ExecutionOutcome) {
        if self.tx.borrow().is_some() {
            error!("result promise resolved twice; second outcome dropped");
            return;
        }
        self.tx.send_replace(Some(outcome));
    }
}

/// Awaiter half. Cloning gives another awaiter; all observe the same outcome.
#[derive(Clone)]
pub struct ResultHandle {
    rx: watch::Receiver<Option<ExecutionOutcome>>,
}

impl ResultHandle {
    /// Wait until the promise is resolved and return the outcome.
    ///
    /// A promise dropped unresolved is a driver bug; it is reported as a
    /// failed outcome rather than a hang or a panic.
    pub async fn outcome(&self) -> ExecutionOutcome {
        let mut rx = self.rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(resolved) => match resolved.clone() {
                Some(outcome) => outcome,
                None => unresolved(),
            },
            Err(_) => unresolved(),
        }
    }

    /// Outcome if already resolved, without waiting.
    pub fn try_outcome(&self) -> Option<ExecutionOutcome> {
        self.rx.borrow().clone()
    }
}

fn unresolved() -> ExecutionOutcome {
    error!("result promise dropped without resolution");
    ExecutionOutcome::failure("任务执行失败: 结果缺失")
}
