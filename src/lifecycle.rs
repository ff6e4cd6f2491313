//! Re-expression of the management discipline (spec §4.1/§5): a broadcast
//! of QUIESCE/TERMINATE events that every task selects against alongside
//! its primary I/O, instead of a fiber "unexpected resume" callback.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    Quiesce,
    Terminate,
}

#[derive(Clone)]
pub struct LifecycleHandle {
    rx: watch::Receiver<Lifecycle>,
}

pub struct LifecycleController {
    tx: watch::Sender<Lifecycle>,
}

/// Create a lifecycle broadcast pair: one controller owned by the main
/// task (the process's signal handler), many handles cloned into workers.
pub fn channel() -> (LifecycleController, LifecycleHandle) {
    let (tx, rx) = watch::channel(Lifecycle::Running);
    (LifecycleController { tx }, LifecycleHandle { rx })
}

impl LifecycleController {
    pub fn quiesce(&self) {
        let _ = self.tx.send(Lifecycle::Quiesce);
    }

    pub fn terminate(&self) {
        let _ = self.tx.send(Lifecycle::Terminate);
    }

    pub fn handle(&self) -> LifecycleHandle {
        LifecycleHandle {
            rx: self.tx.subscribe(),
        }
    }
}

impl LifecycleHandle {
    pub fn current(&self) -> Lifecycle {
        *self.rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.current() == Lifecycle::Running
    }

    /// Suspends until the lifecycle state changes. Task loops `select!` on
    /// this alongside their mailbox/socket read; on wakeup they re-test
    /// their loop-head condition rather than acting immediately, matching
    /// the "retry yield" semantics spec §4.1 describes for QUIESCE_REQUEST.
    pub async fn changed(&mut self) {
        let _ = self.rx.changed().await;
    }

    pub fn clone_handle(&self) -> LifecycleHandle {
        self.clone()
    }
}
