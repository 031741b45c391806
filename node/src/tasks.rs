//! Supervised background tasks.
//!
//! Role-scoped loops (block proposal, leader watchdog, validator discovery)
//! run in a [`TaskGroup`]. Cancelling the group signals every task and
//! aborts any that have not exited, so a demoted node stops proposing
//! immediately instead of on its next wake-up.

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::shutdown::ShutdownController;

#[derive(Debug)]
pub struct TaskGroup {
    name: &'static str,
    cancel: ShutdownController,
    handles: Vec<JoinHandle<()>>,
}

impl TaskGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cancel: ShutdownController::new(),
            handles: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spawn a task. It receives the group's cancellation receiver and
    /// should `select!` on it.
    pub fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let rx = self.cancel.subscribe();
        self.handles.push(tokio::spawn(task(rx)));
    }

    /// Tasks that have not finished yet.
    pub fn running(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    pub fn cancel(&mut self) {
        self.cancel.shutdown();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        tracing::debug!(group = self.name, "task group cancelled");
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.cancel();
    }
}
