//! UI-affinity execution context.
//!
//! Engine callbacks arrive on whatever thread the engine owns. Anything the UI
//! observes is written by closures queued here and executed, in order, by a
//! single [`UiLoop`].

use tokio::sync::mpsc;
use tracing::{debug, trace};

type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle used to queue work onto the UI loop.
#[derive(Clone)]
pub struct UiContext {
    sender: mpsc::UnboundedSender<UiTask>,
}

impl std::fmt::Debug for UiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiContext")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Executes queued UI work. There is exactly one per [`UiContext`] family.
pub struct UiLoop {
    receiver: mpsc::UnboundedReceiver<UiTask>,
}

pub fn ui_channel() -> (UiContext, UiLoop) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (UiContext { sender }, UiLoop { receiver })
}

impl UiContext {
    pub fn dispatch<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(task)).is_err() {
            trace!("UI loop has shut down, dropping task");
        }
    }
}

impl UiLoop {
    /// Run until every [`UiContext`] has been dropped.
    pub async fn run(mut self) {
        debug!("UI loop started");
        while let Some(task) = self.receiver.recv().await {
            task();
        }
        debug!("UI loop terminated");
    }

    /// Execute whatever is queued right now and return how many tasks ran.
    pub fn run_pending(&mut self) -> usize {
        let mut executed = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            executed += 1;
        }
        executed
    }
}
