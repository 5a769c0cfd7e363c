use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::trace;

struct Slot<T> {
    generation: u64,
    pending: Option<oneshot::Sender<T>>,
}

/// Keeps at most one outstanding request of a kind.
///
/// Starting a new request resolves the previous one with `T::default()`
/// (false for seeks, None for thumbnails). Every request resolves exactly once.
pub struct LatestRequest<T: Default + Send + 'static> {
    name: &'static str,
    slot: Arc<Mutex<Slot<T>>>,
}

/// Completion right for one request. Completing a superseded ticket is a no-op.
pub struct Ticket<T: Default + Send + 'static> {
    slot: Arc<Mutex<Slot<T>>>,
    generation: u64,
}

impl<T: Default + Send + 'static> LatestRequest<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                pending: None,
            })),
        }
    }

    pub fn begin(&self) -> (Ticket<T>, oneshot::Receiver<T>) {
        let (sender, receiver) = oneshot::channel();
        let mut slot = self.slot.lock().unwrap();
        slot.generation += 1;
        if let Some(previous) = slot.pending.replace(sender) {
            trace!("Superseding in-flight {} request", self.name);
            let _ = previous.send(T::default());
        }
        let ticket = Ticket {
            slot: self.slot.clone(),
            generation: slot.generation,
        };
        (ticket, receiver)
    }

    /// Resolve the outstanding request, if any, with `T::default()`.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.generation += 1;
        if let Some(previous) = slot.pending.take() {
            trace!("Cancelling in-flight {} request", self.name);
            let _ = previous.send(T::default());
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().unwrap().pending.is_some()
    }
}

impl<T: Default + Send + 'static> Ticket<T> {
    /// Returns false when a newer request already took this one's place.
    pub fn complete(self, value: T) -> bool {
        let mut slot = self.slot.lock().unwrap();
        if slot.generation != self.generation {
            return false;
        }
        match slot.pending.take() {
            Some(sender) => {
                let _ = sender.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_current(&self) -> bool {
        self.slot.lock().unwrap().generation == self.generation
    }
}

// A ticket lost without an answer (engine thread gone, callback dropped)
// still resolves its caller.
impl<T: Default + Send + 'static> Drop for Ticket<T> {
    fn drop(&mut self) {
        let Ok(mut slot) = self.slot.lock() else {
            return;
        };
        if slot.generation != self.generation {
            return;
        }
        if let Some(sender) = slot.pending.take() {
            trace!("Dropped ticket resolves with default");
            let _ = sender.send(T::default());
        }
    }
}
