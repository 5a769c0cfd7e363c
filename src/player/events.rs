use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

pub type SubscriptionId = u64;

pub type Listener<E> = Box<dyn Fn(&E) + Send + Sync + 'static>;

/// Observer registry an engine uses to deliver its notifications.
///
/// Listeners are called on the emitting thread, outside the registry lock, so
/// a listener may subscribe or unsubscribe without deadlocking.
pub struct Listeners<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, Arc<Listener<E>>)>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Listener<E>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));
        trace!("Listener {} subscribed", id);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if removed {
            trace!("Listener {} unsubscribed", id);
        }
        removed
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Arc<Listener<E>>> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
