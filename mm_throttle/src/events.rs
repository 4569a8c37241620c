use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;

/// Notification that a pipeline's headroom dropped below its alert threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleEvent {
    /// Label of the pipeline that crossed its threshold
    pub label: Arc<str>,

    /// Remaining capacity as a fraction of the limit
    pub remaining_rate: f64,

    /// Remaining capacity in cost units
    pub remaining_cap: i64,
}

/// Callback invoked for every emitted event
pub type EventCallback = Arc<dyn Fn(&ThrottleEvent) + Send + Sync>;

/// Handle returned when registering a listener, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of event callbacks
///
/// Callbacks are invoked synchronously on the emitting task, after the
/// registry lock is released, so a listener may add or remove listeners.
#[derive(Default)]
pub struct EventListeners {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, EventCallback)>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn add<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ThrottleEvent) + Send + Sync + 'static,
    {
        self.add_arc(Arc::new(callback))
    }

    pub fn add_arc(&self, callback: EventCallback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, callback));
        id
    }

    /// Remove a callback, returning whether it was registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver `event` to every registered callback
    pub fn emit(&self, event: &ThrottleEvent) {
        let snapshot: Vec<EventCallback> = self.listeners.read().iter().map(|(_, callback)| Arc::clone(callback)).collect();
        for callback in snapshot {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl std::fmt::Debug for EventListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListeners").field("len", &self.len()).finish()
    }
}
