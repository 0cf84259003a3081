use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::event::{ListenerId, StoreEvent, StoreListener};

#[derive(Debug, Default)]
struct DeferralState {
    active: bool,
    queue: Vec<StoreEvent>,
}

/// Delivers store events to listeners, with an optional deferral window.
///
/// While deferral is active, [`EventDispatcher::defer_if_active`] queues the
/// event instead of handing it back. Checking the flag, queueing and
/// draining all happen under one lock, so an event is either queued before
/// [`EventDispatcher::end_deferral`] drains the queue or handed back to its
/// sender.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn StoreListener>)>>,
    next_id: AtomicU64,
    deferral: Mutex<DeferralState>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_listener(&self, listener: Arc<dyn StoreListener>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Deliver to every listener, in registration order
    pub fn dispatch(&self, event: &StoreEvent) {
        let listeners: Vec<_> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        log::debug!("Dispatching {} to {} listener(s)", event.name(), listeners.len());
        for listener in listeners {
            listener.on_event(event);
        }
    }

    pub fn begin_deferral(&self) {
        self.deferral.lock().active = true;
    }

    /// Queue `event` if deferral is active; otherwise hand it back
    pub fn defer_if_active(&self, event: StoreEvent) -> Option<StoreEvent> {
        let mut state = self.deferral.lock();
        if state.active {
            log::debug!("Deferring {}", event.name());
            state.queue.push(event);
            None
        } else {
            Some(event)
        }
    }

    /// Stop deferring and take the queued events, oldest first
    pub fn end_deferral(&self) -> Vec<StoreEvent> {
        let mut state = self.deferral.lock();
        state.active = false;
        std::mem::take(&mut state.queue)
    }

    pub fn is_deferring(&self) -> bool {
        self.deferral.lock().active
    }
}
