use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{EventDispatcher, StoreEvent, StoreListener};

#[derive(Debug, Default)]
struct RecordingListener {
    seen: Mutex<Vec<StoreEvent>>,
}

impl StoreListener for RecordingListener {
    fn on_event(&self, event: &StoreEvent) {
        self.seen.lock().push(event.clone());
    }
}

#[test]
fn test_listener_registration_and_dispatch() {
    let dispatcher = EventDispatcher::new();
    let listener = Arc::new(RecordingListener::default());
    let id = dispatcher.register_listener(listener.clone());

    dispatcher.dispatch(&StoreEvent::ComponentReloaded("Editor".to_string()));
    assert_eq!(listener.seen.lock().len(), 1);

    assert!(dispatcher.unregister_listener(id));
    assert!(!dispatcher.unregister_listener(id), "second unregister is a no-op");

    dispatcher.dispatch(&StoreEvent::ComponentReloaded("Editor".to_string()));
    assert_eq!(listener.seen.lock().len(), 1, "unregistered listener is not called");
}

#[test]
fn test_events_are_handed_back_without_deferral() {
    let dispatcher = EventDispatcher::new();
    let event = StoreEvent::FilesChanged(vec![PathBuf::from("/tmp/a.xml")]);
    assert_eq!(dispatcher.defer_if_active(event.clone()), Some(event));
    assert!(dispatcher.end_deferral().is_empty());
}

#[test]
fn test_deferred_events_are_drained_in_order() {
    let dispatcher = EventDispatcher::new();
    dispatcher.begin_deferral();
    assert!(dispatcher.is_deferring());

    let first = StoreEvent::FilesChanged(vec![PathBuf::from("/tmp/a.xml")]);
    let second = StoreEvent::FilesChanged(vec![PathBuf::from("/tmp/b.xml")]);
    assert_eq!(dispatcher.defer_if_active(first.clone()), None);
    assert_eq!(dispatcher.defer_if_active(second.clone()), None);

    assert_eq!(dispatcher.end_deferral(), vec![first, second]);
    assert!(!dispatcher.is_deferring());
    assert!(dispatcher.end_deferral().is_empty(), "queue is drained once");
}

#[test]
fn test_event_names() {
    assert_eq!(StoreEvent::FilesChanged(Vec::new()).name(), "store.files_changed");
    assert_eq!(
        StoreEvent::SaveCompleted { changed: Vec::new(), failed: 0 }.name(),
        "store.save_completed"
    );
}
