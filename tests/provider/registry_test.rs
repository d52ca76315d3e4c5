//! Handler registry replace/clear semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use wabridge::provider::{ConnectionStatus, HandlerRegistry, QrCodeData};

#[test]
fn status_handler_reregistration_replaces() {
    let registry = HandlerRegistry::new();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&first);
    registry.set_status_handler("clinic", Arc::new(move |_s| {
        c.fetch_add(1, Ordering::SeqCst);
    }));
    let c = Arc::clone(&second);
    registry.set_status_handler("clinic", Arc::new(move |_s| {
        c.fetch_add(1, Ordering::SeqCst);
    }));

    registry
        .status_handler("clinic")
        .expect("handler registered")(ConnectionStatus::disconnected());

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn handlers_are_scoped_per_instance() {
    let registry = HandlerRegistry::new();
    registry.set_qr_handler("a", Arc::new(|_q| {}));

    assert!(registry.qr_handler("a").is_some());
    assert!(registry.qr_handler("b").is_none());
}

#[test]
fn clear_all_empties_every_kind() {
    let registry = HandlerRegistry::new();
    registry.set_message_handler("a", Arc::new(|_m| {}));
    registry.set_status_handler("b", Arc::new(|_s| {}));
    registry.set_qr_handler("c", Arc::new(|_q: QrCodeData| {}));

    registry.clear_all();

    assert!(registry.message_handler("a").is_none());
    assert!(registry.status_handler("b").is_none());
    assert!(registry.qr_handler("c").is_none());
}
