//! Webhook classification and normalization.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use wabridge::evolution::{WebhookDispatcher, WebhookEnvelope};
use wabridge::provider::{
    ConnectionState, ConnectionStatus, HandlerRegistry, IncomingMessage, MessageKind, QrCodeData,
};

fn envelope(event: &str, instance: &str, data: serde_json::Value) -> WebhookEnvelope {
    serde_json::from_value(json!({
        "event": event,
        "instance": instance,
        "data": data,
    }))
    .expect("envelope deserializes")
}

fn capture_messages(
    registry: &HandlerRegistry,
    instance: &str,
) -> Arc<Mutex<Vec<IncomingMessage>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    registry.set_message_handler(
        instance,
        Arc::new(move |msg| {
            sink.lock().expect("sink lock").push(msg);
        }),
    );
    seen
}

#[test]
fn upsert_scenario_normalizes_text_message() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = capture_messages(&registry, "vet-01");
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "MESSAGES_UPSERT",
        "vet-01",
        json!({
            "messages": [{
                "id": "m1",
                "remoteJid": "5511999@s.whatsapp.net",
                "conversation": "hi",
                "messageTimestamp": 1700000000,
            }]
        }),
    ));

    let seen = seen.lock().expect("sink lock");
    assert_eq!(seen.len(), 1);
    let msg = &seen[0];
    assert_eq!(msg.id, "m1");
    assert_eq!(msg.from, "5511999@s.whatsapp.net");
    assert_eq!(msg.to, "vet-01");
    assert_eq!(msg.kind, MessageKind::Text);
    assert_eq!(msg.body.as_deref(), Some("hi"));
    assert!(!msg.is_group);
    assert!(!msg.is_from_me);
    assert_eq!(msg.timestamp.timestamp(), 1700000000);
}

#[test]
fn lowercase_event_spelling_classifies_identically() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = capture_messages(&registry, "vet-01");
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "messages.upsert",
        "vet-01",
        json!({ "messages": [{ "id": "m2", "remoteJid": "5@s.whatsapp.net" }] }),
    ));

    assert_eq!(seen.lock().expect("sink lock").len(), 1);
}

#[test]
fn group_message_detects_group_and_participant() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = capture_messages(&registry, "vet-01");
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "MESSAGES_UPSERT",
        "vet-01",
        json!({
            "messages": [{
                "key": {
                    "id": "g1",
                    "remoteJid": "123456-town@g.us",
                    "participant": "5511999@s.whatsapp.net",
                },
                "message": { "conversation": "group hello" },
                "pushName": "Ana",
            }]
        }),
    ));

    let seen = seen.lock().expect("sink lock");
    assert!(seen[0].is_group);
    assert_eq!(
        seen[0].group_participant.as_deref(),
        Some("5511999@s.whatsapp.net")
    );
    assert_eq!(seen[0].sender_name.as_deref(), Some("Ana"));
    assert_eq!(seen[0].body.as_deref(), Some("group hello"));
}

#[test]
fn image_marker_wins_and_carries_media_fields() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = capture_messages(&registry, "vet-01");
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "MESSAGES_UPSERT",
        "vet-01",
        json!({
            "messages": [{
                "key": { "id": "i1", "remoteJid": "5@s.whatsapp.net" },
                "message": {
                    "imageMessage": {
                        "url": "https://mmg.whatsapp.net/x.enc",
                        "mimetype": "image/jpeg",
                    }
                }
            }]
        }),
    ));

    let seen = seen.lock().expect("sink lock");
    assert_eq!(seen[0].kind, MessageKind::Image);
    assert_eq!(seen[0].media_url.as_deref(), Some("https://mmg.whatsapp.net/x.enc"));
    assert_eq!(seen[0].mime_type.as_deref(), Some("image/jpeg"));
}

#[test]
fn second_registered_handler_receives_instead_of_first() {
    let registry = Arc::new(HandlerRegistry::new());
    let first = capture_messages(&registry, "vet-01");
    let second = capture_messages(&registry, "vet-01");
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "MESSAGES_UPSERT",
        "vet-01",
        json!({ "messages": [{ "id": "m3", "remoteJid": "5@s.whatsapp.net" }] }),
    ));

    assert!(first.lock().expect("sink lock").is_empty());
    assert_eq!(second.lock().expect("sink lock").len(), 1);
}

#[test]
fn unregistered_instance_drops_silently() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = capture_messages(&registry, "vet-01");
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "MESSAGES_UPSERT",
        "vet-99",
        json!({ "messages": [{ "id": "m4", "remoteJid": "5@s.whatsapp.net" }] }),
    ));

    assert!(seen.lock().expect("sink lock").is_empty());
}

#[test]
fn unknown_event_invokes_nothing() {
    let registry = Arc::new(HandlerRegistry::new());
    let messages = capture_messages(&registry, "vet-01");
    let statuses = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&statuses);
    registry.set_status_handler(
        "vet-01",
        Arc::new(move |_s: ConnectionStatus| {
            count.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope("CALL_OFFERED", "vet-01", json!({ "weird": true })));

    assert!(messages.lock().expect("sink lock").is_empty());
    assert_eq!(statuses.load(Ordering::SeqCst), 0);
}

#[test]
fn malformed_message_payload_does_not_panic() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = capture_messages(&registry, "vet-01");
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope("MESSAGES_UPSERT", "vet-01", json!("not an object")));
    dispatcher.dispatch(&envelope(
        "MESSAGES_UPSERT",
        "vet-01",
        json!({ "messages": [{ "body": "no id or sender" }] }),
    ));

    assert!(seen.lock().expect("sink lock").is_empty());
}

#[test]
fn connection_update_maps_state_and_reaches_handler() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    registry.set_status_handler(
        "vet-01",
        Arc::new(move |status| {
            sink.lock().expect("sink lock").push(status);
        }),
    );
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "CONNECTION_UPDATE",
        "vet-01",
        json!({ "state": "open" }),
    ));
    dispatcher.dispatch(&envelope(
        "connection.update",
        "vet-01",
        json!({ "state": "glitched" }),
    ));

    let seen = seen.lock().expect("sink lock");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].state, ConnectionState::Connected);
    assert!(seen[0].is_authenticated);
    // Unmapped tokens read as disconnected, never as a live session.
    assert_eq!(seen[1].state, ConnectionState::Disconnected);
}

#[test]
fn qr_update_wraps_code_into_data_uri() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::<QrCodeData>::new()));
    let sink = Arc::clone(&seen);
    registry.set_qr_handler(
        "vet-01",
        Arc::new(move |qr| {
            sink.lock().expect("sink lock").push(qr);
        }),
    );
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "QRCODE_UPDATED",
        "vet-01",
        json!({ "qrcode": "QRPAYLOAD" }),
    ));

    let seen = seen.lock().expect("sink lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].base64.as_deref(), Some("QRPAYLOAD"));
    assert_eq!(seen[0].url.as_deref(), Some("data:image/png;base64,QRPAYLOAD"));
}

#[test]
fn nested_qr_payload_resolves_through_fallback_chain() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::<QrCodeData>::new()));
    let sink = Arc::clone(&seen);
    registry.set_qr_handler(
        "vet-01",
        Arc::new(move |qr| {
            sink.lock().expect("sink lock").push(qr);
        }),
    );
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "QRCODE_UPDATED",
        "vet-01",
        json!({ "qrcode": { "base64": "NESTED" } }),
    ));

    assert_eq!(
        seen.lock().expect("sink lock")[0].base64.as_deref(),
        Some("NESTED")
    );
}

#[test]
fn envelope_without_instance_is_dropped() {
    let registry = Arc::new(HandlerRegistry::new());
    let seen = capture_messages(&registry, "");
    let dispatcher = WebhookDispatcher::new(Arc::clone(&registry));

    dispatcher.dispatch(&envelope(
        "MESSAGES_UPSERT",
        "",
        json!({ "messages": [{ "id": "m5", "remoteJid": "5@s.whatsapp.net" }] }),
    ));

    assert!(seen.lock().expect("sink lock").is_empty());
}
