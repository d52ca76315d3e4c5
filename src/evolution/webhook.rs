//! Webhook dispatcher: classify Evolution webhook envelopes, normalize
//! their payloads, and deliver them to registered handlers.
//!
//! The dispatcher never fails the caller. Unknown events, malformed
//! payloads, and missing handlers are all logged and swallowed so the HTTP
//! endpoint in front of it can unconditionally ack 2xx — a vendor that sees
//! errors starts retrying and backs the queue up.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::provider::{HandlerRegistry, IncomingMessage, MessageKind};

use super::adapter::{qr_from_payload, status_from_token, GROUP_JID_SUFFIX};

/// The JSON body Evolution pushes on every event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    /// Raw event name, e.g. `messages.upsert` or `MESSAGES_UPSERT`.
    pub event: String,
    /// Instance the event belongs to.
    #[serde(default)]
    pub instance: String,
    /// Event-specific payload.
    #[serde(default)]
    pub data: Value,
}

/// Marker sub-objects checked, in priority order, to derive the message
/// kind. First match wins; no match means plain text.
const KIND_MARKERS: &[(&str, MessageKind)] = &[
    ("imageMessage", MessageKind::Image),
    ("videoMessage", MessageKind::Video),
    ("audioMessage", MessageKind::Audio),
    ("documentMessage", MessageKind::Document),
    ("locationMessage", MessageKind::Location),
    ("contactMessage", MessageKind::Contact),
];

/// Delivers normalized webhook events to the handler registry.
pub struct WebhookDispatcher {
    registry: Arc<HandlerRegistry>,
}

impl WebhookDispatcher {
    /// Dispatcher over the given registry (shared with the adapter).
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Classify and dispatch one envelope.
    ///
    /// Infallible by contract: every internal problem is logged, nothing
    /// propagates to the webhook HTTP response path.
    pub fn dispatch(&self, envelope: &WebhookEnvelope) {
        if envelope.instance.is_empty() {
            warn!(event = %envelope.event, "webhook envelope without instance, dropping");
            return;
        }
        match canonical_event(&envelope.event).as_str() {
            "MESSAGES_UPSERT" => self.dispatch_messages(&envelope.instance, &envelope.data),
            "CONNECTION_UPDATE" => self.dispatch_connection(&envelope.instance, &envelope.data),
            "QRCODE_UPDATED" => self.dispatch_qr(&envelope.instance, &envelope.data),
            other => {
                // Vendors add event kinds over time; ignore what we don't know.
                debug!(event = other, instance = %envelope.instance, "ignoring unrecognized webhook event");
            }
        }
    }

    fn dispatch_messages(&self, instance_id: &str, data: &Value) {
        let Some(handler) = self.registry.message_handler(instance_id) else {
            // No subscriber yet for this channel; not an error.
            debug!(instance_id, "inbound message with no registered handler, dropping");
            return;
        };
        for raw in raw_messages(data) {
            match normalize_message(instance_id, raw) {
                Some(message) => handler(message),
                None => {
                    warn!(instance_id, "inbound message payload missing id or sender, skipping");
                }
            }
        }
    }

    fn dispatch_connection(&self, instance_id: &str, data: &Value) {
        let Some(token) = first_str(data, &["/state", "/connection", "/status"]) else {
            warn!(instance_id, "connection update without a state token, dropping");
            return;
        };
        let status = status_from_token(token, first_str(data, &["/phoneNumber"]).map(str::to_owned));
        debug!(instance_id, state = status.state.as_str(), "connection update");
        if let Some(handler) = self.registry.status_handler(instance_id) {
            handler(status);
        }
    }

    fn dispatch_qr(&self, instance_id: &str, data: &Value) {
        let payload = data
            .get("qrcode")
            .and_then(Value::as_str)
            .or_else(|| first_str(data, &["/qrcode/base64", "/qrcode/code", "/base64", "/code"]));
        let Some(payload) = payload else {
            warn!(instance_id, "QR update without a code payload, dropping");
            return;
        };
        if let Some(handler) = self.registry.qr_handler(instance_id) {
            handler(qr_from_payload(payload));
        } else {
            debug!(instance_id, "QR update with no registered handler, dropping");
        }
    }
}

/// Uppercase the event name and fold `.` separators to `_`, so the two
/// spellings Evolution has shipped classify identically.
fn canonical_event(event: &str) -> String {
    event.to_ascii_uppercase().replace('.', "_")
}

/// The message array of an upsert payload.
///
/// Evolution wraps messages in `data.messages`; some builds push a single
/// message object as `data` directly.
fn raw_messages(data: &Value) -> Vec<&Value> {
    match data.get("messages").and_then(Value::as_array) {
        Some(messages) => messages.iter().collect(),
        None if data.is_object() => vec![data],
        None => Vec::new(),
    }
}

/// First string found at any of the given JSON pointers.
fn first_str<'a>(value: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_str))
}

/// First boolean found at any of the given JSON pointers.
fn first_bool(value: &Value, pointers: &[&str]) -> Option<bool> {
    pointers
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_bool))
}

/// Message timestamp: Unix seconds as number or numeric string, defaulting
/// to now when absent or unparseable.
fn message_timestamp(raw: &Value) -> DateTime<Utc> {
    let secs = match raw.get("messageTimestamp") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_else(Utc::now)
}

/// Derive the content kind from vendor marker sub-objects, in priority
/// order; plain text when none match.
fn message_kind(raw: &Value) -> MessageKind {
    let Some(content) = raw.get("message") else {
        return MessageKind::Text;
    };
    for (marker, kind) in KIND_MARKERS {
        if content.get(marker).is_some() {
            return *kind;
        }
    }
    MessageKind::Text
}

/// Media URL and MIME type from the matched marker sub-object, if any.
fn media_fields(raw: &Value, kind: MessageKind) -> (Option<String>, Option<String>) {
    let marker = KIND_MARKERS
        .iter()
        .find(|(_, k)| *k == kind)
        .map(|(m, _)| *m);
    let Some(marker) = marker else {
        return (None, None);
    };
    let url = raw
        .pointer(&format!("/message/{marker}/url"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    let mime = raw
        .pointer(&format!("/message/{marker}/mimetype"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    (url, mime)
}

/// Normalize one raw vendor message into the canonical envelope.
///
/// Aliased fields resolve through fixed fallback chains; a message without
/// a resolvable id and sender is unroutable and yields `None`.
pub(crate) fn normalize_message(instance_id: &str, raw: &Value) -> Option<IncomingMessage> {
    let id = first_str(raw, &["/key/id", "/id", "/messageId"])?.to_owned();
    let from = first_str(raw, &["/key/remoteJid", "/remoteJid", "/from"])?.to_owned();

    let body = first_str(
        raw,
        &[
            "/body",
            "/text",
            "/conversation",
            "/message/conversation",
            "/message/extendedTextMessage/text",
        ],
    )
    .map(str::to_owned);

    let kind = message_kind(raw);
    let (media_url, mime_type) = media_fields(raw, kind);
    let is_group = from.contains(GROUP_JID_SUFFIX);

    Some(IncomingMessage {
        id,
        from,
        to: instance_id.to_owned(),
        body,
        kind,
        media_url,
        mime_type,
        timestamp: message_timestamp(raw),
        is_from_me: first_bool(raw, &["/key/fromMe", "/fromMe"]).unwrap_or(false),
        is_group,
        group_participant: is_group
            .then(|| first_str(raw, &["/key/participant", "/participant"]).map(str::to_owned))
            .flatten(),
        sender_name: first_str(raw, &["/pushName"]).map(str::to_owned),
        quoted_message_id: first_str(
            raw,
            &[
                "/message/extendedTextMessage/contextInfo/stanzaId",
                "/contextInfo/stanzaId",
                "/quotedMessageId",
            ],
        )
        .map(str::to_owned),
    })
}
