//! In-memory handler registry: instance id → event callbacks.
//!
//! One map per handler kind. Registration is a plain overwrite (last writer
//! wins), so an instance has at most one callback per kind. Entries live in
//! process memory only and are cleared on `disconnect`/`dispose`; nothing is
//! persisted.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{MessageHandler, QrHandler, StatusHandler};

/// Shared registry of per-instance event callbacks.
#[derive(Default)]
pub struct HandlerRegistry {
    message: Mutex<HashMap<String, MessageHandler>>,
    status: Mutex<HashMap<String, StatusHandler>>,
    qr: Mutex<HashMap<String, QrHandler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the message callback for an instance, replacing any
    /// previous one.
    pub fn set_message_handler(&self, instance_id: &str, handler: MessageHandler) {
        self.lock_message().insert(instance_id.to_owned(), handler);
    }

    /// Register the status callback for an instance, replacing any
    /// previous one.
    pub fn set_status_handler(&self, instance_id: &str, handler: StatusHandler) {
        self.lock_status().insert(instance_id.to_owned(), handler);
    }

    /// Register the QR callback for an instance, replacing any previous one.
    pub fn set_qr_handler(&self, instance_id: &str, handler: QrHandler) {
        self.lock_qr().insert(instance_id.to_owned(), handler);
    }

    /// The message callback for an instance, if one is registered.
    pub fn message_handler(&self, instance_id: &str) -> Option<MessageHandler> {
        self.lock_message().get(instance_id).cloned()
    }

    /// The status callback for an instance, if one is registered.
    pub fn status_handler(&self, instance_id: &str) -> Option<StatusHandler> {
        self.lock_status().get(instance_id).cloned()
    }

    /// The QR callback for an instance, if one is registered.
    pub fn qr_handler(&self, instance_id: &str) -> Option<QrHandler> {
        self.lock_qr().get(instance_id).cloned()
    }

    /// Remove all three callback kinds for an instance.
    pub fn clear_instance(&self, instance_id: &str) {
        self.lock_message().remove(instance_id);
        self.lock_status().remove(instance_id);
        self.lock_qr().remove(instance_id);
    }

    /// Remove every registration for every instance.
    pub fn clear_all(&self) {
        self.lock_message().clear();
        self.lock_status().clear();
        self.lock_qr().clear();
    }

    // A poisoned lock means a handler panicked while we held the guard;
    // the maps themselves are still coherent, so keep serving them.
    fn lock_message(&self) -> std::sync::MutexGuard<'_, HashMap<String, MessageHandler>> {
        self.message.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, HashMap<String, StatusHandler>> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_qr(&self) -> std::sync::MutexGuard<'_, HashMap<String, QrHandler>> {
        self.qr.lock().unwrap_or_else(|e| e.into_inner())
    }
}
