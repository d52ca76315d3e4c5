//! Evolution API adapter: [`EvolutionProvider`] implements the provider
//! contract against the Evolution backend.
//!
//! Error-handling split, kept auditable in this one file: lifecycle and
//! command methods (`initialize`, `connect`, `disconnect`, `restart`,
//! `set_webhook`) propagate vendor failures to the caller; status, send, and
//! enumeration methods degrade to typed failure values through the `soft_*`
//! helpers so polling and fire-and-forget callers never need to catch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::provider::{
    Chat, ConnectOutcome, ConnectionState, ConnectionStatus, Contact, HandlerRegistry,
    IncomingMessage, MessageHandler, MessageResult, OutboundPayload, ProviderConfig, ProviderError,
    QrCodeData, QrHandler, SendMessageParams, StatusHandler, WhatsAppProvider,
};

use super::client::{
    EvolutionApi, SendAck, SendButtonsRequest, SendListRequest, SendMediaRequest, SendTextRequest,
    WireButton, WireListRow, WireListSection,
};
use super::webhook;

/// JID suffix marking a group conversation.
pub(crate) const GROUP_JID_SUFFIX: &str = "@g.us";

/// Prefix of the data URI the QR payload is wrapped in.
const QR_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Map a raw Evolution state token to the canonical connection state.
///
/// Unrecognized tokens map to `Disconnected`: vendors add tokens over time
/// and an unknown one must not be read as a live session.
pub(crate) fn map_vendor_state(token: &str) -> ConnectionState {
    match token {
        "open" => ConnectionState::Connected,
        "connecting" => ConnectionState::Connecting,
        "close" => ConnectionState::Disconnected,
        "reconnecting" => ConnectionState::Reconnecting,
        _ => ConnectionState::Disconnected,
    }
}

/// Build a [`ConnectionStatus`] from a raw vendor state token.
pub(crate) fn status_from_token(token: &str, phone_number: Option<String>) -> ConnectionStatus {
    let state = map_vendor_state(token);
    match state {
        ConnectionState::Connected => ConnectionStatus::connected(phone_number),
        ConnectionState::Disconnected => ConnectionStatus::disconnected(),
        other => ConnectionStatus {
            state: other,
            is_authenticated: false,
            phone_number,
            last_seen: None,
            error: None,
        },
    }
}

/// Extract the bare phone number from a `number@server` JID.
fn phone_from_jid(jid: &str) -> String {
    jid.split('@').next().unwrap_or(jid).to_owned()
}

/// Wrap a raw pairing payload into [`QrCodeData`], tolerating vendors that
/// hand back an already-wrapped data URI.
pub(crate) fn qr_from_payload(payload: &str) -> QrCodeData {
    QrCodeData::from_raw(payload.strip_prefix(QR_DATA_URI_PREFIX).unwrap_or(payload))
}

/// Coarse Evolution media kind derived from a MIME type.
fn media_kind(mime_type: &str) -> &'static str {
    if mime_type.starts_with("image/") {
        "image"
    } else if mime_type.starts_with("video/") {
        "video"
    } else if mime_type.starts_with("audio/") {
        "audio"
    } else {
        "document"
    }
}

/// The Evolution adapter.
///
/// Holds no durable instance table: the vendor is the system of record for
/// instances, and the [`HandlerRegistry`] is the only local state.
pub struct EvolutionProvider {
    api: Arc<dyn EvolutionApi>,
    config: ProviderConfig,
    registry: Arc<HandlerRegistry>,
}

impl EvolutionProvider {
    /// Adapter over the given vendor client.
    pub fn new(api: Arc<dyn EvolutionApi>, config: ProviderConfig) -> Self {
        Self {
            api,
            config,
            registry: Arc::new(HandlerRegistry::new()),
        }
    }

    /// The handler registry, shared with the webhook dispatcher.
    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    /// A webhook dispatcher wired to this adapter's registry.
    pub fn dispatcher(&self) -> webhook::WebhookDispatcher {
        webhook::WebhookDispatcher::new(self.registry())
    }

    /// Convert a vendor send acknowledgement into a success result,
    /// generating a fallback id when the vendor omits one.
    fn result_from_ack(ack: SendAck) -> MessageResult {
        match ack.message_id {
            Some(id) => MessageResult::sent(id),
            None => MessageResult::sent(format!("wab-{}", uuid::Uuid::new_v4())),
        }
    }

    /// Route the resolved payload to the matching vendor send call.
    async fn dispatch_send(
        &self,
        instance_id: &str,
        params: &SendMessageParams,
        payload: OutboundPayload<'_>,
    ) -> Result<SendAck, ProviderError> {
        match payload {
            OutboundPayload::Media(media) => {
                media.validate()?;
                let content = media
                    .url
                    .clone()
                    .or_else(|| media.data.clone())
                    .unwrap_or_default();
                self.api
                    .send_media(
                        instance_id,
                        SendMediaRequest {
                            number: params.to.clone(),
                            mediatype: media_kind(&media.mime_type).to_owned(),
                            mimetype: media.mime_type.clone(),
                            media: content,
                            caption: media.caption.clone(),
                            file_name: media.filename.clone(),
                        },
                    )
                    .await
            }
            OutboundPayload::Buttons(buttons) => {
                self.api
                    .send_buttons(
                        instance_id,
                        SendButtonsRequest {
                            number: params.to.clone(),
                            title: params.text.clone().unwrap_or_default(),
                            buttons: buttons
                                .iter()
                                .map(|b| WireButton {
                                    id: b.id.clone(),
                                    title: b.label.clone(),
                                })
                                .collect(),
                        },
                    )
                    .await
            }
            OutboundPayload::List(list) => {
                self.api
                    .send_list(
                        instance_id,
                        SendListRequest {
                            number: params.to.clone(),
                            button_text: list.button_text.clone(),
                            sections: list
                                .sections
                                .iter()
                                .map(|s| WireListSection {
                                    title: s.title.clone(),
                                    rows: s
                                        .rows
                                        .iter()
                                        .map(|r| WireListRow {
                                            row_id: r.id.clone(),
                                            title: r.title.clone(),
                                            description: r.description.clone(),
                                        })
                                        .collect(),
                                })
                                .collect(),
                        },
                    )
                    .await
            }
            OutboundPayload::Text(text) => {
                self.api
                    .send_text(
                        instance_id,
                        SendTextRequest {
                            number: params.to.clone(),
                            text: text.to_owned(),
                            quoted: params.quoted_message_id.clone(),
                        },
                    )
                    .await
            }
        }
    }
}

/// Degrade an advisory enumeration failure to an empty list.
fn soft_list<T>(op: &'static str, result: Result<Vec<T>, ProviderError>) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!(op, error = %e, "advisory vendor call failed, returning empty");
            Vec::new()
        }
    }
}

#[async_trait]
impl WhatsAppProvider for EvolutionProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        self.api.probe().await?;
        info!(provider = %self.config.name, "Evolution endpoint reachable");
        Ok(())
    }

    async fn dispose(&self) {
        self.registry.clear_all();
    }

    async fn connect(
        &self,
        instance_id: &str,
        business_id: &str,
    ) -> Result<ConnectOutcome, ProviderError> {
        let instances = self.api.fetch_instances().await?;
        let existing = instances.iter().find(|i| i.name == instance_id);

        if let Some(info) = existing {
            if map_vendor_state(&info.state) == ConnectionState::Connected {
                debug!(instance_id, "instance already connected, skipping provisioning");
                let phone = info.owner_jid.as_deref().map(phone_from_jid);
                return Ok(ConnectOutcome::Status(ConnectionStatus::connected(phone)));
            }
        } else {
            self.api.create_instance(instance_id, business_id).await?;
        }

        let raw = self.api.connect_instance(instance_id).await?;
        let pairing_code = raw.pairing_code;
        let payload = raw.base64.or(raw.code).ok_or_else(|| {
            ProviderError::Parse("connect response carried no QR payload".to_owned())
        })?;
        info!(instance_id, business_id, "issued pairing QR");
        Ok(ConnectOutcome::Qr(
            qr_from_payload(&payload).with_pairing_code(pairing_code),
        ))
    }

    async fn disconnect(&self, instance_id: &str) -> Result<(), ProviderError> {
        let result = async {
            self.api.logout_instance(instance_id).await?;
            self.api.delete_instance(instance_id).await
        }
        .await;
        // Handlers go regardless: after a disconnect request nothing should
        // be delivered for this instance, even if the vendor call failed.
        self.registry.clear_instance(instance_id);
        info!(instance_id, "instance disconnected");
        result
    }

    async fn restart(&self, instance_id: &str) -> Result<(), ProviderError> {
        self.api.restart_instance(instance_id).await
    }

    async fn get_connection_status(&self, instance_id: &str) -> ConnectionStatus {
        match self.api.connection_state(instance_id).await {
            Ok(token) => status_from_token(&token, None),
            Err(e) => {
                warn!(instance_id, error = %e, "status poll failed");
                ConnectionStatus::failed(e.to_string())
            }
        }
    }

    async fn get_qr_code(&self, instance_id: &str) -> Result<QrCodeData, ProviderError> {
        let raw = self.api.connect_instance(instance_id).await?;
        let pairing_code = raw.pairing_code;
        let payload = raw.base64.or(raw.code).ok_or_else(|| {
            ProviderError::InstanceNotFound(instance_id.to_owned())
        })?;
        Ok(qr_from_payload(&payload).with_pairing_code(pairing_code))
    }

    async fn is_healthy(&self) -> bool {
        self.api.probe().await.is_ok()
    }

    async fn send_message(&self, instance_id: &str, params: SendMessageParams) -> MessageResult {
        let Some(payload) = params.payload() else {
            return MessageResult::failed(
                "invalid send parameters: no text, media, buttons, or list payload",
            );
        };
        match self.dispatch_send(instance_id, &params, payload).await {
            Ok(ack) => {
                debug!(instance_id, to = %params.to, "message accepted by vendor");
                Self::result_from_ack(ack)
            }
            Err(e) => {
                warn!(instance_id, to = %params.to, error = %e, "send failed");
                MessageResult::failed(e.to_string())
            }
        }
    }

    fn on_message(&self, instance_id: &str, handler: MessageHandler) {
        self.registry.set_message_handler(instance_id, handler);
    }

    fn on_status_change(&self, instance_id: &str, handler: StatusHandler) {
        self.registry.set_status_handler(instance_id, handler);
    }

    fn on_qr_code_updated(&self, instance_id: &str, handler: QrHandler) {
        self.registry.set_qr_handler(instance_id, handler);
    }

    async fn list_instances(&self) -> Vec<String> {
        soft_list("fetch_instances", self.api.fetch_instances().await)
            .into_iter()
            .map(|i| i.name)
            .collect()
    }

    fn supports_webhook_management(&self) -> bool {
        true
    }

    fn supports_history(&self) -> bool {
        true
    }

    async fn set_webhook(&self, instance_id: &str, url: &str) -> Result<(), ProviderError> {
        self.api.set_webhook(instance_id, url).await
    }

    /// Evolution exposes no webhook-delete endpoint; this always returns
    /// [`ProviderError::Unsupported`] so callers can detect the gap instead
    /// of assuming the hook was removed.
    async fn remove_webhook(&self, instance_id: &str) -> Result<(), ProviderError> {
        warn!(instance_id, "remove_webhook is not supported by Evolution");
        Err(ProviderError::Unsupported("remove_webhook"))
    }

    async fn fetch_contacts(&self, instance_id: &str) -> Vec<Contact> {
        soft_list("find_contacts", self.api.find_contacts(instance_id).await)
            .into_iter()
            .map(|c| {
                let phone = (!c.id.ends_with(GROUP_JID_SUFFIX)).then(|| phone_from_jid(&c.id));
                Contact {
                    jid: c.id,
                    name: c.name,
                    phone,
                }
            })
            .collect()
    }

    async fn fetch_chats(&self, instance_id: &str) -> Vec<Chat> {
        soft_list("find_chats", self.api.find_chats(instance_id).await)
            .into_iter()
            .map(|c| Chat {
                jid: c.id,
                name: c.name,
                unread_count: c.unread_count,
            })
            .collect()
    }

    async fn fetch_messages(
        &self,
        instance_id: &str,
        chat_jid: &str,
        limit: u32,
    ) -> Vec<IncomingMessage> {
        soft_list(
            "find_messages",
            self.api.find_messages(instance_id, chat_jid, limit).await,
        )
        .iter()
        .filter_map(|raw| webhook::normalize_message(instance_id, raw))
        .collect()
    }
}
