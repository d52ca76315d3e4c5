//! WhatsApp provider abstraction layer.
//!
//! Defines the [`WhatsAppProvider`] trait and the canonical, vendor-agnostic
//! data shapes shared by all adapter implementations.
//!
//! One adapter is implemented:
//! - [`crate::evolution::EvolutionProvider`] — Evolution API backend
//!
//! Callers depend only on the trait; when several adapters are configured,
//! [`ProviderConfig::priority`] orders them for selection and failover.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod registry;

pub use config::{ProviderConfig, ProviderOverrides, RateLimit};
pub use registry::HandlerRegistry;

// ---------------------------------------------------------------------------
// Connection model
// ---------------------------------------------------------------------------

/// Canonical connection state of one vendor-side instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Pairing or session handshake in progress.
    Connecting,
    /// Session established and authenticated.
    Connected,
    /// No active session.
    Disconnected,
    /// Session dropped, vendor is re-establishing it.
    Reconnecting,
    /// Last operation against the vendor failed.
    Failed,
}

impl ConnectionState {
    /// Lowercase token for log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

/// Point-in-time connection status of an instance.
///
/// The vendor is the system of record; adapters never persist this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Canonical state.
    pub state: ConnectionState,
    /// Whether the session has completed pairing.
    pub is_authenticated: bool,
    /// Phone number linked to the session, if known.
    pub phone_number: Option<String>,
    /// Last time the vendor reported activity, if known.
    pub last_seen: Option<DateTime<Utc>>,
    /// Error detail when `state` is [`ConnectionState::Failed`].
    pub error: Option<String>,
}

impl ConnectionStatus {
    /// Status for an authenticated, open session.
    pub fn connected(phone_number: Option<String>) -> Self {
        Self {
            state: ConnectionState::Connected,
            is_authenticated: true,
            phone_number,
            last_seen: Some(Utc::now()),
            error: None,
        }
    }

    /// Status for an instance with no active session.
    pub fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            is_authenticated: false,
            phone_number: None,
            last_seen: None,
            error: None,
        }
    }

    /// Status carrying a vendor or transport failure.
    ///
    /// Used by fail-soft status paths: polling callers receive this instead
    /// of an error so a status loop never has to handle exceptions.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Failed,
            is_authenticated: false,
            phone_number: None,
            last_seen: None,
            error: Some(error.into()),
        }
    }
}

/// QR pairing payload, valid only until the instance authenticates or the
/// code expires vendor-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCodeData {
    /// Raw code payload as handed out by the vendor.
    pub qr_code: String,
    /// Base64 image bytes, when available.
    pub base64: Option<String>,
    /// Ready-to-render `data:image/png;base64,…` URL derived from `base64`.
    pub url: Option<String>,
    /// Phone-entry pairing code alternative, when the vendor offers one.
    pub pairing_code: Option<String>,
}

impl QrCodeData {
    /// Wrap a raw base64 code, deriving the displayable data URI.
    pub fn from_raw(code: impl Into<String>) -> Self {
        let code = code.into();
        let url = format!("data:image/png;base64,{code}");
        Self {
            qr_code: code.clone(),
            base64: Some(code),
            url: Some(url),
            pairing_code: None,
        }
    }

    /// Attach the vendor's phone-entry pairing code.
    pub fn with_pairing_code(mut self, code: Option<String>) -> Self {
        self.pairing_code = code;
        self
    }
}

/// Result of a [`WhatsAppProvider::connect`] call: either a fresh pairing
/// code for a new instance, or the current status of an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// New instance provisioned; scan this code to pair.
    Qr(QrCodeData),
    /// Instance already exists and is connected.
    Status(ConnectionStatus),
}

// ---------------------------------------------------------------------------
// Outbound model
// ---------------------------------------------------------------------------

/// Media attachment for an outbound message.
///
/// Exactly one of `url` / `data` is expected; inline `data` must be valid
/// base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaContent {
    /// Publicly fetchable media URL.
    pub url: Option<String>,
    /// Inline base64-encoded media bytes.
    pub data: Option<String>,
    /// MIME type of the media.
    pub mime_type: String,
    /// Caption shown under the media.
    pub caption: Option<String>,
    /// Filename hint, used for documents.
    pub filename: Option<String>,
}

impl MediaContent {
    /// Validate the payload before any vendor call is attempted.
    pub fn validate(&self) -> Result<(), ProviderError> {
        match (&self.url, &self.data) {
            (None, None) => Err(ProviderError::InvalidParams(
                "media requires either url or data".to_owned(),
            )),
            (_, Some(data)) => {
                use base64::Engine as _;
                base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map(|_| ())
                    .map_err(|e| {
                        ProviderError::InvalidParams(format!("media data is not valid base64: {e}"))
                    })
            }
            _ => Ok(()),
        }
    }
}

/// One tappable button in a buttons message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageButton {
    /// Caller-chosen identifier echoed back on reply.
    pub id: String,
    /// Button label shown to the recipient.
    pub label: String,
}

/// A selectable row inside a list section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    /// Caller-chosen identifier echoed back on selection.
    pub id: String,
    /// Row title.
    pub title: String,
    /// Optional secondary line.
    pub description: Option<String>,
}

/// A titled group of rows in a list message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSection {
    /// Section heading.
    pub title: String,
    /// Rows in this section.
    pub rows: Vec<ListRow>,
}

/// Interactive list message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListContent {
    /// Label of the button that opens the list.
    pub button_text: String,
    /// Sections shown when the list is opened.
    pub sections: Vec<ListSection>,
}

/// Parameters for one outbound send.
///
/// The payload fields are mutually exclusive in intent; when more than one
/// is populated, [`SendMessageParams::payload`] resolves the winner by a
/// fixed precedence (media, then buttons, then list, then text). A call with
/// none populated is rejected before any vendor round-trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageParams {
    /// Destination JID or phone number.
    pub to: String,
    /// Plain text payload.
    pub text: Option<String>,
    /// Media payload.
    pub media: Option<MediaContent>,
    /// Buttons payload.
    pub buttons: Option<Vec<MessageButton>>,
    /// Interactive list payload.
    pub list: Option<ListContent>,
    /// Id of a message this one quotes, if any.
    pub quoted_message_id: Option<String>,
}

impl SendMessageParams {
    /// Plain-text params for the given destination.
    pub fn text(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Media params for the given destination.
    pub fn media(to: impl Into<String>, media: MediaContent) -> Self {
        Self {
            to: to.into(),
            media: Some(media),
            ..Self::default()
        }
    }

    /// Resolve which payload kind this send carries.
    ///
    /// Precedence: media, buttons, list, text. Returns `None` when no
    /// recognized payload is populated; adapters reject such calls without
    /// contacting the vendor.
    pub fn payload(&self) -> Option<OutboundPayload<'_>> {
        if let Some(media) = &self.media {
            return Some(OutboundPayload::Media(media));
        }
        if let Some(buttons) = &self.buttons {
            return Some(OutboundPayload::Buttons(buttons));
        }
        if let Some(list) = &self.list {
            return Some(OutboundPayload::List(list));
        }
        self.text.as_deref().map(OutboundPayload::Text)
    }
}

/// The resolved payload of a send, borrowed from [`SendMessageParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundPayload<'a> {
    /// Plain text.
    Text(&'a str),
    /// Media attachment.
    Media(&'a MediaContent),
    /// Button set.
    Buttons(&'a [MessageButton]),
    /// Interactive list.
    List(&'a ListContent),
}

// ---------------------------------------------------------------------------
// Inbound model
// ---------------------------------------------------------------------------

/// Content kind of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Image attachment.
    Image,
    /// Video attachment.
    Video,
    /// Audio or voice note.
    Audio,
    /// Document attachment.
    Document,
    /// Shared location.
    Location,
    /// Shared contact card.
    Contact,
}

/// Normalized inbound message envelope, vendor-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Vendor-assigned message id.
    pub id: String,
    /// Sender JID (for groups, the group JID).
    pub from: String,
    /// Receiving instance id.
    pub to: String,
    /// Text body, when present.
    pub body: Option<String>,
    /// Content kind.
    pub kind: MessageKind,
    /// Media URL for media kinds, when the vendor exposes one.
    pub media_url: Option<String>,
    /// MIME type for media kinds.
    pub mime_type: Option<String>,
    /// When the message was sent.
    pub timestamp: DateTime<Utc>,
    /// Whether this instance's own number sent it.
    pub is_from_me: bool,
    /// Whether the conversation is a group chat.
    pub is_group: bool,
    /// In groups, the JID of the actual sender.
    pub group_participant: Option<String>,
    /// Display name of the sender, if pushed by the vendor.
    pub sender_name: Option<String>,
    /// Id of the message this one quotes, if any.
    pub quoted_message_id: Option<String>,
}

/// A directory contact as reported by the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// WhatsApp JID.
    pub jid: String,
    /// Display name, if known.
    pub name: Option<String>,
    /// Phone number, if known.
    pub phone: Option<String>,
}

/// An open conversation as reported by the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Conversation JID.
    pub jid: String,
    /// Conversation title, if known.
    pub name: Option<String>,
    /// Unread message count, if reported.
    pub unread_count: Option<u32>,
}

// ---------------------------------------------------------------------------
// Send result
// ---------------------------------------------------------------------------

/// Delivery status of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted by the vendor.
    Sent,
    /// Delivered to the recipient device.
    Delivered,
    /// Read by the recipient.
    Read,
    /// Send failed; see `error`.
    Failed,
}

/// Outcome of one send call.
///
/// Send paths never raise: failures come back as `status == Failed` with a
/// generated fallback id, so calling code branches on the result instead of
/// handling errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResult {
    /// Vendor-assigned id, or a generated fallback on failure.
    pub id: String,
    /// Delivery status.
    pub status: MessageStatus,
    /// When the result was produced.
    pub timestamp: DateTime<Utc>,
    /// Failure detail when `status` is [`MessageStatus::Failed`].
    pub error: Option<String>,
}

impl MessageResult {
    /// Successful result with the vendor-assigned id.
    pub fn sent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: MessageStatus::Sent,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Failed result with a generated fallback id.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            id: format!("wab-{}", uuid::Uuid::new_v4()),
            status: MessageStatus::Failed,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Handler callbacks
// ---------------------------------------------------------------------------

/// Callback invoked for each normalized inbound message.
pub type MessageHandler = Arc<dyn Fn(IncomingMessage) + Send + Sync>;

/// Callback invoked on connection status changes.
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Callback invoked when a fresh pairing QR is issued.
pub type QrHandler = Arc<dyn Fn(QrCodeData) + Send + Sync>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors crossing the provider contract boundary.
///
/// Only command operations (`connect`, `disconnect`, `restart`,
/// `set_webhook`) and `initialize` surface these to callers; status, send,
/// and enumeration paths convert them into typed failure values instead.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure (includes timeouts).
    #[error("vendor request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Vendor responded with a non-success status.
    #[error("vendor returned status {status}: {body}")]
    Vendor {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Vendor response did not match the expected shape.
    #[error("vendor response parse error: {0}")]
    Parse(String),

    /// Caller-supplied parameters were rejected before any vendor call.
    #[error("invalid send parameters: {0}")]
    InvalidParams(String),

    /// The adapter does not implement this optional capability.
    #[error("capability not supported by this adapter: {0}")]
    Unsupported(&'static str),

    /// No vendor-side instance exists under this id.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// Adapter construction or initialization failed.
    #[error("adapter setup failed: {0}")]
    Setup(String),
}

// ---------------------------------------------------------------------------
// Provider contract
// ---------------------------------------------------------------------------

/// Capability set every WhatsApp backend adapter must satisfy.
///
/// Methods are grouped by concern: lifecycle, connection management,
/// status/health, messaging, session persistence, event subscription, and
/// instance introspection. Optional capabilities carry probe methods
/// ([`supports_webhook_management`](Self::supports_webhook_management),
/// [`supports_history`](Self::supports_history)) and default to unsupported;
/// callers probe before invoking rather than assume availability.
///
/// Operations against different instance ids are fully independent.
/// Operations against the same id are not serialized by the adapter; a
/// caller needing strict ordering serializes at the call site.
#[async_trait]
pub trait WhatsAppProvider: Send + Sync {
    /// The configuration this adapter was constructed with.
    fn config(&self) -> &ProviderConfig;

    // --- lifecycle ---

    /// Verify the vendor endpoint is reachable.
    ///
    /// # Errors
    ///
    /// Fails fast on an unreachable vendor: the adapter is unusable and the
    /// host should treat this as fatal.
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Release in-memory handler state for all instances.
    async fn dispose(&self);

    // --- connection management ---

    /// Connect the given instance, provisioning it vendor-side if needed.
    ///
    /// Idempotent for already-connected instances: returns their status
    /// without provisioning. Otherwise returns a fresh pairing QR.
    ///
    /// # Errors
    ///
    /// Command path: vendor failures propagate to the caller.
    async fn connect(
        &self,
        instance_id: &str,
        business_id: &str,
    ) -> Result<ConnectOutcome, ProviderError>;

    /// Tear down the instance and clear its handler registrations.
    ///
    /// # Errors
    ///
    /// Command path: vendor failures propagate to the caller.
    async fn disconnect(&self, instance_id: &str) -> Result<(), ProviderError>;

    /// Restart the vendor-side instance.
    ///
    /// # Errors
    ///
    /// Command path: vendor failures propagate to the caller.
    async fn restart(&self, instance_id: &str) -> Result<(), ProviderError>;

    // --- status / health ---

    /// Current connection status, mapped to the canonical state union.
    ///
    /// Fail-soft: transport failures come back as a status with state
    /// [`ConnectionState::Failed`] and the error attached, never as an error.
    async fn get_connection_status(&self, instance_id: &str) -> ConnectionStatus;

    /// Fetch a (possibly regenerated) pairing QR for the instance.
    ///
    /// # Errors
    ///
    /// Fails when the instance is unknown or already authenticated.
    async fn get_qr_code(&self, instance_id: &str) -> Result<QrCodeData, ProviderError>;

    /// Whether the vendor endpoint currently answers health probes.
    async fn is_healthy(&self) -> bool;

    // --- messaging ---

    /// Send one message, routing by payload kind.
    ///
    /// Never raises: invalid parameters and vendor failures both come back
    /// as a [`MessageResult`] with status [`MessageStatus::Failed`].
    async fn send_message(&self, instance_id: &str, params: SendMessageParams) -> MessageResult;

    /// Convenience wrapper for a plain-text send.
    async fn send_text(&self, instance_id: &str, to: &str, text: &str) -> MessageResult {
        self.send_message(instance_id, SendMessageParams::text(to, text))
            .await
    }

    /// Convenience wrapper for a media send.
    async fn send_media(&self, instance_id: &str, to: &str, media: MediaContent) -> MessageResult {
        self.send_message(instance_id, SendMessageParams::media(to, media))
            .await
    }

    // --- session persistence ---

    /// Persist session credentials for the instance.
    ///
    /// No-op by default: vendors that hold sessions remotely have nothing to
    /// save. Adapters that persist locally override.
    ///
    /// # Errors
    ///
    /// Overriding adapters may fail on storage errors.
    async fn save_session(&self, _instance_id: &str, _data: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Load persisted session credentials, if any.
    ///
    /// # Errors
    ///
    /// Overriding adapters may fail on storage errors.
    async fn load_session(&self, _instance_id: &str) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }

    /// Delete persisted session credentials.
    ///
    /// # Errors
    ///
    /// Overriding adapters may fail on storage errors.
    async fn delete_session(&self, _instance_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    // --- event subscription ---

    /// Register the inbound-message callback for an instance.
    ///
    /// Replace semantics: at most one callback per instance and kind;
    /// re-registration overwrites the previous one.
    fn on_message(&self, instance_id: &str, handler: MessageHandler);

    /// Register the status-change callback for an instance (replace
    /// semantics).
    fn on_status_change(&self, instance_id: &str, handler: StatusHandler);

    /// Register the QR-update callback for an instance (replace semantics).
    fn on_qr_code_updated(&self, instance_id: &str, handler: QrHandler);

    // --- instance introspection ---

    /// Ids of all instances known to the vendor.
    ///
    /// Advisory: degrades to an empty list on vendor error.
    async fn list_instances(&self) -> Vec<String>;

    /// Whether the vendor knows an instance under this id.
    async fn instance_exists(&self, instance_id: &str) -> bool {
        self.list_instances()
            .await
            .iter()
            .any(|id| id == instance_id)
    }

    // --- optional capabilities ---

    /// Whether this adapter can manage vendor webhook URLs.
    fn supports_webhook_management(&self) -> bool {
        false
    }

    /// Whether this adapter can enumerate contacts, chats, and history.
    fn supports_history(&self) -> bool {
        false
    }

    /// Point the vendor's webhook for this instance at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unsupported`] unless the adapter probes
    /// `true` for [`supports_webhook_management`](Self::supports_webhook_management).
    async fn set_webhook(&self, _instance_id: &str, _url: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported("set_webhook"))
    }

    /// Remove the vendor's webhook for this instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unsupported`] when the vendor offers no
    /// webhook removal. Probe before calling.
    async fn remove_webhook(&self, _instance_id: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported("remove_webhook"))
    }

    /// Contact directory for the instance. Advisory; empty on error or when
    /// unsupported.
    async fn fetch_contacts(&self, _instance_id: &str) -> Vec<Contact> {
        Vec::new()
    }

    /// Open conversations for the instance. Advisory; empty on error or when
    /// unsupported.
    async fn fetch_chats(&self, _instance_id: &str) -> Vec<Chat> {
        Vec::new()
    }

    /// Recent messages in a conversation. Advisory; empty on error or when
    /// unsupported.
    async fn fetch_messages(
        &self,
        _instance_id: &str,
        _chat_jid: &str,
        _limit: u32,
    ) -> Vec<IncomingMessage> {
        Vec::new()
    }
}
