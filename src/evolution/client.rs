//! HTTP client for the Evolution API.
//!
//! All vendor operations go through [`EvolutionApi`], the remote RPC
//! boundary of the adapter. [`EvolutionClient`] is the reqwest-backed
//! implementation; tests substitute their own. Request/response shapes here
//! are vendor-specific and deliberately thin — everything the rest of the
//! system consumes is normalized in the adapter and dispatcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::provider::ProviderError;

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Number of health-check retries in [`EvolutionClient::wait_healthy`].
const HEALTH_CHECK_RETRIES: u32 = 5;

/// Delay between health-check attempts in milliseconds.
const HEALTH_CHECK_DELAY_MS: u64 = 2000;

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// One vendor-side instance as listed by `fetchInstances`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceInfo {
    /// Vendor-visible instance name.
    #[serde(rename = "instanceName", alias = "name")]
    pub name: String,
    /// Raw vendor state token, e.g. `"open"` or `"close"`.
    #[serde(rename = "connectionStatus", alias = "status", default)]
    pub state: String,
    /// JID of the paired number, when connected.
    #[serde(rename = "ownerJid", default)]
    pub owner_jid: Option<String>,
}

/// Raw pairing payload returned by `instance/connect`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQr {
    /// QR content string.
    #[serde(default)]
    pub code: Option<String>,
    /// Base64 PNG of the QR, when the vendor renders one.
    #[serde(default)]
    pub base64: Option<String>,
    /// Phone-entry pairing code alternative.
    #[serde(rename = "pairingCode", default)]
    pub pairing_code: Option<String>,
}

/// Vendor acknowledgement of a send call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendAck {
    /// Vendor-assigned message id.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Raw vendor status token, e.g. `"PENDING"`.
    #[serde(default)]
    pub status: Option<String>,
}

/// Outbound text request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct SendTextRequest {
    /// Destination number or JID.
    pub number: String,
    /// Message text.
    pub text: String,
    /// Quoted message id, if replying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted: Option<String>,
}

/// Outbound media request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct SendMediaRequest {
    /// Destination number or JID.
    pub number: String,
    /// Media kind derived from the MIME type (`image`/`video`/`audio`/`document`).
    pub mediatype: String,
    /// MIME type of the payload.
    pub mimetype: String,
    /// Media URL or inline base64.
    pub media: String,
    /// Caption shown under the media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Filename hint for documents.
    #[serde(rename = "fileName", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// One button in an outbound buttons request.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct WireButton {
    /// Reply id echoed back by the recipient.
    pub id: String,
    /// Button label.
    pub title: String,
}

/// Outbound buttons request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct SendButtonsRequest {
    /// Destination number or JID.
    pub number: String,
    /// Text above the buttons.
    pub title: String,
    /// Buttons to render.
    pub buttons: Vec<WireButton>,
}

/// One row of an outbound list request.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct WireListRow {
    /// Reply id echoed back on selection.
    #[serde(rename = "rowId")]
    pub row_id: String,
    /// Row title.
    pub title: String,
    /// Secondary line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One section of an outbound list request.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct WireListSection {
    /// Section heading.
    pub title: String,
    /// Rows in this section.
    pub rows: Vec<WireListRow>,
}

/// Outbound list request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct SendListRequest {
    /// Destination number or JID.
    pub number: String,
    /// Label of the button that opens the list.
    #[serde(rename = "buttonText")]
    pub button_text: String,
    /// List sections.
    pub sections: Vec<WireListSection>,
}

/// A contact entry from `chat/findContacts`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawContact {
    /// WhatsApp JID.
    #[serde(alias = "remoteJid")]
    pub id: String,
    /// Display name, if known.
    #[serde(rename = "pushName", alias = "name", default)]
    pub name: Option<String>,
}

/// A chat entry from `chat/findChats`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChat {
    /// Conversation JID.
    #[serde(alias = "remoteJid")]
    pub id: String,
    /// Conversation title, if known.
    #[serde(default)]
    pub name: Option<String>,
    /// Unread count, if reported.
    #[serde(rename = "unreadCount", default)]
    pub unread_count: Option<u32>,
}

// ---------------------------------------------------------------------------
// RPC boundary
// ---------------------------------------------------------------------------

/// The Evolution API surface the adapter depends on.
///
/// Kept as a trait so the adapter can be exercised against an in-memory
/// double; every method maps 1:1 to one vendor HTTP call.
#[async_trait]
pub trait EvolutionApi: Send + Sync {
    /// Probe the vendor root endpoint.
    ///
    /// # Errors
    ///
    /// Fails when the endpoint is unreachable or rejects the API key.
    async fn probe(&self) -> Result<(), ProviderError>;

    /// List all instances known to the vendor.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn fetch_instances(&self) -> Result<Vec<InstanceInfo>, ProviderError>;

    /// Create a new instance named `instance_id`, tagged with the tenant.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn create_instance(
        &self,
        instance_id: &str,
        business_id: &str,
    ) -> Result<(), ProviderError>;

    /// Start pairing and fetch the QR payload for an instance.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn connect_instance(&self, instance_id: &str) -> Result<RawQr, ProviderError>;

    /// Raw vendor state token for an instance.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn connection_state(&self, instance_id: &str) -> Result<String, ProviderError>;

    /// Log the instance out of its WhatsApp session.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn logout_instance(&self, instance_id: &str) -> Result<(), ProviderError>;

    /// Delete the vendor-side instance.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn delete_instance(&self, instance_id: &str) -> Result<(), ProviderError>;

    /// Restart the vendor-side instance.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn restart_instance(&self, instance_id: &str) -> Result<(), ProviderError>;

    /// Send a plain-text message.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn send_text(
        &self,
        instance_id: &str,
        request: SendTextRequest,
    ) -> Result<SendAck, ProviderError>;

    /// Send a media message.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn send_media(
        &self,
        instance_id: &str,
        request: SendMediaRequest,
    ) -> Result<SendAck, ProviderError>;

    /// Send a buttons message.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn send_buttons(
        &self,
        instance_id: &str,
        request: SendButtonsRequest,
    ) -> Result<SendAck, ProviderError>;

    /// Send an interactive list message.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn send_list(
        &self,
        instance_id: &str,
        request: SendListRequest,
    ) -> Result<SendAck, ProviderError>;

    /// Contact directory for an instance.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn find_contacts(&self, instance_id: &str) -> Result<Vec<RawContact>, ProviderError>;

    /// Open chats for an instance.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn find_chats(&self, instance_id: &str) -> Result<Vec<RawChat>, ProviderError>;

    /// Recent raw messages in a conversation, newest first.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn find_messages(
        &self,
        instance_id: &str,
        remote_jid: &str,
        limit: u32,
    ) -> Result<Vec<Value>, ProviderError>;

    /// Point the vendor's webhook for the instance at `url`.
    ///
    /// # Errors
    ///
    /// Fails on transport or vendor error.
    async fn set_webhook(&self, instance_id: &str, url: &str) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// reqwest-backed [`EvolutionApi`] implementation.
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EvolutionClient {
    /// Build a client for the given Evolution endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Setup`] when `base_url` is not a valid URL.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ProviderError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ProviderError::Setup(format!("invalid Evolution base URL: {e}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }

    /// Wait for the vendor to answer health probes, retrying with a fixed
    /// delay. Intended for host startup right after construction.
    ///
    /// # Errors
    ///
    /// Returns the last probe error when all retries are exhausted.
    pub async fn wait_healthy(&self) -> Result<(), ProviderError> {
        let mut last = None;
        for attempt in 0..HEALTH_CHECK_RETRIES {
            match self.probe().await {
                Ok(()) => return Ok(()),
                Err(e) => last = Some(e),
            }
            if attempt < HEALTH_CHECK_RETRIES.saturating_sub(1) {
                tokio::time::sleep(std::time::Duration::from_millis(HEALTH_CHECK_DELAY_MS)).await;
            }
        }
        Err(last.unwrap_or_else(|| ProviderError::Setup("vendor never became healthy".to_owned())))
    }

    /// Returns the vendor base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header("apikey", &self.api_key)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header("apikey", &self.api_key)
    }

    fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(format!("{}{path}", self.base_url))
            .header("apikey", &self.api_key)
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .put(format!("{}{path}", self.base_url))
            .header("apikey", &self.api_key)
    }
}

/// Check response status and return the response or a structured error.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Vendor {
        status: status.as_u16(),
        body,
    })
}

/// Pull the vendor-assigned message id out of a raw send response.
///
/// Evolution nests it under `key.id`; some builds return `messageId` at the
/// top level instead.
fn ack_from_value(value: &Value) -> SendAck {
    let message_id = value
        .pointer("/key/id")
        .or_else(|| value.get("messageId"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    let status = value.get("status").and_then(Value::as_str).map(str::to_owned);
    SendAck { message_id, status }
}

#[async_trait]
impl EvolutionApi for EvolutionClient {
    async fn probe(&self) -> Result<(), ProviderError> {
        check(self.get("/").send().await?).await?;
        Ok(())
    }

    async fn fetch_instances(&self) -> Result<Vec<InstanceInfo>, ProviderError> {
        let resp = check(self.get("/instance/fetchInstances").send().await?).await?;
        // Entries come either flat or wrapped in an `instance` object
        // depending on the Evolution version.
        let raw: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let instances = raw
            .into_iter()
            .filter_map(|entry| {
                let inner = entry.get("instance").cloned().unwrap_or(entry);
                serde_json::from_value::<InstanceInfo>(inner).ok()
            })
            .collect();
        Ok(instances)
    }

    async fn create_instance(
        &self,
        instance_id: &str,
        business_id: &str,
    ) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "instanceName": instance_id,
            "qrcode": true,
            "integration": "WHATSAPP-BAILEYS",
            "businessId": business_id,
        });
        check(self.post("/instance/create").json(&body).send().await?).await?;
        debug!(instance_id, business_id, "created Evolution instance");
        Ok(())
    }

    async fn connect_instance(&self, instance_id: &str) -> Result<RawQr, ProviderError> {
        let resp = check(
            self.get(&format!("/instance/connect/{instance_id}"))
                .send()
                .await?,
        )
        .await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        // Pairing payload is nested under `qrcode` on some versions.
        let inner = value.get("qrcode").cloned().unwrap_or(value);
        serde_json::from_value(inner).map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn connection_state(&self, instance_id: &str) -> Result<String, ProviderError> {
        let resp = check(
            self.get(&format!("/instance/connectionState/{instance_id}"))
                .send()
                .await?,
        )
        .await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        value
            .pointer("/instance/state")
            .or_else(|| value.get("state"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ProviderError::Parse("connectionState response missing state".to_owned()))
    }

    async fn logout_instance(&self, instance_id: &str) -> Result<(), ProviderError> {
        check(
            self.delete(&format!("/instance/logout/{instance_id}"))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<(), ProviderError> {
        check(
            self.delete(&format!("/instance/delete/{instance_id}"))
                .send()
                .await?,
        )
        .await?;
        debug!(instance_id, "deleted Evolution instance");
        Ok(())
    }

    async fn restart_instance(&self, instance_id: &str) -> Result<(), ProviderError> {
        check(
            self.put(&format!("/instance/restart/{instance_id}"))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn send_text(
        &self,
        instance_id: &str,
        request: SendTextRequest,
    ) -> Result<SendAck, ProviderError> {
        let resp = check(
            self.post(&format!("/message/sendText/{instance_id}"))
                .json(&request)
                .send()
                .await?,
        )
        .await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(ack_from_value(&value))
    }

    async fn send_media(
        &self,
        instance_id: &str,
        request: SendMediaRequest,
    ) -> Result<SendAck, ProviderError> {
        let resp = check(
            self.post(&format!("/message/sendMedia/{instance_id}"))
                .json(&request)
                .send()
                .await?,
        )
        .await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(ack_from_value(&value))
    }

    async fn send_buttons(
        &self,
        instance_id: &str,
        request: SendButtonsRequest,
    ) -> Result<SendAck, ProviderError> {
        let resp = check(
            self.post(&format!("/message/sendButtons/{instance_id}"))
                .json(&request)
                .send()
                .await?,
        )
        .await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(ack_from_value(&value))
    }

    async fn send_list(
        &self,
        instance_id: &str,
        request: SendListRequest,
    ) -> Result<SendAck, ProviderError> {
        let resp = check(
            self.post(&format!("/message/sendList/{instance_id}"))
                .json(&request)
                .send()
                .await?,
        )
        .await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(ack_from_value(&value))
    }

    async fn find_contacts(&self, instance_id: &str) -> Result<Vec<RawContact>, ProviderError> {
        let resp = check(
            self.post(&format!("/chat/findContacts/{instance_id}"))
                .json(&serde_json::json!({}))
                .send()
                .await?,
        )
        .await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn find_chats(&self, instance_id: &str) -> Result<Vec<RawChat>, ProviderError> {
        let resp = check(
            self.post(&format!("/chat/findChats/{instance_id}"))
                .json(&serde_json::json!({}))
                .send()
                .await?,
        )
        .await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn find_messages(
        &self,
        instance_id: &str,
        remote_jid: &str,
        limit: u32,
    ) -> Result<Vec<Value>, ProviderError> {
        let body = serde_json::json!({
            "where": { "key": { "remoteJid": remote_jid } },
            "limit": limit,
        });
        let resp = check(
            self.post(&format!("/chat/findMessages/{instance_id}"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        resp.json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn set_webhook(&self, instance_id: &str, url: &str) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "webhook": {
                "enabled": true,
                "url": url,
                "events": ["MESSAGES_UPSERT", "CONNECTION_UPDATE", "QRCODE_UPDATED"],
            }
        });
        check(
            self.post(&format!("/webhook/set/{instance_id}"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        debug!(instance_id, url, "Evolution webhook configured");
        Ok(())
    }
}
