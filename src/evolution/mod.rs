//! Evolution API backend: vendor HTTP client, provider adapter, and
//! webhook dispatcher.
//!
//! [`EvolutionProvider`] satisfies the provider contract by translating
//! canonical shapes into Evolution's wire format and back. Inbound events
//! arrive as webhook envelopes handled by [`WebhookDispatcher`]; the two
//! share one [`crate::provider::HandlerRegistry`].

pub mod adapter;
pub mod client;
pub mod webhook;

pub use adapter::EvolutionProvider;
pub use client::{EvolutionApi, EvolutionClient};
pub use webhook::{WebhookDispatcher, WebhookEnvelope};
