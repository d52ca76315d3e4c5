//! wabridge — the WhatsApp channel layer of a pet-care business platform.
//!
//! A vendor-agnostic provider contract ([`provider::WhatsAppProvider`]), one
//! concrete adapter for the Evolution API ([`evolution::EvolutionProvider`]),
//! and a webhook dispatcher that normalizes vendor push events into the
//! canonical model. The hosting service owns HTTP routing, persistence, and
//! auth; this crate owns only the channel.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod evolution;
pub mod logging;
pub mod provider;
