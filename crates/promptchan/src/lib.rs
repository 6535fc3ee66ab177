//! Promptchan provider integration.
//!
//! The orchestrator depends only on the capability traits in
//! [`provider`]; [`client`] holds the single adapter translating them to
//! whichever upstream wire shape is current. The upstream API has
//! historically been unstable (field names and tiers shifted between
//! snapshots), so nothing outside this crate mentions its endpoints.

pub mod client;
pub mod provider;

pub use client::{PromptchanClient, ProviderConfig};
pub use provider::{
    GenerationProvider, ImageArtifact, ImageGeneration, ImageRequest, ProviderError,
    ProviderPhase, VideoGeneration, VideoRequest, VideoResult, VideoStatus,
};

/// Engine tag stored on generation rows produced through this crate.
pub const ENGINE_PROMPTCHAN: &str = "promptchan";
