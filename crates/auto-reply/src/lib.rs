//! Inbound message processing pipeline.
//!
//! Flow per message: welcome (first contact) → webhook forward → keyword
//! rules → AI fallback under a per-sender daily quota. Each stage catches
//! and logs its own errors; a failed stage never blocks the later ones.

pub mod ai;
pub mod pipeline;
pub mod usage;
pub mod webhook;

pub use {
    ai::{HttpTextGenerator, TextGenerator},
    pipeline::AutoReplyPipeline,
    usage::AiUsage,
};
