//! Composition root and health surface for the vidferry service.
//!
//! This crate wires the pipeline to its production adapters: the yt-dlp
//! engine, a filesystem outbox channel, and a tracing emitter. The chat
//! transport stays external; anything that can hand the pipeline an
//! `Arc<dyn TransferChannel>` and an emitter embeds the same core.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by the main.rs binary only.
use clap as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod outbox;
pub mod routes;
pub mod state;

pub use bootstrap::{ServiceConfig, build_orchestrator, run};
pub use outbox::OutboxChannel;
pub use routes::create_router;
pub use state::AppState;
