//! Core domain types and ports for the vidferry orchestration core.
//!
//! This crate holds everything the pipeline and its adapters agree on:
//! session identities and lifecycle states, the error taxonomy, progress
//! and variant value types, and the port traits for the extraction
//! engine, the transfer channel and the event emitter. It performs no
//! I/O itself.

#![deny(unused_crate_dependencies)]

pub mod config;
pub mod errors;
pub mod events;
pub mod ids;
pub mod ports;
pub mod progress;
pub mod session;
pub mod source_url;
pub mod variant;

// Re-export commonly used types for convenience
pub use config::OrchestratorConfig;
pub use errors::{SessionError, SessionResult};
pub use events::SessionEvent;
pub use ids::{RequestId, UserId};
pub use ports::{
    DeliveryRequest, EngineError, EngineResult, FetchRequest, FetchedArtifact, MediaEngine,
    MediaFormat, NoopSessionEmitter, ProgressFn, SessionEventEmitter, SourceMeta,
    TracingSessionEmitter, TransferChannel, TransferError, TransferResult,
};
pub use progress::{ProgressSnapshot, TransferPhase};
pub use session::{FailureKind, SessionSnapshot, SessionState};
pub use source_url::SourceUrl;
pub use variant::{ResolvedSource, VariantDescriptor, format_bytes};
