//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the orchestration core expects from
//! its collaborators. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No subprocess or HTTP client types in any signature
//! - Progress flows out through callbacks, cancellation in through tokens
//! - Every port ships with a trivial implementation where one makes sense

pub mod event_emitter;
pub mod media_engine;
pub mod transfer_channel;

// Re-export port traits for convenience
pub use event_emitter::{NoopSessionEmitter, SessionEventEmitter, TracingSessionEmitter};
pub use media_engine::{
    EngineError, EngineResult, FetchRequest, FetchedArtifact, MediaEngine, MediaFormat, ProgressFn,
    SourceMeta,
};
pub use transfer_channel::{DeliveryRequest, TransferChannel, TransferError, TransferResult};
