//! Session pipeline for vidferry.
//!
//! Everything between a validated URL and a delivered artifact lives here:
//!
//! - `catalog` - compatibility filtering and variant menu construction
//! - `arena` - per-request temp scopes with idempotent disposal
//! - `throttle` - interval/step gating for progress emissions
//! - `session` - the driver that moves bytes for one selected variant
//! - `registry` - single-flight session bookkeeping and the progress bridge
//! - `orchestrator` - the facade adapters talk to
//!
//! The pipeline only touches the outside world through the ports defined in
//! `vidferry-core`; adapters provide the engine, the delivery channel, and
//! the event sink.

#![deny(unused_crate_dependencies)]

pub mod arena;
pub mod catalog;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod throttle;

pub use arena::TempFileArena;
pub use catalog::{FALLBACK_SELECTOR, QualityCatalog};
pub use orchestrator::Orchestrator;
pub use registry::{BegunSession, SessionRegistry};
pub use session::{ProgressUpdate, SessionDeps, SourceDetails, TransferJob};
pub use throttle::ProgressThrottle;
