//! yt-dlp adapter for the vidferry media engine port.
//!
//! Shells out to the `yt-dlp` executable:
//! - `probe` runs `-J` and parses the JSON dump into [`vidferry_core::SourceMeta`]
//! - `fetch` streams line-oriented progress from stdout while the download
//!   runs, then locates the merged artifact inside the request's scope
//!
//! Module layout:
//! - `locate`: binary discovery (env override, then `PATH`)
//! - `probe`: `-J` output parsing
//! - `progress`: the `--progress-template` line protocol
//! - `engine`: process orchestration and the `MediaEngine` impl

#![deny(unused_crate_dependencies)]

pub mod engine;
pub mod locate;
pub mod probe;
pub mod progress;

pub use engine::YtDlpEngine;
pub use locate::ENV_BINARY;
