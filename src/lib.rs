//! trellis - typed issue hierarchy and workflow enforcement for GitHub Issues
//!
//! A prescriptive CLI that manages a three-level issue hierarchy
//! (Epic -> Task -> Sub-task) on GitHub, enforcing a seven-state workflow,
//! a structural invariant on issue bodies, and typed parent-child links on
//! top of a service whose native primitives are loose.
//!
//! # Architecture
//!
//! - **model**: issue kinds, workflow states, remote snapshots
//! - **config**: the trellis.yaml project manifest
//! - **body**: lossless Markdown body parser and span-preserving writer
//! - **remote**: REST and GraphQL transports plus the hybrid client
//!   (feature probing, fallbacks, rollback)
//! - **workflow**: transition table, preconditions, status projection,
//!   audit log
//! - **commands**: one struct per CLI verb over the layers above

pub mod body;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod output;
pub mod remote;
pub mod workflow;

// Re-exports
pub use error::{Result, TrellisError};
