//! # Node Runtime Library
//!
//! One Insight-Mesh peer: the component container, the payload dispatcher,
//! the operations a peer performs and the sweeps that keep it converging.
//! The `main.rs` binary runs one peer; the library is what the integration
//! tests drive.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: components define ports, `adapters` implement them
//! - **Dependency Injection**: `PeerContext::build` wires everything from one `NodeConfig`
//! - **Event Bus**: every observable state change is published as a `MeshEvent`

#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod container;
pub mod errors;
pub mod handlers;
pub mod node;
pub mod operations;
pub mod wire;
pub mod wiring;

pub use container::{NodeConfig, PeerContext, StorageBackend};
pub use errors::{NodeError, NodeResult};
pub use node::MeshNode;
pub use operations::SyncReport;
pub use wire::{ModelUpdate, Payload, VoteBallot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
