//! # Adapter Implementations
//!
//! Concrete implementations of the component ports, plus the storage and
//! identity plumbing the runtime needs at startup.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     OUTER LAYER (Adapters)                       │
//! │   RegistryDirectory, ChainLedger, DeviceSigner, HubTransport     │
//! └──────────────────────────────────────────────────────────────────┘
//!                               ↑ implements ↑
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER (Ports)                        │
//! │   AuthorityDirectory, TrustLedger, KnowledgeHistory,             │
//! │   BlockAppender, AuthoritySigner, KeyDirectory, PeerTransport    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod directory;
pub mod keystore;
pub mod ledger;
pub mod pending;
pub mod signer;
pub mod storage;
pub mod transport;

pub use directory::RegistryDirectory;
pub use ledger::ChainLedger;
pub use pending::PendingSyncs;
pub use signer::DeviceSigner;
pub use transport::{HubTransport, InboundFrame, MeshHub};
