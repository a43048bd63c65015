//! Ports for the block store.

pub mod inbound;

pub use inbound::BlockStoreApi;
