//! # Runtime Wiring
//!
//! Background work that keeps a started peer converging with the mesh.

pub mod sweeps;

pub use sweeps::{heartbeat_sweep, retry_sweep, spawn_sweep, sync_sweep};
