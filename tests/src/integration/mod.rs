//! Cross-component flows between several peers.

pub mod consensus_flows;
pub mod gossip_flows;
pub mod sync_flows;
