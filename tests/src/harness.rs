//! # Test Mesh
//!
//! Several peers on one in-process hub with a shared manual clock.
//!
//! Peers start offline: each knows only itself and no inbound loop runs.
//! `introduce` registers peers with each other, `start` spawns inbound
//! loops. Sweeps never run on their own; tests call them explicitly.

use node_runtime::adapters::{InboundFrame, MeshHub};
use node_runtime::{MeshNode, NodeConfig, PeerContext};
use shared_crypto::Secp256k1KeyPair;
use shared_types::{DeviceId, ManualTimeSource, PeerRole};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Start of every test clock.
pub const EPOCH: u64 = 1_700_000_000;

pub struct TestMesh {
    pub hub: Arc<MeshHub>,
    pub clock: ManualTimeSource,
    nodes: Vec<MeshNode>,
    inbound: Vec<Option<mpsc::Receiver<InboundFrame>>>,
}

impl TestMesh {
    /// Build one peer per `(device id, role)`, none started.
    pub fn offline(peers: &[(&str, PeerRole)]) -> Self {
        let hub = MeshHub::new(256);
        let clock = ManualTimeSource::at_secs(EPOCH);
        let mut nodes = Vec::new();
        let mut inbound = Vec::new();
        for (id, role) in peers {
            let device = DeviceId::new(*id);
            inbound.push(Some(hub.attach(&device)));
            let ctx = PeerContext::build(
                NodeConfig::for_testing(id, *role),
                Secp256k1KeyPair::generate(),
                hub.transport(device),
                Arc::new(clock.clone()),
            )
            .expect("test peer builds");
            nodes.push(MeshNode::new(ctx));
        }
        Self {
            hub,
            clock,
            nodes,
            inbound,
        }
    }

    /// Every peer knows every other and all inbound loops run.
    pub fn connected(peers: &[(&str, PeerRole)]) -> Self {
        let mut mesh = Self::offline(peers);
        mesh.introduce_all();
        mesh.start_all();
        mesh
    }

    pub fn peer(&self, index: usize) -> &MeshNode {
        &self.nodes[index]
    }

    pub fn peers(&self) -> &[MeshNode] {
        &self.nodes
    }

    /// Register `b` with `a` under the role `b` runs as.
    pub fn introduce(&self, a: usize, b: usize) {
        let target = &self.nodes[b];
        self.nodes[a]
            .registry
            .write()
            .register(
                target.device_id.clone(),
                &target.keypair.public_key(),
                target.config.identity.role,
            )
            .expect("register peer");
    }

    pub fn introduce_all(&self) {
        for a in 0..self.nodes.len() {
            for b in 0..self.nodes.len() {
                if a != b {
                    self.introduce(a, b);
                }
            }
        }
    }

    pub fn start(&mut self, index: usize) {
        if let Some(rx) = self.inbound[index].take() {
            self.nodes[index].spawn_inbound(rx);
        }
    }

    pub fn start_all(&mut self) {
        for index in 0..self.nodes.len() {
            self.start(index);
        }
    }

    pub async fn shutdown(self) {
        for node in self.nodes {
            node.shutdown().await;
        }
    }
}

/// Poll `condition` until it holds, panicking with `what` after five seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
