//! # Gossip Flows
//!
//! State-based replication of CRDT values and the peer registry, plus
//! heartbeats and model-update relay.

#[cfg(test)]
mod tests {
    use crate::harness::{eventually, TestMesh, EPOCH};
    use node_runtime::ModelUpdate;
    use shared_types::PeerRole;
    use std::collections::{BTreeMap, BTreeSet};

    const PAIR: [(&str, PeerRole); 2] = [
        ("medic-a", PeerRole::Authority),
        ("medic-b", PeerRole::Participant),
    ];

    #[tokio::test]
    async fn test_crdt_state_converges_both_ways() {
        let mesh = TestMesh::connected(&PAIR);
        let (a, b) = (mesh.peer(0), mesh.peer(1));
        {
            let mut crdt = a.crdt.write();
            crdt.increment("kits_used", 3).unwrap();
            crdt.add_to_set("sites", "north").unwrap();
        }
        mesh.clock.advance_secs(1);
        {
            let mut crdt = b.crdt.write();
            crdt.increment("kits_used", 2).unwrap();
            crdt.decrement("kits_used", 1).unwrap();
            crdt.add_to_set("sites", "river").unwrap();
            crdt.set_register("status", "stable").unwrap();
        }

        a.share_crdt_state().await;
        b.share_crdt_state().await;

        let sites: BTreeSet<String> = ["north", "river"].into_iter().map(String::from).collect();
        eventually("both engines converge", || {
            [a, b].iter().all(|n| {
                let crdt = n.crdt.read();
                crdt.get_counter("kits_used") == 4
                    && crdt.get_set("sites") == sites
                    && crdt.get_register("status").and_then(|r| r.value()).map(String::as_str)
                        == Some("stable")
            })
        })
        .await;
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_registry_gossip_introduces_third_peer() {
        let mut mesh = TestMesh::offline(&[
            ("medic-a", PeerRole::Authority),
            ("medic-b", PeerRole::Participant),
            ("medic-c", PeerRole::Participant),
        ]);
        // A knows everyone; B and C only know A.
        mesh.introduce(0, 1);
        mesh.introduce(0, 2);
        mesh.introduce(1, 0);
        mesh.introduce(2, 0);
        mesh.start_all();
        let (a, b, c) = (mesh.peer(0), mesh.peer(1), mesh.peer(2));
        assert!(!b.registry.read().contains(&c.device_id));

        a.share_registry_state().await;

        eventually("B learns C from A", || b.registry.read().contains(&c.device_id)).await;
        let registry = b.registry.read();
        assert_eq!(registry.public_key(&c.device_id), Some(c.keypair.public_key()));
        assert_eq!(registry.role(&c.device_id), Some(PeerRole::Participant));
        drop(registry);
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_last_seen() {
        let mesh = TestMesh::connected(&PAIR);
        let (a, b) = (mesh.peer(0), mesh.peer(1));
        mesh.clock.advance_secs(a.config.network.peer_timeout_secs + 10);
        assert_eq!(b.stale_peers(), vec![a.device_id.clone()]);

        a.send_heartbeats().await;

        let now = EPOCH + a.config.network.peer_timeout_secs + 10;
        eventually("B records the heartbeat", || {
            b.registry.read().get(&a.device_id).map(|e| e.last_seen) == Some(now)
        })
        .await;
        assert!(b.stale_peers().is_empty());
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_model_update_is_relayed_under_sender_identity() {
        let mesh = TestMesh::connected(&PAIR);
        let (a, b) = (mesh.peer(0), mesh.peer(1));
        let update = ModelUpdate {
            device_id: b.device_id.clone(),
            model_version: 4,
            weight_deltas: vec![0.25, -0.5, 0.0],
            metrics: BTreeMap::from([("loss".to_string(), 0.31)]),
            sample_count: 128,
        };

        a.publish_model_update(update).await;

        eventually("B holds A's update", || b.model_update(&a.device_id).is_some()).await;
        let held = b.model_update(&a.device_id).unwrap();
        assert_eq!(held.model_version, 4);
        assert_eq!(held.sample_count, 128);
        assert!(b.model_update(&b.device_id).is_none());
        mesh.shutdown().await;
    }
}
