//! # Sync Flows
//!
//! Peers that wrote blocks while apart converge after sync sweeps, and all
//! of them pick the same active chain.

#[cfg(test)]
mod tests {
    use crate::harness::{eventually, TestMesh};
    use im_01_block_store::BlockStoreApi;
    use node_runtime::wiring::sync_sweep;
    use shared_bus::{EventFilter, EventSubscriber, EventTopic, MeshEvent};
    use shared_types::{Metadata, PeerRole};
    use std::time::Duration;

    const AUTHORITIES: [(&str, PeerRole); 3] = [
        ("field-a", PeerRole::Authority),
        ("field-b", PeerRole::Authority),
        ("field-c", PeerRole::Authority),
    ];

    #[tokio::test]
    async fn test_three_peers_converge_after_sync_sweeps() {
        let mut mesh = TestMesh::offline(&AUTHORITIES);
        for (i, node) in mesh.peers().iter().enumerate() {
            for n in 0..=i {
                node.create_block(format!("{} note {}", node.device_id, n), Metadata::new())
                    .await
                    .unwrap();
                mesh.clock.advance_secs(1);
            }
        }
        mesh.introduce_all();
        mesh.start_all();

        for node in mesh.peers() {
            sync_sweep(node.context()).await;
        }

        eventually("every peer holds all six blocks", || {
            mesh.peers().iter().all(|n| n.block_store.read().len() == 6)
        })
        .await;
        let roots: Vec<_> = mesh
            .peers()
            .iter()
            .map(|n| n.block_store.read().merkle_root())
            .collect();
        assert!(roots.windows(2).all(|w| w[0] == w[1]));

        let chains: Vec<_> = mesh.peers().iter().map(|n| n.chain_view().hashes()).collect();
        assert!(chains.windows(2).all(|w| w[0] == w[1]));
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_longest_branch_wins_on_every_peer() {
        // Known to each other but not yet reading their queues.
        let mut mesh = TestMesh::offline(&AUTHORITIES[..2]);
        mesh.introduce_all();
        let a = mesh.peer(0);
        let b = mesh.peer(1);

        // Common genesis, then a one-block branch on A and a two-block branch on B.
        let genesis = a.create_block("genesis".into(), Metadata::new()).await.unwrap();
        b.ingest_blocks(&a.device_id, vec![genesis.clone()]).unwrap();
        mesh.clock.advance_secs(1);
        let short = a.create_block("short branch".into(), Metadata::new()).await.unwrap();
        let long_1 = b.create_block("long branch 1".into(), Metadata::new()).await.unwrap();
        mesh.clock.advance_secs(1);
        let long_2 = b.create_block("long branch 2".into(), Metadata::new()).await.unwrap();
        assert_eq!(short.previous_hash, Some(genesis.content_hash));
        assert_eq!(long_1.previous_hash, Some(genesis.content_hash));

        mesh.start_all();
        let a = mesh.peer(0);
        let b = mesh.peer(1);
        a.sync_with_peer(&b.device_id).await.unwrap();
        eventually("both peers hold four blocks", || {
            a.block_store.read().len() == 4 && b.block_store.read().len() == 4
        })
        .await;

        let expected = vec![genesis.content_hash, long_1.content_hash, long_2.content_hash];
        for node in [a, b] {
            let view = node.chain_view();
            assert_eq!(view.hashes(), expected);
            assert_eq!(view.orphaned, vec![short.content_hash]);
            assert_eq!(view.forks.len(), 1);
        }
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_sync_with_matching_roots_moves_nothing() {
        let mesh = TestMesh::connected(&AUTHORITIES[..2]);
        let a = mesh.peer(0);
        let b = mesh.peer(1);
        a.create_block("shared".into(), Metadata::new()).await.unwrap();
        eventually("push reaches B", || b.block_store.read().len() == 1).await;

        let report = a.sync_with_peer(&b.device_id).await.unwrap();
        assert_eq!(report.accepted, 0);
        assert_eq!(report.pushed, 0);
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_sync_rounds_are_published() {
        let mesh = TestMesh::connected(&AUTHORITIES[..2]);
        let a = mesh.peer(0);
        let b = mesh.peer(1);
        let mut events = a
            .event_bus
            .subscribe(EventFilter::topics(vec![EventTopic::Sync]));

        a.sync_with_peer(&b.device_id).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, MeshEvent::SyncCompleted { peer, .. } if peer == b.device_id));
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_peer_fails_the_round() {
        let mesh = TestMesh::connected(&AUTHORITIES[..2]);
        let a = mesh.peer(0);
        let b = mesh.peer(1);
        mesh.hub.detach(&b.device_id);

        let result = a.sync_with_peer(&b.device_id).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().classify().is_retryable());
        assert!(a.pending_syncs.is_empty());
        mesh.shutdown().await;
    }
}
