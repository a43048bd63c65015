//! # Consensus Flows
//!
//! A participant proposes, the mesh votes, an authority finalizes and the
//! stamped block reaches every peer.

#[cfg(test)]
mod tests {
    use crate::harness::{eventually, TestMesh};
    use im_01_block_store::BlockStoreApi;
    use im_04_consensus::{ConsensusError, Knowledge, ProposalStatus, META_AUTHORITY_ID};
    use node_runtime::NodeError;
    use shared_types::PeerRole;

    const MESH: [(&str, PeerRole); 3] = [
        ("hub-authority", PeerRole::Authority),
        ("scout-1", PeerRole::Participant),
        ("scout-2", PeerRole::Participant),
    ];

    fn knowledge(content: &str) -> Knowledge {
        let mut knowledge = Knowledge::new(content);
        knowledge.metadata.insert("topic".into(), "logistics".into());
        knowledge
    }

    #[tokio::test]
    async fn test_accepted_proposal_is_stamped_and_replicated() {
        let mesh = TestMesh::connected(&MESH);
        let (authority, scout_1, scout_2) = (mesh.peer(0), mesh.peer(1), mesh.peer(2));

        let proposal = scout_1
            .propose_knowledge(knowledge("fuel depot at the north gate is empty"), 0.8)
            .await
            .unwrap();
        let id = proposal.id;
        eventually("proposal reaches every peer", || {
            mesh.peers().iter().all(|n| n.proposal(&id).is_some())
        })
        .await;

        scout_1.vote(id, true, 0.9).await.unwrap();
        scout_2.vote(id, true, 0.7).await.unwrap();
        eventually("votes reach the authority", || {
            authority.proposal(&id).map(|p| p.votes.len()) == Some(2)
        })
        .await;

        let outcome = authority.finalize(id).await.unwrap();
        assert_eq!(outcome.status, ProposalStatus::Accepted);
        let block = outcome.block.unwrap();
        assert_eq!(block.creator_device_id, authority.device_id);
        assert_eq!(
            block.metadata.get(META_AUTHORITY_ID),
            Some(&authority.device_id.to_string())
        );
        assert_eq!(block.metadata.get("topic").map(String::as_str), Some("logistics"));

        eventually("every peer stores the block and marks the proposal", || {
            mesh.peers().iter().all(|n| {
                n.block_store.read().contains(&block.content_hash)
                    && n.proposal(&id).map(|p| p.status) == Some(ProposalStatus::Accepted)
            })
        })
        .await;
        for node in mesh.peers() {
            assert_eq!(node.chain_view().tip(), Some(block.content_hash));
        }
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_proposal_writes_no_block() {
        let mesh = TestMesh::connected(&MESH);
        let (authority, scout_1, scout_2) = (mesh.peer(0), mesh.peer(1), mesh.peer(2));

        let id = scout_1
            .propose_knowledge(knowledge("the river is safe to cross"), 0.9)
            .await
            .unwrap()
            .id;
        eventually("proposal reaches every peer", || {
            mesh.peers().iter().all(|n| n.proposal(&id).is_some())
        })
        .await;
        authority.vote(id, false, 1.0).await.unwrap();
        scout_2.vote(id, false, 0.8).await.unwrap();
        eventually("scout vote reaches the authority", || {
            authority.proposal(&id).map(|p| p.votes.len()) == Some(2)
        })
        .await;

        let outcome = authority.finalize(id).await.unwrap();

        assert_eq!(outcome.status, ProposalStatus::Rejected);
        assert!(outcome.block.is_none());
        assert_eq!(authority.block_store.read().len(), 0);
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_participant_cannot_stamp_an_accepted_proposal() {
        let mesh = TestMesh::connected(&MESH);
        let scout_1 = mesh.peer(1);

        let id = scout_1
            .propose_knowledge(knowledge("clinic opens at dawn"), 0.6)
            .await
            .unwrap()
            .id;
        scout_1.vote(id, true, 1.0).await.unwrap();

        let result = scout_1.finalize(id).await;

        assert!(matches!(
            result,
            Err(NodeError::Consensus(ConsensusError::SignerUnavailable(_)))
        ));
        assert_eq!(
            scout_1.proposal(&id).map(|p| p.status),
            Some(ProposalStatus::Pending)
        );
        mesh.shutdown().await;
    }

    #[tokio::test]
    async fn test_finalize_without_votes_stays_pending() {
        let mesh = TestMesh::connected(&MESH);
        let authority = mesh.peer(0);

        let id = authority
            .propose_knowledge(knowledge("bridge inspection due"), 0.5)
            .await
            .unwrap()
            .id;
        let outcome = authority.finalize(id).await.unwrap();

        assert_eq!(outcome.status, ProposalStatus::Pending);
        assert!(outcome.ratio.is_none());
        mesh.shutdown().await;
    }
}
