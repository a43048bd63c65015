//! Property test: one pull-then-push round makes any two block sets equal.

use im_01_block_store::{BlockStoreApi, BlockStoreService};
use proptest::prelude::*;
use shared_types::{Block, DeviceId, Metadata};
use uuid::Uuid;

fn blocks(n: usize) -> Vec<Block> {
    (0..n)
        .map(|i| Block::new(format!("fact {i}"), Metadata::new(), i as u64, DeviceId::new("seed"), None))
        .collect()
}

proptest! {
    #[test]
    fn test_single_round_converges(placement in prop::collection::vec(0u8..3, 0..24)) {
        let all = blocks(placement.len());
        let mut a = BlockStoreService::in_memory();
        let mut b = BlockStoreService::in_memory();
        // 0: only A, 1: only B, 2: both
        for (block, side) in all.iter().zip(&placement) {
            if *side != 1 {
                a.insert_block(block.clone()).unwrap();
            }
            if *side != 0 {
                b.insert_block(block.clone()).unwrap();
            }
        }

        let response = a.handle_sync_request(&b.build_sync_request(Uuid::new_v4()));
        let (_, to_push) = b.integrate_sync_response(response).unwrap();
        a.integrate_blocks(to_push).unwrap();

        prop_assert_eq!(a.merkle_root(), b.merkle_root());
        prop_assert_eq!(a.all_hashes(), b.all_hashes());
        prop_assert_eq!(a.len(), all.len());
    }
}
