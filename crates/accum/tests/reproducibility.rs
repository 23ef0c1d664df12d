use accum::{IncrementalMerkleTree, LeanTree};
use primitives::Fr;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn incremental_and_bulk_roots_agree(raw in prop::collection::vec(1u64..u64::MAX, 0..70)) {
        let leaves: Vec<Fr> = raw.into_iter().map(Fr::from).collect();
        let mut incremental = LeanTree::new();
        for leaf in &leaves {
            incremental.insert(*leaf).unwrap();
        }
        let bulk = LeanTree::from_leaves(&leaves).unwrap();
        prop_assert_eq!(bulk.root(), incremental.root());
        prop_assert_eq!(bulk.size(), leaves.len());
    }

    #[test]
    fn appending_after_rebuild_tracks_incremental(split in 0usize..40, extra in 1usize..20) {
        let leaves: Vec<Fr> = (1..=(split + extra) as u64).map(Fr::from).collect();
        let mut resumed = LeanTree::from_leaves(&leaves[..split]).unwrap();
        for leaf in &leaves[split..] {
            resumed.insert(*leaf).unwrap();
        }
        let full = LeanTree::from_leaves(&leaves).unwrap();
        prop_assert_eq!(resumed.root(), full.root());
        let index = leaves.len() - 1;
        prop_assert!(resumed.prove_membership(index).unwrap().verify());
    }
}

#[test]
fn rebuild_of_large_level_uses_same_hash_order() {
    // Wide enough to take the parallel path on the first level.
    let leaves: Vec<Fr> = (1..=2050u64).map(Fr::from).collect();
    let mut incremental = LeanTree::new();
    for leaf in &leaves {
        incremental.insert(*leaf).unwrap();
    }
    let bulk = LeanTree::from_leaves(&leaves).unwrap();
    assert_eq!(bulk.root(), incremental.root());
    assert_eq!(bulk.depth(), 12);
}
