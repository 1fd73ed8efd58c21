//! Invariant coverage for the B*-tree name index.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use starfs::BStarTree;

#[test]
fn test_sequential_insert_find_erase_all_m7() {
    let mut tree = BStarTree::new(7).unwrap();
    for i in 0..100 {
        tree.insert(i, i * 10);
    }
    tree.validate().unwrap();
    for i in 0..100 {
        assert_eq!(tree.find(&i), Some(&(i * 10)), "find {i}");
    }
    for i in 0..100 {
        assert!(tree.erase(&i), "erase {i}");
        tree.validate().unwrap();
    }
    assert!(tree.is_empty());
    tree.validate().unwrap();
}

#[test]
fn test_reverse_insert_m7() {
    let mut tree = BStarTree::new(7).unwrap();
    for i in (0..100).rev() {
        tree.insert(i, i + 1);
    }
    for i in 0..100 {
        assert_eq!(tree.find(&i), Some(&(i + 1)));
    }
    tree.validate().unwrap();
}

#[test]
fn test_small_branching_stress_m3() {
    let mut tree = BStarTree::new(3).unwrap();
    for i in 0..200 {
        tree.insert(i, i);
        tree.validate().unwrap();
    }
    for i in (0..200).step_by(3) {
        assert!(tree.erase(&i));
        tree.validate().unwrap();
    }
    for i in 0..200 {
        if i % 3 == 0 {
            assert!(!tree.contains(&i));
        } else {
            assert_eq!(tree.find(&i), Some(&i));
        }
    }
}

#[test]
fn test_erase_every_other_m5() {
    let mut tree = BStarTree::new(5).unwrap();
    for i in 0..30 {
        tree.insert(i, i);
    }
    for i in (0..30).step_by(2) {
        assert!(tree.erase(&i));
        assert!(!tree.contains(&i));
    }
    for i in (1..30).step_by(2) {
        assert_eq!(tree.find(&i), Some(&i));
    }
    tree.validate().unwrap();
}

#[test]
fn test_erase_all_m7_two_hundred() {
    let mut tree = BStarTree::new(7).unwrap();
    for i in 0..200 {
        tree.insert(i, i);
    }
    for i in 0..200 {
        assert!(tree.erase(&i));
    }
    for i in 0..200 {
        assert!(!tree.contains(&i));
    }
    tree.validate().unwrap();
}

#[test]
fn test_randomized_against_model_m6() {
    let mut tree = BStarTree::new(6).unwrap();
    let mut model = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(123_456);

    for step in 0..5000 {
        let key: i32 = rng.gen_range(0..1000);
        if rng.gen_bool(0.5) {
            tree.insert(key, key * 7);
            model.insert(key, key * 7);
        } else if tree.erase(&key) {
            assert!(model.remove(&key).is_some());
        } else {
            assert!(!model.contains_key(&key));
        }
        if step % 200 == 0 {
            tree.validate().unwrap();
            for probe in (0..1000).step_by(111) {
                assert_eq!(tree.find(&probe), model.get(&probe));
            }
            assert_eq!(tree.len(), model.len());
        }
    }
    tree.validate().unwrap();
    assert_eq!(tree.len(), model.len());
}

proptest! {
    #[test]
    fn prop_tree_matches_model(
        branching in 3usize..9,
        ops in prop::collection::vec((any::<bool>(), 0u16..300), 1..150)
    ) {
        let mut tree = BStarTree::new(branching).unwrap();
        let mut model = BTreeMap::new();
        for (insert, key) in ops {
            if insert {
                tree.insert(key, u32::from(key) + 1);
                model.insert(key, u32::from(key) + 1);
            } else {
                prop_assert_eq!(tree.erase(&key), model.remove(&key).is_some());
            }
            let check = tree.validate();
            prop_assert!(check.is_ok(), "invariant violated: {:?}", check);
        }
        for key in 0u16..300 {
            prop_assert_eq!(tree.find(&key), model.get(&key));
        }
        prop_assert_eq!(tree.len(), model.len());
    }
}
