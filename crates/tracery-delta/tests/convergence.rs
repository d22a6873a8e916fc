//! Convergence tests for collection and object deltas
//!
//! These tests replay random edit sequences through a delta and directly
//! against a plain model, then check that applying the delta brings the
//! captured graph to the model's state.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracery_core::{ObjectGraph, TypeRegistry, Value};
use tracery_delta::{DeltaId, DeltaTree};

const ALPHABET: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn registry() -> Arc<TypeRegistry> {
    Arc::new(
        TypeRegistry::builder()
            .complex("Post", |t| {
                t.property("Title", "String")
                    .property("Score", "Int64")
                    .property("Tags", "TagList")
            })
            .collection("TagList", "String")
            .build()
            .unwrap(),
    )
}

fn capture_tags(tags: &[&str]) -> (DeltaTree, DeltaId) {
    let mut graph = ObjectGraph::new();
    let items = tags.iter().map(|t| Value::from(*t)).collect();
    let list = graph.insert_collection("TagList", items);
    let post = graph.insert_object(
        "Post",
        vec![("Title", "Hello".into()), ("Score", 0.into()), ("Tags", list.into())],
    );
    DeltaTree::capture(graph, registry(), post).unwrap()
}

fn distinct_sorted(values: &[Value]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Apply a random edit to both the delta and the model.
fn random_edit(rng: &mut StdRng, tree: &mut DeltaTree, tags: DeltaId, model: &mut Vec<Value>) {
    let tag = Value::from(*ALPHABET.choose(rng).unwrap());
    match rng.gen_range(0..3) {
        0 => {
            tree.add_item(tags, tag.clone()).unwrap();
            model.push(tag);
        }
        1 => {
            let removed = tree.remove_item(tags, tag.clone()).unwrap();
            let pos = model.iter().position(|v| v.same(&tag));
            assert_eq!(removed, pos.is_some());
            if let Some(pos) = pos {
                model.remove(pos);
            }
        }
        _ => {
            if !model.is_empty() {
                let index = rng.gen_range(0..model.len());
                tree.set_item(tags, index, tag.clone()).unwrap();
                model[index] = tag;
            }
        }
    }
}

// ============================================================================
// Randomized Convergence Tests
// ============================================================================

#[test]
fn test_collection_converges_to_model() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let (mut tree, root) = capture_tags(&["a", "b", "c"]);
        let tags = tree.get(root, "Tags").unwrap().as_delta().unwrap();
        let mut model: Vec<Value> = ["a", "b", "c"].iter().map(|t| Value::from(*t)).collect();

        for _ in 0..rng.gen_range(1..20) {
            random_edit(&mut rng, &mut tree, tags, &mut model);
        }

        let list = tree.original(tags).unwrap();
        tree.apply(root).unwrap();

        assert_eq!(
            distinct_sorted(tree.graph().items(list).unwrap()),
            distinct_sorted(&model)
        );
        assert!(!tree.is_dirty(root).unwrap());
    }
}

#[test]
fn test_object_converges_to_last_write() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..50 {
        let (mut tree, root) = capture_tags(&[]);
        let mut expected = 0i64;

        for _ in 0..rng.gen_range(1..10) {
            expected = rng.gen_range(-3..3);
            tree.set(root, "Score", expected).unwrap();
        }
        // Dirty exactly when the last write differs from the capture.
        assert_eq!(tree.is_dirty(root).unwrap(), expected != 0);

        let post = tree.original(root).unwrap();
        tree.apply(root).unwrap();
        assert_eq!(tree.graph().property(post, "Score").unwrap(), Value::Int(expected));
    }
}

#[test]
fn test_reapply_after_convergence_is_stable() {
    let mut rng = StdRng::seed_from_u64(3);
    let (mut tree, root) = capture_tags(&["a", "b"]);
    let tags = tree.get(root, "Tags").unwrap().as_delta().unwrap();
    let mut model: Vec<Value> = vec!["a".into(), "b".into()];

    for _ in 0..30 {
        random_edit(&mut rng, &mut tree, tags, &mut model);
    }
    tree.apply(root).unwrap();
    let snapshot = tree.graph().clone();

    tree.apply(root).unwrap();
    assert_eq!(tree.graph(), &snapshot);
}

// ============================================================================
// Property Tests
// ============================================================================

fn ops_strategy() -> impl Strategy<Value = Vec<(bool, usize)>> {
    prop::collection::vec((any::<bool>(), 0..ALPHABET.len()), 0..30)
}

proptest! {
    #[test]
    fn added_and_removed_never_overlap(ops in ops_strategy()) {
        let (mut tree, root) = capture_tags(&["a", "b", "c"]);
        let tags = tree.get(root, "Tags").unwrap().as_delta().unwrap();

        for (add, i) in ops {
            if add {
                tree.add_item(tags, ALPHABET[i]).unwrap();
            } else {
                tree.remove_item(tags, ALPHABET[i]).unwrap();
            }
        }

        let added = tree.added_items(tags).unwrap();
        let removed = tree.removed_items(tags).unwrap();
        for item in &added {
            prop_assert!(!removed.iter().any(|r| r.same(item)));
        }
    }

    #[test]
    fn dirty_child_implies_dirty_ancestors(ops in ops_strategy()) {
        let (mut tree, root) = capture_tags(&["a"]);
        let tags = tree.get(root, "Tags").unwrap().as_delta().unwrap();

        for (add, i) in ops {
            if add {
                tree.add_item(tags, ALPHABET[i]).unwrap();
            } else {
                tree.remove_item(tags, ALPHABET[i]).unwrap();
            }
            if tree.is_dirty(tags).unwrap() {
                prop_assert!(tree.is_dirty(root).unwrap());
            }
        }
    }

    #[test]
    fn collection_is_dirty_only_with_a_net_change(ops in ops_strategy()) {
        let (mut tree, root) = capture_tags(&["a", "b"]);
        let tags = tree.get(root, "Tags").unwrap().as_delta().unwrap();

        for (add, i) in ops {
            if add {
                tree.add_item(tags, ALPHABET[i]).unwrap();
            } else {
                tree.remove_item(tags, ALPHABET[i]).unwrap();
            }
            let changed = !tree.added_items(tags).unwrap().is_empty()
                || !tree.removed_items(tags).unwrap().is_empty();
            prop_assert_eq!(tree.is_dirty(tags).unwrap(), changed);
            prop_assert_eq!(tree.is_dirty(root).unwrap(), changed);
        }
    }

    #[test]
    fn writing_original_back_reverts(titles in prop::collection::vec("[a-z]{1,4}", 0..8)) {
        let (mut tree, root) = capture_tags(&[]);
        for title in titles {
            tree.set(root, "Title", title).unwrap();
        }
        tree.set(root, "Title", "Hello").unwrap();

        prop_assert!(tree.modified_properties(root).unwrap().is_empty());
        prop_assert!(!tree.is_dirty(root).unwrap());
    }
}
