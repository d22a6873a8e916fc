//! Collection deltas: set-semantics change tracking over a collection node.
//!
//! The tracked item list is seeded from the original collection on first
//! access. Complex items are wrapped in nested deltas, scalar items are kept
//! as plain values. Changes are summarized as three derived sets, compared
//! by identity:
//!
//! - added: plain items not present in the original
//! - removed: original items no longer tracked
//! - modified: wrapped items whose delta is dirty
//!
//! Ordering and duplicate counts are not tracked, so the delta is dirty only
//! while one of the three sets is non-empty. An edit that cancels out, such
//! as removing an item and adding it back, leaves it clean.

use crate::error::{DeltaError, Result};
use crate::tree::{CollectionState, DeltaId, DeltaState, DeltaTree, Field};
use std::sync::Arc;
use tracery_core::{TypeClassifier, Value};

impl DeltaTree {
    fn collection_state(&self, id: DeltaId) -> Result<&CollectionState> {
        match &self.node(id)?.state {
            DeltaState::Collection(state) => Ok(state),
            DeltaState::Object(_) => Err(DeltaError::NotACollectionDelta(id.raw())),
        }
    }

    fn collection_state_mut(&mut self, id: DeltaId) -> Result<&mut CollectionState> {
        match &mut self.node_mut(id)?.state {
            DeltaState::Collection(state) => Ok(state),
            DeltaState::Object(_) => Err(DeltaError::NotACollectionDelta(id.raw())),
        }
    }

    /// Whether the tracked item list has been seeded yet.
    pub fn is_loaded(&self, id: DeltaId) -> Result<bool> {
        Ok(self.collection_state(id)?.loaded)
    }

    fn ensure_loaded(&mut self, id: DeltaId) -> Result<()> {
        if self.collection_state(id)?.loaded {
            return Ok(());
        }
        let values = self.graph.items(self.original(id)?)?.to_vec();
        let mut items = Vec::with_capacity(values.len());
        for value in &values {
            items.push(self.create_nested_delta(id, value)?);
        }
        let state = self.collection_state_mut(id)?;
        state.items = items;
        state.loaded = true;
        Ok(())
    }

    /// Tracked items in their current order.
    pub fn items(&mut self, id: DeltaId) -> Result<Vec<Field>> {
        self.ensure_loaded(id)?;
        Ok(self.collection_state(id)?.items.clone())
    }

    pub fn item_count(&mut self, id: DeltaId) -> Result<usize> {
        self.ensure_loaded(id)?;
        Ok(self.collection_state(id)?.items.len())
    }

    pub fn item(&mut self, id: DeltaId, index: usize) -> Result<Field> {
        self.ensure_loaded(id)?;
        let items = &self.collection_state(id)?.items;
        items
            .get(index)
            .cloned()
            .ok_or(DeltaError::IndexOutOfBounds {
                index,
                length: items.len(),
            })
    }

    /// Position of the first tracked item identical to `item`.
    pub fn index_of(&mut self, id: DeltaId, item: impl Into<Field>) -> Result<Option<usize>> {
        self.ensure_loaded(id)?;
        let target = self.identity(&item.into())?;
        self.position(id, &target)
    }

    pub fn contains(&mut self, id: DeltaId, item: impl Into<Field>) -> Result<bool> {
        Ok(self.index_of(id, item)?.is_some())
    }

    fn position(&self, id: DeltaId, target: &Value) -> Result<Option<usize>> {
        for (pos, field) in self.collection_state(id)?.items.iter().enumerate() {
            if self.identity(field)?.same(target) {
                return Ok(Some(pos));
            }
        }
        Ok(None)
    }

    /// Validate an incoming item against the element type and turn it into
    /// the form it is tracked in.
    fn incoming(&mut self, id: DeltaId, item: Field) -> Result<Field> {
        let types = Arc::clone(&self.types);
        let element = types.element_type(self.type_name(id)?)?;
        let value = self.identity(&item)?;
        types.check_assignable(element, &value, &self.graph)?;

        if let Field::Delta(child) = item {
            let node = self.node(child)?;
            if node.parent.is_none() && node.detached_from == Some(id) {
                let node = self.node_mut(child)?;
                node.parent = Some(id);
                node.detached_from = None;
                return Ok(Field::Delta(child));
            }
        }
        Ok(Field::Value(value))
    }

    /// Append an item.
    pub fn add_item(&mut self, id: DeltaId, item: impl Into<Field>) -> Result<()> {
        self.ensure_loaded(id)?;
        let field = self.incoming(id, item.into())?;
        self.collection_state_mut(id)?.items.push(field);
        tracing::trace!(delta = %id, "Added item");
        self.sync_dirty(id)
    }

    pub fn insert_item(&mut self, id: DeltaId, index: usize, item: impl Into<Field>) -> Result<()> {
        self.ensure_loaded(id)?;
        let length = self.collection_state(id)?.items.len();
        if index > length {
            return Err(DeltaError::IndexOutOfBounds { index, length });
        }
        let field = self.incoming(id, item.into())?;
        self.collection_state_mut(id)?.items.insert(index, field);
        self.sync_dirty(id)
    }

    /// Remove the first item identical to `item`. Returns whether one was found.
    pub fn remove_item(&mut self, id: DeltaId, item: impl Into<Field>) -> Result<bool> {
        self.ensure_loaded(id)?;
        let target = self.identity(&item.into())?;
        match self.position(id, &target)? {
            Some(pos) => {
                self.remove_at(id, pos)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_at(&mut self, id: DeltaId, index: usize) -> Result<Field> {
        self.ensure_loaded(id)?;
        let items = &mut self.collection_state_mut(id)?.items;
        if index >= items.len() {
            return Err(DeltaError::IndexOutOfBounds {
                index,
                length: items.len(),
            });
        }
        let removed = items.remove(index);
        self.detach_from_parent(&removed)?;
        tracing::trace!(delta = %id, index, "Removed item");
        self.sync_dirty(id)?;
        Ok(removed)
    }

    /// Overwrite the item at `index`. Writing the identical item is a no-op.
    pub fn set_item(&mut self, id: DeltaId, index: usize, item: impl Into<Field>) -> Result<()> {
        let current = self.item(id, index)?;
        let item = item.into();
        if self.identity(&current)?.same(&self.identity(&item)?) {
            return Ok(());
        }
        let field = self.incoming(id, item)?;
        let previous = std::mem::replace(&mut self.collection_state_mut(id)?.items[index], field);
        self.detach_from_parent(&previous)?;
        self.sync_dirty(id)
    }

    pub fn clear(&mut self, id: DeltaId) -> Result<()> {
        self.ensure_loaded(id)?;
        let removed = std::mem::take(&mut self.collection_state_mut(id)?.items);
        if removed.is_empty() {
            return Ok(());
        }
        for field in &removed {
            self.detach_from_parent(field)?;
        }
        self.sync_dirty(id)
    }

    /// Plain items not present in the original collection.
    pub fn added_items(&self, id: DeltaId) -> Result<Vec<Value>> {
        let state = self.collection_state(id)?;
        if !state.loaded {
            return Ok(Vec::new());
        }
        let originals = self.graph.items(self.original(id)?)?;
        let mut added: Vec<Value> = Vec::new();
        for field in &state.items {
            if let Field::Value(value) = field {
                let known = originals.iter().any(|o| o.same(value))
                    || added.iter().any(|a| a.same(value));
                if !known {
                    added.push(value.clone());
                }
            }
        }
        Ok(added)
    }

    /// Original items no longer tracked.
    pub fn removed_items(&self, id: DeltaId) -> Result<Vec<Value>> {
        let state = self.collection_state(id)?;
        if !state.loaded {
            return Ok(Vec::new());
        }
        let mut current = Vec::with_capacity(state.items.len());
        for field in &state.items {
            current.push(self.identity(field)?);
        }
        let mut removed: Vec<Value> = Vec::new();
        for original in self.graph.items(self.original(id)?)? {
            let kept = current.iter().any(|c| c.same(original))
                || removed.iter().any(|r| r.same(original));
            if !kept {
                removed.push(original.clone());
            }
        }
        Ok(removed)
    }

    /// Wrapped items whose nested delta is dirty.
    pub fn modified_items(&self, id: DeltaId) -> Result<Vec<DeltaId>> {
        let state = self.collection_state(id)?;
        let mut modified = Vec::new();
        for field in &state.items {
            if let Field::Delta(child) = field {
                if self.is_dirty(*child)? {
                    modified.push(*child);
                }
            }
        }
        Ok(modified)
    }

    pub(crate) fn apply_collection(&mut self, id: DeltaId) -> Result<()> {
        if !self.collection_state(id)?.loaded {
            return Ok(());
        }
        // Snapshot before mutating: the derived sets read the original.
        let removed = self.removed_items(id)?;
        let added = self.added_items(id)?;
        let modified = self.modified_items(id)?;

        let types = Arc::clone(&self.types);
        let element = types.element_type(self.type_name(id)?)?;
        let original = self.original(id)?;
        tracing::debug!(
            delta = %id,
            added = added.len(),
            removed = removed.len(),
            modified = modified.len(),
            "Applying collection delta"
        );

        for item in &removed {
            self.graph.remove_item(original, item)?;
        }
        for item in added {
            types.check_assignable(element, &item, &self.graph)?;
            self.graph.add_item(original, item)?;
        }
        for child in modified {
            self.apply_node(child)?;
        }
        Ok(())
    }

    /// Reseed the tracked items from the original collection, reusing the
    /// nested deltas that still wrap an original item.
    pub(crate) fn reset_collection(&mut self, id: DeltaId) -> Result<()> {
        if !self.collection_state(id)?.loaded {
            return Ok(());
        }
        let previous = std::mem::take(&mut self.collection_state_mut(id)?.items);
        let mut reusable: Vec<DeltaId> = previous.iter().filter_map(Field::as_delta).collect();

        let originals = self.graph.items(self.original(id)?)?.to_vec();
        let mut items = Vec::with_capacity(originals.len());
        for value in &originals {
            let reuse = match value.as_node() {
                Some(node) => reusable
                    .iter()
                    .position(|child| self.original(*child).map_or(false, |o| o == node)),
                None => None,
            };
            match reuse {
                Some(pos) => {
                    let child = reusable.swap_remove(pos);
                    self.node_mut(child)?.parent = Some(id);
                    self.reset_node(child)?;
                    items.push(Field::Delta(child));
                }
                None => items.push(self.create_nested_delta(id, value)?),
            }
        }
        for child in reusable {
            self.detach_from_parent(&Field::Delta(child))?;
        }
        self.collection_state_mut(id)?.items = items;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracery_core::{CoreError, NodeId, ObjectGraph, TypeClassifier, TypeRegistry};

    fn types() -> Arc<dyn TypeClassifier> {
        Arc::new(
            TypeRegistry::builder()
                .complex("Child", |t| t.property("Name", "String"))
                .collection("Children", "Child")
                .collection("Tags", "String")
                .build()
                .unwrap(),
        )
    }

    struct Fixture {
        tree: DeltaTree,
        list: DeltaId,
        bar: NodeId,
        doomed: NodeId,
    }

    fn fixture() -> Fixture {
        let mut graph = ObjectGraph::new();
        let bar = graph.insert_object("Child", vec![("Name", "Childbar".into())]);
        let doomed = graph.insert_object("Child", vec![("Name", "ChildToRemove".into())]);
        let node = graph.insert_collection("Children", vec![bar.into(), doomed.into()]);
        let (tree, list) = DeltaTree::capture(graph, types(), node).unwrap();
        Fixture {
            tree,
            list,
            bar,
            doomed,
        }
    }

    #[test]
    fn test_lazy_seeding() {
        let Fixture { mut tree, list, .. } = fixture();
        assert!(!tree.is_loaded(list).unwrap());
        assert!(tree.added_items(list).unwrap().is_empty());

        let items = tree.items(list).unwrap();
        assert!(tree.is_loaded(list).unwrap());
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|f| f.as_delta().is_some()));
    }

    #[test]
    fn test_scalar_items_are_seeded() {
        let mut graph = ObjectGraph::new();
        let node = graph.insert_collection("Tags", vec!["a".into(), "b".into()]);
        let (mut tree, list) = DeltaTree::capture(graph, types(), node).unwrap();

        assert_eq!(tree.item_count(list).unwrap(), 2);
        tree.remove_item(list, "a").unwrap();
        tree.add_item(list, "c").unwrap();

        assert_eq!(tree.removed_items(list).unwrap(), vec![Value::from("a")]);
        assert_eq!(tree.added_items(list).unwrap(), vec![Value::from("c")]);
    }

    #[test]
    fn test_add_and_remove() {
        let Fixture {
            mut tree,
            list,
            doomed,
            ..
        } = fixture();
        let fresh = tree
            .new_object("Child", vec![("Name", "Newly added".into())])
            .unwrap();

        tree.add_item(list, fresh).unwrap();
        assert!(tree.remove_item(list, doomed).unwrap());

        assert!(tree.is_dirty(list).unwrap());
        assert_eq!(tree.added_items(list).unwrap(), vec![Value::Node(fresh)]);
        assert_eq!(tree.removed_items(list).unwrap(), vec![Value::Node(doomed)]);
        assert!(tree.modified_items(list).unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_item() {
        let Fixture { mut tree, list, .. } = fixture();
        assert!(!tree.remove_item(list, Value::Null).unwrap());
        assert!(!tree.is_dirty(list).unwrap());
    }

    #[test]
    fn test_removed_item_is_detached() {
        let Fixture {
            mut tree,
            list,
            doomed,
            ..
        } = fixture();
        let index = tree.index_of(list, doomed).unwrap().unwrap();
        let wrapped = tree.item(list, index).unwrap().as_delta().unwrap();

        tree.remove_item(list, Field::Delta(wrapped)).unwrap();
        assert_eq!(tree.parent(wrapped).unwrap(), None);
    }

    #[test]
    fn test_readding_removed_item_keeps_edits() {
        let Fixture {
            mut tree,
            list,
            bar,
            ..
        } = fixture();
        let index = tree.index_of(list, bar).unwrap().unwrap();
        let child = tree.item(list, index).unwrap().as_delta().unwrap();
        tree.set(child, "Name", "Renamed").unwrap();

        tree.remove_item(list, bar).unwrap();
        tree.add_item(list, Field::Delta(child)).unwrap();

        assert_eq!(tree.parent(child).unwrap(), Some(list));
        assert!(tree.added_items(list).unwrap().is_empty());
        assert!(tree.removed_items(list).unwrap().is_empty());
        assert_eq!(tree.modified_items(list).unwrap(), vec![child]);
    }

    #[test]
    fn test_modified_items() {
        let Fixture {
            mut tree,
            list,
            bar,
            ..
        } = fixture();
        let child = tree.item(list, 0).unwrap().as_delta().unwrap();
        assert_eq!(tree.original(child).unwrap(), bar);

        tree.set(child, "Name", "Modified").unwrap();
        assert!(tree.is_dirty(list).unwrap());
        assert_eq!(tree.modified_items(list).unwrap(), vec![child]);
    }

    #[test]
    fn test_added_and_removed_are_disjoint() {
        let Fixture {
            mut tree,
            list,
            doomed,
            ..
        } = fixture();
        tree.remove_item(list, doomed).unwrap();
        tree.add_item(list, doomed).unwrap();

        assert!(tree.added_items(list).unwrap().is_empty());
        assert!(tree.removed_items(list).unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_edits_leave_collection_clean() {
        let mut graph = ObjectGraph::new();
        let node = graph.insert_collection("Tags", vec!["a".into(), "b".into()]);
        let (mut tree, list) = DeltaTree::capture(graph, types(), node).unwrap();

        tree.set_item(list, 0, "z").unwrap();
        assert!(tree.is_dirty(list).unwrap());
        tree.set_item(list, 0, "a").unwrap();
        assert!(!tree.is_dirty(list).unwrap());

        tree.insert_item(list, 0, "b").unwrap();
        tree.remove_at(list, 2).unwrap();
        assert_eq!(tree.items(list).unwrap(), vec![Field::from("b"), Field::from("a")]);
        assert!(!tree.is_dirty(list).unwrap());

        tree.clear(list).unwrap();
        assert!(tree.is_dirty(list).unwrap());
    }

    #[test]
    fn test_wrong_element_type_is_rejected() {
        let Fixture { mut tree, list, .. } = fixture();
        let err = tree.add_item(list, "not a child").unwrap_err();
        assert_eq!(
            err,
            DeltaError::Core(CoreError::IncompatibleValue {
                expected: "Child".to_string(),
                found: "String".to_string()
            })
        );
        assert!(!tree.is_dirty(list).unwrap());
    }

    #[test]
    fn test_index_errors() {
        let Fixture { mut tree, list, .. } = fixture();
        assert_eq!(
            tree.item(list, 5).unwrap_err(),
            DeltaError::IndexOutOfBounds {
                index: 5,
                length: 2
            }
        );
        assert!(tree.insert_item(list, 3, Value::Null).is_err());
        assert!(tree.remove_at(list, 2).is_err());
    }

    #[test]
    fn test_set_item_replaces() {
        let Fixture {
            mut tree,
            list,
            bar,
            ..
        } = fixture();
        let fresh = tree.new_object("Child", vec![]).unwrap();
        let wrapped = tree.item(list, 0).unwrap().as_delta().unwrap();

        tree.set_item(list, 0, bar).unwrap();
        assert!(!tree.is_dirty(list).unwrap());

        tree.set_item(list, 0, fresh).unwrap();
        assert_eq!(tree.parent(wrapped).unwrap(), None);
        assert_eq!(tree.added_items(list).unwrap(), vec![Value::Node(fresh)]);
        assert_eq!(tree.removed_items(list).unwrap(), vec![Value::Node(bar)]);
    }

    #[test]
    fn test_clear_removes_everything() {
        let Fixture {
            mut tree,
            list,
            bar,
            doomed,
        } = fixture();
        tree.clear(list).unwrap();
        assert_eq!(
            tree.removed_items(list).unwrap(),
            vec![Value::Node(bar), Value::Node(doomed)]
        );
    }

    #[test]
    fn test_apply_commits_and_reseeds() {
        let Fixture {
            mut tree,
            list,
            bar,
            doomed,
        } = fixture();
        let fresh = tree
            .new_object("Child", vec![("Name", "Newly added".into())])
            .unwrap();
        let child = tree.item(list, 0).unwrap().as_delta().unwrap();
        tree.set(child, "Name", "Modified").unwrap();
        tree.remove_item(list, doomed).unwrap();
        tree.add_item(list, fresh).unwrap();

        tree.apply(list).unwrap();

        let node = tree.original(list).unwrap();
        assert_eq!(
            tree.graph().items(node).unwrap(),
            &[Value::Node(bar), Value::Node(fresh)]
        );
        assert_eq!(
            tree.graph().property(bar, "Name").unwrap(),
            Value::from("Modified")
        );
        assert!(!tree.is_dirty(list).unwrap());
        assert!(!tree.is_dirty(child).unwrap());
        assert_eq!(tree.item(list, 0).unwrap(), Field::Delta(child));
        assert!(tree.item(list, 1).unwrap().as_delta().is_some());
    }

    #[test]
    fn test_reset_restores_original_items() {
        let Fixture {
            mut tree,
            list,
            doomed,
            ..
        } = fixture();
        let fresh = tree.new_object("Child", vec![]).unwrap();
        tree.remove_item(list, doomed).unwrap();
        tree.add_item(list, fresh).unwrap();

        tree.reset(list).unwrap();

        assert!(!tree.is_dirty(list).unwrap());
        assert_eq!(tree.item_count(list).unwrap(), 2);
        assert!(tree.contains(list, doomed).unwrap());
        assert!(!tree.contains(list, fresh).unwrap());
    }

    #[test]
    fn test_reset_unloaded_is_noop() {
        let Fixture { mut tree, list, .. } = fixture();
        tree.reset(list).unwrap();
        assert!(!tree.is_loaded(list).unwrap());
    }
}
