//! Delta tree: the shared base of object and collection deltas.
//!
//! Every delta lives in an arena owned by [`DeltaTree`] and is addressed by a
//! [`DeltaId`]. A delta records the original node it shadows, its parent
//! delta (if any) and a dirty flag. The tree also owns the captured
//! [`ObjectGraph`], so applying a delta is just a set of graph writes.
//!
//! # Dirty propagation
//!
//! ```text
//! set_dirty(d):
//!   d.dirty = true
//!   if d.parent != None: set_dirty(d.parent)
//! ```
//!
//! A node that becomes dirty never stays nested under a clean parent, so the
//! root's flag is enough to know whether anything changed.
//!
//! # Apply and reset
//!
//! `apply` on a root commits the whole subtree into the graph and then resets
//! it, leaving a clean tree whose originals hold the new state. Applying a
//! nested delta commits only that subtree and leaves it dirty.
//!
//! # Reclaiming
//!
//! Deltas detached by a remove or a replacement stay addressable until their
//! root is reset or applied. Then every delta that hangs off that root only
//! through detached links goes back to a free list. Reused slots get a new
//! generation, so a stale [`DeltaId`] fails with `DeltaNotFound`.

use crate::error::{DeltaError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracery_core::{NodeId, ObjectGraph, SerializationMode, TypeClassifier, Value};

/// Identifier of a delta within a [`DeltaTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeltaId {
    index: u32,
    generation: u32,
}

impl DeltaId {
    /// Raw arena index.
    pub fn raw(self) -> u32 {
        self.index
    }

    /// How many times the slot had been reclaimed when this id was handed out.
    pub fn generation(self) -> u32 {
        self.generation
    }

    fn index(self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for DeltaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.generation == 0 {
            write!(f, "delta#{}", self.index)
        } else {
            write!(f, "delta#{}v{}", self.index, self.generation)
        }
    }
}

/// What a property or collection slot currently holds.
///
/// Complex and collection values reached through a delta are handed out as
/// nested deltas; everything else is a plain value.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Value(Value),
    Delta(DeltaId),
}

impl Field {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(v) => Some(v),
            Field::Delta(_) => None,
        }
    }

    pub fn as_delta(&self) -> Option<DeltaId> {
        match self {
            Field::Delta(id) => Some(*id),
            Field::Value(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Value(Value::Null))
    }
}

impl From<Value> for Field {
    fn from(v: Value) -> Self {
        Field::Value(v)
    }
}

impl From<DeltaId> for Field {
    fn from(id: DeltaId) -> Self {
        Field::Delta(id)
    }
}

impl From<NodeId> for Field {
    fn from(id: NodeId) -> Self {
        Field::Value(Value::Node(id))
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Value(s.into())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Value(s.into())
    }
}

impl From<i64> for Field {
    fn from(i: i64) -> Self {
        Field::Value(i.into())
    }
}

impl From<i32> for Field {
    fn from(i: i32) -> Self {
        Field::Value(i.into())
    }
}

impl From<f64> for Field {
    fn from(f: f64) -> Self {
        Field::Value(f.into())
    }
}

impl From<bool> for Field {
    fn from(b: bool) -> Self {
        Field::Value(b.into())
    }
}

/// Which side of the delta family a node belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaKind {
    Object,
    Collection,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ObjectState {
    /// Property name -> raw replacement or cached nested delta.
    pub(crate) tracked: BTreeMap<String, Field>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct CollectionState {
    /// Set on first access; nothing is tracked before that.
    pub(crate) loaded: bool,
    pub(crate) items: Vec<Field>,
}

#[derive(Clone, Debug)]
pub(crate) enum DeltaState {
    Object(ObjectState),
    Collection(CollectionState),
}

#[derive(Clone, Debug)]
pub(crate) struct DeltaNode {
    pub(crate) original: NodeId,
    pub(crate) type_name: String,
    pub(crate) parent: Option<DeltaId>,
    /// Parent this delta was last detached from, so a removed collection
    /// item that is added back keeps its pending edits.
    pub(crate) detached_from: Option<DeltaId>,
    pub(crate) dirty: bool,
    pub(crate) state: DeltaState,
}

impl DeltaNode {
    /// The delta this one hangs off, attached or not.
    fn owner(&self) -> Option<DeltaId> {
        self.parent.or(self.detached_from)
    }

    fn children(&self) -> Vec<DeltaId> {
        match &self.state {
            DeltaState::Object(state) => state.tracked.values().filter_map(Field::as_delta).collect(),
            DeltaState::Collection(state) => state.items.iter().filter_map(Field::as_delta).collect(),
        }
    }
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    node: Option<DeltaNode>,
}

/// Arena of deltas over a captured object graph.
#[derive(Debug, Clone)]
pub struct DeltaTree {
    pub(crate) graph: ObjectGraph,
    pub(crate) types: Arc<dyn TypeClassifier>,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl DeltaTree {
    /// Create an empty tree over `graph`.
    pub fn new(graph: ObjectGraph, types: Arc<dyn TypeClassifier>) -> Self {
        Self {
            graph,
            types,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Capture `graph` and start tracking `root`.
    pub fn capture(
        graph: ObjectGraph,
        types: Arc<dyn TypeClassifier>,
        root: NodeId,
    ) -> Result<(Self, DeltaId)> {
        let mut tree = Self::new(graph, types);
        let id = tree.track(root)?;
        tracing::debug!(delta = %id, node = %root, "Captured graph");
        Ok((tree, id))
    }

    /// Start tracking another root node.
    pub fn track(&mut self, node: NodeId) -> Result<DeltaId> {
        let value = Value::Node(node);
        match self.types.classify_value(&value, &self.graph)? {
            SerializationMode::Complex => self.alloc(node, None, DeltaKind::Object),
            SerializationMode::Collection => self.collection_delta(node, None),
            SerializationMode::Value => Err(DeltaError::InvalidArgument(format!(
                "{} of type {} cannot be tracked",
                node,
                self.graph.type_name(node)?
            ))),
        }
    }

    /// Start tracking a collection node as a root.
    pub fn track_collection(&mut self, node: NodeId) -> Result<DeltaId> {
        self.collection_delta(node, None)
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn types(&self) -> &Arc<dyn TypeClassifier> {
        &self.types
    }

    pub fn into_graph(self) -> ObjectGraph {
        self.graph
    }

    /// Insert a fresh object into the graph, e.g. as a replacement value.
    pub fn new_object(&mut self, type_name: &str, properties: Vec<(&str, Value)>) -> Result<NodeId> {
        let spec = self.types.type_spec(type_name)?;
        if spec.mode() != SerializationMode::Complex {
            return Err(DeltaError::InvalidArgument(format!(
                "{} is not a complex type",
                type_name
            )));
        }
        for (name, value) in &properties {
            let prop = self.types.property(type_name, name)?;
            self.types
                .check_assignable(&prop.type_name, value, &self.graph)?;
        }
        Ok(self.graph.insert_object(type_name, properties))
    }

    /// Insert a fresh collection into the graph.
    pub fn new_collection(&mut self, type_name: &str, items: Vec<Value>) -> Result<NodeId> {
        let element = self.types.element_type(type_name)?.to_string();
        for item in &items {
            self.types.check_assignable(&element, item, &self.graph)?;
        }
        Ok(self.graph.insert_collection(type_name, items))
    }

    pub(crate) fn node(&self, id: DeltaId) -> Result<&DeltaNode> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(DeltaError::DeltaNotFound(id.raw()))
    }

    pub(crate) fn node_mut(&mut self, id: DeltaId) -> Result<&mut DeltaNode> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(DeltaError::DeltaNotFound(id.raw()))
    }

    /// Number of live deltas in the arena.
    pub fn delta_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether `id` still refers to a live delta.
    pub fn contains_delta(&self, id: DeltaId) -> bool {
        self.node(id).is_ok()
    }

    /// The original node a delta shadows.
    pub fn original(&self, id: DeltaId) -> Result<NodeId> {
        Ok(self.node(id)?.original)
    }

    /// Declared type of the original node.
    pub fn type_name(&self, id: DeltaId) -> Result<&str> {
        Ok(&self.node(id)?.type_name)
    }

    pub fn parent(&self, id: DeltaId) -> Result<Option<DeltaId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn is_dirty(&self, id: DeltaId) -> Result<bool> {
        Ok(self.node(id)?.dirty)
    }

    pub fn kind(&self, id: DeltaId) -> Result<DeltaKind> {
        Ok(match self.node(id)?.state {
            DeltaState::Object(_) => DeltaKind::Object,
            DeltaState::Collection(_) => DeltaKind::Collection,
        })
    }

    /// Mark `id` and every ancestor dirty.
    pub fn set_dirty(&mut self, id: DeltaId) -> Result<()> {
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.node_mut(cur)?;
            node.dirty = true;
            current = node.parent;
        }
        Ok(())
    }

    /// Sever the parent link of a nested delta. Plain values are ignored.
    ///
    /// The former parent keeps its own dirty flag.
    pub fn detach_from_parent(&mut self, field: &Field) -> Result<()> {
        if let Field::Delta(id) = field {
            let node = self.node_mut(*id)?;
            if let Some(parent) = node.parent.take() {
                node.detached_from = Some(parent);
            }
        }
        Ok(())
    }

    /// Identity of what a field refers to: nested deltas stand for their original.
    pub fn identity(&self, field: &Field) -> Result<Value> {
        match field {
            Field::Value(v) => Ok(v.clone()),
            Field::Delta(id) => Ok(Value::Node(self.original(*id)?)),
        }
    }

    /// Wrap `value` in a nested delta parented to `parent` when it is complex
    /// or a collection; scalars come back as plain values.
    pub fn create_nested_delta(&mut self, parent: DeltaId, value: &Value) -> Result<Field> {
        let node = match value {
            Value::Node(node) => *node,
            other => return Ok(Field::Value(other.clone())),
        };
        match self.types.classify_value(value, &self.graph)? {
            SerializationMode::Complex => {
                Ok(Field::Delta(self.alloc(node, Some(parent), DeltaKind::Object)?))
            }
            SerializationMode::Collection => Ok(Field::Delta(self.collection_delta(node, Some(parent))?)),
            SerializationMode::Value => Ok(Field::Value(value.clone())),
        }
    }

    pub(crate) fn collection_delta(
        &mut self,
        node: NodeId,
        parent: Option<DeltaId>,
    ) -> Result<DeltaId> {
        let is_collection = self.graph.is_collection(node)?
            && self.types.classify(self.graph.type_name(node)?)? == SerializationMode::Collection;
        if !is_collection {
            return Err(DeltaError::InvalidArgument(
                "Original value must be a collection type".to_string(),
            ));
        }
        self.alloc(node, parent, DeltaKind::Collection)
    }

    fn alloc(&mut self, original: NodeId, parent: Option<DeltaId>, kind: DeltaKind) -> Result<DeltaId> {
        let type_name = self.graph.type_name(original)?.to_string();
        let state = match kind {
            DeltaKind::Object => {
                self.graph.properties(original)?;
                DeltaState::Object(ObjectState::default())
            }
            DeltaKind::Collection => DeltaState::Collection(CollectionState::default()),
        };
        let node = DeltaNode {
            original,
            type_name,
            parent,
            detached_from: None,
            dirty: false,
            state,
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                DeltaId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    DeltaError::InvalidArgument("delta arena is full".to_string())
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                DeltaId {
                    index,
                    generation: 0,
                }
            }
        };
        tracing::trace!(delta = %id, node = %original, "Created delta");
        Ok(id)
    }

    fn id_at(&self, index: usize) -> Option<DeltaId> {
        let slot = self.slots.get(index)?;
        slot.node.as_ref()?;
        Some(DeltaId {
            index: index as u32,
            generation: slot.generation,
        })
    }

    /// Free every delta that belongs to `root` but is no longer reachable
    /// from it through attached links. Returns how many were freed.
    pub(crate) fn reclaim(&mut self, root: DeltaId) -> Result<usize> {
        let mut reachable = vec![false; self.slots.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut reachable[id.index()], true) {
                continue;
            }
            stack.extend(self.node(id)?.children());
        }

        let mut doomed = Vec::new();
        for index in 0..self.slots.len() {
            if reachable[index] {
                continue;
            }
            let Some(id) = self.id_at(index) else {
                continue;
            };
            // Owner links always point at a delta created before the child
            // and freed no earlier, so the walk ends at a root.
            let mut top = id;
            while let Some(owner) = self.node(top)?.owner() {
                top = owner;
            }
            if top == root {
                doomed.push(index);
            }
        }

        for &index in &doomed {
            let slot = &mut self.slots[index];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
        }
        if !doomed.is_empty() {
            tracing::debug!(delta = %root, freed = doomed.len(), "Reclaimed detached deltas");
        }
        Ok(doomed.len())
    }

    /// Recompute the dirty flag of `id` from its tracked state and, when it
    /// changes, propagate the recomputation to the parent.
    pub(crate) fn refresh_dirty(&mut self, id: DeltaId) -> Result<()> {
        let mut current = Some(id);
        while let Some(cur) = current {
            let dirty = self.compute_dirty(cur)?;
            let node = self.node_mut(cur)?;
            if node.dirty == dirty {
                break;
            }
            node.dirty = dirty;
            current = node.parent;
        }
        Ok(())
    }

    /// Bring the dirty flag of `id` in line with its tracked state after an
    /// edit that may have added or cancelled a change.
    pub(crate) fn sync_dirty(&mut self, id: DeltaId) -> Result<()> {
        if self.compute_dirty(id)? {
            self.set_dirty(id)
        } else {
            self.refresh_dirty(id)
        }
    }

    fn compute_dirty(&self, id: DeltaId) -> Result<bool> {
        match &self.node(id)?.state {
            DeltaState::Object(state) => {
                for field in state.tracked.values() {
                    match field {
                        Field::Value(_) => return Ok(true),
                        Field::Delta(child) => {
                            if self.is_dirty(*child)? {
                                return Ok(true);
                            }
                        }
                    }
                }
                Ok(false)
            }
            DeltaState::Collection(state) => {
                if !state.loaded {
                    return Ok(false);
                }
                Ok(!self.added_items(id)?.is_empty()
                    || !self.removed_items(id)?.is_empty()
                    || !self.modified_items(id)?.is_empty())
            }
        }
    }

    /// Commit the delta into the graph.
    ///
    /// A root delta is reset afterwards. When a write fails the error is
    /// returned as-is: writes already made stay committed and the tree is
    /// left dirty.
    pub fn apply(&mut self, id: DeltaId) -> Result<()> {
        if !self.is_dirty(id)? {
            return Ok(());
        }
        tracing::debug!(delta = %id, "Applying delta");
        self.apply_node(id)?;
        if self.parent(id)?.is_none() {
            self.reset(id)?;
        }
        Ok(())
    }

    pub(crate) fn apply_node(&mut self, id: DeltaId) -> Result<()> {
        if !self.is_dirty(id)? {
            return Ok(());
        }
        match self.kind(id)? {
            DeltaKind::Object => self.apply_object(id),
            DeltaKind::Collection => self.apply_collection(id),
        }
    }

    /// Discard all tracked changes of `id` and its nested deltas.
    ///
    /// Resetting a nested delta also clears ancestors that were only dirty
    /// because of it. Resetting a root reclaims the deltas detached under it.
    pub fn reset(&mut self, id: DeltaId) -> Result<()> {
        tracing::debug!(delta = %id, "Resetting delta");
        self.reset_node(id)?;
        match self.parent(id)? {
            Some(parent) => self.refresh_dirty(parent)?,
            None => {
                self.reclaim(id)?;
            }
        }
        Ok(())
    }

    pub(crate) fn reset_node(&mut self, id: DeltaId) -> Result<()> {
        match self.kind(id)? {
            DeltaKind::Object => self.reset_object(id)?,
            DeltaKind::Collection => self.reset_collection(id)?,
        }
        self.node_mut(id)?.dirty = false;
        Ok(())
    }
}
