//! Object deltas: per-property change tracking over a complex node.
//!
//! Reading a complex or collection property hands out a nested delta that
//! is cached, so repeated reads return the same [`DeltaId`]. Writing a
//! property stores a raw replacement, unless the new value is the original
//! one, in which case the entry is dropped again.

use crate::error::{DeltaError, Result};
use crate::tree::{DeltaId, DeltaState, DeltaTree, Field, ObjectState};
use std::sync::Arc;
use tracery_core::{TypeClassifier, Value, ANY_TYPE};

impl DeltaTree {
    fn object_state(&self, id: DeltaId) -> Result<&ObjectState> {
        match &self.node(id)?.state {
            DeltaState::Object(state) => Ok(state),
            DeltaState::Collection(_) => Err(DeltaError::NotAnObjectDelta(id.raw())),
        }
    }

    fn object_state_mut(&mut self, id: DeltaId) -> Result<&mut ObjectState> {
        match &mut self.node_mut(id)?.state {
            DeltaState::Object(state) => Ok(state),
            DeltaState::Collection(_) => Err(DeltaError::NotAnObjectDelta(id.raw())),
        }
    }

    /// Read a property through the delta.
    ///
    /// Complex and collection values come back as nested deltas parented to
    /// `id`; the nested delta is created on first read and reused afterwards.
    pub fn get(&mut self, id: DeltaId, property: &str) -> Result<Field> {
        let types = Arc::clone(&self.types);
        types.property(self.type_name(id)?, property)?;

        if let Some(field) = self.object_state(id)?.tracked.get(property) {
            return Ok(field.clone());
        }

        let value = self.graph.property(self.original(id)?, property)?;
        let field = self.create_nested_delta(id, &value)?;
        if let Field::Delta(child) = field {
            self.object_state_mut(id)?
                .tracked
                .insert(property.to_string(), Field::Delta(child));
        }
        Ok(field)
    }

    /// Current value of a property without creating nested deltas.
    pub fn current_value(&self, id: DeltaId, property: &str) -> Result<Value> {
        self.types.property(self.type_name(id)?, property)?;
        match self.object_state(id)?.tracked.get(property) {
            Some(field) => self.identity(field),
            None => Ok(self.graph.property(self.original(id)?, property)?),
        }
    }

    /// Write a property through the delta.
    ///
    /// A nested delta passed as the new value is stored as a reference to
    /// its original node. Writing the value already in place is a no-op;
    /// writing the original value back drops the pending change.
    pub fn set(&mut self, id: DeltaId, property: &str, value: impl Into<Field>) -> Result<()> {
        let value = value.into();
        let types = Arc::clone(&self.types);
        let type_name = self.type_name(id)?.to_string();
        let spec = types.property(&type_name, property)?;
        if !spec.is_writable() {
            return Err(DeltaError::NotSupported(format!(
                "Property {} of {} is read-only",
                property, type_name
            )));
        }

        let new_value = self.identity(&value)?;
        let current = self.get(id, property)?;
        let current_value = self.identity(&current)?;
        types.check_assignable(&spec.type_name, &new_value, &self.graph)?;
        if spec.type_name != ANY_TYPE {
            current_value.check_compatible(&new_value)?;
        }

        if current_value.same(&new_value) {
            return Ok(());
        }

        let original_value = self.graph.property(self.original(id)?, property)?;
        if original_value.same(&new_value) {
            tracing::trace!(delta = %id, property, "Reverted property");
            if let Some(previous) = self.object_state_mut(id)?.tracked.remove(property) {
                self.detach_from_parent(&previous)?;
            }
            return self.refresh_dirty(id);
        }

        tracing::trace!(delta = %id, property, "Changed property");
        let previous = self
            .object_state_mut(id)?
            .tracked
            .insert(property.to_string(), Field::Value(new_value));
        if let Some(previous) = previous {
            self.detach_from_parent(&previous)?;
        }
        self.set_dirty(id)
    }

    /// Every tracked entry, raw replacements and cached nested deltas alike,
    /// in property declaration order.
    pub fn tracked_properties(&self, id: DeltaId) -> Result<Vec<(String, Field)>> {
        let tracked = &self.object_state(id)?.tracked;
        let spec = self.types.type_spec(self.type_name(id)?)?;
        Ok(spec
            .properties
            .iter()
            .filter_map(|prop| {
                tracked
                    .get(&prop.name)
                    .map(|field| (prop.name.clone(), field.clone()))
            })
            .collect())
    }

    /// Raw replacements plus nested deltas that are dirty.
    pub fn modified_properties(&self, id: DeltaId) -> Result<Vec<(String, Field)>> {
        let mut modified = Vec::new();
        for (name, field) in self.tracked_properties(id)? {
            let changed = match field {
                Field::Value(_) => true,
                Field::Delta(child) => self.is_dirty(child)?,
            };
            if changed {
                modified.push((name, field));
            }
        }
        Ok(modified)
    }

    pub(crate) fn apply_object(&mut self, id: DeltaId) -> Result<()> {
        let types = Arc::clone(&self.types);
        let original = self.original(id)?;
        let type_name = self.type_name(id)?.to_string();

        for (property, field) in self.tracked_properties(id)? {
            match field {
                Field::Value(value) => {
                    let spec = types.property(&type_name, &property)?;
                    types.check_assignable(&spec.type_name, &value, &self.graph)?;
                    self.graph.set_property(original, &property, value)?;
                }
                Field::Delta(child) => self.apply_node(child)?,
            }
        }
        Ok(())
    }

    pub(crate) fn reset_object(&mut self, id: DeltaId) -> Result<()> {
        let state = self.object_state_mut(id)?;
        state.tracked.retain(|_, field| matches!(field, Field::Delta(_)));
        let children: Vec<DeltaId> = state.tracked.values().filter_map(Field::as_delta).collect();
        for child in children {
            self.reset_node(child)?;
        }
        Ok(())
    }
}
