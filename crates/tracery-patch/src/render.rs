//! Patch rendering: delta tree -> patch document.
//!
//! # Document layout
//!
//! ```text
//! object patch   := { key: entry, ... }
//!   "name": v                  scalar change, or complex property set to null
//!   "!name": { full node }     complex property replaced by another value
//!   "name": { object patch }   complex property edited in place
//!   "name": { collection patch }
//!
//! collection patch := { "added": [full item, ...],
//!                       "removed": [key, ...],
//!                       "modified": [{ "_key": key, ...object patch }, ...] }
//! ```
//!
//! Only modified properties appear; a clean delta renders as `{}`.

use crate::error::Result;
use crate::json::{ValueWriter, KEY_TAG};
use serde_json::{json, Map};
use tracery_core::{SerializationMode, TypeClassifier, Value};
use tracery_delta::{DeltaId, DeltaKind, DeltaTree, Field};

/// Prefix marking a full replacement of a complex property.
pub const REPLACE_PREFIX: char = '!';

/// Renders the accumulated edits of a delta tree.
pub struct PatchRenderer<'a> {
    tree: &'a DeltaTree,
    writer: ValueWriter<'a>,
}

impl<'a> PatchRenderer<'a> {
    pub fn new(tree: &'a DeltaTree) -> Self {
        Self {
            tree,
            writer: ValueWriter::new(tree),
        }
    }

    /// Render the patch document of `id`.
    pub fn render(&self, id: DeltaId) -> Result<serde_json::Value> {
        if !self.tree.is_dirty(id)? {
            return Ok(json!({}));
        }
        let patch = self.render_node(id)?;
        tracing::debug!(delta = %id, "Rendered patch");
        Ok(patch)
    }

    /// Render as a JSON string.
    pub fn render_string(&self, id: DeltaId) -> Result<String> {
        Ok(serde_json::to_string(&self.render(id)?)?)
    }

    fn render_node(&self, id: DeltaId) -> Result<serde_json::Value> {
        match self.tree.kind(id)? {
            DeltaKind::Object => self.render_object(id),
            DeltaKind::Collection => self.render_collection(id),
        }
    }

    fn render_object(&self, id: DeltaId) -> Result<serde_json::Value> {
        let types = self.tree.types();
        let type_name = self.tree.type_name(id)?;
        let mut map = Map::new();

        for (name, field) in self.tree.modified_properties(id)? {
            let prop = types.property(type_name, &name)?;
            match field {
                Field::Delta(child) => {
                    map.insert(prop.json_name.clone(), self.render_node(child)?);
                }
                Field::Value(value) => {
                    let by_value = types.classify(&prop.type_name)? == SerializationMode::Value;
                    match value {
                        Value::Node(_) => {
                            map.insert(
                                format!("{}{}", REPLACE_PREFIX, prop.json_name),
                                self.writer.value(&prop.type_name, &value)?,
                            );
                        }
                        Value::Null if !by_value => {
                            map.insert(prop.json_name.clone(), serde_json::Value::Null);
                        }
                        scalar => {
                            map.insert(
                                prop.json_name.clone(),
                                self.writer.value(&prop.type_name, &scalar)?,
                            );
                        }
                    }
                }
            }
        }
        Ok(serde_json::Value::Object(map))
    }

    fn render_collection(&self, id: DeltaId) -> Result<serde_json::Value> {
        let types = self.tree.types();
        let element = types.element_type(self.tree.type_name(id)?)?;

        let mut added = Vec::new();
        for item in self.tree.added_items(id)? {
            added.push(self.writer.value(element, &item)?);
        }

        let mut removed = Vec::new();
        for item in self.tree.removed_items(id)? {
            removed.push(self.writer.identity_key(element, &item)?);
        }

        let mut modified = Vec::new();
        for child in self.tree.modified_items(id)? {
            let key = self
                .writer
                .identity_key(element, &Value::Node(self.tree.original(child)?))?;
            let mut patch = match self.render_node(child)? {
                serde_json::Value::Object(map) => map,
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other);
                    map
                }
            };
            patch.insert(KEY_TAG.to_string(), key);
            modified.push(serde_json::Value::Object(patch));
        }

        Ok(json!({
            "added": added,
            "removed": removed,
            "modified": modified,
        }))
    }
}

/// Render the patch document of `id`.
pub fn render_patch(tree: &DeltaTree, id: DeltaId) -> Result<serde_json::Value> {
    PatchRenderer::new(tree).render(id)
}
