//! Patch replay: patch document -> delta operations.
//!
//! The reader is the receiving side of [`PatchRenderer`](crate::PatchRenderer):
//! it walks a patch document and performs the equivalent edits through a
//! captured delta tree, so the usual dirty tracking and validation apply.

use crate::error::{PatchError, Result};
use crate::json::{expect_array, expect_object, unbox_scalar, ValueWriter, KEY_TAG, REF_TAG};
use crate::render::REPLACE_PREFIX;
use tracery_core::{SerializationMode, TypeClassifier, TypeKind, Value};
use tracery_delta::{DeltaId, DeltaKind, DeltaTree, Field};

/// Replays patch documents onto a delta tree.
pub struct PatchReader<'t> {
    tree: &'t mut DeltaTree,
}

impl<'t> PatchReader<'t> {
    pub fn new(tree: &'t mut DeltaTree) -> Self {
        Self { tree }
    }

    /// Replay `patch` onto the delta `id` without applying it.
    pub fn read(&mut self, id: DeltaId, patch: &serde_json::Value) -> Result<()> {
        tracing::debug!(delta = %id, "Reading patch");
        self.read_node(id, patch, "")
    }

    /// Parse and replay a patch given as a JSON string.
    pub fn read_str(&mut self, id: DeltaId, patch: &str) -> Result<()> {
        let patch: serde_json::Value = serde_json::from_str(patch)?;
        self.read(id, &patch)
    }

    fn read_node(&mut self, id: DeltaId, patch: &serde_json::Value, path: &str) -> Result<()> {
        match self.tree.kind(id)? {
            DeltaKind::Object => self.read_object(id, patch, path),
            DeltaKind::Collection => self.read_collection(id, patch, path),
        }
    }

    fn read_object(&mut self, id: DeltaId, patch: &serde_json::Value, path: &str) -> Result<()> {
        let entries = expect_object(patch, path)?;
        let types = self.tree.types().clone();
        let spec = types.type_spec(self.tree.type_name(id)?)?;

        for (key, json) in entries {
            if key == KEY_TAG {
                continue;
            }
            let (replace, json_name) = match key.strip_prefix(REPLACE_PREFIX) {
                Some(rest) => (true, rest),
                None => (false, key.as_str()),
            };
            let prop = spec.property_by_json_name(json_name).ok_or_else(|| {
                PatchError::UnknownProperty {
                    type_name: spec.name.clone(),
                    property: json_name.to_string(),
                }
            })?;
            let here = format!("{}/{}", path, key);

            if replace || types.classify(&prop.type_name)? == SerializationMode::Value {
                let value = self.materialize(&prop.type_name, json, &here)?;
                self.tree.set(id, &prop.name, value)?;
                continue;
            }
            if json.is_null() {
                self.tree.set(id, &prop.name, Value::Null)?;
                continue;
            }
            match self.tree.get(id, &prop.name)? {
                Field::Delta(child) => self.read_node(child, json, &here)?,
                Field::Value(Value::Node(_)) => {
                    return Err(PatchError::malformed(
                        &here,
                        "property was replaced and cannot be edited in place",
                    ))
                }
                Field::Value(_) => {
                    return Err(PatchError::malformed(&here, "cannot edit a property that holds null"))
                }
            }
        }
        Ok(())
    }

    fn read_collection(&mut self, id: DeltaId, patch: &serde_json::Value, path: &str) -> Result<()> {
        let sections = expect_object(patch, path)?;
        if let Some(unknown) = sections
            .keys()
            .find(|k| !matches!(k.as_str(), "added" | "removed" | "modified"))
        {
            return Err(PatchError::malformed(
                path,
                format!("unexpected collection section {}", unknown),
            ));
        }
        let types = self.tree.types().clone();
        let element = types.element_type(self.tree.type_name(id)?)?;

        if let Some(removed) = sections.get("removed") {
            let here = format!("{}/removed", path);
            for (i, key) in expect_array(removed, &here)?.iter().enumerate() {
                let item_path = format!("{}/{}", here, i);
                let index = self.find_by_key(id, element, key, &item_path)?;
                self.tree.remove_at(id, index)?;
            }
        }

        if let Some(added) = sections.get("added") {
            let here = format!("{}/added", path);
            for (i, item) in expect_array(added, &here)?.iter().enumerate() {
                let value = self.materialize(element, item, &format!("{}/{}", here, i))?;
                self.tree.add_item(id, value)?;
            }
        }

        if let Some(modified) = sections.get("modified") {
            let here = format!("{}/modified", path);
            for (i, item) in expect_array(modified, &here)?.iter().enumerate() {
                let item_path = format!("{}/{}", here, i);
                let key = expect_object(item, &item_path)?
                    .get(KEY_TAG)
                    .ok_or_else(|| PatchError::malformed(&item_path, "missing _key"))?;
                let index = self.find_by_key(id, element, key, &item_path)?;
                match self.tree.item(id, index)? {
                    Field::Delta(child) => self.read_node(child, item, &item_path)?,
                    Field::Value(_) => {
                        return Err(PatchError::malformed(
                            &item_path,
                            "item cannot be edited in place",
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    /// Index of the first tracked item whose identity key equals `key`.
    fn find_by_key(
        &mut self,
        id: DeltaId,
        element: &str,
        key: &serde_json::Value,
        path: &str,
    ) -> Result<usize> {
        let items = self.tree.items(id)?;
        let tree: &DeltaTree = &*self.tree;
        let writer = ValueWriter::new(tree);
        for (index, field) in items.iter().enumerate() {
            let identity = tree.identity(field)?;
            if &writer.identity_key(element, &identity)? == key {
                return Ok(index);
            }
        }
        Err(PatchError::malformed(path, format!("no item with key {}", key)))
    }

    /// Turn a full serialized value into a graph value, inserting new nodes
    /// for objects and collections.
    fn materialize(&mut self, declared: &str, json: &serde_json::Value, path: &str) -> Result<Value> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        let types = self.tree.types().clone();
        let spec = types.type_spec(declared)?;
        match &spec.kind {
            TypeKind::Any => unbox_scalar(json)
                .ok_or_else(|| PatchError::malformed(path, "cannot infer the type of a loose value")),
            TypeKind::Value => Value::from_json_scalar(json)
                .ok_or_else(|| PatchError::malformed(path, format!("expected a {} value", declared))),
            TypeKind::Complex => {
                let entries = expect_object(json, path)?;
                if entries.contains_key(REF_TAG) {
                    return Err(PatchError::malformed(path, "references cannot be materialized"));
                }
                let mut props: Vec<(String, Value)> = Vec::with_capacity(entries.len());
                for (json_name, value) in entries {
                    let prop = spec.property_by_json_name(json_name).ok_or_else(|| {
                        PatchError::UnknownProperty {
                            type_name: spec.name.clone(),
                            property: json_name.clone(),
                        }
                    })?;
                    let here = format!("{}/{}", path, json_name);
                    props.push((prop.name.clone(), self.materialize(&prop.type_name, value, &here)?));
                }
                let props = props.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
                Ok(Value::Node(self.tree.new_object(declared, props)?))
            }
            TypeKind::Collection { element } => {
                let mut items = Vec::new();
                for (i, item) in expect_array(json, path)?.iter().enumerate() {
                    items.push(self.materialize(element, item, &format!("{}/{}", path, i))?);
                }
                Ok(Value::Node(self.tree.new_collection(declared, items)?))
            }
        }
    }
}

/// Replay `patch` onto `id` and commit it.
pub fn apply_patch(tree: &mut DeltaTree, id: DeltaId, patch: &serde_json::Value) -> Result<()> {
    PatchReader::new(tree).read(id, patch)?;
    tree.apply(id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tracery_core::{ObjectGraph, TypeRegistry, ANY_TYPE};

    fn capture() -> (DeltaTree, DeltaId) {
        let types = TypeRegistry::builder()
            .complex("Critter", |t| {
                t.property("Name", "String")
                    .property("Mate", "Critter")
                    .property("Extra", ANY_TYPE)
            })
            .build()
            .unwrap();
        let mut graph = ObjectGraph::new();
        let mate = graph.insert_object("Critter", vec![("Name", "Goat".into())]);
        let root = graph.insert_object(
            "Critter",
            vec![("Name", "Sheep".into()), ("Mate", mate.into())],
        );
        DeltaTree::capture(graph, Arc::new(types), root).unwrap()
    }

    #[test]
    fn test_read_scalar_and_nested() {
        let (mut tree, root) = capture();
        PatchReader::new(&mut tree)
            .read(root, &json!({"name": "Lamb", "mate": {"name": "Billy"}}))
            .unwrap();

        assert_eq!(tree.current_value(root, "Name").unwrap(), Value::from("Lamb"));
        let mate = tree.get(root, "Mate").unwrap().as_delta().unwrap();
        assert_eq!(tree.current_value(mate, "Name").unwrap(), Value::from("Billy"));
        assert!(tree.is_dirty(root).unwrap());
    }

    #[test]
    fn test_read_replacement_materializes_node() {
        let (mut tree, root) = capture();
        PatchReader::new(&mut tree)
            .read(root, &json!({"!mate": {"name": "Ewe"}}))
            .unwrap();

        let node = tree.current_value(root, "Mate").unwrap().as_node().unwrap();
        assert_eq!(tree.graph().property(node, "Name").unwrap(), Value::from("Ewe"));
    }

    #[test]
    fn test_nested_edit_of_replaced_property_fails() {
        let (mut tree, root) = capture();
        let mut reader = PatchReader::new(&mut tree);
        reader.read(root, &json!({"!mate": {"name": "Ewe"}})).unwrap();

        let err = reader
            .read(root, &json!({"mate": {"name": "Billy"}}))
            .unwrap_err();
        match err {
            PatchError::Malformed { path, reason } => {
                assert_eq!(path, "/mate");
                assert_eq!(reason, "property was replaced and cannot be edited in place");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_read_boxed_scalar() {
        let (mut tree, root) = capture();
        PatchReader::new(&mut tree)
            .read(root, &json!({"extra": {"_type": "Int32", "value": 1337}}))
            .unwrap();
        assert_eq!(tree.current_value(root, "Extra").unwrap(), Value::Int(1337));
    }

    #[test]
    fn test_unknown_property() {
        let (mut tree, root) = capture();
        let err = PatchReader::new(&mut tree)
            .read(root, &json!({"wings": 2}))
            .unwrap_err();
        assert!(matches!(err, PatchError::UnknownProperty { ref property, .. } if property == "wings"));
    }

    #[test]
    fn test_malformed_documents() {
        let (mut tree, root) = capture();
        let err = PatchReader::new(&mut tree).read(root, &json!([1, 2])).unwrap_err();
        assert!(matches!(err, PatchError::Malformed { .. }));

        let err = PatchReader::new(&mut tree)
            .read(root, &json!({"mate": {"name": {"deep": true}}}))
            .unwrap_err();
        match err {
            PatchError::Malformed { path, .. } => assert_eq!(path, "/mate/name"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_read_str_rejects_invalid_json() {
        let (mut tree, root) = capture();
        let err = PatchReader::new(&mut tree).read_str(root, "{not json").unwrap_err();
        assert!(matches!(err, PatchError::Serialization(_)));
    }

    #[test]
    fn test_apply_patch_commits() {
        let (mut tree, root) = capture();
        apply_patch(&mut tree, root, &json!({"name": "Lamb"})).unwrap();

        let node = tree.original(root).unwrap();
        assert_eq!(tree.graph().property(node, "Name").unwrap(), Value::from("Lamb"));
        assert!(!tree.is_dirty(root).unwrap());
    }
}
