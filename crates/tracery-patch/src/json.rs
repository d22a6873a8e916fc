//! JSON form of graph values as it appears inside patch documents.
//!
//! Objects use the declared `json_name` of each property and only carry the
//! properties actually stored on the node. Scalars in loosely-typed slots are
//! boxed as `{"_type": "<TypeName>", "value": v}`, except strings, which are
//! written bare.

use crate::error::{PatchError, Result};
use serde_json::{json, Map};
use std::collections::HashSet;
use tracery_core::{NodeId, SerializationMode, TypeClassifier, TypeKind, Value};
use tracery_delta::DeltaTree;

pub const TYPE_TAG: &str = "_type";
pub const VALUE_TAG: &str = "value";
pub const REF_TAG: &str = "_ref";
pub const KEY_TAG: &str = "_key";

/// Serializes values of a delta tree's graph.
pub(crate) struct ValueWriter<'a> {
    tree: &'a DeltaTree,
}

impl<'a> ValueWriter<'a> {
    pub(crate) fn new(tree: &'a DeltaTree) -> Self {
        Self { tree }
    }

    fn is_any(&self, declared: &str) -> Result<bool> {
        Ok(self.tree.types().type_spec(declared)?.kind == TypeKind::Any)
    }

    /// Serialize `value` stored in a slot declared as `declared`.
    pub(crate) fn value(&self, declared: &str, value: &Value) -> Result<serde_json::Value> {
        let mut in_progress = HashSet::new();
        self.value_inner(declared, value, &mut in_progress)
    }

    fn value_inner(
        &self,
        declared: &str,
        value: &Value,
        in_progress: &mut HashSet<NodeId>,
    ) -> Result<serde_json::Value> {
        match value {
            Value::Node(node) => self.node(*node, in_progress),
            scalar if self.is_any(declared)? => Ok(box_scalar(scalar)),
            scalar => Ok(scalar.to_json_scalar().unwrap_or(serde_json::Value::Null)),
        }
    }

    fn node(&self, node: NodeId, in_progress: &mut HashSet<NodeId>) -> Result<serde_json::Value> {
        if !in_progress.insert(node) {
            return Ok(json!({ REF_TAG: node.to_string() }));
        }
        let graph = self.tree.graph();
        let types = self.tree.types();
        let type_name = graph.type_name(node)?;
        let json = match types.classify(type_name)? {
            SerializationMode::Collection => {
                let element = types.element_type(type_name)?;
                let mut items = Vec::new();
                for item in graph.items(node)? {
                    items.push(self.value_inner(element, item, in_progress)?);
                }
                serde_json::Value::Array(items)
            }
            _ => {
                let spec = types.type_spec(type_name)?;
                let stored = graph.properties(node)?;
                let mut map = Map::new();
                for prop in &spec.properties {
                    if let Some(value) = stored.get(&prop.name) {
                        map.insert(
                            prop.json_name.clone(),
                            self.value_inner(&prop.type_name, value, in_progress)?,
                        );
                    }
                }
                serde_json::Value::Object(map)
            }
        };
        in_progress.remove(&node);
        Ok(json)
    }

    /// Key identifying a collection item: the id property of resource
    /// objects, the full serialized value otherwise.
    pub(crate) fn identity_key(&self, element: &str, value: &Value) -> Result<serde_json::Value> {
        if let Value::Node(node) = value {
            let graph = self.tree.graph();
            let types = self.tree.types();
            let spec = types.type_spec(graph.type_name(*node)?)?;
            let id_property = spec
                .resource
                .as_ref()
                .and_then(|r| r.id_property.as_ref());
            if let Some(id_property) = id_property {
                let prop = types.property(&spec.name, id_property)?;
                let id = graph.property(*node, id_property)?;
                return self.value(&prop.type_name, &id);
            }
        }
        self.value(element, value)
    }
}

/// Box a scalar for a loosely-typed slot. Strings and null stay bare.
pub fn box_scalar(value: &Value) -> serde_json::Value {
    let json = value.to_json_scalar().unwrap_or(serde_json::Value::Null);
    match value {
        Value::Null | Value::String(_) | Value::Node(_) => json,
        other => json!({ TYPE_TAG: other.kind_name(), VALUE_TAG: json }),
    }
}

/// Inverse of [`box_scalar`]. Returns `None` for anything that is not a
/// scalar or a boxed scalar.
pub fn unbox_scalar(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Object(map) => {
            let tag = map.get(TYPE_TAG)?.as_str()?;
            let inner = Value::from_json_scalar(map.get(VALUE_TAG)?)?;
            match (tag, inner) {
                ("Double", Value::Int(i)) => Some(Value::Float(i as f64)),
                (_, inner) => Some(inner),
            }
        }
        other => Value::from_json_scalar(other),
    }
}

/// Reject JSON that cannot be stored in a slot of the given kind.
pub(crate) fn expect_object<'j>(
    json: &'j serde_json::Value,
    path: &str,
) -> Result<&'j Map<String, serde_json::Value>> {
    json.as_object()
        .ok_or_else(|| PatchError::malformed(path, "expected a JSON object"))
}

pub(crate) fn expect_array<'j>(
    json: &'j serde_json::Value,
    path: &str,
) -> Result<&'j Vec<serde_json::Value>> {
    json.as_array()
        .ok_or_else(|| PatchError::malformed(path, "expected a JSON array"))
}
