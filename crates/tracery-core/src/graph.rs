//! Captured object graph.
//!
//! Objects and collections live in an arena and refer to each other through
//! [`NodeId`]s, so the graph may share nodes and contain cycles. The graph
//! is untyped; the [`TypeRegistry`](crate::types::TypeRegistry) gives the
//! meaning of each node's `type_name`.

use crate::error::{CoreError, Result};
use crate::value::{NodeId, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Payload of a graph node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeData {
    /// Object with named properties.
    Object(BTreeMap<String, Value>),
    /// Ordered collection of items.
    Collection(Vec<Value>),
}

/// A node in the graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub type_name: String,
    pub data: NodeData,
}

/// Arena of objects and collections.
///
/// Cloning the graph is the supported way to keep an all-or-nothing
/// snapshot before a non-transactional apply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectGraph {
    nodes: Vec<Node>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Number of nodes ever inserted.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert an object node.
    pub fn insert_object(&mut self, type_name: &str, properties: Vec<(&str, Value)>) -> NodeId {
        let properties = properties
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.push(Node {
            type_name: type_name.to_string(),
            data: NodeData::Object(properties),
        })
    }

    /// Insert a collection node.
    pub fn insert_collection(&mut self, type_name: &str, items: Vec<Value>) -> NodeId {
        self.push(Node {
            type_name: type_name.to_string(),
            data: NodeData::Collection(items),
        })
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .ok_or(CoreError::NodeNotFound(id.raw()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .ok_or(CoreError::NodeNotFound(id.raw()))
    }

    pub fn type_name(&self, id: NodeId) -> Result<&str> {
        Ok(&self.node(id)?.type_name)
    }

    pub fn is_collection(&self, id: NodeId) -> Result<bool> {
        Ok(matches!(self.node(id)?.data, NodeData::Collection(_)))
    }

    /// All properties of an object node.
    pub fn properties(&self, id: NodeId) -> Result<&BTreeMap<String, Value>> {
        match &self.node(id)?.data {
            NodeData::Object(props) => Ok(props),
            NodeData::Collection(_) => Err(CoreError::NotAnObject(id.raw())),
        }
    }

    /// Read a property. Properties never assigned read as `Null`.
    pub fn property(&self, id: NodeId, name: &str) -> Result<Value> {
        Ok(self.properties(id)?.get(name).cloned().unwrap_or_default())
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: Value) -> Result<()> {
        match &mut self.node_mut(id)?.data {
            NodeData::Object(props) => {
                props.insert(name.to_string(), value);
                Ok(())
            }
            NodeData::Collection(_) => Err(CoreError::NotAnObject(id.raw())),
        }
    }

    pub fn items(&self, id: NodeId) -> Result<&[Value]> {
        match &self.node(id)?.data {
            NodeData::Collection(items) => Ok(items),
            NodeData::Object(_) => Err(CoreError::NotACollection(id.raw())),
        }
    }

    fn items_mut(&mut self, id: NodeId) -> Result<&mut Vec<Value>> {
        match &mut self.node_mut(id)?.data {
            NodeData::Collection(items) => Ok(items),
            NodeData::Object(_) => Err(CoreError::NotACollection(id.raw())),
        }
    }

    pub fn add_item(&mut self, id: NodeId, value: Value) -> Result<()> {
        self.items_mut(id)?.push(value);
        Ok(())
    }

    /// Remove the first item identical to `value`. Returns whether one was found.
    pub fn remove_item(&mut self, id: NodeId, value: &Value) -> Result<bool> {
        let items = self.items_mut(id)?;
        match items.iter().position(|item| item.same(value)) {
            Some(pos) => {
                items.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn contains_item(&self, id: NodeId, value: &Value) -> Result<bool> {
        Ok(self.items(id)?.iter().any(|item| item.same(value)))
    }

    /// Render a node as plain JSON using raw property names.
    ///
    /// A node reached again while it is still being rendered becomes
    /// `{"_ref": "#n"}`.
    pub fn to_json(&self, id: NodeId) -> Result<serde_json::Value> {
        let mut in_progress = HashSet::new();
        self.node_to_json(id, &mut in_progress)
    }

    fn node_to_json(
        &self,
        id: NodeId,
        in_progress: &mut HashSet<NodeId>,
    ) -> Result<serde_json::Value> {
        if !in_progress.insert(id) {
            return Ok(serde_json::json!({ "_ref": id.to_string() }));
        }
        let json = match &self.node(id)?.data {
            NodeData::Object(props) => {
                let mut map = serde_json::Map::new();
                for (key, value) in props {
                    map.insert(key.clone(), self.value_to_json(value, in_progress)?);
                }
                serde_json::Value::Object(map)
            }
            NodeData::Collection(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| self.value_to_json(v, in_progress))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };
        in_progress.remove(&id);
        Ok(json)
    }

    fn value_to_json(
        &self,
        value: &Value,
        in_progress: &mut HashSet<NodeId>,
    ) -> Result<serde_json::Value> {
        match value {
            Value::Node(id) => self.node_to_json(*id, in_progress),
            scalar => Ok(scalar.to_json_scalar().unwrap_or(serde_json::Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_properties() {
        let mut graph = ObjectGraph::new();
        let id = graph.insert_object("Critter", vec![("Name", "Sheep".into())]);

        assert_eq!(graph.property(id, "Name").unwrap(), Value::from("Sheep"));
        assert_eq!(graph.property(id, "Missing").unwrap(), Value::Null);

        graph.set_property(id, "Name", "Goat".into()).unwrap();
        assert_eq!(graph.property(id, "Name").unwrap(), Value::from("Goat"));
    }

    #[test]
    fn test_collection_items() {
        let mut graph = ObjectGraph::new();
        let list = graph.insert_collection("Tags", vec!["a".into(), "b".into(), "a".into()]);

        assert!(graph.is_collection(list).unwrap());
        assert!(graph.remove_item(list, &"a".into()).unwrap());
        assert_eq!(graph.items(list).unwrap(), &[Value::from("b"), Value::from("a")]);
        assert!(!graph.remove_item(list, &"z".into()).unwrap());

        graph.add_item(list, "c".into()).unwrap();
        assert_eq!(graph.items(list).unwrap().len(), 3);
    }

    #[test]
    fn test_kind_errors() {
        let mut graph = ObjectGraph::new();
        let obj = graph.insert_object("Critter", vec![]);
        let list = graph.insert_collection("Tags", vec![]);

        assert_eq!(graph.items(obj).unwrap_err(), CoreError::NotACollection(obj.raw()));
        assert_eq!(
            graph.set_property(list, "x", Value::Null).unwrap_err(),
            CoreError::NotAnObject(list.raw())
        );
        assert_eq!(
            graph.node(NodeId(99)).unwrap_err(),
            CoreError::NodeNotFound(99)
        );
    }

    #[test]
    fn test_to_json_handles_cycles() {
        let mut graph = ObjectGraph::new();
        let a = graph.insert_object("Person", vec![("Name", "A".into())]);
        let b = graph.insert_object("Person", vec![("Name", "B".into()), ("Spouse", a.into())]);
        graph.set_property(a, "Spouse", b.into()).unwrap();

        let json = graph.to_json(a).unwrap();
        assert_eq!(json["Name"], "A");
        assert_eq!(json["Spouse"]["Name"], "B");
        assert_eq!(json["Spouse"]["Spouse"]["_ref"], a.to_string());
    }

    #[test]
    fn test_shared_nodes_render_twice() {
        let mut graph = ObjectGraph::new();
        let shared = graph.insert_object("Tag", vec![("Label", "x".into())]);
        let list = graph.insert_collection("Tags", vec![shared.into(), shared.into()]);

        let json = graph.to_json(list).unwrap();
        assert_eq!(json[0]["Label"], "x");
        assert_eq!(json[1]["Label"], "x");
    }
}
