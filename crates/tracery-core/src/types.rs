//! Static type descriptors.
//!
//! The delta engine never inspects values reflectively. Every type it can
//! meet is declared up front in a [`TypeRegistry`], which tells the engine
//! whether a value is passed through (`Value`), diffed property by property
//! (`Complex`) or diffed as a set of items (`Collection`).

use crate::error::{CoreError, Result};
use crate::graph::ObjectGraph;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Loosely-typed slot: accepts any value, boxes scalars when serialized.
pub const ANY_TYPE: &str = "Object";

const BUILTIN_VALUE_TYPES: [&str; 5] = ["Boolean", "Int32", "Int64", "Double", "String"];

/// What kind of type a [`TypeSpec`] describes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    /// Scalar passed by value.
    Value,
    /// Loosely-typed slot.
    Any,
    /// Object diffed per property.
    Complex,
    /// Collection diffed with set semantics.
    Collection { element: String },
}

/// How a value of some type participates in a delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerializationMode {
    Value,
    Complex,
    Collection,
}

/// Whether a property accepts writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

/// A declared property of a complex type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// Property name as used by the engine.
    pub name: String,
    /// Key used in patch documents.
    pub json_name: String,
    /// Declared type of the property.
    pub type_name: String,
    pub access: Access,
}

impl PropertySpec {
    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }
}

/// Addressing information for complex types exposed as remote resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Path segment under the service base URI, e.g. `critters`.
    pub url_relative_path: String,
    /// Property holding the resource key.
    pub id_property: Option<String>,
    /// Property holding the concurrency token sent as `If-Match`.
    pub etag_property: Option<String>,
}

/// Descriptor of a single type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub name: String,
    pub kind: TypeKind,
    /// Declared properties, in declaration order. Empty unless `Complex`.
    pub properties: Vec<PropertySpec>,
    pub resource: Option<ResourceInfo>,
}

impl TypeSpec {
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_by_json_name(&self, json_name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.json_name == json_name)
    }

    pub fn element_type(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Collection { element } => Some(element),
            _ => None,
        }
    }

    pub fn mode(&self) -> SerializationMode {
        match self.kind {
            TypeKind::Value | TypeKind::Any => SerializationMode::Value,
            TypeKind::Complex => SerializationMode::Complex,
            TypeKind::Collection { .. } => SerializationMode::Collection,
        }
    }
}

/// The type classification capability consumed by the delta engine.
pub trait TypeClassifier: Send + Sync + std::fmt::Debug {
    /// Look up a declared type.
    fn type_spec(&self, type_name: &str) -> Result<&TypeSpec>;

    fn classify(&self, type_name: &str) -> Result<SerializationMode> {
        Ok(self.type_spec(type_name)?.mode())
    }

    fn property(&self, type_name: &str, property: &str) -> Result<&PropertySpec> {
        self.type_spec(type_name)?
            .property(property)
            .ok_or_else(|| CoreError::UnknownProperty {
                type_name: type_name.to_string(),
                property: property.to_string(),
            })
    }

    /// Declared element type of a collection type.
    fn element_type(&self, type_name: &str) -> Result<&str> {
        let spec = self.type_spec(type_name)?;
        spec.element_type()
            .ok_or_else(|| CoreError::IncompatibleValue {
                expected: "collection type".to_string(),
                found: type_name.to_string(),
            })
    }

    /// Classify a concrete value by its runtime type.
    ///
    /// Nodes are classified by the type they were inserted with, so a
    /// complex value stored in a loosely-typed slot is still diffed.
    fn classify_value(&self, value: &Value, graph: &ObjectGraph) -> Result<SerializationMode> {
        match value {
            Value::Node(id) => self.classify(graph.type_name(*id)?),
            _ => Ok(SerializationMode::Value),
        }
    }

    /// Check that `value` may be stored in a slot declared as `type_name`.
    fn check_assignable(&self, type_name: &str, value: &Value, graph: &ObjectGraph) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        let spec = self.type_spec(type_name)?;
        let ok = match (&spec.kind, value) {
            (TypeKind::Any, _) => true,
            (TypeKind::Value, v) => match (spec.name.as_str(), v) {
                ("Boolean", Value::Bool(_)) => true,
                ("Int32", Value::Int(i)) => i32::try_from(*i).is_ok(),
                ("Int64", Value::Int(_)) => true,
                ("Double", Value::Int(_) | Value::Float(_)) => true,
                ("String", Value::String(_)) => true,
                _ => false,
            },
            (TypeKind::Complex | TypeKind::Collection { .. }, Value::Node(id)) => {
                graph.type_name(*id)? == spec.name
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            let found = match value {
                Value::Node(id) => graph.type_name(*id)?.to_string(),
                other => other.kind_name().to_string(),
            };
            Err(CoreError::IncompatibleValue {
                expected: spec.name.clone(),
                found,
            })
        }
    }
}

/// Registry of all types a delta tree may encounter.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TypeRegistry {
    types: HashMap<String, TypeSpec>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }

    /// All declared type names.
    pub fn type_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.types.keys().map(String::as_str)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }
}

impl TypeClassifier for TypeRegistry {
    fn type_spec(&self, type_name: &str) -> Result<&TypeSpec> {
        self.types
            .get(type_name)
            .ok_or_else(|| CoreError::UnknownType(type_name.to_string()))
    }
}

/// Builder for a [`TypeRegistry`]. Built-in scalar types are pre-registered.
pub struct TypeRegistryBuilder {
    types: HashMap<String, TypeSpec>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        for name in BUILTIN_VALUE_TYPES {
            types.insert(
                name.to_string(),
                TypeSpec {
                    name: name.to_string(),
                    kind: TypeKind::Value,
                    properties: Vec::new(),
                    resource: None,
                },
            );
        }
        types.insert(
            ANY_TYPE.to_string(),
            TypeSpec {
                name: ANY_TYPE.to_string(),
                kind: TypeKind::Any,
                properties: Vec::new(),
                resource: None,
            },
        );
        Self { types }
    }

    /// Declare a complex type.
    pub fn complex(
        mut self,
        name: impl Into<String>,
        define: impl FnOnce(ComplexTypeBuilder) -> ComplexTypeBuilder,
    ) -> Self {
        let name = name.into();
        let built = define(ComplexTypeBuilder::new(name.clone())).finish();
        self.types.insert(name, built);
        self
    }

    /// Declare a collection type with the given element type.
    pub fn collection(mut self, name: impl Into<String>, element: impl Into<String>) -> Self {
        let name = name.into();
        self.types.insert(
            name.clone(),
            TypeSpec {
                name,
                kind: TypeKind::Collection {
                    element: element.into(),
                },
                properties: Vec::new(),
                resource: None,
            },
        );
        self
    }

    /// Validate that every referenced type is declared.
    pub fn build(self) -> Result<TypeRegistry> {
        for spec in self.types.values() {
            if let Some(element) = spec.element_type() {
                if !self.types.contains_key(element) {
                    return Err(CoreError::UnknownType(element.to_string()));
                }
            }
            for prop in &spec.properties {
                if !self.types.contains_key(&prop.type_name) {
                    return Err(CoreError::UnknownType(prop.type_name.clone()));
                }
            }
            if let Some(resource) = &spec.resource {
                for key in [&resource.id_property, &resource.etag_property]
                    .into_iter()
                    .flatten()
                {
                    if spec.property(key).is_none() {
                        return Err(CoreError::UnknownProperty {
                            type_name: spec.name.clone(),
                            property: key.clone(),
                        });
                    }
                }
            }
        }
        Ok(TypeRegistry { types: self.types })
    }
}

impl Default for TypeRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the properties and resource info of one complex type.
pub struct ComplexTypeBuilder {
    spec: TypeSpec,
}

impl ComplexTypeBuilder {
    fn new(name: String) -> Self {
        Self {
            spec: TypeSpec {
                name,
                kind: TypeKind::Complex,
                properties: Vec::new(),
                resource: None,
            },
        }
    }

    /// Declare a writable property.
    pub fn property(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.declare(name.into(), type_name.into(), Access::ReadWrite)
    }

    /// Declare a get-only property. Its value may still be edited in place.
    pub fn read_only(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.declare(name.into(), type_name.into(), Access::ReadOnly)
    }

    /// Override the patch document key of the last declared property.
    pub fn json_name(mut self, json_name: impl Into<String>) -> Self {
        if let Some(last) = self.spec.properties.last_mut() {
            last.json_name = json_name.into();
        }
        self
    }

    /// Expose the type as a resource under `url_relative_path`.
    pub fn resource(mut self, url_relative_path: impl Into<String>) -> Self {
        self.spec.resource = Some(ResourceInfo {
            url_relative_path: url_relative_path.into(),
            id_property: None,
            etag_property: None,
        });
        self
    }

    pub fn id(mut self, property: impl Into<String>) -> Self {
        if let Some(resource) = self.spec.resource.as_mut() {
            resource.id_property = Some(property.into());
        }
        self
    }

    pub fn etag(mut self, property: impl Into<String>) -> Self {
        if let Some(resource) = self.spec.resource.as_mut() {
            resource.etag_property = Some(property.into());
        }
        self
    }

    fn declare(mut self, name: String, type_name: String, access: Access) -> Self {
        let json_name = camel_case(&name);
        self.spec.properties.push(PropertySpec {
            name,
            json_name,
            type_name,
            access,
        });
        self
    }

    fn finish(self) -> TypeSpec {
        self.spec
    }
}

fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
