//! Tracery core: the value model, the captured object graph and the static
//! type descriptors consumed by the delta engine.

pub mod error;
pub mod graph;
pub mod types;
pub mod value;

pub use error::{CoreError, Result};
pub use graph::{Node, NodeData, ObjectGraph};
pub use types::{
    Access, PropertySpec, ResourceInfo, SerializationMode, TypeClassifier, TypeKind,
    TypeRegistry, TypeRegistryBuilder, TypeSpec, ANY_TYPE,
};
pub use value::{NodeId, Value};
