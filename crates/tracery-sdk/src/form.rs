//! Typed forms over delta trees.
//!
//! A form is the user-facing side of a delta: reads and writes look like
//! ordinary field access, while every write is recorded by the delta tree.
//! Per-shape adaptors are plain structs with a table of [`Property`]
//! constants, built on top of [`ObjectForm`]:
//!
//! ```rust,ignore
//! const NAME: Property<String> = Property::new("Name");
//! const AGE: Property<i32> = Property::new("Age");
//!
//! let mut form = ObjectForm::new(&mut tree, root)?;
//! let name = form.get(&NAME)?;
//! form.set(&AGE, 4)?;
//! ```

use crate::error::{Result, SdkError};
use std::marker::PhantomData;
use tracery_core::{NodeId, TypeClassifier, Value};
use tracery_delta::{DeltaId, DeltaKind, DeltaTree, Field};

/// A scalar Rust type that can be read from and written to a property.
pub trait FieldType: Sized {
    /// Name used in type mismatch errors.
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

impl FieldType for bool {
    const TYPE_NAME: &'static str = "Boolean";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FieldType for i64 {
    const TYPE_NAME: &'static str = "Int64";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl FieldType for i32 {
    const TYPE_NAME: &'static str = "Int32";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int().and_then(|i| i32::try_from(i).ok())
    }

    fn into_value(self) -> Value {
        Value::Int(self.into())
    }
}

impl FieldType for f64 {
    const TYPE_NAME: &'static str = "Double";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl FieldType for String {
    const TYPE_NAME: &'static str = "String";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

/// `None` maps to null.
impl<T: FieldType> FieldType for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn into_value(self) -> Value {
        self.map(T::into_value).unwrap_or(Value::Null)
    }
}

/// Typed accessor for one property of a shape.
pub struct Property<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Property<T> {}

impl<T> std::fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Property").field(&self.name).finish()
    }
}

fn decode<T: FieldType>(name: &str, value: &Value) -> Result<T> {
    T::from_value(value).ok_or_else(|| SdkError::TypeMismatch {
        property: name.to_string(),
        expected: T::TYPE_NAME.to_string(),
        found: value.kind_name().to_string(),
    })
}

fn read_scalar<T: FieldType>(tree: &DeltaTree, id: DeltaId, name: &str) -> Result<T> {
    decode(name, &tree.current_value(id, name)?)
}

fn expect_kind(tree: &DeltaTree, id: DeltaId, kind: DeltaKind, name: &str) -> Result<()> {
    let actual = tree.kind(id)?;
    if actual == kind {
        Ok(())
    } else {
        Err(SdkError::TypeMismatch {
            property: name.to_string(),
            expected: format!("{:?}", kind),
            found: format!("{:?}", actual),
        })
    }
}

/// Nested delta behind a complex property, or `None` when it holds null.
///
/// A property that was assigned a whole new value holds no delta; such a
/// value can only be read, through [`ObjectForm::view`].
fn nested(tree: &mut DeltaTree, id: DeltaId, name: &str, kind: DeltaKind) -> Result<Option<DeltaId>> {
    match tree.get(id, name)? {
        Field::Delta(child) => {
            expect_kind(tree, child, kind, name)?;
            Ok(Some(child))
        }
        Field::Value(Value::Null) => Ok(None),
        Field::Value(Value::Node(_)) => Err(SdkError::Replaced(name.to_string())),
        Field::Value(other) => Err(SdkError::TypeMismatch {
            property: name.to_string(),
            expected: format!("{:?}", kind),
            found: other.kind_name().to_string(),
        }),
    }
}

/// Object node behind `value`, or `None` for null.
fn object_node(tree: &DeltaTree, name: &str, value: Value) -> Result<Option<NodeId>> {
    let found = match value {
        Value::Null => return Ok(None),
        Value::Node(node) => {
            if !tree.graph().is_collection(node)? {
                return Ok(Some(node));
            }
            format!("{:?}", DeltaKind::Collection)
        }
        other => other.kind_name().to_string(),
    };
    Err(SdkError::TypeMismatch {
        property: name.to_string(),
        expected: format!("{:?}", DeltaKind::Object),
        found,
    })
}

/// Read view over a complex property reached from `source`.
fn object_view<'a>(
    tree: &'a mut DeltaTree,
    source: Source,
    name: &str,
) -> Result<Option<ReadOnlyForm<'a>>> {
    let source = match source {
        Source::Delta(id) => match tree.get(id, name)? {
            Field::Delta(child) => {
                expect_kind(tree, child, DeltaKind::Object, name)?;
                Some(Source::Delta(child))
            }
            Field::Value(value) => object_node(tree, name, value)?.map(Source::Node),
        },
        Source::Node(node) => {
            let value = node_value(tree, node, name)?;
            object_node(tree, name, value)?.map(Source::Node)
        }
    };
    Ok(source.map(|source| ReadOnlyForm { tree, source }))
}

/// Property of a plain graph node, checked against its declared type.
fn node_value(tree: &DeltaTree, node: NodeId, name: &str) -> Result<Value> {
    tree.types().property(tree.graph().type_name(node)?, name)?;
    Ok(tree.graph().property(node, name)?)
}

/// Read-write form over an object delta.
#[derive(Debug)]
pub struct ObjectForm<'t> {
    tree: &'t mut DeltaTree,
    id: DeltaId,
}

impl<'t> ObjectForm<'t> {
    pub fn new(tree: &'t mut DeltaTree, id: DeltaId) -> Result<Self> {
        if tree.kind(id)? != DeltaKind::Object {
            return Err(tracery_delta::DeltaError::NotAnObjectDelta(id.raw()).into());
        }
        Ok(Self { tree, id })
    }

    /// The delta backing this form.
    pub fn delta(&self) -> DeltaId {
        self.id
    }

    pub fn tree(&self) -> &DeltaTree {
        &*self.tree
    }

    pub fn type_name(&self) -> Result<&str> {
        Ok(self.tree.type_name(self.id)?)
    }

    pub fn is_dirty(&self) -> Result<bool> {
        Ok(self.tree.is_dirty(self.id)?)
    }

    pub fn get<T: FieldType>(&self, property: &Property<T>) -> Result<T> {
        read_scalar(&*self.tree, self.id, property.name())
    }

    pub fn set<T: FieldType>(&mut self, property: &Property<T>, value: T) -> Result<()> {
        self.tree.set(self.id, property.name(), value.into_value())?;
        Ok(())
    }

    /// Assign any value, nested form or node to a property.
    pub fn assign(&mut self, name: &str, value: impl Into<Field>) -> Result<()> {
        self.tree.set(self.id, name, value)?;
        Ok(())
    }

    /// Form over a complex property, `None` when it holds null.
    ///
    /// Fails with [`SdkError::Replaced`] once the property was assigned a
    /// new object; use [`ObjectForm::view`] to read that object.
    pub fn object(&mut self, name: &str) -> Result<Option<ObjectForm<'_>>> {
        Ok(nested(self.tree, self.id, name, DeltaKind::Object)?.map(|child| ObjectForm {
            tree: &mut *self.tree,
            id: child,
        }))
    }

    /// Form over a collection property, `None` when it holds null.
    pub fn collection(&mut self, name: &str) -> Result<Option<CollectionForm<'_>>> {
        Ok(
            nested(self.tree, self.id, name, DeltaKind::Collection)?.map(|child| CollectionForm {
                tree: &mut *self.tree,
                id: child,
            }),
        )
    }

    /// Read view over a complex property, whether it is still tracked or was
    /// replaced by a new object.
    pub fn view(&mut self, name: &str) -> Result<Option<ReadOnlyForm<'_>>> {
        object_view(&mut *self.tree, Source::Delta(self.id), name)
    }

    /// Replace a complex property with a brand-new object of its declared type.
    pub fn replace_with_new(&mut self, name: &str, properties: Vec<(&str, Value)>) -> Result<NodeId> {
        let types = self.tree.types().clone();
        let declared = types.property(self.tree.type_name(self.id)?, name)?.type_name.clone();
        let node = self.tree.new_object(&declared, properties)?;
        self.tree.set(self.id, name, node)?;
        Ok(node)
    }

    /// Shorter-lived form over the same delta, e.g. to wrap in an adaptor.
    pub fn reborrow(&mut self) -> ObjectForm<'_> {
        ObjectForm {
            tree: &mut *self.tree,
            id: self.id,
        }
    }

    /// Read-only view of the same delta.
    pub fn read_only(&mut self) -> ReadOnlyForm<'_> {
        ReadOnlyForm {
            tree: &mut *self.tree,
            source: Source::Delta(self.id),
        }
    }
}

/// Mutable sequence form over a collection delta.
#[derive(Debug)]
pub struct CollectionForm<'t> {
    tree: &'t mut DeltaTree,
    id: DeltaId,
}

impl<'t> CollectionForm<'t> {
    pub fn new(tree: &'t mut DeltaTree, id: DeltaId) -> Result<Self> {
        if tree.kind(id)? != DeltaKind::Collection {
            return Err(tracery_delta::DeltaError::NotACollectionDelta(id.raw()).into());
        }
        Ok(Self { tree, id })
    }

    pub fn delta(&self) -> DeltaId {
        self.id
    }

    pub fn len(&mut self) -> Result<usize> {
        Ok(self.tree.item_count(self.id)?)
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&mut self, index: usize) -> Result<Field> {
        Ok(self.tree.item(self.id, index)?)
    }

    /// Scalar item at `index`.
    pub fn value_at<T: FieldType>(&mut self, index: usize) -> Result<T> {
        let field = self.tree.item(self.id, index)?;
        let value = self.tree.identity(&field)?;
        T::from_value(&value).ok_or_else(|| SdkError::TypeMismatch {
            property: format!("[{}]", index),
            expected: T::TYPE_NAME.to_string(),
            found: value.kind_name().to_string(),
        })
    }

    /// Form over the complex item at `index`.
    pub fn object_at(&mut self, index: usize) -> Result<ObjectForm<'_>> {
        match self.tree.item(self.id, index)? {
            Field::Delta(child) => ObjectForm::new(&mut *self.tree, child),
            Field::Value(other) => Err(SdkError::TypeMismatch {
                property: format!("[{}]", index),
                expected: format!("{:?}", DeltaKind::Object),
                found: other.kind_name().to_string(),
            }),
        }
    }

    pub fn push(&mut self, item: impl Into<Field>) -> Result<()> {
        self.tree.add_item(self.id, item)?;
        Ok(())
    }

    /// Add a brand-new object of the element type.
    pub fn push_new(&mut self, properties: Vec<(&str, Value)>) -> Result<NodeId> {
        let types = self.tree.types().clone();
        let element = types.element_type(self.tree.type_name(self.id)?)?;
        let node = self.tree.new_object(element, properties)?;
        self.tree.add_item(self.id, node)?;
        Ok(node)
    }

    pub fn insert(&mut self, index: usize, item: impl Into<Field>) -> Result<()> {
        self.tree.insert_item(self.id, index, item)?;
        Ok(())
    }

    /// Remove the first identical item. Returns whether one was found.
    pub fn remove(&mut self, item: impl Into<Field>) -> Result<bool> {
        Ok(self.tree.remove_item(self.id, item)?)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Field> {
        Ok(self.tree.remove_at(self.id, index)?)
    }

    pub fn set(&mut self, index: usize, item: impl Into<Field>) -> Result<()> {
        self.tree.set_item(self.id, index, item)?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.tree.clear(self.id)?;
        Ok(())
    }

    pub fn contains(&mut self, item: impl Into<Field>) -> Result<bool> {
        Ok(self.tree.contains(self.id, item)?)
    }

    /// Nested deltas of the complex items, in order.
    pub fn iter_ids(&mut self) -> Result<Vec<DeltaId>> {
        Ok(self
            .tree
            .items(self.id)?
            .iter()
            .filter_map(Field::as_delta)
            .collect())
    }

    /// Index of the first complex item whose `property` currently equals `value`.
    pub fn find(&mut self, property: &str, value: impl Into<Value>) -> Result<Option<usize>> {
        let value = value.into();
        for (index, field) in self.tree.items(self.id)?.iter().enumerate() {
            if let Field::Delta(child) = field {
                if self.tree.current_value(*child, property)?.same(&value) {
                    return Ok(Some(index));
                }
            }
        }
        Ok(None)
    }
}

/// What a read-only form reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Delta(DeltaId),
    /// A replacement object, read straight from the graph.
    Node(NodeId),
}

/// Read-only form: reads work as usual, every write fails.
///
/// Besides tracked objects it can show an object that replaced a property,
/// which has no delta behind it.
#[derive(Debug)]
pub struct ReadOnlyForm<'t> {
    tree: &'t mut DeltaTree,
    source: Source,
}

impl<'t> ReadOnlyForm<'t> {
    pub fn new(tree: &'t mut DeltaTree, id: DeltaId) -> Result<Self> {
        if tree.kind(id)? != DeltaKind::Object {
            return Err(tracery_delta::DeltaError::NotAnObjectDelta(id.raw()).into());
        }
        Ok(Self {
            tree,
            source: Source::Delta(id),
        })
    }

    /// The delta backing this form, `None` for a replacement object.
    pub fn delta(&self) -> Option<DeltaId> {
        match self.source {
            Source::Delta(id) => Some(id),
            Source::Node(_) => None,
        }
    }

    /// The node being shown: the original for a tracked object.
    pub fn node(&self) -> Result<NodeId> {
        match self.source {
            Source::Delta(id) => Ok(self.tree.original(id)?),
            Source::Node(node) => Ok(node),
        }
    }

    pub fn type_name(&self) -> Result<&str> {
        match self.source {
            Source::Delta(id) => Ok(self.tree.type_name(id)?),
            Source::Node(node) => Ok(self.tree.graph().type_name(node)?),
        }
    }

    pub fn get<T: FieldType>(&self, property: &Property<T>) -> Result<T> {
        match self.source {
            Source::Delta(id) => read_scalar(&*self.tree, id, property.name()),
            Source::Node(node) => decode(
                property.name(),
                &node_value(&*self.tree, node, property.name())?,
            ),
        }
    }

    pub fn object(&mut self, name: &str) -> Result<Option<ReadOnlyForm<'_>>> {
        object_view(&mut *self.tree, self.source, name)
    }

    pub fn set<T: FieldType>(&mut self, property: &Property<T>, _value: T) -> Result<()> {
        Err(self.rejected(property.name()))
    }

    pub fn assign(&mut self, name: &str, _value: impl Into<Field>) -> Result<()> {
        Err(self.rejected(name))
    }

    fn rejected(&self, name: &str) -> SdkError {
        let type_name = self.type_name().unwrap_or("<unknown>");
        SdkError::NotSupported(format!("{} of {} is read-only", name, type_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracery_core::{ObjectGraph, TypeRegistry};

    const NAME: Property<String> = Property::new("Name");
    const AGE: Property<i32> = Property::new("Age");
    const NICKNAME: Property<Option<String>> = Property::new("Nickname");

    fn capture() -> (DeltaTree, DeltaId) {
        let types = TypeRegistry::builder()
            .complex("Critter", |t| {
                t.property("Name", "String")
                    .property("Age", "Int32")
                    .property("Nickname", "String")
                    .property("Mate", "Critter")
                    .property("Tags", "Tags")
            })
            .collection("Tags", "String")
            .build()
            .unwrap();
        let mut graph = ObjectGraph::new();
        let tags = graph.insert_collection("Tags", vec!["fluffy".into()]);
        let root = graph.insert_object(
            "Critter",
            vec![("Name", "Sheep".into()), ("Age", 3.into()), ("Tags", tags.into())],
        );
        DeltaTree::capture(graph, Arc::new(types), root).unwrap()
    }

    #[test]
    fn test_typed_get_and_set() {
        let (mut tree, root) = capture();
        let mut form = ObjectForm::new(&mut tree, root).unwrap();

        assert_eq!(form.get(&NAME).unwrap(), "Sheep");
        assert_eq!(form.get(&AGE).unwrap(), 3);
        assert_eq!(form.get(&NICKNAME).unwrap(), None);

        form.set(&AGE, 4).unwrap();
        form.set(&NICKNAME, Some("Shaun".to_string())).unwrap();
        assert_eq!(form.get(&AGE).unwrap(), 4);
        assert!(form.is_dirty().unwrap());
    }

    #[test]
    fn test_type_mismatch() {
        let (mut tree, root) = capture();
        let form = ObjectForm::new(&mut tree, root).unwrap();
        const WRONG: Property<bool> = Property::new("Name");

        let err = form.get(&WRONG).unwrap_err();
        assert!(matches!(err, SdkError::TypeMismatch { .. }));
    }

    #[test]
    fn test_null_object_is_none() {
        let (mut tree, root) = capture();
        let mut form = ObjectForm::new(&mut tree, root).unwrap();
        assert!(form.object("Mate").unwrap().is_none());

        form.replace_with_new("Mate", vec![("Name", "Goat".into())]).unwrap();
        assert!(form.is_dirty().unwrap());
    }

    #[test]
    fn test_replaced_object_reads_through_view() {
        let (mut tree, root) = capture();
        let mut form = ObjectForm::new(&mut tree, root).unwrap();
        let goat = form
            .replace_with_new("Mate", vec![("Name", "Goat".into()), ("Age", 2.into())])
            .unwrap();

        assert!(matches!(
            form.object("Mate").unwrap_err(),
            SdkError::Replaced(name) if name == "Mate"
        ));

        let mut mate = form.view("Mate").unwrap().unwrap();
        assert_eq!(mate.delta(), None);
        assert_eq!(mate.node().unwrap(), goat);
        assert_eq!(mate.type_name().unwrap(), "Critter");
        assert_eq!(mate.get(&NAME).unwrap(), "Goat");
        assert_eq!(mate.get(&AGE).unwrap(), 2);
        assert!(mate.object("Mate").unwrap().is_none());
        assert!(matches!(
            mate.set(&NAME, "Billy".to_string()),
            Err(SdkError::NotSupported(_))
        ));

        let mut view = form.read_only();
        let mate = view.object("Mate").unwrap().unwrap();
        assert_eq!(mate.get(&NAME).unwrap(), "Goat");
    }

    #[test]
    fn test_view_of_tracked_object_uses_its_delta() {
        let (mut tree, root) = capture();
        let mut form = ObjectForm::new(&mut tree, root).unwrap();
        form.replace_with_new("Mate", vec![("Name", "Goat".into())]).unwrap();
        tree.apply(root).unwrap();

        let mut form = ObjectForm::new(&mut tree, root).unwrap();
        let mate = form.object("Mate").unwrap().unwrap().delta();
        let view = form.view("Mate").unwrap().unwrap();
        assert_eq!(view.delta(), Some(mate));
        assert_eq!(view.get(&NAME).unwrap(), "Goat");
    }

    #[test]
    fn test_collection_form() {
        let (mut tree, root) = capture();
        let mut form = ObjectForm::new(&mut tree, root).unwrap();
        let mut tags = form.collection("Tags").unwrap().unwrap();

        assert_eq!(tags.len().unwrap(), 1);
        tags.push("soft").unwrap();
        assert!(tags.contains("soft").unwrap());
        assert_eq!(tags.value_at::<String>(1).unwrap(), "soft");
        assert!(tags.remove("fluffy").unwrap());
        assert_eq!(tags.len().unwrap(), 1);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let (mut tree, root) = capture();
        let mut form = ObjectForm::new(&mut tree, root).unwrap();
        let mut view = form.read_only();

        assert_eq!(view.get(&NAME).unwrap(), "Sheep");
        let err = view.set(&NAME, "Lamb".to_string()).unwrap_err();
        assert!(matches!(err, SdkError::NotSupported(_)));
        assert!(matches!(
            view.assign("Mate", Value::Null).unwrap_err(),
            SdkError::NotSupported(_)
        ));
        assert!(!tree.is_dirty(root).unwrap());
    }

    #[test]
    fn test_wrong_delta_kind() {
        let (mut tree, root) = capture();
        let tags = tree.get(root, "Tags").unwrap().as_delta().unwrap();
        assert!(ObjectForm::new(&mut tree, tags).is_err());
        assert!(CollectionForm::new(&mut tree, root).is_err());
    }
}
