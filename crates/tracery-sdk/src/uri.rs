//! Resource addressing for patch targets.

use crate::error::{Result, SdkError};
use crate::form::{ObjectForm, ReadOnlyForm};
use tracery_core::{ResourceInfo, TypeClassifier, Value};
use tracery_delta::{DeltaId, DeltaTree};

/// What a patch target is backed by.
#[derive(Clone, Copy)]
pub enum FormRef<'a> {
    /// Backed directly by a delta.
    Delta(DeltaId),
    /// A wrapper that extends another target.
    Extended(&'a dyn PatchTarget),
    /// Anything else, identified by its runtime type name.
    Other(&'static str),
}

/// A value whose resource address can be resolved.
pub trait PatchTarget {
    fn form_ref(&self) -> FormRef<'_>;
}

impl PatchTarget for DeltaId {
    fn form_ref(&self) -> FormRef<'_> {
        FormRef::Delta(*self)
    }
}

impl PatchTarget for ObjectForm<'_> {
    fn form_ref(&self) -> FormRef<'_> {
        FormRef::Delta(self.delta())
    }
}

impl PatchTarget for ReadOnlyForm<'_> {
    fn form_ref(&self) -> FormRef<'_> {
        match self.delta() {
            Some(id) => FormRef::Delta(id),
            None => FormRef::Other("ReadOnlyForm"),
        }
    }
}

/// Builds resource URIs from type metadata.
#[derive(Debug, Clone)]
pub struct UriResolver {
    base_uri: String,
}

impl UriResolver {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Delta behind `target`, following extended wrappers.
    pub fn delta_of(&self, target: &dyn PatchTarget) -> Result<DeltaId> {
        let mut current = target.form_ref();
        loop {
            match current {
                FormRef::Delta(id) => return Ok(id),
                FormRef::Extended(inner) => current = inner.form_ref(),
                FormRef::Other(type_name) => {
                    return Err(SdkError::UnresolvableReference {
                        type_name: type_name.to_string(),
                    })
                }
            }
        }
    }

    /// URI of the resource behind `target`.
    pub fn uri_of(&self, tree: &DeltaTree, target: &dyn PatchTarget) -> Result<String> {
        let id = self.delta_of(target)?;
        let type_name = tree.type_name(id)?;
        let unresolvable = || SdkError::UnresolvableReference {
            type_name: type_name.to_string(),
        };

        let resource = resource_info(tree, type_name)?.ok_or_else(unresolvable)?;
        let id_property = resource.id_property.as_deref().ok_or_else(unresolvable)?;
        let key = match tree.current_value(id, id_property)? {
            Value::String(s) => s,
            Value::Null | Value::Node(_) => return Err(unresolvable()),
            other => other
                .to_json_scalar()
                .map(|json| json.to_string())
                .ok_or_else(unresolvable)?,
        };

        Ok(format!(
            "{}/{}/{}",
            self.base_uri.trim_end_matches('/'),
            resource.url_relative_path.trim_matches('/'),
            key
        ))
    }
}

fn resource_info<'t>(tree: &'t DeltaTree, type_name: &str) -> Result<Option<&'t ResourceInfo>> {
    Ok(tree.types().type_spec(type_name)?.resource.as_ref())
}

/// Etag of the resource behind `id` as captured, if its type declares one.
pub fn etag_of(tree: &DeltaTree, id: DeltaId) -> Result<Option<String>> {
    let Some(resource) = resource_info(tree, tree.type_name(id)?)? else {
        return Ok(None);
    };
    let Some(etag_property) = resource.etag_property.as_deref() else {
        return Ok(None);
    };
    Ok(match tree.graph().property(tree.original(id)?, etag_property)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => other.to_json_scalar().map(|json| json.to_string()),
    })
}
