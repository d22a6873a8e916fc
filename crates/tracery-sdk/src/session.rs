//! Sessions of tracked resources.
//!
//! The delta engine has no locking of its own. A session hands out each
//! captured tree behind a `RwLock`, so concurrent callers get one writer at
//! a time per resource.

use crate::error::Result;
use crate::uri::UriResolver;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracery_core::{NodeId, ObjectGraph, TypeClassifier};
use tracery_delta::{DeltaId, DeltaTree};

/// A captured resource and the delta tracking it.
#[derive(Debug, Clone)]
pub struct TrackedResource {
    pub uri: String,
    pub tree: Arc<RwLock<DeltaTree>>,
    pub root: DeltaId,
}

impl TrackedResource {
    pub fn is_dirty(&self) -> bool {
        self.tree.read().is_dirty(self.root).unwrap_or(false)
    }
}

/// A set of tracked resources keyed by URI.
pub struct Session {
    session_id: String,
    types: Arc<dyn TypeClassifier>,
    resolver: UriResolver,
    resources: Arc<RwLock<HashMap<String, TrackedResource>>>,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        types: Arc<dyn TypeClassifier>,
        resolver: UriResolver,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            types,
            resolver,
            resources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Capture `graph` and track `root` under its resource URI.
    ///
    /// Tracking a URI that is already tracked replaces the previous capture.
    pub fn track(&self, graph: ObjectGraph, root: NodeId) -> Result<TrackedResource> {
        let (tree, root) = DeltaTree::capture(graph, Arc::clone(&self.types), root)?;
        let uri = self.resolver.uri_of(&tree, &root)?;
        let resource = TrackedResource {
            uri: uri.clone(),
            tree: Arc::new(RwLock::new(tree)),
            root,
        };

        let previous = self.resources.write().insert(uri.clone(), resource.clone());
        if previous.is_some() {
            tracing::debug!(session = %self.session_id, %uri, "Replaced tracked resource");
        } else {
            tracing::debug!(session = %self.session_id, %uri, "Tracking resource");
        }
        Ok(resource)
    }

    pub fn get(&self, uri: &str) -> Option<TrackedResource> {
        self.resources.read().get(uri).cloned()
    }

    /// Stop tracking a resource. Pending edits are dropped with it.
    pub fn release(&self, uri: &str) -> Option<TrackedResource> {
        self.resources.write().remove(uri)
    }

    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.resources.read().keys().cloned().collect();
        uris.sort();
        uris
    }

    /// URIs of resources with pending edits.
    pub fn dirty_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .resources
            .read()
            .values()
            .filter(|resource| resource.is_dirty())
            .map(|resource| resource.uri.clone())
            .collect();
        uris.sort();
        uris
    }

    /// Drop the pending edits of every tracked resource.
    pub fn reset_all(&self) -> Result<()> {
        for resource in self.resources.read().values() {
            resource.tree.write().reset(resource.root)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("resources", &self.uris())
            .finish()
    }
}
