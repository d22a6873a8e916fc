//! High-level client for sending tracked edits as PATCH requests.

use crate::error::{Result, SdkError};
use crate::form::ObjectForm;
use crate::logging::{self, Profile};
use crate::request::{Dispatcher, MemoryDispatcher, PatchRequest};
use crate::session::{Session, TrackedResource};
use crate::uri::{etag_of, UriResolver};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracery_core::TypeClassifier;
use tracery_delta::{DeltaId, DeltaTree};
use tracery_patch::render_patch;

/// Configuration for the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service root that resource paths are appended to.
    pub base_uri: String,
    /// Send the captured etag as an `If-Match` precondition.
    pub send_if_match: bool,
    /// Initialize logging with this profile when the client is created.
    pub log_profile: Option<Profile>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_uri: "http://localhost/".to_string(),
            send_if_match: true,
            log_profile: None,
        }
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.base_uri = uri.into();
        self
    }

    pub fn send_if_match(mut self, enabled: bool) -> Self {
        self.config.send_if_match = enabled;
        self
    }

    pub fn log_profile(mut self, profile: Profile) -> Self {
        self.config.log_profile = Some(profile);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A dispatched patch and the service's response.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub request: PatchRequest,
    pub response: serde_json::Value,
}

/// Client that turns edits made through forms into PATCH requests.
///
/// # Example
///
/// ```rust,ignore
/// let client = Client::new_with_memory_dispatcher(types, ClientConfig::default());
/// let session = client.create_session("editing");
/// let critter = session.track(graph, root)?;
///
/// client.patch_tracked(&critter, |form| {
///     form.set(&NAME, "Lamb".to_string())
/// })?;
/// ```
pub struct Client<D: Dispatcher> {
    config: ClientConfig,
    dispatcher: Arc<D>,
    resolver: UriResolver,
    types: Arc<dyn TypeClassifier>,
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl Client<MemoryDispatcher> {
    /// Create a client with an in-memory dispatcher (for testing).
    pub fn new_with_memory_dispatcher(types: Arc<dyn TypeClassifier>, config: ClientConfig) -> Self {
        Self::new(Arc::new(MemoryDispatcher::new()), types, config)
    }
}

impl<D: Dispatcher> Client<D> {
    /// Create a client with a custom dispatcher.
    pub fn new(dispatcher: Arc<D>, types: Arc<dyn TypeClassifier>, config: ClientConfig) -> Self {
        if let Some(profile) = config.log_profile {
            logging::init(profile);
        }
        Self {
            resolver: UriResolver::new(config.base_uri.clone()),
            config,
            dispatcher,
            types,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    pub fn resolver(&self) -> &UriResolver {
        &self.resolver
    }

    pub fn types(&self) -> &Arc<dyn TypeClassifier> {
        &self.types
    }

    /// Build the request for the pending edits of `root`, or `None` when
    /// there is nothing to send.
    pub fn prepare_patch(&self, tree: &DeltaTree, root: DeltaId) -> Result<Option<PatchRequest>> {
        if !tree.is_dirty(root)? {
            return Ok(None);
        }
        let body = render_patch(tree, root)?;
        let uri = self.resolver.uri_of(tree, &root)?;
        let mut request = PatchRequest::new(uri, body);
        if self.config.send_if_match {
            if let Some(etag) = etag_of(tree, root)? {
                request = request.with_etag(&etag);
            }
        }
        Ok(Some(request))
    }

    /// Send the pending edits of `root` and commit them locally on success.
    ///
    /// A failed dispatch leaves the tree dirty so the edits can be retried.
    pub fn send_pending(&self, tree: &mut DeltaTree, root: DeltaId) -> Result<Option<Dispatched>> {
        let Some(request) = self.prepare_patch(tree, root)? else {
            tracing::debug!(delta = %root, "Nothing to send");
            return Ok(None);
        };

        let response = match self.dispatcher.send(&request) {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(request_id = %request.request_id, uri = %request.uri, %err, "Patch dispatch failed");
                return Err(err);
            }
        };
        tree.apply(root)?;
        tracing::info!(request_id = %request.request_id, uri = %request.uri, "Patch sent");
        Ok(Some(Dispatched { request, response }))
    }

    /// Run `update` against a form over `root`, then send the result.
    pub fn patch<F>(&self, tree: &mut DeltaTree, root: DeltaId, update: F) -> Result<Option<Dispatched>>
    where
        F: FnOnce(&mut ObjectForm<'_>) -> Result<()>,
    {
        {
            let mut form = ObjectForm::new(tree, root)?;
            update(&mut form)?;
        }
        self.send_pending(tree, root)
    }

    /// [`Client::patch`] for a resource tracked in a session. The resource's
    /// tree stays write-locked for the whole update and dispatch.
    pub fn patch_tracked<F>(&self, resource: &TrackedResource, update: F) -> Result<Option<Dispatched>>
    where
        F: FnOnce(&mut ObjectForm<'_>) -> Result<()>,
    {
        let mut tree = resource.tree.write();
        self.patch(&mut tree, resource.root, update)
    }

    /// Send the pending edits of every dirty resource in a session.
    pub fn flush_session(&self, session_id: &str) -> Result<Vec<Dispatched>> {
        let session = self
            .get_session(session_id)
            .ok_or_else(|| SdkError::ResourceNotFound(session_id.to_string()))?;
        let mut sent = Vec::new();
        for uri in session.dirty_uris() {
            if let Some(resource) = session.get(&uri) {
                let mut tree = resource.tree.write();
                if let Some(dispatched) = self.send_pending(&mut tree, resource.root)? {
                    sent.push(dispatched);
                }
            }
        }
        Ok(sent)
    }

    /// Create a new session, or return the existing one with this id.
    pub fn create_session(&self, session_id: impl Into<String>) -> Arc<Session> {
        let session_id = session_id.into();
        let mut sessions = self.sessions.write();

        if let Some(session) = sessions.get(&session_id) {
            session.clone()
        } else {
            let session = Arc::new(Session::new(
                session_id.clone(),
                Arc::clone(&self.types),
                self.resolver.clone(),
            ));
            sessions.insert(session_id, session.clone());
            session
        }
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn close_session(&self, session_id: &str) {
        self.sessions.write().remove(session_id);
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}
