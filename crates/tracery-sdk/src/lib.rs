//! Tracery SDK - client glue for change-tracked resources
//!
//! Capture a resource, edit it through typed forms, and send exactly what
//! changed as a PATCH request.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tracery_sdk::prelude::*;
//!
//! const NAME: Property<String> = Property::new("Name");
//!
//! let types = TypeRegistry::builder()
//!     .complex("Critter", |t| {
//!         t.resource("critters")
//!             .id("Id")
//!             .property("Id", "Int32")
//!             .property("Name", "String")
//!     })
//!     .build()
//!     .unwrap();
//!
//! let mut graph = ObjectGraph::new();
//! let root = graph.insert_object("Critter", vec![("Id", 1.into()), ("Name", "Sheep".into())]);
//!
//! let client = Client::new_with_memory_dispatcher(Arc::new(types), ClientConfig::default());
//! let session = client.create_session("editing");
//! let critter = session.track(graph, root).unwrap();
//!
//! client
//!     .patch_tracked(&critter, |form| form.set(&NAME, "Lamb".to_string()))
//!     .unwrap();
//!
//! let sent = client.dispatcher().last().unwrap();
//! assert_eq!(sent.uri, "http://localhost/critters/1");
//! assert_eq!(sent.body["name"], "Lamb");
//! ```
//!
//! # Architecture
//!
//! - [`form`] - Typed forms over delta trees, including read-only views
//! - [`uri`] - Resource URI and etag resolution
//! - [`request`] - PATCH requests and the dispatcher seam
//! - [`session`] - Captured resources shared between callers
//! - [`client`] - Main entry point tying the above together
//! - [`logging`] - Subscriber initialization
//! - [`error`] - Error types

pub mod client;
pub mod error;
pub mod form;
pub mod logging;
pub mod request;
pub mod session;
pub mod uri;

// Re-exports for convenience
pub use client::{Client, ClientConfig, ClientConfigBuilder, Dispatched};
pub use error::{Result, SdkError};
pub use form::{CollectionForm, FieldType, ObjectForm, Property, ReadOnlyForm};
pub use request::{Dispatcher, MemoryDispatcher, PatchRequest};
pub use session::{Session, TrackedResource};
pub use uri::{etag_of, FormRef, PatchTarget, UriResolver};

pub use tracery_core::{NodeId, ObjectGraph, TypeRegistry, Value};
pub use tracery_delta::{DeltaId, DeltaTree, Field};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Client, ClientConfig};
    pub use crate::error::SdkError;
    pub use crate::form::{CollectionForm, ObjectForm, Property, ReadOnlyForm};
    pub use crate::request::{Dispatcher, PatchRequest};
    pub use crate::session::Session;
    pub use crate::uri::{PatchTarget, UriResolver};
    pub use tracery_core::{NodeId, ObjectGraph, TypeRegistry, Value};
    pub use tracery_delta::{DeltaId, DeltaTree, Field};
}
