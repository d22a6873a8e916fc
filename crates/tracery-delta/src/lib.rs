//! Tracery Delta - mutation tracking over a captured object graph
//!
//! This crate records edits made through lightweight deltas instead of
//! touching the captured data, so the net change can later be rendered as a
//! patch document or committed in one step.
//!
//! # Delta kinds
//!
//! - **Object delta**: shadows a complex node. Writes become raw
//!   replacements, reads of complex properties hand out nested deltas.
//! - **Collection delta**: shadows a collection node and summarizes edits as
//!   added, removed and modified items with set semantics.
//!
//! All deltas of one capture live in a single [`DeltaTree`], linked by
//! parent ids. A change anywhere marks every ancestor dirty.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tracery_core::{ObjectGraph, TypeRegistry};
//! use tracery_delta::DeltaTree;
//!
//! let types = TypeRegistry::builder()
//!     .complex("Critter", |t| t.property("Name", "String"))
//!     .build()?;
//! let mut graph = ObjectGraph::new();
//! let sheep = graph.insert_object("Critter", vec![("Name", "Sheep".into())]);
//!
//! let (mut tree, root) = DeltaTree::capture(graph, Arc::new(types), sheep)?;
//! tree.set(root, "Name", "Lamb")?;
//! assert!(tree.is_dirty(root)?);
//!
//! tree.apply(root)?;
//! assert!(!tree.is_dirty(root)?);
//! ```

pub mod collection;
pub mod error;
pub mod object;
pub mod tree;

pub use error::{DeltaError, Result};
pub use tree::{DeltaId, DeltaKind, DeltaTree, Field};
