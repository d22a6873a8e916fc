//! Tracery Patch - patch documents for delta trees
//!
//! Renders the accumulated edits of a [`DeltaTree`](tracery_delta::DeltaTree)
//! as a compact JSON patch document, and replays such documents onto a
//! captured tree on the receiving side.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracery_patch::{render_patch, apply_patch};
//!
//! tree.set(root, "Info", "Changed")?;
//! let patch = render_patch(&tree, root)?;
//! assert_eq!(patch, serde_json::json!({"info": "Changed"}));
//!
//! // On a replica holding the same original:
//! apply_patch(&mut replica, replica_root, &patch)?;
//! ```

pub mod error;
pub mod json;
pub mod reader;
pub mod render;

pub use error::{PatchError, Result};
pub use json::{box_scalar, unbox_scalar};
pub use reader::{apply_patch, PatchReader};
pub use render::{render_patch, PatchRenderer, REPLACE_PREFIX};
