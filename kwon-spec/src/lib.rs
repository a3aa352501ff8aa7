//! Shared data model, error taxonomy, and canonical-JSON helper for the
//! K-WON compliance backplane. Every other crate in this workspace depends
//! on this one; it depends on nothing workspace-local.

pub mod canonical;
pub mod error;
pub mod model;

pub use canonical::{canonical_json, canonical_json_of_fields};
pub use error::{KwonError, KwonResult};
pub use model::*;

/// Schema version stamped into tool-server health responses and proof packs.
pub const SCHEMA_VERSION: &str = "1.0";
