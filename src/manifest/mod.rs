//! Manifest model, identity, and the incremental index.
//!
//! Sources deliver `ManifestEntry` values keyed by `ManifestId`; the
//! `ManifestIndex` owns them and keeps the action/type/module caches that the
//! query resolvers walk. `ManifestValidator` checks raw JSON documents against
//! the bundled schema before they reach the index.

pub mod identity;
pub mod index;
pub mod model;
pub mod validate;

pub use identity::{EntryId, ManifestId, SourceName};
pub use index::ManifestIndex;
pub use model::{IntentFilter, ManifestEntry, ParameterConstraint};
pub use validate::ManifestValidator;
