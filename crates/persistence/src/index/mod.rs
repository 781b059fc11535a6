//! Index naming, mapping versions and index creation.
//!
//! Every document kind has one current mapping version. Concrete index names
//! embed that version; aliases do not, and storage only ever addresses
//! aliases. Moving a kind to a new mapping version is the migrator's job.

mod kind;
mod mapping;
mod naming;
mod registry;

pub use kind::DocumentKind;
pub use mapping::{
    EmbeddedMappingSource, FsMappingSource, MappingEntry, MappingSet, MappingSource,
    VersionedMapping,
};
pub use naming::{DEFAULT_INDEX_PREFIX, IndexNameParts, IndexNaming, validate_project_id};
pub use registry::{IndexInfo, IndexRegistry};
