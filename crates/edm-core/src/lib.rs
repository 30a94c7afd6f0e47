#![allow(missing_docs)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::float_cmp)]

//! EDM core - runtime for generated event data models
//!
//! Represents, mutates and persists collections of POD records with typed
//! cross-references, across schema versions.
//!
//! # Key Concepts
//!
//! - **Record**: a generated type: POD payload, relation slots, vector members
//! - **Handle**: [`RecordRef`] (read-only) or [`RecordMut`] aliasing one record
//! - **Collection**: owning or subset sequence of one record type
//! - **Relation**: [`Association`] / [`Link`], weighted 1:1 relations between any two types
//! - **Registry**: buffer factory, schema evolution and datamodel catalogue
//!
//! # Life Cycle
//!
//! ```text
//! create / push_back ─► prepare_for_write ─► (backend writes bytes)
//! (backend reads bytes) ─► read_collection ─► set_references
//! ```
//!
//! All payload access returns owned values:
//! - `data()` - copy of the payload
//! - `set_data()` / `update()` - write through a mutable handle
//!
//! ```ignore
//! let mut hits = Collection::<Hit>::new();
//! hits.set_id(1)?;
//! hits.create()?.set_data(HitData { energy: 2.5 });
//!
//! let raw = registry.write_collection(&hits)?;
//! let read = registry.read_collection(&raw)?;
//! ```

mod buffers;
mod collection;
mod config;
mod datamodel;
mod error;
mod evolution;
mod factory;
mod handle;
mod obj;
mod object_id;
mod provider;
mod record;
mod registry;
mod relation;
mod shared;

pub use buffers::{CollectionBuffers, DataBuffer, RawCollection, RawVectorMember, VectorMemberBuffer};
pub use collection::{Collection, CollectionBase, CollectionState};
pub use config::{DegradePolicy, EdmConfig};
pub use datamodel::{
    DatamodelRegistry, EMPTY_DEFINITION, RelationNameMapping, RelationNames, Version,
    relation_names_from_definition,
};
pub use error::{EdmError, EdmResult, ErrorKind};
pub use evolution::{EvolutionFn, Priority, SchemaEvolution, no_schema_evolution};
pub use factory::{BufferCreator, BufferFactory, RecordBuffers};
pub use handle::{RecordMut, RecordRef};
pub use obj::Obj;
pub use object_id::ObjectID;
pub use provider::{CollectionIdTable, CollectionProvider, Lookup, Resolution, lookup};
pub use record::{Record, Relations, SchemaVersion, VectorMembers};
pub use registry::{DatamodelModule, Registry};
pub use relation::{
    Association, AssociationKind, FromTo, Link, LinkKind, Navigator, RelationData, RelationKind,
    Weighted, WeightedRelation,
};
pub use shared::{MaybeShared, Owner};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Association, Collection, CollectionBase, CollectionProvider, DatamodelModule, EdmResult,
        Link, ObjectID, Record, RecordMut, RecordRef, Registry,
    };
}
