//! Error types for the EDM runtime core.

use thiserror::Error;

use crate::{ObjectID, SchemaVersion};

/// Broad category of an [`EdmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller passed a value that is illegal for the target (wrong tracking state, bad index).
    InvalidArgument,
    /// The operation is illegal in the current mode of the receiver.
    Logic,
    /// A degradable condition that was raised because strict mode is enabled.
    Degraded,
    /// Byte images, layouts or definitions that do not have the expected shape.
    Format,
}

/// Errors raised by collections, handles and the registries.
#[derive(Debug, Error)]
pub enum EdmError {
    /// `create()` was called on a subset collection.
    #[error("cannot create records in a subset collection of {0}")]
    CreateInSubset(String),

    /// A record that already belongs to a collection was pushed into an owning collection.
    #[error("record {0} is already tracked by a collection")]
    AlreadyTracked(ObjectID),

    /// A record that is not owned by any collection was pushed into a subset collection.
    #[error("subset collections can only reference tracked records, got {0}")]
    UntrackedInSubset(ObjectID),

    /// The handle is empty or its record has been freed.
    #[error("record handle is empty or refers to a freed record")]
    Unavailable,

    /// Index access past the end of a collection.
    #[error("index {index} out of range for collection of length {len}")]
    OutOfRange { index: usize, len: usize },

    /// The collection id has already been assigned.
    #[error("collection id already set to {current:#010x}, cannot change it to {requested:#010x}")]
    CollectionIdImmutable { current: u32, requested: u32 },

    /// The collection has no id yet but the operation needs one.
    #[error("collection of {0} has no collection id assigned")]
    MissingCollectionId(String),

    /// Hashing a collection name produced an id that is already in use.
    #[error("collection id {id:#010x} for '{name}' collides with '{existing}'")]
    CollectionIdCollision {
        id: u32,
        name: String,
        existing: String,
    },

    /// Schema versions start at 1.
    #[error("schema version 0 is not valid (type {0})")]
    InvalidSchemaVersion(String),

    /// The buffer factory knows no layout for the requested type and version.
    #[error("no buffer layout registered for {type_name} v{version}")]
    UnknownBuffers {
        type_name: String,
        version: SchemaVersion,
    },

    /// The buffers do not hold the payload type the consumer expected.
    #[error("buffer layout mismatch for {type_name}: expected {expected}")]
    LayoutMismatch {
        type_name: String,
        expected: &'static str,
    },

    /// A byte image does not divide evenly into elements.
    #[error("byte buffer of {len} bytes is not a multiple of element size {element_size}")]
    BufferSize { len: usize, element_size: usize },

    /// A vector member present in a byte image has no matching buffer.
    #[error("vector member '{member}' is not part of the {type_name} layout")]
    UnknownVectorMember { type_name: String, member: String },

    /// The offsets of a vector member do not describe its values.
    #[error("malformed offsets for vector member '{0}'")]
    InvalidOffsets(String),

    /// A vector member entry was requested past the stored entries.
    #[error("vector member '{name}' has no entry {index}")]
    VectorMemberIndex { name: String, index: usize },

    /// Schema evolution was requested for a type without a registered current version.
    #[error("no current schema version registered for {0}")]
    UnknownSchema(String),

    /// No evolution step is registered for the stored version.
    #[error("no schema evolution step for {type_name} from v{from} to v{current}")]
    MissingEvolution {
        type_name: String,
        from: SchemaVersion,
        current: SchemaVersion,
    },

    /// A relation target could not be found while linking.
    #[error("unresolved reference {id} in {type_name}")]
    UnresolvedReference { type_name: String, id: ObjectID },

    /// A datamodel definition is not valid JSON.
    #[error("invalid datamodel definition: {0}")]
    Json(#[from] serde_json::Error),

    /// A version string is not of the form `major.minor.patch`.
    #[error("invalid version string '{0}'")]
    InvalidVersion(String),
}

impl EdmError {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyTracked(_)
            | Self::UntrackedInSubset(_)
            | Self::Unavailable
            | Self::OutOfRange { .. } => ErrorKind::InvalidArgument,
            Self::CreateInSubset(_)
            | Self::CollectionIdImmutable { .. }
            | Self::MissingCollectionId(_)
            | Self::CollectionIdCollision { .. }
            | Self::InvalidSchemaVersion(_)
            | Self::UnknownSchema(_) => ErrorKind::Logic,
            Self::UnknownBuffers { .. }
            | Self::MissingEvolution { .. }
            | Self::UnknownVectorMember { .. }
            | Self::UnresolvedReference { .. } => ErrorKind::Degraded,
            Self::LayoutMismatch { .. }
            | Self::BufferSize { .. }
            | Self::InvalidOffsets(_)
            | Self::VectorMemberIndex { .. }
            | Self::Json(_)
            | Self::InvalidVersion(_) => ErrorKind::Format,
        }
    }
}

/// Result type for EDM operations.
pub type EdmResult<T> = Result<T, EdmError>;
