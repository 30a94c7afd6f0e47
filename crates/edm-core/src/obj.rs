//! Heap storage for a single record.

use std::fmt;

use crate::{ObjectID, Record};

/// One record: persistent address, POD payload, relation slots and vector members.
///
/// Copying an `Obj` copies the payload and the relation handles (which keep
/// aliasing the same targets); the copy starts untracked.
pub struct Obj<R: Record> {
    pub(crate) id: ObjectID,
    pub(crate) data: R::Data,
    pub(crate) relations: R::Relations,
    pub(crate) members: R::Members,
}

impl<R: Record> Obj<R> {
    /// A fresh, untracked record.
    #[must_use]
    pub fn new(data: R::Data) -> Self {
        Self::with_id(ObjectID::UNTRACKED, data)
    }

    pub(crate) fn with_id(id: ObjectID, data: R::Data) -> Self {
        Self {
            id,
            data,
            relations: R::Relations::default(),
            members: R::Members::default(),
        }
    }

    /// Untracked copy; relation slots are copied only if `with_relations`.
    #[must_use]
    pub fn duplicate(&self, with_relations: bool) -> Self {
        Self {
            id: ObjectID::UNTRACKED,
            data: self.data,
            relations: if with_relations {
                self.relations.clone()
            } else {
                R::Relations::default()
            },
            members: self.members.clone(),
        }
    }

    /// Persistent address.
    #[must_use]
    pub const fn id(&self) -> ObjectID {
        self.id
    }

    /// Payload.
    #[must_use]
    pub const fn data(&self) -> &R::Data {
        &self.data
    }

    /// Relation slots.
    #[must_use]
    pub const fn relations(&self) -> &R::Relations {
        &self.relations
    }

    /// Vector members.
    #[must_use]
    pub const fn members(&self) -> &R::Members {
        &self.members
    }
}

impl<R: Record> Default for Obj<R> {
    fn default() -> Self {
        Self::new(R::Data::default())
    }
}

impl<R: Record> fmt::Debug for Obj<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("type", &R::type_name())
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
