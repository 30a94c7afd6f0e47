//! The contract between generated datamodel types and the runtime core.
//!
//! A record type is a zero-sized marker implementing [`Record`]. It names
//! the POD payload stored per record, the relation slots and the vector
//! members. Handles, collections and buffers are all generic over it, so a
//! datamodel needs no per-type collection code.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
//! #[repr(C)]
//! pub struct HitData { pub energy: f32 }
//!
//! edm_core::record! {
//!     pub Hit { data: HitData, name: "Hit", version: 1 }
//! }
//! ```

use std::borrow::Cow;

use bytemuck::Pod;
use smallvec::SmallVec;

use crate::{
    ObjectID,
    buffers::VectorMemberBuffer,
    error::EdmResult,
    provider::{CollectionProvider, Resolution},
};

/// Version of a record's on-disk layout. Versions start at 1.
pub type SchemaVersion = u32;

/// A record type of a datamodel.
pub trait Record: Sized + Send + Sync + 'static {
    /// Plain-old-data payload stored per record.
    type Data: Pod + Default + Send + Sync;
    /// Relation slots to other records.
    type Relations: Relations;
    /// Variable-length members.
    type Members: VectorMembers;

    /// Layout version this build reads and writes.
    const SCHEMA_VERSION: SchemaVersion;

    /// Canonical name of the record type.
    fn type_name() -> Cow<'static, str>;

    /// Canonical name of the collection type; the buffer factory key.
    fn collection_type_name() -> Cow<'static, str> {
        Cow::Owned(format!("{}Collection", Self::type_name()))
    }

    /// Canonical name of the payload type.
    fn data_type_name() -> Cow<'static, str> {
        Cow::Owned(format!("{}Data", Self::type_name()))
    }
}

/// Relation slots of a record.
///
/// Slots hold handles to other records while live and are flattened to one
/// [`ObjectID`] per slot when a collection is prepared for writing.
pub trait Relations: Default + Clone + Send + Sync + 'static {
    /// Field names of the slots, in storage order.
    const NAMES: &'static [&'static str];

    /// Target address of every slot, [`ObjectID::INVALID`] for empty slots.
    fn target_ids(&self) -> SmallVec<[ObjectID; 4]>;

    /// Resolve slot `slot` to the record stored at `id`.
    fn resolve(
        &mut self,
        slot: usize,
        id: ObjectID,
        provider: &dyn CollectionProvider,
    ) -> Resolution;
}

impl Relations for () {
    const NAMES: &'static [&'static str] = &[];

    fn target_ids(&self) -> SmallVec<[ObjectID; 4]> {
        SmallVec::new()
    }

    fn resolve(&mut self, _: usize, _: ObjectID, _: &dyn CollectionProvider) -> Resolution {
        Resolution::Unset
    }
}

/// Variable-length members of a record.
pub trait VectorMembers: Default + Clone + Send + Sync + 'static {
    /// Field names of the members, in storage order.
    const NAMES: &'static [&'static str];

    /// Empty buffers, one per member.
    fn allocate() -> Vec<VectorMemberBuffer>;

    /// Append this record's members as the next entry of each buffer.
    fn write_into(&self, buffers: &mut [VectorMemberBuffer]) -> EdmResult<()>;

    /// Rebuild the members of entry `index`.
    fn read_from(buffers: &[VectorMemberBuffer], index: usize) -> EdmResult<Self>;
}

impl VectorMembers for () {
    const NAMES: &'static [&'static str] = &[];

    fn allocate() -> Vec<VectorMemberBuffer> {
        Vec::new()
    }

    fn write_into(&self, _: &mut [VectorMemberBuffer]) -> EdmResult<()> {
        Ok(())
    }

    fn read_from(_: &[VectorMemberBuffer], _: usize) -> EdmResult<Self> {
        Ok(())
    }
}

/// Declare a record type.
///
/// `relations` and `members` are optional and default to `()`.
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis $name:ident {
            data: $data:ty,
            name: $type_name:literal,
            version: $version:literal
            $(, relations: $relations:ty)?
            $(, members: $members:ty)?
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name;

        impl $crate::Record for $name {
            type Data = $data;
            type Relations = $crate::__record_slot!($($relations)?);
            type Members = $crate::__record_slot!($($members)?);

            const SCHEMA_VERSION: $crate::SchemaVersion = $version;

            fn type_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed($type_name)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_slot {
    () => {
        ()
    };
    ($ty:ty) => {
        $ty
    };
}
