//! Persistent record addresses.
//!
//! An `ObjectID` is the `(index, collection_id)` pair that identifies a
//! record once it belongs to a collection. Two sentinel values exist:
//!
//! - [`ObjectID::UNTRACKED`]: the record is not (yet) part of any collection
//! - [`ObjectID::INVALID`]: a relation slot that is intentionally empty
//!
//! Both sentinels are stored bit-exactly by every backend.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Persistent `(index, collection_id)` address of a record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct ObjectID {
    /// Position of the record inside its collection.
    pub index: i32,
    /// Id of the owning collection.
    pub collection_id: u32,
}

impl ObjectID {
    /// Index value of records that are not part of a collection.
    pub const UNTRACKED_INDEX: i32 = -1;
    /// Index value of intentionally empty relation slots.
    pub const INVALID_INDEX: i32 = -2;

    /// Address of a record that belongs to no collection.
    pub const UNTRACKED: Self = Self {
        index: Self::UNTRACKED_INDEX,
        collection_id: Self::UNTRACKED_INDEX as u32,
    };

    /// Address stored for an empty relation slot.
    pub const INVALID: Self = Self {
        index: Self::INVALID_INDEX,
        collection_id: Self::INVALID_INDEX as u32,
    };

    /// Create an address from its parts.
    #[must_use]
    pub const fn new(index: i32, collection_id: u32) -> Self {
        Self {
            index,
            collection_id,
        }
    }

    /// Whether this is the untracked sentinel index.
    #[must_use]
    pub const fn is_untracked(self) -> bool {
        self.index == Self::UNTRACKED_INDEX
    }

    /// Whether this is the empty-relation sentinel index.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.index == Self::INVALID_INDEX
    }

    /// Whether the address points at a slot in some collection.
    #[must_use]
    pub const fn is_tracked(self) -> bool {
        self.index >= 0
    }

    /// Pack into a single u64 (collection id in the high half).
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.collection_id as u64) << 32) | (self.index as u32 as u64)
    }

    /// Unpack from [`to_bits`](Self::to_bits).
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32 as i32,
            collection_id: (bits >> 32) as u32,
        }
    }
}

impl Default for ObjectID {
    fn default() -> Self {
        Self::UNTRACKED
    }
}

impl fmt::Debug for ObjectID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_untracked() {
            f.write_str("ObjectID(untracked)")
        } else if self.is_invalid() {
            f.write_str("ObjectID(invalid)")
        } else {
            write!(f, "ObjectID({:08x}|{})", self.collection_id, self.index)
        }
    }
}

impl fmt::Display for ObjectID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}|{}", self.collection_id, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert!(ObjectID::UNTRACKED.is_untracked());
        assert!(ObjectID::INVALID.is_invalid());
        assert!(!ObjectID::UNTRACKED.is_tracked());
        assert!(!ObjectID::INVALID.is_tracked());
        assert_eq!(ObjectID::default(), ObjectID::UNTRACKED);
        assert_ne!(ObjectID::UNTRACKED, ObjectID::INVALID);
    }

    #[test]
    fn test_sentinel_bytes_are_stable() {
        assert_eq!(
            bytemuck::bytes_of(&ObjectID::UNTRACKED),
            &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(
            bytemuck::bytes_of(&ObjectID::INVALID),
            &[0xfe, 0xff, 0xff, 0xff, 0xfe, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_bits_roundtrip() {
        for id in [ObjectID::new(7, 0xdead_beef), ObjectID::INVALID, ObjectID::UNTRACKED] {
            assert_eq!(ObjectID::from_bits(id.to_bits()), id);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ObjectID::new(3, 0x2a).to_string(), "0000002a|3");
    }
}
