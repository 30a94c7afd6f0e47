//! Sibling collection lookup used while linking relations.

use std::hash::Hasher;

use rustc_hash::{FxHashMap, FxHasher};

use crate::{
    Collection, ObjectID, Record, RecordRef,
    collection::CollectionBase,
    error::{EdmError, EdmResult},
};

/// Supplies sibling collections by collection id.
///
/// Implemented by whatever aggregates the collections of one event. A
/// `None` result resolves the relation to "unset".
pub trait CollectionProvider {
    /// Collection registered under `collection_id`.
    fn get(&self, collection_id: u32) -> Option<&dyn CollectionBase>;
}

impl CollectionProvider for Vec<Box<dyn CollectionBase>> {
    fn get(&self, collection_id: u32) -> Option<&dyn CollectionBase> {
        self.iter()
            .map(|c| &**c)
            .find(|c| c.id() == Some(collection_id))
    }
}

impl CollectionProvider for Vec<&dyn CollectionBase> {
    fn get(&self, collection_id: u32) -> Option<&dyn CollectionBase> {
        self.iter()
            .copied()
            .find(|c| c.id() == Some(collection_id))
    }
}

impl CollectionProvider for FxHashMap<u32, Box<dyn CollectionBase>> {
    fn get(&self, collection_id: u32) -> Option<&dyn CollectionBase> {
        FxHashMap::get(self, &collection_id).map(|c| &**c)
    }
}

/// Outcome of resolving one relation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The stored address was an empty-slot sentinel.
    Unset,
    /// The slot now points at its target.
    Resolved,
    /// The target collection or index could not be found; the slot stays unset.
    Missing,
}

/// Result of looking up a typed record by address.
#[derive(Debug)]
pub enum Lookup<R: Record> {
    /// The address is a sentinel; there is no target.
    Unset,
    /// The record stored at the address.
    Found(RecordRef<R>),
    /// No collection of the right type holds the address.
    Missing,
}

impl<R: Record> Lookup<R> {
    /// Store the outcome in `slot` and report it.
    pub fn assign(self, slot: &mut Option<RecordRef<R>>) -> Resolution {
        match self {
            Self::Unset => {
                *slot = None;
                Resolution::Unset
            }
            Self::Found(record) => {
                *slot = Some(record);
                Resolution::Resolved
            }
            Self::Missing => {
                *slot = None;
                Resolution::Missing
            }
        }
    }
}

/// Find the record of type `R` stored at `id`.
pub fn lookup<R: Record>(provider: &dyn CollectionProvider, id: ObjectID) -> Lookup<R> {
    if !id.is_tracked() {
        return Lookup::Unset;
    }

    let Some(collection) = provider.get(id.collection_id) else {
        return Lookup::Missing;
    };
    let Some(collection) = collection.as_any().downcast_ref::<Collection<R>>() else {
        return Lookup::Missing;
    };

    match collection.get(id.index as usize) {
        Some(record) => Lookup::Found(record),
        None => Lookup::Missing,
    }
}

/// Assigns collection ids to collection names.
///
/// Ids are derived from a hash of the name so the same name gets the same id
/// across runs. The sentinel collection ids of [`ObjectID`] are never handed
/// out.
#[derive(Debug, Clone, Default)]
pub struct CollectionIdTable {
    names: Vec<String>,
    ids: Vec<u32>,
}

impl CollectionIdTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, adding it if new.
    pub fn add(&mut self, name: &str) -> EdmResult<u32> {
        if let Some(id) = self.collection_id(name) {
            return Ok(id);
        }

        let id = Self::hash_name(name);
        if let Some(existing) = self.name(id) {
            return Err(EdmError::CollectionIdCollision {
                id,
                name: name.to_string(),
                existing: existing.to_string(),
            });
        }

        self.names.push(name.to_string());
        self.ids.push(id);
        Ok(id)
    }

    /// Id of `name`, if present.
    #[must_use]
    pub fn collection_id(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.ids[i])
    }

    /// Name registered under `id`, if present.
    #[must_use]
    pub fn name(&self, id: u32) -> Option<&str> {
        self.ids
            .iter()
            .position(|&i| i == id)
            .map(|i| self.names[i].as_str())
    }

    /// Iterate over `(name, id)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.ids.iter().copied())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn hash_name(name: &str) -> u32 {
        let mut hasher = FxHasher::default();
        hasher.write(name.as_bytes());
        let hash = hasher.finish();
        let id = (hash ^ (hash >> 32)) as u32;

        // Keep clear of the sentinel collection ids.
        if id >= ObjectID::INVALID.collection_id {
            id & 0x7fff_ffff
        } else {
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::record! {
        Ping { data: u32, name: "Ping", version: 1 }
    }

    #[test]
    fn test_id_table_is_stable() {
        let mut table = CollectionIdTable::new();
        let hits = table.add("hits").unwrap();
        let clusters = table.add("clusters").unwrap();

        assert_ne!(hits, clusters);
        assert_eq!(table.add("hits").unwrap(), hits);
        assert_eq!(table.len(), 2);
        assert_eq!(table.name(clusters), Some("clusters"));
        assert_eq!(table.collection_id("hits"), Some(hits));

        let mut other = CollectionIdTable::new();
        assert_eq!(other.add("clusters").unwrap(), clusters);
    }

    #[test]
    fn test_id_table_avoids_sentinels() {
        let mut table = CollectionIdTable::new();
        for i in 0..512 {
            let id = table.add(&format!("collection_{i}")).unwrap();
            assert!(id < ObjectID::INVALID.collection_id);
        }
    }

    #[test]
    fn test_sentinel_lookup_is_unset() {
        let empty: Vec<Box<dyn CollectionBase>> = Vec::new();
        assert!(matches!(
            lookup::<Ping>(&empty, ObjectID::INVALID),
            Lookup::Unset
        ));
        assert!(matches!(
            lookup::<Ping>(&empty, ObjectID::new(0, 1)),
            Lookup::Missing
        ));

        let mut pings = Collection::<Ping>::new();
        pings.create().unwrap().set_data(7);
        pings.set_id(1).unwrap();
        let provider: Vec<Box<dyn CollectionBase>> = vec![Box::new(pings)];

        match lookup::<Ping>(&provider, ObjectID::new(0, 1)) {
            Lookup::Found(ping) => assert_eq!(ping.data(), 7),
            other => panic!("expected a hit, got {other:?}"),
        }
        assert!(matches!(
            lookup::<Ping>(&provider, ObjectID::new(1, 1)),
            Lookup::Missing
        ));
    }
}
