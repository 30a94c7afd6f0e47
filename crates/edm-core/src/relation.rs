//! Generic weighted 1:1 relations between two record types.
//!
//! [`Association<F, T>`] and [`Link<F, T>`] are ordinary records: they live
//! in a [`Collection`], are flattened and rehydrated like any other type and
//! resolve their two slots through the collection provider. No per-pair
//! code is needed; any two record types can be related.
//!
//! ```ignore
//! let mut links = Collection::<Link<Hit, Cluster>>::new();
//! let link = links.create()?;
//! link.set_from(&hit);
//! link.set_to(&cluster);
//! link.set_weight(0.5);
//! ```

use std::{borrow::Cow, fmt, marker::PhantomData};

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::{
    Collection, ObjectID, Record, RecordMut, RecordRef, SchemaVersion,
    provider::{CollectionProvider, Resolution, lookup},
    record::Relations,
};

/// Distinguishes relation families that share one layout.
pub trait RelationKind: Send + Sync + 'static {
    /// Name prefix of the record and collection types.
    const NAME: &'static str;
}

/// Marker for [`Association`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssociationKind;

impl RelationKind for AssociationKind {
    const NAME: &'static str = "Association";
}

/// Marker for [`Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinkKind;

impl RelationKind for LinkKind {
    const NAME: &'static str = "Link";
}

/// Payload of a relation record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct RelationData {
    pub weight: f32,
}

/// The `from` and `to` slots of a relation.
pub struct FromTo<F: Record, T: Record> {
    from: Option<RecordRef<F>>,
    to: Option<RecordRef<T>>,
}

impl<F: Record, T: Record> Default for FromTo<F, T> {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
        }
    }
}

impl<F: Record, T: Record> Clone for FromTo<F, T> {
    fn clone(&self) -> Self {
        Self {
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

impl<F: Record, T: Record> fmt::Debug for FromTo<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromTo")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

fn slot_id<R: Record>(slot: Option<&RecordRef<R>>) -> ObjectID {
    slot.map_or(ObjectID::INVALID, RecordRef::id)
}

impl<F: Record, T: Record> Relations for FromTo<F, T> {
    const NAMES: &'static [&'static str] = &["from", "to"];

    fn target_ids(&self) -> SmallVec<[ObjectID; 4]> {
        smallvec![slot_id(self.from.as_ref()), slot_id(self.to.as_ref())]
    }

    fn resolve(
        &mut self,
        slot: usize,
        id: ObjectID,
        provider: &dyn CollectionProvider,
    ) -> Resolution {
        match slot {
            0 => lookup::<F>(provider, id).assign(&mut self.from),
            1 => lookup::<T>(provider, id).assign(&mut self.to),
            _ => Resolution::Unset,
        }
    }
}

/// A weighted 1:1 relation from an `F` record to a `T` record.
pub struct WeightedRelation<K, F, T>(PhantomData<fn() -> (K, F, T)>);

/// Weighted association between two record types.
pub type Association<F, T> = WeightedRelation<AssociationKind, F, T>;

/// Weighted link between two record types.
pub type Link<F, T> = WeightedRelation<LinkKind, F, T>;

impl<K: RelationKind, F: Record, T: Record> Record for WeightedRelation<K, F, T> {
    type Data = RelationData;
    type Relations = FromTo<F, T>;
    type Members = ();

    const SCHEMA_VERSION: SchemaVersion = 1;

    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("{}<{},{}>", K::NAME, F::type_name(), T::type_name()))
    }

    fn collection_type_name() -> Cow<'static, str> {
        Cow::Owned(format!(
            "{}Collection<{},{}>",
            K::NAME,
            F::type_name(),
            T::type_name()
        ))
    }

    fn data_type_name() -> Cow<'static, str> {
        Cow::Owned(format!("{}Data", K::NAME))
    }
}

impl<K: RelationKind, F: Record, T: Record> RecordRef<WeightedRelation<K, F, T>> {
    /// Source record; an empty handle if unset.
    #[must_use]
    pub fn get_from(&self) -> RecordRef<F> {
        self.with_obj(|obj| obj.relations.from.clone())
            .flatten()
            .unwrap_or_default()
    }

    /// Target record; an empty handle if unset.
    #[must_use]
    pub fn get_to(&self) -> RecordRef<T> {
        self.with_obj(|obj| obj.relations.to.clone())
            .flatten()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn weight(&self) -> f32 {
        self.data().weight
    }
}

impl<K: RelationKind, F: Record, T: Record> RecordMut<WeightedRelation<K, F, T>> {
    /// Point the relation at `from`. Returns `false` for empty or stale handles.
    pub fn set_from(&self, from: &RecordRef<F>) -> bool {
        let from = from.clone();
        self.with_obj_mut(|obj| obj.relations.from = Some(from))
            .is_some()
    }

    /// Point the relation at `to`. Returns `false` for empty or stale handles.
    pub fn set_to(&self, to: &RecordRef<T>) -> bool {
        let to = to.clone();
        self.with_obj_mut(|obj| obj.relations.to = Some(to))
            .is_some()
    }

    pub fn set_weight(&self, weight: f32) -> bool {
        self.update(|data| data.weight = weight)
    }
}

/// A related record together with the relation weight.
pub struct Weighted<R: Record> {
    pub record: RecordRef<R>,
    pub weight: f32,
}

impl<R: Record> Clone for Weighted<R> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
            weight: self.weight,
        }
    }
}

impl<R: Record> fmt::Debug for Weighted<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weighted")
            .field("record", &self.record)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Forward and reverse lookup over a collection of relations.
///
/// Built once from a linked collection; records are matched by identity.
/// Relations with an unset end are skipped.
pub struct Navigator<K, F: Record, T: Record> {
    forward: FxHashMap<RecordRef<F>, Vec<Weighted<T>>>,
    reverse: FxHashMap<RecordRef<T>, Vec<Weighted<F>>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: RelationKind, F: Record, T: Record> Navigator<K, F, T> {
    /// Index every relation in `relations`.
    #[must_use]
    pub fn new(relations: &Collection<WeightedRelation<K, F, T>>) -> Self {
        let mut forward: FxHashMap<RecordRef<F>, Vec<Weighted<T>>> = FxHashMap::default();
        let mut reverse: FxHashMap<RecordRef<T>, Vec<Weighted<F>>> = FxHashMap::default();

        for relation in relations {
            let from = relation.get_from();
            let to = relation.get_to();
            if !from.is_available() || !to.is_available() {
                continue;
            }
            let weight = relation.weight();

            forward.entry(from.clone()).or_default().push(Weighted {
                record: to.clone(),
                weight,
            });
            reverse.entry(to).or_default().push(Weighted {
                record: from,
                weight,
            });
        }

        Self {
            forward,
            reverse,
            _kind: PhantomData,
        }
    }

    /// Records related from `from`.
    #[must_use]
    pub fn targets_of(&self, from: &RecordRef<F>) -> &[Weighted<T>] {
        self.forward
            .get(from)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Records related to `to`.
    #[must_use]
    pub fn sources_of(&self, to: &RecordRef<T>) -> &[Weighted<F>] {
        self.reverse
            .get(to)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl<K, F: Record, T: Record> fmt::Debug for Navigator<K, F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("sources", &self.forward.len())
            .field("targets", &self.reverse.len())
            .finish()
    }
}
