//! Buffer allocation keyed by collection type name and schema version.
//!
//! A generic reader only knows the type name and schema version stored on
//! disk. The [`BufferFactory`] maps that pair to a [`BufferCreator`], which
//! allocates empty buffers of the matching layout and, for the current
//! layout, builds the typed collection around filled buffers.

use std::{fmt, marker::PhantomData, sync::Arc};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    Collection, Record, SchemaVersion,
    buffers::CollectionBuffers,
    collection::CollectionBase,
    error::{EdmError, EdmResult},
};

/// Allocates buffers for one collection type at one schema version.
pub trait BufferCreator: Send + Sync {
    /// Empty buffers of this layout.
    fn create_buffers(&self, is_subset: bool) -> CollectionBuffers;

    /// Typed collection around buffers of this layout.
    ///
    /// Creators for historical layouts have no collection type and return an
    /// error; their buffers must be evolved first.
    fn create_collection(&self, buffers: CollectionBuffers) -> EdmResult<Box<dyn CollectionBase>> {
        Err(EdmError::LayoutMismatch {
            type_name: buffers.type_name,
            expected: "a layout with a collection type",
        })
    }
}

impl<Func> BufferCreator for Func
where
    Func: Fn(bool) -> CollectionBuffers + Send + Sync,
{
    fn create_buffers(&self, is_subset: bool) -> CollectionBuffers {
        self(is_subset)
    }
}

/// Creator for the current layout of record type `R`.
pub struct RecordBuffers<R>(PhantomData<fn() -> R>);

impl<R: Record> RecordBuffers<R> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R: Record> Default for RecordBuffers<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> BufferCreator for RecordBuffers<R> {
    fn create_buffers(&self, is_subset: bool) -> CollectionBuffers {
        CollectionBuffers::for_record::<R>(is_subset)
    }

    fn create_collection(&self, buffers: CollectionBuffers) -> EdmResult<Box<dyn CollectionBase>> {
        Ok(Box::new(Collection::<R>::from_buffers(buffers)?))
    }
}

/// Registry of buffer creators.
///
/// Slot `v - 1` of a type holds the creator registered for schema version
/// `v`. Lookups fall back to the nearest earlier registered creator, so an
/// unregistered intermediate version is treated as having the same layout as
/// the version before it, whatever order the versions were registered in.
#[derive(Default)]
pub struct BufferFactory {
    creators: FxHashMap<String, Vec<Option<Arc<dyn BufferCreator>>>>,
}

impl BufferFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the creator for `(type_name, version)`.
    ///
    /// Registering the same pair again replaces the creator.
    pub fn register_creation_func(
        &mut self,
        type_name: impl Into<String>,
        version: SchemaVersion,
        creator: impl BufferCreator + 'static,
    ) -> EdmResult<()> {
        let type_name = type_name.into();
        if version == 0 {
            return Err(EdmError::InvalidSchemaVersion(type_name));
        }

        let slot = version as usize - 1;
        let slots = self.creators.entry(type_name.clone()).or_default();
        if slots.len() <= slot {
            slots.resize(slot + 1, None);
        }
        slots[slot] = Some(Arc::new(creator));

        let back_filled = slots
            .iter()
            .skip_while(|creator| creator.is_none())
            .filter(|creator| creator.is_none())
            .count();
        if back_filled > 0 {
            debug!(%type_name, version, back_filled, "back-filling unregistered versions");
        }

        debug!(%type_name, version, "registered buffer creator");
        Ok(())
    }

    /// Register the current layout of `R`.
    pub fn register_record<R: Record>(&mut self) -> EdmResult<()> {
        self.register_creation_func(
            R::collection_type_name(),
            R::SCHEMA_VERSION,
            RecordBuffers::<R>::new(),
        )
    }

    /// Creator for `(type_name, version)`, if known.
    ///
    /// An unregistered version below the highest registered one resolves to
    /// the nearest earlier registered creator.
    #[must_use]
    pub fn creator(&self, type_name: &str, version: SchemaVersion) -> Option<&Arc<dyn BufferCreator>> {
        let slot = (version as usize).checked_sub(1)?;
        self.creators
            .get(type_name)?
            .get(..=slot)?
            .iter()
            .rev()
            .flatten()
            .next()
    }

    /// Empty buffers for `(type_name, version)`, `None` if unknown.
    ///
    /// The returned buffers report `version` even if they were allocated by
    /// a back-filled creator.
    #[must_use]
    pub fn create_buffers(
        &self,
        type_name: &str,
        version: SchemaVersion,
        is_subset: bool,
    ) -> Option<CollectionBuffers> {
        let mut buffers = self.creator(type_name, version)?.create_buffers(is_subset);
        buffers.schema_version = version;
        Some(buffers)
    }

    /// Highest registered version of `type_name`.
    #[must_use]
    pub fn latest_version(&self, type_name: &str) -> Option<SchemaVersion> {
        self.creators
            .get(type_name)
            .map(|slots| slots.len() as SchemaVersion)
    }

    /// Whether any version of `type_name` is registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.creators.contains_key(type_name)
    }

    /// Registered type names, in no particular order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.creators.keys().map(String::as_str)
    }
}

impl fmt::Debug for BufferFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.creators
                    .iter()
                    .map(|(name, slots)| (name, slots.len())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};

    use super::*;

    #[derive(Clone, Copy, Default, Pod, Zeroable)]
    #[repr(C)]
    struct GaugeData {
        reading: f64,
    }

    crate::record! {
        Gauge { data: GaugeData, name: "Gauge", version: 3 }
    }

    fn legacy(is_subset: bool) -> CollectionBuffers {
        let mut buffers = CollectionBuffers::for_record::<Gauge>(is_subset);
        if !is_subset {
            buffers.set_data(Vec::<f32>::new());
        }
        buffers
    }

    #[test]
    fn test_backfills_intermediate_versions() {
        let mut factory = BufferFactory::new();
        factory
            .register_creation_func("GaugeCollection", 1, legacy)
            .unwrap();
        factory.register_record::<Gauge>().unwrap();

        assert_eq!(factory.latest_version("GaugeCollection"), Some(3));

        let v2 = factory.create_buffers("GaugeCollection", 2, false).unwrap();
        assert_eq!(v2.schema_version, 2);
        assert!(v2.data::<f32>().is_some());

        let v3 = factory.create_buffers("GaugeCollection", 3, false).unwrap();
        assert!(v3.data::<GaugeData>().is_some());
        assert!(factory.create_buffers("GaugeCollection", 4, false).is_none());
    }

    #[test]
    fn test_backfills_when_older_version_registers_last() {
        let mut factory = BufferFactory::new();
        factory.register_record::<Gauge>().unwrap();
        assert!(factory.creator("GaugeCollection", 2).is_none());

        factory
            .register_creation_func("GaugeCollection", 1, legacy)
            .unwrap();
        let v2 = factory.create_buffers("GaugeCollection", 2, false).unwrap();
        assert_eq!(v2.schema_version, 2);
        assert!(v2.data::<f32>().is_some());
        assert!(factory
            .create_buffers("GaugeCollection", 3, false)
            .unwrap()
            .data::<GaugeData>()
            .is_some());
        assert_eq!(factory.latest_version("GaugeCollection"), Some(3));
    }

    #[test]
    fn test_backfill_follows_nearest_registration() {
        let mut factory = BufferFactory::new();
        factory
            .register_creation_func("GaugeCollection", 1, legacy)
            .unwrap();
        factory.register_record::<Gauge>().unwrap();
        assert!(factory
            .create_buffers("GaugeCollection", 2, false)
            .unwrap()
            .data::<f32>()
            .is_some());

        // An explicit v2 takes over from the v1 fallback.
        factory
            .register_creation_func("GaugeCollection", 2, |is_subset: bool| {
                let mut buffers = CollectionBuffers::for_record::<Gauge>(is_subset);
                if !is_subset {
                    buffers.set_data(Vec::<f64>::new());
                }
                buffers
            })
            .unwrap();
        assert!(factory
            .create_buffers("GaugeCollection", 2, false)
            .unwrap()
            .data::<f64>()
            .is_some());
    }

    #[test]
    fn test_gap_without_earlier_creator_stays_unknown() {
        let mut factory = BufferFactory::new();
        factory.register_record::<Gauge>().unwrap();
        assert!(factory.create_buffers("GaugeCollection", 1, false).is_none());
        assert!(factory.create_buffers("GaugeCollection", 3, true).is_some());
    }

    #[test]
    fn test_rejects_version_zero() {
        let mut factory = BufferFactory::new();
        let err = factory
            .register_creation_func("GaugeCollection", 0, legacy)
            .unwrap_err();
        assert!(matches!(err, EdmError::InvalidSchemaVersion(_)));
        assert!(!factory.contains("GaugeCollection"));
        assert!(factory.creator("GaugeCollection", 0).is_none());
    }

    #[test]
    fn test_only_current_layout_builds_collections() {
        let mut factory = BufferFactory::new();
        factory
            .register_creation_func("GaugeCollection", 1, legacy)
            .unwrap();
        factory.register_record::<Gauge>().unwrap();

        let old = factory.creator("GaugeCollection", 1).unwrap();
        assert!(old.create_collection(old.create_buffers(false)).is_err());

        let current = factory.creator("GaugeCollection", 3).unwrap();
        let collection = current
            .create_collection(current.create_buffers(false))
            .unwrap();
        assert_eq!(collection.type_name(), "GaugeCollection");
        assert!(collection.is_empty());
    }
}
