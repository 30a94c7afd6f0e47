//! Typed record collections and their persistence state machine.
//!
//! A [`Collection`] owns an ordered sequence of records of one type, or, as a
//! subset collection, aliases records owned elsewhere. Each collection moves
//! through these states:
//!
//! ```text
//! write:  Live ──prepare_for_write──► PreparedForWrite
//! read:   from_buffers ──► BuffersAttached ──prepare_after_read──► Rehydrated
//!                                   ──set_references──► Linked
//! ```
//!
//! Records live behind [`Owner`]s, so growing the sequence never moves a
//! record and outstanding handles stay valid until the collection clears.

use std::{
    any::Any,
    borrow::Cow,
    fmt,
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::{
    DegradePolicy, MaybeShared, Obj, ObjectID, Owner, Record, RecordMut, RecordRef, SchemaVersion,
    buffers::CollectionBuffers,
    error::{EdmError, EdmResult},
    provider::{CollectionProvider, Lookup, Resolution, lookup},
    record::{Relations, VectorMembers},
};

/// Where a collection is in its persistence life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionState {
    /// Built in memory; relations are direct handles.
    Live,
    /// Flattened into write buffers.
    PreparedForWrite,
    /// Holds buffers read from storage; no records yet.
    BuffersAttached,
    /// Records rebuilt from buffers; relations still hold raw addresses.
    Rehydrated,
    /// Relations resolved against sibling collections.
    Linked,
}

/// Type-erased view of a collection, used by readers, writers and providers.
pub trait CollectionBase: Any + Send + Sync {
    /// Canonical collection type name; the buffer factory key.
    fn type_name(&self) -> Cow<'static, str>;

    /// Canonical name of the record type.
    fn value_type_name(&self) -> Cow<'static, str>;

    /// Canonical name of the payload type.
    fn data_type_name(&self) -> Cow<'static, str>;

    /// Layout version written by this build.
    fn schema_version(&self) -> SchemaVersion;

    /// Collection id, once assigned.
    fn id(&self) -> Option<u32>;

    /// Assign the collection id. Fails if a different id was assigned before.
    fn set_id(&mut self, id: u32) -> EdmResult<()>;

    /// Number of records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the collection aliases records owned by other collections.
    fn is_subset(&self) -> bool;

    fn state(&self) -> CollectionState;

    /// Flatten all records into write buffers.
    ///
    /// Only the first call flattens; later calls return the same buffers
    /// until the collection is structurally modified.
    fn prepare_for_write(&self) -> &CollectionBuffers;

    /// Write buffers if prepared, otherwise the buffers attached on read.
    fn buffers(&self) -> Option<&CollectionBuffers>;

    /// Rebuild records from the attached buffers.
    fn prepare_after_read(&mut self) -> EdmResult<()>;

    /// Resolve every stored relation address against sibling collections.
    ///
    /// Returns `Ok(false)` if some target could not be found and the
    /// degrade policy is [`DegradePolicy::Warn`].
    fn set_references(&self, provider: &dyn CollectionProvider) -> EdmResult<bool>;

    /// How unresolved references are reported.
    fn set_degrade_policy(&mut self, policy: DegradePolicy);

    /// Drop all records. Handles to owned records become stale.
    fn clear(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl fmt::Debug for dyn CollectionBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionBase")
            .field("type", &self.type_name())
            .field("id", &self.id())
            .field("len", &self.len())
            .field("state", &self.state())
            .finish()
    }
}

enum Entry<R: Record> {
    /// Record owned by this collection.
    Owned(Owner<Obj<R>>),
    /// Record owned by another collection (subset collections only).
    Alias(MaybeShared<Obj<R>>),
    /// Subset entry read from storage and not linked yet.
    Unresolved(ObjectID),
}

impl<R: Record> Entry<R> {
    fn handle(&self) -> RecordRef<R> {
        match self {
            Self::Owned(owner) => RecordRef::from_shared(owner.share()),
            Self::Alias(shared) => RecordRef::from_shared(shared.clone()),
            Self::Unresolved(_) => RecordRef::empty(),
        }
    }

    fn id(&self) -> ObjectID {
        match self {
            Self::Owned(owner) => owner.read().map_or(ObjectID::UNTRACKED, |obj| obj.id),
            Self::Alias(shared) => shared.read().map_or(ObjectID::UNTRACKED, |obj| obj.id),
            Self::Unresolved(id) => *id,
        }
    }
}

/// Buffers attached on read and how far rehydration got.
struct ReadState {
    buffers: CollectionBuffers,
    rehydrated: bool,
}

/// Ordered collection of records of type `R`.
pub struct Collection<R: Record> {
    id: Option<u32>,
    is_subset: bool,
    entries: RwLock<Vec<Entry<R>>>,
    write_buffers: OnceLock<CollectionBuffers>,
    read: Option<ReadState>,
    linked: AtomicBool,
    link_lock: Mutex<()>,
    policy: DegradePolicy,
}

impl<R: Record> Collection<R> {
    /// Empty owning collection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    /// Empty subset collection.
    #[must_use]
    pub fn new_subset() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(is_subset: bool) -> Self {
        Self {
            id: None,
            is_subset,
            entries: RwLock::new(Vec::new()),
            write_buffers: OnceLock::new(),
            read: None,
            linked: AtomicBool::new(false),
            link_lock: Mutex::new(()),
            policy: DegradePolicy::default(),
        }
    }

    /// Collection backed by buffers read from storage.
    ///
    /// The buffers must hold the current layout of `R`; call
    /// [`prepare_after_read`](CollectionBase::prepare_after_read) to rebuild
    /// the records.
    pub fn from_buffers(buffers: CollectionBuffers) -> EdmResult<Self> {
        if !buffers.is_subset && buffers.data::<R::Data>().is_none() {
            return Err(EdmError::LayoutMismatch {
                type_name: buffers.type_name,
                expected: std::any::type_name::<R::Data>(),
            });
        }

        let mut collection = Self::with_mode(buffers.is_subset);
        collection.read = Some(ReadState {
            buffers,
            rehydrated: false,
        });
        Ok(collection)
    }

    /// Create a new record owned by this collection.
    pub fn create(&mut self) -> EdmResult<RecordMut<R>> {
        if self.is_subset {
            return Err(EdmError::CreateInSubset(R::collection_type_name().into_owned()));
        }
        self.invalidate_write_buffers();

        let collection_id = self.collection_id_or_untracked();
        let entries = self.entries.get_mut();
        let id = ObjectID::new(entries.len() as i32, collection_id);
        let owner = Owner::new(Obj::with_id(id, R::Data::default()));
        let record = RecordMut::from_shared(owner.share());
        entries.push(Entry::Owned(owner));
        Ok(record)
    }

    /// Add a record.
    ///
    /// An owning collection takes over an untracked record; a subset
    /// collection aliases a record already owned by another collection.
    pub fn push_back(&mut self, record: &RecordRef<R>) -> EdmResult<()> {
        let shared = record.shared().ok_or(EdmError::Unavailable)?;
        if !shared.is_alive() {
            return Err(EdmError::Unavailable);
        }
        let current = record.id();
        let collection_id = self.collection_id_or_untracked();
        let is_subset = self.is_subset;

        let entry = if is_subset {
            if !current.is_tracked() {
                return Err(EdmError::UntrackedInSubset(current));
            }
            Entry::Alias(shared.clone())
        } else {
            if !current.is_untracked() {
                return Err(EdmError::AlreadyTracked(current));
            }
            let owner = shared.release().ok_or(EdmError::AlreadyTracked(current))?;
            if let Some(mut obj) = owner.write() {
                obj.id = ObjectID::new(self.entries.get_mut().len() as i32, collection_id);
            }
            Entry::Owned(owner)
        };

        self.invalidate_write_buffers();
        self.entries.get_mut().push(entry);
        Ok(())
    }

    /// Record at `index`.
    pub fn get(&self, index: usize) -> Option<RecordRef<R>> {
        self.entries.read_recursive().get(index).map(Entry::handle)
    }

    /// Mutable record at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<RecordMut<R>> {
        self.entries
            .get_mut()
            .get(index)
            .and_then(|entry| entry.handle().shared().cloned())
            .map(RecordMut::from_shared)
    }

    /// Record at `index`, failing past the end.
    pub fn at(&self, index: usize) -> EdmResult<RecordRef<R>> {
        let entries = self.entries.read_recursive();
        entries
            .get(index)
            .map(Entry::handle)
            .ok_or(EdmError::OutOfRange {
                index,
                len: entries.len(),
            })
    }

    /// Handles to all records, in order.
    pub fn iter(&self) -> std::vec::IntoIter<RecordRef<R>> {
        self.entries
            .read_recursive()
            .iter()
            .map(Entry::handle)
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Mutable handles to all records, in order.
    pub fn iter_mut(&mut self) -> std::vec::IntoIter<RecordMut<R>> {
        self.entries
            .get_mut()
            .iter()
            .filter_map(|entry| entry.handle().shared().cloned())
            .map(RecordMut::from_shared)
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Current degrade policy for unresolved references.
    #[must_use]
    pub const fn degrade_policy(&self) -> DegradePolicy {
        self.policy
    }

    fn collection_id_or_untracked(&self) -> u32 {
        self.id.unwrap_or(ObjectID::UNTRACKED.collection_id)
    }

    fn invalidate_write_buffers(&mut self) {
        if self.write_buffers.take().is_some() {
            trace!(collection = %R::collection_type_name(), "dropping prepared write buffers");
        }
    }

    fn flatten(&self) -> CollectionBuffers {
        let mut buffers = CollectionBuffers::for_record::<R>(self.is_subset);
        let entries = self.entries.read_recursive();

        if self.is_subset {
            buffers.references[0] = entries.iter().map(Entry::id).collect();
        } else {
            // Rehydrated records hold no handles until linked; keep the stored
            // addresses. Records added since the read have none stored.
            let pending = self
                .read
                .as_ref()
                .filter(|read| read.rehydrated && !self.linked.load(Ordering::Acquire))
                .map(|read| &read.buffers.references);

            let mut data = Vec::with_capacity(entries.len());
            for (index, entry) in entries.iter().enumerate() {
                let Entry::Owned(owner) = entry else {
                    continue;
                };
                let Some(obj) = owner.read() else {
                    continue;
                };

                data.push(obj.data);

                let targets = obj.relations.target_ids();
                for (slot, references) in buffers.references.iter_mut().enumerate() {
                    let id = pending
                        .and_then(|stored| stored.get(slot))
                        .and_then(|ids| ids.get(index))
                        .or_else(|| targets.get(slot))
                        .copied()
                        .unwrap_or(ObjectID::INVALID);
                    references.push(id);
                }

                if let Err(err) = obj.members.write_into(&mut buffers.vector_members) {
                    error!(
                        collection = %R::collection_type_name(),
                        index,
                        %err,
                        "failed to flatten vector members"
                    );
                }
            }
            buffers.set_data(data);
        }

        trace!(
            collection = %R::collection_type_name(),
            records = entries.len(),
            subset = self.is_subset,
            "flattened collection"
        );
        buffers
    }

    fn degrade(&self, id: ObjectID) -> EdmResult<()> {
        if self.policy.is_strict() {
            return Err(EdmError::UnresolvedReference {
                type_name: R::collection_type_name().into_owned(),
                id,
            });
        }
        warn!(
            collection = %R::collection_type_name(),
            %id,
            "relation target not found, leaving it unset"
        );
        Ok(())
    }

    fn link_relations(
        &self,
        stored: &[Vec<ObjectID>],
        provider: &dyn CollectionProvider,
    ) -> EdmResult<bool> {
        let mut complete = true;
        let entries = self.entries.read_recursive();

        for (index, entry) in entries.iter().enumerate() {
            let Entry::Owned(owner) = entry else {
                continue;
            };
            let Some(mut obj) = owner.write() else {
                continue;
            };

            for slot in 0..R::Relations::NAMES.len() {
                // Records added after the read keep their live handles.
                let Some(id) = stored.get(slot).and_then(|ids| ids.get(index)).copied() else {
                    continue;
                };
                if obj.relations.resolve(slot, id, provider) == Resolution::Missing {
                    self.degrade(id)?;
                    complete = false;
                }
            }
        }
        Ok(complete)
    }

    fn link_subset(&self, provider: &dyn CollectionProvider) -> EdmResult<bool> {
        let pending: Vec<(usize, ObjectID)> = self
            .entries
            .read_recursive()
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Unresolved(id) => Some((index, *id)),
                _ => None,
            })
            .collect();

        let mut complete = true;
        let mut resolved = Vec::with_capacity(pending.len());
        for (index, id) in pending {
            match lookup::<R>(provider, id) {
                Lookup::Found(record) => {
                    if let Some(shared) = record.shared() {
                        resolved.push((index, shared.clone()));
                    }
                }
                Lookup::Unset | Lookup::Missing => {
                    self.degrade(id)?;
                    complete = false;
                }
            }
        }

        let mut entries = self.entries.write();
        for (index, shared) in resolved {
            entries[index] = Entry::Alias(shared);
        }
        Ok(complete)
    }
}

impl<R: Record> CollectionBase for Collection<R> {
    fn type_name(&self) -> Cow<'static, str> {
        R::collection_type_name()
    }

    fn value_type_name(&self) -> Cow<'static, str> {
        R::type_name()
    }

    fn data_type_name(&self) -> Cow<'static, str> {
        R::data_type_name()
    }

    fn schema_version(&self) -> SchemaVersion {
        R::SCHEMA_VERSION
    }

    fn id(&self) -> Option<u32> {
        self.id
    }

    fn set_id(&mut self, id: u32) -> EdmResult<()> {
        match self.id {
            Some(current) if current == id => return Ok(()),
            Some(current) => {
                return Err(EdmError::CollectionIdImmutable {
                    current,
                    requested: id,
                });
            }
            None => self.id = Some(id),
        }

        for entry in self.entries.get_mut() {
            if let Entry::Owned(owner) = entry {
                if let Some(mut obj) = owner.write() {
                    obj.id.collection_id = id;
                }
            }
        }
        debug!(collection = %R::collection_type_name(), id, "assigned collection id");
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read_recursive().len()
    }

    fn is_subset(&self) -> bool {
        self.is_subset
    }

    fn state(&self) -> CollectionState {
        if self.write_buffers.get().is_some() {
            return CollectionState::PreparedForWrite;
        }
        match &self.read {
            None => CollectionState::Live,
            Some(read) if !read.rehydrated => CollectionState::BuffersAttached,
            Some(_) if self.linked.load(Ordering::Acquire) => CollectionState::Linked,
            Some(_) => CollectionState::Rehydrated,
        }
    }

    fn prepare_for_write(&self) -> &CollectionBuffers {
        self.write_buffers.get_or_init(|| self.flatten())
    }

    fn buffers(&self) -> Option<&CollectionBuffers> {
        self.write_buffers
            .get()
            .or_else(|| self.read.as_ref().map(|read| &read.buffers))
    }

    fn prepare_after_read(&mut self) -> EdmResult<()> {
        let collection_id = self.collection_id_or_untracked();
        let Some(read) = self.read.as_mut() else {
            return Ok(());
        };
        if read.rehydrated {
            return Ok(());
        }

        let buffers = &read.buffers;
        let entries: Vec<Entry<R>> = if buffers.is_subset {
            buffers
                .references
                .first()
                .map(|ids| ids.iter().copied().map(Entry::Unresolved).collect())
                .unwrap_or_default()
        } else {
            let data = buffers
                .data::<R::Data>()
                .ok_or_else(|| EdmError::LayoutMismatch {
                    type_name: buffers.type_name.clone(),
                    expected: std::any::type_name::<R::Data>(),
                })?;

            data.iter()
                .enumerate()
                .map(|(index, &payload)| -> EdmResult<Entry<R>> {
                    let mut obj = Obj::with_id(ObjectID::new(index as i32, collection_id), payload);
                    obj.members = R::Members::read_from(&buffers.vector_members, index)?;
                    Ok(Entry::Owned(Owner::new(obj)))
                })
                .collect::<EdmResult<Vec<_>>>()?
        };

        trace!(
            collection = %R::collection_type_name(),
            records = entries.len(),
            subset = buffers.is_subset,
            "rehydrated collection"
        );
        *self.entries.get_mut() = entries;
        read.rehydrated = true;
        Ok(())
    }

    fn set_references(&self, provider: &dyn CollectionProvider) -> EdmResult<bool> {
        if self.linked.load(Ordering::Acquire) {
            return Ok(true);
        }
        let Some(read) = self.read.as_ref().filter(|read| read.rehydrated) else {
            // Live collections already hold direct handles.
            return Ok(true);
        };

        let _linking = self.link_lock.lock();
        if self.linked.load(Ordering::Acquire) {
            return Ok(true);
        }
        let complete = if self.is_subset {
            self.link_subset(provider)?
        } else {
            self.link_relations(&read.buffers.references, provider)?
        };

        self.linked.store(true, Ordering::Release);
        Ok(complete)
    }

    fn set_degrade_policy(&mut self, policy: DegradePolicy) {
        self.policy = policy;
    }

    fn clear(&mut self) {
        self.entries.get_mut().clear();
        self.write_buffers.take();
        self.read = None;
        *self.linked.get_mut() = false;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<'a, R: Record> IntoIterator for &'a Collection<R> {
    type Item = RecordRef<R>;
    type IntoIter = std::vec::IntoIter<RecordRef<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, R: Record> IntoIterator for &'a mut Collection<R> {
    type Item = RecordMut<R>;
    type IntoIter = std::vec::IntoIter<RecordMut<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<R: Record> Default for Collection<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> fmt::Debug for Collection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("type", &R::collection_type_name())
            .field("id", &self.id)
            .field("subset", &self.is_subset)
            .field("len", &self.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
