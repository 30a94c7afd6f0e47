//! Record handles.
//!
//! A record is exposed through two views over the same storage:
//!
//! - [`RecordRef`]: read-only access
//! - [`RecordMut`]: read and write access (derefs to `RecordRef`)
//!
//! Copying a handle aliases the record; only
//! [`clone_record`](RecordRef::clone_record) makes a deep copy. Equality,
//! ordering and hashing use record identity, not payload values.
//!
//! All payload access returns owned values:
//! - `data()` returns a copy of the payload
//! - `set_data()` / `update()` write through a mutable handle

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
};

use crate::{MaybeShared, ObjectID, Obj, Record};

/// Read-only handle to a record.
pub struct RecordRef<R: Record> {
    obj: Option<MaybeShared<Obj<R>>>,
}

impl<R: Record> RecordRef<R> {
    /// A handle that refers to no record.
    #[must_use]
    pub const fn empty() -> Self {
        Self { obj: None }
    }

    pub(crate) const fn from_shared(obj: MaybeShared<Obj<R>>) -> Self {
        Self { obj: Some(obj) }
    }

    pub(crate) const fn shared(&self) -> Option<&MaybeShared<Obj<R>>> {
        self.obj.as_ref()
    }

    /// Whether the handle refers to a live record.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.obj.as_ref().is_some_and(MaybeShared::is_alive)
    }

    /// Persistent address, [`ObjectID::UNTRACKED`] for empty or stale handles.
    #[must_use]
    pub fn id(&self) -> ObjectID {
        self.with_obj(Obj::id).unwrap_or_default()
    }

    /// Copy of the payload, `None` for empty or stale handles.
    #[must_use]
    pub fn try_data(&self) -> Option<R::Data> {
        self.with_obj(|obj| obj.data)
    }

    /// Copy of the payload, the default payload for empty or stale handles.
    #[must_use]
    pub fn data(&self) -> R::Data {
        self.try_data().unwrap_or_default()
    }

    /// Copy of the vector members.
    #[must_use]
    pub fn members(&self) -> R::Members {
        self.with_obj(|obj| obj.members.clone()).unwrap_or_default()
    }

    /// Copy of the relation slots.
    #[must_use]
    pub fn relations(&self) -> R::Relations {
        self.with_obj(|obj| obj.relations.clone())
            .unwrap_or_default()
    }

    /// Untracked deep copy of the record.
    ///
    /// Relation slots keep pointing at the same targets if `with_relations`,
    /// otherwise they start empty. Cloning an empty handle yields a fresh
    /// default record.
    #[must_use]
    pub fn clone_record(&self, with_relations: bool) -> RecordMut<R> {
        let obj = self
            .with_obj(|obj| obj.duplicate(with_relations))
            .unwrap_or_default();
        RecordMut::from_obj(obj)
    }

    /// Disconnect this handle from its record.
    pub fn unlink(&mut self) {
        self.obj = None;
    }

    pub(crate) fn with_obj<T>(&self, f: impl FnOnce(&Obj<R>) -> T) -> Option<T> {
        let obj = self.obj.as_ref()?.read()?;
        Some(f(&obj))
    }

    fn addr(&self) -> usize {
        self.obj.as_ref().map_or(0, MaybeShared::addr)
    }
}

impl<R: Record> Clone for RecordRef<R> {
    fn clone(&self) -> Self {
        Self {
            obj: self.obj.clone(),
        }
    }
}

impl<R: Record> Default for RecordRef<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: Record> PartialEq for RecordRef<R> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<R: Record> Eq for RecordRef<R> {}

impl<R: Record> PartialOrd for RecordRef<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: Record> Ord for RecordRef<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<R: Record> Hash for RecordRef<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<R: Record> fmt::Debug for RecordRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.obj {
            None => write!(f, "{}(empty)", R::type_name()),
            Some(_) => write!(f, "{}({:?})", R::type_name(), self.id()),
        }
    }
}

/// Mutable handle to a record.
///
/// A default-constructed `RecordMut` owns a fresh untracked record until it
/// is pushed into a collection.
pub struct RecordMut<R: Record> {
    inner: RecordRef<R>,
}

impl<R: Record> RecordMut<R> {
    /// A fresh untracked record with a default payload.
    #[must_use]
    pub fn new() -> Self {
        Self::from_obj(Obj::default())
    }

    /// A fresh untracked record with the given payload.
    #[must_use]
    pub fn with_data(data: R::Data) -> Self {
        Self::from_obj(Obj::new(data))
    }

    pub(crate) fn from_obj(obj: Obj<R>) -> Self {
        Self::from_shared(MaybeShared::new_owned(obj))
    }

    pub(crate) const fn from_shared(obj: MaybeShared<Obj<R>>) -> Self {
        Self {
            inner: RecordRef::from_shared(obj),
        }
    }

    /// Read-only view of the same record.
    #[must_use]
    pub fn as_immutable(&self) -> RecordRef<R> {
        self.inner.clone()
    }

    /// Replace the payload. Returns `false` for empty or stale handles.
    pub fn set_data(&self, data: R::Data) -> bool {
        self.with_obj_mut(|obj| obj.data = data).is_some()
    }

    /// Modify the payload in place. Returns `false` for empty or stale handles.
    pub fn update(&self, f: impl FnOnce(&mut R::Data)) -> bool {
        self.with_obj_mut(|obj| f(&mut obj.data)).is_some()
    }

    /// Modify the vector members in place. Returns `false` for empty or stale handles.
    pub fn update_members(&self, f: impl FnOnce(&mut R::Members)) -> bool {
        self.with_obj_mut(|obj| f(&mut obj.members)).is_some()
    }

    /// Modify the relation slots in place. Returns `false` for empty or stale handles.
    pub fn update_relations(&self, f: impl FnOnce(&mut R::Relations)) -> bool {
        self.with_obj_mut(|obj| f(&mut obj.relations)).is_some()
    }

    /// Disconnect this handle from its record.
    pub fn unlink(&mut self) {
        self.inner.unlink();
    }

    pub(crate) fn with_obj_mut<T>(&self, f: impl FnOnce(&mut Obj<R>) -> T) -> Option<T> {
        let mut obj = self.inner.shared()?.write()?;
        Some(f(&mut obj))
    }
}

impl<R: Record> Deref for RecordMut<R> {
    type Target = RecordRef<R>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<R: Record> AsRef<RecordRef<R>> for RecordMut<R> {
    fn as_ref(&self) -> &RecordRef<R> {
        &self.inner
    }
}

impl<R: Record> AsRef<RecordRef<R>> for RecordRef<R> {
    fn as_ref(&self) -> &RecordRef<R> {
        self
    }
}

impl<R: Record> From<RecordMut<R>> for RecordRef<R> {
    fn from(record: RecordMut<R>) -> Self {
        record.inner
    }
}

impl<R: Record> From<&RecordMut<R>> for RecordRef<R> {
    fn from(record: &RecordMut<R>) -> Self {
        record.inner.clone()
    }
}

impl<R: Record> Clone for RecordMut<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Record> Default for RecordMut<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> PartialEq for RecordMut<R> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<R: Record> Eq for RecordMut<R> {}

impl<R: Record> PartialEq<RecordRef<R>> for RecordMut<R> {
    fn eq(&self, other: &RecordRef<R>) -> bool {
        self.inner == *other
    }
}

impl<R: Record> PartialEq<RecordMut<R>> for RecordRef<R> {
    fn eq(&self, other: &RecordMut<R>) -> bool {
        *self == other.inner
    }
}

impl<R: Record> Hash for RecordMut<R> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<R: Record> fmt::Debug for RecordMut<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mutable{:?}", self.inner)
    }
}
