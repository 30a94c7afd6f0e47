//! Shared ownership of heap records.
//!
//! Many lightweight handles alias one record. Before a record enters a
//! collection its handles own it jointly: the record is freed when the last
//! handle goes away. Pushing the record into a collection calls
//! [`MaybeShared::release`], which hands exclusive ownership to a single
//! [`Owner`]. From then on the handles are plain aliases; they never free the
//! record, and once the owner drops it they observe a freed slot instead of
//! dangling.
//!
//! ```text
//!   MaybeShared ──┐
//!   MaybeShared ──┼──► ControlBlock { count, owned, value }
//!   Owner ────────┘        (count: live MaybeShared aliases)
//! ```

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Control block shared by all aliases of one record.
struct ControlBlock<T> {
    /// Number of live `MaybeShared` aliases.
    count: AtomicUsize,
    /// Whether the aliases still own the value (no `Owner` exists).
    owned: AtomicBool,
    /// The value; `None` once freed.
    value: RwLock<Option<T>>,
}

impl<T> ControlBlock<T> {
    fn free(&self) {
        let freed = self.value.write().take();
        drop(freed);
    }

    fn read(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        // Recursive reads: flattening a record that relates to itself re-enters
        // the same lock.
        RwLockReadGuard::try_map(self.value.read_recursive(), Option::as_ref).ok()
    }

    fn write(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.value.write(), Option::as_mut).ok()
    }
}

/// Reference-counted alias to a record with an optional exclusive owner.
///
/// Cloning aliases the record and increments the count. Dropping the last
/// alias frees the record only if ownership was never released.
pub struct MaybeShared<T> {
    block: Arc<ControlBlock<T>>,
}

impl<T> MaybeShared<T> {
    /// Wrap a fresh value. The new alias owns it (count 1, owned).
    #[must_use]
    pub fn new_owned(value: T) -> Self {
        Self {
            block: Arc::new(ControlBlock {
                count: AtomicUsize::new(1),
                owned: AtomicBool::new(true),
                value: RwLock::new(Some(value)),
            }),
        }
    }

    /// Hand ownership to a single exclusive owner.
    ///
    /// Returns `None` if ownership was already released. Afterwards no alias
    /// frees the value on drop; it lives until the returned `Owner` drops.
    #[must_use]
    pub fn release(&self) -> Option<Owner<T>> {
        self.block
            .owned
            .swap(false, Ordering::AcqRel)
            .then(|| Owner {
                block: Arc::clone(&self.block),
            })
    }

    /// Whether the aliases still own the value.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.block.owned.load(Ordering::Acquire)
    }

    /// Number of live aliases (owners are not counted).
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.block.count.load(Ordering::Acquire)
    }

    /// Whether the value has not been freed.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.block.value.read_recursive().is_some()
    }

    /// Read access, `None` if the value has been freed.
    #[must_use]
    pub fn read(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        self.block.read()
    }

    /// Write access, `None` if the value has been freed.
    #[must_use]
    pub fn write(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        self.block.write()
    }

    /// Whether both aliases refer to the same record.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.block, &other.block)
    }

    /// Address of the control block, used for identity ordering and hashing.
    #[must_use]
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.block).cast::<()>() as usize
    }
}

impl<T> Clone for MaybeShared<T> {
    fn clone(&self) -> Self {
        self.block.count.fetch_add(1, Ordering::Relaxed);
        Self {
            block: Arc::clone(&self.block),
        }
    }
}

impl<T> Drop for MaybeShared<T> {
    fn drop(&mut self) {
        if self.block.count.fetch_sub(1, Ordering::AcqRel) == 1
            && self.block.owned.load(Ordering::Acquire)
        {
            self.block.free();
        }
    }
}

impl<T> fmt::Debug for MaybeShared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaybeShared")
            .field("count", &self.use_count())
            .field("owned", &self.is_owned())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Exclusive owner of a record.
///
/// Produced by [`MaybeShared::release`] or created directly by a collection.
/// Dropping the owner frees the record; outstanding aliases become stale.
pub struct Owner<T> {
    block: Arc<ControlBlock<T>>,
}

impl<T> Owner<T> {
    /// Create an owner for a value that has no aliases yet.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            block: Arc::new(ControlBlock {
                count: AtomicUsize::new(0),
                owned: AtomicBool::new(false),
                value: RwLock::new(Some(value)),
            }),
        }
    }

    /// Create a new alias to the owned value.
    #[must_use]
    pub fn share(&self) -> MaybeShared<T> {
        self.block.count.fetch_add(1, Ordering::Relaxed);
        MaybeShared {
            block: Arc::clone(&self.block),
        }
    }

    /// Read access to the owned value.
    #[must_use]
    pub fn read(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        self.block.read()
    }

    /// Write access to the owned value.
    #[must_use]
    pub fn write(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        self.block.write()
    }

    /// Number of live aliases.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.block.count.load(Ordering::Acquire)
    }
}

impl<T> Drop for Owner<T> {
    fn drop(&mut self) {
        self.block.free();
    }
}

impl<T> fmt::Debug for Owner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("aliases", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct DropCounter<'a>(&'a AtomicUsize, u32);

    impl Drop for DropCounter<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_last_alias_frees_owned_value() {
        let drops = AtomicUsize::new(0);
        let a = MaybeShared::new_owned(DropCounter(&drops, 1));
        let b = a.clone();
        let c = b.clone();
        assert_eq!(a.use_count(), 3);

        drop(a);
        drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(c.is_alive());

        drop(c);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mutation_visible_through_remaining_alias() {
        let handles: Vec<_> = {
            let first = MaybeShared::new_owned(0_u32);
            (0..4).map(|_| first.clone()).collect()
        };
        let mut handles = handles.into_iter();
        let last = handles.next_back().unwrap();
        for handle in handles {
            *handle.write().unwrap() += 1;
        }
        assert_eq!(*last.read().unwrap(), 3);
        assert_eq!(last.use_count(), 1);
    }

    #[test]
    fn test_release_transfers_ownership_once() {
        let drops = AtomicUsize::new(0);
        let a = MaybeShared::new_owned(DropCounter(&drops, 7));
        let b = a.clone();

        let owner = a.release().expect("first release succeeds");
        assert!(b.release().is_none());
        assert!(!a.is_owned());

        drop(a);
        drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(owner.read().unwrap().1, 7);

        drop(owner);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_alias_observes_freed_value() {
        let owner = Owner::new(5_u32);
        let alias = owner.share();
        assert_eq!(owner.use_count(), 1);
        assert!(alias.read().is_some());

        drop(owner);
        assert!(!alias.is_alive());
        assert!(alias.read().is_none());
        assert!(alias.write().is_none());
    }

    #[test]
    fn test_identity() {
        let a = MaybeShared::new_owned(1_u8);
        let b = a.clone();
        let c = MaybeShared::new_owned(1_u8);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.addr(), b.addr());
    }

    #[test]
    fn test_aliases_cross_threads() {
        let a = MaybeShared::new_owned(0_u64);
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let alias = a.clone();
                std::thread::spawn(move || {
                    *alias.write().unwrap() += 1;
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(*a.read().unwrap(), 4);
        assert_eq!(a.use_count(), 1);
    }
}
