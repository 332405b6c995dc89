// The counting protocol is adapted from the rust standard library Arc.

use base::cmp::Ordering;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::{PhantomData, Unpin};
use base::mem;
use base::ops::Deref;
use base::ptr;
use base::sync::atomic;
use base::sync::atomic::Ordering::{Acquire, Relaxed, Release, SeqCst};

use base::prelude::v1::*;

/// A soft limit on the amount of handles that may share one allocation.
///
/// Going above this limit will abort your program (although not
/// necessarily) at _exactly_ `MAX_REFCOUNT + 1` handles.
const MAX_REFCOUNT: usize = (isize::MAX) as usize;

/// A nullable, thread-safe reference-counted pointer.
///
/// A `Shared` either owns nothing (it is *null*), or shares ownership of a
/// heap-allocated value with every other handle cloned from the same origin.
/// The shared count is updated atomically, so aliasing handles may live on
/// different threads; access to the pointee itself is not synchronized.
///
/// Because a `Shared` dereferences to its pointee, all of its own operations
/// are associated functions, called as e.g. `Shared::use_count(&s)`.
///
/// # Examples
///
/// ```
/// use shared_pointer::Shared;
///
/// let r = Shared::new(String::from("Hello, world!"));
/// let p = r.clone();
///
/// assert_eq!(*p, "Hello, world!");
/// assert_eq!(Shared::use_count(&r), 2);
/// ```
pub struct Shared<T> {
    ptr: *mut T,
    count: *mut atomic::AtomicUsize,
    phantom: PhantomData<T>,
}

unsafe impl<T: Sync + Send> Send for Shared<T> {}
unsafe impl<T: Sync + Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    /// Creates a handle that owns nothing.
    pub fn null() -> Shared<T> {
        Shared {
            ptr: ptr::null_mut(),
            count: ptr::null_mut(),
            phantom: PhantomData,
        }
    }

    /// Allocates `data` on the heap and returns the sole owning handle,
    /// with a count of 1.
    pub fn new(data: T) -> Shared<T> {
        unsafe { Self::from_raw(Box::into_raw(Box::new(data))) }
    }

    /// Takes ownership of a raw heap allocation, becoming its sole owner.
    ///
    /// A fresh count is allocated and initialized to 1. A null `ptr` yields
    /// a null handle instead; no count is allocated for it.
    ///
    /// # Safety
    ///
    /// `ptr` must either be null or have been obtained from
    /// [`Box::into_raw`], and nothing else may use or free it afterwards.
    /// In particular, feeding the same pointer to two independently
    /// constructed handles frees it twice.
    pub unsafe fn from_raw(ptr: *mut T) -> Shared<T> {
        if ptr.is_null() {
            return Self::null();
        }

        Shared {
            ptr,
            count: Box::into_raw(Box::new(atomic::AtomicUsize::new(1))),
            phantom: PhantomData,
        }
    }

    #[inline]
    fn counter(&self) -> Option<&atomic::AtomicUsize> {
        // While this handle is alive the count allocation is valid: it is
        // only freed together with the last handle referring to it.
        unsafe { self.count.as_ref() }
    }

    #[inline]
    fn value(&self) -> Option<&T> {
        // Same argument as for the count allocation.
        unsafe { self.ptr.as_ref() }
    }

    /// Returns true if the handle owns nothing.
    #[inline]
    pub fn is_null(this: &Self) -> bool {
        this.ptr.is_null()
    }

    /// Returns the raw pointee pointer without giving up ownership.
    ///
    /// The pointer is null for a null handle. A non-null pointer stays valid
    /// for as long as any handle still owns the allocation.
    #[inline]
    pub fn get(this: &Self) -> *mut T {
        this.ptr
    }

    /// Gets the number of handles currently sharing the allocation, or 0
    /// for a null handle.
    ///
    /// The value is a snapshot; other threads may have changed the count by
    /// the time it is inspected. Use it for diagnostics, not for
    /// correctness decisions.
    pub fn use_count(this: &Self) -> usize {
        match this.counter() {
            Some(count) => count.load(SeqCst),
            None => 0,
        }
    }

    /// Releases this handle's share of its allocation and leaves the handle
    /// null.
    ///
    /// Any remaining alias keeps the allocation alive; if this was the last
    /// share, the pointee and the count are freed.
    pub fn reset(this: &mut Self) {
        *this = Self::null();
    }

    /// Releases this handle's share of its allocation, then takes sole
    /// ownership of `ptr` with a fresh count of 1.
    ///
    /// # Safety
    ///
    /// Same contract as [`Shared::from_raw`].
    pub unsafe fn reset_raw(this: &mut Self, ptr: *mut T) {
        *this = Self::from_raw(ptr);
    }

    /// Moves the handle out of `this`, leaving a null handle behind.
    ///
    /// The count is not touched: the returned handle takes over the share
    /// that `this` held.
    pub fn take(this: &mut Self) -> Shared<T> {
        mem::replace(this, Self::null())
    }

    /// Exchanges the allocations of two handles in place.
    ///
    /// Neither count is modified and nothing is released.
    pub fn swap(this: &mut Self, other: &mut Self) {
        mem::swap(&mut this.ptr, &mut other.ptr);
        mem::swap(&mut this.count, &mut other.count);
    }
}

impl<T> Clone for Shared<T> {
    /// Makes a clone of the handle.
    ///
    /// A non-null handle gains one more alias of the same allocation,
    /// increasing the shared count. Cloning a null handle yields another
    /// null handle.
    #[inline]
    fn clone(&self) -> Shared<T> {
        let count = match self.counter() {
            Some(count) => count,
            None => return Self::null(),
        };

        // Using a relaxed ordering is alright here: a new alias can only be
        // created from a live one, which keeps the allocation from being
        // freed concurrently, and handing the clone to another thread
        // already requires its own synchronization.
        let old_size = count.fetch_add(1, Relaxed);

        // Guard against the count overflowing via `mem::forget`-ed handles;
        // a use-after-free is worse than aborting such a degenerate program.
        if old_size > MAX_REFCOUNT {
            panic!();
        }

        Shared {
            ptr: self.ptr,
            count: self.count,
            phantom: PhantomData,
        }
    }
}

impl<T> Drop for Shared<T> {
    /// Drops the handle.
    ///
    /// A null handle is a no-op. Otherwise the shared count is decremented,
    /// and whichever handle observes the drop to zero frees the pointee and
    /// the count, exactly once.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_pointer::Shared;
    ///
    /// struct Foo;
    ///
    /// impl Drop for Foo {
    ///     fn drop(&mut self) {
    ///         println!("dropped!");
    ///     }
    /// }
    ///
    /// let foo  = Shared::new(Foo);
    /// let foo2 = foo.clone();
    ///
    /// drop(foo);    // Doesn't print anything
    /// drop(foo2);   // Prints "dropped!"
    /// ```
    #[inline]
    fn drop(&mut self) {
        let count = match self.counter() {
            Some(count) => count,
            None => return,
        };

        // The decrement does not need to synchronize with other threads
        // unless it is the one that frees the allocation.
        if count.fetch_sub(1, Release) != 1 {
            return;
        }

        // Pair the `Release` decrements of the other aliases with an
        // `Acquire` before freeing, so that every access made through an
        // already-dead alias happens before the deallocation.
        atomic::fence(Acquire);

        unsafe {
            drop(Box::from_raw(self.ptr));
            drop(Box::from_raw(self.count));
        }
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    /// Dereferences to the pointee.
    ///
    /// # Panics
    ///
    /// Panics if the handle is null. Check with [`Shared::is_null`] first,
    /// or go through [`Shared::get`], when the handle may own nothing.
    #[inline]
    fn deref(&self) -> &T {
        match self.value() {
            Some(value) => value,
            None => panic!("dereferenced a null `Shared`"),
        }
    }
}

impl<T> Default for Shared<T> {
    /// Creates a null handle, equivalent to [`Shared::null`].
    fn default() -> Shared<T> {
        Shared::null()
    }
}

impl<T> From<T> for Shared<T> {
    fn from(t: T) -> Self {
        Shared::new(t)
    }
}

impl<T> From<Box<T>> for Shared<T> {
    /// Takes over an existing heap allocation without moving the value.
    fn from(boxed: Box<T>) -> Self {
        unsafe { Shared::from_raw(Box::into_raw(boxed)) }
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(value) => fmt::Debug::fmt(value, f),
            None => f.write_str("null"),
        }
    }
}

impl<T> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}

impl<T: PartialEq> PartialEq for Shared<T> {
    /// Equality for two `Shared`s.
    ///
    /// Two non-null handles are equal if their pointees are equal, even if
    /// they are stored in different allocations; two null handles are equal
    /// to each other. This implementation does not check for pointer
    /// equality.
    #[inline]
    fn eq(&self, other: &Shared<T>) -> bool {
        self.value().eq(&other.value())
    }
}

impl<T: Eq> Eq for Shared<T> {}

impl<T: PartialOrd> PartialOrd for Shared<T> {
    /// Partial comparison for two `Shared`s.
    ///
    /// The two are compared by calling `partial_cmp()` on their pointees;
    /// a null handle orders before every non-null one.
    fn partial_cmp(&self, other: &Shared<T>) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl<T: Ord> Ord for Shared<T> {
    /// Comparison for two `Shared`s.
    ///
    /// The two are compared by calling `cmp()` on their pointees; a null
    /// handle orders before every non-null one.
    fn cmp(&self, other: &Shared<T>) -> Ordering {
        self.value().cmp(&other.value())
    }
}

impl<T: Hash> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value().hash(state)
    }
}

impl<T> Unpin for Shared<T> {}
