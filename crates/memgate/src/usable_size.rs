//! Recovering the true consumed size of a block.
//!
//! Tracked totals reflect what the host allocator actually holds, not what
//! callers requested, so every block's real footprint must be recoverable at
//! free and resize time. Platforms with a usable-size query answer directly;
//! everywhere else a leading header word carries the size.

use std::ptr::NonNull;

use libc::c_void;

/// How the facade learns what a block really cost, and how caller pointers
/// map back to host-allocator pointers.
///
/// `finish_block` turns a fresh host block into the caller's pointer and
/// `raw_block` inverts it; all pointer arithmetic stays inside the header
/// implementation.
pub(crate) trait SizeRecovery {
    /// Extra bytes requested from the host on top of the caller's size.
    const OVERHEAD: usize;

    /// True bytes held by the block `ptr` belongs to.
    ///
    /// # Safety
    /// `ptr` must have been produced by `finish_block` and not yet released.
    unsafe fn consumed_size(ptr: NonNull<u8>) -> usize;

    /// The pointer to hand back to the host allocator for this block.
    ///
    /// # Safety
    /// Same contract as `consumed_size`.
    unsafe fn raw_block(ptr: NonNull<u8>) -> *mut c_void;

    /// Finishes a fresh host block of `total` bytes, yielding the pointer the
    /// caller will see.
    ///
    /// # Safety
    /// `raw` must be a live, non-null host block of at least `total` bytes.
    unsafe fn finish_block(raw: *mut c_void, total: usize) -> NonNull<u8>;
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd"
))]
#[inline]
pub(crate) unsafe fn host_usable_size(ptr: *mut c_void) -> usize {
    libc::malloc_usable_size(ptr)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
#[inline]
pub(crate) unsafe fn host_usable_size(ptr: *mut c_void) -> usize {
    libc::malloc_size(ptr)
}

/// Size of the leading word in the header strategy.
pub(crate) const HEADER_SIZE: usize = std::mem::size_of::<usize>();

/// Stores the block's total size in a word directly before the caller
/// pointer. Used where the host cannot be queried, or when the
/// `size-header` feature forces it. Caller pointers are aligned to
/// `size_of::<usize>()` only.
#[allow(dead_code)]
pub(crate) struct HeaderPrefix;

impl SizeRecovery for HeaderPrefix {
    const OVERHEAD: usize = HEADER_SIZE;

    #[inline]
    unsafe fn consumed_size(ptr: NonNull<u8>) -> usize {
        ptr.as_ptr().cast::<usize>().sub(1).read()
    }

    #[inline]
    unsafe fn raw_block(ptr: NonNull<u8>) -> *mut c_void {
        ptr.as_ptr().cast::<usize>().sub(1).cast()
    }

    #[inline]
    unsafe fn finish_block(raw: *mut c_void, total: usize) -> NonNull<u8> {
        let header = raw.cast::<usize>();
        header.write(total);
        NonNull::new_unchecked(header.add(1).cast())
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(
        not(feature = "size-header"),
        any(
            target_os = "linux",
            target_os = "android",
            target_os = "freebsd",
            target_os = "macos",
            target_os = "ios"
        )
    ))] {
        /// Asks the host allocator how much a block really occupies. No
        /// storage overhead; the answer may exceed the request by whatever
        /// the allocator rounded up to.
        pub(crate) struct NativeQuery;

        impl SizeRecovery for NativeQuery {
            const OVERHEAD: usize = 0;

            #[inline]
            unsafe fn consumed_size(ptr: NonNull<u8>) -> usize {
                host_usable_size(ptr.as_ptr().cast())
            }

            #[inline]
            unsafe fn raw_block(ptr: NonNull<u8>) -> *mut c_void {
                ptr.as_ptr().cast()
            }

            #[inline]
            unsafe fn finish_block(raw: *mut c_void, _total: usize) -> NonNull<u8> {
                NonNull::new_unchecked(raw.cast())
            }
        }

        pub(crate) type ActiveRecovery = NativeQuery;
    } else {
        pub(crate) type ActiveRecovery = HeaderPrefix;
    }
}
