//! Allocator tunables and the two alignment helpers everything else is
//! derived from.

/// Cache line size in bytes. 32 is also a supported value.
pub const CACHE_LINE_SIZE: usize = 64;

/// Host page size. The pool layout assumes 4 KiB pages.
pub const PAGE_SIZE: usize = 4096;

/// Alignment of every user pointer handed out by the allocator.
pub const ALIGNMENT: usize = CACHE_LINE_SIZE;

/// Requests at or below this size take the tiny path.
pub const TINY_LARGE_THRESHOLD: usize = 64;

/// Requests at or below this size (and above tiny) take the small path.
pub const SMALL_LARGE_THRESHOLD: usize = 256;

/// Largest representable block size (the header stores 48 size bits).
pub const MAX_BLOCK_SIZE: usize = 1 << 47;

/// Number of size classes.
pub const SIZE_CLASSES: usize = 32;

/// Number of tiny classes (8-byte granularity up to 64 bytes).
pub const TINY_CLASSES: usize = 8;

/// Maximum pools per size class in the pool manager fleet.
pub const MAX_POOLS: usize = 8;

/// Thread-cache depth per size class.
pub const CACHE_SIZE: usize = 32;

/// Number of large-cache size buckets.
pub const NUM_BUCKETS: usize = 8;

/// Entries per large-cache bucket.
pub const BUCKET_SLOTS: usize = 4;

/// Smallest block the large cache will hold.
pub const MIN_CACHE_BLOCK: usize = 4 * 1024;

/// Largest block the large cache will hold.
pub const MAX_CACHE_BLOCK: usize = 16 * 1024 * 1024;

/// Upper bound on total bytes retained by the large cache.
pub const MAX_CACHE_SIZE: usize = 64 * 1024 * 1024;

/// Minimum free bytes in a pool before pages are returned to the OS.
pub const MIN_RETURN_SIZE: usize = 64 * 1024;

/// Rounds `value` up to a multiple of `align` (power of two).
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

/// Natural alignment for a block of `size` bytes: cache line up to one
/// line, page from one page up, the next power of two in between.
#[inline]
pub const fn alignment_for_size(size: usize) -> usize {
    if size <= CACHE_LINE_SIZE {
        CACHE_LINE_SIZE
    } else if size >= PAGE_SIZE {
        PAGE_SIZE
    } else {
        size.next_power_of_two()
    }
}

const _: () = {
    assert!(CACHE_LINE_SIZE == 32 || CACHE_LINE_SIZE == 64);
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(ALIGNMENT.is_power_of_two());
    assert!(TINY_CLASSES * 8 == TINY_LARGE_THRESHOLD);
    assert!(SIZE_CLASSES * 8 == SMALL_LARGE_THRESHOLD);
    assert!(MIN_CACHE_BLOCK.is_power_of_two() && MAX_CACHE_BLOCK.is_power_of_two());
    assert!(MAX_CACHE_BLOCK <= MAX_CACHE_SIZE);
};
