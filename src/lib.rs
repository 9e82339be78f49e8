//! # `stratalloc` - tiered thread-local heap allocator
//!
//! A size-classed, tier-partitioned allocator providing the four
//! canonical primitives — [`allocate`], [`deallocate`], [`reallocate`],
//! [`callocate`] — plus a per-thread [`cleanup`].
//!
//! ## Tiers
//!
//! Requests route by size into one of four tiers, each with a backing
//! structure tuned for it:
//!
//! - **Tiny** (≤ 64 B): one bitmap pool page per 8-byte class.
//! - **Small** (65–256 B): bitmap pool fleets, fronted by a per-class
//!   LIFO thread cache.
//! - **Medium** (257 B – just under a page): same machinery with
//!   log-scaled classes, plus physical-neighbor coalescing and a
//!   return-pages-to-OS policy for mostly-free pools.
//! - **Large** (page-multiple): direct anonymous mappings, recycled
//!   through a bounded, timestamped, size-bucketed cache.
//!
//! Every block carries a one-cache-line header in front of the user
//! pointer: a packed size/class/flag word and a magic constant that
//! `deallocate` and `reallocate` validate before trusting the pointer,
//! so a foreign or double-freed pointer degrades to a silent no-op
//! rather than a wild free.
//!
//! ## Threading model
//!
//! All state is thread-local: each thread owns its pools and caches, and
//! nothing crosses threads except the OS mapping calls and the atomic
//! bitmap words inside pools (kept atomic so a future shared-pool design
//! stays correct). Blocks must be freed on the thread that allocated
//! them. Thread exit tears the heap down: caches are released, empty
//! pools unmapped, and pools still holding live blocks are deliberately
//! leaked rather than pulled out from under their pointers.
//!
//! ## Example
//!
//! ```rust
//! let p = stratalloc::allocate(200);
//! assert!(!p.is_null());
//! unsafe {
//!     core::ptr::write_bytes(p, 0x2A, 200);
//!     let q = stratalloc::reallocate(p, 1000);
//!     assert_eq!(*q, 0x2A);
//!     stratalloc::deallocate(q);
//! }
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

mod bitmap;
mod constants;
mod header;
mod heap;
mod large_cache;
mod manager;
mod pool;
mod size_class;
mod sys;
mod thread_cache;
mod tiny;

pub use constants::{ALIGNMENT, CACHE_LINE_SIZE, PAGE_SIZE};
pub use heap::{allocate, callocate, cleanup, deallocate, reallocate};

// Layout claims the whole design leans on.
const _: () = {
    use crate::bitmap::Bitmap;
    use crate::header::BlockHeader;
    use core::mem;

    // The header is exactly one cache line, so user pointers inherit
    // cache-line alignment from slot strides.
    assert!(mem::size_of::<BlockHeader>() == 64);
    assert!(mem::align_of::<BlockHeader>() == 64);

    // One bitmap covers a full pool page at cache-line granularity and
    // leaves the rest of the page for slots.
    assert!(mem::size_of::<Bitmap>() * 8 * CACHE_LINE_SIZE >= PAGE_SIZE);
    assert!(mem::size_of::<Bitmap>() < PAGE_SIZE);
};
