//! Per-thread coordinator and the public allocation operations.
//!
//! Each thread lazily builds one [`ThreadHeap`] — tiny pools, pool
//! manager, thread cache, large cache — on first use, reached through a
//! `thread_local!` cell. `try_with` lets calls made during thread
//! teardown degrade to a null return or a no-op instead of panicking,
//! and dropping the heap at thread exit releases everything that can be
//! released safely: caches are cleared, empty pools unmapped, pools with
//! live blocks deliberately leaked.

use core::cell::RefCell;
use core::ptr::{self, NonNull};

use crate::constants::{
    align_up, ALIGNMENT, MAX_BLOCK_SIZE, PAGE_SIZE, SIZE_CLASSES, TINY_CLASSES,
    TINY_LARGE_THRESHOLD,
};
use crate::header::{BlockHeader, HEADER_SIZE, MAPPED_CLASS};
use crate::large_cache::LargeBlockCache;
use crate::manager::PoolManager;
use crate::pool::Pool;
use crate::size_class::{class_capacity, class_for_size, max_medium_size, CLASSES};
use crate::sys;
use crate::thread_cache::ThreadCache;
use crate::tiny::TinyPool;

struct ThreadHeap {
    tiny_pools: [Option<NonNull<TinyPool>>; TINY_CLASSES],
    cache: ThreadCache,
    pools: PoolManager,
    large: LargeBlockCache,
}

thread_local! {
    static HEAP: RefCell<ThreadHeap> = const { RefCell::new(ThreadHeap::new()) };
}

impl ThreadHeap {
    const fn new() -> Self {
        Self {
            tiny_pools: [None; TINY_CLASSES],
            cache: ThreadCache::new(),
            pools: PoolManager::new(),
            large: LargeBlockCache::new(),
        }
    }

    fn allocate(&mut self, size: usize) -> *mut u8 {
        if size == 0 || size > MAX_BLOCK_SIZE {
            return ptr::null_mut();
        }
        if size <= TINY_LARGE_THRESHOLD {
            return self.allocate_tiny(size);
        }
        // Everything past the medium tier's physical capacity maps pages;
        // this covers all page-multiple requests as well.
        if size > max_medium_size() {
            return self.allocate_large(size);
        }
        self.allocate_classed(size)
    }

    fn allocate_tiny(&mut self, size: usize) -> *mut u8 {
        let class = class_for_size(size);
        let slot = usize::from(class);

        let pool = match self.tiny_pools[slot] {
            Some(pool) => pool,
            None => {
                let Some(pool) = TinyPool::create(class) else {
                    return ptr::null_mut();
                };
                self.tiny_pools[slot] = Some(pool);
                pool
            }
        };

        let Some(block) = unsafe { pool.as_ref() }.allocate_tiny(class) else {
            return ptr::null_mut();
        };
        unsafe {
            let header = block.cast::<BlockHeader>();
            (*header).init(size, class, false, ptr::null_mut(), ptr::null_mut());
            block.add(HEADER_SIZE)
        }
    }

    /// Small and medium tiers: thread-cache probe, then the pool fleet.
    fn allocate_classed(&mut self, size: usize) -> *mut u8 {
        let class = class_for_size(size);

        if let Some(cached) = self.cache.get(class) {
            let header = BlockHeader::from_user_ptr(cached);
            if unsafe { (*header).is_valid() } {
                // Re-encode so the stored size tracks this request; a
                // stale smaller size would truncate a later move-copy in
                // reallocate.
                unsafe { (*header).encode(size, class, false) };
                return cached;
            }
            // A corrupted cached entry is dropped on the floor; the pool
            // fleet below still owns a consistent view of the slot space.
        }

        let Some(block) = self.pools.allocate(class) else {
            return ptr::null_mut();
        };
        unsafe {
            let header = block.cast::<BlockHeader>();
            if (*header).is_valid() {
                // Reused slot: the physical links survive, only the
                // payload word changes.
                (*header).encode(size, class, false);
            } else {
                (*header).init(size, class, false, ptr::null_mut(), ptr::null_mut());
                (*Pool::from_header(header)).link_block(block, &CLASSES[usize::from(class)]);
            }
            block.add(HEADER_SIZE)
        }
    }

    fn allocate_large(&mut self, size: usize) -> *mut u8 {
        if let Some(cached) = self.large.get_cached_block(size) {
            let header = BlockHeader::from_user_ptr(cached);
            unsafe { (*header).set_free(false) };
            return cached;
        }

        let total = align_up(size + HEADER_SIZE, PAGE_SIZE);
        let Some(base) = (unsafe { sys::map(total) }) else {
            return ptr::null_mut();
        };
        unsafe {
            let header = base.cast::<BlockHeader>();
            (*header).init(size, MAPPED_CLASS, false, ptr::null_mut(), ptr::null_mut());
            (*header).set_memory_mapped(true);
            base.add(HEADER_SIZE)
        }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) {
        let addr = ptr as usize;
        // Arithmetic guards run before the header is ever read: reject
        // unaligned pointers, anything in the null page, and pointers
        // sitting exactly on a page boundary (the header prefix makes
        // that impossible for a legitimate allocation).
        if addr & (ALIGNMENT - 1) != 0 {
            return;
        }
        if addr & !(PAGE_SIZE - 1) == 0 {
            return;
        }
        if addr & (PAGE_SIZE - 1) == 0 {
            return;
        }
        if !BlockHeader::is_aligned(ptr) {
            return;
        }

        let header = BlockHeader::from_user_ptr(ptr);
        if !(*header).is_valid() || (*header).is_free() {
            return;
        }

        let class = (*header).size_class();
        if usize::from(class) < TINY_CLASSES {
            if let Some(pool) = self.tiny_pools[usize::from(class)] {
                let pool_ref = pool.as_ref();
                if pool_ref.contains(addr) {
                    (*header).set_free(true);
                    pool_ref.deallocate_tiny(ptr.sub(HEADER_SIZE), class);
                }
            }
            return;
        }

        if class == MAPPED_CLASS {
            let size = (*header).size();
            if self.large.cache_block(ptr, size) {
                (*header).set_free(true);
                return;
            }
            if (*header).is_memory_mapped() {
                sys::unmap(ptr.sub(HEADER_SIZE), align_up(size + HEADER_SIZE, PAGE_SIZE));
            }
            return;
        }

        if self.cache.put(ptr, class) {
            (*header).set_free(true);
            return;
        }

        (*header).set_free(true);
        if (*header).try_coalesce() {
            let pool = Pool::from_header(header);
            (*pool).return_memory(&CLASSES[usize::from(class)]);
        }
        self.pools.deallocate(ptr.sub(HEADER_SIZE), class);
    }

    unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate(new_size);
        }
        if new_size == 0 {
            self.deallocate(ptr);
            return ptr::null_mut();
        }
        if new_size > MAX_BLOCK_SIZE || !BlockHeader::is_aligned(ptr) {
            return ptr::null_mut();
        }

        let header = BlockHeader::from_user_ptr(ptr);
        if !(*header).is_valid() {
            return ptr::null_mut();
        }

        let old_size = (*header).size();
        let old_class = (*header).size_class();

        // In-place fast path: the slot's capacity already covers the
        // request. Shrinks stay in place as well.
        if old_class == MAPPED_CLASS {
            // The stored size is the mapping's length; it must not
            // shrink or the final unmap would go short.
            if new_size <= old_size {
                return ptr;
            }
        } else if new_size <= class_capacity(old_class) {
            // Record a grown size so a later move copies all of it.
            if new_size > old_size {
                (*header).encode(new_size, old_class, false);
            }
            return ptr;
        }

        #[cfg(target_os = "linux")]
        if (*header).is_memory_mapped() {
            let old_total = align_up(old_size + HEADER_SIZE, PAGE_SIZE);
            let new_total = align_up(new_size + HEADER_SIZE, PAGE_SIZE);
            if let Some(base) = sys::remap(ptr.sub(HEADER_SIZE), old_total, new_total) {
                let moved = base.cast::<BlockHeader>();
                (*moved).encode(new_size, MAPPED_CLASS, false);
                (*moved).set_memory_mapped(true);
                return base.add(HEADER_SIZE);
            }
        }

        let new_ptr = self.allocate(new_size);
        if new_ptr.is_null() {
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(new_size));
        self.deallocate(ptr);
        new_ptr
    }

    fn callocate(&mut self, count: usize, size: usize) -> *mut u8 {
        if count == 0 || size == 0 {
            return ptr::null_mut();
        }
        let Some(total) = count.checked_mul(size) else {
            return ptr::null_mut();
        };
        let ptr = self.allocate(total);
        if !ptr.is_null() {
            unsafe { zero_block(ptr, total) };
        }
        ptr
    }

    /// Releases everything the calling thread can release without
    /// invalidating live pointers: the large cache is unmapped, the
    /// thread cache flushed back through the pool fleet (destroying
    /// pools as they empty), and empty tiny pools unmapped. Tiny pools
    /// still holding live blocks are forgotten, not freed.
    fn release_all(&mut self) {
        self.large.clear();

        for class in TINY_CLASSES as u8..SIZE_CLASSES as u8 {
            while let Some(cached) = self.cache.get(class) {
                unsafe {
                    let header = BlockHeader::from_user_ptr(cached);
                    (*header).set_free(true);
                    self.pools.deallocate(cached.sub(HEADER_SIZE), class);
                }
            }
        }
        self.cache.clear();

        for slot in 0..TINY_CLASSES {
            if let Some(pool) = self.tiny_pools[slot].take() {
                if unsafe { pool.as_ref() }.is_completely_free(slot as u8) {
                    unsafe { TinyPool::destroy(pool) };
                }
            }
        }
    }
}

impl Drop for ThreadHeap {
    fn drop(&mut self) {
        self.release_all();
        // The pool fleet's own Drop runs next: empty pools are unmapped,
        // pools with live blocks leak.
    }
}

/// Zeroes a freshly allocated block. Mapped regions on Linux drop their
/// page-aligned interior instead of storing zeros; a private anonymous
/// page reads back as zeros after `MADV_DONTNEED`.
unsafe fn zero_block(ptr: *mut u8, total: usize) {
    #[cfg(target_os = "linux")]
    if total > max_medium_size() {
        let start = ptr as usize;
        let page_start = align_up(start, PAGE_SIZE);
        let page_end = (start + total) & !(PAGE_SIZE - 1);
        if page_end > page_start {
            ptr::write_bytes(ptr, 0, page_start - start);
            sys::advise_dontneed(page_start as *mut u8, page_end - page_start);
            ptr::write_bytes(page_end as *mut u8, 0, start + total - page_end);
            return;
        }
    }
    ptr::write_bytes(ptr, 0, total);
}

/// Allocates `size` bytes.
///
/// The returned pointer is cache-line-aligned and null when `size` is
/// zero, exceeds 2^47, or backing memory cannot be obtained.
pub fn allocate(size: usize) -> *mut u8 {
    HEAP.try_with(|heap| heap.borrow_mut().allocate(size))
        .unwrap_or(ptr::null_mut())
}

/// Frees a block returned by [`allocate`], [`reallocate`] or
/// [`callocate`].
///
/// Null, misaligned, foreign and double-freed pointers are silently
/// ignored.
///
/// # Safety
///
/// `ptr` must be null or a pointer previously returned by this
/// allocator on the calling thread and not freed since. The validation
/// is defense in depth, not a guarantee: a forged pointer that passes it
/// is undefined behavior.
pub unsafe fn deallocate(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    let _ = HEAP.try_with(|heap| heap.borrow_mut().deallocate(ptr));
}

/// Resizes a block, moving it when it cannot grow in place.
///
/// A null `ptr` behaves like [`allocate`]; a zero `new_size` behaves
/// like [`deallocate`] and returns null. The old block is freed exactly
/// when a non-null pointer is returned (and it differs from `ptr`).
///
/// # Safety
///
/// Same contract as [`deallocate`] for non-null `ptr`.
pub unsafe fn reallocate(ptr: *mut u8, new_size: usize) -> *mut u8 {
    HEAP.try_with(|heap| heap.borrow_mut().reallocate(ptr, new_size))
        .unwrap_or(ptr::null_mut())
}

/// Allocates a zero-filled block of `count * size` bytes.
///
/// Returns null when the multiplication overflows or allocation fails.
pub fn callocate(count: usize, size: usize) -> *mut u8 {
    HEAP.try_with(|heap| heap.borrow_mut().callocate(count, size))
        .unwrap_or(ptr::null_mut())
}

/// Releases the calling thread's caches and empty pools. The thread may
/// keep allocating afterwards; pools are recreated on demand.
pub fn cleanup() {
    let _ = HEAP.try_with(|heap| heap.borrow_mut().release_all());
}
