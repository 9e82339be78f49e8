//! Small/medium pool: a page of slots for one size class, plus the
//! physical header chain that coalescing and page return operate on.
//!
//! The pool hands out slot base addresses; the coordinator writes the
//! header there and asks the pool to stitch it into the chain of
//! physically adjacent headers. The chain is navigation state only; the
//! pool remains the sole owner of every header inside its page.

use core::ptr::{self, NonNull};

use crate::bitmap::Bitmap;
use crate::constants::{alignment_for_size, align_up, MIN_RETURN_SIZE, PAGE_SIZE};
use crate::header::{BlockHeader, HEADER_SIZE};
use crate::size_class::{SizeClass, USABLE_POOL_BYTES};
use crate::sys;

/// Page-sized pool for one small or medium class.
#[repr(C)]
pub struct Pool {
    bitmap: Bitmap,
    memory: [u8; USABLE_POOL_BYTES],
}

const _: () = assert!(core::mem::size_of::<Pool>() == PAGE_SIZE);

impl Pool {
    /// Maps and initializes a fresh pool for the given class geometry.
    pub fn create(sc: &SizeClass) -> Option<NonNull<Pool>> {
        unsafe {
            let page = sys::map(PAGE_SIZE)?;
            let pool = page.cast::<Pool>();
            Bitmap::init(ptr::addr_of_mut!((*pool).bitmap), sc.blocks);
            Some(NonNull::new_unchecked(pool))
        }
    }

    /// Unmaps a pool created by [`Pool::create`].
    ///
    /// # Safety
    ///
    /// No block inside the pool may be referenced afterwards.
    pub unsafe fn destroy(pool: NonNull<Pool>) {
        sys::unmap(pool.as_ptr().cast::<u8>(), PAGE_SIZE);
    }

    /// Recovers the owning pool from a header address inside its page.
    #[inline]
    pub fn from_header(header: *mut BlockHeader) -> *mut Pool {
        ((header as usize) & !(PAGE_SIZE - 1)) as *mut Pool
    }

    #[inline]
    fn memory_base(&self) -> usize {
        ptr::addr_of!(self.memory) as usize
    }

    /// True when `addr` lies inside this pool's page.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let start = self as *const Pool as usize;
        addr >= start && addr < start + PAGE_SIZE
    }

    /// Claims a slot and returns its base address, or `None` when no
    /// eligible slot is free.
    pub fn allocate(&self, sc: &SizeClass) -> Option<*mut u8> {
        let index = self
            .bitmap
            .find_free_block(sc.slot_size, alignment_for_size(sc.size))?;

        let offset = index * sc.slot_size;
        if offset + sc.slot_size > USABLE_POOL_BYTES {
            return None;
        }
        Some((self.memory_base() + offset) as *mut u8)
    }

    /// Returns a slot (by its base address) to the pool.
    pub fn deallocate(&self, block: *mut u8, sc: &SizeClass) {
        let offset = (block as usize).wrapping_sub(self.memory_base());
        let index = offset / sc.slot_size;
        if index < sc.blocks {
            self.bitmap.mark_free(index);
        }
    }

    /// True when no slot is live.
    pub fn is_completely_free(&self, sc: &SizeClass) -> bool {
        self.bitmap.is_completely_free(sc.blocks)
    }

    /// Stitches the freshly written header at `block` into the chain of
    /// physically adjacent headers, keyed by slot address order.
    ///
    /// # Safety
    ///
    /// `block` must be a slot base returned by [`Pool::allocate`] with a
    /// valid header written at it.
    pub unsafe fn link_block(&self, block: *mut u8, sc: &SizeClass) {
        let base = self.memory_base();
        let index = (block as usize - base) / sc.slot_size;
        let header = block.cast::<BlockHeader>();

        let mut prev: *mut BlockHeader = ptr::null_mut();
        let mut j = index;
        while j > 0 {
            j -= 1;
            let candidate = (base + j * sc.slot_size) as *mut BlockHeader;
            if (*candidate).is_valid() {
                prev = candidate;
                break;
            }
        }

        let mut next: *mut BlockHeader = ptr::null_mut();
        let mut j = index + 1;
        while j < sc.blocks {
            let candidate = (base + j * sc.slot_size) as *mut BlockHeader;
            if (*candidate).is_valid() {
                next = candidate;
                break;
            }
            j += 1;
        }

        (*header).set_prev_physical(prev);
        (*header).set_next_physical(next);
        if !prev.is_null() {
            (*prev).set_next_physical(header);
        }
        if !next.is_null() {
            (*next).set_prev_physical(header);
        }
    }

    unsafe fn first_header(&self, sc: &SizeClass) -> *mut BlockHeader {
        let base = self.memory_base();
        for index in 0..sc.blocks {
            let candidate = (base + index * sc.slot_size) as *mut BlockHeader;
            if (*candidate).is_valid() {
                return candidate;
            }
        }
        ptr::null_mut()
    }

    /// Sums the free bytes recorded in the physical chain and, when the
    /// pool is mostly idle (at least [`MIN_RETURN_SIZE`] free and 80% of
    /// the usable region), advises the OS to reclaim the interior pages
    /// of every coalesced free block.
    ///
    /// # Safety
    ///
    /// The physical chain must be intact.
    pub unsafe fn return_memory(&self, sc: &SizeClass) {
        let mut free_space = 0usize;
        let mut current = self.first_header(sc);
        let mut hops = 0;
        while !current.is_null() && hops <= sc.blocks {
            if (*current).is_free() {
                free_space += (*current).size();
            }
            current = (*current).next_physical();
            hops += 1;
        }

        if free_space < MIN_RETURN_SIZE || free_space * 5 < USABLE_POOL_BYTES * 4 {
            return;
        }

        let mut current = self.first_header(sc);
        let mut hops = 0;
        while !current.is_null() && hops <= sc.blocks {
            if (*current).is_free() && (*current).is_coalesced() {
                let block_start = current as usize + HEADER_SIZE;
                let page_start = align_up(block_start, PAGE_SIZE);
                let page_end = (block_start + (*current).size()) & !(PAGE_SIZE - 1);
                if page_end > page_start {
                    sys::advise_dontneed(page_start as *mut u8, page_end - page_start);
                }
            }
            current = (*current).next_physical();
            hops += 1;
        }
    }
}
