//! Tiny-tier pool: one page per class for payloads up to 64 bytes.

use core::ptr::NonNull;

use crate::bitmap::Bitmap;
use crate::constants::{alignment_for_size, PAGE_SIZE};
use crate::size_class::{tiny_block_size, tiny_blocks, tiny_slot_size, USABLE_POOL_BYTES};
use crate::sys;

/// Page-sized pool dedicated to a single tiny class.
#[repr(C)]
pub struct TinyPool {
    bitmap: Bitmap,
    memory: [u8; USABLE_POOL_BYTES],
}

const _: () = assert!(core::mem::size_of::<TinyPool>() == PAGE_SIZE);

impl TinyPool {
    /// Maps and initializes a fresh pool for `class`.
    pub fn create(class: u8) -> Option<NonNull<TinyPool>> {
        unsafe {
            let page = sys::map(PAGE_SIZE)?;
            let pool = page.cast::<TinyPool>();
            Bitmap::init(core::ptr::addr_of_mut!((*pool).bitmap), tiny_blocks(class));
            Some(NonNull::new_unchecked(pool))
        }
    }

    /// Unmaps a pool created by [`TinyPool::create`].
    ///
    /// # Safety
    ///
    /// No block inside the pool may be referenced afterwards.
    pub unsafe fn destroy(pool: NonNull<TinyPool>) {
        sys::unmap(pool.as_ptr().cast::<u8>(), PAGE_SIZE);
    }

    #[inline]
    fn memory_base(&self) -> usize {
        core::ptr::addr_of!(self.memory) as usize
    }

    /// True when `addr` lies inside this pool's page.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let start = self as *const TinyPool as usize;
        addr >= start && addr < start + PAGE_SIZE
    }

    /// Claims a slot for `class` and returns its base address (where the
    /// coordinator writes the header). `None` when the pool is full.
    pub fn allocate_tiny(&self, class: u8) -> Option<*mut u8> {
        let size = tiny_block_size(class);
        let slot_size = tiny_slot_size(class);

        let index = self
            .bitmap
            .find_free_block(slot_size, alignment_for_size(size))?;

        let offset = index * slot_size;
        if offset + slot_size > USABLE_POOL_BYTES {
            return None;
        }
        Some((self.memory_base() + offset) as *mut u8)
    }

    /// Returns a slot (by its base address) to the pool.
    pub fn deallocate_tiny(&self, block: *mut u8, class: u8) {
        let slot_size = tiny_slot_size(class);
        let offset = (block as usize).wrapping_sub(self.memory_base());
        let index = offset / slot_size;
        if index < tiny_blocks(class) {
            self.bitmap.mark_free(index);
        }
    }

    /// True when no slot is live.
    pub fn is_completely_free(&self, class: u8) -> bool {
        self.bitmap.is_completely_free(tiny_blocks(class))
    }
}
