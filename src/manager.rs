//! Per-class pool fleet.
//!
//! Each size class owns up to [`MAX_POOLS`] pools. Allocation walks the
//! fleet in order and grows it on a total miss; a pool whose last block
//! is returned is destroyed and the entry array compacted by moving the
//! tail entry into the vacated slot.

use core::ptr::NonNull;

use crate::constants::{MAX_POOLS, SIZE_CLASSES};
use crate::pool::Pool;
use crate::size_class::CLASSES;

#[derive(Clone, Copy)]
struct PoolEntry {
    pool: NonNull<Pool>,
    used_blocks: usize,
}

/// Fleet of pools for every size class, owned by one thread.
pub struct PoolManager {
    pools: [[Option<PoolEntry>; MAX_POOLS]; SIZE_CLASSES],
    counts: [usize; SIZE_CLASSES],
}

impl PoolManager {
    pub const fn new() -> Self {
        Self {
            pools: [[None; MAX_POOLS]; SIZE_CLASSES],
            counts: [0; SIZE_CLASSES],
        }
    }

    /// Claims a slot for `class`, growing the fleet on a miss. Returns
    /// the slot base address, or `None` when every pool is wedged and
    /// the fleet is at capacity.
    pub fn allocate(&mut self, class: u8) -> Option<*mut u8> {
        let class_idx = usize::from(class);
        let sc = &CLASSES[class_idx];

        for i in 0..self.counts[class_idx] {
            let Some(mut entry) = self.pools[class_idx][i] else {
                continue;
            };
            if let Some(block) = unsafe { entry.pool.as_ref() }.allocate(sc) {
                entry.used_blocks += 1;
                self.pools[class_idx][i] = Some(entry);
                return Some(block);
            }
        }

        if self.counts[class_idx] >= MAX_POOLS {
            return None;
        }

        let pool = Pool::create(sc)?;
        match unsafe { pool.as_ref() }.allocate(sc) {
            Some(block) => {
                let slot = self.counts[class_idx];
                self.pools[class_idx][slot] = Some(PoolEntry {
                    pool,
                    used_blocks: 1,
                });
                self.counts[class_idx] += 1;
                Some(block)
            }
            None => {
                unsafe { Pool::destroy(pool) };
                None
            }
        }
    }

    /// Returns a slot (by its base address) to its owning pool. Destroys
    /// the pool when its last block comes back. Returns `false` when no
    /// pool of this class owns the address.
    pub fn deallocate(&mut self, block: *mut u8, class: u8) -> bool {
        let class_idx = usize::from(class);
        if class_idx >= SIZE_CLASSES {
            return false;
        }
        let sc = &CLASSES[class_idx];

        for i in 0..self.counts[class_idx] {
            let Some(mut entry) = self.pools[class_idx][i] else {
                continue;
            };
            if !unsafe { entry.pool.as_ref() }.contains(block as usize) {
                continue;
            }

            unsafe { entry.pool.as_ref() }.deallocate(block, sc);
            entry.used_blocks -= 1;

            if entry.used_blocks == 0 {
                let last = self.counts[class_idx] - 1;
                self.pools[class_idx].swap(i, last);
                self.pools[class_idx][last] = None;
                self.counts[class_idx] = last;
                unsafe { Pool::destroy(entry.pool) };
            } else {
                self.pools[class_idx][i] = Some(entry);
            }
            return true;
        }
        false
    }

    /// Number of live pools for a class.
    #[cfg(test)]
    pub fn pool_count(&self, class: u8) -> usize {
        self.counts[usize::from(class)]
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        // Pools still holding live blocks at thread exit are leaked
        // deliberately; unmapping them would invalidate outstanding
        // pointers.
        for class_idx in 0..SIZE_CLASSES {
            let sc = &CLASSES[class_idx];
            for i in 0..self.counts[class_idx] {
                if let Some(entry) = self.pools[class_idx][i].take() {
                    let free = entry.used_blocks == 0
                        || unsafe { entry.pool.as_ref() }.is_completely_free(sc);
                    if free {
                        unsafe { Pool::destroy(entry.pool) };
                    }
                }
            }
            self.counts[class_idx] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_on_miss_and_shrinks_on_empty() {
        let mut manager = PoolManager::new();
        let class = 8u8;
        let per_pool = CLASSES[8].blocks;

        let mut blocks = Vec::new();
        for _ in 0..per_pool + 1 {
            blocks.push(manager.allocate(class).unwrap());
        }
        assert_eq!(manager.pool_count(class), 2);

        for block in blocks.drain(..) {
            assert!(manager.deallocate(block, class));
        }
        assert_eq!(manager.pool_count(class), 0);
    }

    #[test]
    fn foreign_address_is_rejected() {
        let mut manager = PoolManager::new();
        let block = manager.allocate(12).unwrap();
        assert!(!manager.deallocate(0x4000 as *mut u8, 12));
        assert!(!manager.deallocate(block, 13));
        assert!(manager.deallocate(block, 12));
    }

    #[test]
    fn fleet_cap_denies_growth() {
        let mut manager = PoolManager::new();
        let class = 9u8;
        let capacity = CLASSES[9].blocks * MAX_POOLS;

        let mut blocks = Vec::new();
        for _ in 0..capacity {
            blocks.push(manager.allocate(class).unwrap());
        }
        assert!(manager.allocate(class).is_none());

        for block in blocks {
            assert!(manager.deallocate(block, class));
        }
    }
}
