//! Size-class table.
//!
//! Thirty-two classes cover everything below the large threshold.
//! Classes 0..7 are the tiny sizes (8-byte steps up to 64); classes 8..11
//! serve double duty, reachable both from the small lookup `(n-1) >> 3`
//! and the medium lookup `floor(log2(n-1))`, so their capacity is the
//! larger of the two demands (bounded by what a one-page pool can back);
//! classes 12..31 continue the 8-byte steps up to 256.
//!
//! Every slot reserves room for the block header, so a full-capacity
//! write can never reach the next slot.

use crate::bitmap::Bitmap;
use crate::constants::{
    align_up, alignment_for_size, ALIGNMENT, PAGE_SIZE, SIZE_CLASSES, SMALL_LARGE_THRESHOLD,
    TINY_CLASSES,
};
use crate::header::HEADER_SIZE;

/// Bytes of a pool page left for slots after the bitmap.
pub const USABLE_POOL_BYTES: usize = PAGE_SIZE - core::mem::size_of::<Bitmap>();

/// Last class reachable from the medium lookup.
const MEDIUM_CLASS_MAX: usize = 11;

/// Geometry of one size class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeClass {
    /// Largest payload the class can carry.
    pub size: usize,
    /// Slot stride inside a pool, header included.
    pub slot_size: usize,
    /// Slots a single pool page can back.
    pub blocks: usize,
    /// Bytes of slack between payload capacity and slot stride.
    pub slack: usize,
}

const fn nominal_size(class: usize) -> usize {
    let linear = (class + 1) * 8;
    if class < TINY_CLASSES || class > MEDIUM_CLASS_MAX {
        return linear;
    }
    let geometric = 1usize << (class + 1);
    let want = if geometric > linear { geometric } else { linear };
    let cap = USABLE_POOL_BYTES - HEADER_SIZE;
    if want > cap {
        cap
    } else {
        want
    }
}

const fn slot_for(size: usize) -> usize {
    let natural = align_up(size + HEADER_SIZE, alignment_for_size(size));
    if natural > USABLE_POOL_BYTES {
        align_up(size + HEADER_SIZE, ALIGNMENT)
    } else {
        natural
    }
}

const fn entry(class: usize) -> SizeClass {
    let size = nominal_size(class);
    let slot_size = slot_for(size);
    SizeClass {
        size,
        slot_size,
        blocks: USABLE_POOL_BYTES / slot_size,
        slack: slot_size - size,
    }
}

const fn build_classes() -> [SizeClass; SIZE_CLASSES] {
    let mut table = [SizeClass {
        size: 0,
        slot_size: 0,
        blocks: 0,
        slack: 0,
    }; SIZE_CLASSES];
    let mut class = 0;
    while class < SIZE_CLASSES {
        table[class] = entry(class);
        class += 1;
    }
    table
}

/// The derived class table.
pub static CLASSES: [SizeClass; SIZE_CLASSES] = build_classes();

const _: () = {
    let table = build_classes();
    let mut class = 0;
    while class < SIZE_CLASSES {
        assert!(table[class].blocks >= 1);
        assert!(table[class].slot_size >= table[class].size + HEADER_SIZE);
        assert!(table[class].blocks * table[class].slot_size <= USABLE_POOL_BYTES);
        class += 1;
    }
};

/// Class lookup for a non-zero size below the large threshold: 8-byte
/// steps through 256 bytes, `floor(log2(n-1))` beyond.
#[inline]
pub fn class_for_size(size: usize) -> u8 {
    debug_assert!(size > 0);
    if size <= SMALL_LARGE_THRESHOLD {
        ((size - 1) >> 3) as u8
    } else {
        (usize::BITS - 1 - (size - 1).leading_zeros()) as u8
    }
}

/// Largest payload the medium tier can carry; anything bigger maps.
#[inline]
pub const fn max_medium_size() -> usize {
    nominal_size(MEDIUM_CLASS_MAX)
}

/// Payload size of a tiny class.
#[inline]
pub const fn tiny_block_size(class: u8) -> usize {
    (class as usize + 1) << 3
}

/// Slot stride of a tiny class, header included.
#[inline]
pub const fn tiny_slot_size(class: u8) -> usize {
    align_up(tiny_block_size(class) + HEADER_SIZE, ALIGNMENT)
}

/// Slots a tiny pool can back for a class.
#[inline]
pub const fn tiny_blocks(class: u8) -> usize {
    USABLE_POOL_BYTES / tiny_slot_size(class)
}

/// Payload capacity used by the in-place reallocate check.
#[inline]
pub fn class_capacity(class: u8) -> usize {
    if usize::from(class) < TINY_CLASSES {
        tiny_slot_size(class) - HEADER_SIZE
    } else {
        CLASSES[usize::from(class)].size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_matches_tiers() {
        assert_eq!(class_for_size(1), 0);
        assert_eq!(class_for_size(8), 0);
        assert_eq!(class_for_size(9), 1);
        assert_eq!(class_for_size(64), 7);
        assert_eq!(class_for_size(65), 8);
        assert_eq!(class_for_size(200), 24);
        assert_eq!(class_for_size(256), 31);
        assert_eq!(class_for_size(257), 8);
        assert_eq!(class_for_size(512), 8);
        assert_eq!(class_for_size(513), 9);
        assert_eq!(class_for_size(2048), 10);
        assert_eq!(class_for_size(2049), 11);
        assert_eq!(class_for_size(3968), 11);
    }

    #[test]
    fn capacity_covers_every_mapped_size() {
        for size in 1..=max_medium_size() {
            let class = class_for_size(size);
            assert!(
                class_capacity(class) >= size,
                "class {class} too small for {size}"
            );
        }
    }

    #[test]
    fn dual_use_classes_take_the_geometric_demand() {
        assert_eq!(CLASSES[8].size, 512);
        assert_eq!(CLASSES[9].size, 1024);
        assert_eq!(CLASSES[10].size, 2048);
        assert_eq!(CLASSES[11].size, USABLE_POOL_BYTES - HEADER_SIZE);
    }

    #[test]
    fn linear_classes_step_by_eight() {
        assert_eq!(CLASSES[12].size, 104);
        assert_eq!(CLASSES[31].size, 256);
        assert_eq!(CLASSES[0].size, 8);
        assert_eq!(CLASSES[7].size, 64);
    }

    #[test]
    fn tiny_slots_are_uniform_at_64_byte_lines() {
        for class in 0..TINY_CLASSES as u8 {
            assert_eq!(tiny_slot_size(class), 128);
            assert_eq!(tiny_blocks(class), 31);
            assert_eq!(class_capacity(class), 64);
        }
    }

    #[test]
    fn slots_fit_their_pool() {
        for sc in &CLASSES {
            assert!(sc.blocks >= 1);
            assert!(sc.slot_size >= sc.size + HEADER_SIZE);
            assert!(sc.blocks * sc.slot_size <= USABLE_POOL_BYTES);
            assert_eq!(sc.slack, sc.slot_size - sc.size);
        }
    }
}
