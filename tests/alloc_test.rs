//! End-to-end allocator scenarios, one thread-local heap per test
//! thread.

use stratalloc::{allocate, callocate, cleanup, deallocate, reallocate, ALIGNMENT};

fn assert_aligned(ptr: *mut u8) {
    assert_eq!(ptr as usize % ALIGNMENT, 0, "pointer {ptr:p} misaligned");
}

#[test]
fn tiny_hot_reuse_returns_the_same_slot() {
    let p = allocate(32);
    assert!(!p.is_null());
    assert_aligned(p);

    unsafe {
        for i in 0..32 {
            p.add(i).write(i as u8);
        }
        deallocate(p);
    }

    let q = allocate(32);
    assert_eq!(q, p);
    unsafe { deallocate(q) };
}

#[test]
fn small_blocks_cycle_through_the_thread_cache() {
    let p = allocate(200);
    assert!(!p.is_null());
    assert_aligned(p);
    unsafe { deallocate(p) };

    // The freed pointer sits in the class cache; the next same-class
    // request must pop it back out.
    let q = allocate(200);
    assert_eq!(q, p);
    unsafe { deallocate(q) };
}

#[test]
fn callocate_zero_fills() {
    let p = callocate(1, 200);
    assert!(!p.is_null());
    for i in 0..200 {
        assert_eq!(unsafe { p.add(i).read() }, 0, "byte {i} not zeroed");
    }
    unsafe { deallocate(p) };
}

#[test]
fn callocate_zero_fills_large_blocks() {
    // Large enough to take the mapped path, and recycled once through
    // the large cache so the second pass sees dirty pages.
    let size = 64 * 1024;
    let p = callocate(1, size);
    assert!(!p.is_null());
    unsafe {
        core::ptr::write_bytes(p, 0xFF, size);
        deallocate(p);
    }

    let q = callocate(1, size);
    assert!(!q.is_null());
    for i in (0..size).step_by(997) {
        assert_eq!(unsafe { q.add(i).read() }, 0, "byte {i} not zeroed");
    }
    unsafe { deallocate(q) };
}

#[test]
fn reallocate_within_tiny_capacity_stays_put() {
    let p = allocate(48);
    assert!(!p.is_null());
    let q = unsafe { reallocate(p, 56) };
    assert_eq!(q, p);
    unsafe { deallocate(q) };
}

#[test]
fn reallocate_across_tiers_moves_and_preserves_content() {
    let p = allocate(48);
    assert!(!p.is_null());
    unsafe {
        for i in 0..48 {
            p.add(i).write(0xC0 ^ i as u8);
        }
    }

    let q = unsafe { reallocate(p, 200) };
    assert!(!q.is_null());
    assert_ne!(q, p);
    for i in 0..48 {
        assert_eq!(unsafe { q.add(i).read() }, 0xC0 ^ i as u8);
    }
    unsafe { deallocate(q) };
}

#[test]
fn reallocate_null_allocates_and_zero_frees() {
    let p = unsafe { reallocate(core::ptr::null_mut(), 128) };
    assert!(!p.is_null());
    assert!(unsafe { reallocate(p, 0) }.is_null());
}

#[test]
fn large_cache_returns_the_same_mapping() {
    let size = 8 * 1024 * 1024;
    let p = allocate(size);
    assert!(!p.is_null());
    assert_aligned(p);
    unsafe {
        p.write(0x42);
        deallocate(p);
    }

    let q = allocate(size);
    assert_eq!(q, p);
    unsafe { deallocate(q) };
    cleanup();
}

#[test]
fn large_cache_rejects_requests_beyond_tolerance() {
    let p = allocate(8 * 1024 * 1024);
    assert!(!p.is_null());
    unsafe { deallocate(p) };

    // 16 MiB exceeds the cached 8 MiB block; a stored block smaller
    // than the request can never be handed out.
    let q = allocate(16 * 1024 * 1024);
    assert!(!q.is_null());
    assert_ne!(q, p);
    unsafe { deallocate(q) };
    cleanup();
}

#[test]
fn wild_pointer_free_is_a_no_op() {
    unsafe { deallocate(0xDEAD as *mut u8) };

    // Allocator state stays intact afterwards.
    let p = allocate(64);
    assert!(!p.is_null());
    unsafe { deallocate(p) };
}

#[test]
fn null_and_double_free_are_no_ops() {
    unsafe { deallocate(core::ptr::null_mut()) };

    let p = allocate(200);
    assert!(!p.is_null());
    unsafe {
        deallocate(p);
        deallocate(p);
    }

    let q = allocate(200);
    assert!(!q.is_null());
    unsafe { deallocate(q) };
}

#[test]
fn page_aligned_pointers_are_rejected() {
    // A legitimate allocation can never sit on a page boundary (the
    // header occupies the prefix), so this must no-op.
    unsafe { deallocate(0x2000_0000 as *mut u8) };
    let p = allocate(32);
    assert!(!p.is_null());
    unsafe { deallocate(p) };
}

#[test]
fn every_tier_honors_the_capacity_law() {
    for &size in &[1usize, 8, 63, 64, 65, 100, 256, 257, 512, 1000, 2048, 3000, 4096, 100_000] {
        let p = allocate(size);
        assert!(!p.is_null(), "allocate({size}) failed");
        assert_aligned(p);
        unsafe {
            // Touch first and last byte of the requested range.
            p.write(0x11);
            p.add(size - 1).write(0x22);
            assert_eq!(p.read(), 0x11);
            assert_eq!(p.add(size - 1).read(), 0x22);
            deallocate(p);
        }
    }
}

#[test]
fn distinct_live_allocations_never_alias() {
    let sizes = [16usize, 100, 300, 1500, 5000];
    let mut live: Vec<(*mut u8, usize)> = Vec::new();

    for (i, &size) in sizes.iter().cycle().take(40).enumerate() {
        let p = allocate(size);
        assert!(!p.is_null());
        unsafe { core::ptr::write_bytes(p, i as u8, size) };
        live.push((p, size));
    }

    for (i, &(p, size)) in live.iter().enumerate() {
        for (j, &(q, other)) in live.iter().enumerate() {
            if i == j {
                continue;
            }
            let disjoint = p as usize + size <= q as usize || q as usize + other <= p as usize;
            assert!(disjoint, "allocations {i} and {j} overlap");
        }
        unsafe {
            assert_eq!(p.read(), i as u8);
            assert_eq!(p.add(size - 1).read(), i as u8);
        }
    }

    for (p, _) in live {
        unsafe { deallocate(p) };
    }
}

#[test]
fn overflowing_cache_still_recycles_through_pools() {
    // Class 31 backs 7 blocks per pool across up to 8 pools; freeing
    // more than the 32-deep thread cache can hold pushes the tail
    // through the coalescing and pool-return path.
    let mut blocks = Vec::new();
    for _ in 0..40 {
        let p = allocate(250);
        assert!(!p.is_null());
        blocks.push(p);
    }
    for p in blocks.drain(..) {
        unsafe { deallocate(p) };
    }

    let p = allocate(250);
    assert!(!p.is_null());
    unsafe { deallocate(p) };
}

#[test]
fn reallocate_grows_a_mapped_block() {
    let size = 8192;
    let p = allocate(size);
    assert!(!p.is_null());
    unsafe {
        for i in 0..size {
            p.add(i).write((i % 251) as u8);
        }
    }

    let q = unsafe { reallocate(p, size * 4) };
    assert!(!q.is_null());
    for i in (0..size).step_by(61) {
        assert_eq!(unsafe { q.add(i).read() }, (i % 251) as u8);
    }
    unsafe { deallocate(q) };
    cleanup();
}

#[test]
fn cleanup_releases_and_thread_recovers() {
    let mut blocks = Vec::new();
    for size in [24usize, 200, 1000, 8192] {
        let p = allocate(size);
        assert!(!p.is_null());
        blocks.push(p);
    }
    for p in blocks {
        unsafe { deallocate(p) };
    }
    cleanup();

    let p = allocate(1000);
    assert!(!p.is_null());
    unsafe { deallocate(p) };
    cleanup();
}

#[test]
fn exhausted_tier_returns_null_without_corruption() {
    // Class 9 (513..1024 bytes) backs one block per pool, eight pools:
    // the ninth live allocation must be denied, not misplaced.
    let mut blocks = Vec::new();
    loop {
        let p = allocate(1000);
        if p.is_null() {
            break;
        }
        unsafe { core::ptr::write_bytes(p, 0x77, 1000) };
        blocks.push(p);
        assert!(blocks.len() <= 8, "fleet cap should deny growth");
    }
    assert_eq!(blocks.len(), 8);

    for &p in &blocks {
        unsafe {
            assert_eq!(p.read(), 0x77);
            assert_eq!(p.add(999).read(), 0x77);
        }
    }
    for p in blocks {
        unsafe { deallocate(p) };
    }

    let p = allocate(1000);
    assert!(!p.is_null());
    unsafe { deallocate(p) };
}
