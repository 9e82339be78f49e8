#![cfg(unix)]

use libc::{c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use std::ptr;

/// Maps `len` bytes of anonymous memory.
///
/// Returns a page-aligned pointer, or `None` if the kernel refuses.
pub unsafe fn map(len: usize) -> Option<*mut u8> {
    let ptr = mmap(
        ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
    );

    if ptr == MAP_FAILED {
        None
    } else {
        Some(ptr.cast::<u8>())
    }
}

/// Releases a region previously obtained from [`map`].
pub unsafe fn unmap(ptr: *mut u8, len: usize) {
    munmap(ptr.cast::<c_void>(), len);
}

/// Releases the physical pages backing `[ptr, ptr + len)` while keeping
/// the virtual range mapped. Subsequent reads observe zero bytes on
/// Linux; macOS reclaims lazily.
pub unsafe fn advise_dontneed(ptr: *mut u8, len: usize) {
    #[cfg(target_os = "macos")]
    let advice = libc::MADV_FREE;
    #[cfg(not(target_os = "macos"))]
    let advice = libc::MADV_DONTNEED;

    libc::madvise(ptr.cast::<c_void>(), len, advice);
}

/// Grows or shrinks a mapping in place, moving it if the kernel must.
#[cfg(target_os = "linux")]
pub unsafe fn remap(old: *mut u8, old_len: usize, new_len: usize) -> Option<*mut u8> {
    let ptr = libc::mremap(old.cast::<c_void>(), old_len, new_len, libc::MREMAP_MAYMOVE);
    if ptr == MAP_FAILED {
        None
    } else {
        Some(ptr.cast::<u8>())
    }
}
