#![cfg(windows)]

use std::ptr;
use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, MEM_RESET, PAGE_READWRITE,
};

/// Maps `len` bytes of committed memory.
pub unsafe fn map(len: usize) -> Option<*mut u8> {
    let ptr = VirtualAlloc(ptr::null_mut(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    if ptr.is_null() {
        None
    } else {
        Some(ptr.cast::<u8>())
    }
}

/// Releases a region previously obtained from [`map`].
pub unsafe fn unmap(ptr: *mut u8, _len: usize) {
    // MEM_RELEASE frees the whole reservation; the size must be 0.
    VirtualFree(ptr.cast(), 0, MEM_RELEASE);
}

/// Resets the backing pages of `[ptr, ptr + len)`; contents become
/// undefined but the range stays committed.
pub unsafe fn advise_dontneed(ptr: *mut u8, len: usize) {
    VirtualAlloc(ptr.cast(), len, MEM_RESET, PAGE_READWRITE);
}
