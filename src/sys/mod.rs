//! Platform virtual-memory primitives.
//!
//! Everything above this module sees four operations: `map`, `unmap`,
//! `advise_dontneed`, and (Linux only) `remap`. Regions are anonymous,
//! readable and writable, and at least page-aligned.

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::*;

#[cfg(windows)]
pub use windows::*;
