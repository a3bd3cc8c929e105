//! Memory poisoning for debugging.
//!
//! Fills released host memory with a known pattern so use-after-free reads
//! stand out.

/// Pattern used to poison freed memory.
pub const FREED_PATTERN: u8 = 0xCD;

/// Poison a region of memory with the freed pattern.
///
/// # Safety
///
/// The memory region must be valid and writable.
pub unsafe fn poison_freed(ptr: *mut u8, size: usize) {
    std::ptr::write_bytes(ptr, FREED_PATTERN, size);
}
