//! The page allocator (C1): a three-operation abstraction over host virtual
//! memory — allocate writable, commit executable, free — and the
//! [`ExecutablePage`] handle that owns the W^X lifecycle end to end.
//!
//! Grounded on the `dynasm-rs` `runtime/src/mmap.rs` example retrieved for
//! this spec (which wraps the `memmap`/`Mmap`+`MmapMut` pair and exposes
//! `make_exec`/`make_mut` to move between them) and on `wasmtime-jit`'s
//! `code_memory.rs`, which layers the `region` crate's `protect` over raw
//! mmap'd storage for exactly this allocate-then-reprotect dance. This
//! module uses `region` for the portable alloc/protect/free triple and
//! drops to `libc` only for the macOS/AArch64 `MAP_JIT` affordance §4.1
//! calls out, since `region` has no way to ask for it.

use crate::error::MemoryError;

/// A writable, not-yet-executable region obtained from the host.
///
/// Owns the mapping until [`Self::commit_executable`] hands ownership to an
/// [`ExecutablePage`], or the allocation is dropped unused.
pub struct WritablePage {
    base: *mut u8,
    size: usize,
}

// Safety: the page is privately owned and never aliased; the raw pointer is
// only ever dereferenced through the owning handle.
unsafe impl Send for WritablePage {}

impl WritablePage {
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Copy `code` into the page. Panics if `code` does not fit; callers
    /// always allocate exactly `code.len()` bytes first.
    pub fn write(&mut self, code: &[u8]) {
        assert!(code.len() <= self.size, "code does not fit in allocated page");
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), self.base, code.len());
        }
    }
}

impl Drop for WritablePage {
    fn drop(&mut self) {
        free(self.base, self.size);
    }
}

/// An installed, read+executable mapping. Owns the page; dropping it frees
/// the mapping (§5, §9 "raw executable memory" redesign note).
pub struct ExecutablePage {
    base: *const u8,
    size: usize,
}

// Safety: code is immutable once committed, and invoking it is the only
// operation available through `&self`.
unsafe impl Send for ExecutablePage {}
unsafe impl Sync for ExecutablePage {}

impl ExecutablePage {
    pub fn as_ptr(&self) -> *const u8 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.size
    }

    /// Reinterpret the page's base address as a nullary function returning
    /// `i64`. Safety is the caller's: the bytes previously written must be a
    /// valid leaf function for the host's calling convention.
    pub unsafe fn as_entry_point(&self) -> unsafe extern "C" fn() -> i64 {
        std::mem::transmute(self.base)
    }
}

impl Drop for ExecutablePage {
    fn drop(&mut self) {
        free(self.base as *mut u8, self.size);
    }
}

/// Allocate a page-aligned region of at least `size` bytes, read+write, not
/// executable (C1 `allocate_writable`).
pub fn allocate_writable(size: usize) -> Result<WritablePage, MemoryError> {
    if size == 0 {
        return Ok(WritablePage {
            base: std::ptr::NonNull::dangling().as_ptr(),
            size: 0,
        });
    }

    let base = platform::alloc_rw(size).ok_or(MemoryError::AllocationFailed(size))?;

    Ok(WritablePage { base, size })
}

/// Transition `page` to read+executable, performing i-cache maintenance
/// where the target architecture requires it, and hand back an owning
/// [`ExecutablePage`] (C1 `commit_executable`).
pub fn commit_executable(mut page: WritablePage) -> Result<ExecutablePage, MemoryError> {
    let base = page.as_mut_ptr();
    let size = page.len();

    if size > 0 {
        platform::protect_rx(base, size)
            .map_err(|e| MemoryError::ProtectionFailed(e.to_string()))?;
        platform::flush_icache(base, size);
    }

    // `page`'s Drop would otherwise free the mapping out from under us; take
    // ownership of the raw parts instead of letting it run.
    let raw = (base as *const u8, size);
    std::mem::forget(page);

    Ok(ExecutablePage {
        base: raw.0,
        size: raw.1,
    })
}

/// Release a region (C1 `free`). A no-op on a null/zero-size base.
fn free(base: *mut u8, size: usize) {
    if base.is_null() || size == 0 {
        return;
    }
    platform::free(base, size);
}

#[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
mod platform {
    use region::Protection;

    pub fn alloc_rw(size: usize) -> Option<*mut u8> {
        let alloc = region::alloc(size, Protection::READ_WRITE).ok()?;
        let ptr = alloc.as_ptr::<u8>() as *mut u8;
        std::mem::forget(alloc); // ownership moves to WritablePage/ExecutablePage
        Some(ptr)
    }

    pub fn protect_rx(base: *mut u8, size: usize) -> Result<(), region::Error> {
        unsafe { region::protect(base, size, Protection::READ_EXECUTE) }
    }

    pub fn free(base: *mut u8, size: usize) {
        unsafe {
            let _ = region::protect(base, size, Protection::READ_WRITE);
            libc::munmap(base as *mut libc::c_void, size);
        }
    }

    #[cfg(target_arch = "aarch64")]
    pub fn flush_icache(base: *mut u8, size: usize) {
        super::aarch64_cache::invalidate(base, size);
    }

    #[cfg(not(target_arch = "aarch64"))]
    pub fn flush_icache(_base: *mut u8, _size: usize) {
        // x86-64 has a coherent instruction cache; a compiler fence is
        // enough to order the writes before the first call.
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    }
}

/// Apple Silicon requires pages destined to be executable to be mapped with
/// `MAP_JIT` up front (§4.1); `region` has no knob for custom mmap flags, so
/// this path goes straight to `libc::mmap`.
#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
mod platform {
    pub fn alloc_rw(size: usize) -> Option<*mut u8> {
        unsafe {
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_JIT,
                -1,
                0,
            );
            if ptr == libc::MAP_FAILED {
                None
            } else {
                Some(ptr as *mut u8)
            }
        }
    }

    pub fn protect_rx(base: *mut u8, size: usize) -> Result<(), std::io::Error> {
        unsafe {
            // Toggle this thread's JIT write-protect state before flipping
            // the page's protection bits (pthread_jit_write_protect_np is a
            // per-thread switch guarding MAP_JIT pages).
            pthread_jit_write_protect_np(1);
            let rc = libc::mprotect(base as *mut libc::c_void, size, libc::PROT_READ | libc::PROT_EXEC);
            if rc != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
        Ok(())
    }

    pub fn free(base: *mut u8, size: usize) {
        unsafe {
            libc::munmap(base as *mut libc::c_void, size);
        }
    }

    pub fn flush_icache(base: *mut u8, size: usize) {
        super::aarch64_cache::invalidate(base, size);
    }

    extern "C" {
        fn pthread_jit_write_protect_np(enabled: libc::c_int);
    }
}

/// AArch64 instruction-cache invalidation: clean the data cache and
/// invalidate the instruction cache over the emitted range, then issue the
/// barriers required before the first call into the region (§4.7, §5).
/// Grounded on the cache-management module in the `dynasm-rs` example.
#[cfg(target_arch = "aarch64")]
mod aarch64_cache {
    use std::arch::asm;

    const CACHE_LINE: usize = 64;

    pub fn invalidate(base: *mut u8, size: usize) {
        let start = base as usize;
        let end = start + size;

        unsafe {
            let mut addr = start & !(CACHE_LINE - 1);
            while addr < end {
                asm!("dc cvau, {0}", in(reg) addr, options(nostack));
                addr += CACHE_LINE;
            }
            asm!("dsb ish", options(nostack));

            let mut addr = start & !(CACHE_LINE - 1);
            while addr < end {
                asm!("ic ivau, {0}", in(reg) addr, options(nostack));
                addr += CACHE_LINE;
            }
            asm!("dsb ish", options(nostack));
            asm!("isb", options(nostack));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_write_commit_roundtrip() {
        // A tiny leaf function: `mov eax, 42; ret` (x86-64) has the same
        // byte shape regardless of host arch for this smoke test's purpose
        // is just exercising the allocate -> write -> commit -> free path.
        let mut page = allocate_writable(4096).expect("allocate");
        assert!(page.len() >= 4096);
        page.write(&[0xC3]); // `ret`
        let exec = commit_executable(page).expect("commit");
        assert_eq!(exec.len(), 4096);
    }

    #[test]
    fn zero_size_allocation_is_a_no_op() {
        let page = allocate_writable(0).expect("allocate");
        assert_eq!(page.len(), 0);
        let exec = commit_executable(page).expect("commit");
        assert_eq!(exec.len(), 0);
    }
}
