//! A single address-keyed software breakpoint.
//!
//! Owns the original byte at its address and knows how to patch/restore
//! it. The masking arithmetic is split into a pure helper so it can be
//! unit-tested without a live tracee.

use nix::unistd::Pid;

use crate::ptrace;

const INT3: u8 = 0xCC;

/// Replace the low byte of `word` with `new_byte`, returning the patched
/// word and the byte that was there before.
fn patch_low_byte(word: u64, new_byte: u8) -> (u64, u8) {
    let orig = (word & 0xFF) as u8;
    let patched = (word & !0xFFu64) | new_byte as u64;
    (patched, orig)
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    addr: usize,
    enabled: bool,
    saved: u8,
}

impl Breakpoint {
    pub fn new(addr: usize) -> Self {
        Breakpoint {
            addr,
            enabled: false,
            saved: 0,
        }
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Idempotent: patches `0xCC` into the tracee's instruction stream and
    /// remembers the byte it replaced.
    pub fn enable(&mut self, pid: Pid) -> nix::Result<()> {
        if self.enabled {
            return Ok(());
        }
        let word = ptrace::peek(pid, self.addr)?;
        let (patched, saved) = patch_low_byte(word, INT3);
        ptrace::poke(pid, self.addr, patched)?;
        self.saved = saved;
        self.enabled = true;
        Ok(())
    }

    /// Idempotent: restores the byte that was at this address before
    /// `enable`. Round-trips memory back to its pre-patch state.
    pub fn disable(&mut self, pid: Pid) -> nix::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let word = ptrace::peek(pid, self.addr)?;
        let (restored, _) = patch_low_byte(word, self.saved);
        ptrace::poke(pid, self.addr, restored)?;
        self.enabled = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_then_restore_is_identity() {
        let original: u64 = 0x90_90_90_90_90_90_90_55; // little-endian, low byte 0x55
        let (patched, saved) = patch_low_byte(original, INT3);
        assert_eq!(saved, 0x55);
        assert_eq!(patched & 0xFF, INT3 as u64);
        assert_eq!(patched & !0xFFu64, original & !0xFFu64);

        let (restored, _) = patch_low_byte(patched, saved);
        assert_eq!(restored, original);
    }

    #[test]
    fn patch_only_touches_low_byte() {
        let original: u64 = 0xDEADBEEF_CAFEBABE;
        let (patched, _) = patch_low_byte(original, INT3);
        assert_eq!(patched >> 8, original >> 8);
    }

    #[test]
    fn new_breakpoint_starts_disabled() {
        let bp = Breakpoint::new(0x4011a0);
        assert!(!bp.enabled());
        assert_eq!(bp.addr(), 0x4011a0);
    }
}
