//! Thin wrapper over the kernel's process-tracing syscall.
//!
//! Every operation here is a direct, blocking `ptrace` call keyed by pid.
//! None of them wait for the tracee to stop — waiting is the caller's
//! responsibility, performed by [`crate::inferior::Inferior`]'s dispatch
//! routine.

use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::ffi::c_void;

/// Called by the child, after `fork` and before `exec`, to mark itself as
/// traced. Must run in the child.
pub fn traceme() -> nix::Result<()> {
    ptrace::traceme()
}

/// Resume the tracee without delivering a signal.
pub fn cont(pid: Pid) -> nix::Result<()> {
    ptrace::cont(pid, None)
}

/// Resume the tracee, redelivering a signal that previously stopped it.
pub fn cont_with_signal(pid: Pid, sig: Signal) -> nix::Result<()> {
    ptrace::cont(pid, sig)
}

/// Execute exactly one machine instruction.
pub fn single_step(pid: Pid) -> nix::Result<()> {
    ptrace::step(pid, None)
}

/// Read 8 bytes at `addr`. The kernel handles unaligned addresses, so no
/// alignment is performed here.
pub fn peek(pid: Pid, addr: usize) -> nix::Result<u64> {
    let word = ptrace::read(pid, addr as ptrace::AddressType)?;
    Ok(word as u64)
}

/// Write 8 bytes at `addr`.
pub fn poke(pid: Pid, addr: usize, word: u64) -> nix::Result<()> {
    unsafe { ptrace::write(pid, addr as ptrace::AddressType, word as usize as *mut c_void) }
}

pub fn getregs(pid: Pid) -> nix::Result<libc::user_regs_struct> {
    ptrace::getregs(pid)
}

pub fn setregs(pid: Pid, regs: libc::user_regs_struct) -> nix::Result<()> {
    ptrace::setregs(pid, regs)
}

pub fn get_pc(pid: Pid) -> nix::Result<usize> {
    Ok(getregs(pid)?.rip as usize)
}

pub fn set_pc(pid: Pid, pc: usize) -> nix::Result<()> {
    let mut regs = getregs(pid)?;
    regs.rip = pc as u64;
    setregs(pid, regs)
}

pub fn get_frame_pointer(pid: Pid) -> nix::Result<usize> {
    Ok(getregs(pid)?.rbp as usize)
}

/// Siginfo for the signal that most recently stopped the tracee. Used to
/// tell a trap-from-int3 apart from other `SIGTRAP`-reporting events
/// (e.g. single-step) and to report foreign signal numbers.
pub fn get_siginfo(pid: Pid) -> nix::Result<libc::siginfo_t> {
    ptrace::getsiginfo(pid)
}

/// Linux reports a software breakpoint trap (`int3`) with one of these
/// `si_code` values depending on kernel version; anything else arriving
/// as `SIGTRAP` (e.g. the trap after `PTRACE_SINGLESTEP`) is not a
/// breakpoint hit.
pub fn is_breakpoint_trap(info: &libc::siginfo_t) -> bool {
    const TRAP_BRKPT: i32 = 1;
    const SI_KERNEL: i32 = 0x80;
    matches!(info.si_code, TRAP_BRKPT | SI_KERNEL)
}
