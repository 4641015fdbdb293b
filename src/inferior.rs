//! The inferior controller: owns the traced child's lifecycle, the
//! breakpoint registry and pending set, the stop-cause dispatch, and the
//! source-line stepping engine. The dominant share of the crate.

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::breakpoint::Breakpoint;
use crate::dwarf_data::{DwarfData, Function};
use crate::error::{ControllerError, FatalError};
use crate::ptrace;
use crate::source;

/// Result of a wait, with the program counter already rolled back one byte
/// if the stop was a breakpoint hit.
#[derive(Debug, Clone, Copy)]
pub enum Status {
    Stopped { pc: usize, breakpoint_hit: bool },
    Exited(i32),
    Signaled(Signal),
}

/// Which of `step`/`next` is driving the stepping engine. A tagged
/// choice, not two near-duplicate classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    Into,
    Over,
}

pub struct Inferior {
    program: String,
    child: Option<Child>,
    running: bool,
    pending_signal: Option<Signal>,
    breakpoints: HashMap<usize, Breakpoint>,
    pending: HashSet<usize>,
    debug_data: DwarfData,
}

impl Inferior {
    pub fn new(program: &str, debug_data: DwarfData) -> Self {
        Inferior {
            program: program.to_string(),
            child: None,
            running: false,
            pending_signal: None,
            breakpoints: HashMap::new(),
            pending: HashSet::new(),
            debug_data,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn debug_data(&self) -> &DwarfData {
        &self.debug_data
    }

    pub fn pid(&self) -> Option<Pid> {
        self.child.as_ref().map(|c| Pid::from_raw(c.id() as i32))
    }

    /// Preconditions: not running. Forks and execs the tracee via
    /// `Command::pre_exec`, waits for its post-exec `SIGTRAP`, promotes
    /// pending breakpoints, and resumes.
    pub fn start(&mut self, args: &[String]) -> Result<Status, ControllerError> {
        let mut command = Command::new(&self.program);
        command.args(args);
        unsafe {
            command.pre_exec(|| ptrace::traceme().map_err(io::Error::from));
        }

        let child = command
            .spawn()
            .map_err(|_| ControllerError::Fatal(FatalError::ForkFailed(nix::Error::UnknownErrno)))?;
        let pid = Pid::from_raw(child.id() as i32);
        self.child = Some(child);

        match waitpid(pid, None).map_err(ControllerError::Trace)? {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => {}
            _ => {
                self.reset();
                return Err(ControllerError::Fatal(FatalError::LaunchFailed));
            }
        }

        self.running = true;
        let pending: Vec<usize> = self.pending.drain().collect();
        for addr in pending {
            let mut bp = Breakpoint::new(addr);
            bp.enable(pid)?;
            self.breakpoints.insert(addr, bp);
        }

        self.continue_execute()
    }

    /// Sends `SIGKILL` and reaps the child.
    pub fn stop(&mut self) -> Result<(), ControllerError> {
        let pid = self.pid().ok_or(ControllerError::NotRunning)?;
        signal::kill(pid, Signal::SIGKILL).map_err(ControllerError::Trace)?;
        self.dispatch_wait()?;
        Ok(())
    }

    /// If not running, remembers `addr` in the pending set for the next
    /// `start`. Otherwise installs (idempotently) a registry entry.
    pub fn set_breakpoint_at_addr(&mut self, addr: usize) -> Result<(), ControllerError> {
        if !self.running {
            self.pending.insert(addr);
            return Ok(());
        }
        if self.breakpoints.contains_key(&addr) {
            return Ok(());
        }
        let pid = self.pid().ok_or(ControllerError::NotRunning)?;
        let mut bp = Breakpoint::new(addr);
        bp.enable(pid)?;
        self.breakpoints.insert(addr, bp);
        Ok(())
    }

    /// Entry protocol: step over a breakpoint sitting at the current pc
    /// (if enabled), then resume — redelivering a pending signal if one
    /// is on file — and wait for the next stop.
    pub fn continue_execute(&mut self) -> Result<Status, ControllerError> {
        if !self.running {
            return Err(ControllerError::NotRunning);
        }
        let pid = self.pid().unwrap();
        if self.breakpoint_enabled_at(ptrace::get_pc(pid)?) {
            match self.step_instruction()? {
                Status::Stopped { .. } => {}
                terminal => return Ok(terminal),
            }
        }
        self.resume()
    }

    pub fn step(&mut self) -> Result<Status, ControllerError> {
        self.step_line(StepPolicy::Into)
    }

    pub fn next(&mut self) -> Result<Status, ControllerError> {
        self.step_line(StepPolicy::Over)
    }

    /// Walks saved frame pointers from the current frame to `main`,
    /// printing `<function> (<file>:<line>)` per frame.
    pub fn backtrace(&self) -> Result<Vec<String>, ControllerError> {
        let pid = self.pid().ok_or(ControllerError::NotRunning)?;
        let mut frames = Vec::new();
        let mut pc = ptrace::get_pc(pid)?;
        let mut fp = ptrace::get_frame_pointer(pid)?;
        loop {
            let Some(func) = self.debug_data.enclosing_subprogram(pc) else {
                frames.push(format!("{:#x} in ??", pc));
                break;
            };
            let location = self
                .debug_data
                .line_at(pc)
                .map(|c| format!("{}:{}", c.file(), c.line()))
                .unwrap_or_else(|| "??".to_string());
            frames.push(format!("{} ({})", func.name, location));
            if func.name == "main" {
                break;
            }
            let saved_pc = ptrace::peek(pid, fp + 8)? as usize;
            let saved_fp = ptrace::peek(pid, fp)? as usize;
            if saved_fp == 0 || saved_pc == 0 {
                break;
            }
            pc = saved_pc;
            fp = saved_fp;
        }
        Ok(frames)
    }

    fn reset(&mut self) {
        self.child = None;
        self.running = false;
        self.breakpoints.clear();
        self.pending_signal = None;
        // Pending user breakpoints survive a restart; that's a convenience, not a bug.
    }

    fn breakpoint_enabled_at(&self, pc: usize) -> bool {
        self.breakpoints.get(&pc).map(|b| b.enabled()).unwrap_or(false)
    }

    fn resume(&mut self) -> Result<Status, ControllerError> {
        let pid = self.pid().ok_or(ControllerError::NotRunning)?;
        match self.pending_signal.take() {
            Some(sig) => ptrace::cont_with_signal(pid, sig)?,
            None => ptrace::cont(pid)?,
        }
        self.dispatch_wait()
    }

    /// The same step-over-a-breakpoint protocol used as
    /// `continue_execute`'s entry protocol, but advancing exactly one
    /// instruction. Shared by that entry protocol and by step-in's
    /// instruction loop.
    fn step_instruction(&mut self) -> Result<Status, ControllerError> {
        let pid = self.pid().ok_or(ControllerError::NotRunning)?;
        let pc = ptrace::get_pc(pid)?;
        let had_breakpoint = self.breakpoint_enabled_at(pc);
        if had_breakpoint {
            self.breakpoints.get_mut(&pc).unwrap().disable(pid)?;
        }
        ptrace::single_step(pid)?;
        let status = self.dispatch_wait()?;
        if had_breakpoint {
            if let Some(bp) = self.breakpoints.get_mut(&pc) {
                bp.enable(pid)?;
            }
        }
        Ok(status)
    }

    /// Blocks on `waitpid` and multiplexes the result. The sole caller of
    /// `waitpid` in the controller — every resume is followed by exactly
    /// one call here.
    fn dispatch_wait(&mut self) -> Result<Status, ControllerError> {
        let pid = self.pid().ok_or(ControllerError::NotRunning)?;
        let wait_status = waitpid(pid, None).map_err(ControllerError::Trace)?;
        match wait_status {
            WaitStatus::Exited(_, code) => {
                println!("Child exited (status {})", code);
                self.reset();
                Ok(Status::Exited(code))
            }
            WaitStatus::Signaled(_, sig, _) => {
                println!("Child terminated (signal {})", sig);
                self.reset();
                Ok(Status::Signaled(sig))
            }
            WaitStatus::Stopped(_, Signal::SIGTRAP) => {
                let info = ptrace::get_siginfo(pid)?;
                if ptrace::is_breakpoint_trap(&info) {
                    let raw_pc = ptrace::get_pc(pid)?;
                    let bp_addr = raw_pc - 1;
                    ptrace::set_pc(pid, bp_addr)?;
                    if let Some(cursor) = self.debug_data.line_at(bp_addr) {
                        source::print_window(cursor.file(), cursor.line(), 0);
                    }
                    Ok(Status::Stopped { pc: bp_addr, breakpoint_hit: true })
                } else {
                    let pc = ptrace::get_pc(pid)?;
                    Ok(Status::Stopped { pc, breakpoint_hit: false })
                }
            }
            WaitStatus::Stopped(_, sig) => {
                self.pending_signal = Some(sig);
                println!("Child received signal {}", sig);
                let pc = ptrace::get_pc(pid)?;
                Ok(Status::Stopped { pc, breakpoint_hit: false })
            }
            other => unreachable!("waitpid returned an unexpected status: {:?}", other),
        }
    }

    /// Source-line stepping: plants transient breakpoints at every other
    /// line address in the enclosing function plus the return address,
    /// advances per `policy`, then tears the transients down. Degrades
    /// to return-address-only continuation if there's no debug info for
    /// the current pc at all.
    fn step_line(&mut self, policy: StepPolicy) -> Result<Status, ControllerError> {
        if !self.running {
            return Err(ControllerError::NotRunning);
        }
        let pid = self.pid().unwrap();
        let pc = ptrace::get_pc(pid)?;

        let Some(func) = self.debug_data.enclosing_subprogram(pc).cloned() else {
            return self.continue_to_return_address();
        };

        let current_line_addr = self.debug_data.line_at(pc).map(|c| c.address());

        let mut line_addrs = Vec::new();
        if let Some(mut cursor) = self.debug_data.line_at(func.low_pc) {
            loop {
                let addr = cursor.address();
                if addr >= func.high_pc {
                    break;
                }
                line_addrs.push(addr);
                if !cursor.advance() {
                    break;
                }
            }
        }

        // Guaranteed release below runs regardless of whether planting or
        // advancing errors out partway; the removal set must never leak.
        let mut removed = Vec::new();
        let plant_result = self.plant_transients(&line_addrs, current_line_addr, &func, &mut removed);
        let outcome = match plant_result {
            Ok(()) => match policy {
                StepPolicy::Over => self.continue_execute(),
                StepPolicy::Into => self.step_into(current_line_addr),
            },
            Err(e) => Err(e),
        };
        self.remove_transients(&removed, pid);
        outcome
    }

    fn plant_transients(
        &mut self,
        line_addrs: &[usize],
        current_line_addr: Option<usize>,
        func: &Function,
        removed: &mut Vec<usize>,
    ) -> Result<(), ControllerError> {
        for &addr in line_addrs {
            if Some(addr) != current_line_addr && !self.breakpoints.contains_key(&addr) {
                self.set_breakpoint_at_addr(addr)?;
                removed.push(addr);
            }
        }
        if func.name != "main" {
            let ret = self.return_address()?;
            if !self.breakpoints.contains_key(&ret) {
                self.set_breakpoint_at_addr(ret)?;
                removed.push(ret);
            }
        }
        Ok(())
    }

    /// Return-address-only strategy, used both when stepping has no
    /// enclosing-subprogram debug info at all and when the step-in loop
    /// walks into code with none mid-step.
    fn continue_to_return_address(&mut self) -> Result<Status, ControllerError> {
        let pid = self.pid().ok_or(ControllerError::NotRunning)?;
        let ret = self.return_address()?;
        let mut removed = Vec::new();
        if !self.breakpoints.contains_key(&ret) {
            self.set_breakpoint_at_addr(ret)?;
            removed.push(ret);
        }
        let outcome = self.continue_execute();
        self.remove_transients(&removed, pid);
        outcome
    }

    /// Step-in's instruction loop: single-step until the current pc maps
    /// to a different line record than `current_line_addr`, printing the
    /// new source line before returning.
    fn step_into(&mut self, current_line_addr: Option<usize>) -> Result<Status, ControllerError> {
        loop {
            let status = self.step_instruction()?;
            match status {
                Status::Stopped { pc, .. } => match self.debug_data.line_at(pc) {
                    Some(cursor) if Some(cursor.address()) != current_line_addr => {
                        source::print_window(cursor.file(), cursor.line(), 0);
                        return Ok(status);
                    }
                    Some(_) => continue,
                    None => return self.continue_execute(),
                },
                terminal => return Ok(terminal),
            }
        }
    }

    fn remove_transients(&mut self, addrs: &[usize], pid: Pid) {
        for &addr in addrs {
            if let Some(bp) = self.breakpoints.get_mut(&addr) {
                if bp.enabled() {
                    let _ = bp.disable(pid);
                }
            }
            self.breakpoints.remove(&addr);
        }
    }

    fn return_address(&self) -> Result<usize, ControllerError> {
        let pid = self.pid().ok_or(ControllerError::NotRunning)?;
        let fp = ptrace::get_frame_pointer(pid)?;
        let val = ptrace::peek(pid, fp + 8)?;
        Ok(val as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf_data::DwarfData;

    fn empty_inferior() -> Inferior {
        // `/bin/true` is universally present and unlikely to carry DWARF
        // info; either way these tests only exercise the pending set and
        // registry bookkeeping, never the debug-info index itself.
        let debug_data = DwarfData::from_file("/bin/true").expect("/bin/true should parse as an object file");
        Inferior::new("/bin/true", debug_data)
    }

    #[test]
    fn registry_is_empty_before_any_run() {
        let inferior = empty_inferior();
        assert!(!inferior.running());
        assert!(inferior.breakpoints.is_empty());
    }

    #[test]
    fn set_breakpoint_before_run_only_adds_to_pending() {
        let mut inferior = empty_inferior();
        inferior.set_breakpoint_at_addr(0x4011a0).unwrap();
        assert!(inferior.pending.contains(&0x4011a0));
        assert!(inferior.breakpoints.is_empty());
    }

    #[test]
    fn reset_clears_registry_but_keeps_pending() {
        let mut inferior = empty_inferior();
        inferior.set_breakpoint_at_addr(0x1000).unwrap();
        inferior.breakpoints.insert(0x2000, Breakpoint::new(0x2000));
        inferior.running = true;

        inferior.reset();

        assert!(!inferior.running());
        assert!(inferior.breakpoints.is_empty());
        assert!(inferior.pending.contains(&0x1000));
    }
}
