//! Error kinds, grouped by origin and by how the REPL should react to them.

use thiserror::Error;

/// Errors that abort the whole REPL session (fork/launch failures). These
/// surface to the outermost REPL loop and terminate it.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("fork failed: {0}")]
    ForkFailed(#[source] nix::Error),

    #[error("launch failed: child exited before reaching its post-exec stop")]
    LaunchFailed,
}

/// Errors from a single controller operation (breakpoint install, resume,
/// wait, register access). These wrap the underlying `ptrace`/`waitpid`
/// failure; policy for each call site decides whether to propagate,
/// degrade, or ignore.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("ptrace/wait operation failed: {0}")]
    Trace(#[from] nix::Error),

    #[error("no inferior is running")]
    NotRunning,
}

/// Failures loading or querying the DWARF debug-info index.
#[derive(Debug, Error)]
pub enum DwarfError {
    #[error("could not open file")]
    ErrorOpeningFile,

    #[error("could not parse debugging symbols: {0}")]
    DwarfFormatError(#[from] gimli::Error),

    #[error("could not parse executable: {0}")]
    ObjectFormatError(#[from] object::Error),
}

/// Raised by debug-info lookups that find nothing; distinct from
/// `DwarfError` (load-time) because it is recovered locally rather than
/// surfaced to the REPL as fatal.
#[derive(Debug, Error)]
#[error("no debug information")]
pub struct NoDebugInformation;
