//! Argv parsing for the debugger binary.

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(about = "A minimalist source-level debugger for x86-64 Linux executables")]
pub struct CmdOptions {
    /// Path to the executable to debug.
    pub program: String,
}
