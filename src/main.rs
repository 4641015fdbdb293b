mod breakpoint;
mod cli;
mod command;
mod debugger;
mod dwarf_data;
mod error;
mod inferior;
mod ptrace;
mod source;

use clap::Parser;

use cli::CmdOptions;
use debugger::Debugger;
use dwarf_data::DwarfData;
use error::DwarfError;
use inferior::Inferior;

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let options = CmdOptions::parse();

    let debug_data = match DwarfData::from_file(&options.program) {
        Ok(data) => data,
        Err(DwarfError::ErrorOpeningFile) => {
            eprintln!("Could not open file {}", options.program);
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Could not parse {}: {}", options.program, err);
            std::process::exit(1);
        }
    };

    if debug_data.is_empty() {
        println!("No debug information found for {}", options.program);
    }
    debug_data.print_summary();

    let inferior = Inferior::new(&options.program, debug_data);
    let exit_code = Debugger::new(inferior).run();
    std::process::exit(exit_code);
}
