//! The command dispatcher: maps a parsed argument vector to a handler.
//! Sharing by composition, not inheritance — a command is a
//! `{long, short, help, invoke}` record, not a trait object hierarchy, and
//! the dispatcher passes the controller into `invoke` rather than holding
//! a reference to it.

use crate::error::{ControllerError, FatalError, NoDebugInformation};
use crate::inferior::Inferior;
use crate::source;

type Invoke = fn(&[String], &mut Inferior) -> Result<(), FatalError>;

pub struct CommandSpec {
    pub long: &'static str,
    pub short: &'static str,
    pub help: &'static str,
    invoke: Invoke,
}

/// Holds no state beyond the last-invoked arguments.
pub struct Dispatcher {
    commands: Vec<CommandSpec>,
    last_args: Option<Vec<String>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            commands: vec![
                CommandSpec {
                    long: "run",
                    short: "r",
                    help: "run [args...]     -- start (or restart) the inferior",
                    invoke: cmd_run,
                },
                CommandSpec {
                    long: "continue",
                    short: "c",
                    help: "continue          -- resume the stopped inferior",
                    invoke: cmd_continue,
                },
                CommandSpec {
                    long: "break",
                    short: "b",
                    help: "break <*addr|line|func> -- set a breakpoint",
                    invoke: cmd_break,
                },
                CommandSpec {
                    long: "list",
                    short: "l",
                    help: "list <func>       -- print source around a function",
                    invoke: cmd_list,
                },
                CommandSpec {
                    long: "step",
                    short: "s",
                    help: "step              -- step one source line, descending into calls",
                    invoke: cmd_step,
                },
                CommandSpec {
                    long: "next",
                    short: "n",
                    help: "next              -- step one source line, stepping over calls",
                    invoke: cmd_next,
                },
                CommandSpec {
                    long: "backtrace",
                    short: "bt",
                    help: "backtrace         -- print the call stack",
                    invoke: cmd_backtrace,
                },
            ],
            last_args: None,
        }
    }

    pub fn help_text(&self) -> String {
        self.commands
            .iter()
            .map(|c| format!("{} ({})\t{}", c.long, c.short, c.help))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Dispatches one already-tokenized line. Empty `tokens` repeats the
    /// last non-empty argument vector, or is a no-op if none exists yet.
    /// `quit` is handled by the caller, not here.
    pub fn dispatch(&mut self, tokens: Vec<String>, inferior: &mut Inferior) -> Result<(), FatalError> {
        let tokens = if tokens.is_empty() {
            match &self.last_args {
                Some(prev) => prev.clone(),
                None => return Ok(()),
            }
        } else {
            tokens
        };

        let Some((head, rest)) = tokens.split_first() else {
            return Ok(());
        };

        match self.commands.iter().find(|c| c.long == head || c.short == head) {
            Some(cmd) => {
                let invoke = cmd.invoke;
                self.last_args = Some(tokens.clone());
                invoke(rest, inferior)
            }
            None => {
                println!("no such command: {}", head);
                println!("{}", self.help_text());
                Ok(())
            }
        }
    }
}

/// Turns a controller error into REPL output, letting only lifecycle
/// (`Fatal`) errors bubble out to end the session.
fn report(result: Result<(), ControllerError>) -> Result<(), FatalError> {
    match result {
        Ok(()) => Ok(()),
        Err(ControllerError::Fatal(e)) => Err(e),
        Err(e) => {
            println!("{}", e);
            Ok(())
        }
    }
}

fn cmd_run(args: &[String], inferior: &mut Inferior) -> Result<(), FatalError> {
    if inferior.running() {
        let _ = inferior.stop();
    }
    report(inferior.start(args).map(|_| ()))
}

fn cmd_continue(_args: &[String], inferior: &mut Inferior) -> Result<(), FatalError> {
    if !inferior.running() {
        println!("the inferior is not running");
        return Ok(());
    }
    report(inferior.continue_execute().map(|_| ()))
}

/// `spec` is `*0xHEX`, a bare decimal line number, or a function name,
/// tried in that order.
fn cmd_break(args: &[String], inferior: &mut Inferior) -> Result<(), FatalError> {
    let Some(spec) = args.first() else {
        println!("usage: break <*addr|line|function>");
        return Ok(());
    };

    let addr = if let Some(hex) = spec.strip_prefix('*') {
        usize::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
    } else if let Ok(line) = spec.parse::<usize>() {
        inferior.debug_data().addr_for_line(line)
    } else {
        inferior.debug_data().function_entry(spec)
    };

    match addr {
        Some(addr) => report(inferior.set_breakpoint_at_addr(addr)),
        None => {
            println!("{}", NoDebugInformation);
            Ok(())
        }
    }
}

fn cmd_list(args: &[String], inferior: &mut Inferior) -> Result<(), FatalError> {
    let Some(name) = args.first() else {
        println!("usage: list <function>");
        return Ok(());
    };
    match inferior.debug_data().function_entry(name) {
        Some(addr) => match inferior.debug_data().line_at(addr) {
            Some(cursor) => source::print_window(cursor.file(), cursor.line(), 4),
            None => println!("{}", NoDebugInformation),
        },
        None => println!("{}", NoDebugInformation),
    }
    Ok(())
}

fn cmd_step(_args: &[String], inferior: &mut Inferior) -> Result<(), FatalError> {
    if !inferior.running() {
        println!("the inferior is not running");
        return Ok(());
    }
    report(inferior.step().map(|_| ()))
}

fn cmd_next(_args: &[String], inferior: &mut Inferior) -> Result<(), FatalError> {
    if !inferior.running() {
        println!("the inferior is not running");
        return Ok(());
    }
    report(inferior.next().map(|_| ()))
}

fn cmd_backtrace(_args: &[String], inferior: &mut Inferior) -> Result<(), FatalError> {
    if !inferior.running() {
        println!("the inferior is not running");
        return Ok(());
    }
    match inferior.backtrace() {
        Ok(frames) => {
            for frame in frames {
                println!("{}", frame);
            }
            Ok(())
        }
        Err(ControllerError::Fatal(e)) => Err(e),
        Err(e) => {
            println!("{}", e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf_data::DwarfData;

    fn inferior() -> Inferior {
        let debug_data = DwarfData::from_file("/bin/true").expect("/bin/true should parse as an object file");
        Inferior::new("/bin/true", debug_data)
    }

    #[test]
    fn bare_enter_with_no_history_is_a_no_op() {
        let mut dispatcher = Dispatcher::new();
        let mut inf = inferior();
        assert!(dispatcher.dispatch(vec![], &mut inf).is_ok());
    }

    #[test]
    fn bare_enter_repeats_last_command() {
        let mut dispatcher = Dispatcher::new();
        let mut inf = inferior();
        dispatcher
            .dispatch(vec!["list".to_string(), "main".to_string()], &mut inf)
            .unwrap();
        assert_eq!(dispatcher.last_args, Some(vec!["list".to_string(), "main".to_string()]));
        assert!(dispatcher.dispatch(vec![], &mut inf).is_ok());
    }

    #[test]
    fn short_name_resolves_to_same_command() {
        let mut dispatcher = Dispatcher::new();
        let mut inf = inferior();
        assert!(dispatcher.dispatch(vec!["c".to_string()], &mut inf).is_ok());
    }

    #[test]
    fn unknown_command_does_not_update_history() {
        let mut dispatcher = Dispatcher::new();
        let mut inf = inferior();
        dispatcher.dispatch(vec!["bogus".to_string()], &mut inf).unwrap();
        assert!(dispatcher.last_args.is_none());
    }
}
