//! The REPL. Reads a line, tokenizes it, and hands it to the command
//! dispatcher; owns nothing the dispatcher or controller need. Empty
//! input is passed through to the dispatcher rather than skipped, so that
//! bare-enter repetition is the dispatcher's call, not this loop's.

use rustyline::error::ReadlineError;
use rustyline::Editor;

use crate::command::Dispatcher;
use crate::inferior::Inferior;

const PROMPT: &str = "(bdb) ";

pub struct Debugger {
    history_path: String,
    readline: Editor<()>,
    dispatcher: Dispatcher,
    inferior: Inferior,
}

impl Debugger {
    pub fn new(inferior: Inferior) -> Debugger {
        let history_path = match std::env::var("HOME") {
            Ok(home) => format!("{}/.bdb_history", home),
            Err(_) => ".bdb_history".to_string(),
        };
        let mut readline = Editor::<()>::new().expect("failed to initialize line editor");
        let _ = readline.load_history(&history_path);

        Debugger {
            history_path,
            readline,
            dispatcher: Dispatcher::new(),
            inferior,
        }
    }

    /// Runs until `quit` or end-of-input. Returns the process exit code:
    /// 0 on a normal REPL exit.
    pub fn run(&mut self) -> i32 {
        loop {
            match self.readline.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        self.readline.add_history_entry(line.as_str());
                        if let Err(err) = self.readline.save_history(&self.history_path) {
                            log::warn!("failed to save history file at {}: {}", self.history_path, err);
                        }
                    }

                    let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
                    if tokens.first().map(String::as_str) == Some("quit") {
                        let _ = self.inferior.stop();
                        return 0;
                    }

                    if let Err(fatal) = self.dispatcher.dispatch(tokens, &mut self.inferior) {
                        eprintln!("{}", fatal);
                        return 1;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("Type \"quit\" to exit");
                }
                Err(ReadlineError::Eof) => {
                    let _ = self.inferior.stop();
                    return 0;
                }
                Err(err) => {
                    log::error!("unexpected I/O error reading a command: {:?}", err);
                    return 1;
                }
            }
        }
    }
}
