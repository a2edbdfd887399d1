//! Interactive control REPL
//!
//! Lines are parsed into [`ReplCommand`]s on a blocking thread and handed to
//! the main loop, which owns every service.

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::debug;

/// A parsed REPL command, indices are 0-based like the status output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    List,
    Open(usize),
    Next,
    Prev,
    Add {
        name: String,
        file: String,
        program: Option<String>,
    },
    Insert {
        index: usize,
        name: String,
        file: String,
    },
    Set {
        index: usize,
        name: String,
        file: String,
    },
    Delete(usize),
    Up(usize),
    Down(usize),
    /// Set or clear the listen signature of an entry
    Listen(usize, Option<String>),
    /// Set, auto-assign (`None`) or clear (`Some("")`) the send signature
    Send(usize, Option<String>),
    Sig,
    Status,
    Pause,
    Resume,
    Reload,
    Reset,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands (quote arguments containing spaces):
  list                          show the playlist
  open <n>                      open entry n
  next | prev                   open the next / previous entry
  add <name> <file> [program]   append an entry
  insert <n> <name> <file>      insert before entry n
  set <n> <name> <file>         overwrite entry n
  delete <n>                    remove entry n
  up <n> | down <n>             move entry n
  listen <n> <signature|none>   MIDI signature that opens entry n
  send <n> [signature|none]     signature sent when entry n opens (auto if omitted)
  sig                           show an unused send signature
  status                        show status messages and automations
  pause | resume                deactivate / reactivate all automations
  reload                        reload playlist and automations from disk
  reset                         forget the current position
  quit                          exit";

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let tokens = tokenize(line)?;
        let Some((verb, args)) = tokens.split_first() else {
            return Err("empty command".into());
        };

        let index = |i: usize| -> Result<usize, String> {
            let raw = args.get(i).ok_or_else(|| format!("{}: missing index", verb))?;
            raw.parse()
                .map_err(|_| format!("{}: '{}' is not an index", verb, raw))
        };
        let text = |i: usize, what: &str| -> Result<String, String> {
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{}: missing {}", verb, what))
        };
        let optional_signature = |i: usize| -> Option<String> {
            args.get(i).map(|s| {
                if s.eq_ignore_ascii_case("none") {
                    String::new()
                } else {
                    s.clone()
                }
            })
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "list" | "ls" => ReplCommand::List,
            "open" => ReplCommand::Open(index(0)?),
            "next" => ReplCommand::Next,
            "prev" | "previous" => ReplCommand::Prev,
            "add" => ReplCommand::Add {
                name: text(0, "name")?,
                file: text(1, "file")?,
                program: args.get(2).cloned(),
            },
            "insert" => ReplCommand::Insert {
                index: index(0)?,
                name: text(1, "name")?,
                file: text(2, "file")?,
            },
            "set" => ReplCommand::Set {
                index: index(0)?,
                name: text(1, "name")?,
                file: text(2, "file")?,
            },
            "delete" | "rm" => ReplCommand::Delete(index(0)?),
            "up" => ReplCommand::Up(index(0)?),
            "down" => ReplCommand::Down(index(0)?),
            "listen" => {
                let sig = optional_signature(1)
                    .ok_or_else(|| "listen: missing signature".to_string())?;
                ReplCommand::Listen(index(0)?, Some(sig).filter(|s| !s.is_empty()))
            }
            "send" => ReplCommand::Send(index(0)?, optional_signature(1)),
            "sig" => ReplCommand::Sig,
            "status" => ReplCommand::Status,
            "pause" => ReplCommand::Pause,
            "resume" => ReplCommand::Resume,
            "reload" => ReplCommand::Reload,
            "reset" => ReplCommand::Reset,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" => ReplCommand::Quit,
            other => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(command)
    }
}

/// Split on whitespace, double quotes group words
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err("unterminated quote".into());
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Read commands on a blocking thread until `quit`, EOF or the receiver is gone
pub fn spawn_repl(tx: mpsc::Sender<ReplCommand>) -> tokio::task::JoinHandle<Result<()>> {
    tokio::task::spawn_blocking(move || {
        let mut rl = DefaultEditor::new()?;
        println!("Type 'help' for commands.");

        loop {
            let line = match rl.readline("automator> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    let _ = tx.blocking_send(ReplCommand::Quit);
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            if line.trim().is_empty() {
                continue;
            }
            let _ = rl.add_history_entry(line.as_str());

            match ReplCommand::parse(&line) {
                Ok(ReplCommand::Help) => println!("{}", HELP),
                Ok(command) => {
                    let quit = command == ReplCommand::Quit;
                    if tx.blocking_send(command).is_err() || quit {
                        break;
                    }
                }
                Err(e) => println!("{}", e),
            }
        }

        debug!("REPL closed");
        Ok(())
    })
}
