//! Line-oriented console for driving the host from a terminal.
//!
//! Plain text is a prompt; lines starting with `/` are commands. Lines are
//! read on a background thread and handed to the frame loop over a channel.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use crate::core::logging::{debug, error};

pub const HELP: &str = "\
Type a prompt and press return to dream up a new sketch.
  /idea N     follow suggestion N (1-based)
  /reboot     back to the default sketch with a fresh conversation
  /load NAME  run a saved unit or built-in program
  /list       list saved units and built-in programs
  /help       show this help
  /quit       exit
Window shortcuts: Ctrl+R reboot, Ctrl+1..4 follow a suggestion.";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShellCommand {
    Prompt(String),
    /// Zero-based.
    Idea(usize),
    Reboot,
    Load(String),
    List,
    Help,
    Quit,
}

/// `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(ShellCommand::Prompt(line.to_string())));
    };

    let (command, arg) = match rest.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (rest, ""),
    };

    let parsed = match command {
        "idea" => {
            let n = arg
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    format!("/idea expects a number, got {:?}", arg)
                })?;
            ShellCommand::Idea(n - 1)
        }
        "reboot" => ShellCommand::Reboot,
        "load" if !arg.is_empty() => ShellCommand::Load(arg.to_string()),
        "load" => return Err("/load expects a unit name".to_string()),
        "list" | "ls" => ShellCommand::List,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command /{}; try /help", other)),
    };

    Ok(Some(parsed))
}

/// Starts reading stdin. The receiver disconnects at end of input.
pub fn spawn_reader() -> Receiver<ShellCommand> {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("reverie-shell".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        error!("Error reading console input: {}", err);
                        break;
                    }
                };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", message),
                }
            }
            debug!("Console input closed");
        });

    if let Err(err) = spawned {
        error!("Unable to start console: {}", err);
    }

    rx
}
