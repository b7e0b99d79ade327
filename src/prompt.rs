//! Interactive approval prompt.
//!
//! The executor only consumes a yes/no decision; this module renders the
//! question on a TTY. Off a TTY the gate denies, which leaves the action
//! SKIPPED rather than silently destructive.

use port_warden::error::Result;
use port_warden::resolution::{ApprovalGate, ResolutionAction};
use std::io::{stdin, stdout, IsTerminal, Write};

pub struct PromptGate;

impl ApprovalGate for PromptGate {
    fn approve(&self, action: &ResolutionAction) -> Result<bool> {
        if !is_interactive() {
            return Ok(false);
        }
        prompt_user(action)
    }
}

/// Check if running in an interactive TTY.
fn is_interactive() -> bool {
    if std::env::var_os("PORT_WARDEN_NON_INTERACTIVE").is_some() {
        return false;
    }
    // Cargo test binaries run from target/*/deps/ — never interactive
    if let Ok(exe) = std::env::current_exe() {
        if let Some(path) = exe.to_str() {
            if path.contains("/deps/") || path.contains("\\deps\\") {
                return false;
            }
        }
    }
    stdin().is_terminal() && stdout().is_terminal()
}

fn prompt_user(action: &ResolutionAction) -> Result<bool> {
    println!();
    println!(
        "About to {} [risk: {}{}]",
        action.describe(),
        action.risk,
        if action.reversible { ", reversible" } else { "" }
    );
    if let Some(occupants) = &action.conflict.occupants {
        for process in &occupants.processes {
            println!("  PID:     {}", process.pid);
            println!("  Process: {}", process.name);
            if let Some(ref cmd) = process.command {
                println!("  Command: {}", cmd);
            }
        }
        for container in &occupants.containers {
            println!("  Container: {}", container.name);
        }
    }
    println!();
    println!("  [y] Execute this action");
    println!("  [n] Skip it");
    println!("  [Esc/q] Skip it");
    println!();
    print!("Your choice: ");
    stdout().flush().ok();

    loop {
        use crossterm::event::{read, Event, KeyCode, KeyEvent};

        if let Ok(Event::Key(KeyEvent { code, .. })) = read() {
            match code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    println!("y");
                    return Ok(true);
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Char('q') | KeyCode::Esc => {
                    println!("n");
                    return Ok(false);
                }
                _ => {
                    // Invalid input, continue waiting
                }
            }
        }
    }
}
