//! Multiplexer driver (spec §4.12), sync-ified from the teacher's
//! `supervisor::tmux` module: blocking `std::process::Command` calls with
//! a per-call timeout instead of tokio, per the "no async/await" design
//! note.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use agenttree_core::{Error, Result};

use crate::exec;

const TMUX_TIMEOUT: Duration = Duration::from_secs(10);

fn run_tmux(args: &[&str]) -> Result<String> {
    let out = exec::run("tmux", args, None, TMUX_TIMEOUT)?;
    if out.status_success {
        Ok(out.stdout)
    } else {
        Err(Error::Transient(format!("tmux error: {}", out.stderr.trim())))
    }
}

pub fn session_exists(name: &str) -> bool {
    run_tmux(&["has-session", "-t", name]).is_ok()
}

pub fn create_session(name: &str, cwd: &Path, start_command: Option<&str>) -> Result<()> {
    let cwd_str = cwd.to_string_lossy().into_owned();
    let mut args = vec!["new-session", "-d", "-s", name, "-c", cwd_str.as_str()];
    if let Some(cmd) = start_command {
        args.push(cmd);
    }
    run_tmux(&args).map(|_| ())
}

pub fn kill_session(name: &str) -> Result<()> {
    if !session_exists(name) {
        return Ok(());
    }
    run_tmux(&["kill-session", "-t", name]).map(|_| ())
}

pub struct SessionInfo {
    pub name: String,
    pub windows: u32,
    pub attached: bool,
}

pub fn list_sessions() -> Result<Vec<SessionInfo>> {
    match run_tmux(&["list-sessions", "-F", "#{session_name}|#{session_windows}|#{session_attached}"]) {
        Ok(out) => Ok(out
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, '|');
                let name = parts.next()?.to_string();
                let windows = parts.next()?.parse().unwrap_or(1);
                let attached = parts.next()? != "0";
                Some(SessionInfo { name, windows, attached })
            })
            .collect()),
        Err(Error::Transient(msg)) if msg.contains("no server running") => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

pub fn capture_pane(name: &str, lines: u32) -> Result<String> {
    run_tmux(&["capture-pane", "-t", name, "-p", "-S", &format!("-{lines}")])
}

/// Send text literally (no shell interpretation), optionally preceded by
/// an interrupt and followed by Enter after a settle delay.
pub fn send_keys(name: &str, text: &str, submit: bool, interrupt: bool) -> Result<()> {
    if interrupt {
        run_tmux(&["send-keys", "-t", name, "C-c"])?;
        thread::sleep(Duration::from_millis(100));
    }
    run_tmux(&["send-keys", "-t", name, "-l", text])?;
    if submit {
        thread::sleep(Duration::from_millis(100));
        run_tmux(&["send-keys", "-t", name, "Enter"])?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Sent,
    NoSession,
    ToolExited,
    Error,
}

/// `send_keys` wrapped with the session/tool liveness checks callers use
/// to decide whether an automatic restart-then-retry is warranted.
pub fn send_message(name: &str, text: &str, interrupt: bool, check_tool_running: bool) -> SendResult {
    if !session_exists(name) {
        return SendResult::NoSession;
    }
    if check_tool_running {
        if let Ok(pane) = capture_pane(name, 5) {
            if pane.trim().is_empty() {
                return SendResult::ToolExited;
            }
        }
    }
    match send_keys(name, text, true, interrupt) {
        Ok(()) => SendResult::Sent,
        Err(_) => SendResult::Error,
    }
}

/// Poll the pane for `prompt_char` until it appears or `timeout` elapses.
pub fn wait_for_prompt(name: &str, prompt_char: char, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(pane) = capture_pane(name, 20) {
            if pane.contains(prompt_char) {
                return true;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(poll);
    }
}

pub fn save_history_to_file(name: &str, path: &Path, stage: &str) -> Result<()> {
    let history = capture_pane(name, 100_000)?;
    let annotated = format!("=== {stage} ===\n{history}\n");
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(annotated.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_session_reports_absent() {
        assert!(!session_exists("agenttree-test-does-not-exist-zzz"));
    }

    #[test]
    fn send_message_to_missing_session_is_no_session() {
        assert_eq!(send_message("agenttree-test-does-not-exist-zzz", "hi", false, false), SendResult::NoSession);
    }
}
