//! Blocking subprocess execution with a per-call timeout. Every external
//! driver (`tmux`, `git`, container runtime, `gh`) funnels through here so
//! timeout handling and stdout/stderr capture live in one place.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use agenttree_core::{Error, Result};
use wait_timeout::ChildExt;

pub struct Output {
    pub status_success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Drain a pipe into a `String` on its own thread so a chatty child can't
/// fill the OS pipe buffer and block on write while we're blocked on
/// `wait_timeout` below — the classic `wait`-before-`read` deadlock.
fn drain(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

/// Run `program args...` with `timeout`. On timeout the child is killed and
/// a `Transient` error is returned (the caller's own timeout contract
/// decides whether that becomes fatal).
pub fn run(program: &str, args: &[&str], cwd: Option<&std::path::Path>, timeout: Duration) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Transient(format!("failed to spawn {program}: {e}")))?;

    let stdout_handle = child.stdout.take().map(drain);
    let stderr_handle = child.stderr.take().map(drain);

    let wait_result = child
        .wait_timeout(timeout)
        .map_err(|e| Error::Transient(format!("error waiting on {program}: {e}")));

    let status = match wait_result {
        Ok(Some(status)) => Some(status),
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            None
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.map(|h| h.join());
            let _ = stderr_handle.map(|h| h.join());
            return Err(e);
        }
    };

    let stdout = stdout_handle.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
    let stderr = stderr_handle.map(|h| h.join().unwrap_or_default()).unwrap_or_default();

    match status {
        Some(status) => Ok(Output { status_success: status.success(), stdout, stderr }),
        None => Err(Error::Transient(format!("{program} timed out after {timeout:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_on_success() {
        let out = run("echo", &["hello"], None, Duration::from_secs(5)).unwrap();
        assert!(out.status_success);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn reports_failure_status() {
        let out = run("false", &[], None, Duration::from_secs(5)).unwrap();
        assert!(!out.status_success);
    }

    #[test]
    fn kills_on_timeout() {
        let err = run("sleep", &["5"], None, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
    }
}
