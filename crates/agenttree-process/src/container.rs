//! Container driver (spec §4.13). Ported from `ContainerRuntime`
//! (`original_source/agenttree/container.py`) with one deliberate policy
//! change: `ANTHROPIC_API_KEY` is never forwarded into agent containers,
//! only `CLAUDE_CODE_OAUTH_TOKEN` (see DESIGN.md).

use std::path::Path;
use std::time::Duration;

use agenttree_core::{Error, Result};

use crate::exec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    AppleContainer,
    Docker,
    Podman,
}

impl Runtime {
    pub fn binary(&self) -> &'static str {
        match self {
            Runtime::AppleContainer => "container",
            Runtime::Docker => "docker",
            Runtime::Podman => "podman",
        }
    }

    /// Apple's `container` assigns container UUIDs asynchronously after
    /// `run`, unlike Docker/Podman which accept a deterministic `--name`.
    pub fn assigns_uuid_async(&self) -> bool {
        matches!(self, Runtime::AppleContainer)
    }
}

/// Probe `$PATH` in order: `container` (macOS 26+) -> `docker` -> `podman`.
pub fn detect_runtime() -> Option<Runtime> {
    if which::which("container").is_ok() {
        Some(Runtime::AppleContainer)
    } else if which::which("docker").is_ok() {
        Some(Runtime::Docker)
    } else if which::which("podman").is_ok() {
        Some(Runtime::Podman)
    } else {
        None
    }
}

pub fn is_available() -> bool {
    detect_runtime().is_some()
}

pub fn get_runtime_name() -> &'static str {
    match detect_runtime() {
        Some(rt) => rt.binary(),
        None => "none",
    }
}

pub fn get_recommended_action() -> &'static str {
    if cfg!(target_os = "macos") {
        "Upgrade to macOS 26+ for Apple Container (recommended)\nOr install Docker: brew install docker"
    } else if cfg!(target_os = "linux") {
        "Install Docker: sudo apt install docker.io\nOr install Podman: sudo apt install podman"
    } else if cfg!(target_os = "windows") {
        "Install Docker Desktop or use WSL2 with Docker"
    } else {
        "Install Docker or a compatible container runtime"
    }
}

pub struct RunCommandOptions<'a> {
    pub dangerous: bool,
    pub image: &'a str,
    pub additional_args: Vec<String>,
    pub port: Option<u16>,
    pub role: &'a str,
    pub issue_id: &'a str,
    pub container_name: &'a str,
    pub claude_config_dir: Option<&'a Path>,
    pub oauth_token: Option<&'a str>,
}

/// Build the argv list for `runtime run ...`. Never includes
/// `ANTHROPIC_API_KEY`: agent containers authenticate with a
/// subscription/OAuth token only.
pub fn build_run_command(runtime: Runtime, worktree: &Path, tool: &str, opts: &RunCommandOptions) -> Vec<String> {
    let abs_path = worktree.to_string_lossy().into_owned();

    let mut cmd = vec![
        runtime.binary().to_string(),
        "run".to_string(),
        "-it".to_string(),
        "--name".to_string(),
        opts.container_name.to_string(),
        "-v".to_string(),
        format!("{abs_path}:/workspace"),
        "-w".to_string(),
        "/workspace".to_string(),
    ];

    if let Some(claude_dir) = opts.claude_config_dir {
        if claude_dir.exists() {
            cmd.push("-v".to_string());
            cmd.push(format!("{}:/home/agent/.claude", claude_dir.display()));
        }
    }

    if let Some(token) = opts.oauth_token {
        cmd.push("-e".to_string());
        cmd.push(format!("CLAUDE_CODE_OAUTH_TOKEN={token}"));
    }

    cmd.push("-e".to_string());
    cmd.push("AGENTTREE_CONTAINER=1".to_string());
    cmd.push("-e".to_string());
    cmd.push(format!("AGENTTREE_ROLE={}", opts.role));
    cmd.push("-e".to_string());
    cmd.push(format!("AGENTTREE_ISSUE_ID={}", opts.issue_id));

    if let Some(port) = opts.port {
        cmd.push("-e".to_string());
        cmd.push(format!("PORT={port}"));
        cmd.push("-p".to_string());
        cmd.push(format!("{port}:{port}"));
    }

    cmd.extend(opts.additional_args.iter().cloned());

    cmd.push(opts.image.to_string());
    cmd.push(tool.to_string());
    if opts.dangerous {
        cmd.push("--dangerously-skip-permissions".to_string());
    }

    cmd
}

const CONTAINER_TIMEOUT: Duration = Duration::from_secs(30);

pub fn stop_container(runtime: Runtime, container_ref: &str) -> Result<()> {
    let out = exec::run(runtime.binary(), &["stop", container_ref], None, CONTAINER_TIMEOUT)?;
    if out.status_success {
        Ok(())
    } else {
        Err(Error::Transient(format!("failed to stop container {container_ref}: {}", out.stderr.trim())))
    }
}

pub fn remove_container(runtime: Runtime, container_ref: &str) -> Result<()> {
    let out = exec::run(runtime.binary(), &["rm", "-f", container_ref], None, CONTAINER_TIMEOUT)?;
    if out.status_success || out.stderr.contains("No such container") {
        Ok(())
    } else {
        Err(Error::Transient(format!("failed to remove container {container_ref}: {}", out.stderr.trim())))
    }
}

/// Find a running container whose mount source matches `worktree`, for
/// runtimes (Apple's `container`) that assign UUIDs asynchronously.
pub fn find_by_worktree_mount(runtime: Runtime, worktree: &Path) -> Result<Option<String>> {
    let out = exec::run(runtime.binary(), &["ps", "--format", "json"], None, CONTAINER_TIMEOUT)?;
    if !out.status_success {
        return Ok(None);
    }
    let needle = worktree.to_string_lossy();
    for line in out.stdout.lines() {
        if line.contains(needle.as_ref()) {
            if let Some(id) = extract_json_field(line, "id").or_else(|| extract_json_field(line, "ID")) {
                return Ok(Some(id));
            }
        }
    }
    Ok(None)
}

fn extract_json_field(line: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\":\"");
    let start = line.find(&needle)? + needle.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_never_includes_api_key_env() {
        let opts = RunCommandOptions {
            dangerous: false,
            image: "agenttree-agent:latest",
            additional_args: vec![],
            port: Some(9007),
            role: "developer",
            issue_id: "007",
            container_name: "agenttree-developer-007",
            claude_config_dir: None,
            oauth_token: Some("oauth-token-value"),
        };
        let cmd = build_run_command(Runtime::Docker, Path::new("/tmp/worktree"), "claude", &opts);
        assert!(cmd.iter().all(|arg| !arg.contains("ANTHROPIC_API_KEY")));
        assert!(cmd.iter().any(|arg| arg.contains("CLAUDE_CODE_OAUTH_TOKEN")));
    }

    #[test]
    fn run_command_appends_dangerous_flag() {
        let opts = RunCommandOptions {
            dangerous: true,
            image: "img",
            additional_args: vec![],
            port: None,
            role: "developer",
            issue_id: "001",
            container_name: "c",
            claude_config_dir: None,
            oauth_token: None,
        };
        let cmd = build_run_command(Runtime::Docker, Path::new("/tmp/w"), "claude", &opts);
        assert_eq!(cmd.last().unwrap(), "--dangerously-skip-permissions");
    }

    #[test]
    fn run_command_exposes_deterministic_port() {
        let opts = RunCommandOptions {
            dangerous: false,
            image: "img",
            additional_args: vec![],
            port: Some(9007),
            role: "developer",
            issue_id: "007",
            container_name: "c",
            claude_config_dir: None,
            oauth_token: None,
        };
        let cmd = build_run_command(Runtime::Docker, Path::new("/tmp/w"), "claude", &opts);
        assert!(cmd.windows(2).any(|w| w == ["-p".to_string(), "9007:9007".to_string()]));
    }
}
