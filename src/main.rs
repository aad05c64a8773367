//! `agenttree` — operator-grade harness for orchestrating multiple
//! long-running AI coding agents across isolated git worktrees and
//! containers.
//!
//! This binary is the thin CLI surface over the core engine
//! (`agenttree-core`/`-config`/`-store`/`-process`/`-hooks`/`-workflow`/
//! `-sync`): the TUI, HTTP/MCP adapters, remote SSH dispatch, and the
//! auto-merge monitor are separate, out-of-scope adapters and show up
//! below only as commands that report they're not implemented here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agenttree_config::Config;
use agenttree_core::{Error, Priority};
use agenttree_process::{multiplexer, preflight};
use agenttree_store::IssueStore;
use agenttree_workflow::{AdvanceOutcome, AdvanceRequest, Environment, Trigger};

#[derive(Parser)]
#[command(
    name = "agenttree",
    about = "Orchestrate long-running AI coding agents across isolated git worktrees and containers",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Path to the project repo root (defaults to the current directory).
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Path to the config file (defaults to `<repo>/.agenttree.yaml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a new `.agenttree.yaml` and empty `_agenttree/` store.
    Init,
    /// Run preflight checks (git repo, gh CLI, container runtime).
    Preflight,
    /// Issue CRUD.
    Issue {
        #[command(subcommand)]
        action: IssueAction,
    },
    /// Start (or resume) an agent session for an issue.
    Start {
        issue_id: String,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        dangerous: bool,
        #[arg(long)]
        skip_preflight: bool,
    },
    /// Stop an agent session for an issue.
    Stop {
        issue_id: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Stop every active agent session across all issues.
    StopAll,
    /// Attach to an issue's multiplexer pane (prints the last N lines).
    Attach {
        issue_id: String,
        #[arg(short = 'n', long, default_value_t = 100)]
        lines: u32,
    },
    /// Send a message to an issue's running agent.
    Send {
        issue_id: String,
        message: String,
        #[arg(long)]
        interrupt: bool,
    },
    /// Print an issue's captured pane output.
    Output {
        issue_id: String,
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: u32,
    },
    /// Advance an issue to the next stage in its flow (or an explicit target).
    Next {
        #[arg(long = "issue")]
        issue_id: String,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        reassess: bool,
    },
    /// Approve an issue sitting at a human-review stage, advancing it.
    Approve { issue_id: String },
    /// Defer an issue back to the backlog parking lot.
    Defer { issue_id: String },
    /// Move an issue straight to a named parking-lot stage.
    Shutdown { issue_id: String, target: String },
    /// Roll an issue back to an earlier stage.
    Rollback {
        issue_id: String,
        target: String,
        #[arg(long)]
        keep_changes: bool,
    },
    /// List issues stalled past the configured threshold.
    Stalls,
    /// Reconcile the issue store with its sidecar git remote.
    Sync {
        #[arg(long)]
        pull_only: bool,
        #[arg(long)]
        message: Option<String>,
    },
    /// Preview the hooks that would run for an issue's next transition.
    Hooks {
        #[command(subcommand)]
        action: HooksAction,
    },
    /// Tear down orphaned sessions/containers left by crashed agents.
    Cleanup,
    /// Not implemented here: the TUI presentation layer is an external adapter.
    Tui,
    /// Not implemented here: the HTTP/MCP server adapter is external.
    Server,
    /// Not implemented here: the HTTP/MCP server adapter is external.
    Mcp,
    /// Not implemented here: remote-host SSH dispatch is an external adapter.
    Remote,
    /// Not implemented here: requires a live PR; delegates to the github driver.
    AutoMerge { pr: u64 },
}

#[derive(Subcommand)]
enum IssueAction {
    Create {
        title: String,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long, default_value = "default")]
        flow: String,
        #[arg(long)]
        stage: Option<String>,
        #[arg(long = "dep")]
        dependencies: Vec<String>,
    },
    List {
        #[arg(long)]
        stage: Option<String>,
        #[arg(long)]
        priority: Option<String>,
    },
    Show {
        issue_id: String,
    },
    SetPriority {
        issue_id: String,
        priority: String,
    },
    CheckDeps {
        issue_id: String,
    },
}

#[derive(Subcommand)]
enum HooksAction {
    Check { issue_id: String },
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let repo_path = cli.repo.clone().unwrap_or_else(|| std::env::current_dir().expect("cwd"));
    let config_path = cli.config.clone().unwrap_or_else(|| repo_path.join(".agenttree.yaml"));

    if let Err(e) = run(&cli.command, &repo_path, &config_path) {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "agenttree=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn run(command: &Commands, repo_path: &Path, config_path: &Path) -> agenttree_core::Result<()> {
    match command {
        Commands::Init => cmd_init(repo_path, config_path),
        Commands::Preflight => cmd_preflight(repo_path),
        Commands::Tui | Commands::Server | Commands::Mcp | Commands::Remote => {
            println!("not implemented in this core: the TUI/HTTP/MCP/remote adapters live outside the engine");
            Ok(())
        }
        other => {
            let config = Config::load(config_path)?;
            let store_root = agenttree_store::paths::resolve_store_root(repo_path);
            let store = IssueStore::new(store_root);
            let env = Environment::new(&config, &store, repo_path, &config.project);
            run_with_env(other, &env)
        }
    }
}

fn cmd_init(repo_path: &Path, config_path: &Path) -> agenttree_core::Result<()> {
    if !config_path.exists() {
        let template = format!(
            "project: {}\nworktrees_dir: {}\nport_range: \"9000-9099\"\ndefault_tool: claude\ndefault_model: sonnet\nflows:\n  default: [explore, plan, implement, implement.review, accepted]\nstages:\n  explore:\n    role: developer\n    output: research.md\n  plan:\n    role: developer\n    output: spec.md\n    human_review: true\n  implement:\n    role: developer\n    output: code.md\n    substages:\n      review:\n        output: review.md\n  accepted:\n    role: manager\n    terminal: true\n  backlog:\n    role: manager\n    is_parking_lot: true\nroles:\n  developer:\n    container: true\n    tool: claude\n    model: sonnet\n  manager:\n    container: false\n    tool: claude\n    model: sonnet\n",
            repo_path.file_name().and_then(|n| n.to_str()).unwrap_or("agenttree-project"),
            repo_path.join("_agenttree-worktrees").display(),
        );
        std::fs::write(config_path, template)?;
        println!("wrote {}", config_path.display());
    } else {
        println!("{} already exists", config_path.display());
    }

    let store_root = agenttree_store::paths::resolve_store_root(repo_path);
    std::fs::create_dir_all(agenttree_store::paths::issues_dir(&store_root))?;
    std::fs::create_dir_all(agenttree_store::paths::sessions_dir(&store_root))?;
    std::fs::create_dir_all(agenttree_store::paths::templates_dir(&store_root))?;
    std::fs::create_dir_all(agenttree_store::paths::skills_dir(&store_root))?;
    println!("initialized store at {}", store_root.display());
    Ok(())
}

fn cmd_preflight(repo_path: &Path) -> agenttree_core::Result<()> {
    let (ok, results) = preflight::check_all(repo_path);
    for result in &results {
        let mark = if result.passed { "ok" } else if result.required { "FAIL" } else { "warn" };
        println!("[{mark}] {}: {}", result.name, result.description);
        if !result.passed {
            if let Some(fix) = result.fix_instructions {
                println!("       fix: {fix}");
            }
        }
    }
    if !ok {
        return Err(Error::PreflightError("required preflight checks failed".to_string()));
    }
    Ok(())
}

fn parse_priority(s: &str) -> agenttree_core::Result<Priority> {
    match s.to_lowercase().as_str() {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "critical" => Ok(Priority::Critical),
        other => Err(Error::validation(format!("'{other}' is not a priority (low|medium|high|critical)"))),
    }
}

fn run_with_env(command: &Commands, env: &Environment) -> agenttree_core::Result<()> {
    match command {
        Commands::Issue { action } => cmd_issue(env, action),
        Commands::Start { issue_id, force, dangerous, skip_preflight } => cmd_start(env, issue_id, *force, *dangerous, *skip_preflight),
        Commands::Stop { issue_id, role, all } => cmd_stop(env, issue_id, role.as_deref(), *all),
        Commands::StopAll => cmd_stop_all(env),
        Commands::Attach { issue_id, lines } => cmd_attach(env, issue_id, *lines),
        Commands::Send { issue_id, message, interrupt } => cmd_send(env, issue_id, message, *interrupt),
        Commands::Output { issue_id, lines } => cmd_output(env, issue_id, *lines),
        Commands::Next { issue_id, target, reassess } => cmd_next(env, issue_id, target.as_deref(), *reassess),
        Commands::Approve { issue_id } => cmd_next(env, issue_id, None, false),
        Commands::Defer { issue_id } => cmd_next(env, issue_id, Some("backlog"), false),
        Commands::Shutdown { issue_id, target } => cmd_next(env, issue_id, Some(target.as_str()), false),
        Commands::Rollback { issue_id, target, keep_changes } => cmd_rollback(env, issue_id, target, *keep_changes),
        Commands::Stalls => cmd_stalls(env),
        Commands::Sync { pull_only, message } => cmd_sync(env, *pull_only, message.as_deref()),
        Commands::Hooks { action } => cmd_hooks(env, action),
        Commands::Cleanup => cmd_cleanup(env),
        Commands::AutoMerge { pr } => cmd_auto_merge(env, *pr),
        Commands::Init | Commands::Preflight | Commands::Tui | Commands::Server | Commands::Mcp | Commands::Remote => unreachable!(),
    }
}

fn cmd_issue(env: &Environment, action: &IssueAction) -> agenttree_core::Result<()> {
    match action {
        IssueAction::Create { title, priority, flow, stage, dependencies } => {
            let priority = parse_priority(priority)?;
            let entry_stage = stage.clone().unwrap_or_else(|| env.config.flow_stage_names(flow).map(|s| s[0].clone()).unwrap_or_else(|_| "backlog".to_string()));
            let issue = env.store.create(title, priority, flow, &entry_stage, None, dependencies.clone())?;
            println!("created {} ({})", issue.id, issue.slug);
            Ok(())
        }
        IssueAction::List { stage, priority } => {
            let priority = priority.as_deref().map(parse_priority).transpose()?;
            for issue in env.store.list(stage.as_deref(), priority)? {
                println!("{}  {:<8} {:<20} {}", issue.id, issue.priority, issue.dot_path(), issue.title);
            }
            Ok(())
        }
        IssueAction::Show { issue_id } => {
            let issue = env.store.get(issue_id)?;
            let yaml = serde_yaml::to_string(&issue).map_err(Error::from)?;
            println!("{yaml}");
            Ok(())
        }
        IssueAction::SetPriority { issue_id, priority } => {
            let priority = parse_priority(priority)?;
            let issue = env.store.update_priority(issue_id, priority)?;
            println!("{} priority -> {}", issue.id, issue.priority);
            Ok(())
        }
        IssueAction::CheckDeps { issue_id } => {
            let issue = env.store.get(issue_id)?;
            let all = env.store.list(None, None)?;
            let accepted_stage = env.config.flow_stage_names(&issue.flow)?.last().cloned().unwrap_or_default();
            let ready = agenttree_workflow::is_ready(&issue, &all, &accepted_stage);
            println!("{}: {}", issue.id, if ready { "ready" } else { "blocked" });
            Ok(())
        }
    }
}

fn cmd_start(env: &Environment, issue_id: &str, force: bool, dangerous: bool, skip_preflight: bool) -> agenttree_core::Result<()> {
    let oauth_token = std::env::var("CLAUDE_CODE_OAUTH_TOKEN").ok();
    let claude_config_dir = dirs::home_dir().map(|h| h.join(".claude"));
    let req = agenttree_workflow::StartRequest {
        issue_id,
        dangerous,
        force,
        skip_preflight,
        oauth_token: oauth_token.as_deref(),
        claude_config_dir: claude_config_dir.as_deref(),
        prompt_timeout: Duration::from_secs(60),
    };
    let result = agenttree_workflow::start_agent_for_issue(env, &req)?;
    println!("started {} as role '{}' (session {}, port {})", result.issue_id, result.role, result.started.tmux_session, result.started.port);
    Ok(())
}

fn roles(env: &Environment) -> Vec<String> {
    env.config.roles.keys().cloned().collect()
}

fn cmd_stop(env: &Environment, issue_id: &str, role: Option<&str>, all: bool) -> agenttree_core::Result<()> {
    if all || role.is_none() {
        agenttree_process::stop_all_agents_for_issue(env.project, issue_id, &roles(env), env.store_root())?;
    } else if let Some(role) = role {
        agenttree_process::stop_agent(&agenttree_process::StopOptions { project: env.project, role, issue_id, store_root: env.store_root() })?;
    }
    println!("stopped {issue_id}");
    Ok(())
}

fn cmd_stop_all(env: &Environment) -> agenttree_core::Result<()> {
    for issue in env.store.list(None, None)? {
        agenttree_process::stop_all_agents_for_issue(env.project, &issue.id, &roles(env), env.store_root())?;
    }
    println!("stopped all active agents");
    Ok(())
}

fn session_for(env: &Environment, issue_id: &str) -> agenttree_core::Result<String> {
    let issue = env.store.get(issue_id)?;
    let role = env.config.role_for(&issue.dot_path()).unwrap_or("developer");
    Ok(agenttree_store::naming::multiplexer_session_name(env.project, role, &issue.id))
}

fn cmd_attach(env: &Environment, issue_id: &str, lines: u32) -> agenttree_core::Result<()> {
    let session = session_for(env, issue_id)?;
    let pane = multiplexer::capture_pane(&session, lines)?;
    println!("{pane}");
    Ok(())
}

/// Per spec §4.12, a `tool_exited` result is the caller's cue for an
/// automatic restart-then-retry: restart the agent (force, since the old
/// session/container are already dead) and resend the message once.
fn cmd_send(env: &Environment, issue_id: &str, message: &str, interrupt: bool) -> agenttree_core::Result<()> {
    let session = session_for(env, issue_id)?;
    match multiplexer::send_message(&session, message, interrupt, true) {
        multiplexer::SendResult::Sent => Ok(()),
        multiplexer::SendResult::NoSession => Err(Error::not_found(format!("session for {issue_id}"))),
        multiplexer::SendResult::ToolExited => {
            tracing::warn!(issue_id, "agent tool exited; restarting before retrying the send");
            cmd_start(env, issue_id, true, false, false)?;
            let session = session_for(env, issue_id)?;
            match multiplexer::send_message(&session, message, interrupt, false) {
                multiplexer::SendResult::Sent => Ok(()),
                multiplexer::SendResult::NoSession => Err(Error::not_found(format!("session for {issue_id}"))),
                multiplexer::SendResult::ToolExited | multiplexer::SendResult::Error => {
                    Err(Error::Transient(format!("restarted agent for {issue_id} but could not deliver the message")))
                }
            }
        }
        multiplexer::SendResult::Error => Err(Error::Transient(format!("could not send message to {issue_id}"))),
    }
}

fn cmd_output(env: &Environment, issue_id: &str, lines: u32) -> agenttree_core::Result<()> {
    let session = session_for(env, issue_id)?;
    let pane = multiplexer::capture_pane(&session, lines)?;
    println!("{pane}");
    Ok(())
}

fn cmd_next(env: &Environment, issue_id: &str, target: Option<&str>, reassess: bool) -> agenttree_core::Result<()> {
    if reassess {
        let issue = agenttree_workflow::reassess(env, issue_id)?;
        println!("{} reassessing at {}", issue.id, issue.dot_path());
        return Ok(());
    }

    let req = AdvanceRequest { issue_id: issue_id.to_string(), target: target.map(str::to_string), trigger: Trigger::Cli };
    match agenttree_workflow::advance(env, &req)? {
        AdvanceOutcome::Advanced { issue, previous_role, new_role } => {
            println!("{} advanced: {:?} -> {:?} ({})", issue.id, previous_role, new_role, issue.dot_path());
        }
        AdvanceOutcome::Reoriented(info) => {
            println!("{issue_id} re-oriented at {}", info.dot_path);
            if let Some(skill) = info.skill_path {
                println!("skill: {skill}");
            }
        }
        AdvanceOutcome::Unchanged(issue) => {
            println!("{} unchanged at {}", issue.id, issue.dot_path());
        }
    }
    Ok(())
}

fn cmd_rollback(env: &Environment, issue_id: &str, target: &str, keep_changes: bool) -> agenttree_core::Result<()> {
    let opts = agenttree_workflow::RollbackOptions { keep_changes, ..Default::default() };
    let issue = agenttree_workflow::rollback(env.config, env.store, env.project, &roles(env), env.repo_path, issue_id, target, &opts)?;
    println!("{} rolled back to {}", issue.id, issue.dot_path());
    Ok(())
}

fn cmd_stalls(env: &Environment) -> agenttree_core::Result<()> {
    let stalled = agenttree_sync::detect_stalls(env, chrono::Utc::now())?;
    if stalled.is_empty() {
        println!("no stalled issues");
    }
    for entry in stalled {
        println!("{}  {}  stalled {}m", entry.issue_id, entry.stage, entry.minutes_since_update);
    }
    Ok(())
}

fn cmd_sync(env: &Environment, pull_only: bool, message: Option<&str>) -> agenttree_core::Result<()> {
    let ok = agenttree_sync::sync(env.config, env.store, env.repo_path, pull_only, message)?;
    println!("sync {}", if ok { "completed" } else { "skipped (offline, no remote, or nothing to do)" });
    Ok(())
}

fn cmd_hooks(env: &Environment, action: &HooksAction) -> agenttree_core::Result<()> {
    match action {
        HooksAction::Check { issue_id } => {
            let issue = env.store.get(issue_id)?;
            let in_container = agenttree_process::detect::running_in_container();
            let next_dot_path = env.config.next_in_flow(&issue.flow, &issue.dot_path()).map(|(d, _)| d).unwrap_or_else(|_| issue.dot_path());
            for preview in agenttree_hooks::preview_hooks(env.config, &issue, &next_dot_path, in_container) {
                let skip = if preview.would_skip { " (skipped: host-only in container)" } else { "" };
                println!("[{}] {}{}", preview.phase, preview.hook.type_name(), skip);
            }
            Ok(())
        }
    }
}

fn cmd_cleanup(env: &Environment) -> agenttree_core::Result<()> {
    agenttree_sync::reconcile_state_file(env, &roles(env))?;
    println!("cleanup complete");
    Ok(())
}

fn cmd_auto_merge(env: &Environment, pr: u64) -> agenttree_core::Result<()> {
    agenttree_process::monitor_pr_and_auto_merge(env.repo_path, pr, true, Duration::from_secs(3600))?;
    println!("PR #{pr} merged");
    Ok(())
}
