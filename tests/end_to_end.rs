//! End-to-end scenarios spanning `agenttree-config`, `agenttree-store`,
//! and `agenttree-workflow` together, as opposed to each crate's own
//! unit tests which exercise one module in isolation.

use std::path::Path;

use agenttree_config::Config;
use agenttree_core::{Error, Priority};
use agenttree_store::{paths, session, IssueStore};
use agenttree_workflow::{
    advance, deps, rollback, AdvanceOutcome, AdvanceRequest, Environment, RollbackOptions, Trigger,
};

fn store_in(dir: &Path) -> IssueStore {
    std::fs::create_dir_all(dir.join("issues")).unwrap();
    std::fs::create_dir_all(dir.join("sessions")).unwrap();
    IssueStore::new(dir)
}

fn happy_path_config() -> Config {
    let yaml = r#"
project: demo
worktrees_dir: /tmp/worktrees
port_range: "9000-9099"
flows:
  default: [explore, plan, implement, implement.review, accepted]
stages:
  explore:
    role: developer
    output: research.md
    pre_completion:
      - type: file_exists
        file: research.md
  plan:
    role: developer
    output: spec.md
    human_review: true
    pre_completion:
      - type: section_check
        file: spec.md
        section: Approach
        expect: not_empty
  implement:
    role: developer
    output: code.md
    substages:
      review:
        output: review.md
    pre_completion:
      - type: has_commits
        optional: true
  accepted:
    role: manager
    terminal: true
    is_parking_lot: true
roles:
  developer:
    container: true
    tool: claude
    model: sonnet
  manager:
    container: false
    tool: claude
    model: sonnet
"#;
    serde_yaml::from_str(yaml).unwrap()
}

/// Scenario 1: an issue walks the whole flow to its terminal stage, and a
/// PR number set along the way (standing in for the `create_pr` hook,
/// which needs a real `gh` invocation) survives to the end.
#[test]
fn happy_path_reaches_terminal_stage_with_pr_number() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let config = happy_path_config();
    let env = Environment::new(&config, &store, Path::new("/tmp/repo"), "demo");

    let issue = store.create("Add search", Priority::Medium, "default", "explore", None, vec![]).unwrap();
    let issue_dir = paths::issue_dir(store.root(), &issue.id, &issue.slug);
    std::fs::write(issue_dir.join("research.md"), "notes").unwrap();

    // explore -> plan
    let outcome = advance(&env, &AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Cli }).unwrap();
    let issue = match outcome {
        AdvanceOutcome::Advanced { issue, .. } => issue,
        _ => panic!("expected advance out of explore"),
    };
    assert_eq!(issue.stage, "plan");

    std::fs::write(issue_dir.join("spec.md"), "## Approach\nUse a trie.\n").unwrap();
    store.update_metadata(&issue.id, |i| i.pr_number = Some(7)).unwrap();

    // plan -> implement
    let outcome = advance(&env, &AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Cli }).unwrap();
    let issue = match outcome {
        AdvanceOutcome::Advanced { issue, .. } => issue,
        _ => panic!("expected advance out of plan"),
    };
    assert_eq!(issue.stage, "implement");

    // implement -> implement.review
    let outcome = advance(&env, &AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Cli }).unwrap();
    let issue = match outcome {
        AdvanceOutcome::Advanced { issue, .. } => issue,
        _ => panic!("expected advance into review"),
    };
    assert_eq!(issue.stage, "implement");
    assert_eq!(issue.substage.as_deref(), Some("review"));

    // implement.review -> accepted
    let outcome = advance(&env, &AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Cli }).unwrap();
    let issue = match outcome {
        AdvanceOutcome::Advanced { issue, .. } => issue,
        _ => panic!("expected final advance"),
    };

    assert_eq!(issue.stage, "accepted");
    assert!(config.is_terminal(&issue.dot_path()));
    assert_eq!(issue.pr_number, Some(7));
    assert_eq!(issue.history.len(), 5); // create + 4 transitions
}

/// Scenario 2: a plan with an empty Approach section fails the stage's
/// exit hook and the issue stays put.
#[test]
fn validation_blocks_plan_with_empty_approach_section() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let config = happy_path_config();
    let env = Environment::new(&config, &store, Path::new("/tmp/repo"), "demo");

    let issue = store.create("Add search", Priority::Medium, "default", "plan", None, vec![]).unwrap();
    let issue_dir = paths::issue_dir(store.root(), &issue.id, &issue.slug);
    std::fs::write(issue_dir.join("spec.md"), "## Approach\n\n## Risks\nNone.\n").unwrap();

    let err = advance(&env, &AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Cli }).unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let reloaded = store.get(&issue.id).unwrap();
    assert_eq!(reloaded.stage, "plan");
    assert!(reloaded.processing.is_none(), "processing flag must clear on failure");
}

/// Scenario 3: rolling an issue back from implement.review archives its
/// output files and clears the PR, confirmed end-to-end through the
/// store rather than just rollback's own unit tests.
#[test]
fn rollback_from_review_archives_outputs_and_clears_pr() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let config = happy_path_config();

    let issue = store.create("Add search", Priority::Medium, "default", "explore", None, vec![]).unwrap();
    let issue_dir = paths::issue_dir(store.root(), &issue.id, &issue.slug);
    std::fs::write(issue_dir.join("spec.md"), "## Approach\nUse a trie.\n").unwrap();
    std::fs::write(issue_dir.join("code.md"), "diff").unwrap();
    std::fs::write(issue_dir.join("review.md"), "lgtm").unwrap();
    store.update_stage(&issue.id, "implement", Some("review".to_string()), None, "transition").unwrap();
    store.update_metadata(&issue.id, |i| { i.pr_number = Some(99); i.pr_url = Some("https://example/99".into()); }).unwrap();
    session::mark_oriented(store.root(), &issue.id, "implement.review").unwrap();

    let rolled_back = rollback(
        &config,
        &store,
        "demo",
        &["developer".to_string(), "manager".to_string()],
        Path::new("/tmp/repo"),
        &issue.id,
        "plan",
        &RollbackOptions { skip_sync: true, keep_changes: true, ..Default::default() },
    )
    .unwrap();

    assert_eq!(rolled_back.stage, "plan");
    assert!(rolled_back.pr_number.is_none());
    assert!(rolled_back.pr_url.is_none());
    assert!(!issue_dir.join("code.md").exists());
    assert!(!issue_dir.join("review.md").exists());
    assert!(issue_dir.join("spec.md").exists(), "plan's own output predates the rollback target and stays put");
    assert!(session::load(store.root(), &issue.id).unwrap().is_none(), "session file is cleared on rollback");
}

/// Scenario 4: a crash mid-stage leaves the session tracker pointing at a
/// stale stage. The first hook-triggered `next` only re-orients; the
/// second performs the real advance. Exactly one history entry is added
/// across both calls.
#[test]
fn restart_reorients_once_then_advances() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let config = happy_path_config();
    let env = Environment::new(&config, &store, Path::new("/tmp/repo"), "demo");

    let issue = store.create("Add search", Priority::Medium, "default", "explore", None, vec![]).unwrap();
    let issue_dir = paths::issue_dir(store.root(), &issue.id, &issue.slug);
    std::fs::write(issue_dir.join("research.md"), "notes").unwrap();

    // Simulate a stale session left behind by a previous crashed agent
    // that never got to mark itself oriented at the current stage.
    session::mark_oriented(store.root(), &issue.id, "backlog").unwrap();

    let history_len_before = store.get(&issue.id).unwrap().history.len();

    let first = advance(&env, &AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Hook }).unwrap();
    assert!(matches!(first, AdvanceOutcome::Reoriented(_)));
    let after_first = store.get(&issue.id).unwrap();
    assert_eq!(after_first.stage, "explore", "reorientation never touches the issue's stage");
    assert_eq!(after_first.history.len(), history_len_before);

    let second = advance(&env, &AdvanceRequest { issue_id: issue.id.clone(), target: None, trigger: Trigger::Hook }).unwrap();
    let advanced = match second {
        AdvanceOutcome::Advanced { issue, .. } => issue,
        _ => panic!("expected the second call to actually advance"),
    };
    assert_eq!(advanced.stage, "plan");
    assert_eq!(advanced.history.len(), history_len_before + 1);
}

/// Scenario 5: issue A depends on B. Once B reaches `accepted`, a scan
/// over the store (the same query the manager-hooks loop polls) finds A
/// ready and promoting it advances it out of backlog.
#[test]
fn dependency_satisfied_promotes_backlog_issue() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(dir.path());
    let yaml = r#"
project: demo
worktrees_dir: /tmp/worktrees
port_range: "9000-9099"
flows:
  default: [backlog, explore, accepted]
stages:
  backlog:
    role: manager
    is_parking_lot: true
  explore:
    role: developer
  accepted:
    role: manager
    terminal: true
roles:
  developer:
    container: true
    tool: claude
    model: sonnet
  manager:
    container: false
    tool: claude
    model: sonnet
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let env = Environment::new(&config, &store, Path::new("/tmp/repo"), "demo");

    let dependency = store.create("Build parser", Priority::Medium, "default", "accepted", None, vec![]).unwrap();
    let dependent = store.create("Build formatter", Priority::Medium, "default", "backlog", None, vec![dependency.id.clone()]).unwrap();

    let all = store.list(None, None).unwrap();
    assert!(deps::is_ready(&dependent, &all, "accepted"));
    let ready_ids: Vec<String> = deps::ready_backlog_issues(&all, "backlog", "accepted").into_iter().map(|i| i.id.clone()).collect();
    assert_eq!(ready_ids, vec![dependent.id.clone()]);

    let outcome = advance(&env, &AdvanceRequest { issue_id: dependent.id.clone(), target: None, trigger: Trigger::Cli }).unwrap();
    match outcome {
        AdvanceOutcome::Advanced { issue, .. } => assert_eq!(issue.stage, "explore"),
        _ => panic!("expected the now-ready issue to advance out of backlog"),
    }
}

/// Scenario 6: container/session/port naming is a pure function of
/// `(project, role, issue id)` — no allocation table, so it has to be
/// stable across repeated calls and wrap predictably at the range width.
#[test]
fn port_assignment_is_deterministic_and_wraps_at_range_width() {
    let config = happy_path_config();
    let (base, _hi) = config.port_bounds().unwrap();

    let port_1 = agenttree_store::naming::deterministic_port(base, 1);
    let port_2 = agenttree_store::naming::deterministic_port(base, 2);
    let port_23 = agenttree_store::naming::deterministic_port(base, 23);
    let port_1001 = agenttree_store::naming::deterministic_port(base, 1001);

    assert_eq!(port_1, base + 1);
    assert_eq!(port_2, base + 2);
    assert_eq!(port_23, base + 23);
    assert_eq!(port_1001, port_1, "ids 1000 apart collide by design (mod 1000)");

    // Repeated calls with the same id are byte-for-byte stable.
    assert_eq!(agenttree_store::naming::deterministic_port(base, 23), port_23);
}
