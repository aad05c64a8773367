//! Container-indicator detection (spec §4.6 gating rule), sync-ified
//! from the teacher's `supervisor::detect` module.

use std::path::Path;

pub fn running_in_container() -> bool {
    if std::env::var("AGENTTREE_CONTAINER").as_deref() == Ok("1") {
        return true;
    }
    if Path::new("/.dockerenv").exists() {
        return true;
    }
    cgroup_mentions_container()
}

fn cgroup_mentions_container() -> bool {
    match std::fs::read_to_string("/proc/1/cgroup") {
        Ok(contents) => contents.contains("docker") || contents.contains("containerd") || contents.contains("podman"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_forces_container_detection() {
        std::env::set_var("AGENTTREE_CONTAINER", "1");
        assert!(running_in_container());
        std::env::remove_var("AGENTTREE_CONTAINER");
    }
}
