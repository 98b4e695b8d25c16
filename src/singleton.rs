//! Refuse to run twice on the same board.

use std::path::Path;

use anyhow::{bail, Result};
use tracing::debug;

/// The kernel truncates `comm` to 15 bytes.
const COMM_LEN: usize = 15;

/// Pids under `proc_root` whose `comm` equals `name`, excluding `own_pid`.
///
/// Entries that vanish or cannot be read while scanning are skipped.
pub fn find_other_instances(proc_root: &Path, name: &str, own_pid: u32) -> Vec<u32> {
    let wanted = truncate_comm(name);
    let Ok(entries) = std::fs::read_dir(proc_root) else {
        return Vec::new();
    };

    let mut pids: Vec<u32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|&pid| pid != own_pid)
        .filter(|pid| {
            std::fs::read_to_string(proc_root.join(pid.to_string()).join("comm"))
                .map(|comm| comm.trim_end() == wanted)
                .unwrap_or(false)
        })
        .collect();
    pids.sort_unstable();
    pids
}

fn truncate_comm(name: &str) -> &str {
    let mut end = name.len().min(COMM_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Fail if another process named `name` is already running.
pub fn ensure_single_instance(name: &str) -> Result<()> {
    let others = find_other_instances(Path::new("/proc"), name, std::process::id());
    if !others.is_empty() {
        bail!("{name} is already running (pid {others:?})");
    }
    debug!(name, "No other instance running");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn fake_proc(entries: &[(&str, &str)]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("calcifer-proc-{}", uuid::Uuid::new_v4()));
        for (pid, comm) in entries {
            let dir = root.join(pid);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        }
        std::fs::create_dir_all(root.join("self")).unwrap();
        root
    }

    #[test]
    fn finds_other_pid_with_same_name() {
        let root = fake_proc(&[("100", "calcifer"), ("200", "calcifer"), ("300", "bash")]);
        assert_eq!(find_other_instances(&root, "calcifer", 100), vec![200]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn ignores_own_pid_and_similar_names() {
        let root = fake_proc(&[("100", "calcifer"), ("300", "calcifer-test")]);
        assert!(find_other_instances(&root, "calcifer", 100).is_empty());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn matches_truncated_comm() {
        let root = fake_proc(&[("400", "calcifer-daemon")]);
        assert_eq!(find_other_instances(&root, "calcifer-daemon-long", 1), vec![400]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_proc_root_finds_nothing() {
        let root = std::env::temp_dir().join(format!("calcifer-noproc-{}", uuid::Uuid::new_v4()));
        assert!(find_other_instances(&root, "calcifer", 1).is_empty());
    }
}
