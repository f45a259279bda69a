//! Stale-process cleanup
//!
//! A previous daemon's MCP-server subprocesses can outlive it and keep
//! stale native modules loaded; their continued presence has shown up as
//! misclassified "corruption" on store open. Before any store is touched,
//! the daemon terminates processes that (a) run the same executable,
//! (b) are not this process, and (c) have no living parent.

use sysinfo::{ProcessesToUpdate, System};
use tracing::{info, warn};

/// Kill orphaned siblings of the current executable. Returns how many
/// processes were signalled.
#[must_use]
pub fn kill_stale_siblings() -> usize {
    let Ok(current_exe) = std::env::current_exe() else {
        return 0;
    };
    let own_pid = sysinfo::get_current_pid().ok();

    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut killed = 0usize;
    for (pid, process) in system.processes() {
        if Some(*pid) == own_pid {
            continue;
        }
        let same_binary = process
            .exe()
            .is_some_and(|exe| exe == current_exe.as_path());
        if !same_binary {
            continue;
        }
        let orphaned = match process.parent() {
            None => true,
            Some(parent) => system.process(parent).is_none(),
        };
        if !orphaned {
            continue;
        }
        if process.kill() {
            info!(pid = pid.as_u32(), "stale daemon process terminated");
            killed += 1;
        } else {
            warn!(pid = pid.as_u32(), "could not terminate stale daemon process");
        }
    }
    killed
}
