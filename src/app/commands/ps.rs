use crate::adapters::StateStore;
use crate::config::cli::Cli;
use crate::domain::model::{ServiceState, ServiceStatus};
use crate::utils::error::Result;
use crate::utils::monitor::pid_alive;

/// ps 子命令:顯示最近一次執行記錄的服務狀態
///
/// 快照裡的 pid 可能已經不在了,輸出時逐一核對。
pub fn run(cli: &Cli) -> Result<()> {
    let store = StateStore::new(&cli.resolve_state_dir());
    let state = store.load()?;

    println!(
        "Stack: {} (updated {})",
        state.name,
        state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "{:<20} {:<14} {:<10} {:<12} {}",
        "SERVICE", "STATE", "HEALTH", "PID", "EXIT"
    );
    for (name, status) in &state.services {
        let alive = status.pid.map(pid_alive).unwrap_or(false);
        let health = status
            .health
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        let pid = match status.pid {
            Some(pid) if alive => pid.to_string(),
            Some(pid) => format!("{} (gone)", pid),
            None => "-".to_string(),
        };
        let exit = status
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<14} {:<10} {:<12} {}",
            name,
            display_state(status, alive).to_string(),
            health,
            pid,
            exit
        );
    }
    Ok(())
}

/// 快照說還在跑、但 pid 已經不在了,就回報為 exited
fn display_state(status: &ServiceStatus, alive: bool) -> ServiceState {
    match status.state {
        ServiceState::Running if !alive => ServiceState::Exited,
        state => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{ExitInfo, StackState};

    #[test]
    #[cfg(unix)]
    fn test_dead_pid_downgrades_running_to_exited() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        // 快照記錄的是一個已經不存在的 pid
        let mut state = StackState::new("demo", vec!["web".to_string()]);
        state.record_running("web", pid);
        let store = StateStore::new(dir.path());
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        let status = &loaded.services["web"];
        assert_eq!(status.state, ServiceState::Running);

        let alive = status.pid.map(pid_alive).unwrap_or(false);
        assert!(!alive);
        assert_eq!(display_state(status, alive), ServiceState::Exited);
    }

    #[test]
    fn test_display_state_leaves_live_and_finished_services_alone() {
        let mut state = StackState::new("demo", vec!["web".to_string()]);
        state.record_running("web", std::process::id());
        assert_eq!(
            display_state(&state.services["web"], true),
            ServiceState::Running
        );

        let mut done = StackState::new("demo", vec!["db".to_string()]);
        done.record_exit(
            "db",
            ExitInfo {
                code: Some(0),
                signal: None,
            },
            false,
        );
        assert_eq!(
            display_state(&done.services["db"], false),
            ServiceState::Exited
        );
    }
}
