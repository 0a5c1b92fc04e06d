use crate::domain::model::{CommandSpec, ExitInfo, ProcessSpec};
use crate::domain::ports::{ProcessRunner, ServiceHandle};
use crate::utils::error::{Result, StackError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

/// 送出 SIGKILL 後最多再等這麼久
const SIGKILL_WAIT: Duration = Duration::from_secs(5);

/// 以 tokio::process 實現的行程執行器
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run_once(&self, spec: &ProcessSpec) -> Result<ExitInfo> {
        let mut cmd = build_command(spec)?;
        let mut child = cmd.spawn().map_err(|e| StackError::SpawnError {
            service: spec.name.clone(),
            message: e.to_string(),
        })?;

        if spec.pipe_output {
            spawn_output_loggers(&spec.name, &mut child);
        }

        let status = child.wait().await.map_err(StackError::IoError)?;
        Ok(exit_info_from(status))
    }

    async fn spawn_service(&self, spec: &ProcessSpec) -> Result<Box<dyn ServiceHandle>> {
        let mut cmd = build_command(spec)?;
        let mut child = cmd.spawn().map_err(|e| StackError::SpawnError {
            service: spec.name.clone(),
            message: e.to_string(),
        })?;
        let pid = child.id().ok_or_else(|| StackError::SpawnError {
            service: spec.name.clone(),
            message: "Failed to get process ID".to_string(),
        })?;

        tracing::debug!("Service '{}' spawned with pid {}", spec.name, pid);

        if spec.pipe_output {
            spawn_output_loggers(&spec.name, &mut child);
        }
        let exit_rx = spawn_exit_watch(child, spec.name.clone());

        Ok(Box::new(TokioServiceHandle {
            name: spec.name.clone(),
            pid,
            exit_rx,
        }))
    }
}

fn build_command(spec: &ProcessSpec) -> Result<Command> {
    let mut cmd = match &spec.command {
        CommandSpec::Exec(argv) => {
            let program = argv.first().ok_or_else(|| StackError::SpawnError {
                service: spec.name.clone(),
                message: "Empty command".to_string(),
            })?;
            let mut cmd = Command::new(program);
            cmd.args(&argv[1..]);
            cmd
        }
        CommandSpec::Shell(line) => {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        }
    };

    if let Some(dir) = &spec.workdir {
        cmd.current_dir(dir);
    }
    // 繼承執行者的環境,服務宣告的變數疊加在上面
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null());
    if spec.pipe_output {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
    }

    // 讓服務當自己行程組的組長,停止時才能連同 shell 的子行程一起送訊號
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.kill_on_drop(true);
    Ok(cmd)
}

/// 逐行轉發服務輸出到日誌,前綴服務名稱
fn spawn_output_loggers(name: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!("{} | {}", name, line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!("{} | {}", name, line);
            }
        });
    }
}

fn spawn_exit_watch(mut child: Child, name: String) -> watch::Receiver<Option<ExitInfo>> {
    let (tx, rx) = watch::channel(None);
    tokio::spawn(async move {
        let info = match child.wait().await {
            Ok(status) => exit_info_from(status),
            Err(e) => {
                tracing::warn!("Failed to wait on service '{}': {}", name, e);
                ExitInfo {
                    code: None,
                    signal: None,
                }
            }
        };
        let _ = tx.send(Some(info));
    });
    rx
}

fn exit_info_from(status: std::process::ExitStatus) -> ExitInfo {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitInfo {
        code: status.code(),
        signal,
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal, name: &str) {
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(pid as i32);
    match killpg(pgid, signal) {
        Ok(_) => tracing::debug!("Sent {} to process group of '{}'", signal, name),
        Err(e) => {
            tracing::debug!(
                "killpg failed for '{}' ({}), signalling the process only",
                name,
                e
            );
            let _ = kill(pgid, signal);
        }
    }
}

pub struct TokioServiceHandle {
    name: String,
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
}

async fn wait_for_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> ExitInfo {
    loop {
        if let Some(info) = *rx.borrow_and_update() {
            return info;
        }
        if rx.changed().await.is_err() {
            return ExitInfo {
                code: None,
                signal: None,
            };
        }
    }
}

#[async_trait]
impl ServiceHandle for TokioServiceHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn exit_watch(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit_rx.clone()
    }

    async fn terminate(&self, grace: Duration) -> Result<ExitInfo> {
        if let Some(info) = self.exit_status() {
            return Ok(info);
        }
        let mut rx = self.exit_rx.clone();

        #[cfg(unix)]
        {
            send_signal(self.pid, nix::sys::signal::Signal::SIGTERM, &self.name);
            match tokio::time::timeout(grace, wait_for_exit(&mut rx)).await {
                Ok(info) => return Ok(info),
                Err(_) => {
                    tracing::warn!(
                        "Service '{}' did not stop within {:?}, sending SIGKILL",
                        self.name,
                        grace
                    );
                    send_signal(self.pid, nix::sys::signal::Signal::SIGKILL, &self.name);
                }
            }
            match tokio::time::timeout(SIGKILL_WAIT, wait_for_exit(&mut rx)).await {
                Ok(info) => Ok(info),
                Err(_) => {
                    tracing::warn!("Service '{}' is not reaping after SIGKILL", self.name);
                    Ok(ExitInfo {
                        code: None,
                        signal: Some(9),
                    })
                }
            }
        }

        #[cfg(not(unix))]
        {
            // Windows 沒有 SIGTERM,直接砍整棵行程樹
            let _ = Command::new("taskkill")
                .args(["/pid", &self.pid.to_string(), "/f", "/t"])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            match tokio::time::timeout(grace.max(SIGKILL_WAIT), wait_for_exit(&mut rx)).await {
                Ok(info) => Ok(info),
                Err(_) => Ok(ExitInfo {
                    code: None,
                    signal: None,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec(command: CommandSpec) -> ProcessSpec {
        ProcessSpec {
            name: "test".to_string(),
            command,
            env: BTreeMap::new(),
            workdir: None,
            pipe_output: false,
        }
    }

    #[tokio::test]
    async fn test_run_once_reports_exit_code() {
        let runner = TokioProcessRunner::new();
        let info = runner
            .run_once(&spec(CommandSpec::Shell("exit 3".to_string())))
            .await
            .unwrap();
        assert_eq!(info.code, Some(3));
        assert!(!info.success());
    }

    #[tokio::test]
    async fn test_run_once_exec_form() {
        let runner = TokioProcessRunner::new();
        let info = runner
            .run_once(&spec(CommandSpec::Exec(vec![
                "true".to_string(),
            ])))
            .await
            .unwrap();
        assert!(info.success());
    }

    #[tokio::test]
    async fn test_env_is_passed_to_the_process() {
        let runner = TokioProcessRunner::new();
        let mut process = spec(CommandSpec::Shell("test \"$GREETING\" = hello".to_string()));
        process
            .env
            .insert("GREETING".to_string(), "hello".to_string());
        let info = runner.run_once(&process).await.unwrap();
        assert!(info.success());
    }

    #[tokio::test]
    async fn test_spawn_service_observes_natural_exit() {
        let runner = TokioProcessRunner::new();
        let handle = runner
            .spawn_service(&spec(CommandSpec::Shell("sleep 0.1".to_string())))
            .await
            .unwrap();
        assert!(handle.is_running());

        let mut rx = handle.exit_watch();
        let info = wait_for_exit(&mut rx).await;
        assert!(info.success());
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_terminate_stops_a_sleeping_service() {
        let runner = TokioProcessRunner::new();
        let handle = runner
            .spawn_service(&spec(CommandSpec::Shell("sleep 30".to_string())))
            .await
            .unwrap();

        let info = handle.terminate(Duration::from_secs(2)).await.unwrap();
        assert!(!info.success());
        #[cfg(unix)]
        assert_eq!(info.signal, Some(15));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_escalates_to_sigkill() {
        let runner = TokioProcessRunner::new();
        let handle = runner
            .spawn_service(&spec(CommandSpec::Shell(
                "trap '' TERM; while true; do sleep 1; done".to_string(),
            )))
            .await
            .unwrap();

        let info = handle.terminate(Duration::from_millis(200)).await.unwrap();
        assert_eq!(info.signal, Some(9));
    }

    #[tokio::test]
    async fn test_empty_command_is_a_spawn_error() {
        let runner = TokioProcessRunner::new();
        let err = runner
            .run_once(&spec(CommandSpec::Exec(vec![])))
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::SpawnError { .. }));
    }
}
