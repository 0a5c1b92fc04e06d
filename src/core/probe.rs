use crate::domain::model::{
    CommandSpec, HealthState, ProbeCommand, ProcessSpec, ResolvedHealthcheck, StackEvent,
};
use crate::domain::ports::ProcessRunner;
use crate::utils::error::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

/// 連續失敗次數與健康狀態的追蹤
#[derive(Debug, Clone)]
pub struct ProbeStatus {
    pub fail_count: u32,
    pub state: HealthState,
}

impl Default for ProbeStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeStatus {
    pub fn new() -> Self {
        Self {
            fail_count: 0,
            state: HealthState::Starting,
        }
    }

    /// 成功清空失敗計數;回傳狀態是否改變
    pub fn record_success(&mut self) -> bool {
        self.fail_count = 0;
        if self.state != HealthState::Healthy {
            self.state = HealthState::Healthy;
            true
        } else {
            false
        }
    }

    /// start_period 內的失敗不計入重試額度;回傳狀態是否改變
    pub fn record_failure(&mut self, retries: u32, in_start_period: bool) -> bool {
        if in_start_period {
            return false;
        }
        self.fail_count += 1;
        if self.fail_count >= retries && self.state != HealthState::Unhealthy {
            self.state = HealthState::Unhealthy;
            true
        } else {
            false
        }
    }
}

/// 背景探測任務,狀態透過 watch channel 發布
///
/// Unhealthy 是終態:連續失敗達到重試額度後探測停止,
/// 等待這個服務的依賴方會立刻得到結果。
pub struct HealthWatcher {
    rx: watch::Receiver<HealthState>,
    task: tokio::task::JoinHandle<()>,
}

impl HealthWatcher {
    pub fn spawn(
        service: String,
        check: ResolvedHealthcheck,
        runner: Arc<dyn ProcessRunner>,
        env: BTreeMap<String, String>,
        events: mpsc::UnboundedSender<StackEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (tx, rx) = watch::channel(HealthState::Starting);
        let task = tokio::spawn(async move {
            probe_loop(service, check, runner, env, tx, events, shutdown).await;
        });
        Self { rx, task }
    }

    pub fn state(&self) -> HealthState {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthState> {
        self.rx.clone()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

async fn probe_loop(
    service: String,
    check: ResolvedHealthcheck,
    runner: Arc<dyn ProcessRunner>,
    env: BTreeMap<String, String>,
    tx: watch::Sender<HealthState>,
    events: mpsc::UnboundedSender<StackEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let mut status = ProbeStatus::new();

    loop {
        // 第一次探測也要等滿一個 interval
        tokio::select! {
            _ = tokio::time::sleep(check.interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        if run_probe(&service, &check, runner.as_ref(), &env).await {
            if status.record_success() {
                tracing::info!("✅ Service '{}' is healthy", service);
                let _ = tx.send(HealthState::Healthy);
                let _ = events.send(StackEvent::Health {
                    service: service.clone(),
                    state: HealthState::Healthy,
                });
            }
        } else {
            let in_start_period = started.elapsed() < check.start_period;
            if in_start_period {
                tracing::debug!("Probe of '{}' failed during the start period", service);
            } else {
                tracing::debug!(
                    "Probe of '{}' failed ({}/{})",
                    service,
                    status.fail_count + 1,
                    check.retries
                );
            }
            if status.record_failure(check.retries, in_start_period) {
                tracing::warn!(
                    "❌ Service '{}' is unhealthy after {} failed probes",
                    service,
                    check.retries
                );
                let _ = tx.send(HealthState::Unhealthy);
                let _ = events.send(StackEvent::Health {
                    service: service.clone(),
                    state: HealthState::Unhealthy,
                });
                break;
            }
        }
    }
}

/// 單次探測,整體受 timeout 限制
pub async fn run_probe(
    service: &str,
    check: &ResolvedHealthcheck,
    runner: &dyn ProcessRunner,
    env: &BTreeMap<String, String>,
) -> bool {
    let attempt = async {
        match &check.test {
            ProbeCommand::Exec(argv) => {
                run_command_probe(service, CommandSpec::Exec(argv.clone()), runner, env).await
            }
            ProbeCommand::Shell(line) => {
                run_command_probe(service, CommandSpec::Shell(line.clone()), runner, env).await
            }
            ProbeCommand::Tcp(address) => {
                tokio::net::TcpStream::connect(address.as_str()).await.is_ok()
            }
            ProbeCommand::Http(url) => match http_probe(url, check.timeout).await {
                Ok(healthy) => healthy,
                Err(e) => {
                    tracing::debug!("HTTP probe of '{}' could not be sent: {}", service, e);
                    false
                }
            },
        }
    };

    match tokio::time::timeout(check.timeout, attempt).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!("Probe of '{}' timed out after {:?}", service, check.timeout);
            false
        }
    }
}

async fn run_command_probe(
    service: &str,
    command: CommandSpec,
    runner: &dyn ProcessRunner,
    env: &BTreeMap<String, String>,
) -> bool {
    let spec = ProcessSpec {
        name: format!("{}-probe", service),
        command,
        env: env.clone(),
        workdir: None,
        pipe_output: false,
    };
    match runner.run_once(&spec).await {
        Ok(info) => info.success(),
        Err(e) => {
            tracing::debug!("Probe command of '{}' could not run: {}", service, e);
            false
        }
    }
}

async fn http_probe(url: &str, timeout: Duration) -> Result<bool> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?;
    Ok(response.status().is_success())
}

/// 等到探測狀態離開 Starting
pub async fn wait_until_settled(rx: &mut watch::Receiver<HealthState>) -> HealthState {
    loop {
        let current = *rx.borrow_and_update();
        if current != HealthState::Starting {
            return current;
        }
        if rx.changed().await.is_err() {
            return *rx.borrow();
        }
    }
}
