use crate::adapters::volumes::apply_mount;
use crate::adapters::{LocalVolumes, StateStore};
use crate::config::duration::format_duration;
use crate::config::StackConfig;
use crate::core::plan::StartupPlan;
use crate::core::probe::HealthWatcher;
use crate::core::supervisor::{ManagedService, ServiceSet};
use crate::domain::model::{
    DependsCondition, HealthState, ProcessSpec, ServiceState, StackEvent, StackState,
};
use crate::domain::ports::ProcessRunner;
use crate::utils::error::{Result, StackError};
use crate::utils::monitor::SystemMonitor;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// 監控統計的輸出間隔
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// 堆疊引擎:依啟動計畫逐一帶起服務並持續監管
///
/// 啟動流程對每個服務依序執行:等待依賴條件、跑 init 命令、
/// 啟動常駐行程、掛上健康探測。之後進入監管迴圈,直到收到
/// 關閉訊號或所有服務自行結束,再以相反順序優雅停止。
pub struct StackEngine {
    config: StackConfig,
    base_dir: PathBuf,
    state_dir: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    selection: Option<Vec<String>>,
    monitor_enabled: bool,
    external_shutdown: Option<watch::Receiver<bool>>,
}

/// 一次執行期間共用的資源:快照、持久化、監控與卷配置
struct RunState {
    state: StackState,
    store: StateStore,
    monitor: SystemMonitor,
    volumes: LocalVolumes,
    provisioned: BTreeMap<String, PathBuf>,
}

impl RunState {
    /// 快照寫入失敗不該讓運行中的堆疊倒下
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            tracing::warn!("⚠️ Could not write state snapshot: {}", e);
        }
    }
}

impl StackEngine {
    pub fn new(
        config: StackConfig,
        base_dir: &Path,
        state_dir: &Path,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            config,
            base_dir: base_dir.to_path_buf(),
            state_dir: state_dir.to_path_buf(),
            runner,
            selection: None,
            monitor_enabled: false,
            external_shutdown: None,
        }
    }

    /// 只啟動指定服務與它們的依賴
    pub fn with_selection(mut self, services: Vec<String>) -> Self {
        if !services.is_empty() {
            self.selection = Some(services);
        }
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor_enabled = enabled;
        self
    }

    /// 以外部訊號取代 Ctrl-C 作為關閉來源
    pub fn with_shutdown_signal(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.external_shutdown = Some(shutdown);
        self
    }

    /// 帶起整個堆疊並監管到結束
    pub async fn up(&self) -> Result<()> {
        self.config.validate_config()?;
        let plan = StartupPlan::build(&self.config, self.selection.as_deref())?;
        tracing::info!(
            "🚀 Starting stack '{}' ({} services)",
            self.config.name,
            plan.len()
        );
        tracing::info!("🔍 Startup order: {}", plan.startup_order().join(" -> "));

        let volumes = LocalVolumes::new(&self.state_dir, &self.base_dir);
        let provisioned = volumes.provision(&self.config)?;

        let mut run = RunState {
            state: StackState::new(&self.config.name, plan.startup_order().iter().cloned()),
            store: StateStore::new(&self.state_dir),
            monitor: SystemMonitor::new(self.monitor_enabled),
            volumes,
            provisioned,
        };
        run.store.save(&run.state)?;

        let (shutdown_guard, mut shutdown_rx) = self.shutdown_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut services = ServiceSet::new();
        let mut failure: Option<StackError> = None;
        let mut interrupted = false;

        for name in plan.startup_order() {
            if *shutdown_rx.borrow() {
                interrupted = true;
                break;
            }
            let started = self
                .start_service(name, &mut services, &mut run, &events_tx, shutdown_rx.clone())
                .await;
            match started {
                Ok(true) => {}
                Ok(false) => {
                    interrupted = true;
                    break;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_none() && !interrupted {
            tracing::info!("✅ All {} services are up", services.len());
            self.supervise(&services, &mut events_rx, &mut shutdown_rx, &mut run)
                .await;
        }

        self.drain_events(&mut events_rx, &mut run);
        self.teardown(&mut services, &mut run).await;
        drop(shutdown_guard);

        run.monitor.log_final_stats();
        run.persist();
        tracing::info!("📄 State written to {}", run.store.path().display());

        match failure {
            Some(e) => Err(e),
            None => {
                tracing::info!("🎉 Stack '{}' shut down cleanly", self.config.name);
                Ok(())
            }
        }
    }

    /// 回傳 Ok(false) 表示啟動被關閉訊號打斷
    async fn start_service(
        &self,
        name: &str,
        services: &mut ServiceSet,
        run: &mut RunState,
        events_tx: &mpsc::UnboundedSender<StackEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<bool> {
        let service = self
            .config
            .service(name)
            .ok_or_else(|| StackError::MissingConfigError {
                field: format!("services.{}", name),
            })?;

        match self.wait_dependencies(name, services, &mut shutdown).await {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => {
                run.state.record_failed(name, None);
                run.persist();
                return Err(e);
            }
        }

        // 環境與卷改寫
        let mut env = self.config.resolved_environment(name, &self.base_dir)?;
        let mut command = service.command.clone();
        let mut init = service.init.clone();
        for mapping in &service.parsed_volumes(&format!("services.{}.volumes", name))? {
            let source = run.volumes.resolve_mount(mapping, &run.provisioned)?;
            apply_mount(&mut command, &mut env, &mapping.target, &source);
            if let Some(init_command) = init.as_mut() {
                // 環境已改寫過,這裡只處理 init 的命令列
                let mut untouched = BTreeMap::new();
                apply_mount(init_command, &mut untouched, &mapping.target, &source);
            }
        }
        let workdir = service.workdir.as_deref().map(|w| self.resolve_workdir(w));

        if let Some(init_command) = init {
            run.state.record_state(name, ServiceState::Initializing);
            run.persist();
            tracing::info!(
                "🔧 Running init of '{}': {}",
                name,
                init_command.display_oneline()
            );
            let spec = ProcessSpec {
                name: format!("{}-init", name),
                command: init_command,
                env: env.clone(),
                workdir: workdir.clone(),
                pipe_output: true,
            };
            let info = match self.runner.run_once(&spec).await {
                Ok(info) => info,
                Err(e) => {
                    run.state.record_failed(name, None);
                    run.persist();
                    return Err(e);
                }
            };
            if !info.success() {
                run.state.record_failed(name, info.code);
                run.persist();
                return Err(StackError::InitFailed {
                    service: name.to_string(),
                    code: info.code.unwrap_or(-1),
                });
            }
            tracing::info!("✅ Init of '{}' finished", name);
        }

        let spec = ProcessSpec {
            name: name.to_string(),
            command,
            env: env.clone(),
            workdir,
            pipe_output: true,
        };
        let handle = match self.runner.spawn_service(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                run.state.record_failed(name, None);
                run.persist();
                return Err(e);
            }
        };
        let pid = handle.pid();
        tracing::info!("✅ Started '{}' (pid {})", name, pid);
        run.state.record_running(name, pid);
        run.persist();
        run.monitor.track(name, pid);

        for port in &service.parsed_ports(&format!("services.{}.ports", name))? {
            tracing::info!("📦 '{}' listens on host port {}", name, port.host);
        }

        // 行程結束轉成事件,讓監管迴圈更新快照
        let mut exit_rx = handle.exit_watch();
        let events = events_tx.clone();
        let exited = name.to_string();
        tokio::spawn(async move {
            loop {
                let snapshot = *exit_rx.borrow_and_update();
                if let Some(info) = snapshot {
                    let _ = events.send(StackEvent::Exited {
                        service: exited,
                        info,
                    });
                    break;
                }
                if exit_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let watcher = match self.config.resolved_healthcheck(name)? {
            Some(check) => {
                tracing::info!(
                    "🔍 Probing health of '{}' every {}",
                    name,
                    format_duration(&check.interval)
                );
                run.state.record_health(name, HealthState::Starting);
                run.persist();
                Some(HealthWatcher::spawn(
                    name.to_string(),
                    check,
                    self.runner.clone(),
                    env,
                    events_tx.clone(),
                    shutdown.clone(),
                ))
            }
            None => None,
        };

        services.insert(ManagedService {
            name: name.to_string(),
            handle,
            watcher,
            grace: service.stop_grace_period,
        });
        Ok(true)
    }

    /// 等待全部依賴條件滿足;Ok(false) 表示等待期間收到關閉訊號
    async fn wait_dependencies(
        &self,
        name: &str,
        services: &ServiceSet,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        let service = match self.config.service(name) {
            Some(service) => service,
            None => return Ok(true),
        };

        for (dependency, condition) in service.depends() {
            let dep = services.get(&dependency).ok_or_else(|| {
                StackError::DependencyFailed {
                    service: name.to_string(),
                    dependency: dependency.clone(),
                    reason: "dependency was never started".to_string(),
                }
            })?;

            match condition {
                DependsCondition::ServiceStarted => {
                    // started 只要求行程曾被帶起,先結束的依賴不算錯
                    if let Some(info) = dep.exit_status() {
                        tracing::debug!(
                            "Dependency '{}' of '{}' already exited ({})",
                            dependency,
                            name,
                            info.describe()
                        );
                    }
                }
                DependsCondition::ServiceHealthy => {
                    tracing::info!("⏳ '{}' waits for '{}' to be healthy", name, dependency);
                    if !self
                        .wait_until_healthy(name, &dependency, dep, shutdown)
                        .await?
                    {
                        return Ok(false);
                    }
                    tracing::info!("✅ Dependency '{}' of '{}' is healthy", dependency, name);
                }
            }
        }
        Ok(true)
    }

    async fn wait_until_healthy(
        &self,
        name: &str,
        dependency: &str,
        dep: &ManagedService,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        let watcher = dep
            .watcher
            .as_ref()
            .ok_or_else(|| StackError::DependencyFailed {
                service: name.to_string(),
                dependency: dependency.to_string(),
                reason: "dependency has no healthcheck to wait on".to_string(),
            })?;
        let retry_budget = self
            .config
            .resolved_healthcheck(dependency)?
            .map(|check| check.retries)
            .unwrap_or(0);
        let mut health_rx = watcher.subscribe();
        let mut exit_rx = dep.handle.exit_watch();

        loop {
            match *health_rx.borrow_and_update() {
                HealthState::Healthy => return Ok(true),
                HealthState::Unhealthy => {
                    return Err(StackError::HealthcheckFailed {
                        service: dependency.to_string(),
                        attempts: retry_budget,
                    })
                }
                HealthState::Starting => {}
            }
            if let Some(info) = *exit_rx.borrow_and_update() {
                return Err(StackError::DependencyFailed {
                    service: name.to_string(),
                    dependency: dependency.to_string(),
                    reason: format!("dependency exited before becoming healthy ({})", info.describe()),
                });
            }

            tokio::select! {
                changed = health_rx.changed() => {
                    // 探測端關閉只發生在停機途中
                    if changed.is_err() {
                        return Ok(false);
                    }
                }
                _ = exit_rx.changed() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// 監管迴圈:更新快照、定期輸出統計,直到關閉或全部結束
    async fn supervise(
        &self,
        services: &ServiceSet,
        events_rx: &mut mpsc::UnboundedReceiver<StackEvent>,
        shutdown: &mut watch::Receiver<bool>,
        run: &mut RunState,
    ) {
        if services.is_empty() {
            return;
        }
        tracing::info!("📊 Supervising {} services, Ctrl-C stops the stack", services.len());
        let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events_rx.recv() => {
                    match event {
                        Some(StackEvent::Health { service, state }) => {
                            run.state.record_health(&service, state);
                            run.persist();
                        }
                        Some(StackEvent::Exited { service, info }) => {
                            if info.success() {
                                tracing::info!("✅ Service '{}' exited ({})", service, info.describe());
                            } else {
                                tracing::warn!("⚠️ Service '{}' exited ({})", service, info.describe());
                            }
                            run.state.record_exit(&service, info, false);
                            run.persist();
                            run.monitor.untrack(&service);
                            if services.running_count() == 0 {
                                tracing::info!("💡 No services left running, bringing the stack down");
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    run.monitor.log_stats("supervising");
                }
            }
        }
    }

    /// 清掉佇列裡剩下的事件,快照才會反映最後看到的狀態
    fn drain_events(&self, events_rx: &mut mpsc::UnboundedReceiver<StackEvent>, run: &mut RunState) {
        while let Ok(event) = events_rx.try_recv() {
            match event {
                StackEvent::Health { service, state } => {
                    run.state.record_health(&service, state);
                }
                StackEvent::Exited { service, info } => {
                    run.state.record_exit(&service, info, false);
                    run.monitor.untrack(&service);
                }
            }
        }
        run.persist();
    }

    /// 以啟動順序的反向優雅停止所有服務
    async fn teardown(&self, services: &mut ServiceSet, run: &mut RunState) {
        if services.is_empty() {
            return;
        }
        tracing::info!("Stopping {} services in reverse order", services.len());

        for service in services.drain_reverse() {
            let name = service.name.clone();
            if let Some(info) = service.exit_status() {
                run.state.record_exit(&name, info, false);
                run.persist();
                run.monitor.untrack(&name);
                continue;
            }

            tracing::info!(
                "Stopping '{}' (grace {})",
                name,
                format_duration(&service.grace)
            );
            match service.stop().await {
                Ok(info) => {
                    tracing::info!("✅ Stopped '{}' ({})", name, info.describe());
                    run.state.record_exit(&name, info, true);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Could not stop '{}': {}", name, e);
                    run.state.record_failed(&name, None);
                }
            }
            run.persist();
            run.monitor.untrack(&name);
        }
    }

    fn resolve_workdir(&self, workdir: &str) -> PathBuf {
        let path = Path::new(workdir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// 內部 Ctrl-C 監聽;測試可注入外部訊號取代
    fn shutdown_channel(&self) -> (Option<Arc<watch::Sender<bool>>>, watch::Receiver<bool>) {
        match &self.external_shutdown {
            Some(rx) => (None, rx.clone()),
            None => {
                let (tx, rx) = watch::channel(false);
                let tx = Arc::new(tx);
                let signal_tx = tx.clone();
                tokio::spawn(async move {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => {
                            tracing::info!("⚠️ Ctrl-C received, shutting the stack down");
                            let _ = signal_tx.send(true);
                        }
                        Err(e) => tracing::warn!("⚠️ Could not listen for Ctrl-C: {}", e),
                    }
                });
                (Some(tx), rx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::TokioProcessRunner;
    use tempfile::TempDir;

    fn engine(yaml: &str, dir: &TempDir) -> StackEngine {
        let config = StackConfig::from_yaml_str(yaml).unwrap();
        StackEngine::new(
            config,
            dir.path(),
            &dir.path().join(".small-stack"),
            Arc::new(TokioProcessRunner::new()),
        )
    }

    #[test]
    fn test_resolve_workdir() {
        let dir = TempDir::new().unwrap();
        let engine = engine("services:\n  a:\n    command: \"true\"\n", &dir);
        assert_eq!(
            engine.resolve_workdir("/absolute"),
            PathBuf::from("/absolute")
        );
        assert_eq!(engine.resolve_workdir("sub"), dir.path().join("sub"));
    }

    #[tokio::test]
    async fn test_external_shutdown_channel_is_reused() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = watch::channel(false);
        let engine = engine("services:\n  a:\n    command: \"true\"\n", &dir)
            .with_shutdown_signal(rx);

        let (guard, watched) = engine.shutdown_channel();
        assert!(guard.is_none());
        tx.send(true).unwrap();
        assert!(*watched.borrow());
    }
}
