use crate::core::probe::HealthWatcher;
use crate::domain::model::{ExitInfo, HealthState};
use crate::domain::ports::ServiceHandle;
use crate::utils::error::Result;
use std::time::Duration;

/// 受監管的服務:行程把手、健康探測與關閉寬限期
pub struct ManagedService {
    pub name: String,
    pub handle: Box<dyn ServiceHandle>,
    pub watcher: Option<HealthWatcher>,
    pub grace: Duration,
}

impl ManagedService {
    pub fn health_state(&self) -> Option<HealthState> {
        self.watcher.as_ref().map(|watcher| watcher.state())
    }

    pub fn exit_status(&self) -> Option<ExitInfo> {
        self.handle.exit_status()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// 停止探測並結束行程
    pub async fn stop(mut self) -> Result<ExitInfo> {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.handle.terminate(self.grace).await
    }
}

/// 依啟動順序保存的服務集合
///
/// 關閉時以相反順序取出,讓依賴方先於被依賴者結束。
#[derive(Default)]
pub struct ServiceSet {
    services: Vec<ManagedService>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    pub fn insert(&mut self, service: ManagedService) {
        self.services.push(service);
    }

    pub fn get(&self, name: &str) -> Option<&ManagedService> {
        self.services.iter().find(|service| service.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|service| service.name.clone())
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.services
            .iter()
            .filter(|service| service.is_running())
            .count()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// 以啟動順序的反向取出全部服務
    pub fn drain_reverse(&mut self) -> Vec<ManagedService> {
        let mut drained = Vec::with_capacity(self.services.len());
        while let Some(service) = self.services.pop() {
            drained.push(service);
        }
        drained
    }
}
