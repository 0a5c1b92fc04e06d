use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Exec-form or shell-form command line, as written in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Shell(String),
    Exec(Vec<String>),
}

impl CommandSpec {
    pub fn display_oneline(&self) -> String {
        match self {
            CommandSpec::Shell(s) => s.clone(),
            CommandSpec::Exec(argv) => argv.join(" "),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CommandSpec::Shell(s) => s.trim().is_empty(),
            CommandSpec::Exec(argv) => argv.is_empty(),
        }
    }
}

/// Everything the process runner needs to start one OS process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub command: CommandSpec,
    pub env: BTreeMap<String, String>,
    pub workdir: Option<PathBuf>,
    pub pipe_output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exited with code {}", code),
            (None, Some(signal)) => format!("killed by signal {}", signal),
            (None, None) => "exited".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependsCondition {
    ServiceStarted,
    ServiceHealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub service: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    Named(String),
    Bind(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMapping {
    pub source: VolumeSource,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeCommand {
    Exec(Vec<String>),
    Shell(String),
    Tcp(String),
    Http(String),
}

/// Healthcheck with defaults applied and the test form normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHealthcheck {
    pub test: ProbeCommand,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub start_period: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Starting => write!(f, "starting"),
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Pending,
    Initializing,
    Running,
    Exited,
    Stopped,
    Failed,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Pending => write!(f, "pending"),
            ServiceState::Initializing => write!(f, "initializing"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Exited => write!(f, "exited"),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ServiceStatus {
    fn pending() -> Self {
        Self {
            state: ServiceState::Pending,
            pid: None,
            health: None,
            exit_code: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Snapshot of one stack run, persisted as state.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceStatus>,
}

impl StackState {
    pub fn new(name: &str, service_names: impl IntoIterator<Item = String>) -> Self {
        let services = service_names
            .into_iter()
            .map(|n| (n, ServiceStatus::pending()))
            .collect();
        Self {
            name: name.to_string(),
            updated_at: Utc::now(),
            services,
        }
    }

    fn entry(&mut self, service: &str) -> &mut ServiceStatus {
        self.updated_at = Utc::now();
        self.services
            .entry(service.to_string())
            .or_insert_with(ServiceStatus::pending)
    }

    pub fn record_state(&mut self, service: &str, state: ServiceState) {
        self.entry(service).state = state;
    }

    pub fn record_running(&mut self, service: &str, pid: u32) {
        let status = self.entry(service);
        status.state = ServiceState::Running;
        status.pid = Some(pid);
        status.started_at = Some(Utc::now());
    }

    pub fn record_health(&mut self, service: &str, health: HealthState) {
        self.entry(service).health = Some(health);
    }

    pub fn record_exit(&mut self, service: &str, info: ExitInfo, stopped: bool) {
        let status = self.entry(service);
        status.state = if stopped {
            ServiceState::Stopped
        } else if info.success() {
            ServiceState::Exited
        } else {
            ServiceState::Failed
        };
        status.exit_code = info.code;
        status.pid = None;
        status.finished_at = Some(Utc::now());
    }

    pub fn record_failed(&mut self, service: &str, exit_code: Option<i32>) {
        let status = self.entry(service);
        status.state = ServiceState::Failed;
        status.exit_code = exit_code;
        status.finished_at = Some(Utc::now());
    }
}

/// Runtime notifications flowing from probe and exit watchers to the engine.
#[derive(Debug, Clone)]
pub enum StackEvent {
    Health { service: String, state: HealthState },
    Exited { service: String, info: ExitInfo },
}
