use crate::config::interpolate::Interpolator;
use crate::config::{duration, env_file};
use crate::domain::model::{
    CommandSpec, DependsCondition, PortMapping, ProbeCommand, ResolvedHealthcheck, VolumeMapping,
    VolumeSource,
};
use crate::utils::error::{Result, StackError};
use crate::utils::validation::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    #[serde(default = "default_stack_name")]
    pub name: String,
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Option<VolumeOptions>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeOptions {
    /// 覆寫具名卷的實際存放目錄
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub command: CommandSpec,
    /// 啟動前先執行到結束的一次性命令 (例如資料庫遷移)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<CommandSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "FileList::is_empty")]
    pub env_file: FileList,
    #[serde(default, skip_serializing_if = "EnvVars::is_empty")]
    pub environment: EnvVars,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "DependsOn::is_empty")]
    pub depends_on: DependsOn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthcheckConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
    #[serde(
        default = "default_stop_grace",
        with = "crate::config::duration",
        skip_serializing_if = "is_default_stop_grace"
    )]
    pub stop_grace_period: Duration,
}

/// 單一路徑或路徑列表
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileList {
    One(String),
    Many(Vec<String>),
}

impl Default for FileList {
    fn default() -> Self {
        FileList::Many(Vec::new())
    }
}

impl FileList {
    pub fn as_vec(&self) -> Vec<&str> {
        match self {
            FileList::One(path) => vec![path.as_str()],
            FileList::Many(paths) => paths.iter().map(|p| p.as_str()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FileList::One(path) => path.is_empty(),
            FileList::Many(paths) => paths.is_empty(),
        }
    }
}

/// 環境變數,接受映射或 KEY=VALUE 列表兩種寫法
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvVars {
    List(Vec<String>),
    Map(BTreeMap<String, serde_yaml::Value>),
}

impl Default for EnvVars {
    fn default() -> Self {
        EnvVars::Map(BTreeMap::new())
    }
}

impl EnvVars {
    pub fn is_empty(&self) -> bool {
        match self {
            EnvVars::List(entries) => entries.is_empty(),
            EnvVars::Map(map) => map.is_empty(),
        }
    }

    pub fn to_map(&self, field: &str) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        match self {
            EnvVars::List(entries) => {
                for entry in entries {
                    match entry.split_once('=') {
                        Some((key, value)) => {
                            out.insert(key.to_string(), value.to_string());
                        }
                        // 只寫 KEY 時從執行者的環境繼承
                        None => {
                            if let Ok(value) = std::env::var(entry) {
                                out.insert(entry.clone(), value);
                            } else {
                                tracing::debug!(
                                    "Variable '{}' not present in the environment, skipping",
                                    entry
                                );
                            }
                        }
                    }
                }
            }
            EnvVars::Map(map) => {
                for (key, value) in map {
                    let rendered = match value {
                        serde_yaml::Value::String(s) => s.clone(),
                        serde_yaml::Value::Number(n) => n.to_string(),
                        serde_yaml::Value::Bool(b) => b.to_string(),
                        serde_yaml::Value::Null => String::new(),
                        other => {
                            return Err(StackError::InvalidConfigValueError {
                                field: format!("{}.{}", field, key),
                                value: format!("{:?}", other),
                                reason: "Environment values must be scalars".to_string(),
                            })
                        }
                    };
                    out.insert(key.clone(), rendered);
                }
            }
        }
        Ok(out)
    }
}

/// 依賴宣告,接受簡寫列表或帶條件的映射
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, DependsOnEntry>),
}

impl Default for DependsOn {
    fn default() -> Self {
        DependsOn::List(Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependsOnEntry {
    #[serde(default = "default_condition")]
    pub condition: DependsCondition,
}

impl DependsOn {
    pub fn is_empty(&self) -> bool {
        match self {
            DependsOn::List(names) => names.is_empty(),
            DependsOn::Map(entries) => entries.is_empty(),
        }
    }

    pub fn normalized(&self) -> BTreeMap<String, DependsCondition> {
        match self {
            DependsOn::List(names) => names
                .iter()
                .map(|n| (n.clone(), DependsCondition::ServiceStarted))
                .collect(),
            DependsOn::Map(entries) => entries
                .iter()
                .map(|(n, e)| (n.clone(), e.condition))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthcheckConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<ProbeTest>,
    #[serde(default = "default_interval", with = "crate::config::duration")]
    pub interval: Duration,
    #[serde(default = "default_timeout", with = "crate::config::duration")]
    pub timeout: Duration,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_start_period", with = "crate::config::duration")]
    pub start_period: Duration,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disable: bool,
}

/// 探測命令的原始寫法:字串視為 shell 命令,列表第一項為種類標籤
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeTest {
    Command(String),
    List(Vec<String>),
}

impl HealthcheckConfig {
    /// 套用預設值並正規化探測種類
    pub fn resolve(&self, field: &str) -> Result<Option<ResolvedHealthcheck>> {
        if self.disable {
            return Ok(None);
        }

        let raw = crate::utils::validation::validate_required_field(
            &format!("{}.test", field),
            &self.test,
        )?;

        let test = match raw {
            ProbeTest::Command(cmd) => {
                crate::utils::validation::validate_non_empty_string(
                    &format!("{}.test", field),
                    cmd,
                )?;
                ProbeCommand::Shell(cmd.clone())
            }
            ProbeTest::List(items) => {
                let kind = items.first().map(|s| s.as_str()).unwrap_or("");
                let rest = &items[items.len().min(1)..];
                match kind {
                    "NONE" => return Ok(None),
                    "CMD" => {
                        if rest.is_empty() {
                            return Err(StackError::InvalidConfigValueError {
                                field: format!("{}.test", field),
                                value: "CMD".to_string(),
                                reason: "CMD requires at least one argument".to_string(),
                            });
                        }
                        ProbeCommand::Exec(rest.to_vec())
                    }
                    "CMD-SHELL" => match rest {
                        [cmd] => ProbeCommand::Shell(cmd.clone()),
                        _ => {
                            return Err(StackError::InvalidConfigValueError {
                                field: format!("{}.test", field),
                                value: items.join(" "),
                                reason: "CMD-SHELL takes exactly one command string".to_string(),
                            })
                        }
                    },
                    "TCP" => match rest {
                        [addr] => {
                            parse_tcp_address(&format!("{}.test", field), addr)?;
                            ProbeCommand::Tcp(addr.clone())
                        }
                        _ => {
                            return Err(StackError::InvalidConfigValueError {
                                field: format!("{}.test", field),
                                value: items.join(" "),
                                reason: "TCP takes exactly one host:port address".to_string(),
                            })
                        }
                    },
                    "HTTP" => match rest {
                        [endpoint] => {
                            crate::utils::validation::validate_url(
                                &format!("{}.test", field),
                                endpoint,
                            )?;
                            ProbeCommand::Http(endpoint.clone())
                        }
                        _ => {
                            return Err(StackError::InvalidConfigValueError {
                                field: format!("{}.test", field),
                                value: items.join(" "),
                                reason: "HTTP takes exactly one URL".to_string(),
                            })
                        }
                    },
                    other => {
                        return Err(StackError::InvalidConfigValueError {
                            field: format!("{}.test", field),
                            value: other.to_string(),
                            reason: "Expected CMD, CMD-SHELL, TCP, HTTP or NONE".to_string(),
                        })
                    }
                }
            }
        };

        if self.interval.is_zero() || self.timeout.is_zero() {
            return Err(StackError::InvalidConfigValueError {
                field: field.to_string(),
                value: "0s".to_string(),
                reason: "interval and timeout must be greater than zero".to_string(),
            });
        }
        crate::utils::validation::validate_positive_number(
            &format!("{}.retries", field),
            self.retries as usize,
            1,
        )?;

        Ok(Some(ResolvedHealthcheck {
            test,
            interval: self.interval,
            timeout: self.timeout,
            retries: self.retries,
            start_period: self.start_period,
        }))
    }
}

impl ServiceConfig {
    pub fn depends(&self) -> BTreeMap<String, DependsCondition> {
        self.depends_on.normalized()
    }

    pub fn parsed_ports(&self, field: &str) -> Result<Vec<PortMapping>> {
        self.ports
            .iter()
            .map(|raw| parse_port_mapping(field, raw))
            .collect()
    }

    pub fn parsed_volumes(&self, field: &str) -> Result<Vec<VolumeMapping>> {
        self.volumes
            .iter()
            .map(|raw| parse_volume_mapping(field, raw))
            .collect()
    }

    /// 解析 extra_hosts,`host-gateway` 別名對應到 127.0.0.1
    pub fn parsed_extra_hosts(&self, field: &str) -> Result<Vec<(String, String)>> {
        self.extra_hosts
            .iter()
            .map(|raw| parse_extra_host(field, raw))
            .collect()
    }
}

fn parse_port_mapping(field: &str, raw: &str) -> Result<PortMapping> {
    let invalid = |reason: String| StackError::InvalidConfigValueError {
        field: field.to_string(),
        value: raw.to_string(),
        reason,
    };

    let (host_part, service_part) = match raw.split_once(':') {
        Some((h, s)) => (h, s),
        None => (raw, raw),
    };

    let parse_port = |part: &str| -> Result<u16> {
        let port: u32 = part
            .trim()
            .parse()
            .map_err(|_| invalid(format!("'{}' is not a port number", part)))?;
        crate::utils::validation::validate_range(field, port, 1, 65535)?;
        Ok(port as u16)
    };

    Ok(PortMapping {
        host: parse_port(host_part)?,
        service: parse_port(service_part)?,
    })
}

fn parse_volume_mapping(field: &str, raw: &str) -> Result<VolumeMapping> {
    let invalid = |reason: String| StackError::InvalidConfigValueError {
        field: field.to_string(),
        value: raw.to_string(),
        reason,
    };

    let parts: Vec<&str> = raw.split(':').collect();
    let (source, target) = match parts.as_slice() {
        [source, target] => (*source, *target),
        // 第三段是存取模式,行程掛載無從強制,略過
        [source, target, mode] if *mode == "ro" || *mode == "rw" => (*source, *target),
        _ => return Err(invalid("Expected 'source:/absolute/target'".to_string())),
    };

    if source.is_empty() {
        return Err(invalid("Volume source cannot be empty".to_string()));
    }
    crate::utils::validation::validate_absolute_path(field, target)?;

    let source = if source.starts_with('/') || source.starts_with('.') || source.starts_with('~') {
        VolumeSource::Bind(source.to_string())
    } else {
        crate::utils::validation::validate_name(field, source)?;
        VolumeSource::Named(source.to_string())
    };

    Ok(VolumeMapping {
        source,
        target: target.to_string(),
    })
}

fn parse_extra_host(field: &str, raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((host, address)) if !host.is_empty() && !address.is_empty() => {
            let address = if address == "host-gateway" {
                "127.0.0.1".to_string()
            } else {
                address.to_string()
            };
            Ok((host.to_string(), address))
        }
        _ => Err(StackError::InvalidConfigValueError {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "Expected 'hostname:address'".to_string(),
        }),
    }
}

fn parse_tcp_address(field: &str, raw: &str) -> Result<(String, u16)> {
    let invalid = |reason: String| StackError::InvalidConfigValueError {
        field: field.to_string(),
        value: raw.to_string(),
        reason,
    };

    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| invalid("Expected 'host:port'".to_string()))?;
    if host.is_empty() {
        return Err(invalid("Host cannot be empty".to_string()));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a port number", port)))?;
    Ok((host.to_string(), port))
}

impl StackConfig {
    /// 從 YAML 描述檔載入,描述檔旁的 .env 作為 ${VAR} 替換的專案變數
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let interp = Interpolator::from_env_file_if_exists(dir.join(".env"))?;
        Self::from_file_with(path, &interp)
    }

    pub fn from_file_with<P: AsRef<Path>>(path: P, interp: &Interpolator) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(StackError::IoError)?;
        Self::from_yaml_str_with(&content, interp)
    }

    /// 從 YAML 字串解析,只使用 OS 環境變數做替換
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_yaml_str_with(content, &Interpolator::new())
    }

    pub fn from_yaml_str_with(content: &str, interp: &Interpolator) -> Result<Self> {
        // 變數替換發生在解析之前,缺少的變數不會讓解析失敗
        let processed = interp.substitute(content);
        serde_yaml::from_str(&processed).map_err(StackError::YamlError)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// 驗證整份描述檔的合理性
    pub fn validate_config(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(StackError::MissingConfigError {
                field: "services".to_string(),
            });
        }

        crate::utils::validation::validate_name("name", &self.name)?;

        for (name, options) in &self.volumes {
            crate::utils::validation::validate_name("volumes", name)?;
            if let Some(path) = options.as_ref().and_then(|o| o.path.as_ref()) {
                crate::utils::validation::validate_path(&format!("volumes.{}.path", name), path)?;
            }
        }

        let mut published_ports: HashSet<u16> = HashSet::new();
        for (name, service) in &self.services {
            crate::utils::validation::validate_name("services", name)?;
            self.validate_service(name, service, &mut published_ports)?;
        }

        self.validate_dependencies()?;

        Ok(())
    }

    fn validate_service(
        &self,
        name: &str,
        service: &ServiceConfig,
        published_ports: &mut HashSet<u16>,
    ) -> Result<()> {
        if service.command.is_empty() {
            return Err(StackError::InvalidConfigValueError {
                field: format!("services.{}.command", name),
                value: service.command.display_oneline(),
                reason: "Command cannot be empty".to_string(),
            });
        }
        if let Some(init) = &service.init {
            if init.is_empty() {
                return Err(StackError::InvalidConfigValueError {
                    field: format!("services.{}.init", name),
                    value: init.display_oneline(),
                    reason: "Init command cannot be empty".to_string(),
                });
            }
        }

        if let Some(workdir) = &service.workdir {
            crate::utils::validation::validate_path(
                &format!("services.{}.workdir", name),
                workdir,
            )?;
        }
        for path in service.env_file.as_vec() {
            crate::utils::validation::validate_path(&format!("services.{}.env_file", name), path)?;
        }

        // 環境變數的純量檢查
        service
            .environment
            .to_map(&format!("services.{}.environment", name))?;

        for mapping in service.parsed_ports(&format!("services.{}.ports", name))? {
            if !published_ports.insert(mapping.host) {
                return Err(StackError::InvalidConfigValueError {
                    field: format!("services.{}.ports", name),
                    value: mapping.host.to_string(),
                    reason: "Host port is published more than once".to_string(),
                });
            }
        }

        for mapping in service.parsed_volumes(&format!("services.{}.volumes", name))? {
            if let VolumeSource::Named(volume) = &mapping.source {
                if !self.volumes.contains_key(volume) {
                    return Err(StackError::ConfigValidationError {
                        field: format!("services.{}.volumes", name),
                        message: format!(
                            "Named volume '{}' is not declared in the top-level volumes section",
                            volume
                        ),
                    });
                }
            }
        }

        service.parsed_extra_hosts(&format!("services.{}.extra_hosts", name))?;

        if let Some(healthcheck) = &service.healthcheck {
            healthcheck.resolve(&format!("services.{}.healthcheck", name))?;
        }

        for (dependency, condition) in service.depends() {
            let dep_service = self.services.get(&dependency).ok_or_else(|| {
                StackError::ConfigValidationError {
                    field: format!("services.{}.depends_on", name),
                    message: format!("Unknown service '{}' in depends_on", dependency),
                }
            })?;

            if condition == DependsCondition::ServiceHealthy {
                let has_healthcheck = match &dep_service.healthcheck {
                    Some(hc) => hc
                        .resolve(&format!("services.{}.healthcheck", dependency))?
                        .is_some(),
                    None => false,
                };
                if !has_healthcheck {
                    return Err(StackError::ConfigValidationError {
                        field: format!("services.{}.depends_on", name),
                        message: format!(
                            "Condition service_healthy requires '{}' to define a healthcheck",
                            dependency
                        ),
                    });
                }
            }
        }

        Ok(())
    }

    fn validate_dependencies(&self) -> Result<()> {
        // 檢查循環依賴
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for name in self.services.keys() {
            if !visited.contains(name)
                && self.has_circular_dependency(name, &mut visited, &mut rec_stack)
            {
                return Err(StackError::ConfigValidationError {
                    field: "services.depends_on".to_string(),
                    message: "Circular dependency detected between services".to_string(),
                });
            }
        }

        Ok(())
    }

    fn has_circular_dependency(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> bool {
        visited.insert(name.to_string());
        rec_stack.insert(name.to_string());

        if let Some(service) = self.services.get(name) {
            for dependency in service.depends().keys() {
                if !visited.contains(dependency) {
                    if self.has_circular_dependency(dependency, visited, rec_stack) {
                        return true;
                    }
                } else if rec_stack.contains(dependency) {
                    return true;
                }
            }
        }

        rec_stack.remove(name);
        false
    }

    /// 計算服務實際生效的環境變數
    ///
    /// env_file 依列出順序套用,inline environment 最後覆寫,
    /// 再將 extra_hosts 的主機名改寫進值裡。
    pub fn resolved_environment(
        &self,
        name: &str,
        base_dir: &Path,
    ) -> Result<BTreeMap<String, String>> {
        let service = self
            .service(name)
            .ok_or_else(|| StackError::MissingConfigError {
                field: format!("services.{}", name),
            })?;

        let mut env = BTreeMap::new();
        for path in service.env_file.as_vec() {
            env.extend(env_file::load(base_dir.join(path))?);
        }
        env.extend(
            service
                .environment
                .to_map(&format!("services.{}.environment", name))?,
        );

        let hosts = service.parsed_extra_hosts(&format!("services.{}.extra_hosts", name))?;
        if !hosts.is_empty() {
            for value in env.values_mut() {
                *value = rewrite_hosts(value, &hosts);
            }
        }

        Ok(env)
    }

    pub fn resolved_healthcheck(&self, name: &str) -> Result<Option<ResolvedHealthcheck>> {
        match self.service(name).and_then(|s| s.healthcheck.as_ref()) {
            Some(healthcheck) => healthcheck.resolve(&format!("services.{}.healthcheck", name)),
            None => Ok(None),
        }
    }
}

/// 將 extra_hosts 的主機名改寫為對應位址,只在非主機名字元的邊界上比對
fn rewrite_hosts(value: &str, hosts: &[(String, String)]) -> String {
    let mut out = value.to_string();
    for (host, address) in hosts {
        let pattern = format!(
            "(^|[^A-Za-z0-9.-]){}($|[^A-Za-z0-9.-])",
            regex::escape(host)
        );
        let re = Regex::new(&pattern).unwrap();
        out = re
            .replace_all(&out, format!("${{1}}{}${{2}}", address))
            .to_string();
    }
    out
}

fn default_stack_name() -> String {
    "stack".to_string()
}

fn default_condition() -> DependsCondition {
    DependsCondition::ServiceStarted
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_retries() -> u32 {
    3
}

fn default_start_period() -> Duration {
    Duration::ZERO
}

fn default_stop_grace() -> Duration {
    Duration::from_secs(10)
}

fn is_default_stop_grace(value: &Duration) -> bool {
    *value == default_stop_grace()
}

impl Validate for StackConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const COMPOSER_STACK: &str = r#"
name: workflow-composer
services:
  db:
    command: ["postgres", "-D", "/var/lib/postgresql/data"]
    environment:
      POSTGRES_DB: workflows
      POSTGRES_PORT: 5432
    ports:
      - "5432:5432"
    volumes:
      - pgdata:/var/lib/postgresql/data
    healthcheck:
      test: ["CMD", "pg_isready", "-U", "admin"]
      interval: 10s
      timeout: 5s
      retries: 5
  web:
    command: python manage.py runserver 0.0.0.0:8000
    init: python manage.py migrate
    env_file: web.env
    environment:
      - DEBUG=true
    ports:
      - "8000:8000"
    depends_on:
      db:
        condition: service_healthy
    extra_hosts:
      - "host.docker.internal:host-gateway"
volumes:
  pgdata:
"#;

    #[test]
    fn test_parse_two_service_stack() {
        let config = StackConfig::from_yaml_str(COMPOSER_STACK).unwrap();

        assert_eq!(config.name, "workflow-composer");
        assert_eq!(config.services.len(), 2);

        let db = config.service("db").unwrap();
        assert_eq!(
            db.command,
            CommandSpec::Exec(vec![
                "postgres".to_string(),
                "-D".to_string(),
                "/var/lib/postgresql/data".to_string()
            ])
        );
        assert_eq!(db.ports, vec!["5432:5432"]);

        let web = config.service("web").unwrap();
        assert!(matches!(web.command, CommandSpec::Shell(_)));
        assert!(web.init.is_some());
        assert_eq!(web.env_file.as_vec(), vec!["web.env"]);

        assert!(config.volumes.contains_key("pgdata"));
        config.validate_config().unwrap();
    }

    #[test]
    fn test_environment_forms() {
        let config = StackConfig::from_yaml_str(COMPOSER_STACK).unwrap();

        let db_env = config.service("db").unwrap().environment.to_map("x").unwrap();
        assert_eq!(db_env["POSTGRES_DB"], "workflows");
        assert_eq!(db_env["POSTGRES_PORT"], "5432"); // 數字純量轉成字串

        let web_env = config.service("web").unwrap().environment.to_map("x").unwrap();
        assert_eq!(web_env["DEBUG"], "true");
    }

    #[test]
    fn test_depends_on_forms() {
        let config = StackConfig::from_yaml_str(COMPOSER_STACK).unwrap();
        let deps = config.service("web").unwrap().depends();
        assert_eq!(deps["db"], DependsCondition::ServiceHealthy);

        let short = StackConfig::from_yaml_str(
            r#"
services:
  db:
    command: ["sleep", "1"]
  web:
    command: ["sleep", "1"]
    depends_on: [db]
"#,
        )
        .unwrap();
        let deps = short.service("web").unwrap().depends();
        assert_eq!(deps["db"], DependsCondition::ServiceStarted);
        short.validate_config().unwrap();
    }

    #[test]
    fn test_healthcheck_parsing_and_defaults() {
        let config = StackConfig::from_yaml_str(COMPOSER_STACK).unwrap();
        let hc = config.resolved_healthcheck("db").unwrap().unwrap();

        assert_eq!(hc.interval, Duration::from_secs(10));
        assert_eq!(hc.timeout, Duration::from_secs(5));
        assert_eq!(hc.retries, 5);
        assert_eq!(hc.start_period, Duration::ZERO);
        assert_eq!(
            hc.test,
            ProbeCommand::Exec(vec![
                "pg_isready".to_string(),
                "-U".to_string(),
                "admin".to_string()
            ])
        );

        // 未指定的欄位使用預設值
        let minimal = StackConfig::from_yaml_str(
            r#"
services:
  api:
    command: ["sleep", "1"]
    healthcheck:
      test: curl -f http://localhost:8000/
"#,
        )
        .unwrap();
        let hc = minimal.resolved_healthcheck("api").unwrap().unwrap();
        assert_eq!(hc.interval, Duration::from_secs(30));
        assert_eq!(hc.timeout, Duration::from_secs(30));
        assert_eq!(hc.retries, 3);
        assert!(matches!(hc.test, ProbeCommand::Shell(_)));
    }

    #[test]
    fn test_probe_test_forms() {
        let config = StackConfig::from_yaml_str(
            r#"
services:
  a:
    command: ["sleep", "1"]
    healthcheck:
      test: ["TCP", "localhost:5432"]
  b:
    command: ["sleep", "1"]
    healthcheck:
      test: ["HTTP", "http://localhost:8000/health"]
  c:
    command: ["sleep", "1"]
    healthcheck:
      test: ["NONE"]
  d:
    command: ["sleep", "1"]
    healthcheck:
      test: ["CMD", "true"]
      disable: true
"#,
        )
        .unwrap();

        assert_eq!(
            config.resolved_healthcheck("a").unwrap().unwrap().test,
            ProbeCommand::Tcp("localhost:5432".to_string())
        );
        assert_eq!(
            config.resolved_healthcheck("b").unwrap().unwrap().test,
            ProbeCommand::Http("http://localhost:8000/health".to_string())
        );
        assert!(config.resolved_healthcheck("c").unwrap().is_none());
        assert!(config.resolved_healthcheck("d").unwrap().is_none());
    }

    #[test]
    fn test_invalid_probe_kind_rejected() {
        let config = StackConfig::from_yaml_str(
            r#"
services:
  a:
    command: ["sleep", "1"]
    healthcheck:
      test: ["UDP", "localhost:53"]
"#,
        )
        .unwrap();
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_unknown_named_volume_rejected() {
        let config = StackConfig::from_yaml_str(
            r#"
services:
  db:
    command: ["sleep", "1"]
    volumes:
      - pgdata:/var/lib/postgresql/data
"#,
        )
        .unwrap();
        let err = config.validate_config().unwrap_err();
        assert!(err.to_string().contains("pgdata"));
    }

    #[test]
    fn test_circular_dependency_detection() {
        let config = StackConfig::from_yaml_str(
            r#"
services:
  a:
    command: ["sleep", "1"]
    depends_on: [b]
  b:
    command: ["sleep", "1"]
    depends_on: [a]
"#,
        )
        .unwrap();
        let err = config.validate_config().unwrap_err();
        assert!(err.to_string().contains("Circular dependency"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let config = StackConfig::from_yaml_str(
            r#"
services:
  web:
    command: ["sleep", "1"]
    depends_on: [ghost]
"#,
        )
        .unwrap();
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_misspelled_field_rejected_at_parse() {
        let err = StackConfig::from_yaml_str(
            r#"
services:
  web:
    comand: ["sleep", "1"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("comand"));
    }

    #[test]
    fn test_out_of_range_duration_rejected_at_parse() {
        let result = StackConfig::from_yaml_str(
            r#"
services:
  db:
    command: ["sleep", "1"]
    healthcheck:
      test: ["CMD", "true"]
      interval: 20000000000000000000s
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_healthy_condition_requires_healthcheck() {
        let config = StackConfig::from_yaml_str(
            r#"
services:
  db:
    command: ["sleep", "1"]
  web:
    command: ["sleep", "1"]
    depends_on:
      db:
        condition: service_healthy
"#,
        )
        .unwrap();
        let err = config.validate_config().unwrap_err();
        assert!(err.to_string().contains("healthcheck"));
    }

    #[test]
    fn test_duplicate_host_port_rejected() {
        let config = StackConfig::from_yaml_str(
            r#"
services:
  a:
    command: ["sleep", "1"]
    ports: ["8000:8000"]
  b:
    command: ["sleep", "1"]
    ports: ["8000:9000"]
"#,
        )
        .unwrap();
        let err = config.validate_config().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_port_parsing() {
        assert_eq!(
            parse_port_mapping("p", "8000:9000").unwrap(),
            PortMapping {
                host: 8000,
                service: 9000
            }
        );
        assert_eq!(
            parse_port_mapping("p", "5432").unwrap(),
            PortMapping {
                host: 5432,
                service: 5432
            }
        );
        assert!(parse_port_mapping("p", "0:80").is_err());
        assert!(parse_port_mapping("p", "eighty:80").is_err());
    }

    #[test]
    fn test_volume_parsing() {
        let named = parse_volume_mapping("v", "pgdata:/var/lib/postgresql/data").unwrap();
        assert_eq!(named.source, VolumeSource::Named("pgdata".to_string()));
        assert_eq!(named.target, "/var/lib/postgresql/data");

        let bind = parse_volume_mapping("v", "./migrations:/app/migrations:ro").unwrap();
        assert_eq!(bind.source, VolumeSource::Bind("./migrations".to_string()));

        assert!(parse_volume_mapping("v", "pgdata:relative/path").is_err());
        assert!(parse_volume_mapping("v", "bad volume:/data").is_err());
    }

    #[test]
    fn test_extra_hosts_gateway_alias() {
        let (host, address) =
            parse_extra_host("e", "host.docker.internal:host-gateway").unwrap();
        assert_eq!(host, "host.docker.internal");
        assert_eq!(address, "127.0.0.1");

        let (host, address) = parse_extra_host("e", "db.local:10.0.0.2").unwrap();
        assert_eq!(host, "db.local");
        assert_eq!(address, "10.0.0.2");

        assert!(parse_extra_host("e", "no-address").is_err());
    }

    #[test]
    fn test_rewrite_hosts_in_values() {
        let hosts = vec![(
            "host.docker.internal".to_string(),
            "127.0.0.1".to_string(),
        )];
        assert_eq!(
            rewrite_hosts("http://host.docker.internal:8000/api", &hosts),
            "http://127.0.0.1:8000/api"
        );
        // 不改寫較長主機名中的子字串
        assert_eq!(
            rewrite_hosts("http://xhost.docker.internal/", &hosts),
            "http://xhost.docker.internal/"
        );
    }

    #[test]
    fn test_resolved_environment_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = std::fs::File::create(dir.path().join("base.env")).unwrap();
        writeln!(base, "SHARED=from-base").unwrap();
        writeln!(base, "ONLY_BASE=1").unwrap();
        let mut extra = std::fs::File::create(dir.path().join("extra.env")).unwrap();
        writeln!(extra, "SHARED=from-extra").unwrap();

        let config = StackConfig::from_yaml_str(
            r#"
services:
  web:
    command: ["sleep", "1"]
    env_file:
      - base.env
      - extra.env
    environment:
      ONLY_BASE: overridden
"#,
        )
        .unwrap();

        let env = config.resolved_environment("web", dir.path()).unwrap();
        assert_eq!(env["SHARED"], "from-extra"); // 後面的 env_file 覆寫前面的
        assert_eq!(env["ONLY_BASE"], "overridden"); // inline 最優先
    }

    #[test]
    fn test_resolved_environment_rewrites_extra_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let config = StackConfig::from_yaml_str(
            r#"
services:
  web:
    command: ["sleep", "1"]
    environment:
      COMPOSER_URL: http://composer.internal:9000/generate
    extra_hosts:
      - "composer.internal:host-gateway"
"#,
        )
        .unwrap();

        let env = config.resolved_environment("web", dir.path()).unwrap();
        assert_eq!(env["COMPOSER_URL"], "http://127.0.0.1:9000/generate");
    }

    #[test]
    fn test_from_file_discovers_project_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "STACK_DB_NAME=workflows\n").unwrap();
        std::fs::write(
            dir.path().join("stack.yaml"),
            r#"
services:
  db:
    command: ["sleep", "1"]
    environment:
      POSTGRES_DB: ${STACK_DB_NAME}
"#,
        )
        .unwrap();

        let config = StackConfig::from_file(dir.path().join("stack.yaml")).unwrap();
        let env = config.service("db").unwrap().environment.to_map("x").unwrap();
        assert_eq!(env["POSTGRES_DB"], "workflows");
    }

    #[test]
    fn test_missing_variable_does_not_fail_parsing() {
        let config = StackConfig::from_yaml_str(
            r#"
services:
  db:
    command: ["sleep", "1"]
    environment:
      POSTGRES_DB: ${NOT_SET_DB_NAME_999}
"#,
        )
        .unwrap();
        let env = config.service("db").unwrap().environment.to_map("x").unwrap();
        assert_eq!(env["POSTGRES_DB"], "");
    }

    #[test]
    fn test_missing_command_is_a_parse_error() {
        let result = StackConfig::from_yaml_str(
            r#"
services:
  db:
    ports: ["5432:5432"]
"#,
        );
        assert!(result.is_err());
    }
}
