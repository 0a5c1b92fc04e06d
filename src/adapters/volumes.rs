use crate::config::stack_config::{StackConfig, VolumeOptions};
use crate::domain::model::{CommandSpec, VolumeMapping, VolumeSource};
use crate::utils::error::{Result, StackError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 具名卷以 state 目錄下的本地目錄實現
///
/// 目錄在第一次 provision 時建立,之後的執行重複使用同一個目錄,
/// 服務重建後資料仍然存在。
pub struct LocalVolumes {
    root: PathBuf,
    base_dir: PathBuf,
}

impl LocalVolumes {
    pub fn new(state_dir: &Path, base_dir: &Path) -> Self {
        Self {
            root: state_dir.join("volumes"),
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// 計算具名卷的目錄位置,不做任何建立動作
    pub fn path_for(&self, name: &str, options: Option<&VolumeOptions>) -> PathBuf {
        match options.and_then(|o| o.path.as_ref()) {
            Some(path) => self.resolve_relative(path),
            None => self.root.join(name),
        }
    }

    fn resolve_relative(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// 確保所有宣告的具名卷目錄存在,回傳名稱到路徑的映射
    pub fn provision(&self, config: &StackConfig) -> Result<BTreeMap<String, PathBuf>> {
        let mut paths = BTreeMap::new();
        for (name, options) in &config.volumes {
            let path = self.path_for(name, options.as_ref());
            if !path.exists() {
                std::fs::create_dir_all(&path)?;
                tracing::info!("📁 Created volume directory: {}", path.display());
            }
            paths.insert(name.clone(), path);
        }
        Ok(paths)
    }

    /// 計算掛載來源的目錄位置,不做任何建立動作
    pub fn source_path(&self, mapping: &VolumeMapping, config: &StackConfig) -> PathBuf {
        match &mapping.source {
            VolumeSource::Named(name) => {
                self.path_for(name, config.volumes.get(name).and_then(|o| o.as_ref()))
            }
            VolumeSource::Bind(path) => self.resolve_relative(path),
        }
    }

    /// 解析掛載來源:具名卷取 provision 的目錄,bind 路徑相對描述檔目錄
    pub fn resolve_mount(
        &self,
        mapping: &VolumeMapping,
        named: &BTreeMap<String, PathBuf>,
    ) -> Result<PathBuf> {
        match &mapping.source {
            VolumeSource::Named(name) => {
                named
                    .get(name)
                    .cloned()
                    .ok_or_else(|| StackError::ConfigValidationError {
                        field: "volumes".to_string(),
                        message: format!("Named volume '{}' was not provisioned", name),
                    })
            }
            VolumeSource::Bind(path) => {
                let resolved = self.resolve_relative(path);
                if !resolved.exists() {
                    std::fs::create_dir_all(&resolved)?;
                }
                Ok(resolved)
            }
        }
    }
}

/// 把命令與環境值中的目標路徑改寫成實際目錄
pub fn apply_mount(
    command: &mut CommandSpec,
    env: &mut BTreeMap<String, String>,
    target: &str,
    source: &Path,
) {
    let source = source.to_string_lossy();
    match command {
        CommandSpec::Shell(line) => *line = replace_path_prefix(line, target, &source),
        CommandSpec::Exec(argv) => {
            for arg in argv.iter_mut() {
                *arg = replace_path_prefix(arg, target, &source);
            }
        }
    }
    for value in env.values_mut() {
        *value = replace_path_prefix(value, target, &source);
    }
}

/// 路徑前綴替換,只在完整的路徑片段邊界上比對
pub fn replace_path_prefix(haystack: &str, target: &str, source: &str) -> String {
    fn is_path_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '~' | '/')
    }

    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;

    while let Some(idx) = rest.find(target) {
        let before_ok = idx == 0
            || !rest[..idx]
                .chars()
                .next_back()
                .map(is_path_char)
                .unwrap_or(false);
        let after = &rest[idx + target.len()..];
        let after_ok = match after.chars().next() {
            None => true,
            Some('/') => true,
            Some(c) => !is_path_char(c),
        };

        if before_ok && after_ok {
            out.push_str(&rest[..idx]);
            out.push_str(source);
            rest = after;
        } else {
            let step = idx + 1;
            out.push_str(&rest[..step]);
            rest = &rest[step..];
        }
    }

    out.push_str(rest);
    out
}
