use crate::config::env_file;
use crate::utils::error::Result;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::Path;

/// 描述檔的 `${VAR}` 變數替換
///
/// 查找順序:OS 環境變數優先,其次是專案 env 檔的變數。
/// 兩者皆無時替換為空字串並記錄警告,不會讓解析失敗。
pub struct Interpolator {
    file_vars: BTreeMap<String, String>,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpolator {
    pub fn new() -> Self {
        Self {
            file_vars: BTreeMap::new(),
        }
    }

    pub fn with_vars(file_vars: BTreeMap<String, String>) -> Self {
        Self { file_vars }
    }

    /// 從專案 env 檔建立 (檔案不存在時沒有檔案變數)
    pub fn from_env_file_if_exists<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::with_vars(env_file::load_if_exists(path)?))
    }

    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::with_vars(env_file::load(path)?))
    }

    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name)
            .ok()
            .or_else(|| self.file_vars.get(name).cloned())
    }

    fn resolve_or_empty(&self, name: &str) -> String {
        self.lookup(name).unwrap_or_else(|| {
            tracing::warn!(
                "⚠️ Variable '{}' is not set, substituting an empty string",
                name
            );
            String::new()
        })
    }

    /// 替換 `$VAR`、`${VAR}`、`${VAR:-default}`、`${VAR-default}`;`$$` 轉義為 `$`
    pub fn substitute(&self, content: &str) -> String {
        let re = Regex::new(r"\$(?:\$|\{([^}]+)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap();

        re.replace_all(content, |caps: &Captures| {
            if let Some(braced) = caps.get(1) {
                self.expand_braced(braced.as_str(), &caps[0])
            } else if let Some(bare) = caps.get(2) {
                self.resolve_or_empty(bare.as_str())
            } else {
                "$".to_string()
            }
        })
        .to_string()
    }

    fn expand_braced(&self, inner: &str, original: &str) -> String {
        let name_len = inner
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(inner.len());
        let (name, rest) = inner.split_at(name_len);

        if name.is_empty() {
            return original.to_string();
        }

        if rest.is_empty() {
            self.resolve_or_empty(name)
        } else if let Some(default) = rest.strip_prefix(":-") {
            // 未設定或為空字串時使用預設值
            match self.lookup(name) {
                Some(value) if !value.is_empty() => value,
                _ => default.to_string(),
            }
        } else if let Some(default) = rest.strip_prefix('-') {
            // 僅未設定時使用預設值
            self.lookup(name).unwrap_or_else(|| default.to_string())
        } else {
            original.to_string()
        }
    }
}
