use crate::utils::error::{Result, StackError};
use std::collections::BTreeMap;
use std::path::Path;

/// 載入 env 檔案 (KEY=VALUE 格式，支援註解與引號)
pub fn load<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, String>> {
    let path = path.as_ref();
    let iter = dotenv::from_path_iter(path).map_err(|e| StackError::EnvFileError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut vars = BTreeMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| StackError::EnvFileError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        vars.insert(key, value);
    }

    Ok(vars)
}

/// 檔案不存在時回傳空的變數表
pub fn load_if_exists<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, String>> {
    if path.as_ref().exists() {
        load(path)
    } else {
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_basic_env_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# database settings").unwrap();
        writeln!(file, "POSTGRES_DB=workflows").unwrap();
        writeln!(file, "POSTGRES_USER=admin").unwrap();
        writeln!(file, "GREETING=\"hello world\"").unwrap();

        let vars = load(file.path()).unwrap();
        assert_eq!(vars["POSTGRES_DB"], "workflows");
        assert_eq!(vars["POSTGRES_USER"], "admin");
        assert_eq!(vars["GREETING"], "hello world");
        assert!(!vars.contains_key("# database settings"));
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = load("/definitely/not/here.env").unwrap_err();
        assert!(matches!(err, StackError::EnvFileError { .. }));
    }

    #[test]
    fn test_load_if_exists_missing_file_is_empty() {
        let vars = load_if_exists("/definitely/not/here.env").unwrap();
        assert!(vars.is_empty());
    }
}
