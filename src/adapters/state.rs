use crate::domain::model::StackState;
use crate::utils::error::{Result, StackError};
use std::path::{Path, PathBuf};

/// state.json 的讀寫
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("state.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, state: &StackState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn load(&self) -> Result<StackState> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StackError::StateError {
                    message: format!(
                        "No recorded state at {} (run 'up' first)",
                        self.path.display()
                    ),
                }
            } else {
                StackError::IoError(e)
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}
