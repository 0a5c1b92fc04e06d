use crate::config::cli::Cli;
use crate::config::{Interpolator, StackConfig};
use crate::utils::error::Result;

pub mod config;
pub mod ps;
pub mod up;

/// 載入描述檔;--env-file 優先於描述檔旁的 .env
pub(crate) fn load_stack(cli: &Cli) -> Result<StackConfig> {
    let path = cli.descriptor_path();
    tracing::info!("📁 Loading stack descriptor: {}", path.display());
    match cli.env_file_override() {
        Some(env_path) => {
            let interp = Interpolator::from_env_file(&env_path)?;
            StackConfig::from_file_with(&path, &interp)
        }
        None => StackConfig::from_file(&path),
    }
}
