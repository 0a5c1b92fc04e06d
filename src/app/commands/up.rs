use crate::adapters::TokioProcessRunner;
use crate::config::cli::Cli;
use crate::core::engine::StackEngine;
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use std::sync::Arc;

/// up 子命令:驗證描述檔,帶起堆疊並在前景監管到結束
pub async fn run(cli: &Cli, services: &[String], monitor: bool) -> Result<()> {
    let config = super::load_stack(cli)?;
    config.validate()?;
    tracing::info!(
        "✅ Descriptor is valid ({} services)",
        config.services.len()
    );

    if monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let engine = StackEngine::new(
        config,
        &cli.descriptor_dir(),
        &cli.resolve_state_dir(),
        Arc::new(TokioProcessRunner::new()),
    )
    .with_selection(services.to_vec())
    .with_monitoring(monitor);

    engine.up().await
}
