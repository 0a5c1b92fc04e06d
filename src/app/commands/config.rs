use crate::adapters::LocalVolumes;
use crate::config::cli::Cli;
use crate::config::stack_config::{EnvVars, FileList, StackConfig};
use crate::core::plan::StartupPlan;
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use std::path::Path;

/// config 子命令:驗證並輸出解析後的描述檔
pub fn run(cli: &Cli, json: bool, services: bool) -> Result<()> {
    let config = super::load_stack(cli)?;
    config.validate()?;

    if services {
        // 只列啟動順序,一行一個服務
        let plan = StartupPlan::build(&config, None)?;
        for name in plan.startup_order() {
            println!("{}", name);
        }
        return Ok(());
    }

    let resolved = resolved_view(&config, &cli.descriptor_dir(), &cli.resolve_state_dir())?;
    let rendered = if json {
        serde_json::to_string_pretty(&resolved)?
    } else {
        serde_yaml::to_string(&resolved)?
    };
    println!("{}", rendered);
    Ok(())
}

/// 展開每個服務實際生效的環境變數,並把卷來源換成具體目錄
///
/// 輸出的是 up 實際會使用的值:env_file 已併入 environment,
/// 具名卷與 bind 掛載的來源都是主機上的路徑。純計算,不建立目錄。
fn resolved_view(config: &StackConfig, base_dir: &Path, state_dir: &Path) -> Result<StackConfig> {
    let volumes = LocalVolumes::new(state_dir, base_dir);
    let mut resolved = config.clone();

    for (name, service) in resolved.services.iter_mut() {
        let env = config.resolved_environment(name, base_dir)?;
        service.environment = EnvVars::Map(
            env.into_iter()
                .map(|(key, value)| (key, serde_yaml::Value::String(value)))
                .collect(),
        );
        service.env_file = FileList::default();

        let mappings = service.parsed_volumes(&format!("services.{}.volumes", name))?;
        service.volumes = mappings
            .iter()
            .map(|mapping| {
                format!(
                    "{}:{}",
                    volumes.source_path(mapping, config).display(),
                    mapping.target
                )
            })
            .collect();
    }

    Ok(resolved)
}
