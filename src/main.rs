use clap::Parser;
use small_stack::config::cli::{Cli, Commands};
use small_stack::utils::logger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting small-stack CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let result = match &cli.command {
        Commands::Up { services, monitor } => {
            small_stack::app::commands::up::run(&cli, services, *monitor).await
        }
        Commands::Config { json, services } => {
            small_stack::app::commands::config::run(&cli, *json, *services)
        }
        Commands::Ps => small_stack::app::commands::ps::run(&cli),
    };

    if let Err(e) = result {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        // 輸出用戶友好的錯誤信息
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            small_stack::utils::error::ErrorSeverity::Low => 0, // 警告，但成功
            small_stack::utils::error::ErrorSeverity::Medium => 2, // 重試錯誤
            small_stack::utils::error::ErrorSeverity::High => 1, // 處理錯誤
            small_stack::utils::error::ErrorSeverity::Critical => 3, // 系統錯誤
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}
