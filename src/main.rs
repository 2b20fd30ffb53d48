// ==========================================
// 固化罐装载分配系统 - 命令行入口
// ==========================================
// 用法:
//   autoclave-aps                 预览全部待固化工单（不落库）
//   autoclave-aps preview <曲线>  只预览指定固化曲线
//   autoclave-aps run-automatic   自动运行并以 Pending 落库
// 数据库路径: AUTOCLAVE_APS_DB_PATH 或用户数据目录
// ==========================================

use std::process::ExitCode;

use autoclave_aps::app::{get_default_db_path, AppState};
use autoclave_aps::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // AUTOCLAVE_APS_LOG_FORMAT=json 时输出 JSON 行日志
    match std::env::var("AUTOCLAVE_APS_LOG_FORMAT").as_deref() {
        Ok("json") => logging::init_json(),
        _ => logging::init(),
    }

    tracing::info!("==================================================");
    tracing::info!("{}", autoclave_aps::APP_NAME);
    tracing::info!("系统版本: {}", autoclave_aps::VERSION);
    tracing::info!("==================================================");

    match run().await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("运行失败: {}", e);
            eprintln!("错误: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<String> {
    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(anyhow::Error::msg)?;
    let config = state
        .config_manager
        .load_allocation_config()
        .map_err(|e| anyhow::anyhow!("加载分配配置失败: {}", e))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let output = match args.first().map(String::as_str) {
        Some("run-automatic") => {
            let result = state.allocation_api.run_automatic(&config).await?;
            serde_json::to_string_pretty(&result)?
        }
        Some("preview") | None => {
            let cycle = args.get(1).map(String::as_str);
            let outcome = state.allocation_api.preview(cycle, &config).await?;
            serde_json::to_string_pretty(&outcome)?
        }
        Some(other) => anyhow::bail!("未知命令: {}（可用: preview [曲线], run-automatic）", other),
    };
    Ok(output)
}
