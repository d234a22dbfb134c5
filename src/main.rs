// ==========================================
// 注塑排产系统 - 命令行入口
// ==========================================
// 用法: mold-aps [db_path] [--dry-run]
// 说明: 初始化表结构后执行一次排产，结果以 JSON 输出到标准输出
// ==========================================

use anyhow::Context;
use mold_aps::api::ScheduleExecutionResponse;
use mold_aps::app::{get_default_db_path, AppState};

struct CliArgs {
    db_path: String,
    dry_run: bool,
}

fn parse_args() -> CliArgs {
    let mut db_path = None;
    let mut dry_run = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            other if db_path.is_none() => db_path = Some(other.to_string()),
            other => tracing::warn!(arg = other, "忽略多余的命令行参数"),
        }
    }

    CliArgs {
        db_path: db_path.unwrap_or_else(get_default_db_path),
        dry_run,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    mold_aps::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", mold_aps::APP_NAME);
    tracing::info!("系统版本: {}", mold_aps::VERSION);
    tracing::info!("==================================================");

    let args = parse_args();
    tracing::info!(db_path = %args.db_path, dry_run = args.dry_run, "使用数据库");

    let state = AppState::new(args.db_path.clone())
        .map_err(anyhow::Error::msg)
        .context("无法初始化AppState")?;

    let outcome = if args.dry_run {
        state.scheduling_api.execute_dry_run().await
    } else {
        state.scheduling_api.execute().await
    };

    let (response, failed) = match outcome {
        Ok(resp) => (resp, false),
        Err(e) => {
            tracing::error!(error = %e, "排产执行失败");
            (ScheduleExecutionResponse::failure(&e), true)
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("结果序列化失败")?
    );

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
