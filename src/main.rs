// ==========================================
// 抽样方案引擎 - 命令行入口
// ==========================================
// 输出均为 JSON（stdout），日志输出到 stderr
// SAMPLING_PLAN_LOG_FORMAT=json 时日志为 JSON 行
// ==========================================

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use sampling_plan_engine::app::{get_default_db_path, AppState, DB_PATH_ENV};

const LOG_FORMAT_ENV: &str = "SAMPLING_PLAN_LOG_FORMAT";

#[derive(Parser)]
#[command(name = "sampling-plan")]
#[command(version, about = "抽样方案引擎")]
struct Cli {
    /// 数据库路径（默认: 环境变量或用户数据目录）
    #[arg(long, global = true, env = DB_PATH_ENV)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化数据库
    Init,

    /// 列出 NQA
    Levels {
        /// 只列出启用的 NQA
        #[arg(long)]
        active_only: bool,
    },

    /// 列出 NQA 的抽样区间（含缺口）
    Ranges { nqa_code: String },

    /// 查询分组的抽样方案
    Plan { group_id: i64, lot_size: i64 },

    /// 按 NQA 代码查询抽样方案
    LevelPlan { nqa_code: String, lot_size: i64 },

    /// 导入抽样表（.csv / .xlsx / .xls）
    Import {
        file: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// 统计信息
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    match std::env::var(LOG_FORMAT_ENV) {
        Ok(v) if v.eq_ignore_ascii_case("json") => sampling_plan_engine::logging::init_json(),
        _ => sampling_plan_engine::logging::init(),
    }

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(get_default_db_path);

    tracing::info!("{} v{}", sampling_plan_engine::APP_NAME, sampling_plan_engine::VERSION);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Init => {
            print_json(&serde_json::json!({ "db_path": state.db_path, "initialized": true }))
        }
        Commands::Levels { active_only } => print_json(&state.nqa_api.list(active_only)?),
        Commands::Ranges { nqa_code } => {
            let level = state.nqa_api.get_by_code(&nqa_code)?;
            print_json(&state.sampling_range_api.listing_by_level(&level.level_id)?)
        }
        Commands::Plan { group_id, lot_size } => {
            print_json(&state.plan_api.get_plan(group_id, lot_size)?)
        }
        Commands::LevelPlan { nqa_code, lot_size } => {
            print_json(&state.plan_api.get_plan_for_level_code(&nqa_code, lot_size)?)
        }
        Commands::Import { file, actor } => {
            let response = state.import_api.import_sampling_table(&file, &actor).await?;
            print_json(&response)
        }
        Commands::Summary => print_json(&state.plan_api.summary()?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
