// ==========================================
// 烘焙管理系统 - 命令行入口
// ==========================================
// 用法:
//   bakery-bom [--db <path>] export <file.json>
//   bakery-bom [--db <path>] import <file.json>
//   bakery-bom [--db <path>] cost <assembly_slug>
//   bakery-bom [--db <path>] plan <plan_slug>
// 未指定 --db 时使用 BAKERY_BOM_DB_PATH 或用户数据目录
// ==========================================

use anyhow::{anyhow, bail, Context};
use bakery_bom::api::map_api_error;
use bakery_bom::app::{get_default_db_path, AppState};
use bakery_bom::logging;

fn main() -> anyhow::Result<()> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.iter().position(|a| a == "--db") {
        Some(idx) => {
            if idx + 1 >= args.len() {
                bail!("--db 缺少路径参数");
            }
            let path = args.remove(idx + 1);
            args.remove(idx);
            path
        }
        None => get_default_db_path(),
    };

    tracing::info!("{} v{}", bakery_bom::APP_NAME, bakery_bom::VERSION);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(|e| anyhow!(e)).context("初始化AppState失败")?;

    let command = args.first().map(String::as_str).unwrap_or("help");
    let target = args.get(1).map(String::as_str);

    match (command, target) {
        ("export", Some(path)) => {
            let resp = state.import_api.export_to_file(path).map_err(api_err)?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        ("import", Some(path)) => {
            let resp = state.import_api.import_from_file(path).map_err(api_err)?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        ("cost", Some(slug)) => {
            let breakdown = state.bom_api.cost_breakdown(slug).map_err(api_err)?;
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
        }
        ("plan", Some(slug)) => {
            let snapshot = match state.plan_api.latest_snapshot(slug).map_err(api_err)? {
                Some(s) => s,
                None => state.plan_api.calculate(slug).map_err(api_err)?,
            };
            let verdict = state
                .plan_api
                .check_and_invalidate(&snapshot.snapshot_id)
                .map_err(api_err)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        _ => {
            println!("用法: bakery-bom [--db <path>] <export|import|cost|plan> <参数>");
        }
    }

    Ok(())
}

fn api_err(err: bakery_bom::api::ApiError) -> anyhow::Error {
    anyhow!(map_api_error(err))
}
