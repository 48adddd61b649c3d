// ==========================================
// 烘焙管理系统 - 应用状态
// ==========================================
// 职责: 打开数据库、建表，组装共享连接与各 API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{BomApi, ConfigApi, ImportApi, PlanApi};
use crate::config::config_manager::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::units::IdentityUnitConverter;
use crate::perf::install_sqlite_tracing;
use crate::repository::scope::TransactionScope;

/// 应用状态
///
/// 所有 API 共享同一连接（单进程、单写者）
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 事务作用域（共享连接）
    pub scope: TransactionScope,

    /// BOM API（组成图、成本、汇总、消耗）
    pub bom_api: Arc<BomApi>,

    /// 生产计划API
    pub plan_api: Arc<PlanApi>,

    /// 导入导出API
    pub import_api: Arc<ImportApi>,

    /// 配置API
    pub config_api: Arc<ConfigApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 成功创建
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let mut conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        install_sqlite_tracing(&mut conn);

        let conn = Arc::new(Mutex::new(conn));
        let scope = TransactionScope::new(conn.clone());

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn).map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        let bom_api = Arc::new(BomApi::new(scope.clone(), Arc::new(IdentityUnitConverter)));
        let plan_api = Arc::new(PlanApi::new(scope.clone()));
        let import_api = Arc::new(ImportApi::new(scope.clone()));
        let config_api = Arc::new(ConfigApi::new(scope.clone(), config_manager));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            scope,
            bom_api,
            plan_api,
            import_api,
            config_api,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

/// 默认数据库路径
///
/// 优先使用环境变量 BAKERY_BOM_DB_PATH，其次为用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("BAKERY_BOM_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./bakery_bom.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("bakery-bom-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("bakery-bom");
        }

        // 目录创建失败时仍返回该路径，由打开连接时报错
        std::fs::create_dir_all(&path).ok();
        path = path.join("bakery_bom.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_初始化_建表并可用() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();
        let state = AppState::new(db_path.clone()).unwrap();

        assert_eq!(state.get_db_path(), db_path);
        assert!(state.bom_api.list_assemblies().unwrap().is_empty());
        assert_eq!(state.config_api.get_bom_config().unwrap().max_depth, 3);
    }
}
