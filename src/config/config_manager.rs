// ==========================================
// 烘焙管理系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================
// 说明: 引擎在事务作用域内通过 load_bom_config(&Connection) 读取，
//       避免在已持有连接锁时再次加锁
// ==========================================

use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 默认最大嵌套层数（装配体套装配体）
pub const DEFAULT_MAX_DEPTH: usize = 3;

// ==========================================
// BomConfig - BOM 引擎配置
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomConfig {
    /// 最大嵌套层数（按装配体层级计）
    pub max_depth: usize,
    /// 陈旧判定后是否回写失效标记
    pub persist_stale_verdict: bool,
}

impl Default for BomConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            persist_stale_verdict: true,
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        Ok(read_value(&conn, key)?)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        write_value(&conn, key, value)?;
        tracing::info!(key, value, "配置已更新");
        Ok(())
    }

    /// 当前 BOM 配置
    pub fn get_bom_config(&self) -> Result<BomConfig, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        Ok(load_bom_config(&conn)?)
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

/// 在给定连接（可为事务内）上读取 BOM 配置
///
/// 配置缺失或格式错误时回退默认值并记录告警，不中断业务操作。
pub fn load_bom_config(conn: &Connection) -> rusqlite::Result<BomConfig> {
    let defaults = BomConfig::default();

    let max_depth = match read_value(conn, config_keys::BOM_MAX_DEPTH)? {
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(v) if v >= 1 => v,
            _ => {
                tracing::warn!(key = config_keys::BOM_MAX_DEPTH, value = %raw, "配置值无效，使用默认值");
                defaults.max_depth
            }
        },
        None => defaults.max_depth,
    };

    let persist_stale_verdict = match read_value(conn, config_keys::PLAN_PERSIST_STALE_VERDICT)? {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => {
                tracing::warn!(
                    key = config_keys::PLAN_PERSIST_STALE_VERDICT,
                    value = %raw,
                    "配置值无效，使用默认值"
                );
                defaults.persist_stale_verdict
            }
        },
        None => defaults.persist_stale_verdict,
    };

    Ok(BomConfig {
        max_depth,
        persist_stale_verdict,
    })
}

fn read_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
}

pub(crate) fn write_value(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
         ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value],
    )
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 组成图
    pub const BOM_MAX_DEPTH: &str = "bom.max_depth";

    // 计划快照
    pub const PLAN_PERSIST_STALE_VERDICT: &str = "plan.persist_stale_verdict";
}
