use super::core::ActionLogRepository;
use crate::db::format_ts;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::{conversion_err, ts_col};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};

const SELECT_LOG: &str = r#"
    SELECT action_id, action_type, action_ts, actor,
           target_slug, payload_json, detail
    FROM action_log
"#;

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 action_id 查询单个日志
    pub fn find_by_id(conn: &Connection, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let sql = format!("{} WHERE action_id = ?1", SELECT_LOG);
        Ok(conn.query_row(&sql, params![action_id], map_row).optional()?)
    }

    /// 查询某个对象的操作日志（按时间倒序）
    pub fn find_by_target(conn: &Connection, target_slug: &str) -> RepositoryResult<Vec<ActionLog>> {
        let sql = format!("{} WHERE target_slug = ?1 ORDER BY action_ts DESC", SELECT_LOG);
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![target_slug], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 按操作类型查询
    pub fn find_by_action_type(conn: &Connection, action_type: ActionType) -> RepositoryResult<Vec<ActionLog>> {
        let sql = format!("{} WHERE action_type = ?1 ORDER BY action_ts DESC", SELECT_LOG);
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![action_type.as_str()], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 查询指定时间范围的操作日志
    pub fn find_by_time_range(
        conn: &Connection,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> RepositoryResult<Vec<ActionLog>> {
        let sql = format!("{} WHERE action_ts BETWEEN ?1 AND ?2 ORDER BY action_ts DESC", SELECT_LOG);
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![format_ts(&start_time), format_ts(&end_time)], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 查询最近的操作日志
    pub fn find_recent(conn: &Connection, limit: i64) -> RepositoryResult<Vec<ActionLog>> {
        let sql = format!("{} ORDER BY action_ts DESC LIMIT ?1", SELECT_LOG);
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![limit], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 统计日志条数
    pub fn count(conn: &Connection) -> RepositoryResult<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM action_log", [], |row| row.get(0))?)
    }
}

fn map_row(row: &Row) -> SqliteResult<ActionLog> {
    let action_type_raw: String = row.get(1)?;
    let action_type = ActionType::parse(&action_type_raw)
        .ok_or_else(|| conversion_err(1, format!("未知操作类型: {}", action_type_raw)))?;
    let payload_raw: Option<String> = row.get(5)?;
    let payload_json = payload_raw.and_then(|s| serde_json::from_str(&s).ok());

    Ok(ActionLog {
        action_id: row.get(0)?,
        action_type,
        action_ts: ts_col(row, 2)?,
        actor: row.get(3)?,
        target_slug: row.get(4)?,
        payload_json,
        detail: row.get(6)?,
    })
}
