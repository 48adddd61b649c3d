use crate::db::format_ts;
use crate::domain::plan::{AggregatedIngredient, PlanSnapshot};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{conversion_err, money_col, money_to_sql, opt_ts_col, ts_col};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SNAPSHOT_COLUMNS: &str = "snapshot_id, plan_request_id, calculated_at, total_cost, \
     has_partial_cost, ingredients_json, invalidated_at, invalidation_reason";

// ==========================================
// PlanSnapshotRepository - 计划快照仓储
// ==========================================
pub struct PlanSnapshotRepository;

impl PlanSnapshotRepository {
    pub fn insert(conn: &Connection, snapshot: &PlanSnapshot) -> RepositoryResult<String> {
        let ingredients_json = serde_json::to_string(&snapshot.ingredients).map_err(|e| {
            RepositoryError::FieldValueError {
                field: "ingredients_json".to_string(),
                message: e.to_string(),
            }
        })?;
        conn.execute(
            r#"INSERT INTO plan_snapshot (
                snapshot_id, plan_request_id, calculated_at, total_cost,
                has_partial_cost, ingredients_json, invalidated_at, invalidation_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                snapshot.snapshot_id,
                snapshot.plan_request_id,
                format_ts(&snapshot.calculated_at),
                money_to_sql(&snapshot.total_cost),
                snapshot.has_partial_cost,
                ingredients_json,
                snapshot.invalidated_at.as_ref().map(format_ts),
                snapshot.invalidation_reason,
            ],
        )?;
        Ok(snapshot.snapshot_id.clone())
    }

    pub fn find_by_id(conn: &Connection, snapshot_id: &str) -> RepositoryResult<Option<PlanSnapshot>> {
        let sql = format!("SELECT {} FROM plan_snapshot WHERE snapshot_id = ?1", SNAPSHOT_COLUMNS);
        Ok(conn.query_row(&sql, params![snapshot_id], map_snapshot).optional()?)
    }

    /// 最新一次计算结果（无论是否失效）
    pub fn find_latest(conn: &Connection, plan_request_id: i64) -> RepositoryResult<Option<PlanSnapshot>> {
        let sql = format!(
            "SELECT {} FROM plan_snapshot WHERE plan_request_id = ?1 \
             ORDER BY calculated_at DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        Ok(conn.query_row(&sql, params![plan_request_id], map_snapshot).optional()?)
    }

    pub fn list_by_request(conn: &Connection, plan_request_id: i64) -> RepositoryResult<Vec<PlanSnapshot>> {
        let sql = format!(
            "SELECT {} FROM plan_snapshot WHERE plan_request_id = ?1 ORDER BY calculated_at DESC",
            SNAPSHOT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![plan_request_id], map_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 打失效标记（已失效的不覆盖首次原因）
    pub fn mark_invalidated(
        conn: &Connection,
        snapshot_id: &str,
        reason: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"UPDATE plan_snapshot
               SET invalidated_at = ?2, invalidation_reason = ?3
               WHERE snapshot_id = ?1 AND invalidated_at IS NULL"#,
            params![snapshot_id, format_ts(&now), reason],
        )?;
        Ok(rows)
    }
}

fn map_snapshot(row: &Row) -> rusqlite::Result<PlanSnapshot> {
    let ingredients_raw: String = row.get(5)?;
    let ingredients: Vec<AggregatedIngredient> =
        serde_json::from_str(&ingredients_raw).map_err(|e| conversion_err(5, e.to_string()))?;
    Ok(PlanSnapshot {
        snapshot_id: row.get(0)?,
        plan_request_id: row.get(1)?,
        calculated_at: ts_col(row, 2)?,
        total_cost: money_col(row, 3)?,
        has_partial_cost: row.get(4)?,
        ingredients,
        invalidated_at: opt_ts_col(row, 6)?,
        invalidation_reason: row.get(7)?,
    })
}
