use crate::db::format_ts;
use crate::domain::plan::{PlanRequest, PlanRequestItem};
use crate::domain::types::AssemblyId;
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::ts_col;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

// ==========================================
// PlanRequestRepository - 生产请求仓储
// ==========================================
pub struct PlanRequestRepository;

impl PlanRequestRepository {
    /// 创建生产请求（不含明细）
    pub fn insert(conn: &Connection, slug: &str, display_name: &str, now: NaiveDateTime) -> RepositoryResult<i64> {
        conn.execute(
            r#"INSERT INTO plan_request (
                slug, display_name, created_at, updated_at, structure_updated_at
            ) VALUES (?1, ?2, ?3, ?3, ?3)"#,
            params![slug, display_name, format_ts(&now)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按ID查询（含明细）
    pub fn find_by_id(conn: &Connection, id: i64) -> RepositoryResult<Option<PlanRequest>> {
        let head = conn
            .query_row(
                r#"SELECT id, slug, display_name, created_at, updated_at, structure_updated_at
                   FROM plan_request WHERE id = ?1"#,
                params![id],
                map_request,
            )
            .optional()?;
        match head {
            Some(mut request) => {
                request.items = Self::list_items(conn, request.id)?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    pub fn find_by_slug(conn: &Connection, slug: &str) -> RepositoryResult<Option<PlanRequest>> {
        let id: Option<i64> = conn
            .query_row("SELECT id FROM plan_request WHERE slug = ?1", params![slug], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => Self::find_by_id(conn, id),
            None => Ok(None),
        }
    }

    /// 查询全部（含明细，按 slug 升序）
    pub fn list_all(conn: &Connection) -> RepositoryResult<Vec<PlanRequest>> {
        let mut stmt = conn.prepare(
            r#"SELECT id, slug, display_name, created_at, updated_at, structure_updated_at
               FROM plan_request ORDER BY slug ASC"#,
        )?;
        let mut requests = stmt
            .query_map([], map_request)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for request in &mut requests {
            request.items = Self::list_items(conn, request.id)?;
        }
        Ok(requests)
    }

    /// 修改名称（外观字段）
    pub fn update_display_name(
        conn: &Connection,
        id: i64,
        display_name: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE plan_request SET display_name = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, display_name, format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 新增或修改明细数量（结构变更）
    pub fn upsert_item(
        conn: &Connection,
        plan_request_id: i64,
        assembly_id: AssemblyId,
        quantity: f64,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let ts = format_ts(&now);
        conn.execute(
            r#"INSERT INTO plan_request_item (
                plan_request_id, assembly_id, quantity, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT (plan_request_id, assembly_id)
            DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at"#,
            params![plan_request_id, assembly_id.0, quantity, ts],
        )?;
        Self::touch_structure(conn, plan_request_id, now)?;
        Ok(())
    }

    /// 删除明细（结构变更）
    pub fn delete_item(
        conn: &Connection,
        plan_request_id: i64,
        assembly_id: AssemblyId,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "DELETE FROM plan_request_item WHERE plan_request_id = ?1 AND assembly_id = ?2",
            params![plan_request_id, assembly_id.0],
        )?;
        if rows > 0 {
            Self::touch_structure(conn, plan_request_id, now)?;
        }
        Ok(rows)
    }

    pub fn list_items(conn: &Connection, plan_request_id: i64) -> RepositoryResult<Vec<PlanRequestItem>> {
        let mut stmt = conn.prepare(
            r#"SELECT id, assembly_id, quantity, created_at, updated_at
               FROM plan_request_item
               WHERE plan_request_id = ?1
               ORDER BY id ASC"#,
        )?;
        let items = stmt
            .query_map(params![plan_request_id], |row| {
                Ok(PlanRequestItem {
                    id: row.get(0)?,
                    assembly_id: AssemblyId(row.get(1)?),
                    quantity: row.get(2)?,
                    created_at: ts_col(row, 3)?,
                    updated_at: ts_col(row, 4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// 引用某装配体的生产请求 slug（删除限制用）
    pub fn find_slugs_referencing(conn: &Connection, assembly_id: AssemblyId) -> RepositoryResult<Vec<String>> {
        let mut stmt = conn.prepare(
            r#"SELECT DISTINCT pr.slug
               FROM plan_request_item pri
               JOIN plan_request pr ON pr.id = pri.plan_request_id
               WHERE pri.assembly_id = ?1
               ORDER BY pr.slug ASC"#,
        )?;
        let slugs = stmt
            .query_map(params![assembly_id.0], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(slugs)
    }

    pub fn delete(conn: &Connection, id: i64) -> RepositoryResult<usize> {
        let rows = conn.execute("DELETE FROM plan_request WHERE id = ?1", params![id])?;
        Ok(rows)
    }

    fn touch_structure(conn: &Connection, id: i64, now: NaiveDateTime) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE plan_request SET updated_at = ?2, structure_updated_at = ?2 WHERE id = ?1",
            params![id, format_ts(&now)],
        )?;
        Ok(rows)
    }
}

fn map_request(row: &Row) -> rusqlite::Result<PlanRequest> {
    Ok(PlanRequest {
        id: row.get(0)?,
        slug: row.get(1)?,
        display_name: row.get(2)?,
        items: Vec::new(),
        created_at: ts_col(row, 3)?,
        updated_at: ts_col(row, 4)?,
        structure_updated_at: ts_col(row, 5)?,
    })
}
