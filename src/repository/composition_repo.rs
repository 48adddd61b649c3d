// ==========================================
// 烘焙管理系统 - 组成边数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（环/深度校验在 CycleGuard）
// 说明: ComponentRef 与四个外键列之间的转换只在本文件发生
// ==========================================

use crate::db::format_ts;
use crate::domain::composition::Composition;
use crate::domain::types::{AssemblyId, ComponentRef, CompositionId};
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::{conversion_err, ts_col};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const COMPOSITION_COLUMNS: &str = "id, parent_id, finished_unit_id, finished_good_id, \
     packaging_product_id, material_unit_id, quantity, notes, sort_order, \
     created_at, updated_at, quantity_updated_at";

// ==========================================
// CompositionRepository - 组成边仓储
// ==========================================
pub struct CompositionRepository;

impl CompositionRepository {
    /// 新增组成边
    pub fn insert(
        conn: &Connection,
        parent_id: AssemblyId,
        component: ComponentRef,
        quantity: f64,
        notes: Option<&str>,
        sort_order: i32,
        now: NaiveDateTime,
    ) -> RepositoryResult<CompositionId> {
        let (finished_unit_id, finished_good_id, packaging_product_id, material_unit_id) =
            component.to_columns();
        conn.execute(
            r#"INSERT INTO composition (
                parent_id, finished_unit_id, finished_good_id, packaging_product_id,
                material_unit_id, quantity, notes, sort_order,
                created_at, updated_at, quantity_updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?9)"#,
            params![
                parent_id.0,
                finished_unit_id,
                finished_good_id,
                packaging_product_id,
                material_unit_id,
                quantity,
                notes,
                sort_order,
                format_ts(&now),
            ],
        )?;
        Ok(CompositionId(conn.last_insert_rowid()))
    }

    pub fn find_by_id(conn: &Connection, id: CompositionId) -> RepositoryResult<Option<Composition>> {
        let sql = format!("SELECT {} FROM composition WHERE id = ?1", COMPOSITION_COLUMNS);
        Ok(conn.query_row(&sql, params![id.0], map_composition).optional()?)
    }

    /// 按 (父, 组件) 查询（重复边检测 / 导入覆盖）
    pub fn find_by_parent_and_component(
        conn: &Connection,
        parent_id: AssemblyId,
        component: ComponentRef,
    ) -> RepositoryResult<Option<Composition>> {
        let sql = format!(
            "SELECT {} FROM composition WHERE parent_id = ?1 AND {} = ?2",
            COMPOSITION_COLUMNS,
            component.composition_column()
        );
        Ok(conn
            .query_row(&sql, params![parent_id.0, component.raw_id()], map_composition)
            .optional()?)
    }

    /// 父装配体的组成边（sort_order, id 升序）
    pub fn list_by_parent(conn: &Connection, parent_id: AssemblyId) -> RepositoryResult<Vec<Composition>> {
        let sql = format!(
            "SELECT {} FROM composition WHERE parent_id = ?1 ORDER BY sort_order ASC, id ASC",
            COMPOSITION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![parent_id.0], map_composition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 全部组成边（导出用）
    pub fn list_all(conn: &Connection) -> RepositoryResult<Vec<Composition>> {
        let sql = format!(
            "SELECT {} FROM composition ORDER BY parent_id ASC, sort_order ASC, id ASC",
            COMPOSITION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_composition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 引用某组件的全部父装配体 ID（去重，升序）
    pub fn find_parent_ids_of(conn: &Connection, component: ComponentRef) -> RepositoryResult<Vec<AssemblyId>> {
        let sql = format!(
            "SELECT DISTINCT parent_id FROM composition WHERE {} = ?1 ORDER BY parent_id ASC",
            component.composition_column()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![component.raw_id()], |row| Ok(AssemblyId(row.get(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 全部 装配体→嵌套装配体 边（构建内存图用）
    pub fn assembly_edges(conn: &Connection) -> RepositoryResult<Vec<(AssemblyId, AssemblyId)>> {
        let mut stmt = conn.prepare(
            r#"SELECT parent_id, finished_good_id FROM composition
               WHERE finished_good_id IS NOT NULL
               ORDER BY parent_id ASC, sort_order ASC, id ASC"#,
        )?;
        let rows = stmt
            .query_map([], |row| Ok((AssemblyId(row.get(0)?), AssemblyId(row.get(1)?))))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 当前最大 sort_order（无边时 None）
    pub fn max_sort_order(conn: &Connection, parent_id: AssemblyId) -> RepositoryResult<Option<i32>> {
        Ok(conn.query_row(
            "SELECT MAX(sort_order) FROM composition WHERE parent_id = ?1",
            params![parent_id.0],
            |row| row.get(0),
        )?)
    }

    /// 修改数量（结构字段）
    pub fn update_quantity(
        conn: &Connection,
        id: CompositionId,
        quantity: f64,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"UPDATE composition
               SET quantity = ?2, updated_at = ?3, quantity_updated_at = ?3
               WHERE id = ?1"#,
            params![id.0, quantity, format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 修改备注（外观字段）
    pub fn update_notes(
        conn: &Connection,
        id: CompositionId,
        notes: Option<&str>,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE composition SET notes = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.0, notes, format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 修改排序（外观字段）
    pub fn update_sort_order(
        conn: &Connection,
        id: CompositionId,
        sort_order: i32,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE composition SET sort_order = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.0, sort_order, format_ts(&now)],
        )?;
        Ok(rows)
    }

    pub fn delete(conn: &Connection, id: CompositionId) -> RepositoryResult<usize> {
        let rows = conn.execute("DELETE FROM composition WHERE id = ?1", params![id.0])?;
        Ok(rows)
    }
}

fn map_composition(row: &Row) -> rusqlite::Result<Composition> {
    let component = ComponentRef::from_columns(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)
        .map_err(|e| conversion_err(2, e))?;
    Ok(Composition {
        id: CompositionId(row.get(0)?),
        parent_id: AssemblyId(row.get(1)?),
        component,
        quantity: row.get(6)?,
        notes: row.get(7)?,
        sort_order: row.get(8)?,
        created_at: ts_col(row, 9)?,
        updated_at: ts_col(row, 10)?,
        quantity_updated_at: ts_col(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now_ts, open_in_memory};
    use crate::domain::assembly::NewAssembly;
    use crate::domain::types::AssemblyKind;
    use crate::repository::assembly_repo::AssemblyRepository;
    use crate::repository::error::RepositoryError;

    fn make_assembly(conn: &Connection, slug: &str) -> AssemblyId {
        AssemblyRepository::insert(
            conn,
            &NewAssembly {
                slug: slug.to_string(),
                display_name: slug.to_string(),
                kind: AssemblyKind::FinishedGood,
                yield_quantity: 1.0,
                yield_unit: "each".to_string(),
            },
            now_ts(),
        )
        .unwrap()
    }

    #[test]
    fn test_库层_自引用被_check_拒绝() {
        let conn = open_in_memory().unwrap();
        let a = make_assembly(&conn, "a");
        let err = CompositionRepository::insert(
            &conn,
            a,
            ComponentRef::FinishedGood(a),
            1.0,
            None,
            0,
            now_ts(),
        )
        .unwrap_err();
        assert!(matches!(err, RepositoryError::CheckConstraintViolation(_)));
    }

    #[test]
    fn test_库层_四列恰好一列非空() {
        let conn = open_in_memory().unwrap();
        let a = make_assembly(&conn, "a");
        let b = make_assembly(&conn, "b");
        let ts = format_ts(&now_ts());
        let err = conn
            .execute(
                r#"INSERT INTO composition (parent_id, quantity, created_at, updated_at, quantity_updated_at)
                   VALUES (?1, 1.0, ?2, ?2, ?2)"#,
                params![a.0, ts],
            )
            .unwrap_err();
        assert!(RepositoryError::from(err).to_string().contains("CHECK"));

        CompositionRepository::insert(&conn, a, ComponentRef::FinishedGood(b), 2.0, None, 0, now_ts())
            .unwrap();
        let edges = CompositionRepository::list_by_parent(&conn, a).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].component, ComponentRef::FinishedGood(b));
        assert_eq!(CompositionRepository::assembly_edges(&conn).unwrap(), vec![(a, b)]);
    }
}
