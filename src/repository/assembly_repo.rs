// ==========================================
// 烘焙管理系统 - 装配体数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 所有方法接收 &Connection，由调用方决定事务边界
// ==========================================

use crate::db::format_ts;
use crate::domain::assembly::{Assembly, AssemblyIngredient, IngredientLine, NewAssembly};
use crate::domain::types::{AssemblyId, IngredientId};
use crate::repository::catalog_repo::IngredientRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::{conversion_err, ts_col};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const ASSEMBLY_COLUMNS: &str = "id, slug, display_name, kind, yield_quantity, yield_unit, \
     created_at, updated_at, structure_updated_at";

// ==========================================
// AssemblyRepository - 装配体仓储
// ==========================================
pub struct AssemblyRepository;

impl AssemblyRepository {
    /// 新建装配体
    pub fn insert(conn: &Connection, new: &NewAssembly, now: NaiveDateTime) -> RepositoryResult<AssemblyId> {
        let ts = format_ts(&now);
        conn.execute(
            r#"INSERT INTO assembly (
                slug, display_name, kind, yield_quantity, yield_unit,
                created_at, updated_at, structure_updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)"#,
            params![
                new.slug,
                new.display_name,
                new.kind.as_str(),
                new.yield_quantity,
                new.yield_unit,
                ts,
            ],
        )?;
        Ok(AssemblyId(conn.last_insert_rowid()))
    }

    /// 按ID查询
    pub fn find_by_id(conn: &Connection, id: AssemblyId) -> RepositoryResult<Option<Assembly>> {
        let sql = format!("SELECT {} FROM assembly WHERE id = ?1", ASSEMBLY_COLUMNS);
        Ok(conn.query_row(&sql, params![id.0], map_assembly).optional()?)
    }

    /// 按slug查询
    pub fn find_by_slug(conn: &Connection, slug: &str) -> RepositoryResult<Option<Assembly>> {
        let sql = format!("SELECT {} FROM assembly WHERE slug = ?1", ASSEMBLY_COLUMNS);
        Ok(conn.query_row(&sql, params![slug], map_assembly).optional()?)
    }

    /// 查询全部（按 slug 升序）
    pub fn list_all(conn: &Connection) -> RepositoryResult<Vec<Assembly>> {
        let sql = format!("SELECT {} FROM assembly ORDER BY slug ASC", ASSEMBLY_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_assembly)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 修改展示名称（外观字段，只更新 updated_at）
    pub fn update_display_name(
        conn: &Connection,
        id: AssemblyId,
        display_name: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE assembly SET display_name = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.0, display_name, format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 修改产出（结构字段）
    pub fn update_yield(
        conn: &Connection,
        id: AssemblyId,
        yield_quantity: f64,
        yield_unit: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"UPDATE assembly
               SET yield_quantity = ?2, yield_unit = ?3,
                   updated_at = ?4, structure_updated_at = ?4
               WHERE id = ?1"#,
            params![id.0, yield_quantity, yield_unit, format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 标记结构变更（组件/原料行增删时调用）
    pub fn touch_structure(conn: &Connection, id: AssemblyId, now: NaiveDateTime) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE assembly SET updated_at = ?2, structure_updated_at = ?2 WHERE id = ?1",
            params![id.0, format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 删除装配体（组成边与原料行由外键级联删除）
    pub fn delete(conn: &Connection, id: AssemblyId) -> RepositoryResult<usize> {
        let rows = conn.execute("DELETE FROM assembly WHERE id = ?1", params![id.0])?;
        Ok(rows)
    }

    // ==========================================
    // 原料行
    // ==========================================

    /// 新增原料行
    pub fn insert_ingredient_line(
        conn: &Connection,
        assembly_id: AssemblyId,
        ingredient_id: IngredientId,
        quantity: f64,
        unit: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let ts = format_ts(&now);
        conn.execute(
            r#"INSERT INTO assembly_ingredient (
                assembly_id, ingredient_id, quantity, unit,
                created_at, updated_at, quantity_updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)"#,
            params![assembly_id.0, ingredient_id.0, quantity, unit, ts],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按 (装配体, 原料, 单位) 查询原料行
    pub fn find_ingredient_line(
        conn: &Connection,
        assembly_id: AssemblyId,
        ingredient_id: IngredientId,
        unit: &str,
    ) -> RepositoryResult<Option<AssemblyIngredient>> {
        Ok(conn
            .query_row(
                r#"SELECT id, assembly_id, ingredient_id, quantity, unit,
                          created_at, updated_at, quantity_updated_at
                   FROM assembly_ingredient
                   WHERE assembly_id = ?1 AND ingredient_id = ?2 AND unit = ?3"#,
                params![assembly_id.0, ingredient_id.0, unit],
                map_line,
            )
            .optional()?)
    }

    /// 修改原料行数量
    pub fn update_ingredient_line_quantity(
        conn: &Connection,
        line_id: i64,
        quantity: f64,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"UPDATE assembly_ingredient
               SET quantity = ?2, updated_at = ?3, quantity_updated_at = ?3
               WHERE id = ?1"#,
            params![line_id, quantity, format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 删除原料行，返回其所属装配体
    pub fn delete_ingredient_line(conn: &Connection, line_id: i64) -> RepositoryResult<Option<AssemblyId>> {
        let owner: Option<i64> = conn
            .query_row(
                "SELECT assembly_id FROM assembly_ingredient WHERE id = ?1",
                params![line_id],
                |row| row.get(0),
            )
            .optional()?;
        if owner.is_some() {
            conn.execute("DELETE FROM assembly_ingredient WHERE id = ?1", params![line_id])?;
        }
        Ok(owner.map(AssemblyId))
    }

    /// 查询装配体的原料行（含原料主数据），按原料名称排序
    pub fn list_ingredient_lines(conn: &Connection, assembly_id: AssemblyId) -> RepositoryResult<Vec<IngredientLine>> {
        let mut stmt = conn.prepare(
            r#"SELECT ai.id, ai.assembly_id, ai.ingredient_id, ai.quantity, ai.unit,
                      ai.created_at, ai.updated_at, ai.quantity_updated_at,
                      i.id, i.slug, i.display_name, i.price_unit, i.unit_price,
                      i.created_at, i.updated_at
               FROM assembly_ingredient ai
               JOIN ingredient i ON i.id = ai.ingredient_id
               WHERE ai.assembly_id = ?1
               ORDER BY i.display_name ASC, ai.unit ASC, ai.id ASC"#,
        )?;
        let rows = stmt
            .query_map(params![assembly_id.0], |row| {
                Ok(IngredientLine {
                    line: map_line(row)?,
                    ingredient: IngredientRepository::map_row_at(row, 8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn map_assembly(row: &Row) -> rusqlite::Result<Assembly> {
    let kind_raw: String = row.get(3)?;
    Ok(Assembly {
        id: AssemblyId(row.get(0)?),
        slug: row.get(1)?,
        display_name: row.get(2)?,
        kind: kind_raw.parse().map_err(|e| conversion_err(3, e))?,
        yield_quantity: row.get(4)?,
        yield_unit: row.get(5)?,
        created_at: ts_col(row, 6)?,
        updated_at: ts_col(row, 7)?,
        structure_updated_at: ts_col(row, 8)?,
    })
}

fn map_line(row: &Row) -> rusqlite::Result<AssemblyIngredient> {
    Ok(AssemblyIngredient {
        id: row.get(0)?,
        assembly_id: AssemblyId(row.get(1)?),
        ingredient_id: IngredientId(row.get(2)?),
        quantity: row.get(3)?,
        unit: row.get(4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
        quantity_updated_at: ts_col(row, 7)?,
    })
}
