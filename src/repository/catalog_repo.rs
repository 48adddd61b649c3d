// ==========================================
// 烘焙管理系统 - 目录数据仓储（原料 / 叶子组件）
// ==========================================
// 叶子组件三张表结构一致，表名来自 LeafKind::table() 白名单
// ==========================================

use crate::db::format_ts;
use crate::domain::assembly::{Ingredient, LeafItem, NewIngredient, NewLeafItem};
use crate::domain::types::{IngredientId, ItemId, LeafKind, Money};
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::{money_to_sql, opt_money_col, ts_col};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const INGREDIENT_COLUMNS: &str =
    "id, slug, display_name, price_unit, unit_price, created_at, updated_at";

// ==========================================
// IngredientRepository - 原料仓储
// ==========================================
pub struct IngredientRepository;

impl IngredientRepository {
    pub fn insert(conn: &Connection, new: &NewIngredient, now: NaiveDateTime) -> RepositoryResult<IngredientId> {
        let ts = format_ts(&now);
        conn.execute(
            r#"INSERT INTO ingredient (
                slug, display_name, price_unit, unit_price, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)"#,
            params![
                new.slug,
                new.display_name,
                new.price_unit,
                new.unit_price.as_ref().map(money_to_sql),
                ts,
            ],
        )?;
        Ok(IngredientId(conn.last_insert_rowid()))
    }

    pub fn find_by_id(conn: &Connection, id: IngredientId) -> RepositoryResult<Option<Ingredient>> {
        let sql = format!("SELECT {} FROM ingredient WHERE id = ?1", INGREDIENT_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id.0], |row| Self::map_row_at(row, 0))
            .optional()?)
    }

    pub fn find_by_slug(conn: &Connection, slug: &str) -> RepositoryResult<Option<Ingredient>> {
        let sql = format!("SELECT {} FROM ingredient WHERE slug = ?1", INGREDIENT_COLUMNS);
        Ok(conn
            .query_row(&sql, params![slug], |row| Self::map_row_at(row, 0))
            .optional()?)
    }

    pub fn list_all(conn: &Connection) -> RepositoryResult<Vec<Ingredient>> {
        let sql = format!("SELECT {} FROM ingredient ORDER BY slug ASC", INGREDIENT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Self::map_row_at(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 修改单价（None = 清除定价）
    pub fn update_price(
        conn: &Connection,
        id: IngredientId,
        unit_price: Option<Money>,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE ingredient SET unit_price = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.0, unit_price.as_ref().map(money_to_sql), format_ts(&now)],
        )?;
        Ok(rows)
    }

    pub fn update_display_name(
        conn: &Connection,
        id: IngredientId,
        display_name: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE ingredient SET display_name = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.0, display_name, format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 按列偏移映射（供联表查询复用）
    pub fn map_row_at(row: &Row, offset: usize) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: IngredientId(row.get(offset)?),
            slug: row.get(offset + 1)?,
            display_name: row.get(offset + 2)?,
            price_unit: row.get(offset + 3)?,
            unit_price: opt_money_col(row, offset + 4)?,
            created_at: ts_col(row, offset + 5)?,
            updated_at: ts_col(row, offset + 6)?,
        })
    }
}

// ==========================================
// LeafItemRepository - 叶子组件仓储
// ==========================================
pub struct LeafItemRepository;

impl LeafItemRepository {
    pub fn insert(conn: &Connection, new: &NewLeafItem, now: NaiveDateTime) -> RepositoryResult<ItemId> {
        let sql = format!(
            r#"INSERT INTO {} (
                slug, display_name, unit, unit_cost, yield_quantity,
                created_at, updated_at, yield_updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)"#,
            new.kind.table()
        );
        conn.execute(
            &sql,
            params![
                new.slug,
                new.display_name,
                new.unit,
                new.unit_cost.as_ref().map(money_to_sql),
                new.yield_quantity,
                format_ts(&now),
            ],
        )?;
        Ok(ItemId(conn.last_insert_rowid()))
    }

    pub fn find_by_id(conn: &Connection, kind: LeafKind, id: ItemId) -> RepositoryResult<Option<LeafItem>> {
        let sql = format!("{} WHERE id = ?1", select_leaf(kind));
        Ok(conn
            .query_row(&sql, params![id.0], |row| map_leaf(row, kind))
            .optional()?)
    }

    pub fn find_by_slug(conn: &Connection, kind: LeafKind, slug: &str) -> RepositoryResult<Option<LeafItem>> {
        let sql = format!("{} WHERE slug = ?1", select_leaf(kind));
        Ok(conn
            .query_row(&sql, params![slug], |row| map_leaf(row, kind))
            .optional()?)
    }

    pub fn list(conn: &Connection, kind: LeafKind) -> RepositoryResult<Vec<LeafItem>> {
        let sql = format!("{} ORDER BY slug ASC", select_leaf(kind));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| map_leaf(row, kind))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update_unit_cost(
        conn: &Connection,
        kind: LeafKind,
        id: ItemId,
        unit_cost: Option<Money>,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let sql = format!("UPDATE {} SET unit_cost = ?2, updated_at = ?3 WHERE id = ?1", kind.table());
        let rows = conn.execute(
            &sql,
            params![id.0, unit_cost.as_ref().map(money_to_sql), format_ts(&now)],
        )?;
        Ok(rows)
    }

    /// 修改规格（结构字段）
    pub fn update_yield(
        conn: &Connection,
        kind: LeafKind,
        id: ItemId,
        yield_quantity: f64,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let sql = format!(
            "UPDATE {} SET yield_quantity = ?2, updated_at = ?3, yield_updated_at = ?3 WHERE id = ?1",
            kind.table()
        );
        let rows = conn.execute(&sql, params![id.0, yield_quantity, format_ts(&now)])?;
        Ok(rows)
    }

    pub fn update_display_name(
        conn: &Connection,
        kind: LeafKind,
        id: ItemId,
        display_name: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let sql = format!("UPDATE {} SET display_name = ?2, updated_at = ?3 WHERE id = ?1", kind.table());
        let rows = conn.execute(&sql, params![id.0, display_name, format_ts(&now)])?;
        Ok(rows)
    }

    pub fn delete(conn: &Connection, kind: LeafKind, id: ItemId) -> RepositoryResult<usize> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", kind.table());
        let rows = conn.execute(&sql, params![id.0])?;
        Ok(rows)
    }
}

fn select_leaf(kind: LeafKind) -> String {
    format!(
        "SELECT id, slug, display_name, unit, unit_cost, yield_quantity, \
         created_at, updated_at, yield_updated_at FROM {}",
        kind.table()
    )
}

fn map_leaf(row: &Row, kind: LeafKind) -> rusqlite::Result<LeafItem> {
    Ok(LeafItem {
        kind,
        id: ItemId(row.get(0)?),
        slug: row.get(1)?,
        display_name: row.get(2)?,
        unit: row.get(3)?,
        unit_cost: opt_money_col(row, 4)?,
        yield_quantity: row.get(5)?,
        created_at: ts_col(row, 6)?,
        updated_at: ts_col(row, 7)?,
        yield_updated_at: ts_col(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now_ts, open_in_memory};
    use rust_decimal::Decimal;

    #[test]
    fn test_叶子组件_三张表独立() {
        let conn = open_in_memory().unwrap();
        for kind in LeafKind::ALL {
            let id = LeafItemRepository::insert(
                &conn,
                &NewLeafItem {
                    kind,
                    slug: "same-slug".to_string(),
                    display_name: "Item".to_string(),
                    unit: "each".to_string(),
                    unit_cost: Some(Decimal::new(125, 2)),
                    yield_quantity: 1.0,
                },
                now_ts(),
            )
            .unwrap();
            let found = LeafItemRepository::find_by_slug(&conn, kind, "same-slug")
                .unwrap()
                .unwrap();
            assert_eq!(found.id, id);
            assert_eq!(found.kind, kind);
            assert_eq!(found.unit_cost, Some(Decimal::new(125, 2)));
        }
    }

    #[test]
    fn test_原料_未定价为_none() {
        let conn = open_in_memory().unwrap();
        let id = IngredientRepository::insert(
            &conn,
            &NewIngredient {
                slug: "flour".to_string(),
                display_name: "Flour".to_string(),
                price_unit: "cup".to_string(),
                unit_price: None,
            },
            now_ts(),
        )
        .unwrap();
        let found = IngredientRepository::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.unit_price, None);

        IngredientRepository::update_price(&conn, id, Some(Decimal::new(50, 2)), now_ts()).unwrap();
        let found = IngredientRepository::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.unit_price, Some(Decimal::new(5, 1)));
    }
}
