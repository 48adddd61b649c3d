// ==========================================
// 烘焙管理系统 - 生产事件与消耗记录仓储
// ==========================================
// 红线: consumption_record 只追加（库层触发器拒绝 UPDATE）
// ==========================================

use crate::db::format_ts;
use crate::domain::consumption::{
    ConsumptionRecord, NewConsumptionRecord, NewProductionEvent, ProductionEvent,
};
use crate::domain::types::{AssemblyId, ConsumedItem, Money};
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::{conversion_err, money_col, money_to_sql, ts_col};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const EVENT_COLUMNS: &str = "id, event_uid, assembly_id, assembly_slug, quantity, batches, \
     total_cost, lot_ref, notes, produced_at, created_at";

const RECORD_COLUMNS: &str = "id, production_event_id, item_kind, item_id, item_slug, \
     quantity_consumed, unit, cost_snapshot, lot_ref, created_at";

// ==========================================
// ProductionEventRepository - 生产事件仓储
// ==========================================
pub struct ProductionEventRepository;

impl ProductionEventRepository {
    pub fn insert(conn: &Connection, new: &NewProductionEvent, now: NaiveDateTime) -> RepositoryResult<i64> {
        conn.execute(
            r#"INSERT INTO production_event (
                event_uid, assembly_id, assembly_slug, quantity, batches,
                total_cost, lot_ref, notes, produced_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                new.event_uid,
                new.assembly_id.map(|a| a.0),
                new.assembly_slug,
                new.quantity,
                new.batches,
                money_to_sql(&new.total_cost),
                new.lot_ref,
                new.notes,
                format_ts(&new.produced_at),
                format_ts(&now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 回写事件总成本（同一事务内，消耗记录写完后调用）
    pub fn update_total_cost(conn: &Connection, id: i64, total_cost: Money) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "UPDATE production_event SET total_cost = ?2 WHERE id = ?1",
            params![id, money_to_sql(&total_cost)],
        )?;
        Ok(rows)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RepositoryResult<Option<ProductionEvent>> {
        let sql = format!("SELECT {} FROM production_event WHERE id = ?1", EVENT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], map_event).optional()?)
    }

    pub fn find_by_uid(conn: &Connection, event_uid: &str) -> RepositoryResult<Option<ProductionEvent>> {
        let sql = format!("SELECT {} FROM production_event WHERE event_uid = ?1", EVENT_COLUMNS);
        Ok(conn.query_row(&sql, params![event_uid], map_event).optional()?)
    }

    /// 全部事件（按生产时间升序）
    pub fn list_all(conn: &Connection) -> RepositoryResult<Vec<ProductionEvent>> {
        let sql = format!(
            "SELECT {} FROM production_event ORDER BY produced_at ASC, id ASC",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_by_assembly(conn: &Connection, assembly_id: AssemblyId) -> RepositoryResult<Vec<ProductionEvent>> {
        let sql = format!(
            "SELECT {} FROM production_event WHERE assembly_id = ?1 ORDER BY produced_at ASC, id ASC",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![assembly_id.0], map_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ==========================================
// ConsumptionRecordRepository - 消耗记录仓储
// ==========================================
pub struct ConsumptionRecordRepository;

impl ConsumptionRecordRepository {
    /// 追加消耗记录
    pub fn insert(conn: &Connection, new: &NewConsumptionRecord) -> RepositoryResult<i64> {
        conn.execute(
            r#"INSERT INTO consumption_record (
                production_event_id, item_kind, item_id, item_slug,
                quantity_consumed, unit, cost_snapshot, lot_ref, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                new.production_event_id,
                new.item.kind_str(),
                new.item.raw_id(),
                new.item_slug,
                new.quantity_consumed,
                new.unit,
                money_to_sql(&new.cost_snapshot),
                new.lot_ref,
                format_ts(&new.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> RepositoryResult<Option<ConsumptionRecord>> {
        let sql = format!("SELECT {} FROM consumption_record WHERE id = ?1", RECORD_COLUMNS);
        Ok(conn.query_row(&sql, params![id], map_record).optional()?)
    }

    pub fn list_by_event(conn: &Connection, production_event_id: i64) -> RepositoryResult<Vec<ConsumptionRecord>> {
        let sql = format!(
            "SELECT {} FROM consumption_record WHERE production_event_id = ?1 ORDER BY id ASC",
            RECORD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![production_event_id], map_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_by_event(conn: &Connection, production_event_id: i64) -> RepositoryResult<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM consumption_record WHERE production_event_id = ?1",
            params![production_event_id],
            |row| row.get(0),
        )?)
    }

    /// 某对象被消耗的次数（叶子/原料删除时提示用）
    pub fn count_by_item(conn: &Connection, item: ConsumedItem) -> RepositoryResult<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM consumption_record WHERE item_kind = ?1 AND item_id = ?2",
            params![item.kind_str(), item.raw_id()],
            |row| row.get(0),
        )?)
    }
}

fn map_event(row: &Row) -> rusqlite::Result<ProductionEvent> {
    let assembly_id: Option<i64> = row.get(2)?;
    Ok(ProductionEvent {
        id: row.get(0)?,
        event_uid: row.get(1)?,
        assembly_id: assembly_id.map(AssemblyId),
        assembly_slug: row.get(3)?,
        quantity: row.get(4)?,
        batches: row.get(5)?,
        total_cost: money_col(row, 6)?,
        lot_ref: row.get(7)?,
        notes: row.get(8)?,
        produced_at: ts_col(row, 9)?,
        created_at: ts_col(row, 10)?,
    })
}

fn map_record(row: &Row) -> rusqlite::Result<ConsumptionRecord> {
    let kind: String = row.get(2)?;
    let item_id: i64 = row.get(3)?;
    let item = ConsumedItem::from_parts(&kind, item_id).map_err(|e| conversion_err(2, e))?;
    Ok(ConsumptionRecord {
        id: row.get(0)?,
        production_event_id: row.get(1)?,
        item,
        item_slug: row.get(4)?,
        quantity_consumed: row.get(5)?,
        unit: row.get(6)?,
        cost_snapshot: money_col(row, 7)?,
        lot_ref: row.get(8)?,
        created_at: ts_col(row, 9)?,
    })
}
