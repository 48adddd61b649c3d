// ==========================================
// 烘焙管理系统 - SQLite 连接初始化与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键必须逐连接开启）
// - 统一 busy_timeout
// - 统一建表脚本与 schema_version
// - 统一时间戳格式（微秒精度，进程内严格递增）
// ==========================================

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// 时间戳存储格式（TEXT 列，字典序即时间序）
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

static LAST_TS_MICROS: AtomicI64 = AtomicI64::new(0);

/// 配置 SQLite 连接的统一 PRAGMA
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存库（测试/演示用），并完成建表
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// 当前时间（UTC，微秒精度）
///
/// 同一进程内严格递增：陈旧判定依赖 “变更时间 > 计算时间” 的严格比较，
/// 同一微秒内的两次写入也必须可区分。
pub fn now_ts() -> NaiveDateTime {
    let real = Utc::now().timestamp_micros();
    let mut prev = LAST_TS_MICROS.load(Ordering::Relaxed);
    loop {
        let next = real.max(prev + 1);
        match LAST_TS_MICROS.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => {
                return DateTime::<Utc>::from_timestamp_micros(next)
                    .map(|dt| dt.naive_utc())
                    .unwrap_or_else(|| Utc::now().naive_utc());
            }
            Err(current) => prev = current,
        }
    }
}

/// 格式化时间戳
pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 解析时间戳（兼容无小数秒的旧数据）
pub fn parse_ts(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）并登记 schema_version
///
/// 说明：
/// - composition 以四个可空外键 + CHECK 约束落库，保证“恰好一种组件类型”在库层同样成立
/// - 被引用的组件一律 ON DELETE RESTRICT；父装配删除时其组成边 CASCADE
/// - consumption_record 通过触发器保证只追加、不修改
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let current = read_schema_version(conn)?;
    if current.unwrap_or(0) < CURRENT_SCHEMA_VERSION {
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            [CURRENT_SCHEMA_VERSION],
        )?;
    } else if current.unwrap_or(0) > CURRENT_SCHEMA_VERSION {
        tracing::warn!(
            "数据库 schema_version={} 高于程序期望的 {}，请确认程序版本",
            current.unwrap_or(0),
            CURRENT_SCHEMA_VERSION
        );
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS ingredient (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    price_unit TEXT NOT NULL,
    unit_price TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assembly (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('RECIPE', 'FINISHED_GOOD', 'PACKAGE')),
    yield_quantity REAL NOT NULL CHECK (yield_quantity > 0),
    yield_unit TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    structure_updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assembly_ingredient (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    assembly_id INTEGER NOT NULL REFERENCES assembly(id) ON DELETE CASCADE,
    ingredient_id INTEGER NOT NULL REFERENCES ingredient(id) ON DELETE RESTRICT,
    quantity REAL NOT NULL CHECK (quantity > 0),
    unit TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    quantity_updated_at TEXT NOT NULL,
    UNIQUE (assembly_id, ingredient_id, unit)
);

CREATE TABLE IF NOT EXISTS finished_unit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    unit TEXT NOT NULL,
    unit_cost TEXT,
    yield_quantity REAL NOT NULL CHECK (yield_quantity > 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    yield_updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS packaging_product (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    unit TEXT NOT NULL,
    unit_cost TEXT,
    yield_quantity REAL NOT NULL CHECK (yield_quantity > 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    yield_updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS material_unit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    unit TEXT NOT NULL,
    unit_cost TEXT,
    yield_quantity REAL NOT NULL CHECK (yield_quantity > 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    yield_updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS composition (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER NOT NULL REFERENCES assembly(id) ON DELETE CASCADE,
    finished_unit_id INTEGER REFERENCES finished_unit(id) ON DELETE RESTRICT,
    finished_good_id INTEGER REFERENCES assembly(id) ON DELETE RESTRICT,
    packaging_product_id INTEGER REFERENCES packaging_product(id) ON DELETE RESTRICT,
    material_unit_id INTEGER REFERENCES material_unit(id) ON DELETE RESTRICT,
    quantity REAL NOT NULL CHECK (quantity > 0),
    notes TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    quantity_updated_at TEXT NOT NULL,
    CHECK (
        (finished_unit_id IS NOT NULL)
        + (finished_good_id IS NOT NULL)
        + (packaging_product_id IS NOT NULL)
        + (material_unit_id IS NOT NULL) = 1
    ),
    CHECK (finished_good_id IS NULL OR finished_good_id <> parent_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_composition_finished_unit
    ON composition(parent_id, finished_unit_id) WHERE finished_unit_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS uq_composition_finished_good
    ON composition(parent_id, finished_good_id) WHERE finished_good_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS uq_composition_packaging_product
    ON composition(parent_id, packaging_product_id) WHERE packaging_product_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS uq_composition_material_unit
    ON composition(parent_id, material_unit_id) WHERE material_unit_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_composition_parent
    ON composition(parent_id, sort_order);
CREATE INDEX IF NOT EXISTS idx_composition_finished_good
    ON composition(finished_good_id);

CREATE TABLE IF NOT EXISTS production_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_uid TEXT NOT NULL UNIQUE,
    assembly_id INTEGER REFERENCES assembly(id) ON DELETE SET NULL,
    assembly_slug TEXT NOT NULL,
    quantity REAL NOT NULL CHECK (quantity > 0),
    batches REAL NOT NULL,
    total_cost TEXT NOT NULL,
    lot_ref TEXT,
    notes TEXT,
    produced_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS consumption_record (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    production_event_id INTEGER NOT NULL REFERENCES production_event(id) ON DELETE CASCADE,
    item_kind TEXT NOT NULL CHECK (item_kind IN (
        'finished_unit', 'finished_good', 'packaging_product', 'material_unit', 'ingredient'
    )),
    item_id INTEGER NOT NULL,
    item_slug TEXT NOT NULL,
    quantity_consumed REAL NOT NULL CHECK (quantity_consumed > 0),
    unit TEXT NOT NULL,
    cost_snapshot TEXT NOT NULL,
    lot_ref TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (production_event_id, item_kind, item_id, unit)
);

CREATE INDEX IF NOT EXISTS idx_consumption_record_event
    ON consumption_record(production_event_id);

CREATE TRIGGER IF NOT EXISTS trg_consumption_record_append_only
BEFORE UPDATE ON consumption_record
BEGIN
    SELECT RAISE(ABORT, 'consumption_record is append-only');
END;

CREATE TABLE IF NOT EXISTS plan_request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    structure_updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plan_request_item (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plan_request_id INTEGER NOT NULL REFERENCES plan_request(id) ON DELETE CASCADE,
    assembly_id INTEGER NOT NULL REFERENCES assembly(id) ON DELETE RESTRICT,
    quantity REAL NOT NULL CHECK (quantity > 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (plan_request_id, assembly_id)
);

CREATE TABLE IF NOT EXISTS plan_snapshot (
    snapshot_id TEXT PRIMARY KEY,
    plan_request_id INTEGER NOT NULL REFERENCES plan_request(id) ON DELETE CASCADE,
    calculated_at TEXT NOT NULL,
    total_cost TEXT NOT NULL,
    has_partial_cost INTEGER NOT NULL DEFAULT 0,
    ingredients_json TEXT NOT NULL,
    invalidated_at TEXT,
    invalidation_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_plan_snapshot_request
    ON plan_snapshot(plan_request_id, calculated_at);

CREATE TABLE IF NOT EXISTS action_log (
    action_id TEXT PRIMARY KEY,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    target_slug TEXT,
    payload_json TEXT,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_action_log_ts ON action_log(action_ts);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ts_严格递增() {
        let mut prev = now_ts();
        for _ in 0..1000 {
            let next = now_ts();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_ts_格式往返() {
        let ts = now_ts();
        let raw = format_ts(&ts);
        assert_eq!(parse_ts(&raw).unwrap(), ts);
        assert!(parse_ts("2026-01-18 08:30:00").is_ok());
    }

    #[test]
    fn test_ensure_schema_幂等() {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }
}
