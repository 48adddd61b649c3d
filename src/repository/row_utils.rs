// ==========================================
// 烘焙管理系统 - 行映射工具
// ==========================================
// 时间戳 / 金额以 TEXT 落库，这里统一解析并转换错误类型
// ==========================================

use crate::db::parse_ts;
use crate::domain::types::Money;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;
use std::str::FromStr;

/// 读取时间戳列
pub fn ts_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 读取可空时间戳列
pub fn opt_ts_col(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(raw) => parse_ts(&raw)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// 读取金额列
pub fn money_col(row: &Row, idx: usize) -> rusqlite::Result<Money> {
    let raw: String = row.get(idx)?;
    Money::from_str(raw.trim())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 读取可空金额列
pub fn opt_money_col(row: &Row, idx: usize) -> rusqlite::Result<Option<Money>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(raw) => Money::from_str(raw.trim())
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// 把领域解析错误（String）转换为行映射错误
pub fn conversion_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// 金额落库格式
pub fn money_to_sql(value: &Money) -> String {
    value.normalize().to_string()
}
