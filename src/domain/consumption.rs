// ==========================================
// 烘焙管理系统 - 生产事件与消耗账本领域模型
// ==========================================
// 红线: ConsumptionRecord 只追加、不修改
// 红线: cost_snapshot 在写入时冻结，之后价格变化不得回写
// ==========================================

use crate::domain::types::{AssemblyId, ConsumedItem, Money};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionEvent - 生产/组装事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionEvent {
    pub id: i64,
    pub event_uid: String,                // 可移植标识 (UUID)
    pub assembly_id: Option<AssemblyId>,  // 装配体被删除后置空
    pub assembly_slug: String,            // 生产时的装配体 slug 快照
    pub quantity: f64,                    // 产出数量（按 yield_unit）
    pub batches: f64,                     // 折算批次 = quantity / yield_quantity
    pub total_cost: Money,                // 全部消耗记录 cost_snapshot 之和
    pub lot_ref: Option<String>,
    pub notes: Option<String>,
    pub produced_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// 新建生产事件参数（仓储层）
#[derive(Debug, Clone)]
pub struct NewProductionEvent {
    pub event_uid: String,
    pub assembly_id: Option<AssemblyId>,
    pub assembly_slug: String,
    pub quantity: f64,
    pub batches: f64,
    pub total_cost: Money,
    pub lot_ref: Option<String>,
    pub notes: Option<String>,
    pub produced_at: NaiveDateTime,
}

// ==========================================
// ConsumptionRecord - 消耗记录（账本条目）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub id: i64,
    pub production_event_id: i64,
    pub item: ConsumedItem,
    pub item_slug: String,               // 消耗对象 slug 快照
    pub quantity_consumed: f64,
    pub unit: String,
    pub cost_snapshot: Money,
    pub lot_ref: Option<String>,
    pub created_at: NaiveDateTime,
}

/// 新建消耗记录参数（仓储层）
#[derive(Debug, Clone)]
pub struct NewConsumptionRecord {
    pub production_event_id: i64,
    pub item: ConsumedItem,
    pub item_slug: String,
    pub quantity_consumed: f64,
    pub unit: String,
    pub cost_snapshot: Money,
    pub lot_ref: Option<String>,
    pub created_at: NaiveDateTime,
}

// ==========================================
// ProductionRequest / ProductionOutcome - 生产工作流输入输出
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub assembly_id: AssemblyId,
    pub quantity: f64,
    pub lot_ref: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionOutcome {
    pub event: ProductionEvent,
    pub records: Vec<ConsumptionRecord>,
}
