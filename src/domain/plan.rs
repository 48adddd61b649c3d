// ==========================================
// 烘焙管理系统 - 生产计划领域模型
// ==========================================
// PlanRequest: 一次活动/订单的生产请求（装配体 × 数量）
// PlanSnapshot: 计算结果快照，只读；陈旧时仅打标记，不删除
// ==========================================

use crate::domain::types::{AssemblyId, IngredientId, Money};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// PlanRequest - 生产请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub id: i64,
    pub slug: String,
    pub display_name: String,
    pub items: Vec<PlanRequestItem>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub structure_updated_at: NaiveDateTime,   // 明细增删/数量变更时间
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequestItem {
    pub id: i64,
    pub assembly_id: AssemblyId,
    pub quantity: f64,                          // 需要的批次数
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// AggregatedIngredient - 汇总原料行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedIngredient {
    pub ingredient_id: IngredientId,
    pub display_name: String,
    pub unit: String,
    pub total_quantity: f64,
    pub sources: Vec<IngredientSource>,
}

/// 原料来源（每个贡献的装配体一条）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientSource {
    pub source_assembly: AssemblyId,
    pub source_slug: String,
    pub quantity: f64,
}

// ==========================================
// PlanSnapshot - 计划快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub snapshot_id: String,
    pub plan_request_id: i64,
    pub calculated_at: NaiveDateTime,
    pub total_cost: Money,                       // 成本基线
    pub has_partial_cost: bool,                  // 存在未定价组件
    pub ingredients: Vec<AggregatedIngredient>,
    pub invalidated_at: Option<NaiveDateTime>,
    pub invalidation_reason: Option<String>,
}

impl PlanSnapshot {
    pub fn is_invalidated(&self) -> bool {
        self.invalidated_at.is_some()
    }
}

// ==========================================
// 陈旧判定结果
// ==========================================

/// 触发陈旧的变更类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationCategory {
    PlanRequest,        // 生产请求本身（明细/数量）
    AssemblyStructure,  // 装配体产出或组件增删
    Composition,        // 组成边新增/数量变更
    IngredientLine,     // 原料行新增/数量变更
    LeafYield,          // 叶子组件规格变更
}

impl MutationCategory {
    pub fn label(&self) -> &'static str {
        match self {
            MutationCategory::PlanRequest => "plan request",
            MutationCategory::AssemblyStructure => "assembly structure",
            MutationCategory::Composition => "composition",
            MutationCategory::IngredientLine => "ingredient line",
            MutationCategory::LeafYield => "component yield",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StalenessVerdict {
    pub is_stale: bool,
    pub reason: String,
    pub categories: Vec<MutationCategory>,
    pub latest_change_at: Option<NaiveDateTime>,
}
