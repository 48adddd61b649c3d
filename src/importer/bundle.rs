// ==========================================
// 烘焙管理系统 - 导出包格式
// ==========================================
// 全部引用使用 slug（不含数据库 ID），可跨库导入
// 组成边格式: {parent_slug, component_kind, component_slug, quantity, notes}
// 消耗记录原样携带 cost_snapshot / lot_ref
// ==========================================

use crate::domain::types::{AssemblyKind, ComponentKind, Money};
use serde::{Deserialize, Serialize};

/// 当前导出格式版本
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomBundle {
    pub format_version: u32,
    pub exported_at: String,
    #[serde(default)]
    pub ingredients: Vec<IngredientRecord>,
    #[serde(default)]
    pub leaves: Vec<LeafRecord>,
    #[serde(default)]
    pub assemblies: Vec<AssemblyRecord>,
    #[serde(default)]
    pub ingredient_lines: Vec<IngredientLineRecord>,
    /// 按父装配体 slug、sort_order 排列；导入时按此顺序追加
    #[serde(default)]
    pub compositions: Vec<CompositionRecord>,
    #[serde(default)]
    pub production_events: Vec<ProductionEventRecord>,
    #[serde(default)]
    pub plan_requests: Vec<PlanRequestRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRecord {
    pub slug: String,
    pub display_name: String,
    pub price_unit: String,
    pub unit_price: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub kind: ComponentKind,
    pub slug: String,
    pub display_name: String,
    pub unit: String,
    pub unit_cost: Option<Money>,
    pub yield_quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRecord {
    pub slug: String,
    pub display_name: String,
    pub kind: AssemblyKind,
    pub yield_quantity: f64,
    pub yield_unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientLineRecord {
    pub assembly_slug: String,
    pub ingredient_slug: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub parent_slug: String,
    pub component_kind: ComponentKind,
    pub component_slug: String,
    pub quantity: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionEventRecord {
    pub event_uid: String,
    pub assembly_slug: String,
    pub quantity: f64,
    pub batches: f64,
    pub total_cost: Money,
    pub lot_ref: Option<String>,
    pub notes: Option<String>,
    pub produced_at: String,
    #[serde(default)]
    pub records: Vec<ConsumptionRecordEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecordEntry {
    /// finished_unit / finished_good / packaging_product / material_unit / ingredient
    pub item_kind: String,
    pub item_slug: String,
    pub quantity_consumed: f64,
    pub unit: String,
    pub cost_snapshot: Money,
    pub lot_ref: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequestRecord {
    pub slug: String,
    pub display_name: String,
    #[serde(default)]
    pub items: Vec<PlanItemRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItemRecord {
    pub assembly_slug: String,
    pub quantity: f64,
}

// ==========================================
// ImportReport - 导入结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub ingredients_created: usize,
    pub ingredients_updated: usize,
    pub leaves_created: usize,
    pub leaves_updated: usize,
    pub assemblies_created: usize,
    pub assemblies_updated: usize,
    pub ingredient_lines_written: usize,
    pub compositions_created: usize,
    pub compositions_updated: usize,
    pub events_imported: usize,
    pub events_skipped: usize,
    pub records_imported: usize,
    pub plan_requests_written: usize,
    pub skipped: Vec<SkippedEntry>,
}

/// 被跳过的单条数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub section: String,
    pub key: String,
    pub reason: String,
}

impl ImportReport {
    pub(crate) fn skip(&mut self, section: &str, key: impl Into<String>, reason: impl Into<String>) {
        let entry = SkippedEntry {
            section: section.to_string(),
            key: key.into(),
            reason: reason.into(),
        };
        tracing::warn!(section = %entry.section, key = %entry.key, reason = %entry.reason, "导入跳过");
        self.skipped.push(entry);
    }
}
