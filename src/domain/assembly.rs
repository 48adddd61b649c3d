// ==========================================
// 烘焙管理系统 - 装配体与目录领域模型
// ==========================================
// 时间戳口径:
// - updated_at: 任意字段变更（含名称等展示字段）
// - structure_updated_at / yield_updated_at / quantity_updated_at:
//   仅结构/数量变更，供陈旧判定使用
// ==========================================

use crate::domain::types::{AssemblyId, AssemblyKind, IngredientId, ItemId, LeafKind, Money};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Assembly - 装配体（配方 / 成品 / 包装组合）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub id: AssemblyId,
    pub slug: String,                          // 稳定标识（导入导出用）
    pub display_name: String,                  // 展示名称（外观字段）
    pub kind: AssemblyKind,
    pub yield_quantity: f64,                   // 每批产出数量
    pub yield_unit: String,                    // 产出单位
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub structure_updated_at: NaiveDateTime,   // 结构/产出变更时间
}

/// 新建装配体参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssembly {
    pub slug: String,
    pub display_name: String,
    pub kind: AssemblyKind,
    pub yield_quantity: f64,
    pub yield_unit: String,
}

// ==========================================
// Ingredient - 原料
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub slug: String,
    pub display_name: String,
    pub price_unit: String,            // 单价对应的计量单位
    pub unit_price: Option<Money>,     // None = 未定价
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// 新建原料参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIngredient {
    pub slug: String,
    pub display_name: String,
    pub price_unit: String,
    pub unit_price: Option<Money>,
}

// ==========================================
// AssemblyIngredient - 装配体直接原料行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyIngredient {
    pub id: i64,
    pub assembly_id: AssemblyId,
    pub ingredient_id: IngredientId,
    pub quantity: f64,
    pub unit: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub quantity_updated_at: NaiveDateTime,
}

/// 原料行 + 原料主数据（成本/汇总计算用）
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientLine {
    pub line: AssemblyIngredient,
    pub ingredient: Ingredient,
}

impl IngredientLine {
    /// 单位一致时返回单价；单位不一致视为未定价（不做隐式换算）
    pub fn effective_unit_price(&self) -> Option<Money> {
        if self.ingredient.price_unit == self.line.unit {
            self.ingredient.unit_price
        } else {
            None
        }
    }
}

// ==========================================
// LeafItem - 叶子组件（成品单元 / 包装材料 / 物料单元）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafItem {
    pub kind: LeafKind,
    pub id: ItemId,
    pub slug: String,
    pub display_name: String,
    pub unit: String,
    pub unit_cost: Option<Money>,        // None = 未定价
    pub yield_quantity: f64,             // 每批件数 / 包装规格
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub yield_updated_at: NaiveDateTime,
}

/// 新建叶子组件参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLeafItem {
    pub kind: LeafKind,
    pub slug: String,
    pub display_name: String,
    pub unit: String,
    pub unit_cost: Option<Money>,
    pub yield_quantity: f64,
}

// ==========================================
// 修改参数（None = 不修改）
// ==========================================

/// 装配体修改参数
///
/// display_name 为外观字段；yield_* 为结构字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyPatch {
    pub display_name: Option<String>,
    pub yield_quantity: Option<f64>,
    pub yield_unit: Option<String>,
}

/// 叶子组件修改参数（定价单独修改）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeafPatch {
    pub display_name: Option<String>,
    pub yield_quantity: Option<f64>,
}
