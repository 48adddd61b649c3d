// ==========================================
// 烘焙管理系统 - 组成边领域模型
// ==========================================
// Composition: 父装配体 → 组件 的有向边
// 约束: 恰好一种组件类型 / 无自引用 / quantity > 0 / (父, 组件) 唯一
// ==========================================

use crate::domain::types::{AssemblyId, ComponentRef, CompositionId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub id: CompositionId,
    pub parent_id: AssemblyId,
    pub component: ComponentRef,
    pub quantity: f64,                       // 批次倍数或件数（视组件类型）
    pub notes: Option<String>,               // 备注（外观字段）
    pub sort_order: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub quantity_updated_at: NaiveDateTime,  // 数量变更时间（陈旧判定）
}

impl Composition {
    /// 是否为嵌套装配体边
    pub fn is_nested_assembly(&self) -> bool {
        self.component.as_assembly().is_some()
    }
}

/// 组成边修改参数（None = 不修改）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositionPatch {
    pub quantity: Option<f64>,
    /// Some("") 表示清空备注
    pub notes: Option<String>,
}

impl CompositionPatch {
    pub fn is_empty(&self) -> bool {
        self.quantity.is_none() && self.notes.is_none()
    }
}
