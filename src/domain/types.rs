// ==========================================
// 烘焙管理系统 - 领域类型定义
// ==========================================
// 标识符、组件引用（带标签联合）、金额
// ==========================================

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 金额（定点小数，避免浮点累加误差）
pub type Money = Decimal;

/// 金额 × 数量
///
/// 数量来自 REAL 列（f64）；非有限值按 0 处理（写入前已校验）。
pub fn scale_money(amount: Money, quantity: f64) -> Money {
    match Decimal::from_f64(quantity) {
        Some(q) => amount * q,
        None => Decimal::ZERO,
    }
}

// ==========================================
// 标识符
// ==========================================

/// 装配体 ID（配方 / 成品 / 包装组合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssemblyId(pub i64);

/// 叶子组件 ID（成品单元 / 包装材料 / 物料单元，各自一张表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

/// 原料 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngredientId(pub i64);

/// 组成边 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositionId(pub i64);

impl fmt::Display for AssemblyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for IngredientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CompositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ==========================================
// 装配体类型
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssemblyKind {
    Recipe,       // 配方
    FinishedGood, // 成品（可嵌套）
    Package,      // 包装组合
}

impl AssemblyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyKind::Recipe => "RECIPE",
            AssemblyKind::FinishedGood => "FINISHED_GOOD",
            AssemblyKind::Package => "PACKAGE",
        }
    }
}

impl fmt::Display for AssemblyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssemblyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('"') {
            "RECIPE" => Ok(AssemblyKind::Recipe),
            "FINISHED_GOOD" => Ok(AssemblyKind::FinishedGood),
            "PACKAGE" => Ok(AssemblyKind::Package),
            other => Err(format!("未知装配体类型: {}", other)),
        }
    }
}

// ==========================================
// 叶子组件类型（三张目录表）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafKind {
    FinishedUnit,     // 成品单元（单个饼干、单个蛋糕）
    PackagingProduct, // 包装材料（盒子、丝带）
    MaterialUnit,     // 物料单元（贴纸、卡片）
}

impl LeafKind {
    pub const ALL: [LeafKind; 3] = [
        LeafKind::FinishedUnit,
        LeafKind::PackagingProduct,
        LeafKind::MaterialUnit,
    ];

    /// 对应的数据表名（固定白名单，可安全拼入 SQL）
    pub fn table(&self) -> &'static str {
        match self {
            LeafKind::FinishedUnit => "finished_unit",
            LeafKind::PackagingProduct => "packaging_product",
            LeafKind::MaterialUnit => "material_unit",
        }
    }

    /// composition 表中对应的外键列
    pub fn composition_column(&self) -> &'static str {
        match self {
            LeafKind::FinishedUnit => "finished_unit_id",
            LeafKind::PackagingProduct => "packaging_product_id",
            LeafKind::MaterialUnit => "material_unit_id",
        }
    }

    pub fn component_kind(&self) -> ComponentKind {
        match self {
            LeafKind::FinishedUnit => ComponentKind::FinishedUnit,
            LeafKind::PackagingProduct => ComponentKind::PackagingProduct,
            LeafKind::MaterialUnit => ComponentKind::MaterialUnit,
        }
    }
}

// ==========================================
// 组件类型（导出格式中的 component_kind）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    FinishedUnit,
    FinishedGood,
    PackagingProduct,
    MaterialUnit,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::FinishedUnit => "finished_unit",
            ComponentKind::FinishedGood => "finished_good",
            ComponentKind::PackagingProduct => "packaging_product",
            ComponentKind::MaterialUnit => "material_unit",
        }
    }

    pub fn leaf_kind(&self) -> Option<LeafKind> {
        match self {
            ComponentKind::FinishedUnit => Some(LeafKind::FinishedUnit),
            ComponentKind::FinishedGood => None,
            ComponentKind::PackagingProduct => Some(LeafKind::PackagingProduct),
            ComponentKind::MaterialUnit => Some(LeafKind::MaterialUnit),
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "finished_unit" => Ok(ComponentKind::FinishedUnit),
            "finished_good" => Ok(ComponentKind::FinishedGood),
            "packaging_product" => Ok(ComponentKind::PackagingProduct),
            "material_unit" => Ok(ComponentKind::MaterialUnit),
            other => Err(format!("未知组件类型: {}", other)),
        }
    }
}

// ==========================================
// ComponentRef - 组件引用（恰好一种）
// ==========================================
// 四选一由类型保证，不存在 “零个/多个” 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ComponentRef {
    FinishedUnit(ItemId),
    FinishedGood(AssemblyId),
    PackagingProduct(ItemId),
    MaterialUnit(ItemId),
}

impl ComponentRef {
    /// 按叶子类型构造
    pub fn leaf(kind: LeafKind, id: ItemId) -> Self {
        match kind {
            LeafKind::FinishedUnit => ComponentRef::FinishedUnit(id),
            LeafKind::PackagingProduct => ComponentRef::PackagingProduct(id),
            LeafKind::MaterialUnit => ComponentRef::MaterialUnit(id),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentRef::FinishedUnit(_) => ComponentKind::FinishedUnit,
            ComponentRef::FinishedGood(_) => ComponentKind::FinishedGood,
            ComponentRef::PackagingProduct(_) => ComponentKind::PackagingProduct,
            ComponentRef::MaterialUnit(_) => ComponentKind::MaterialUnit,
        }
    }

    /// 嵌套装配体时返回其 ID
    pub fn as_assembly(&self) -> Option<AssemblyId> {
        match self {
            ComponentRef::FinishedGood(id) => Some(*id),
            _ => None,
        }
    }

    /// 叶子组件时返回 (类型, ID)
    pub fn as_leaf(&self) -> Option<(LeafKind, ItemId)> {
        match self {
            ComponentRef::FinishedUnit(id) => Some((LeafKind::FinishedUnit, *id)),
            ComponentRef::PackagingProduct(id) => Some((LeafKind::PackagingProduct, *id)),
            ComponentRef::MaterialUnit(id) => Some((LeafKind::MaterialUnit, *id)),
            ComponentRef::FinishedGood(_) => None,
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            ComponentRef::FinishedUnit(id)
            | ComponentRef::PackagingProduct(id)
            | ComponentRef::MaterialUnit(id) => id.0,
            ComponentRef::FinishedGood(id) => id.0,
        }
    }

    /// composition 表中对应的外键列
    pub fn composition_column(&self) -> &'static str {
        match self.as_leaf() {
            Some((kind, _)) => kind.composition_column(),
            None => "finished_good_id",
        }
    }

    /// 从 composition 四个外键列还原（库层 CHECK 之外的兜底校验）
    pub fn from_columns(
        finished_unit_id: Option<i64>,
        finished_good_id: Option<i64>,
        packaging_product_id: Option<i64>,
        material_unit_id: Option<i64>,
    ) -> Result<Self, String> {
        match (finished_unit_id, finished_good_id, packaging_product_id, material_unit_id) {
            (Some(id), None, None, None) => Ok(ComponentRef::FinishedUnit(ItemId(id))),
            (None, Some(id), None, None) => Ok(ComponentRef::FinishedGood(AssemblyId(id))),
            (None, None, Some(id), None) => Ok(ComponentRef::PackagingProduct(ItemId(id))),
            (None, None, None, Some(id)) => Ok(ComponentRef::MaterialUnit(ItemId(id))),
            other => Err(format!("组件引用必须恰好设置一种类型: {:?}", other)),
        }
    }

    /// 拆解为 composition 四个外键列
    pub fn to_columns(&self) -> (Option<i64>, Option<i64>, Option<i64>, Option<i64>) {
        match self {
            ComponentRef::FinishedUnit(id) => (Some(id.0), None, None, None),
            ComponentRef::FinishedGood(id) => (None, Some(id.0), None, None),
            ComponentRef::PackagingProduct(id) => (None, None, Some(id.0), None),
            ComponentRef::MaterialUnit(id) => (None, None, None, Some(id.0)),
        }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind(), self.raw_id())
    }
}

// ==========================================
// ConsumedItem - 账本中的消耗对象
// ==========================================
// 组件四种 + 配方直接原料
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumedItem {
    Component(ComponentRef),
    Ingredient(IngredientId),
}

impl ConsumedItem {
    /// consumption_record.item_kind 列值
    pub fn kind_str(&self) -> &'static str {
        match self {
            ConsumedItem::Component(c) => c.kind().as_str(),
            ConsumedItem::Ingredient(_) => "ingredient",
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            ConsumedItem::Component(c) => c.raw_id(),
            ConsumedItem::Ingredient(id) => id.0,
        }
    }

    /// 从 (item_kind, item_id) 还原
    pub fn from_parts(kind: &str, id: i64) -> Result<Self, String> {
        if kind == "ingredient" {
            return Ok(ConsumedItem::Ingredient(IngredientId(id)));
        }
        let component_kind: ComponentKind = kind.parse()?;
        Ok(ConsumedItem::Component(match component_kind.leaf_kind() {
            Some(leaf) => ComponentRef::leaf(leaf, ItemId(id)),
            None => ComponentRef::FinishedGood(AssemblyId(id)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_ref_列往返() {
        let refs = [
            ComponentRef::FinishedUnit(ItemId(1)),
            ComponentRef::FinishedGood(AssemblyId(2)),
            ComponentRef::PackagingProduct(ItemId(3)),
            ComponentRef::MaterialUnit(ItemId(4)),
        ];
        for r in refs {
            let (a, b, c, d) = r.to_columns();
            assert_eq!(ComponentRef::from_columns(a, b, c, d).unwrap(), r);
        }
    }

    #[test]
    fn test_component_ref_零个或多个_拒绝() {
        assert!(ComponentRef::from_columns(None, None, None, None).is_err());
        assert!(ComponentRef::from_columns(Some(1), Some(2), None, None).is_err());
    }

    #[test]
    fn test_consumed_item_kind_解析() {
        let item = ConsumedItem::from_parts("packaging_product", 7).unwrap();
        assert_eq!(
            item,
            ConsumedItem::Component(ComponentRef::PackagingProduct(ItemId(7)))
        );
        assert_eq!(item.kind_str(), "packaging_product");
        assert_eq!(
            ConsumedItem::from_parts("ingredient", 3).unwrap(),
            ConsumedItem::Ingredient(IngredientId(3))
        );
        assert!(ConsumedItem::from_parts("flour", 1).is_err());
    }

    #[test]
    fn test_scale_money() {
        let price = Decimal::new(210, 2);
        assert_eq!(scale_money(price, 2.0), Decimal::new(420, 2));
        assert_eq!(scale_money(price, f64::NAN), Decimal::ZERO);
    }
}
