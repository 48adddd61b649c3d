// ==========================================
// 烘焙管理系统 - 成本递归计算
// ==========================================
// 公式:
//   direct(A) = Σ 原料行单价 × 数量 + Σ 叶子组件单价 × 数量
//   nested(A) = Σ 边数量 × total(子装配体)
//   total(A)  = direct(A) + nested(A)
// 规则:
// - 未定价 / 单价为 0 / 单位与计价单位不一致 → 贡献 0 并记入 missing_prices
// - 结果始终是尽力求和，不因缺价报错
// - 显式栈后序遍历 + 路径集合；回到当前路径上的装配体按 0 计
// ==========================================

use crate::domain::assembly::IngredientLine;
use crate::domain::composition::Composition;
use crate::domain::types::{scale_money, AssemblyId, ComponentRef, ConsumedItem, Money};
use crate::engine::composition_store::require_assembly;
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::perf::PerfGuard;
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::catalog_repo::{IngredientRepository, LeafItemRepository};
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

// ==========================================
// 结果类型
// ==========================================

/// 成本明细行（直接原料 / 叶子组件 / 嵌套装配体）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub item: ConsumedItem,
    pub slug: String,
    pub quantity: f64,
    pub unit: String,
    /// 单价（嵌套装配体为其每批总成本）；None = 未定价
    pub unit_cost: Option<Money>,
    pub extended_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub assembly_id: AssemblyId,
    pub slug: String,
    pub direct_cost: Money,
    pub nested_cost: Money,
    pub total_cost: Money,
    pub lines: Vec<CostLine>,
    /// 整棵子树内缺价的对象（"kind:slug"，去重排序）
    pub missing_prices: Vec<String>,
    pub is_partial: bool,
}

/// 单个装配体的计算结果（遍历内部缓存）
#[derive(Debug, Clone)]
struct Resolved {
    direct: Money,
    nested: Money,
    lines: Vec<CostLine>,
    missing: BTreeSet<String>,
}

impl Resolved {
    fn total(&self) -> Money {
        self.direct + self.nested
    }
}

// ==========================================
// CostResolver
// ==========================================
pub struct CostResolver {
    scope: TransactionScope,
}

impl CostResolver {
    pub fn new(scope: TransactionScope) -> Self {
        Self { scope }
    }

    /// 每批总成本
    pub fn total_cost(&self, ctx: Option<TxContext<'_>>, assembly: AssemblyId) -> BomResult<Money> {
        Ok(self.cost_breakdown(ctx, assembly)?.total_cost)
    }

    /// 成本明细
    pub fn cost_breakdown(&self, ctx: Option<TxContext<'_>>, assembly: AssemblyId) -> BomResult<CostBreakdown> {
        self.scope.run(ctx, "cost_breakdown", |ctx| Self::breakdown_on(&ctx, assembly))
    }

    /// 单位成本 = 总成本 / 产出数量（产出 <= 0 时为 0）
    pub fn cost_per_unit(&self, ctx: Option<TxContext<'_>>, assembly: AssemblyId) -> BomResult<Money> {
        self.scope.run(ctx, "cost_per_unit", |ctx| {
            let asm = require_assembly(&ctx, assembly)?;
            let total = Self::breakdown_on(&ctx, assembly)?.total_cost;
            Ok(per_unit(total, asm.yield_quantity))
        })
    }

    /// 任一消耗对象的当前单价（账本快照用）
    ///
    /// - 原料: 单价（未定价为 0）
    /// - 叶子组件: unit_cost（未定价为 0）
    /// - 嵌套装配体: 每批总成本
    pub fn item_unit_cost(&self, ctx: Option<TxContext<'_>>, item: ConsumedItem) -> BomResult<Money> {
        self.scope.run(ctx, "item_unit_cost", |ctx| Self::item_unit_cost_on(&ctx, item))
    }

    pub(crate) fn item_unit_cost_on(conn: &Connection, item: ConsumedItem) -> BomResult<Money> {
        match item {
            ConsumedItem::Ingredient(id) => Ok(IngredientRepository::find_by_id(conn, id)
                .ctx("find_ingredient")?
                .ok_or_else(|| BomError::not_found("ingredient", id))?
                .unit_price
                .unwrap_or(Decimal::ZERO)),
            ConsumedItem::Component(component) => match component.as_leaf() {
                Some((kind, id)) => Ok(LeafItemRepository::find_by_id(conn, kind, id)
                    .ctx("find_leaf")?
                    .ok_or_else(|| BomError::not_found(kind.component_kind().as_str(), id))?
                    .unit_cost
                    .unwrap_or(Decimal::ZERO)),
                None => Ok(Self::breakdown_on(conn, AssemblyId(component.raw_id()))?.total_cost),
            },
        }
    }

    /// 在给定连接上计算（供同一事务内的其他组件调用）
    pub(crate) fn breakdown_on(conn: &Connection, root: AssemblyId) -> BomResult<CostBreakdown> {
        let mut perf = PerfGuard::new("cost_breakdown");
        let root_asm = require_assembly(conn, root)?;

        let resolved = resolve_all(conn, root)?;
        perf.set_nodes(resolved.len());
        let node = resolved
            .get(&root)
            .ok_or_else(|| BomError::not_found("assembly", root))?;

        let missing_prices: Vec<String> = node.missing.iter().cloned().collect();
        debug!(
            assembly = %root_asm.slug,
            total = %node.total(),
            missing = missing_prices.len(),
            "成本计算完成"
        );

        Ok(CostBreakdown {
            assembly_id: root,
            slug: root_asm.slug,
            direct_cost: node.direct,
            nested_cost: node.nested,
            total_cost: node.total(),
            lines: node.lines.clone(),
            is_partial: !missing_prices.is_empty(),
            missing_prices,
        })
    }
}

pub(crate) fn per_unit(total: Money, yield_quantity: f64) -> Money {
    if !(yield_quantity > 0.0) {
        return Decimal::ZERO;
    }
    match Decimal::from_f64(yield_quantity) {
        Some(y) if !y.is_zero() => total / y,
        _ => Decimal::ZERO,
    }
}

// ==========================================
// 遍历
// ==========================================

/// 后序遍历根可达的全部装配体
fn resolve_all(conn: &Connection, root: AssemblyId) -> BomResult<HashMap<AssemblyId, Resolved>> {
    let mut memo: HashMap<AssemblyId, Resolved> = HashMap::new();
    let mut on_path: HashSet<AssemblyId> = HashSet::new();
    let mut loaded: HashMap<AssemblyId, (Vec<Composition>, Vec<IngredientLine>)> = HashMap::new();
    let mut stack: Vec<(AssemblyId, bool)> = vec![(root, false)];

    while let Some((node, expanded)) = stack.pop() {
        if memo.contains_key(&node) {
            continue;
        }

        if !expanded {
            if on_path.contains(&node) {
                continue;
            }
            on_path.insert(node);
            stack.push((node, true));

            let edges = CompositionRepository::list_by_parent(conn, node).ctx("list_components")?;
            let lines = AssemblyRepository::list_ingredient_lines(conn, node).ctx("list_ingredient_lines")?;
            for edge in &edges {
                if let Some(child) = edge.component.as_assembly() {
                    if !memo.contains_key(&child) && !on_path.contains(&child) {
                        stack.push((child, false));
                    }
                }
            }
            loaded.insert(node, (edges, lines));
            continue;
        }

        let (edges, lines) = loaded.remove(&node).unwrap_or_default();
        let resolved = resolve_node(conn, node, &edges, &lines, &memo)?;
        memo.insert(node, resolved);
        on_path.remove(&node);
    }

    Ok(memo)
}

/// 子节点均已计算后，汇总单个装配体
fn resolve_node(
    conn: &Connection,
    node: AssemblyId,
    edges: &[Composition],
    lines: &[IngredientLine],
    memo: &HashMap<AssemblyId, Resolved>,
) -> BomResult<Resolved> {
    let mut out = Resolved {
        direct: Decimal::ZERO,
        nested: Decimal::ZERO,
        lines: Vec::with_capacity(edges.len() + lines.len()),
        missing: BTreeSet::new(),
    };

    for line in lines {
        let price = line.effective_unit_price().filter(|p| !p.is_zero());
        let extended = price.map(|p| scale_money(p, line.line.quantity)).unwrap_or(Decimal::ZERO);
        if price.is_none() {
            out.missing.insert(format!("ingredient:{}", line.ingredient.slug));
        }
        out.direct += extended;
        out.lines.push(CostLine {
            item: ConsumedItem::Ingredient(line.ingredient.id),
            slug: line.ingredient.slug.clone(),
            quantity: line.line.quantity,
            unit: line.line.unit.clone(),
            unit_cost: price,
            extended_cost: extended,
        });
    }

    for edge in edges {
        match edge.component {
            ComponentRef::FinishedGood(child) => {
                let (child_total, child_slug, unit) = match memo.get(&child) {
                    Some(resolved) => {
                        out.missing.extend(resolved.missing.iter().cloned());
                        let asm = require_assembly(conn, child)?;
                        (resolved.total(), asm.slug, asm.yield_unit)
                    }
                    None => {
                        // 回边（图已损坏）：按 0 计
                        warn!(parent = node.0, child = child.0, "成本计算遇到环路，子装配体按 0 计");
                        (Decimal::ZERO, format!("#{}", child), "batch".to_string())
                    }
                };
                let extended = scale_money(child_total, edge.quantity);
                out.nested += extended;
                out.lines.push(CostLine {
                    item: ConsumedItem::Component(edge.component),
                    slug: child_slug,
                    quantity: edge.quantity,
                    unit,
                    unit_cost: Some(child_total),
                    extended_cost: extended,
                });
            }
            leaf_ref => {
                let (kind, id) = match leaf_ref.as_leaf() {
                    Some(pair) => pair,
                    None => continue,
                };
                let leaf = LeafItemRepository::find_by_id(conn, kind, id)
                    .ctx("find_leaf")?
                    .ok_or_else(|| BomError::not_found(kind.component_kind().as_str(), id))?;
                let price = leaf.unit_cost.filter(|p| !p.is_zero());
                let extended = price.map(|p| scale_money(p, edge.quantity)).unwrap_or(Decimal::ZERO);
                if price.is_none() {
                    out.missing.insert(format!("{}:{}", kind.component_kind().as_str(), leaf.slug));
                }
                out.direct += extended;
                out.lines.push(CostLine {
                    item: ConsumedItem::Component(leaf_ref),
                    slug: leaf.slug,
                    quantity: edge.quantity,
                    unit: leaf.unit,
                    unit_cost: price,
                    extended_cost: extended,
                });
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_单位成本_产出为零() {
        assert_eq!(per_unit(Decimal::new(1100, 2), 0.0), Decimal::ZERO);
        assert_eq!(per_unit(Decimal::new(1100, 2), 4.0), Decimal::new(275, 2));
    }
}
