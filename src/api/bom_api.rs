// ==========================================
// 烘焙管理系统 - BOM API
// ==========================================
// 职责: 界面边界，全部按 slug 寻址
// - 组成边增删改 / 排序 / 删除装配体与叶子组件
// - 成本、原料汇总、消耗记录
// - 目录维护
// 说明: slug 解析与引擎调用在同一事务作用域内完成
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::assembly::{
    Assembly, AssemblyIngredient, AssemblyPatch, Ingredient, IngredientLine, LeafItem, LeafPatch, NewAssembly,
    NewIngredient, NewLeafItem,
};
use crate::domain::composition::{Composition, CompositionPatch};
use crate::domain::consumption::{ConsumptionRecord, ProductionEvent, ProductionOutcome, ProductionRequest};
use crate::domain::plan::AggregatedIngredient;
use crate::domain::types::{ComponentKind, ComponentRef, ConsumedItem, LeafKind, Money};
use crate::engine::catalog::{assembly_by_slug, CatalogService};
use crate::engine::composition_store::{component_slug, CompositionStore};
use crate::engine::consumption_ledger::ConsumptionLedger;
use crate::engine::cost_resolver::{CostBreakdown, CostResolver};
use crate::engine::error::{BomError, StorageContext};
use crate::engine::ingredient_aggregator::IngredientAggregator;
use crate::engine::units::{DisplayIngredient, UnitConverter};
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::catalog_repo::{IngredientRepository, LeafItemRepository};
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::scope::{TransactionScope, TxContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 组成边视图（slug 形式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionView {
    pub id: i64,
    pub parent_slug: String,
    pub component_kind: ComponentKind,
    pub component_slug: String,
    pub quantity: f64,
    pub notes: Option<String>,
    pub sort_order: i32,
}

// ==========================================
// BomApi
// ==========================================
pub struct BomApi {
    scope: TransactionScope,
    store: Arc<CompositionStore>,
    catalog: Arc<CatalogService>,
    costs: Arc<CostResolver>,
    aggregator: Arc<IngredientAggregator>,
    ledger: Arc<ConsumptionLedger>,
}

impl BomApi {
    pub fn new(scope: TransactionScope, converter: Arc<dyn UnitConverter>) -> Self {
        Self {
            store: Arc::new(CompositionStore::new(scope.clone())),
            catalog: Arc::new(CatalogService::new(scope.clone())),
            costs: Arc::new(CostResolver::new(scope.clone())),
            aggregator: Arc::new(IngredientAggregator::new(scope.clone()).with_converter(converter)),
            ledger: Arc::new(ConsumptionLedger::new(scope.clone())),
            scope,
        }
    }

    // ==========================================
    // 组成边
    // ==========================================

    pub fn add_component(
        &self,
        parent_slug: &str,
        component_kind: ComponentKind,
        component_slug: &str,
        quantity: f64,
        notes: Option<&str>,
    ) -> ApiResult<CompositionView> {
        require_slug(parent_slug)?;
        require_slug(component_slug)?;
        self.scope.run(None, "api_add_component", |ctx| {
            let parent = assembly_by_slug(&ctx, parent_slug)?;
            let component = resolve_component(ctx, component_kind, component_slug)?;
            let edge = self.store.add_component(Some(ctx), parent.id, component, quantity, notes)?;
            Ok(to_view(ctx, &parent.slug, edge)?)
        })
    }

    /// 修改组成边；notes 传 Some("") 清空备注
    pub fn update_component(
        &self,
        parent_slug: &str,
        component_kind: ComponentKind,
        component_slug: &str,
        quantity: Option<f64>,
        notes: Option<String>,
    ) -> ApiResult<CompositionView> {
        if quantity.is_none() && notes.is_none() {
            return Err(ApiError::InvalidInput("没有需要修改的字段".to_string()));
        }
        self.scope.run(None, "api_update_component", |ctx| {
            let (parent, edge) = find_edge(ctx, parent_slug, component_kind, component_slug)?;
            let edge = self
                .store
                .update_component(Some(ctx), edge.id, CompositionPatch { quantity, notes })?;
            Ok(to_view(ctx, &parent.slug, edge)?)
        })
    }

    /// 删除组成边；不存在时返回 false
    pub fn remove_component(
        &self,
        parent_slug: &str,
        component_kind: ComponentKind,
        component_slug: &str,
    ) -> ApiResult<bool> {
        self.scope.run(None, "api_remove_component", |ctx| {
            let parent = assembly_by_slug(&ctx, parent_slug)?;
            let component = match try_resolve_component(ctx, component_kind, component_slug)? {
                Some(c) => c,
                None => return Ok(false),
            };
            match CompositionRepository::find_by_parent_and_component(&ctx, parent.id, component)
                .ctx("find_composition")?
            {
                Some(edge) => Ok(self.store.remove_component(Some(ctx), edge.id)?),
                None => Ok(false),
            }
        })
    }

    /// 按给定组件顺序重排
    pub fn reorder_components(
        &self,
        parent_slug: &str,
        ordered: &[(ComponentKind, String)],
    ) -> ApiResult<Vec<CompositionView>> {
        self.scope.run(None, "api_reorder_components", |ctx| {
            let parent = assembly_by_slug(&ctx, parent_slug)?;
            let mut ids = Vec::with_capacity(ordered.len());
            for (kind, slug) in ordered {
                let (_, edge) = find_edge(ctx, parent_slug, *kind, slug)?;
                ids.push(edge.id);
            }
            let edges = self.store.reorder_components(Some(ctx), parent.id, &ids)?;
            views(ctx, &parent.slug, edges)
        })
    }

    pub fn list_components(&self, parent_slug: &str) -> ApiResult<Vec<CompositionView>> {
        self.scope.run(None, "api_list_components", |ctx| {
            let parent = assembly_by_slug(&ctx, parent_slug)?;
            let edges = self.store.list_components(Some(ctx), parent.id)?;
            views(ctx, &parent.slug, edges)
        })
    }

    pub fn find_parents_of(&self, component_kind: ComponentKind, component_slug: &str) -> ApiResult<Vec<Assembly>> {
        self.scope.run(None, "api_find_parents_of", |ctx| {
            let component = resolve_component(ctx, component_kind, component_slug)?;
            Ok(self.store.find_parents_of(Some(ctx), component)?)
        })
    }

    /// 删除装配体；不存在时返回 false，被引用时返回 RestrictedDeletion
    pub fn delete_assembly(&self, slug: &str) -> ApiResult<bool> {
        self.scope.run(None, "api_delete_assembly", |ctx| {
            match AssemblyRepository::find_by_slug(&ctx, slug).ctx("find_assembly")? {
                Some(assembly) => Ok(self.store.delete_assembly(Some(ctx), assembly.id)?),
                None => Ok(false),
            }
        })
    }

    pub fn delete_leaf(&self, kind: LeafKind, slug: &str) -> ApiResult<bool> {
        self.scope.run(None, "api_delete_leaf", |ctx| {
            match LeafItemRepository::find_by_slug(&ctx, kind, slug).ctx("find_leaf")? {
                Some(leaf) => Ok(self.store.delete_leaf(Some(ctx), kind, leaf.id)?),
                None => Ok(false),
            }
        })
    }

    // ==========================================
    // 成本与汇总
    // ==========================================

    pub fn total_cost(&self, assembly_slug: &str) -> ApiResult<Money> {
        self.scope.run(None, "api_total_cost", |ctx| {
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            Ok(self.costs.total_cost(Some(ctx), assembly.id)?)
        })
    }

    pub fn cost_breakdown(&self, assembly_slug: &str) -> ApiResult<CostBreakdown> {
        self.scope.run(None, "api_cost_breakdown", |ctx| {
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            Ok(self.costs.cost_breakdown(Some(ctx), assembly.id)?)
        })
    }

    pub fn cost_per_unit(&self, assembly_slug: &str) -> ApiResult<Money> {
        self.scope.run(None, "api_cost_per_unit", |ctx| {
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            Ok(self.costs.cost_per_unit(Some(ctx), assembly.id)?)
        })
    }

    pub fn aggregate_ingredients(&self, assembly_slug: &str, multiplier: f64) -> ApiResult<Vec<AggregatedIngredient>> {
        self.scope.run(None, "api_aggregate", |ctx| {
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            Ok(self.aggregator.aggregate(Some(ctx), assembly.id, multiplier)?)
        })
    }

    /// 汇总结果的展示副本（经单位换算协作方）
    pub fn aggregate_for_display(&self, assembly_slug: &str, multiplier: f64) -> ApiResult<Vec<DisplayIngredient>> {
        let rows = self.aggregate_ingredients(assembly_slug, multiplier)?;
        Ok(self.aggregator.display_rows(&rows))
    }

    // ==========================================
    // 消耗账本
    // ==========================================

    /// 追加单条消耗记录
    ///
    /// item_kind: finished_unit / finished_good / packaging_product / material_unit / ingredient
    #[allow(clippy::too_many_arguments)]
    pub fn record_consumption(
        &self,
        production_event_id: i64,
        item_kind: &str,
        item_slug: &str,
        quantity_consumed: f64,
        unit: &str,
        cost_snapshot: Option<Money>,
        lot_ref: Option<&str>,
    ) -> ApiResult<ConsumptionRecord> {
        self.scope.run(None, "api_record_consumption", |ctx| {
            let item = resolve_consumed_item(ctx, item_kind, item_slug)?;
            Ok(self.ledger.record_consumption(
                Some(ctx),
                production_event_id,
                item,
                quantity_consumed,
                unit,
                cost_snapshot,
                lot_ref,
            )?)
        })
    }

    /// 生产 / 组装：写入事件与全部消耗记录
    pub fn record_production(
        &self,
        assembly_slug: &str,
        quantity: f64,
        lot_ref: Option<String>,
        notes: Option<String>,
    ) -> ApiResult<ProductionOutcome> {
        self.scope.run(None, "api_record_production", |ctx| {
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            Ok(self.ledger.record_production(
                Some(ctx),
                ProductionRequest {
                    assembly_id: assembly.id,
                    quantity,
                    lot_ref,
                    notes,
                },
            )?)
        })
    }

    pub fn list_production_events(&self, assembly_slug: Option<&str>) -> ApiResult<Vec<ProductionEvent>> {
        self.scope.run(None, "api_list_events", |ctx| {
            let assembly = match assembly_slug {
                Some(slug) => Some(assembly_by_slug(&ctx, slug)?.id),
                None => None,
            };
            Ok(self.ledger.list_events(Some(ctx), assembly)?)
        })
    }

    pub fn list_consumption_records(&self, production_event_id: i64) -> ApiResult<Vec<ConsumptionRecord>> {
        Ok(self.ledger.list_records(None, production_event_id)?)
    }

    // ==========================================
    // 目录
    // ==========================================

    pub fn create_assembly(&self, new: NewAssembly) -> ApiResult<Assembly> {
        Ok(self.catalog.create_assembly(None, new)?)
    }

    pub fn update_assembly(&self, slug: &str, patch: AssemblyPatch) -> ApiResult<Assembly> {
        self.scope.run(None, "api_update_assembly", |ctx| {
            let assembly = assembly_by_slug(&ctx, slug)?;
            Ok(self.catalog.update_assembly(Some(ctx), assembly.id, patch)?)
        })
    }

    pub fn get_assembly(&self, slug: &str) -> ApiResult<Assembly> {
        Ok(self.catalog.find_assembly_by_slug(None, slug)?)
    }

    pub fn list_assemblies(&self) -> ApiResult<Vec<Assembly>> {
        Ok(self.catalog.list_assemblies(None)?)
    }

    pub fn create_ingredient(&self, new: NewIngredient) -> ApiResult<Ingredient> {
        Ok(self.catalog.create_ingredient(None, new)?)
    }

    pub fn set_ingredient_price(&self, slug: &str, unit_price: Option<Money>) -> ApiResult<Ingredient> {
        self.scope.run(None, "api_set_ingredient_price", |ctx| {
            let ingredient = self.catalog.find_ingredient_by_slug(Some(ctx), slug)?;
            Ok(self.catalog.set_ingredient_price(Some(ctx), ingredient.id, unit_price)?)
        })
    }

    pub fn rename_ingredient(&self, slug: &str, display_name: &str) -> ApiResult<Ingredient> {
        self.scope.run(None, "api_rename_ingredient", |ctx| {
            let ingredient = self.catalog.find_ingredient_by_slug(Some(ctx), slug)?;
            Ok(self.catalog.rename_ingredient(Some(ctx), ingredient.id, display_name)?)
        })
    }

    pub fn list_ingredients(&self) -> ApiResult<Vec<Ingredient>> {
        Ok(self.catalog.list_ingredients(None)?)
    }

    pub fn create_leaf(&self, new: NewLeafItem) -> ApiResult<LeafItem> {
        Ok(self.catalog.create_leaf(None, new)?)
    }

    pub fn update_leaf(&self, kind: LeafKind, slug: &str, patch: LeafPatch) -> ApiResult<LeafItem> {
        self.scope.run(None, "api_update_leaf", |ctx| {
            let leaf = self.catalog.find_leaf_by_slug(Some(ctx), kind, slug)?;
            Ok(self.catalog.update_leaf(Some(ctx), kind, leaf.id, patch)?)
        })
    }

    pub fn set_leaf_unit_cost(&self, kind: LeafKind, slug: &str, unit_cost: Option<Money>) -> ApiResult<LeafItem> {
        self.scope.run(None, "api_set_leaf_unit_cost", |ctx| {
            let leaf = self.catalog.find_leaf_by_slug(Some(ctx), kind, slug)?;
            Ok(self.catalog.set_leaf_unit_cost(Some(ctx), kind, leaf.id, unit_cost)?)
        })
    }

    pub fn list_leaves(&self, kind: LeafKind) -> ApiResult<Vec<LeafItem>> {
        Ok(self.catalog.list_leaves(None, kind)?)
    }

    pub fn set_ingredient_line(
        &self,
        assembly_slug: &str,
        ingredient_slug: &str,
        quantity: f64,
        unit: &str,
    ) -> ApiResult<AssemblyIngredient> {
        self.scope.run(None, "api_set_ingredient_line", |ctx| {
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            let ingredient = self.catalog.find_ingredient_by_slug(Some(ctx), ingredient_slug)?;
            Ok(self
                .catalog
                .set_ingredient_line(Some(ctx), assembly.id, ingredient.id, quantity, unit)?)
        })
    }

    /// 删除原料行；不存在时返回 false
    pub fn remove_ingredient_line(&self, assembly_slug: &str, ingredient_slug: &str, unit: &str) -> ApiResult<bool> {
        self.scope.run(None, "api_remove_ingredient_line", |ctx| {
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            let ingredient = match IngredientRepository::find_by_slug(&ctx, ingredient_slug).ctx("find_ingredient")? {
                Some(i) => i,
                None => return Ok(false),
            };
            match AssemblyRepository::find_ingredient_line(&ctx, assembly.id, ingredient.id, unit.trim())
                .ctx("find_ingredient_line")?
            {
                Some(line) => Ok(self.catalog.remove_ingredient_line(Some(ctx), line.id)?),
                None => Ok(false),
            }
        })
    }

    pub fn list_ingredient_lines(&self, assembly_slug: &str) -> ApiResult<Vec<IngredientLine>> {
        self.scope.run(None, "api_list_ingredient_lines", |ctx| {
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            Ok(self.catalog.list_ingredient_lines(Some(ctx), assembly.id)?)
        })
    }
}

// ==========================================
// slug 解析辅助
// ==========================================

fn require_slug(slug: &str) -> ApiResult<()> {
    if slug.trim().is_empty() {
        return Err(ApiError::InvalidInput("slug 不能为空".to_string()));
    }
    Ok(())
}

fn try_resolve_component(ctx: TxContext<'_>, kind: ComponentKind, slug: &str) -> ApiResult<Option<ComponentRef>> {
    Ok(match kind.leaf_kind() {
        Some(leaf_kind) => LeafItemRepository::find_by_slug(&ctx, leaf_kind, slug)
            .ctx("find_leaf")?
            .map(|leaf| ComponentRef::leaf(leaf_kind, leaf.id)),
        None => AssemblyRepository::find_by_slug(&ctx, slug)
            .ctx("find_assembly")?
            .map(|a| ComponentRef::FinishedGood(a.id)),
    })
}

fn resolve_component(ctx: TxContext<'_>, kind: ComponentKind, slug: &str) -> ApiResult<ComponentRef> {
    try_resolve_component(ctx, kind, slug)?
        .ok_or_else(|| BomError::not_found(kind.as_str(), slug).into())
}

fn resolve_consumed_item(ctx: TxContext<'_>, kind: &str, slug: &str) -> ApiResult<ConsumedItem> {
    if kind.trim() == "ingredient" {
        return IngredientRepository::find_by_slug(&ctx, slug)
            .ctx("find_ingredient")?
            .map(|i| ConsumedItem::Ingredient(i.id))
            .ok_or_else(|| BomError::not_found("ingredient", slug).into());
    }
    let component_kind: ComponentKind = kind.parse().map_err(ApiError::InvalidInput)?;
    Ok(ConsumedItem::Component(resolve_component(ctx, component_kind, slug)?))
}

fn find_edge(
    ctx: TxContext<'_>,
    parent_slug: &str,
    kind: ComponentKind,
    component_slug: &str,
) -> ApiResult<(Assembly, Composition)> {
    let parent = assembly_by_slug(&ctx, parent_slug)?;
    let component = resolve_component(ctx, kind, component_slug)?;
    let edge = CompositionRepository::find_by_parent_and_component(&ctx, parent.id, component)
        .ctx("find_composition")?
        .ok_or_else(|| BomError::not_found("composition", format!("{} -> {}:{}", parent_slug, kind, component_slug)))?;
    Ok((parent, edge))
}

fn to_view(ctx: TxContext<'_>, parent_slug: &str, edge: Composition) -> ApiResult<CompositionView> {
    Ok(CompositionView {
        id: edge.id.0,
        parent_slug: parent_slug.to_string(),
        component_kind: edge.component.kind(),
        component_slug: component_slug(&ctx, edge.component)?,
        quantity: edge.quantity,
        notes: edge.notes,
        sort_order: edge.sort_order,
    })
}

fn views(ctx: TxContext<'_>, parent_slug: &str, edges: Vec<Composition>) -> ApiResult<Vec<CompositionView>> {
    edges.into_iter().map(|e| to_view(ctx, parent_slug, e)).collect()
}
