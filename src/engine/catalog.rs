// ==========================================
// 烘焙管理系统 - 目录维护
// ==========================================
// 职责: 装配体 / 原料 / 叶子组件 / 原料行的新建与修改
// 时间戳口径:
// - 名称、定价 → 仅 updated_at
// - 装配体产出 → structure_updated_at
// - 叶子规格 → yield_updated_at
// - 原料行增删 → 所属装配体 structure_updated_at；改数量 → quantity_updated_at
// ==========================================

use crate::db::now_ts;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::assembly::{
    Assembly, AssemblyIngredient, AssemblyPatch, Ingredient, IngredientLine, LeafItem, LeafPatch, NewAssembly,
    NewIngredient, NewLeafItem,
};
use crate::domain::types::{AssemblyId, IngredientId, ItemId, LeafKind, Money};
use crate::engine::composition_store::{audit, require_assembly, validate_quantity, DEFAULT_ACTOR};
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::catalog_repo::{IngredientRepository, LeafItemRepository};
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use serde_json::json;
use tracing::{debug, info};

pub struct CatalogService {
    scope: TransactionScope,
    actor: String,
}

impl CatalogService {
    pub fn new(scope: TransactionScope) -> Self {
        Self {
            scope,
            actor: DEFAULT_ACTOR.to_string(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    // ==========================================
    // 装配体
    // ==========================================

    pub fn create_assembly(&self, ctx: Option<TxContext<'_>>, new: NewAssembly) -> BomResult<Assembly> {
        validate_slug(&new.slug)?;
        validate_quantity(new.yield_quantity)?;

        self.scope.run(ctx, "create_assembly", |ctx| {
            if AssemblyRepository::find_by_slug(&ctx, &new.slug).ctx("find_assembly")?.is_some() {
                return Err(BomError::validation(format!("装配体已存在: {}", new.slug)));
            }
            let id = AssemblyRepository::insert(&ctx, &new, now_ts()).ctx("insert_assembly")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::CreateAssembly, &self.actor, Some(&new.slug)).with_payload(json!({
                    "kind": new.kind.as_str(),
                    "yield_quantity": new.yield_quantity,
                    "yield_unit": new.yield_unit,
                })),
            )?;
            info!(slug = %new.slug, kind = %new.kind, "装配体已创建");
            require_assembly(&ctx, id)
        })
    }

    pub fn update_assembly(
        &self,
        ctx: Option<TxContext<'_>>,
        id: AssemblyId,
        patch: AssemblyPatch,
    ) -> BomResult<Assembly> {
        if let Some(q) = patch.yield_quantity {
            validate_quantity(q)?;
        }

        self.scope.run(ctx, "update_assembly", |ctx| {
            let current = require_assembly(&ctx, id)?;
            let now = now_ts();

            if let Some(name) = patch.display_name.as_deref() {
                if name != current.display_name {
                    AssemblyRepository::update_display_name(&ctx, id, name, now).ctx("update_assembly_name")?;
                }
            }

            let yield_quantity = patch.yield_quantity.unwrap_or(current.yield_quantity);
            let yield_unit = patch.yield_unit.clone().unwrap_or_else(|| current.yield_unit.clone());
            if yield_quantity != current.yield_quantity || yield_unit != current.yield_unit {
                AssemblyRepository::update_yield(&ctx, id, yield_quantity, &yield_unit, now)
                    .ctx("update_assembly_yield")?;
            }

            audit(
                &ctx,
                ActionLog::new(ActionType::UpdateAssembly, &self.actor, Some(&current.slug)).with_payload(json!({
                    "display_name": patch.display_name,
                    "yield_quantity": patch.yield_quantity,
                    "yield_unit": patch.yield_unit,
                })),
            )?;
            require_assembly(&ctx, id)
        })
    }

    pub fn get_assembly(&self, ctx: Option<TxContext<'_>>, id: AssemblyId) -> BomResult<Assembly> {
        self.scope.run(ctx, "get_assembly", |ctx| require_assembly(&ctx, id))
    }

    pub fn find_assembly_by_slug(&self, ctx: Option<TxContext<'_>>, slug: &str) -> BomResult<Assembly> {
        self.scope.run(ctx, "find_assembly_by_slug", |ctx| assembly_by_slug(&ctx, slug))
    }

    pub fn list_assemblies(&self, ctx: Option<TxContext<'_>>) -> BomResult<Vec<Assembly>> {
        self.scope
            .run(ctx, "list_assemblies", |ctx| AssemblyRepository::list_all(&ctx).ctx("list_assemblies"))
    }

    // ==========================================
    // 原料
    // ==========================================

    pub fn create_ingredient(&self, ctx: Option<TxContext<'_>>, new: NewIngredient) -> BomResult<Ingredient> {
        validate_slug(&new.slug)?;
        validate_unit(&new.price_unit)?;
        validate_price(new.unit_price)?;

        self.scope.run(ctx, "create_ingredient", |ctx| {
            if IngredientRepository::find_by_slug(&ctx, &new.slug).ctx("find_ingredient")?.is_some() {
                return Err(BomError::validation(format!("原料已存在: {}", new.slug)));
            }
            let id = IngredientRepository::insert(&ctx, &new, now_ts()).ctx("insert_ingredient")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::CreateIngredient, &self.actor, Some(&new.slug)).with_payload(json!({
                    "price_unit": new.price_unit,
                    "unit_price": new.unit_price.map(|p| p.to_string()),
                })),
            )?;
            require_ingredient(&ctx, id)
        })
    }

    /// 修改原料单价（None = 清除定价）；不影响已生成的快照与账本
    pub fn set_ingredient_price(
        &self,
        ctx: Option<TxContext<'_>>,
        id: IngredientId,
        unit_price: Option<Money>,
    ) -> BomResult<Ingredient> {
        validate_price(unit_price)?;

        self.scope.run(ctx, "set_ingredient_price", |ctx| {
            let current = require_ingredient(&ctx, id)?;
            IngredientRepository::update_price(&ctx, id, unit_price, now_ts()).ctx("update_ingredient_price")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdateIngredient, &self.actor, Some(&current.slug))
                    .with_payload(json!({ "unit_price": unit_price.map(|p| p.to_string()) })),
            )?;
            require_ingredient(&ctx, id)
        })
    }

    pub fn rename_ingredient(
        &self,
        ctx: Option<TxContext<'_>>,
        id: IngredientId,
        display_name: &str,
    ) -> BomResult<Ingredient> {
        self.scope.run(ctx, "rename_ingredient", |ctx| {
            let current = require_ingredient(&ctx, id)?;
            IngredientRepository::update_display_name(&ctx, id, display_name, now_ts())
                .ctx("update_ingredient_name")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdateIngredient, &self.actor, Some(&current.slug))
                    .with_payload(json!({ "display_name": display_name })),
            )?;
            require_ingredient(&ctx, id)
        })
    }

    pub fn find_ingredient_by_slug(&self, ctx: Option<TxContext<'_>>, slug: &str) -> BomResult<Ingredient> {
        self.scope.run(ctx, "find_ingredient_by_slug", |ctx| {
            IngredientRepository::find_by_slug(&ctx, slug)
                .ctx("find_ingredient")?
                .ok_or_else(|| BomError::not_found("ingredient", slug))
        })
    }

    pub fn list_ingredients(&self, ctx: Option<TxContext<'_>>) -> BomResult<Vec<Ingredient>> {
        self.scope
            .run(ctx, "list_ingredients", |ctx| IngredientRepository::list_all(&ctx).ctx("list_ingredients"))
    }

    // ==========================================
    // 叶子组件
    // ==========================================

    pub fn create_leaf(&self, ctx: Option<TxContext<'_>>, new: NewLeafItem) -> BomResult<LeafItem> {
        validate_slug(&new.slug)?;
        validate_unit(&new.unit)?;
        validate_quantity(new.yield_quantity)?;
        validate_price(new.unit_cost)?;

        self.scope.run(ctx, "create_leaf", |ctx| {
            if LeafItemRepository::find_by_slug(&ctx, new.kind, &new.slug)
                .ctx("find_leaf")?
                .is_some()
            {
                return Err(BomError::validation(format!(
                    "{} 已存在: {}",
                    new.kind.component_kind(),
                    new.slug
                )));
            }
            let id = LeafItemRepository::insert(&ctx, &new, now_ts()).ctx("insert_leaf")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::CreateLeaf, &self.actor, Some(&new.slug)).with_payload(json!({
                    "kind": new.kind.component_kind().as_str(),
                    "unit": new.unit,
                    "unit_cost": new.unit_cost.map(|p| p.to_string()),
                    "yield_quantity": new.yield_quantity,
                })),
            )?;
            require_leaf(&ctx, new.kind, id)
        })
    }

    pub fn update_leaf(
        &self,
        ctx: Option<TxContext<'_>>,
        kind: LeafKind,
        id: ItemId,
        patch: LeafPatch,
    ) -> BomResult<LeafItem> {
        if let Some(q) = patch.yield_quantity {
            validate_quantity(q)?;
        }

        self.scope.run(ctx, "update_leaf", |ctx| {
            let current = require_leaf(&ctx, kind, id)?;
            let now = now_ts();
            if let Some(name) = patch.display_name.as_deref() {
                if name != current.display_name {
                    LeafItemRepository::update_display_name(&ctx, kind, id, name, now).ctx("update_leaf_name")?;
                }
            }
            if let Some(q) = patch.yield_quantity {
                if q != current.yield_quantity {
                    LeafItemRepository::update_yield(&ctx, kind, id, q, now).ctx("update_leaf_yield")?;
                }
            }
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdateLeaf, &self.actor, Some(&current.slug)).with_payload(json!({
                    "kind": kind.component_kind().as_str(),
                    "display_name": patch.display_name,
                    "yield_quantity": patch.yield_quantity,
                })),
            )?;
            require_leaf(&ctx, kind, id)
        })
    }

    /// 修改叶子组件单价（None = 清除定价）
    pub fn set_leaf_unit_cost(
        &self,
        ctx: Option<TxContext<'_>>,
        kind: LeafKind,
        id: ItemId,
        unit_cost: Option<Money>,
    ) -> BomResult<LeafItem> {
        validate_price(unit_cost)?;

        self.scope.run(ctx, "set_leaf_unit_cost", |ctx| {
            let current = require_leaf(&ctx, kind, id)?;
            LeafItemRepository::update_unit_cost(&ctx, kind, id, unit_cost, now_ts()).ctx("update_leaf_cost")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdateLeaf, &self.actor, Some(&current.slug)).with_payload(json!({
                    "kind": kind.component_kind().as_str(),
                    "unit_cost": unit_cost.map(|p| p.to_string()),
                })),
            )?;
            require_leaf(&ctx, kind, id)
        })
    }

    pub fn find_leaf_by_slug(&self, ctx: Option<TxContext<'_>>, kind: LeafKind, slug: &str) -> BomResult<LeafItem> {
        self.scope.run(ctx, "find_leaf_by_slug", |ctx| {
            LeafItemRepository::find_by_slug(&ctx, kind, slug)
                .ctx("find_leaf")?
                .ok_or_else(|| BomError::not_found(kind.component_kind().as_str(), slug))
        })
    }

    pub fn list_leaves(&self, ctx: Option<TxContext<'_>>, kind: LeafKind) -> BomResult<Vec<LeafItem>> {
        self.scope
            .run(ctx, "list_leaves", |ctx| LeafItemRepository::list(&ctx, kind).ctx("list_leaves"))
    }

    // ==========================================
    // 原料行
    // ==========================================

    /// 设置原料行数量（不存在则新增）
    ///
    /// 同一原料可以不同单位各有一行；单位与原料计价单位不一致时成本按未定价处理
    pub fn set_ingredient_line(
        &self,
        ctx: Option<TxContext<'_>>,
        assembly: AssemblyId,
        ingredient: IngredientId,
        quantity: f64,
        unit: &str,
    ) -> BomResult<AssemblyIngredient> {
        validate_quantity(quantity)?;
        validate_unit(unit)?;
        let unit = unit.trim();

        self.scope.run(ctx, "set_ingredient_line", |ctx| {
            let asm = require_assembly(&ctx, assembly)?;
            let ing = require_ingredient(&ctx, ingredient)?;
            let now = now_ts();

            match AssemblyRepository::find_ingredient_line(&ctx, assembly, ingredient, unit)
                .ctx("find_ingredient_line")?
            {
                Some(existing) => {
                    if existing.quantity != quantity {
                        AssemblyRepository::update_ingredient_line_quantity(&ctx, existing.id, quantity, now)
                            .ctx("update_ingredient_line")?;
                    }
                }
                None => {
                    AssemblyRepository::insert_ingredient_line(&ctx, assembly, ingredient, quantity, unit, now)
                        .ctx("insert_ingredient_line")?;
                    AssemblyRepository::touch_structure(&ctx, assembly, now).ctx("touch_structure")?;
                }
            }

            audit(
                &ctx,
                ActionLog::new(ActionType::SetIngredientLine, &self.actor, Some(&asm.slug)).with_payload(json!({
                    "ingredient": ing.slug,
                    "quantity": quantity,
                    "unit": unit,
                })),
            )?;
            debug!(assembly = %asm.slug, ingredient = %ing.slug, quantity, unit, "原料行已设置");

            AssemblyRepository::find_ingredient_line(&ctx, assembly, ingredient, unit)
                .ctx("find_ingredient_line")?
                .ok_or_else(|| BomError::not_found("ingredient_line", format!("{}/{}", asm.slug, ing.slug)))
        })
    }

    /// 删除原料行；不存在时返回 false
    pub fn remove_ingredient_line(&self, ctx: Option<TxContext<'_>>, line_id: i64) -> BomResult<bool> {
        self.scope.run(ctx, "remove_ingredient_line", |ctx| {
            let owner = match AssemblyRepository::delete_ingredient_line(&ctx, line_id)
                .ctx("delete_ingredient_line")?
            {
                Some(owner) => owner,
                None => return Ok(false),
            };
            AssemblyRepository::touch_structure(&ctx, owner, now_ts()).ctx("touch_structure")?;
            let asm = require_assembly(&ctx, owner)?;
            audit(
                &ctx,
                ActionLog::new(ActionType::RemoveIngredientLine, &self.actor, Some(&asm.slug))
                    .with_payload(json!({ "line_id": line_id })),
            )?;
            Ok(true)
        })
    }

    pub fn list_ingredient_lines(
        &self,
        ctx: Option<TxContext<'_>>,
        assembly: AssemblyId,
    ) -> BomResult<Vec<IngredientLine>> {
        self.scope.run(ctx, "list_ingredient_lines", |ctx| {
            require_assembly(&ctx, assembly)?;
            AssemblyRepository::list_ingredient_lines(&ctx, assembly).ctx("list_ingredient_lines")
        })
    }
}

// ==========================================
// 校验与查询辅助
// ==========================================

fn validate_slug(slug: &str) -> BomResult<()> {
    let trimmed = slug.trim();
    if trimmed.is_empty() {
        return Err(BomError::validation("slug 不能为空"));
    }
    if trimmed != slug || slug.chars().any(char::is_whitespace) {
        return Err(BomError::validation(format!("slug 不能包含空白字符: {:?}", slug)));
    }
    Ok(())
}

fn validate_unit(unit: &str) -> BomResult<()> {
    if unit.trim().is_empty() {
        return Err(BomError::validation("单位不能为空"));
    }
    Ok(())
}

fn validate_price(price: Option<Money>) -> BomResult<()> {
    match price {
        Some(p) if p.is_sign_negative() && !p.is_zero() => {
            Err(BomError::validation(format!("单价不能为负数: {}", p)))
        }
        _ => Ok(()),
    }
}

pub(crate) fn assembly_by_slug(conn: &Connection, slug: &str) -> BomResult<Assembly> {
    AssemblyRepository::find_by_slug(conn, slug)
        .ctx("find_assembly")?
        .ok_or_else(|| BomError::not_found("assembly", slug))
}

fn require_ingredient(conn: &Connection, id: IngredientId) -> BomResult<Ingredient> {
    IngredientRepository::find_by_id(conn, id)
        .ctx("find_ingredient")?
        .ok_or_else(|| BomError::not_found("ingredient", id))
}

fn require_leaf(conn: &Connection, kind: LeafKind, id: ItemId) -> BomResult<LeafItem> {
    LeafItemRepository::find_by_id(conn, kind, id)
        .ctx("find_leaf")?
        .ok_or_else(|| BomError::not_found(kind.component_kind().as_str(), id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_slug_校验() {
        assert!(validate_slug("sugar-cookie").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug(" sugar").is_err());
        assert!(validate_slug("sugar cookie").is_err());
    }

    #[test]
    fn test_单价_负数拒绝() {
        assert!(validate_price(None).is_ok());
        assert!(validate_price(Some(Decimal::ZERO)).is_ok());
        assert!(validate_price(Some(Decimal::new(-1, 2))).is_err());
    }
}
