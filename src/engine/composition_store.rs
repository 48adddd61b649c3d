// ==========================================
// 烘焙管理系统 - 组成边存储
// ==========================================
// 职责: 组成图 CRUD + 引用完整性（删除限制）
// 红线: 所有校验在写入之前完成；任何失败不留下部分写入
// 红线: 每次写入记录 action_log（同一事务）
// ==========================================
// 时间戳口径:
// - 新增/删除边、修改数量 → 父装配体 structure_updated_at
// - 修改备注/排序 → 仅 updated_at（不触发计划陈旧）
// ==========================================

use crate::config::config_manager::load_bom_config;
use crate::db::now_ts;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::assembly::Assembly;
use crate::domain::composition::{Composition, CompositionPatch};
use crate::domain::types::{AssemblyId, ComponentRef, CompositionId, ConsumedItem, ItemId, LeafKind};
use crate::engine::cycle_guard::CycleGuard;
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::catalog_repo::LeafItemRepository;
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::consumption_repo::ConsumptionRecordRepository;
use crate::repository::plan_repo::PlanRequestRepository;
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, instrument};

/// 默认操作人（单用户桌面应用）
pub const DEFAULT_ACTOR: &str = "local";

// ==========================================
// CompositionStore
// ==========================================
pub struct CompositionStore {
    scope: TransactionScope,
    actor: String,
}

impl CompositionStore {
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
    // 写入操作
    // ==========================================

    /// 新增组成边
    ///
    /// # 错误
    /// - `Validation`: 数量非正 / 重复边
    /// - `NotFound`: 父装配体或组件不存在
    /// - `Cycle` / `DepthExceeded`: CycleGuard 拒绝
    #[instrument(skip_all, fields(parent = parent.0, component = %component, quantity = quantity))]
    pub fn add_component(
        &self,
        ctx: Option<TxContext<'_>>,
        parent: AssemblyId,
        component: ComponentRef,
        quantity: f64,
        notes: Option<&str>,
    ) -> BomResult<Composition> {
        validate_quantity(quantity)?;

        self.scope.run(ctx, "add_component", |ctx| {
            let parent_asm = require_assembly(&ctx, parent)?;
            let component_slug = component_slug(&ctx, component)?;

            if CompositionRepository::find_by_parent_and_component(&ctx, parent, component)
                .ctx("find_duplicate_edge")?
                .is_some()
            {
                return Err(BomError::validation(format!(
                    "组成边已存在: {} -> {} {}",
                    parent_asm.slug,
                    component.kind(),
                    component_slug
                )));
            }

            let max_depth = load_bom_config(&ctx).ctx("load_bom_config")?.max_depth;
            CycleGuard::check(&ctx, parent, component, max_depth)?;

            let sort_order = CompositionRepository::max_sort_order(&ctx, parent)
                .ctx("max_sort_order")?
                .map(|v| v + 1)
                .unwrap_or(0);
            let notes = normalize_notes(notes);
            let now = now_ts();
            let id = CompositionRepository::insert(
                &ctx,
                parent,
                component,
                quantity,
                notes.as_deref(),
                sort_order,
                now,
            )
            .ctx("insert_composition")?;
            AssemblyRepository::touch_structure(&ctx, parent, now).ctx("touch_structure")?;

            audit(
                &ctx,
                ActionLog::new(ActionType::AddComponent, &self.actor, Some(&parent_asm.slug)).with_payload(json!({
                    "composition_id": id.0,
                    "component_kind": component.kind().as_str(),
                    "component_slug": component_slug,
                    "quantity": quantity,
                })),
            )?;

            info!(parent = %parent_asm.slug, component = %component_slug, quantity, "组成边已新增");
            require_composition(&ctx, id)
        })
    }

    /// 修改组成边（数量 / 备注）
    pub fn update_component(
        &self,
        ctx: Option<TxContext<'_>>,
        edge_id: CompositionId,
        patch: CompositionPatch,
    ) -> BomResult<Composition> {
        if let Some(q) = patch.quantity {
            validate_quantity(q)?;
        }

        self.scope.run(ctx, "update_component", |ctx| {
            let current = require_composition(&ctx, edge_id)?;
            if patch.is_empty() {
                return Ok(current);
            }

            let now = now_ts();
            let mut structural = false;
            if let Some(q) = patch.quantity {
                if q != current.quantity {
                    CompositionRepository::update_quantity(&ctx, edge_id, q, now)
                        .ctx("update_composition_quantity")?;
                    structural = true;
                }
            }
            if let Some(raw) = patch.notes.as_deref() {
                let notes = normalize_notes(Some(raw));
                CompositionRepository::update_notes(&ctx, edge_id, notes.as_deref(), now)
                    .ctx("update_composition_notes")?;
            }

            let parent_slug = require_assembly(&ctx, current.parent_id)?.slug;
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdateComponent, &self.actor, Some(&parent_slug)).with_payload(json!({
                    "composition_id": edge_id.0,
                    "quantity": patch.quantity,
                    "notes": patch.notes,
                    "structural": structural,
                })),
            )?;

            require_composition(&ctx, edge_id)
        })
    }

    /// 删除组成边；不存在时返回 false
    pub fn remove_component(&self, ctx: Option<TxContext<'_>>, edge_id: CompositionId) -> BomResult<bool> {
        self.scope.run(ctx, "remove_component", |ctx| {
            let current = match CompositionRepository::find_by_id(&ctx, edge_id).ctx("find_composition")? {
                Some(c) => c,
                None => return Ok(false),
            };

            let now = now_ts();
            CompositionRepository::delete(&ctx, edge_id).ctx("delete_composition")?;
            AssemblyRepository::touch_structure(&ctx, current.parent_id, now).ctx("touch_structure")?;

            let parent_slug = require_assembly(&ctx, current.parent_id)?.slug;
            audit(
                &ctx,
                ActionLog::new(ActionType::RemoveComponent, &self.actor, Some(&parent_slug)).with_payload(json!({
                    "composition_id": edge_id.0,
                    "component_kind": current.component.kind().as_str(),
                    "component_id": current.component.raw_id(),
                })),
            )?;
            info!(parent = %parent_slug, edge = edge_id.0, "组成边已删除");
            Ok(true)
        })
    }

    /// 按给定顺序重排父装配体的组成边（必须恰好覆盖全部边）
    pub fn reorder_components(
        &self,
        ctx: Option<TxContext<'_>>,
        parent: AssemblyId,
        ordered: &[CompositionId],
    ) -> BomResult<Vec<Composition>> {
        self.scope.run(ctx, "reorder_components", |ctx| {
            let parent_asm = require_assembly(&ctx, parent)?;
            let current = CompositionRepository::list_by_parent(&ctx, parent).ctx("list_components")?;

            let existing: HashSet<CompositionId> = current.iter().map(|c| c.id).collect();
            let requested: HashSet<CompositionId> = ordered.iter().copied().collect();
            if requested.len() != ordered.len() || existing != requested {
                return Err(BomError::validation(format!(
                    "排序列表必须恰好包含 {} 的全部 {} 条组成边",
                    parent_asm.slug,
                    current.len()
                )));
            }

            let now = now_ts();
            for (idx, edge_id) in ordered.iter().enumerate() {
                CompositionRepository::update_sort_order(&ctx, *edge_id, idx as i32, now)
                    .ctx("update_sort_order")?;
            }

            audit(
                &ctx,
                ActionLog::new(ActionType::ReorderComponents, &self.actor, Some(&parent_asm.slug))
                    .with_payload(json!({ "order": ordered.iter().map(|c| c.0).collect::<Vec<_>>() })),
            )?;
            CompositionRepository::list_by_parent(&ctx, parent).ctx("list_components")
        })
    }

    /// 删除装配体
    ///
    /// 仍被其他装配体、生产请求或消耗记录引用时拒绝；自身的组成边与原料行级联删除。
    pub fn delete_assembly(&self, ctx: Option<TxContext<'_>>, id: AssemblyId) -> BomResult<bool> {
        self.scope.run(ctx, "delete_assembly", |ctx| {
            let assembly = match AssemblyRepository::find_by_id(&ctx, id).ctx("find_assembly")? {
                Some(a) => a,
                None => return Ok(false),
            };

            let mut referenced_by = parent_slugs(&ctx, ComponentRef::FinishedGood(id))?;
            referenced_by.extend(
                PlanRequestRepository::find_slugs_referencing(&ctx, id)
                    .ctx("find_plan_references")?
                    .into_iter()
                    .map(|slug| format!("plan:{}", slug)),
            );
            referenced_by.extend(ledger_reference(&ctx, ComponentRef::FinishedGood(id))?);
            if !referenced_by.is_empty() {
                return Err(BomError::RestrictedDeletion {
                    entity: "assembly".to_string(),
                    slug: assembly.slug,
                    referenced_by,
                });
            }

            AssemblyRepository::delete(&ctx, id).ctx("delete_assembly")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::DeleteAssembly, &self.actor, Some(&assembly.slug)),
            )?;
            info!(slug = %assembly.slug, "装配体已删除");
            Ok(true)
        })
    }

    /// 删除叶子组件（被组成边或消耗记录引用时拒绝）
    pub fn delete_leaf(&self, ctx: Option<TxContext<'_>>, kind: LeafKind, id: ItemId) -> BomResult<bool> {
        self.scope.run(ctx, "delete_leaf", |ctx| {
            let leaf = match LeafItemRepository::find_by_id(&ctx, kind, id).ctx("find_leaf")? {
                Some(l) => l,
                None => return Ok(false),
            };

            let mut referenced_by = parent_slugs(&ctx, ComponentRef::leaf(kind, id))?;
            referenced_by.extend(ledger_reference(&ctx, ComponentRef::leaf(kind, id))?);
            if !referenced_by.is_empty() {
                return Err(BomError::RestrictedDeletion {
                    entity: kind.component_kind().as_str().to_string(),
                    slug: leaf.slug,
                    referenced_by,
                });
            }

            LeafItemRepository::delete(&ctx, kind, id).ctx("delete_leaf")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::DeleteLeaf, &self.actor, Some(&leaf.slug))
                    .with_detail(kind.component_kind().as_str()),
            )?;
            Ok(true)
        })
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 父装配体的组成边（sort_order, id 升序）
    pub fn list_components(&self, ctx: Option<TxContext<'_>>, parent: AssemblyId) -> BomResult<Vec<Composition>> {
        self.scope.run(ctx, "list_components", |ctx| {
            require_assembly(&ctx, parent)?;
            CompositionRepository::list_by_parent(&ctx, parent).ctx("list_components")
        })
    }

    /// 引用某组件的父装配体
    pub fn find_parents_of(&self, ctx: Option<TxContext<'_>>, component: ComponentRef) -> BomResult<Vec<Assembly>> {
        self.scope.run(ctx, "find_parents_of", |ctx| {
            let ids = CompositionRepository::find_parent_ids_of(&ctx, component).ctx("find_parents")?;
            let mut parents = Vec::with_capacity(ids.len());
            for id in ids {
                parents.push(require_assembly(&ctx, id)?);
            }
            parents.sort_by(|a, b| a.slug.cmp(&b.slug));
            Ok(parents)
        })
    }

    pub fn get_component(&self, ctx: Option<TxContext<'_>>, edge_id: CompositionId) -> BomResult<Composition> {
        self.scope.run(ctx, "get_component", |ctx| require_composition(&ctx, edge_id))
    }
}

// ==========================================
// 内部辅助（引擎内共享）
// ==========================================

pub(crate) fn validate_quantity(quantity: f64) -> BomResult<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(BomError::validation(format!("数量必须为正数: {}", quantity)));
    }
    Ok(())
}

fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

pub(crate) fn require_assembly(conn: &Connection, id: AssemblyId) -> BomResult<Assembly> {
    AssemblyRepository::find_by_id(conn, id)
        .ctx("find_assembly")?
        .ok_or_else(|| BomError::not_found("assembly", id))
}

fn require_composition(conn: &Connection, id: CompositionId) -> BomResult<Composition> {
    CompositionRepository::find_by_id(conn, id)
        .ctx("find_composition")?
        .ok_or_else(|| BomError::not_found("composition", id))
}

/// 组件 slug；不存在时返回 NotFound
pub(crate) fn component_slug(conn: &Connection, component: ComponentRef) -> BomResult<String> {
    match component.as_leaf() {
        Some((kind, id)) => LeafItemRepository::find_by_id(conn, kind, id)
            .ctx("find_leaf")?
            .map(|l| l.slug)
            .ok_or_else(|| BomError::not_found(kind.component_kind().as_str(), id)),
        None => Ok(require_assembly(conn, AssemblyId(component.raw_id()))?.slug),
    }
}

fn parent_slugs(conn: &Connection, component: ComponentRef) -> BomResult<Vec<String>> {
    let ids = CompositionRepository::find_parent_ids_of(conn, component).ctx("find_parents")?;
    let mut slugs = Vec::with_capacity(ids.len());
    for id in ids {
        slugs.push(require_assembly(conn, id)?.slug);
    }
    slugs.sort();
    Ok(slugs)
}

/// 消耗账本按 slug 导出，被消耗过的组件删除后记录将无法导入
fn ledger_reference(conn: &Connection, component: ComponentRef) -> BomResult<Option<String>> {
    let count = ConsumptionRecordRepository::count_by_item(conn, ConsumedItem::Component(component))
        .ctx("count_consumption_records")?;
    Ok((count > 0).then(|| format!("ledger:{}", count)))
}

pub(crate) fn audit(conn: &Connection, log: ActionLog) -> BomResult<()> {
    ActionLogRepository::insert(conn, &log).ctx("write_action_log")?;
    Ok(())
}
