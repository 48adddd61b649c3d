// ==========================================
// 烘焙管理系统 - 生产计划计算
// ==========================================
// 职责: 生产请求维护 + 计算不可变的计划快照
// 口径:
// - calculated_at 在读取任何数据之前取值（之后的结构变更必然晚于它）
// - total_cost = Σ 每批总成本 × 批次数（成本基线，不随价格回写）
// - 快照只追加；陈旧由 StalenessOracle 打标记
// ==========================================

use crate::db::now_ts;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::plan::{PlanRequest, PlanSnapshot};
use crate::domain::types::{scale_money, AssemblyId};
use crate::engine::composition_store::{audit, require_assembly, validate_quantity, DEFAULT_ACTOR};
use crate::engine::cost_resolver::CostResolver;
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::engine::ingredient_aggregator::IngredientAggregator;
use crate::perf::PerfGuard;
use crate::repository::plan_repo::{PlanRequestRepository, PlanSnapshotRepository};
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

pub struct PlanCalculator {
    scope: TransactionScope,
    actor: String,
}

impl PlanCalculator {
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
    // 生产请求
    // ==========================================

    pub fn create_plan_request(
        &self,
        ctx: Option<TxContext<'_>>,
        slug: &str,
        display_name: &str,
    ) -> BomResult<PlanRequest> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(BomError::validation("生产请求 slug 不能为空"));
        }

        self.scope.run(ctx, "create_plan_request", |ctx| {
            if PlanRequestRepository::find_by_slug(&ctx, slug)
                .ctx("find_plan_request")?
                .is_some()
            {
                return Err(BomError::validation(format!("生产请求已存在: {}", slug)));
            }
            let id = PlanRequestRepository::insert(&ctx, slug, display_name, now_ts()).ctx("insert_plan_request")?;
            audit(&ctx, ActionLog::new(ActionType::CreatePlan, &self.actor, Some(slug)))?;
            require_request(&ctx, id)
        })
    }

    /// 修改名称（外观字段，不影响快照）
    pub fn rename_plan_request(
        &self,
        ctx: Option<TxContext<'_>>,
        plan_id: i64,
        display_name: &str,
    ) -> BomResult<PlanRequest> {
        self.scope.run(ctx, "rename_plan_request", |ctx| {
            let request = require_request(&ctx, plan_id)?;
            PlanRequestRepository::update_display_name(&ctx, plan_id, display_name, now_ts())
                .ctx("update_plan_request")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdatePlan, &self.actor, Some(&request.slug))
                    .with_payload(json!({ "display_name": display_name })),
            )?;
            require_request(&ctx, plan_id)
        })
    }

    /// 新增或修改明细（quantity = 批次数）
    pub fn set_item(
        &self,
        ctx: Option<TxContext<'_>>,
        plan_id: i64,
        assembly: AssemblyId,
        quantity: f64,
    ) -> BomResult<PlanRequest> {
        validate_quantity(quantity)?;

        self.scope.run(ctx, "set_plan_item", |ctx| {
            let request = require_request(&ctx, plan_id)?;
            let asm = require_assembly(&ctx, assembly)?;
            PlanRequestRepository::upsert_item(&ctx, plan_id, assembly, quantity, now_ts())
                .ctx("upsert_plan_item")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdatePlan, &self.actor, Some(&request.slug))
                    .with_payload(json!({ "assembly": asm.slug, "quantity": quantity })),
            )?;
            require_request(&ctx, plan_id)
        })
    }

    /// 删除明细；明细不存在时返回 false
    pub fn remove_item(&self, ctx: Option<TxContext<'_>>, plan_id: i64, assembly: AssemblyId) -> BomResult<bool> {
        self.scope.run(ctx, "remove_plan_item", |ctx| {
            let request = require_request(&ctx, plan_id)?;
            let removed = PlanRequestRepository::delete_item(&ctx, plan_id, assembly, now_ts())
                .ctx("delete_plan_item")?
                > 0;
            if removed {
                audit(
                    &ctx,
                    ActionLog::new(ActionType::UpdatePlan, &self.actor, Some(&request.slug))
                        .with_payload(json!({ "removed_assembly": assembly.0 })),
                )?;
            }
            Ok(removed)
        })
    }

    pub fn delete_plan_request(&self, ctx: Option<TxContext<'_>>, plan_id: i64) -> BomResult<bool> {
        self.scope.run(ctx, "delete_plan_request", |ctx| {
            let request = match PlanRequestRepository::find_by_id(&ctx, plan_id).ctx("find_plan_request")? {
                Some(r) => r,
                None => return Ok(false),
            };
            PlanRequestRepository::delete(&ctx, plan_id).ctx("delete_plan_request")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdatePlan, &self.actor, Some(&request.slug)).with_detail("deleted"),
            )?;
            Ok(true)
        })
    }

    pub fn get_plan_request(&self, ctx: Option<TxContext<'_>>, plan_id: i64) -> BomResult<PlanRequest> {
        self.scope.run(ctx, "get_plan_request", |ctx| require_request(&ctx, plan_id))
    }

    pub fn find_plan_request_by_slug(&self, ctx: Option<TxContext<'_>>, slug: &str) -> BomResult<PlanRequest> {
        self.scope.run(ctx, "find_plan_request_by_slug", |ctx| {
            PlanRequestRepository::find_by_slug(&ctx, slug)
                .ctx("find_plan_request")?
                .ok_or_else(|| BomError::not_found("plan_request", slug))
        })
    }

    // ==========================================
    // 计算
    // ==========================================

    /// 计算并保存计划快照
    #[instrument(skip_all, fields(plan_id))]
    pub fn calculate(&self, ctx: Option<TxContext<'_>>, plan_id: i64) -> BomResult<PlanSnapshot> {
        self.scope.run(ctx, "calculate_plan", |ctx| {
            let calculated_at = now_ts();
            let mut perf = PerfGuard::new("calculate_plan");

            let request = require_request(&ctx, plan_id)?;
            perf.set_nodes(request.items.len());
            if request.items.is_empty() {
                return Err(BomError::validation(format!("生产请求没有明细: {}", request.slug)));
            }

            let snapshot = build_snapshot(&ctx, &request, calculated_at)?;
            PlanSnapshotRepository::insert(&ctx, &snapshot).ctx("insert_plan_snapshot")?;

            audit(
                &ctx,
                ActionLog::new(ActionType::CalculatePlan, &self.actor, Some(&request.slug)).with_payload(json!({
                    "snapshot_id": snapshot.snapshot_id,
                    "total_cost": snapshot.total_cost.to_string(),
                    "has_partial_cost": snapshot.has_partial_cost,
                    "ingredients": snapshot.ingredients.len(),
                })),
            )?;
            info!(
                plan = %request.slug,
                snapshot_id = %snapshot.snapshot_id,
                total_cost = %snapshot.total_cost,
                "计划快照已生成"
            );
            Ok(snapshot)
        })
    }

    pub fn latest_snapshot(&self, ctx: Option<TxContext<'_>>, plan_id: i64) -> BomResult<Option<PlanSnapshot>> {
        self.scope.run(ctx, "latest_snapshot", |ctx| {
            require_request(&ctx, plan_id)?;
            PlanSnapshotRepository::find_latest(&ctx, plan_id).ctx("find_latest_snapshot")
        })
    }

    pub fn list_snapshots(&self, ctx: Option<TxContext<'_>>, plan_id: i64) -> BomResult<Vec<PlanSnapshot>> {
        self.scope.run(ctx, "list_snapshots", |ctx| {
            require_request(&ctx, plan_id)?;
            PlanSnapshotRepository::list_by_request(&ctx, plan_id).ctx("list_snapshots")
        })
    }
}

fn require_request(conn: &Connection, id: i64) -> BomResult<PlanRequest> {
    PlanRequestRepository::find_by_id(conn, id)
        .ctx("find_plan_request")?
        .ok_or_else(|| BomError::not_found("plan_request", id))
}

fn build_snapshot(
    conn: &Connection,
    request: &PlanRequest,
    calculated_at: chrono::NaiveDateTime,
) -> BomResult<PlanSnapshot> {
    let roots: Vec<(AssemblyId, f64)> = request.items.iter().map(|i| (i.assembly_id, i.quantity)).collect();
    let ingredients = IngredientAggregator::aggregate_on(conn, &roots)?;

    let mut total_cost = Decimal::ZERO;
    let mut has_partial_cost = false;
    for (assembly, batches) in &roots {
        let breakdown = CostResolver::breakdown_on(conn, *assembly)?;
        total_cost += scale_money(breakdown.total_cost, *batches);
        has_partial_cost |= breakdown.is_partial;
    }

    Ok(PlanSnapshot {
        snapshot_id: uuid::Uuid::new_v4().to_string(),
        plan_request_id: request.id,
        calculated_at,
        total_cost,
        has_partial_cost,
        ingredients,
        invalidated_at: None,
        invalidation_reason: None,
    })
}
