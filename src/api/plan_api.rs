// ==========================================
// 烘焙管理系统 - 生产计划 API
// ==========================================
// 职责: 生产请求维护、计划快照计算、陈旧判定
// 说明: 生产请求与装配体均按 slug 寻址
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::plan::{PlanRequest, PlanSnapshot, StalenessVerdict};
use crate::engine::catalog::assembly_by_slug;
use crate::engine::error::{BomError, StorageContext};
use crate::engine::plan_calculator::PlanCalculator;
use crate::engine::staleness::StalenessOracle;
use crate::repository::plan_repo::PlanSnapshotRepository;
use crate::repository::scope::TransactionScope;
use std::sync::Arc;

// ==========================================
// PlanApi - 生产计划 API
// ==========================================

/// 生产计划API
///
/// 职责：
/// 1. 生产请求的创建、改名、明细维护、删除
/// 2. 计算计划快照（原料汇总 + 成本基线）
/// 3. 快照陈旧判定与失效标记
pub struct PlanApi {
    scope: TransactionScope,
    calculator: Arc<PlanCalculator>,
    oracle: Arc<StalenessOracle>,
}

impl PlanApi {
    pub fn new(scope: TransactionScope) -> Self {
        Self {
            calculator: Arc::new(PlanCalculator::new(scope.clone())),
            oracle: Arc::new(StalenessOracle::new(scope.clone())),
            scope,
        }
    }

    // ==========================================
    // 生产请求
    // ==========================================

    pub fn create_plan(&self, slug: &str, display_name: &str) -> ApiResult<PlanRequest> {
        if display_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("生产请求名称不能为空".to_string()));
        }
        Ok(self.calculator.create_plan_request(None, slug, display_name.trim())?)
    }

    pub fn get_plan(&self, slug: &str) -> ApiResult<PlanRequest> {
        Ok(self.calculator.find_plan_request_by_slug(None, slug)?)
    }

    pub fn rename_plan(&self, slug: &str, display_name: &str) -> ApiResult<PlanRequest> {
        self.scope.run(None, "api_rename_plan", |ctx| {
            let plan = self.calculator.find_plan_request_by_slug(Some(ctx), slug)?;
            Ok(self.calculator.rename_plan_request(Some(ctx), plan.id, display_name)?)
        })
    }

    /// 设置明细批次数（不存在则新增）
    pub fn set_item(&self, plan_slug: &str, assembly_slug: &str, batches: f64) -> ApiResult<PlanRequest> {
        self.scope.run(None, "api_set_plan_item", |ctx| {
            let plan = self.calculator.find_plan_request_by_slug(Some(ctx), plan_slug)?;
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            Ok(self.calculator.set_item(Some(ctx), plan.id, assembly.id, batches)?)
        })
    }

    pub fn remove_item(&self, plan_slug: &str, assembly_slug: &str) -> ApiResult<bool> {
        self.scope.run(None, "api_remove_plan_item", |ctx| {
            let plan = self.calculator.find_plan_request_by_slug(Some(ctx), plan_slug)?;
            let assembly = assembly_by_slug(&ctx, assembly_slug)?;
            Ok(self.calculator.remove_item(Some(ctx), plan.id, assembly.id)?)
        })
    }

    /// 删除生产请求（快照一并删除）；不存在时返回 false
    pub fn delete_plan(&self, slug: &str) -> ApiResult<bool> {
        self.scope.run(None, "api_delete_plan", |ctx| {
            match self.calculator.find_plan_request_by_slug(Some(ctx), slug) {
                Ok(plan) => Ok(self.calculator.delete_plan_request(Some(ctx), plan.id)?),
                Err(BomError::NotFound { .. }) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    // ==========================================
    // 快照
    // ==========================================

    pub fn calculate(&self, plan_slug: &str) -> ApiResult<PlanSnapshot> {
        self.scope.run(None, "api_calculate_plan", |ctx| {
            let plan = self.calculator.find_plan_request_by_slug(Some(ctx), plan_slug)?;
            Ok(self.calculator.calculate(Some(ctx), plan.id)?)
        })
    }

    pub fn latest_snapshot(&self, plan_slug: &str) -> ApiResult<Option<PlanSnapshot>> {
        self.scope.run(None, "api_latest_snapshot", |ctx| {
            let plan = self.calculator.find_plan_request_by_slug(Some(ctx), plan_slug)?;
            Ok(self.calculator.latest_snapshot(Some(ctx), plan.id)?)
        })
    }

    pub fn list_snapshots(&self, plan_slug: &str) -> ApiResult<Vec<PlanSnapshot>> {
        self.scope.run(None, "api_list_snapshots", |ctx| {
            let plan = self.calculator.find_plan_request_by_slug(Some(ctx), plan_slug)?;
            Ok(self.calculator.list_snapshots(Some(ctx), plan.id)?)
        })
    }

    /// 只读判定，不回写失效标记
    pub fn is_stale(&self, snapshot_id: &str) -> ApiResult<StalenessVerdict> {
        self.scope.run(None, "api_is_stale", |ctx| {
            let snapshot = PlanSnapshotRepository::find_by_id(&ctx, snapshot_id)
                .ctx("find_plan_snapshot")?
                .ok_or_else(|| BomError::not_found("plan_snapshot", snapshot_id))?;
            Ok(self.oracle.is_stale(Some(ctx), &snapshot)?)
        })
    }

    /// 判定并按配置回写失效标记
    pub fn check_and_invalidate(&self, snapshot_id: &str) -> ApiResult<StalenessVerdict> {
        Ok(self.oracle.check_and_invalidate(None, snapshot_id)?)
    }
}
