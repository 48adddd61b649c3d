// ==========================================
// 烘焙管理系统 - 计划快照陈旧判定
// ==========================================
// 比较 calculated_at 与所有参与计算对象的“结构时间戳”:
// - 生产请求: structure_updated_at + 各明细 created_at / updated_at
// - 可达装配体: structure_updated_at
// - 可达组成边: created_at / quantity_updated_at
// - 可达原料行: created_at / quantity_updated_at
// - 被引用叶子组件: yield_updated_at
// 外观字段（名称、备注、排序）只写 updated_at，不参与判定
// 价格变化不参与判定（快照成本是基线）
// ==========================================

use crate::config::config_manager::load_bom_config;
use crate::db::now_ts;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::plan::{MutationCategory, PlanRequest, PlanSnapshot, StalenessVerdict};
use crate::engine::composition_store::{audit, DEFAULT_ACTOR};
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::engine::graph::AssemblyGraph;
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::catalog_repo::LeafItemRepository;
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::plan_repo::{PlanRequestRepository, PlanSnapshotRepository};
use crate::repository::scope::{TransactionScope, TxContext};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

// ==========================================
// StalenessOracle
// ==========================================
pub struct StalenessOracle {
    scope: TransactionScope,
}

impl StalenessOracle {
    pub fn new(scope: TransactionScope) -> Self {
        Self { scope }
    }

    /// 判定快照是否陈旧（只读）
    pub fn is_stale(&self, ctx: Option<TxContext<'_>>, snapshot: &PlanSnapshot) -> BomResult<StalenessVerdict> {
        self.scope.run(ctx, "is_stale", |ctx| Self::verdict_on(&ctx, snapshot))
    }

    /// 判定并按配置回写失效标记（只打标记，不删除快照）
    pub fn check_and_invalidate(&self, ctx: Option<TxContext<'_>>, snapshot_id: &str) -> BomResult<StalenessVerdict> {
        self.scope.run(ctx, "check_and_invalidate", |ctx| {
            let snapshot = PlanSnapshotRepository::find_by_id(&ctx, snapshot_id)
                .ctx("find_plan_snapshot")?
                .ok_or_else(|| BomError::not_found("plan_snapshot", snapshot_id))?;
            let verdict = Self::verdict_on(&ctx, &snapshot)?;

            let persist = load_bom_config(&ctx).ctx("load_bom_config")?.persist_stale_verdict;
            if verdict.is_stale && persist && !snapshot.is_invalidated() {
                PlanSnapshotRepository::mark_invalidated(&ctx, snapshot_id, &verdict.reason, now_ts())
                    .ctx("mark_snapshot_invalidated")?;
                audit(
                    &ctx,
                    ActionLog::new(ActionType::InvalidatePlan, DEFAULT_ACTOR, None)
                        .with_detail(format!("{}: {}", snapshot_id, verdict.reason)),
                )?;
                info!(snapshot_id, reason = %verdict.reason, "计划快照已标记失效");
            }
            Ok(verdict)
        })
    }

    pub(crate) fn verdict_on(conn: &Connection, snapshot: &PlanSnapshot) -> BomResult<StalenessVerdict> {
        let request = PlanRequestRepository::find_by_id(conn, snapshot.plan_request_id)
            .ctx("find_plan_request")?
            .ok_or_else(|| BomError::not_found("plan_request", snapshot.plan_request_id))?;

        let cutoff = snapshot.calculated_at;
        let mut changes = ChangeSet::new(cutoff);
        collect_changes(conn, &request, &mut changes)?;

        let verdict = changes.into_verdict();
        debug!(
            plan = %request.slug,
            stale = verdict.is_stale,
            reason = %verdict.reason,
            "陈旧判定"
        );
        Ok(verdict)
    }
}

fn collect_changes(conn: &Connection, request: &PlanRequest, changes: &mut ChangeSet) -> BomResult<()> {
    changes.observe(MutationCategory::PlanRequest, request.structure_updated_at);
    for item in &request.items {
        changes.observe(MutationCategory::PlanRequest, item.created_at);
        changes.observe(MutationCategory::PlanRequest, item.updated_at);
    }

    let roots: Vec<_> = request.items.iter().map(|i| i.assembly_id).collect();
    let graph = AssemblyGraph::from_edges(CompositionRepository::assembly_edges(conn).ctx("load_assembly_edges")?);
    let mut seen_leaves = HashSet::new();

    for assembly_id in graph.reachable_from(&roots) {
        let assembly = match AssemblyRepository::find_by_id(conn, assembly_id).ctx("find_assembly")? {
            Some(a) => a,
            None => continue,
        };
        changes.observe(MutationCategory::AssemblyStructure, assembly.structure_updated_at);

        for edge in CompositionRepository::list_by_parent(conn, assembly_id).ctx("list_components")? {
            changes.observe(MutationCategory::Composition, edge.created_at);
            changes.observe(MutationCategory::Composition, edge.quantity_updated_at);

            if let Some((kind, id)) = edge.component.as_leaf() {
                if !seen_leaves.insert((kind, id)) {
                    continue;
                }
                if let Some(leaf) = LeafItemRepository::find_by_id(conn, kind, id).ctx("find_leaf")? {
                    changes.observe(MutationCategory::LeafYield, leaf.yield_updated_at);
                }
            }
        }

        for line in AssemblyRepository::list_ingredient_lines(conn, assembly_id).ctx("list_ingredient_lines")? {
            changes.observe(MutationCategory::IngredientLine, line.line.created_at);
            changes.observe(MutationCategory::IngredientLine, line.line.quantity_updated_at);
        }
    }
    Ok(())
}

/// 晚于 cutoff 的变更（按类别记录最晚时间）
struct ChangeSet {
    cutoff: NaiveDateTime,
    latest: BTreeMap<MutationCategory, NaiveDateTime>,
}

impl ChangeSet {
    fn new(cutoff: NaiveDateTime) -> Self {
        Self {
            cutoff,
            latest: BTreeMap::new(),
        }
    }

    fn observe(&mut self, category: MutationCategory, ts: NaiveDateTime) {
        if ts <= self.cutoff {
            return;
        }
        let entry = self.latest.entry(category).or_insert(ts);
        if ts > *entry {
            *entry = ts;
        }
    }

    fn into_verdict(self) -> StalenessVerdict {
        if self.latest.is_empty() {
            return StalenessVerdict {
                is_stale: false,
                reason: format!("no structural change since {}", self.cutoff),
                categories: Vec::new(),
                latest_change_at: None,
            };
        }

        let categories: Vec<MutationCategory> = self.latest.keys().copied().collect();
        let latest_change_at = self.latest.values().max().copied();
        let labels: Vec<&str> = categories.iter().map(|c| c.label()).collect();
        StalenessVerdict {
            is_stale: true,
            reason: format!("{} changed after calculation at {}", labels.join(", "), self.cutoff),
            categories,
            latest_change_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_变更集_只记录晚于截止时间的变更() {
        let cutoff = now_ts();
        let mut changes = ChangeSet::new(cutoff);
        changes.observe(MutationCategory::Composition, cutoff);
        changes.observe(MutationCategory::LeafYield, cutoff - Duration::seconds(1));
        assert!(!changes.into_verdict().is_stale);

        let mut changes = ChangeSet::new(cutoff);
        changes.observe(MutationCategory::Composition, cutoff + Duration::seconds(1));
        changes.observe(MutationCategory::Composition, cutoff + Duration::seconds(5));
        let verdict = changes.into_verdict();
        assert!(verdict.is_stale);
        assert_eq!(verdict.categories, vec![MutationCategory::Composition]);
        assert!(verdict.reason.contains("composition"));
        assert_eq!(verdict.latest_change_at, Some(cutoff + Duration::seconds(5)));
    }
}
