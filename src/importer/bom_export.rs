// ==========================================
// 烘焙管理系统 - BOM 导出
// ==========================================
// 输出: BomBundle（JSON），全部引用改写为 slug
// ==========================================

use crate::db::{format_ts, now_ts};
use crate::domain::types::{AssemblyId, LeafKind};
use crate::engine::composition_store::component_slug;
use crate::engine::error::StorageContext;
use crate::importer::bundle::{
    AssemblyRecord, BomBundle, CompositionRecord, ConsumptionRecordEntry, IngredientLineRecord, IngredientRecord,
    LeafRecord, PlanItemRecord, PlanRequestRecord, ProductionEventRecord, BUNDLE_FORMAT_VERSION,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::catalog_repo::{IngredientRepository, LeafItemRepository};
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::consumption_repo::{ConsumptionRecordRepository, ProductionEventRepository};
use crate::repository::plan_repo::PlanRequestRepository;
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub struct BomExporter {
    scope: TransactionScope,
}

impl BomExporter {
    pub fn new(scope: TransactionScope) -> Self {
        Self { scope }
    }

    /// 导出全部目录、组成图、生产事件与生产请求
    pub fn export(&self, ctx: Option<TxContext<'_>>) -> ImportResult<BomBundle> {
        self.scope.run(ctx, "export_bundle", |ctx| build_bundle(&ctx))
    }

    pub fn export_json(&self, ctx: Option<TxContext<'_>>) -> ImportResult<String> {
        let bundle = self.export(ctx)?;
        Ok(serde_json::to_string_pretty(&bundle)?)
    }

    pub fn export_to_file(&self, path: impl AsRef<Path>) -> ImportResult<BomBundle> {
        let path = path.as_ref();
        let bundle = self.export(None)?;
        let json = serde_json::to_string_pretty(&bundle)?;
        std::fs::write(path, json).map_err(|e| ImportError::FileWriteError(format!("{}: {}", path.display(), e)))?;
        info!(
            path = %path.display(),
            assemblies = bundle.assemblies.len(),
            compositions = bundle.compositions.len(),
            events = bundle.production_events.len(),
            "导出完成"
        );
        Ok(bundle)
    }
}

fn build_bundle(conn: &Connection) -> ImportResult<BomBundle> {
    let ingredients = IngredientRepository::list_all(conn).ctx("list_ingredients")?;

    let mut leaves = Vec::new();
    for kind in LeafKind::ALL {
        for leaf in LeafItemRepository::list(conn, kind).ctx("list_leaves")? {
            leaves.push(LeafRecord {
                kind: kind.component_kind(),
                slug: leaf.slug,
                display_name: leaf.display_name,
                unit: leaf.unit,
                unit_cost: leaf.unit_cost,
                yield_quantity: leaf.yield_quantity,
            });
        }
    }

    let assemblies = AssemblyRepository::list_all(conn).ctx("list_assemblies")?;
    let slugs: HashMap<AssemblyId, String> = assemblies.iter().map(|a| (a.id, a.slug.clone())).collect();

    let mut ingredient_lines = Vec::new();
    for assembly in &assemblies {
        for line in AssemblyRepository::list_ingredient_lines(conn, assembly.id).ctx("list_ingredient_lines")? {
            ingredient_lines.push(IngredientLineRecord {
                assembly_slug: assembly.slug.clone(),
                ingredient_slug: line.ingredient.slug,
                quantity: line.line.quantity,
                unit: line.line.unit,
            });
        }
    }

    // 按父 slug 分组，组内保持 sort_order
    let mut compositions = Vec::new();
    for assembly in &assemblies {
        for edge in CompositionRepository::list_by_parent(conn, assembly.id).ctx("list_components")? {
            compositions.push(CompositionRecord {
                parent_slug: assembly.slug.clone(),
                component_kind: edge.component.kind(),
                component_slug: component_slug(conn, edge.component)?,
                quantity: edge.quantity,
                notes: edge.notes,
            });
        }
    }

    let mut production_events = Vec::new();
    for event in ProductionEventRepository::list_all(conn).ctx("list_events")? {
        let records = ConsumptionRecordRepository::list_by_event(conn, event.id)
            .ctx("list_records")?
            .into_iter()
            .map(|r| ConsumptionRecordEntry {
                item_kind: r.item.kind_str().to_string(),
                item_slug: r.item_slug,
                quantity_consumed: r.quantity_consumed,
                unit: r.unit,
                cost_snapshot: r.cost_snapshot,
                lot_ref: r.lot_ref,
                created_at: format_ts(&r.created_at),
            })
            .collect();
        production_events.push(ProductionEventRecord {
            event_uid: event.event_uid,
            assembly_slug: event.assembly_slug,
            quantity: event.quantity,
            batches: event.batches,
            total_cost: event.total_cost,
            lot_ref: event.lot_ref,
            notes: event.notes,
            produced_at: format_ts(&event.produced_at),
            records,
        });
    }

    let plan_requests = export_plan_requests(conn, &slugs)?;

    Ok(BomBundle {
        format_version: BUNDLE_FORMAT_VERSION,
        exported_at: format_ts(&now_ts()),
        ingredients: ingredients
            .into_iter()
            .map(|i| IngredientRecord {
                slug: i.slug,
                display_name: i.display_name,
                price_unit: i.price_unit,
                unit_price: i.unit_price,
            })
            .collect(),
        leaves,
        assemblies: assemblies
            .into_iter()
            .map(|a| AssemblyRecord {
                slug: a.slug,
                display_name: a.display_name,
                kind: a.kind,
                yield_quantity: a.yield_quantity,
                yield_unit: a.yield_unit,
            })
            .collect(),
        ingredient_lines,
        compositions,
        production_events,
        plan_requests,
    })
}

fn export_plan_requests(
    conn: &Connection,
    slugs: &HashMap<AssemblyId, String>,
) -> ImportResult<Vec<PlanRequestRecord>> {
    let requests = PlanRequestRepository::list_all(conn).ctx("list_plan_requests")?;
    Ok(requests
        .into_iter()
        .map(|request| PlanRequestRecord {
            items: request
                .items
                .iter()
                .filter_map(|item| {
                    slugs.get(&item.assembly_id).map(|slug| PlanItemRecord {
                        assembly_slug: slug.clone(),
                        quantity: item.quantity,
                    })
                })
                .collect(),
            slug: request.slug,
            display_name: request.display_name,
        })
        .collect())
}
