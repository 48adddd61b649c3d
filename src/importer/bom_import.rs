// ==========================================
// 烘焙管理系统 - BOM 导入
// ==========================================
// 两阶段导入（同一事务）:
//   阶段一: 原料 / 叶子组件 / 装配体 / 原料行（按 slug 新建或就地更新）
//   阶段二: 组成边（经 CompositionStore，环路与深度校验照常生效）
//   之后: 生产事件与消耗记录原样恢复（不重算成本），生产请求
// 规则:
// - 无法解析的 slug、校验失败的单条数据: warn + 记入报告，继续导入
// - 已存在的组成边就地更新（重复导入结果不变）
// - 已存在的 event_uid 跳过
// - 存储错误: 整体回滚
// ==========================================

use crate::db::parse_ts;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::assembly::{AssemblyPatch, LeafPatch, NewAssembly, NewIngredient, NewLeafItem};
use crate::domain::composition::CompositionPatch;
use crate::domain::consumption::{NewConsumptionRecord, NewProductionEvent};
use crate::domain::types::{ComponentKind, ComponentRef, ConsumedItem};
use crate::engine::catalog::CatalogService;
use crate::engine::composition_store::{audit, CompositionStore, DEFAULT_ACTOR};
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::engine::plan_calculator::PlanCalculator;
use crate::importer::bundle::{
    BomBundle, CompositionRecord, ConsumptionRecordEntry, ImportReport, ProductionEventRecord,
    BUNDLE_FORMAT_VERSION,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::catalog_repo::{IngredientRepository, LeafItemRepository};
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::consumption_repo::{ConsumptionRecordRepository, ProductionEventRepository};
use crate::repository::plan_repo::PlanRequestRepository;
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use tracing::{debug, info, instrument};

pub struct BomImporter {
    scope: TransactionScope,
    catalog: CatalogService,
    store: CompositionStore,
    plans: PlanCalculator,
    actor: String,
}

impl BomImporter {
    pub fn new(scope: TransactionScope) -> Self {
        Self {
            catalog: CatalogService::new(scope.clone()),
            store: CompositionStore::new(scope.clone()),
            plans: PlanCalculator::new(scope.clone()),
            scope,
            actor: DEFAULT_ACTOR.to_string(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        let actor = actor.into();
        self.catalog = self.catalog.with_actor(actor.clone());
        self.store = self.store.with_actor(actor.clone());
        self.plans = self.plans.with_actor(actor.clone());
        self.actor = actor;
        self
    }

    /// 导入导出包
    #[instrument(skip_all, fields(
        assemblies = bundle.assemblies.len(),
        compositions = bundle.compositions.len(),
        events = bundle.production_events.len()
    ))]
    pub fn import(&self, ctx: Option<TxContext<'_>>, bundle: &BomBundle) -> ImportResult<ImportReport> {
        if bundle.format_version > BUNDLE_FORMAT_VERSION {
            return Err(ImportError::UnsupportedVersion {
                found: bundle.format_version,
                supported: BUNDLE_FORMAT_VERSION,
            });
        }

        self.scope.run(ctx, "import_bundle", |ctx| {
            let mut report = ImportReport::default();

            // 阶段一: 实体
            self.import_ingredients(ctx, bundle, &mut report)?;
            self.import_leaves(ctx, bundle, &mut report)?;
            self.import_assemblies(ctx, bundle, &mut report)?;
            self.import_ingredient_lines(ctx, bundle, &mut report)?;

            // 阶段二: 组成边
            for record in &bundle.compositions {
                self.import_composition(ctx, record, &mut report)?;
            }

            for event in &bundle.production_events {
                import_event(&ctx, event, &mut report)?;
            }
            self.import_plan_requests(ctx, bundle, &mut report)?;

            audit(
                &ctx,
                ActionLog::new(ActionType::Import, &self.actor, None).with_payload(json!({
                    "assemblies_created": report.assemblies_created,
                    "compositions_created": report.compositions_created,
                    "compositions_updated": report.compositions_updated,
                    "events_imported": report.events_imported,
                    "skipped": report.skipped.len(),
                })),
            )?;

            info!(
                compositions_created = report.compositions_created,
                compositions_updated = report.compositions_updated,
                events = report.events_imported,
                skipped = report.skipped.len(),
                "导入完成"
            );
            Ok(report)
        })
    }

    pub fn import_json(&self, ctx: Option<TxContext<'_>>, json: &str) -> ImportResult<ImportReport> {
        let bundle: BomBundle = serde_json::from_str(json)?;
        self.import(ctx, &bundle)
    }

    pub fn import_from_file(&self, path: impl AsRef<Path>) -> ImportResult<ImportReport> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), bytes = raw.len(), "读取导入文件");
        self.import_json(None, &raw)
    }

    // ==========================================
    // 阶段一
    // ==========================================

    fn import_ingredients(&self, ctx: TxContext<'_>, bundle: &BomBundle, report: &mut ImportReport) -> ImportResult<()> {
        for record in &bundle.ingredients {
            match IngredientRepository::find_by_slug(&ctx, &record.slug).ctx("find_ingredient")? {
                Some(existing) => {
                    let mut changed = false;
                    if existing.display_name != record.display_name {
                        self.catalog.rename_ingredient(Some(ctx), existing.id, &record.display_name)?;
                        changed = true;
                    }
                    if existing.unit_price != record.unit_price {
                        let result = self.catalog.set_ingredient_price(Some(ctx), existing.id, record.unit_price);
                        if skip_on_error(report, "ingredients", &record.slug, result)?.is_none() {
                            continue;
                        }
                        changed = true;
                    }
                    if changed {
                        report.ingredients_updated += 1;
                    }
                }
                None => {
                    let result = self.catalog.create_ingredient(
                        Some(ctx),
                        NewIngredient {
                            slug: record.slug.clone(),
                            display_name: record.display_name.clone(),
                            price_unit: record.price_unit.clone(),
                            unit_price: record.unit_price,
                        },
                    );
                    if skip_on_error(report, "ingredients", &record.slug, result)?.is_some() {
                        report.ingredients_created += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn import_leaves(&self, ctx: TxContext<'_>, bundle: &BomBundle, report: &mut ImportReport) -> ImportResult<()> {
        for record in &bundle.leaves {
            let kind = match record.kind.leaf_kind() {
                Some(kind) => kind,
                None => {
                    report.skip("leaves", &record.slug, "finished_good 不是叶子组件");
                    continue;
                }
            };
            let key = format!("{}:{}", record.kind, record.slug);

            match LeafItemRepository::find_by_slug(&ctx, kind, &record.slug).ctx("find_leaf")? {
                Some(existing) => {
                    let patch = LeafPatch {
                        display_name: (existing.display_name != record.display_name)
                            .then(|| record.display_name.clone()),
                        yield_quantity: (existing.yield_quantity != record.yield_quantity)
                            .then_some(record.yield_quantity),
                    };
                    let mut changed = false;
                    if patch.display_name.is_some() || patch.yield_quantity.is_some() {
                        let result = self.catalog.update_leaf(Some(ctx), kind, existing.id, patch);
                        if skip_on_error(report, "leaves", &key, result)?.is_none() {
                            continue;
                        }
                        changed = true;
                    }
                    if existing.unit_cost != record.unit_cost {
                        let result = self.catalog.set_leaf_unit_cost(Some(ctx), kind, existing.id, record.unit_cost);
                        if skip_on_error(report, "leaves", &key, result)?.is_none() {
                            continue;
                        }
                        changed = true;
                    }
                    if changed {
                        report.leaves_updated += 1;
                    }
                }
                None => {
                    let result = self.catalog.create_leaf(
                        Some(ctx),
                        NewLeafItem {
                            kind,
                            slug: record.slug.clone(),
                            display_name: record.display_name.clone(),
                            unit: record.unit.clone(),
                            unit_cost: record.unit_cost,
                            yield_quantity: record.yield_quantity,
                        },
                    );
                    if skip_on_error(report, "leaves", &key, result)?.is_some() {
                        report.leaves_created += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn import_assemblies(&self, ctx: TxContext<'_>, bundle: &BomBundle, report: &mut ImportReport) -> ImportResult<()> {
        for record in &bundle.assemblies {
            match AssemblyRepository::find_by_slug(&ctx, &record.slug).ctx("find_assembly")? {
                Some(existing) => {
                    let patch = AssemblyPatch {
                        display_name: (existing.display_name != record.display_name)
                            .then(|| record.display_name.clone()),
                        yield_quantity: (existing.yield_quantity != record.yield_quantity)
                            .then_some(record.yield_quantity),
                        yield_unit: (existing.yield_unit != record.yield_unit).then(|| record.yield_unit.clone()),
                    };
                    if patch.display_name.is_none() && patch.yield_quantity.is_none() && patch.yield_unit.is_none() {
                        continue;
                    }
                    let result = self.catalog.update_assembly(Some(ctx), existing.id, patch);
                    if skip_on_error(report, "assemblies", &record.slug, result)?.is_some() {
                        report.assemblies_updated += 1;
                    }
                }
                None => {
                    let result = self.catalog.create_assembly(
                        Some(ctx),
                        NewAssembly {
                            slug: record.slug.clone(),
                            display_name: record.display_name.clone(),
                            kind: record.kind,
                            yield_quantity: record.yield_quantity,
                            yield_unit: record.yield_unit.clone(),
                        },
                    );
                    if skip_on_error(report, "assemblies", &record.slug, result)?.is_some() {
                        report.assemblies_created += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn import_ingredient_lines(
        &self,
        ctx: TxContext<'_>,
        bundle: &BomBundle,
        report: &mut ImportReport,
    ) -> ImportResult<()> {
        for record in &bundle.ingredient_lines {
            let key = format!("{}/{}", record.assembly_slug, record.ingredient_slug);
            let assembly = match AssemblyRepository::find_by_slug(&ctx, &record.assembly_slug).ctx("find_assembly")? {
                Some(a) => a,
                None => {
                    report.skip("ingredient_lines", key, format!("装配体不存在: {}", record.assembly_slug));
                    continue;
                }
            };
            let ingredient = match IngredientRepository::find_by_slug(&ctx, &record.ingredient_slug)
                .ctx("find_ingredient")?
            {
                Some(i) => i,
                None => {
                    report.skip("ingredient_lines", key, format!("原料不存在: {}", record.ingredient_slug));
                    continue;
                }
            };
            let result = self.catalog.set_ingredient_line(
                Some(ctx),
                assembly.id,
                ingredient.id,
                record.quantity,
                &record.unit,
            );
            if skip_on_error(report, "ingredient_lines", &key, result)?.is_some() {
                report.ingredient_lines_written += 1;
            }
        }
        Ok(())
    }

    // ==========================================
    // 阶段二
    // ==========================================

    fn import_composition(
        &self,
        ctx: TxContext<'_>,
        record: &CompositionRecord,
        report: &mut ImportReport,
    ) -> ImportResult<()> {
        let key = format!(
            "{} -> {}:{}",
            record.parent_slug, record.component_kind, record.component_slug
        );

        let parent = match AssemblyRepository::find_by_slug(&ctx, &record.parent_slug).ctx("find_assembly")? {
            Some(p) => p,
            None => {
                report.skip("compositions", key, format!("父装配体不存在: {}", record.parent_slug));
                return Ok(());
            }
        };
        let component = match resolve_component(&ctx, record.component_kind, &record.component_slug)? {
            Some(c) => c,
            None => {
                report.skip("compositions", key, format!("组件 slug 无法解析: {}", record.component_slug));
                return Ok(());
            }
        };

        match CompositionRepository::find_by_parent_and_component(&ctx, parent.id, component)
            .ctx("find_composition")?
        {
            Some(existing) => {
                let wanted_notes = record.notes.as_deref().map(str::trim).filter(|s| !s.is_empty());
                if existing.quantity == record.quantity && existing.notes.as_deref() == wanted_notes {
                    return Ok(());
                }
                let patch = CompositionPatch {
                    quantity: Some(record.quantity),
                    notes: Some(record.notes.clone().unwrap_or_default()),
                };
                let result = self.store.update_component(Some(ctx), existing.id, patch);
                if skip_on_error(report, "compositions", &key, result)?.is_some() {
                    report.compositions_updated += 1;
                }
            }
            None => {
                let result =
                    self.store
                        .add_component(Some(ctx), parent.id, component, record.quantity, record.notes.as_deref());
                if skip_on_error(report, "compositions", &key, result)?.is_some() {
                    report.compositions_created += 1;
                }
            }
        }
        Ok(())
    }

    fn import_plan_requests(
        &self,
        ctx: TxContext<'_>,
        bundle: &BomBundle,
        report: &mut ImportReport,
    ) -> ImportResult<()> {
        for record in &bundle.plan_requests {
            let request = match PlanRequestRepository::find_by_slug(&ctx, &record.slug).ctx("find_plan_request")? {
                Some(existing) if existing.display_name != record.display_name => {
                    self.plans.rename_plan_request(Some(ctx), existing.id, &record.display_name)?
                }
                Some(existing) => existing,
                None => {
                    let result = self.plans.create_plan_request(Some(ctx), &record.slug, &record.display_name);
                    match skip_on_error(report, "plan_requests", &record.slug, result)? {
                        Some(created) => created,
                        None => continue,
                    }
                }
            };

            for item in &record.items {
                let key = format!("{}/{}", record.slug, item.assembly_slug);
                let assembly = match AssemblyRepository::find_by_slug(&ctx, &item.assembly_slug).ctx("find_assembly")? {
                    Some(a) => a,
                    None => {
                        report.skip("plan_requests", key, format!("装配体不存在: {}", item.assembly_slug));
                        continue;
                    }
                };
                let unchanged = request
                    .items
                    .iter()
                    .any(|i| i.assembly_id == assembly.id && i.quantity == item.quantity);
                if unchanged {
                    continue;
                }
                let result = self.plans.set_item(Some(ctx), request.id, assembly.id, item.quantity);
                skip_on_error(report, "plan_requests", &key, result)?;
            }
            report.plan_requests_written += 1;
        }
        Ok(())
    }
}

// ==========================================
// 生产事件（原样恢复）
// ==========================================

fn import_event(conn: &Connection, record: &ProductionEventRecord, report: &mut ImportReport) -> ImportResult<()> {
    if ProductionEventRepository::find_by_uid(conn, &record.event_uid)
        .ctx("find_production_event")?
        .is_some()
    {
        report.events_skipped += 1;
        return Ok(());
    }

    let produced_at = match parse_ts(&record.produced_at) {
        Ok(ts) => ts,
        Err(e) => {
            report.skip("production_events", &record.event_uid, format!("produced_at 无法解析: {}", e));
            return Ok(());
        }
    };
    let assembly_id = AssemblyRepository::find_by_slug(conn, &record.assembly_slug)
        .ctx("find_assembly")?
        .map(|a| a.id);

    let event_id = ProductionEventRepository::insert(
        conn,
        &NewProductionEvent {
            event_uid: record.event_uid.clone(),
            assembly_id,
            assembly_slug: record.assembly_slug.clone(),
            quantity: record.quantity,
            batches: record.batches,
            total_cost: record.total_cost,
            lot_ref: record.lot_ref.clone(),
            notes: record.notes.clone(),
            produced_at,
        },
        produced_at,
    )
    .ctx("insert_production_event")?;
    report.events_imported += 1;

    for entry in &record.records {
        let key = format!("{}/{}:{}", record.event_uid, entry.item_kind, entry.item_slug);
        let item = match resolve_consumed_item(conn, entry)? {
            Some(item) => item,
            None => {
                report.skip("consumption_records", key, format!("消耗对象无法解析: {}", entry.item_slug));
                continue;
            }
        };
        if !(entry.quantity_consumed > 0.0) || entry.unit.trim().is_empty() {
            report.skip("consumption_records", key, "消耗数量或单位无效");
            continue;
        }
        let created_at = parse_ts(&entry.created_at).unwrap_or(produced_at);
        ConsumptionRecordRepository::insert(
            conn,
            &NewConsumptionRecord {
                production_event_id: event_id,
                item,
                item_slug: entry.item_slug.clone(),
                quantity_consumed: entry.quantity_consumed,
                unit: entry.unit.clone(),
                cost_snapshot: entry.cost_snapshot,
                lot_ref: entry.lot_ref.clone(),
                created_at,
            },
        )
        .ctx("insert_consumption_record")?;
        report.records_imported += 1;
    }
    Ok(())
}

// ==========================================
// slug 解析
// ==========================================

fn resolve_component(conn: &Connection, kind: ComponentKind, slug: &str) -> BomResult<Option<ComponentRef>> {
    match kind.leaf_kind() {
        Some(leaf_kind) => Ok(LeafItemRepository::find_by_slug(conn, leaf_kind, slug)
            .ctx("find_leaf")?
            .map(|leaf| ComponentRef::leaf(leaf_kind, leaf.id))),
        None => Ok(AssemblyRepository::find_by_slug(conn, slug)
            .ctx("find_assembly")?
            .map(|a| ComponentRef::FinishedGood(a.id))),
    }
}

fn resolve_consumed_item(conn: &Connection, entry: &ConsumptionRecordEntry) -> BomResult<Option<ConsumedItem>> {
    if entry.item_kind == "ingredient" {
        return Ok(IngredientRepository::find_by_slug(conn, &entry.item_slug)
            .ctx("find_ingredient")?
            .map(|i| ConsumedItem::Ingredient(i.id)));
    }
    match entry.item_kind.parse::<ComponentKind>() {
        Ok(kind) => Ok(resolve_component(conn, kind, &entry.item_slug)?.map(ConsumedItem::Component)),
        Err(_) => Ok(None),
    }
}

/// 单条数据级错误记入报告并返回 None；存储错误向上传播（整体回滚）
fn skip_on_error<T>(
    report: &mut ImportReport,
    section: &str,
    key: &str,
    result: BomResult<T>,
) -> ImportResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err @ BomError::Storage { .. }) => Err(err.into()),
        Err(err) => {
            report.skip(section, key, err.to_string());
            Ok(None)
        }
    }
}
