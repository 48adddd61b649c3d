// ==========================================
// 烘焙管理系统 - 消耗账本
// ==========================================
// 红线: 每一种被消耗的组件都必须有记录（叶子、包装、物料、嵌套装配体）
// 红线: cost_snapshot 取写入时 CostResolver 的结果，之后不再重算
// 口径: cost_snapshot = 单价 × quantity_consumed（嵌套装配体单价为其每批总成本）
// ==========================================

use crate::db::now_ts;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::consumption::{
    ConsumptionRecord, NewConsumptionRecord, NewProductionEvent, ProductionEvent, ProductionOutcome,
    ProductionRequest,
};
use crate::domain::types::{scale_money, AssemblyId, ConsumedItem, Money};
use crate::engine::composition_store::{audit, component_slug, require_assembly, validate_quantity, DEFAULT_ACTOR};
use crate::engine::cost_resolver::CostResolver;
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::catalog_repo::IngredientRepository;
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::consumption_repo::{ConsumptionRecordRepository, ProductionEventRepository};
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, instrument};

/// 嵌套装配体消耗的计量单位（数量为批次数）
pub const NESTED_ASSEMBLY_UNIT: &str = "batch";

// ==========================================
// ConsumptionLedger
// ==========================================
pub struct ConsumptionLedger {
    scope: TransactionScope,
    actor: String,
}

impl ConsumptionLedger {
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

    /// 追加一条消耗记录
    ///
    /// # 参数
    /// - `cost_snapshot`: 调用方已算好的成本；None 时在同一作用域内由 CostResolver 计算
    #[allow(clippy::too_many_arguments)]
    pub fn record_consumption(
        &self,
        ctx: Option<TxContext<'_>>,
        production_event_id: i64,
        item: ConsumedItem,
        quantity_consumed: f64,
        unit: &str,
        cost_snapshot: Option<Money>,
        lot_ref: Option<&str>,
    ) -> BomResult<ConsumptionRecord> {
        validate_quantity(quantity_consumed)?;
        if unit.trim().is_empty() {
            return Err(BomError::validation("消耗单位不能为空"));
        }

        self.scope.run(ctx, "record_consumption", |ctx| {
            let event = require_event(&ctx, production_event_id)?;
            let item_slug = item_slug(&ctx, item)?;
            let snapshot = match cost_snapshot {
                Some(v) => v,
                None => scale_money(CostResolver::item_unit_cost_on(&ctx, item)?, quantity_consumed),
            };

            let record = append(
                &ctx,
                NewConsumptionRecord {
                    production_event_id,
                    item,
                    item_slug,
                    quantity_consumed,
                    unit: unit.trim().to_string(),
                    cost_snapshot: snapshot,
                    lot_ref: lot_ref.map(str::to_string),
                    created_at: now_ts(),
                },
            )?;
            refresh_event_total(&ctx, production_event_id)?;

            audit(
                &ctx,
                ActionLog::new(ActionType::RecordConsumption, &self.actor, Some(&event.assembly_slug))
                    .with_payload(json!({
                        "event_uid": event.event_uid,
                        "item_kind": item.kind_str(),
                        "item_slug": record.item_slug,
                        "quantity": quantity_consumed,
                        "cost_snapshot": record.cost_snapshot.to_string(),
                    })),
            )?;
            Ok(record)
        })
    }

    /// 生产 / 组装工作流
    ///
    /// 写入生产事件，并为每条原料行、每条组成边各写一条消耗记录；
    /// 记录数与消耗对象数不一致时整体回滚。
    #[instrument(skip_all, fields(assembly = request.assembly_id.0, quantity = request.quantity))]
    pub fn record_production(
        &self,
        ctx: Option<TxContext<'_>>,
        request: ProductionRequest,
    ) -> BomResult<ProductionOutcome> {
        validate_quantity(request.quantity)?;

        self.scope.run(ctx, "record_production", |ctx| {
            let assembly = require_assembly(&ctx, request.assembly_id)?;
            let batches = request.quantity / assembly.yield_quantity;
            let produced_at = now_ts();

            // 成本在写入前一次性取得（同一作用域内的当前值）
            let breakdown = CostResolver::breakdown_on(&ctx, assembly.id)?;

            let event_id = ProductionEventRepository::insert(
                &ctx,
                &NewProductionEvent {
                    event_uid: uuid::Uuid::new_v4().to_string(),
                    assembly_id: Some(assembly.id),
                    assembly_slug: assembly.slug.clone(),
                    quantity: request.quantity,
                    batches,
                    total_cost: Decimal::ZERO,
                    lot_ref: request.lot_ref.clone(),
                    notes: request.notes.clone(),
                    produced_at,
                },
                produced_at,
            )
            .ctx("insert_production_event")?;

            let mut records = Vec::with_capacity(breakdown.lines.len());
            for line in &breakdown.lines {
                let consumed = line.quantity * batches;
                let unit = match line.item {
                    ConsumedItem::Component(c) if c.as_assembly().is_some() => NESTED_ASSEMBLY_UNIT.to_string(),
                    _ => line.unit.clone(),
                };
                let unit_cost = line.unit_cost.unwrap_or(Decimal::ZERO);
                records.push(append(
                    &ctx,
                    NewConsumptionRecord {
                        production_event_id: event_id,
                        item: line.item,
                        item_slug: line.slug.clone(),
                        quantity_consumed: consumed,
                        unit,
                        cost_snapshot: scale_money(unit_cost, consumed),
                        lot_ref: request.lot_ref.clone(),
                        created_at: produced_at,
                    },
                )?);
            }

            // 完整性校验: 组成边与原料行各对应一条记录
            let expected = consumed_item_count(&ctx, assembly.id)?;
            let written = ConsumptionRecordRepository::count_by_event(&ctx, event_id).ctx("count_records")?;
            if written as usize != expected {
                error!(
                    assembly = %assembly.slug,
                    expected,
                    written,
                    "消耗记录不完整，回滚生产事件"
                );
                return Err(BomError::validation(format!(
                    "消耗记录不完整: 期望 {} 条，实际 {} 条",
                    expected, written
                )));
            }

            let total = refresh_event_total(&ctx, event_id)?;
            audit(
                &ctx,
                ActionLog::new(ActionType::RecordProduction, &self.actor, Some(&assembly.slug)).with_payload(json!({
                    "event_id": event_id,
                    "quantity": request.quantity,
                    "batches": batches,
                    "records": records.len(),
                    "total_cost": total.to_string(),
                    "partial_cost": breakdown.is_partial,
                })),
            )?;

            let event = require_event(&ctx, event_id)?;
            info!(
                assembly = %assembly.slug,
                records = records.len(),
                total_cost = %event.total_cost,
                "生产事件已记录"
            );
            Ok(ProductionOutcome { event, records })
        })
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn get_event(&self, ctx: Option<TxContext<'_>>, production_event_id: i64) -> BomResult<ProductionEvent> {
        self.scope
            .run(ctx, "get_event", |ctx| require_event(&ctx, production_event_id))
    }

    pub fn list_events(&self, ctx: Option<TxContext<'_>>, assembly: Option<AssemblyId>) -> BomResult<Vec<ProductionEvent>> {
        self.scope.run(ctx, "list_events", |ctx| match assembly {
            Some(id) => ProductionEventRepository::list_by_assembly(&ctx, id).ctx("list_events"),
            None => ProductionEventRepository::list_all(&ctx).ctx("list_events"),
        })
    }

    pub fn list_records(&self, ctx: Option<TxContext<'_>>, production_event_id: i64) -> BomResult<Vec<ConsumptionRecord>> {
        self.scope.run(ctx, "list_records", |ctx| {
            require_event(&ctx, production_event_id)?;
            ConsumptionRecordRepository::list_by_event(&ctx, production_event_id).ctx("list_records")
        })
    }
}

fn require_event(conn: &Connection, id: i64) -> BomResult<ProductionEvent> {
    ProductionEventRepository::find_by_id(conn, id)
        .ctx("find_production_event")?
        .ok_or_else(|| BomError::not_found("production_event", id))
}

fn item_slug(conn: &Connection, item: ConsumedItem) -> BomResult<String> {
    match item {
        ConsumedItem::Component(component) => component_slug(conn, component),
        ConsumedItem::Ingredient(id) => IngredientRepository::find_by_id(conn, id)
            .ctx("find_ingredient")?
            .map(|i| i.slug)
            .ok_or_else(|| BomError::not_found("ingredient", id)),
    }
}

fn append(conn: &Connection, new: NewConsumptionRecord) -> BomResult<ConsumptionRecord> {
    let id = ConsumptionRecordRepository::insert(conn, &new).ctx("insert_consumption_record")?;
    ConsumptionRecordRepository::find_by_id(conn, id)
        .ctx("find_consumption_record")?
        .ok_or_else(|| BomError::not_found("consumption_record", id))
}

/// 直接从仓储读取的消耗对象数（组成边 + 原料行），不依赖成本明细
fn consumed_item_count(conn: &Connection, assembly: AssemblyId) -> BomResult<usize> {
    let edges = CompositionRepository::list_by_parent(conn, assembly).ctx("list_components")?;
    let lines = AssemblyRepository::list_ingredient_lines(conn, assembly).ctx("list_ingredient_lines")?;
    Ok(edges.len() + lines.len())
}

/// 事件总成本 = 全部记录 cost_snapshot 之和
fn refresh_event_total(conn: &Connection, event_id: i64) -> BomResult<Money> {
    let total: Money = ConsumptionRecordRepository::list_by_event(conn, event_id)
        .ctx("list_records")?
        .iter()
        .map(|r| r.cost_snapshot)
        .sum();
    ProductionEventRepository::update_total_cost(conn, event_id, total).ctx("update_event_total")?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::domain::assembly::{NewAssembly, NewIngredient, NewLeafItem};
    use crate::domain::consumption::ProductionRequest;
    use crate::domain::types::{AssemblyKind, ComponentRef, LeafKind};
    use crate::engine::catalog::CatalogService;
    use crate::engine::composition_store::CompositionStore;
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_消耗对象数_按组成边与原料行计() {
        let scope = TransactionScope::new(Arc::new(Mutex::new(open_in_memory().unwrap())));
        let catalog = CatalogService::new(scope.clone());
        let store = CompositionStore::new(scope.clone());
        let ledger = ConsumptionLedger::new(scope.clone());

        let box_asm = catalog
            .create_assembly(
                None,
                NewAssembly {
                    slug: "gift-box".to_string(),
                    display_name: "Gift Box".to_string(),
                    kind: AssemblyKind::Package,
                    yield_quantity: 1.0,
                    yield_unit: "box".to_string(),
                },
            )
            .unwrap();
        let flour = catalog
            .create_ingredient(
                None,
                NewIngredient {
                    slug: "flour".to_string(),
                    display_name: "Flour".to_string(),
                    price_unit: "cup".to_string(),
                    unit_price: Some(Decimal::from_str("0.30").unwrap()),
                },
            )
            .unwrap();
        catalog.set_ingredient_line(None, box_asm.id, flour.id, 2.0, "cup").unwrap();
        let tin = catalog
            .create_leaf(
                None,
                NewLeafItem {
                    kind: LeafKind::PackagingProduct,
                    slug: "tin".to_string(),
                    display_name: "Tin".to_string(),
                    unit: "each".to_string(),
                    unit_cost: None,
                    yield_quantity: 1.0,
                },
            )
            .unwrap();
        store
            .add_component(None, box_asm.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, None)
            .unwrap();

        {
            let conn = scope.connection();
            let conn = conn.lock().unwrap();
            assert_eq!(consumed_item_count(&conn, box_asm.id).unwrap(), 2);
        }

        let outcome = ledger
            .record_production(
                None,
                ProductionRequest {
                    assembly_id: box_asm.id,
                    quantity: 1.0,
                    lot_ref: None,
                    notes: None,
                },
            )
            .unwrap();
        assert_eq!(outcome.records.len(), 2);
    }
}
