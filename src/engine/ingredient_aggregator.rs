// ==========================================
// 烘焙管理系统 - 原料汇总（采购清单）
// ==========================================
// 算法: 显式栈深度优先，帧内携带累计倍数与当前路径
//   到达原料行: 累加 数量 × 累计倍数，键为 (原料ID, 单位)
//   到达嵌套装配体: 倍数 × 边数量 入栈
// 规则:
// - 单位不同的行永不合并（不做单位换算）
// - 每个贡献的装配体一条 source（同一装配体多次贡献合并）
// - 输出按原料名称、单位排序
// - 子装配体已在当前路径上时跳过（损坏图的防御）
// ==========================================

use crate::domain::assembly::IngredientLine;
use crate::domain::composition::Composition;
use crate::domain::plan::{AggregatedIngredient, IngredientSource};
use crate::domain::types::{AssemblyId, IngredientId};
use crate::engine::composition_store::require_assembly;
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::engine::units::{to_display_rows, DisplayIngredient, IdentityUnitConverter, UnitConverter};
use crate::perf::PerfGuard;
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

// ==========================================
// IngredientAggregator
// ==========================================
pub struct IngredientAggregator {
    scope: TransactionScope,
    converter: Arc<dyn UnitConverter>,
}

impl IngredientAggregator {
    pub fn new(scope: TransactionScope) -> Self {
        Self {
            scope,
            converter: Arc::new(IdentityUnitConverter),
        }
    }

    /// 指定展示换算协作方
    pub fn with_converter(mut self, converter: Arc<dyn UnitConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// 汇总单个装配体（multiplier = 批次数）
    pub fn aggregate(
        &self,
        ctx: Option<TxContext<'_>>,
        assembly: AssemblyId,
        multiplier: f64,
    ) -> BomResult<Vec<AggregatedIngredient>> {
        self.aggregate_many(ctx, &[(assembly, multiplier)])
    }

    /// 汇总多个装配体（生产请求）
    pub fn aggregate_many(
        &self,
        ctx: Option<TxContext<'_>>,
        roots: &[(AssemblyId, f64)],
    ) -> BomResult<Vec<AggregatedIngredient>> {
        for (_, multiplier) in roots {
            validate_multiplier(*multiplier)?;
        }
        self.scope.run(ctx, "aggregate", |ctx| Self::aggregate_on(&ctx, roots))
    }

    /// 展示副本（单位换算只作用于此）
    pub fn display_rows(&self, rows: &[AggregatedIngredient]) -> Vec<DisplayIngredient> {
        to_display_rows(rows, self.converter.as_ref())
    }

    pub(crate) fn aggregate_on(conn: &Connection, roots: &[(AssemblyId, f64)]) -> BomResult<Vec<AggregatedIngredient>> {
        let mut perf = PerfGuard::new("aggregate");

        let mut acc = Accumulator::default();
        let mut cache: HashMap<AssemblyId, (Vec<Composition>, Vec<IngredientLine>)> = HashMap::new();

        for &(root, multiplier) in roots {
            require_assembly(conn, root)?;

            let mut stack: Vec<Frame> = vec![Frame {
                assembly: root,
                multiplier,
                path: vec![root],
            }];

            while let Some(frame) = stack.pop() {
                if !cache.contains_key(&frame.assembly) {
                    let edges = CompositionRepository::list_by_parent(conn, frame.assembly)
                        .ctx("list_components")?;
                    let lines = AssemblyRepository::list_ingredient_lines(conn, frame.assembly)
                        .ctx("list_ingredient_lines")?;
                    cache.insert(frame.assembly, (edges, lines));
                }
                let (edges, lines) = match cache.get(&frame.assembly) {
                    Some(entry) => entry,
                    None => continue,
                };

                if !lines.is_empty() {
                    let source_slug = require_assembly(conn, frame.assembly)?.slug;
                    for line in lines {
                        acc.add(line, frame.assembly, &source_slug, frame.multiplier);
                    }
                }

                // 逆序入栈，保持出栈顺序与 sort_order 一致
                for edge in edges.iter().rev() {
                    let child = match edge.component.as_assembly() {
                        Some(child) => child,
                        None => continue,
                    };
                    if frame.path.contains(&child) {
                        warn!(parent = frame.assembly.0, child = child.0, "原料汇总遇到环路，跳过该分支");
                        continue;
                    }
                    let mut path = frame.path.clone();
                    path.push(child);
                    stack.push(Frame {
                        assembly: child,
                        multiplier: frame.multiplier * edge.quantity,
                        path,
                    });
                }
            }
        }

        perf.set_nodes(cache.len());
        let rows = acc.finish();
        debug!(roots = roots.len(), rows = rows.len(), "原料汇总完成");
        Ok(rows)
    }
}

fn validate_multiplier(multiplier: f64) -> BomResult<()> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(BomError::validation(format!("批次倍数必须为正数: {}", multiplier)));
    }
    Ok(())
}

struct Frame {
    assembly: AssemblyId,
    multiplier: f64,
    path: Vec<AssemblyId>,
}

#[derive(Default)]
struct Accumulator {
    rows: HashMap<(IngredientId, String), AggregatedIngredient>,
}

impl Accumulator {
    fn add(&mut self, line: &IngredientLine, source: AssemblyId, source_slug: &str, multiplier: f64) {
        let quantity = line.line.quantity * multiplier;
        let key = (line.ingredient.id, line.line.unit.clone());
        let row = self.rows.entry(key).or_insert_with(|| AggregatedIngredient {
            ingredient_id: line.ingredient.id,
            display_name: line.ingredient.display_name.clone(),
            unit: line.line.unit.clone(),
            total_quantity: 0.0,
            sources: Vec::new(),
        });
        row.total_quantity += quantity;
        match row.sources.iter_mut().find(|s| s.source_assembly == source) {
            Some(existing) => existing.quantity += quantity,
            None => row.sources.push(IngredientSource {
                source_assembly: source,
                source_slug: source_slug.to_string(),
                quantity,
            }),
        }
    }

    fn finish(self) -> Vec<AggregatedIngredient> {
        let mut rows: Vec<AggregatedIngredient> = self.rows.into_values().collect();
        rows.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.unit.cmp(&b.unit))
                .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
        });
        rows
    }
}
