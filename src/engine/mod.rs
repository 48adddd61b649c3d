// ==========================================
// 烘焙管理系统 - 引擎层
// ==========================================
// 职责: 组成图规则与算法（环路/深度校验、成本、汇总、账本、陈旧判定）
// 红线: Engine 不拼 SQL，数据访问全部经由 repository
// 红线: 每个公开操作接收 Option<TxContext>，共享作用域内失败整体回滚
// ==========================================

pub mod catalog;
pub mod composition_store;
pub mod consumption_ledger;
pub mod cost_resolver;
pub mod cycle_guard;
pub mod error;
pub mod graph;
pub mod ingredient_aggregator;
pub mod plan_calculator;
pub mod staleness;
pub mod units;

// 重导出核心引擎
pub use catalog::CatalogService;
pub use composition_store::{CompositionStore, DEFAULT_ACTOR};
pub use consumption_ledger::{ConsumptionLedger, NESTED_ASSEMBLY_UNIT};
pub use cost_resolver::{CostBreakdown, CostLine, CostResolver};
pub use cycle_guard::CycleGuard;
pub use error::{BomError, BomResult};
pub use graph::AssemblyGraph;
pub use ingredient_aggregator::IngredientAggregator;
pub use plan_calculator::PlanCalculator;
pub use staleness::StalenessOracle;
pub use units::{DisplayIngredient, IdentityUnitConverter, UnitConverter};
