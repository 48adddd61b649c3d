// ==========================================
// 烘焙管理系统 - BOM 组成引擎核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 配方/成品/礼盒的组成图、成本、原料汇总与消耗账本
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问 + 事务作用域
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入导出层 - JSON 数据交换
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// SQL 性能追踪
pub mod perf;

// API 层 - 界面边界
pub mod api;

// 应用层 - 状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AssemblyId, AssemblyKind, ComponentKind, ComponentRef, CompositionId, ConsumedItem, IngredientId, ItemId,
    LeafKind, Money,
};

// 领域实体
pub use domain::{
    ActionLog, ActionType, AggregatedIngredient, Assembly, Composition, ConsumptionRecord, Ingredient, LeafItem,
    PlanRequest, PlanSnapshot, ProductionEvent, StalenessVerdict,
};

// 引擎
pub use engine::{
    BomError, BomResult, CatalogService, CompositionStore, ConsumptionLedger, CostBreakdown, CostResolver, CycleGuard,
    IngredientAggregator, PlanCalculator, StalenessOracle,
};

// 事务作用域
pub use repository::{TransactionScope, TxContext};

// API
pub use api::{ApiError, ApiResult, BomApi, ImportApi, PlanApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "烘焙管理系统 - BOM 组成引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
