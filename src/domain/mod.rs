// ==========================================
// 烘焙管理系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod assembly;
pub mod composition;
pub mod consumption;
pub mod plan;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use assembly::{
    Assembly, AssemblyIngredient, AssemblyPatch, Ingredient, IngredientLine, LeafItem, LeafPatch,
    NewAssembly, NewIngredient, NewLeafItem,
};
pub use composition::{Composition, CompositionPatch};
pub use consumption::{
    ConsumptionRecord, NewConsumptionRecord, NewProductionEvent, ProductionEvent,
    ProductionOutcome, ProductionRequest,
};
pub use plan::{
    AggregatedIngredient, IngredientSource, MutationCategory, PlanRequest, PlanRequestItem,
    PlanSnapshot, StalenessVerdict,
};
pub use types::{
    AssemblyId, AssemblyKind, ComponentKind, ComponentRef, CompositionId, ConsumedItem,
    IngredientId, ItemId, LeafKind, Money,
};
