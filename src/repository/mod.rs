// ==========================================
// 烘焙管理系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 方法接收 &Connection，事务边界由 TransactionScope 决定
// ==========================================

pub mod action_log_repo;
pub mod assembly_repo;
pub mod catalog_repo;
pub mod composition_repo;
pub mod consumption_repo;
pub mod error;
pub mod plan_repo;
pub mod row_utils;
pub mod scope;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use assembly_repo::AssemblyRepository;
pub use catalog_repo::{IngredientRepository, LeafItemRepository};
pub use composition_repo::CompositionRepository;
pub use consumption_repo::{ConsumptionRecordRepository, ProductionEventRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use plan_repo::{PlanRequestRepository, PlanSnapshotRepository};
pub use scope::{TransactionScope, TxContext};
