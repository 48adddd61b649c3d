// ==========================================
// 烘焙管理系统 - 生产计划数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: plan_snapshot 只打失效标记，不删除
// ==========================================

mod request;
mod snapshot;

pub use request::PlanRequestRepository;
pub use snapshot::PlanSnapshotRepository;
