// ==========================================
// 烘焙管理系统 - 操作日志数据仓储
// ==========================================
// 红线: 所有写入必须记录，且与业务写入处于同一事务
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::ActionLogRepository;
