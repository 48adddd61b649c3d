// ==========================================
// 烘焙管理系统 - API 层
// ==========================================
// 职责: 界面边界，slug 寻址，输入校验，结构化错误响应
// ==========================================

pub mod bom_api;
pub mod config_api;
pub mod error;
pub mod import_api;
pub mod plan_api;

// 重导出核心类型
pub use bom_api::{BomApi, CompositionView};
pub use config_api::ConfigApi;
pub use error::{map_api_error, ApiError, ApiResult, ErrorResponse};
pub use import_api::{ExportApiResponse, ImportApi, ImportApiResponse};
pub use plan_api::PlanApi;
