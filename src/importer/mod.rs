// ==========================================
// 烘焙管理系统 - 导入导出层
// ==========================================
// 职责: BOM 数据的 JSON 导出与两阶段导入
// 格式: 引用一律使用 slug，生产事件与消耗记录原样携带
// ==========================================

pub mod bom_export;
pub mod bom_import;
pub mod bundle;
pub mod error;

// 重导出核心类型
pub use bom_export::BomExporter;
pub use bom_import::BomImporter;
pub use bundle::{
    AssemblyRecord, BomBundle, CompositionRecord, ConsumptionRecordEntry, ImportReport, IngredientLineRecord,
    IngredientRecord, LeafRecord, PlanItemRecord, PlanRequestRecord, ProductionEventRecord, SkippedEntry,
    BUNDLE_FORMAT_VERSION,
};
pub use error::{ImportError, ImportResult};
