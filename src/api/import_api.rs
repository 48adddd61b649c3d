// ==========================================
// 烘焙管理系统 - 导入导出 API
// ==========================================
// 职责: 封装 BOM 数据的 JSON 导出与导入
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::importer::{BomBundle, BomExporter, BomImporter, ImportReport};
use crate::repository::scope::TransactionScope;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// 导出API响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportApiResponse {
    /// 输出文件路径
    pub path: String,
    pub assemblies: usize,
    pub compositions: usize,
    pub production_events: usize,
    pub plan_requests: usize,
    /// 导出耗时（毫秒）
    pub elapsed_ms: i64,
}

/// 导入API响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportApiResponse {
    /// 导入报告（计数 + 跳过明细）
    pub report: ImportReport,
    /// 导入耗时（毫秒）
    pub elapsed_ms: i64,
}

pub struct ImportApi {
    exporter: BomExporter,
    importer: BomImporter,
}

impl ImportApi {
    pub fn new(scope: TransactionScope) -> Self {
        Self {
            exporter: BomExporter::new(scope.clone()),
            importer: BomImporter::new(scope),
        }
    }

    pub fn export_to_file(&self, path: &str) -> ApiResult<ExportApiResponse> {
        require_path(path)?;
        let start = Instant::now();
        let bundle = self.exporter.export_to_file(path)?;
        Ok(ExportApiResponse {
            path: path.to_string(),
            assemblies: bundle.assemblies.len(),
            compositions: bundle.compositions.len(),
            production_events: bundle.production_events.len(),
            plan_requests: bundle.plan_requests.len(),
            elapsed_ms: start.elapsed().as_millis() as i64,
        })
    }

    pub fn export_bundle(&self) -> ApiResult<BomBundle> {
        Ok(self.exporter.export(None)?)
    }

    pub fn export_json(&self) -> ApiResult<String> {
        Ok(self.exporter.export_json(None)?)
    }

    /// 从文件导入；任一存储错误整体回滚，可恢复的条目级错误写入报告
    pub fn import_from_file(&self, path: &str) -> ApiResult<ImportApiResponse> {
        require_path(path)?;
        let start = Instant::now();
        let report = self.importer.import_from_file(path)?;
        Ok(ImportApiResponse {
            report,
            elapsed_ms: start.elapsed().as_millis() as i64,
        })
    }

    pub fn import_json(&self, json: &str) -> ApiResult<ImportApiResponse> {
        if json.trim().is_empty() {
            return Err(ApiError::InvalidInput("导入内容为空".to_string()));
        }
        let start = Instant::now();
        let report = self.importer.import_json(None, json)?;
        Ok(ImportApiResponse {
            report,
            elapsed_ms: start.elapsed().as_millis() as i64,
        })
    }
}

fn require_path(path: &str) -> ApiResult<()> {
    if path.trim().is_empty() {
        return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
    }
    Ok(())
}
