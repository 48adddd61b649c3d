// ==========================================
// 烘焙管理系统 - API层错误类型
// ==========================================
// 职责: 将引擎/仓储/导入错误转换为面向界面的错误，
//       并提供结构化错误响应（code + message + details）
// ==========================================

use crate::engine::error::BomError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 组成图规则
    // ==========================================
    #[error("循环引用: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("嵌套层数超限: {parent} -> {component} 深度 {depth} > {max_depth}")]
    DepthExceeded {
        parent: String,
        component: String,
        depth: usize,
        max_depth: usize,
    },

    #[error("删除受限: {entity} {slug} 仍被引用: {}", referenced_by.join(", "))]
    RestrictedDeletion {
        entity: String,
        slug: String,
        referenced_by: Vec<String>,
    },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("导入导出失败: {0}")]
    ImportError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => ApiError::NotFound(format!("{}(id={})不存在", entity, id)),
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => ApiError::DatabaseTransactionError(msg),
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("检查约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 BomError 转换
// ==========================================
impl From<BomError> for ApiError {
    fn from(err: BomError) -> Self {
        match err {
            BomError::NotFound { entity, key } => ApiError::NotFound(format!("{} {}", entity, key)),
            BomError::Validation { message } => ApiError::InvalidInput(message),
            BomError::Cycle { path } => ApiError::CycleDetected { path },
            BomError::DepthExceeded {
                parent,
                component,
                depth,
                max_depth,
            } => ApiError::DepthExceeded {
                parent,
                component,
                depth,
                max_depth,
            },
            BomError::RestrictedDeletion {
                entity,
                slug,
                referenced_by,
            } => ApiError::RestrictedDeletion {
                entity,
                slug,
                referenced_by,
            },
            BomError::Storage { operation, source } => {
                tracing::error!(operation = %operation, error = %source, "存储操作失败");
                ApiError::from(source)
            }
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Bom(inner) => ApiError::from(inner),
            ImportError::Repository(inner) => ApiError::from(inner),
            ImportError::FileNotFound(path) => ApiError::NotFound(format!("文件 {}", path)),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

// ==========================================
// 错误响应（返回给界面）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,

    /// 错误消息
    pub message: String,

    /// 详细信息（可选）
    pub details: Option<serde_json::Value>,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
            details: match err {
                ApiError::CycleDetected { path } => Some(serde_json::json!({ "path": path })),
                ApiError::DepthExceeded {
                    parent,
                    component,
                    depth,
                    max_depth,
                } => Some(serde_json::json!({
                    "parent": parent,
                    "component": component,
                    "depth": depth,
                    "max_depth": max_depth,
                })),
                ApiError::RestrictedDeletion {
                    entity,
                    slug,
                    referenced_by,
                } => Some(serde_json::json!({
                    "entity": entity,
                    "slug": slug,
                    "referenced_by": referenced_by,
                })),
                _ => None,
            },
        }
    }
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::CycleDetected { .. } => "CYCLE_DETECTED",
            ApiError::DepthExceeded { .. } => "DEPTH_EXCEEDED",
            ApiError::RestrictedDeletion { .. } => "RESTRICTED_DELETION",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            ApiError::DatabaseTransactionError(_) => "DATABASE_TRANSACTION_ERROR",
            ApiError::ImportError(_) => "IMPORT_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::Other(_) => "OTHER_ERROR",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::from(self)
    }
}

/// 将ApiError转换为JSON字符串（界面边界使用）
pub fn map_api_error(err: ApiError) -> String {
    serde_json::to_string(&err.to_response()).unwrap_or_else(|_| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_error_转换_环路带路径() {
        let api_err: ApiError = BomError::Cycle {
            path: vec!["box".into(), "tin".into(), "box".into()],
        }
        .into();
        let resp = api_err.to_response();
        assert_eq!(resp.code, "CYCLE_DETECTED");
        assert!(resp.message.contains("box -> tin -> box"));
        assert_eq!(
            resp.details,
            Some(serde_json::json!({ "path": ["box", "tin", "box"] }))
        );
    }

    #[test]
    fn test_bom_error_转换_删除受限() {
        let api_err: ApiError = BomError::RestrictedDeletion {
            entity: "assembly".into(),
            slug: "sugar-cookie".into(),
            referenced_by: vec!["holiday-box".into()],
        }
        .into();
        let resp = api_err.to_response();
        assert_eq!(resp.code, "RESTRICTED_DELETION");
        assert!(resp.message.contains("holiday-box"));
    }

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "assembly".to_string(),
            id: "42".to_string(),
        };
        let api_err: ApiError = BomError::storage("find_assembly", repo_err).into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("assembly"));
                assert!(msg.contains("42"));
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }
}
