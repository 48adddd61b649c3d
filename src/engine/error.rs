// ==========================================
// 烘焙管理系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约束: 每个错误携带足够的结构化上下文（slug / 路径 / 深度 / 引用方），
//       上层无需重新推导原因
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// BOM 引擎错误类型
#[derive(Error, Debug)]
pub enum BomError {
    #[error("对象不存在: {entity} {key}")]
    NotFound { entity: String, key: String },

    #[error("校验失败: {message}")]
    Validation { message: String },

    #[error("检测到循环引用: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("嵌套层数超限: {parent} -> {component} 将形成 {depth} 层，上限 {max_depth}")]
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

    #[error("存储失败 ({operation}): {source}")]
    Storage {
        operation: String,
        #[source]
        source: RepositoryError,
    },
}

impl BomError {
    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        BomError::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BomError::Validation {
            message: message.into(),
        }
    }

    /// 为存储错误补充操作上下文
    pub fn storage(operation: &str, source: RepositoryError) -> Self {
        BomError::Storage {
            operation: operation.to_string(),
            source,
        }
    }
}

impl From<RepositoryError> for BomError {
    fn from(err: RepositoryError) -> Self {
        BomError::storage("repository", err)
    }
}

/// Result 类型别名
pub type BomResult<T> = Result<T, BomError>;

/// 给仓储调用结果附加操作名
pub(crate) trait StorageContext<T> {
    fn ctx(self, operation: &str) -> BomResult<T>;
}

impl<T> StorageContext<T> for Result<T, RepositoryError> {
    fn ctx(self, operation: &str) -> BomResult<T> {
        self.map_err(|e| BomError::storage(operation, e))
    }
}

impl<T> StorageContext<T> for rusqlite::Result<T> {
    fn ctx(self, operation: &str) -> BomResult<T> {
        self.map_err(|e| BomError::storage(operation, RepositoryError::from(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_环路径展示() {
        let err = BomError::Cycle {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "检测到循环引用: a -> b -> a");
    }

    #[test]
    fn test_存储错误带操作名() {
        let err: BomResult<()> =
            Err(RepositoryError::LockError("poisoned".to_string())).ctx("add_component");
        match err {
            Err(BomError::Storage { operation, .. }) => assert_eq!(operation, "add_component"),
            other => panic!("Expected Storage, got {:?}", other),
        }
    }
}
