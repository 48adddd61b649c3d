// ==========================================
// 烘焙管理系统 - 导入导出错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 单条数据无法解析（slug 不存在、形成环路等）不报错，
//       记入 ImportReport.skipped 并继续
// ==========================================

use crate::engine::error::BomError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入导出错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件写入失败: {0}")]
    FileWriteError(String),

    #[error("JSON 解析失败: {0}")]
    JsonParseError(String),

    #[error("导出格式版本不支持: {found}（支持 <= {supported}）")]
    UnsupportedVersion { found: u32, supported: u32 },

    // ===== 数据错误 =====
    #[error("字段值错误 ({section}/{key}): {message}")]
    FieldValueError {
        section: String,
        key: String,
        message: String,
    },

    // ===== 下层错误 =====
    #[error(transparent)]
    Bom(#[from] BomError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::JsonParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
