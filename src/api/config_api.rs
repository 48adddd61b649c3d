// ==========================================
// 烘焙管理系统 - 配置管理 API
// ==========================================
// 职责: BOM 配置查询、更新、快照
// 配置项: bom.max_depth / plan.persist_stale_verdict
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::{load_bom_config, write_value};
use crate::config::{config_keys, BomConfig, ConfigManager};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::engine::composition_store::audit;
use crate::engine::error::StorageContext;
use crate::repository::scope::TransactionScope;

// ==========================================
// ConfigApi - 配置管理 API
// ==========================================

/// 配置管理API
///
/// 职责：
/// 1. 配置查询（结构化 BomConfig、全量快照）
/// 2. 配置更新（键白名单 + 值校验）
/// 3. ActionLog记录
pub struct ConfigApi {
    scope: TransactionScope,
    config_manager: Arc<ConfigManager>,
}

impl ConfigApi {
    pub fn new(scope: TransactionScope, config_manager: Arc<ConfigManager>) -> Self {
        Self { scope, config_manager }
    }

    pub fn get_bom_config(&self) -> ApiResult<BomConfig> {
        self.config_manager
            .get_bom_config()
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }

    /// 更新配置
    ///
    /// # 参数
    /// - key: 配置键（仅接受已知键）
    /// - value: 配置值
    /// - operator: 操作人
    /// - reason: 操作原因
    ///
    /// # 返回
    /// - Ok(BomConfig): 更新后的配置
    pub fn update_config(&self, key: &str, value: &str, operator: &str, reason: &str) -> ApiResult<BomConfig> {
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作原因不能为空".to_string()));
        }
        let value = normalize_value(key, value)?;

        self.scope.run(None, "api_update_config", |ctx| {
            write_value(&ctx, key, &value).ctx("write_config")?;
            audit(
                &ctx,
                ActionLog::new(ActionType::UpdateConfig, operator, None)
                    .with_payload(serde_json::json!({
                        "key": key,
                        "value": value,
                        "reason": reason,
                    }))
                    .with_detail(format!("更新配置: {}={}", key, value)),
            )?;
            tracing::info!(key, value = %value, operator, "配置已更新");
            Ok(load_bom_config(&ctx).ctx("load_bom_config")?)
        })
    }

    /// 获取配置快照（JSON）
    pub fn get_config_snapshot(&self) -> ApiResult<String> {
        self.config_manager
            .get_config_snapshot()
            .map_err(|e| ApiError::InternalError(e.to_string()))
    }
}

fn normalize_value(key: &str, value: &str) -> ApiResult<String> {
    let raw = value.trim();
    match key {
        config_keys::BOM_MAX_DEPTH => match raw.parse::<usize>() {
            Ok(v) if v >= 1 => Ok(v.to_string()),
            _ => Err(ApiError::InvalidInput(format!("{} 必须为正整数: {}", key, value))),
        },
        config_keys::PLAN_PERSIST_STALE_VERDICT => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok("true".to_string()),
            "0" | "false" | "no" => Ok("false".to_string()),
            _ => Err(ApiError::InvalidInput(format!("{} 必须为布尔值: {}", key, value))),
        },
        other => Err(ApiError::InvalidInput(format!("未知配置键: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_配置值校验() {
        assert_eq!(normalize_value(config_keys::BOM_MAX_DEPTH, " 5 ").unwrap(), "5");
        assert!(normalize_value(config_keys::BOM_MAX_DEPTH, "0").is_err());
        assert_eq!(
            normalize_value(config_keys::PLAN_PERSIST_STALE_VERDICT, "No").unwrap(),
            "false"
        );
        assert!(matches!(
            normalize_value("bom.unknown", "1"),
            Err(ApiError::InvalidInput(_))
        ));
    }
}
