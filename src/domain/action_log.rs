// ==========================================
// 烘焙管理系统 - 操作日志领域模型
// ==========================================
// 红线: 所有写入必须记录（与业务写入同一事务）
// 用途: 审计追踪
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,               // 日志ID (UUID)
    pub action_type: ActionType,
    pub action_ts: NaiveDateTime,
    pub actor: String,
    pub target_slug: Option<String>,     // 操作对象 slug
    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,          // 详细描述
}

impl ActionLog {
    pub fn new(action_type: ActionType, actor: &str, target_slug: Option<&str>) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type,
            action_ts: crate::db::now_ts(),
            actor: actor.to_string(),
            target_slug: target_slug.map(|s| s.to_string()),
            payload_json: None,
            detail: None,
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    AddComponent,
    UpdateComponent,
    RemoveComponent,
    ReorderComponents,
    DeleteAssembly,
    DeleteLeaf,
    RecordConsumption,
    RecordProduction,
    CalculatePlan,
    InvalidatePlan,
    Import,
    CreateAssembly,
    UpdateAssembly,
    CreateIngredient,
    UpdateIngredient,
    CreateLeaf,
    UpdateLeaf,
    SetIngredientLine,
    RemoveIngredientLine,
    CreatePlan,
    UpdatePlan,
    UpdateConfig,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AddComponent => "ADD_COMPONENT",
            ActionType::UpdateComponent => "UPDATE_COMPONENT",
            ActionType::RemoveComponent => "REMOVE_COMPONENT",
            ActionType::ReorderComponents => "REORDER_COMPONENTS",
            ActionType::DeleteAssembly => "DELETE_ASSEMBLY",
            ActionType::DeleteLeaf => "DELETE_LEAF",
            ActionType::RecordConsumption => "RECORD_CONSUMPTION",
            ActionType::RecordProduction => "RECORD_PRODUCTION",
            ActionType::CalculatePlan => "CALCULATE_PLAN",
            ActionType::InvalidatePlan => "INVALIDATE_PLAN",
            ActionType::Import => "IMPORT",
            ActionType::CreateAssembly => "CREATE_ASSEMBLY",
            ActionType::UpdateAssembly => "UPDATE_ASSEMBLY",
            ActionType::CreateIngredient => "CREATE_INGREDIENT",
            ActionType::UpdateIngredient => "UPDATE_INGREDIENT",
            ActionType::CreateLeaf => "CREATE_LEAF",
            ActionType::UpdateLeaf => "UPDATE_LEAF",
            ActionType::SetIngredientLine => "SET_INGREDIENT_LINE",
            ActionType::RemoveIngredientLine => "REMOVE_INGREDIENT_LINE",
            ActionType::CreatePlan => "CREATE_PLAN",
            ActionType::UpdatePlan => "UPDATE_PLAN",
            ActionType::UpdateConfig => "UPDATE_CONFIG",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let all = [
            ActionType::AddComponent,
            ActionType::UpdateComponent,
            ActionType::RemoveComponent,
            ActionType::ReorderComponents,
            ActionType::DeleteAssembly,
            ActionType::DeleteLeaf,
            ActionType::RecordConsumption,
            ActionType::RecordProduction,
            ActionType::CalculatePlan,
            ActionType::InvalidatePlan,
            ActionType::Import,
            ActionType::CreateAssembly,
            ActionType::UpdateAssembly,
            ActionType::CreateIngredient,
            ActionType::UpdateIngredient,
            ActionType::CreateLeaf,
            ActionType::UpdateLeaf,
            ActionType::SetIngredientLine,
            ActionType::RemoveIngredientLine,
            ActionType::CreatePlan,
            ActionType::UpdatePlan,
            ActionType::UpdateConfig,
        ];
        all.into_iter().find(|t| t.as_str() == raw.trim())
    }
}
