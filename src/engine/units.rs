// ==========================================
// 烘焙管理系统 - 计量单位展示换算
// ==========================================
// 红线: 只用于展示副本；汇总时不同单位的行绝不合并
// ==========================================

use crate::domain::plan::AggregatedIngredient;
use crate::domain::types::IngredientId;
use serde::{Deserialize, Serialize};

/// 单位换算协作方（外部提供换算表）
pub trait UnitConverter: Send + Sync {
    /// 把 (数量, 单位) 换算为展示用 (数量, 单位)；无法换算时原样返回
    fn to_display(&self, quantity: f64, unit: &str) -> (f64, String);
}

/// 不做任何换算
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityUnitConverter;

impl UnitConverter for IdentityUnitConverter {
    fn to_display(&self, quantity: f64, unit: &str) -> (f64, String) {
        (quantity, unit.to_string())
    }
}

/// 展示行（保留原始数量与单位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayIngredient {
    pub ingredient_id: IngredientId,
    pub display_name: String,
    pub quantity: f64,
    pub unit: String,
    pub original_quantity: f64,
    pub original_unit: String,
}

/// 生成展示副本（行数与顺序不变）
pub fn to_display_rows(rows: &[AggregatedIngredient], converter: &dyn UnitConverter) -> Vec<DisplayIngredient> {
    rows.iter()
        .map(|row| {
            let (quantity, unit) = converter.to_display(row.total_quantity, &row.unit);
            DisplayIngredient {
                ingredient_id: row.ingredient_id,
                display_name: row.display_name.clone(),
                quantity,
                unit,
                original_quantity: row.total_quantity,
                original_unit: row.unit.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GramsToKg;

    impl UnitConverter for GramsToKg {
        fn to_display(&self, quantity: f64, unit: &str) -> (f64, String) {
            if unit == "g" && quantity >= 1000.0 {
                (quantity / 1000.0, "kg".to_string())
            } else {
                (quantity, unit.to_string())
            }
        }
    }

    fn row(unit: &str, qty: f64) -> AggregatedIngredient {
        AggregatedIngredient {
            ingredient_id: IngredientId(1),
            display_name: "Flour".to_string(),
            unit: unit.to_string(),
            total_quantity: qty,
            sources: Vec::new(),
        }
    }

    #[test]
    fn test_展示换算_不合并行() {
        let rows = vec![row("g", 1500.0), row("kg", 1.0)];
        let display = to_display_rows(&rows, &GramsToKg);
        assert_eq!(display.len(), 2);
        assert_eq!(display[0].unit, "kg");
        assert_eq!(display[0].quantity, 1.5);
        assert_eq!(display[0].original_unit, "g");
        assert_eq!(display[1].unit, "kg");
    }
}
