// ==========================================
// CostResolver / IngredientAggregator 集成测试
// ==========================================
// 测试目标: 递归成本、缺价部分成本、原料合并/按单位拆分、批次倍数
// ==========================================


use bakery_bom::domain::types::{ComponentRef, LeafKind};
use bakery_bom::engine::BomError;
use test_helpers::{create_test_env, money};

#[test]
fn test_成本_一层嵌套_11元() {
    let env = create_test_env();
    let a = env.recipe_with_direct_cost("a", "5.00");
    let b = env.recipe_with_direct_cost("b", "3.00");
    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 2.0, None)
        .unwrap();

    assert_eq!(env.costs.total_cost(None, b.id).unwrap(), money("3.00"));
    assert_eq!(env.costs.total_cost(None, a.id).unwrap(), money("11.00"));

    let breakdown = env.costs.cost_breakdown(None, a.id).unwrap();
    assert_eq!(breakdown.direct_cost, money("5.00"));
    assert_eq!(breakdown.nested_cost, money("6.00"));
    assert!(!breakdown.is_partial);
}

#[test]
fn test_成本_两层嵌套_4点70() {
    let env = create_test_env();
    let a = env.recipe_with_direct_cost("a", "0.50");
    let b = env.recipe_with_direct_cost("b", "2.00");
    let c = env.recipe_with_direct_cost("c", "0.10");
    env.store
        .add_component(None, b.id, ComponentRef::FinishedGood(c.id), 1.0, None)
        .unwrap();
    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 2.0, None)
        .unwrap();

    assert_eq!(env.costs.total_cost(None, c.id).unwrap(), money("0.10"));
    assert_eq!(env.costs.total_cost(None, b.id).unwrap(), money("2.10"));
    assert_eq!(env.costs.total_cost(None, a.id).unwrap(), money("4.70"));
}

#[test]
fn test_成本_三层树_叶子组件计入() {
    let env = create_test_env();
    let a = env.recipe_with_direct_cost("a", "1.00");
    let b = env.recipe_with_direct_cost("b", "1.00");
    let c = env.recipe_with_direct_cost("c", "1.00");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", Some("2.50"));
    env.store
        .add_component(None, b.id, ComponentRef::FinishedGood(c.id), 3.0, None)
        .unwrap();
    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 2.0, None)
        .unwrap();
    env.store
        .add_component(None, a.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 2.0, None)
        .unwrap();

    // b = 1 + 3×1 = 4; a = 1 + 2×4 + 2×2.50 = 14
    assert_eq!(env.costs.total_cost(None, b.id).unwrap(), money("4"));
    assert_eq!(env.costs.total_cost(None, a.id).unwrap(), money("14"));
}

#[test]
fn test_成本_缺价按零计并标记部分成本() {
    let env = create_test_env();
    let a = env.recipe_with_direct_cost("a", "2.00");
    let vanilla = env.ingredient("vanilla", "ml", None);
    env.line(&a, &vanilla, 5.0, "ml");
    // 单位与计价单位不一致同样视为缺价
    let flour = env.ingredient("flour", "kg", Some("1.20"));
    env.line(&a, &flour, 2.0, "cup");
    let ribbon = env.leaf(LeafKind::MaterialUnit, "ribbon", None);
    env.store
        .add_component(None, a.id, ComponentRef::leaf(LeafKind::MaterialUnit, ribbon.id), 1.0, None)
        .unwrap();

    let breakdown = env.costs.cost_breakdown(None, a.id).unwrap();
    assert_eq!(breakdown.total_cost, money("2.00"));
    assert!(breakdown.is_partial);
    assert_eq!(
        breakdown.missing_prices,
        vec![
            "ingredient:flour".to_string(),
            "ingredient:vanilla".to_string(),
            "material_unit:ribbon".to_string(),
        ]
    );
}

#[test]
fn test_成本_每单位成本() {
    let env = create_test_env();
    let a = env.recipe_with_direct_cost("a", "12.00");
    env.catalog
        .update_assembly(
            None,
            a.id,
            bakery_bom::domain::assembly::AssemblyPatch {
                yield_quantity: Some(24.0),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(env.costs.cost_per_unit(None, a.id).unwrap(), money("0.5"));
}

#[test]
fn test_成本_装配体不存在() {
    let env = create_test_env();
    let err = env
        .costs
        .total_cost(None, bakery_bom::AssemblyId(999))
        .unwrap_err();
    assert!(matches!(err, BomError::NotFound { .. }));
}

#[test]
fn test_汇总_同单位合并_两个来源() {
    let env = create_test_env();
    let a = env.recipe("a");
    let b = env.recipe("b");
    let flour = env.ingredient("flour", "cup", Some("0.30"));
    env.line(&a, &flour, 2.0, "cup");
    env.line(&b, &flour, 1.0, "cup");
    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 1.0, None)
        .unwrap();

    let rows = env.aggregator.aggregate(None, a.id, 1.0).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].unit, "cup");
    assert_eq!(rows[0].total_quantity, 3.0);
    assert_eq!(rows[0].sources.len(), 2);
    let mut sources: Vec<&str> = rows[0].sources.iter().map(|s| s.source_slug.as_str()).collect();
    sources.sort();
    assert_eq!(sources, vec!["a", "b"]);
}

#[test]
fn test_汇总_不同单位分行() {
    let env = create_test_env();
    let a = env.recipe("a");
    let b = env.recipe("b");
    let flour = env.ingredient("flour", "cup", None);
    env.line(&a, &flour, 2.0, "cup");
    env.line(&b, &flour, 100.0, "g");
    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 1.0, None)
        .unwrap();

    let rows = env.aggregator.aggregate(None, a.id, 1.0).unwrap();
    assert_eq!(rows.len(), 2);
    let units: Vec<&str> = rows.iter().map(|r| r.unit.as_str()).collect();
    assert_eq!(units, vec!["cup", "g"]);
}

#[test]
fn test_汇总_批次倍数() {
    let env = create_test_env();
    let a = env.recipe("a");
    let flour = env.ingredient("flour", "cup", None);
    env.line(&a, &flour, 2.0, "cup");

    let rows = env.aggregator.aggregate(None, a.id, 2.0).unwrap();
    assert_eq!(rows[0].total_quantity, 4.0);

    let err = env.aggregator.aggregate(None, a.id, 0.0).unwrap_err();
    assert!(matches!(err, BomError::Validation { .. }));
}

#[test]
fn test_汇总_嵌套数量相乘() {
    let env = create_test_env();
    let a = env.recipe("a");
    let b = env.recipe("b");
    let c = env.recipe("c");
    let sugar = env.ingredient("sugar", "g", None);
    env.line(&c, &sugar, 10.0, "g");
    env.store
        .add_component(None, b.id, ComponentRef::FinishedGood(c.id), 3.0, None)
        .unwrap();
    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 2.0, None)
        .unwrap();

    let rows = env.aggregator.aggregate(None, a.id, 1.0).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_quantity, 60.0);
    assert_eq!(rows[0].sources[0].source_slug, "c");
}

#[test]
fn test_汇总_叶子组件不产生原料行() {
    let env = create_test_env();
    let a = env.recipe("a");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", Some("1.00"));
    env.store
        .add_component(None, a.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, None)
        .unwrap();

    assert!(env.aggregator.aggregate(None, a.id, 1.0).unwrap().is_empty());
}

/// 绕过 CycleGuard 直接写入 A→B、B→A，模拟损坏的组成图
fn corrupt_cycle(env: &test_helpers::TestEnv) -> bakery_bom::Assembly {
    let a = env.recipe_with_direct_cost("a", "1.00");
    let b = env.recipe_with_direct_cost("b", "2.00");

    let conn = env.scope.connection();
    let conn = conn.lock().unwrap();
    for (parent, child, quantity) in [(a.id.0, b.id.0, 2.0), (b.id.0, a.id.0, 1.0)] {
        conn.execute(
            r#"INSERT INTO composition (
                   parent_id, finished_good_id, quantity, sort_order,
                   created_at, updated_at, quantity_updated_at
               ) VALUES (?1, ?2, ?3, 0, '2026-01-01 00:00:00', '2026-01-01 00:00:00', '2026-01-01 00:00:00')"#,
            rusqlite::params![parent, child, quantity],
        )
        .unwrap();
    }
    a
}

#[test]
fn test_成本_损坏图中的环路_重访计零() {
    let env = create_test_env();
    let a = corrupt_cycle(&env);

    // a = 1 + 2 × (b 直接 2 + 1 × 重访 a 计 0) = 5
    assert_eq!(env.costs.total_cost(None, a.id).unwrap(), money("5"));
}

#[test]
fn test_汇总_损坏图中的环路_每条路径只计一次() {
    let env = create_test_env();
    let a = corrupt_cycle(&env);

    let rows = env.aggregator.aggregate(None, a.id, 1.0).unwrap();
    let totals: Vec<(&str, f64)> = rows
        .iter()
        .map(|r| (r.display_name.as_str(), r.total_quantity))
        .collect();
    assert_eq!(totals, vec![("a-base", 1.0), ("b-base", 2.0)]);
}
