// ==========================================
// ConsumptionLedger 集成测试
// ==========================================
// 测试目标: 每类消耗对象一条记录、成本快照冻结、只追加
// ==========================================


use bakery_bom::domain::consumption::ProductionRequest;
use bakery_bom::domain::types::{ComponentRef, ConsumedItem, LeafKind};
use bakery_bom::engine::{BomError, NESTED_ASSEMBLY_UNIT};
use std::collections::BTreeSet;
use test_helpers::{create_test_env, money, TestEnv};

/// 礼盒: 面粉 2 cup + 饼干单元 6 + 铁盒 1 + 丝带 1 + 嵌套酥饼 2 批
fn build_gift_box(env: &TestEnv) -> bakery_bom::Assembly {
    let gift_box = env.recipe("gift-box");
    let flour = env.ingredient("flour", "cup", Some("0.30"));
    env.line(&gift_box, &flour, 2.0, "cup");

    let unit = env.leaf(LeafKind::FinishedUnit, "cookie-single", Some("0.40"));
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", Some("2.00"));
    let ribbon = env.leaf(LeafKind::MaterialUnit, "ribbon", Some("0.25"));
    let shortbread = env.recipe_with_direct_cost("shortbread", "1.00");

    env.store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::FinishedUnit, unit.id), 6.0, None)
        .unwrap();
    env.store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, None)
        .unwrap();
    env.store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::MaterialUnit, ribbon.id), 1.0, None)
        .unwrap();
    env.store
        .add_component(None, gift_box.id, ComponentRef::FinishedGood(shortbread.id), 2.0, None)
        .unwrap();
    gift_box
}

fn produce(env: &TestEnv, assembly: &bakery_bom::Assembly, quantity: f64) -> bakery_bom::domain::ProductionOutcome {
    env.ledger
        .record_production(
            None,
            ProductionRequest {
                assembly_id: assembly.id,
                quantity,
                lot_ref: Some("LOT-1015".to_string()),
                notes: None,
            },
        )
        .unwrap()
}

#[test]
fn test_生产_每类组件各一条记录() {
    let env = create_test_env();
    let gift_box = build_gift_box(&env);

    let outcome = produce(&env, &gift_box, 2.0);
    assert_eq!(outcome.records.len(), 5);

    let kinds: BTreeSet<&str> = outcome.records.iter().map(|r| r.item.kind_str()).collect();
    assert_eq!(
        kinds,
        BTreeSet::from([
            "finished_good",
            "finished_unit",
            "ingredient",
            "material_unit",
            "packaging_product"
        ])
    );

    let nested = outcome
        .records
        .iter()
        .find(|r| r.item_slug == "shortbread")
        .unwrap();
    assert_eq!(nested.unit, NESTED_ASSEMBLY_UNIT);
    assert_eq!(nested.quantity_consumed, 4.0);
    assert_eq!(nested.cost_snapshot, money("4.00"));

    let flour = outcome.records.iter().find(|r| r.item_slug == "flour").unwrap();
    assert_eq!(flour.quantity_consumed, 4.0);
    assert_eq!(flour.unit, "cup");
    assert_eq!(flour.lot_ref.as_deref(), Some("LOT-1015"));

    // 每批 0.60 + 2.40 + 2.00 + 0.25 + 2.00 = 7.25，两批
    assert_eq!(outcome.event.batches, 2.0);
    assert_eq!(outcome.event.total_cost, money("14.50"));
    let sum: rust_decimal::Decimal = outcome.records.iter().map(|r| r.cost_snapshot).sum();
    assert_eq!(sum, outcome.event.total_cost);
}

#[test]
fn test_成本快照_价格变更后不变() {
    let env = create_test_env();
    let gift_box = build_gift_box(&env);
    let outcome = produce(&env, &gift_box, 1.0);

    let flour = env.catalog.find_ingredient_by_slug(None, "flour").unwrap();
    env.catalog
        .set_ingredient_price(None, flour.id, Some(money("9.99")))
        .unwrap();

    let records = env.ledger.list_records(None, outcome.event.id).unwrap();
    let flour_record = records.iter().find(|r| r.item_slug == "flour").unwrap();
    assert_eq!(flour_record.cost_snapshot, money("0.60"));
    let event = env.ledger.get_event(None, outcome.event.id).unwrap();
    assert_eq!(event.total_cost, money("7.25"));
}

#[test]
fn test_消耗记录_只追加() {
    let env = create_test_env();
    let gift_box = build_gift_box(&env);
    let outcome = produce(&env, &gift_box, 1.0);

    let conn = env.scope.connection();
    let conn = conn.lock().unwrap();
    let result = conn.execute(
        "UPDATE consumption_record SET cost_snapshot = '0' WHERE id = ?1",
        rusqlite::params![outcome.records[0].id],
    );
    assert!(result.is_err());
}

#[test]
fn test_单条消耗_未给成本时按当前单价计算() {
    let env = create_test_env();
    let gift_box = build_gift_box(&env);
    let outcome = produce(&env, &gift_box, 1.0);

    let sugar = env.ingredient("sugar", "g", Some("0.01"));
    let record = env
        .ledger
        .record_consumption(
            None,
            outcome.event.id,
            ConsumedItem::Ingredient(sugar.id),
            50.0,
            "g",
            None,
            None,
        )
        .unwrap();
    assert_eq!(record.cost_snapshot, money("0.50"));
    assert_eq!(record.item_slug, "sugar");

    let event = env.ledger.get_event(None, outcome.event.id).unwrap();
    assert_eq!(event.total_cost, money("7.75"));
}

#[test]
fn test_单条消耗_参数校验() {
    let env = create_test_env();
    let sugar = env.ingredient("sugar", "g", Some("0.01"));

    let err = env
        .ledger
        .record_consumption(None, 1, ConsumedItem::Ingredient(sugar.id), 0.0, "g", None, None)
        .unwrap_err();
    assert!(matches!(err, BomError::Validation { .. }));

    let err = env
        .ledger
        .record_consumption(None, 999, ConsumedItem::Ingredient(sugar.id), 1.0, "g", None, None)
        .unwrap_err();
    assert!(matches!(err, BomError::NotFound { .. }));
}

#[test]
fn test_生产_缺价组件仍写记录() {
    let env = create_test_env();
    let cake = env.recipe("cake");
    let vanilla = env.ingredient("vanilla", "ml", None);
    env.line(&cake, &vanilla, 5.0, "ml");

    let outcome = produce(&env, &cake, 1.0);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].cost_snapshot, money("0"));
    assert_eq!(outcome.event.total_cost, money("0"));
}
