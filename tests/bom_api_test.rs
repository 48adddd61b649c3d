// ==========================================
// API 层集成测试
// ==========================================
// 测试目标: slug 寻址调用、结构化错误响应、共享作用域整体回滚
// ==========================================


use bakery_bom::api::{ApiError, BomApi, ImportApi, PlanApi};
use bakery_bom::app::AppState;
use bakery_bom::domain::assembly::{NewAssembly, NewIngredient, NewLeafItem};
use bakery_bom::domain::types::{AssemblyKind, ComponentKind, ComponentRef, LeafKind};
use bakery_bom::engine::{BomError, IdentityUnitConverter};
use std::sync::Arc;
use test_helpers::{create_test_env, money};

fn new_assembly(slug: &str) -> NewAssembly {
    NewAssembly {
        slug: slug.to_string(),
        display_name: slug.to_string(),
        kind: AssemblyKind::FinishedGood,
        yield_quantity: 1.0,
        yield_unit: "box".to_string(),
    }
}

fn seeded_api() -> (test_helpers::TestEnv, BomApi) {
    let env = create_test_env();
    let api = BomApi::new(env.scope.clone(), Arc::new(IdentityUnitConverter));

    api.create_assembly(new_assembly("gift-box")).unwrap();
    api.create_assembly(new_assembly("cookie")).unwrap();
    api.create_ingredient(NewIngredient {
        slug: "flour".to_string(),
        display_name: "Flour".to_string(),
        price_unit: "cup".to_string(),
        unit_price: Some(money("0.25")),
    })
    .unwrap();
    api.create_leaf(NewLeafItem {
        kind: LeafKind::PackagingProduct,
        slug: "tin".to_string(),
        display_name: "Tin".to_string(),
        unit: "each".to_string(),
        unit_cost: Some(money("2.00")),
        yield_quantity: 1.0,
    })
    .unwrap();
    api.set_ingredient_line("cookie", "flour", 4.0, "cup").unwrap();
    (env, api)
}

#[test]
fn test_slug_寻址_增改删组成边() {
    let (_env, api) = seeded_api();

    let view = api
        .add_component("gift-box", ComponentKind::FinishedGood, "cookie", 2.0, Some("tray"))
        .unwrap();
    assert_eq!(view.parent_slug, "gift-box");
    assert_eq!(view.component_slug, "cookie");
    api.add_component("gift-box", ComponentKind::PackagingProduct, "tin", 1.0, None)
        .unwrap();

    // 2 × 1.00 + 2.00
    assert_eq!(api.total_cost("gift-box").unwrap(), money("4.00"));

    let updated = api
        .update_component("gift-box", ComponentKind::FinishedGood, "cookie", Some(3.0), None)
        .unwrap();
    assert_eq!(updated.quantity, 3.0);
    assert_eq!(updated.notes.as_deref(), Some("tray"));

    let reordered = api
        .reorder_components(
            "gift-box",
            &[
                (ComponentKind::PackagingProduct, "tin".to_string()),
                (ComponentKind::FinishedGood, "cookie".to_string()),
            ],
        )
        .unwrap();
    assert_eq!(reordered[0].component_slug, "tin");

    let rows = api.aggregate_ingredients("gift-box", 1.0).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_quantity, 12.0);
    let display = api.aggregate_for_display("gift-box", 1.0).unwrap();
    assert_eq!(display.len(), 1);

    assert!(api
        .remove_component("gift-box", ComponentKind::PackagingProduct, "tin")
        .unwrap());
    assert!(!api
        .remove_component("gift-box", ComponentKind::PackagingProduct, "tin")
        .unwrap());
    assert_eq!(api.list_components("gift-box").unwrap().len(), 1);
}

#[test]
fn test_错误响应_环路带路径() {
    let (_env, api) = seeded_api();
    api.add_component("gift-box", ComponentKind::FinishedGood, "cookie", 1.0, None)
        .unwrap();

    let err = api
        .add_component("cookie", ComponentKind::FinishedGood, "gift-box", 1.0, None)
        .unwrap_err();
    let resp = err.to_response();
    assert_eq!(resp.code, "CYCLE_DETECTED");
    assert_eq!(
        resp.details,
        Some(serde_json::json!({ "path": ["cookie", "gift-box", "cookie"] }))
    );
}

#[test]
fn test_错误响应_删除受限带引用方() {
    let (_env, api) = seeded_api();
    api.add_component("gift-box", ComponentKind::PackagingProduct, "tin", 1.0, None)
        .unwrap();

    let err = api.delete_leaf(LeafKind::PackagingProduct, "tin").unwrap_err();
    match &err {
        ApiError::RestrictedDeletion { referenced_by, .. } => {
            assert_eq!(referenced_by, &vec!["gift-box".to_string()])
        }
        other => panic!("Expected RestrictedDeletion, got {:?}", other),
    }
    assert_eq!(err.code(), "RESTRICTED_DELETION");
}

#[test]
fn test_未知_slug_返回_not_found() {
    let (_env, api) = seeded_api();
    let err = api
        .add_component("gift-box", ComponentKind::MaterialUnit, "glitter", 1.0, None)
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = api.add_component("", ComponentKind::MaterialUnit, "glitter", 1.0, None).unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
}

#[test]
fn test_生产与消耗_按_slug() {
    let (_env, api) = seeded_api();
    api.add_component("gift-box", ComponentKind::FinishedGood, "cookie", 1.0, None)
        .unwrap();
    api.add_component("gift-box", ComponentKind::PackagingProduct, "tin", 1.0, None)
        .unwrap();

    let outcome = api.record_production("gift-box", 2.0, None, None).unwrap();
    assert_eq!(outcome.records.len(), 2);

    let record = api
        .record_consumption(outcome.event.id, "ingredient", "flour", 1.0, "cup", None, Some("LOT-9"))
        .unwrap();
    assert_eq!(record.cost_snapshot, money("0.25"));

    let err = api
        .record_consumption(outcome.event.id, "gadget", "flour", 1.0, "cup", None, None)
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    assert_eq!(api.list_production_events(Some("gift-box")).unwrap().len(), 1);
    assert_eq!(api.list_consumption_records(outcome.event.id).unwrap().len(), 3);
}

#[test]
fn test_共享作用域_失败整体回滚() {
    let env = create_test_env();
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);

    let result: Result<(), BomError> = env.scope.run(None, "test_rollback", |ctx| {
        let parent = env.catalog.create_assembly(Some(ctx), new_assembly("box"))?;
        env.store.add_component(
            Some(ctx),
            parent.id,
            ComponentRef::leaf(LeafKind::PackagingProduct, tin.id),
            1.0,
            None,
        )?;
        // 自引用失败，前面两步一并回滚
        env.store
            .add_component(Some(ctx), parent.id, ComponentRef::FinishedGood(parent.id), 1.0, None)?;
        Ok(())
    });

    assert!(matches!(result, Err(BomError::Cycle { .. })));
    assert_eq!(env.count_rows("assembly"), 0);
    assert_eq!(env.count_rows("composition"), 0);
    // 只剩作用域外创建叶子组件的审计
    assert_eq!(env.count_rows("action_log"), 1);
}

#[test]
fn test_共享作用域_成功一并提交() {
    let env = create_test_env();
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);

    let result: Result<(), BomError> = env.scope.run(None, "test_commit", |ctx| {
        let parent = env.catalog.create_assembly(Some(ctx), new_assembly("box"))?;
        env.store.add_component(
            Some(ctx),
            parent.id,
            ComponentRef::leaf(LeafKind::PackagingProduct, tin.id),
            1.0,
            None,
        )?;
        Ok(())
    });

    assert!(result.is_ok());
    assert_eq!(env.count_rows("assembly"), 1);
    assert_eq!(env.count_rows("composition"), 1);
}

#[test]
fn test_app_state_计划与导入导出() {
    let env = create_test_env();
    let state = AppState::new(env.db_path.clone()).unwrap();
    let bom: &BomApi = &state.bom_api;
    let plans: &PlanApi = &state.plan_api;
    let io: &ImportApi = &state.import_api;

    bom.create_assembly(new_assembly("gift-box")).unwrap();
    plans.create_plan("holiday", "Holiday").unwrap();
    plans.set_item("holiday", "gift-box", 2.0).unwrap();
    // 没有任何原料或组件时成本为零，仍可计算
    let snapshot = plans.calculate("holiday").unwrap();
    assert!(!plans.is_stale(&snapshot.snapshot_id).unwrap().is_stale);

    let json = io.export_json().unwrap();
    assert!(json.contains("gift-box"));
    let resp = io.import_json(&json).unwrap();
    assert!(resp.report.skipped.is_empty());

    let err = state
        .config_api
        .update_config("bom.max_depth", "0", "tester", "tighten")
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
    let config = state
        .config_api
        .update_config("bom.max_depth", "4", "tester", "deeper gift sets")
        .unwrap();
    assert_eq!(config.max_depth, 4);
}
