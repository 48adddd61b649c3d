// ==========================================
// 导入导出集成测试
// ==========================================
// 测试目标: 按 slug 往返、消耗记录原样恢复、重复导入幂等、
//           无法解析的组件跳过并报告
// ==========================================


use bakery_bom::domain::consumption::ProductionRequest;
use bakery_bom::domain::types::{ComponentKind, ComponentRef, LeafKind};
use bakery_bom::engine::BomError;
use bakery_bom::importer::{BomBundle, BomExporter, BomImporter, CompositionRecord, ImportError};
use test_helpers::{create_test_env, money, TestEnv};

/// 源库: 两个父装配体、四条边（含嵌套与三类叶子组件）、一次生产
fn seed_source(env: &TestEnv) {
    let gift_box = env.recipe_with_direct_cost("gift-box", "1.00");
    let tray = env.recipe("tray");
    let cookie = env.recipe_with_direct_cost("cookie", "0.50");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", Some("2.00"));
    let ribbon = env.leaf(LeafKind::MaterialUnit, "ribbon", None);
    let single = env.leaf(LeafKind::FinishedUnit, "cookie-single", Some("0.40"));

    env.store
        .add_component(None, gift_box.id, ComponentRef::FinishedGood(cookie.id), 2.0, Some("top layer"))
        .unwrap();
    env.store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, None)
        .unwrap();
    env.store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::MaterialUnit, ribbon.id), 1.5, Some("bow"))
        .unwrap();
    env.store
        .add_component(None, tray.id, ComponentRef::leaf(LeafKind::FinishedUnit, single.id), 12.0, None)
        .unwrap();

    env.ledger
        .record_production(
            None,
            ProductionRequest {
                assembly_id: gift_box.id,
                quantity: 1.0,
                lot_ref: Some("LOT-7".to_string()),
                notes: Some("first run".to_string()),
            },
        )
        .unwrap();

    let plan = env.plans.create_plan_request(None, "holiday", "Holiday").unwrap();
    env.plans.set_item(None, plan.id, gift_box.id, 3.0).unwrap();
}

/// 组成边的 slug 视图（排序后比较）
fn edge_set(bundle: &BomBundle) -> Vec<(String, ComponentKind, String, String, Option<String>)> {
    let mut edges: Vec<_> = bundle
        .compositions
        .iter()
        .map(|c| {
            (
                c.parent_slug.clone(),
                c.component_kind,
                c.component_slug.clone(),
                format!("{:.3}", c.quantity),
                c.notes.clone(),
            )
        })
        .collect();
    edges.sort_by(|a, b| (&a.0, &a.2).cmp(&(&b.0, &b.2)));
    edges
}

#[test]
fn test_往返_边集合与数量备注保持() {
    let source = create_test_env();
    seed_source(&source);
    let exported = BomExporter::new(source.scope.clone()).export(None).unwrap();
    assert_eq!(exported.compositions.len(), 4);

    let target = create_test_env();
    // 目标库先有无关数据，使 id 与源库不同
    target.recipe("unrelated");
    let report = BomImporter::new(target.scope.clone()).import(None, &exported).unwrap();
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(report.compositions_created, 4);
    assert_eq!(report.events_imported, 1);

    let reexported = BomExporter::new(target.scope.clone()).export(None).unwrap();
    assert_eq!(edge_set(&reexported), edge_set(&exported));

    // 消耗记录原样恢复（不重新计算）
    assert_eq!(reexported.production_events, exported.production_events);
    assert_eq!(reexported.plan_requests, exported.plan_requests);
}

#[test]
fn test_重复导入_幂等() {
    let source = create_test_env();
    seed_source(&source);
    let exported = BomExporter::new(source.scope.clone()).export(None).unwrap();

    let target = create_test_env();
    let importer = BomImporter::new(target.scope.clone());
    importer.import(None, &exported).unwrap();
    let second = importer.import(None, &exported).unwrap();

    assert_eq!(second.compositions_created, 0);
    assert_eq!(second.compositions_updated, 0);
    assert_eq!(second.events_imported, 0);
    assert_eq!(second.events_skipped, 1);
    assert_eq!(target.count_rows("composition"), 4);
    assert_eq!(target.count_rows("production_event"), 1);
}

#[test]
fn test_重复导入_已有边按记录更新() {
    let source = create_test_env();
    seed_source(&source);
    let mut exported = BomExporter::new(source.scope.clone()).export(None).unwrap();

    let target = create_test_env();
    let importer = BomImporter::new(target.scope.clone());
    importer.import(None, &exported).unwrap();

    for record in exported.compositions.iter_mut() {
        if record.component_slug == "tin" {
            record.quantity = 2.0;
        }
    }
    let report = importer.import(None, &exported).unwrap();
    assert_eq!(report.compositions_updated, 1);

    let reexported = BomExporter::new(target.scope.clone()).export(None).unwrap();
    let tin = reexported
        .compositions
        .iter()
        .find(|c| c.component_slug == "tin")
        .unwrap();
    assert_eq!(tin.quantity, 2.0);
}

#[test]
fn test_无法解析的组件_跳过并报告_父装配体仍导入() {
    let source = create_test_env();
    seed_source(&source);
    let mut exported = BomExporter::new(source.scope.clone()).export(None).unwrap();
    exported.compositions.push(CompositionRecord {
        parent_slug: "tray".to_string(),
        component_kind: ComponentKind::PackagingProduct,
        component_slug: "missing-box".to_string(),
        quantity: 1.0,
        notes: None,
    });

    let target = create_test_env();
    let report = BomImporter::new(target.scope.clone()).import(None, &exported).unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].section, "compositions");
    assert!(report.skipped[0].key.contains("missing-box"));
    assert_eq!(report.compositions_created, 4);
    assert!(target.catalog.find_assembly_by_slug(None, "tray").is_ok());
}

#[test]
fn test_导入_版本不支持() {
    let target = create_test_env();
    let bundle = BomBundle {
        format_version: 99,
        exported_at: "2026-10-15 00:00:00".to_string(),
        ingredients: vec![],
        leaves: vec![],
        assemblies: vec![],
        ingredient_lines: vec![],
        compositions: vec![],
        production_events: vec![],
        plan_requests: vec![],
    };
    let err = BomImporter::new(target.scope.clone()).import(None, &bundle).unwrap_err();
    assert!(matches!(err, ImportError::UnsupportedVersion { found: 99, .. }));
}

#[test]
fn test_文件往返() {
    let source = create_test_env();
    seed_source(&source);
    let path = source._dir.path().join("bundle.json");
    BomExporter::new(source.scope.clone()).export_to_file(&path).unwrap();

    let target = create_test_env();
    let report = BomImporter::new(target.scope.clone()).import_from_file(&path).unwrap();
    assert_eq!(report.assemblies_created, 3);

    let gift_box = target.catalog.find_assembly_by_slug(None, "gift-box").unwrap();
    // 缺价丝带按零计入
    assert_eq!(target.costs.total_cost(None, gift_box.id).unwrap(), money("4.00"));
}

#[test]
fn test_文件不存在() {
    let target = create_test_env();
    let err = BomImporter::new(target.scope.clone())
        .import_from_file("/nonexistent/bundle.json")
        .unwrap_err();
    assert!(matches!(err, ImportError::FileNotFound(_)));
}

#[test]
fn test_已消耗组件_删除受限_账本往返完整() {
    let source = create_test_env();
    let gift_box = source.recipe_with_direct_cost("gift-box", "1.00");
    let tin = source.leaf(LeafKind::PackagingProduct, "tin", Some("2.00"));
    let tin_ref = ComponentRef::leaf(LeafKind::PackagingProduct, tin.id);
    let edge = source
        .store
        .add_component(None, gift_box.id, tin_ref, 1.0, None)
        .unwrap();
    source
        .ledger
        .record_production(
            None,
            ProductionRequest {
                assembly_id: gift_box.id,
                quantity: 1.0,
                lot_ref: None,
                notes: None,
            },
        )
        .unwrap();

    // 拆掉组成边后，消耗记录仍阻止删除
    assert!(source.store.remove_component(None, edge.id).unwrap());
    let err = source
        .store
        .delete_leaf(None, LeafKind::PackagingProduct, tin.id)
        .unwrap_err();
    match err {
        BomError::RestrictedDeletion { referenced_by, .. } => {
            assert_eq!(referenced_by, vec!["ledger:1".to_string()])
        }
        other => panic!("Expected RestrictedDeletion, got {:?}", other),
    }

    let exported = BomExporter::new(source.scope.clone()).export(None).unwrap();
    let target = create_test_env();
    let report = BomImporter::new(target.scope.clone()).import(None, &exported).unwrap();
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(report.records_imported, 2);

    let reexported = BomExporter::new(target.scope.clone()).export(None).unwrap();
    assert_eq!(reexported.production_events, exported.production_events);
    let event = &reexported.production_events[0];
    let sum: rust_decimal::Decimal = event.records.iter().map(|r| r.cost_snapshot).sum();
    assert_eq!(sum, event.total_cost);
}

#[test]
fn test_已消耗的嵌套装配体_删除受限() {
    let env = create_test_env();
    let gift_box = env.recipe_with_direct_cost("gift-box", "1.00");
    let cookie = env.recipe_with_direct_cost("cookie", "0.50");
    let edge = env
        .store
        .add_component(None, gift_box.id, ComponentRef::FinishedGood(cookie.id), 2.0, None)
        .unwrap();
    env.ledger
        .record_production(
            None,
            ProductionRequest {
                assembly_id: gift_box.id,
                quantity: 1.0,
                lot_ref: None,
                notes: None,
            },
        )
        .unwrap();
    assert!(env.store.remove_component(None, edge.id).unwrap());

    let err = env.store.delete_assembly(None, cookie.id).unwrap_err();
    assert!(matches!(err, BomError::RestrictedDeletion { .. }));
    assert!(env.catalog.find_assembly_by_slug(None, "cookie").is_ok());
}
