// ==========================================
// CompositionStore / CycleGuard 集成测试
// ==========================================
// 测试目标: 组成边增删改、环路与深度拒绝、删除受限、XOR 约束
// ==========================================


use bakery_bom::domain::composition::CompositionPatch;
use bakery_bom::domain::types::{ComponentRef, LeafKind};
use bakery_bom::engine::BomError;
use test_helpers::create_test_env;

#[test]
fn test_新增组成边_四种组件类型() {
    let env = create_test_env();
    let gift_box = env.assembly("gift-box", bakery_bom::AssemblyKind::Package);
    let cookie = env.recipe("sugar-cookie");
    let unit = env.leaf(LeafKind::FinishedUnit, "cookie-single", Some("0.40"));
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", Some("2.00"));
    let ribbon = env.leaf(LeafKind::MaterialUnit, "ribbon", Some("0.25"));

    env.store
        .add_component(None, gift_box.id, ComponentRef::FinishedGood(cookie.id), 2.0, Some("front row"))
        .unwrap();
    env.store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::FinishedUnit, unit.id), 6.0, None)
        .unwrap();
    env.store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, None)
        .unwrap();
    env.store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::MaterialUnit, ribbon.id), 1.0, None)
        .unwrap();

    let edges = env.store.list_components(None, gift_box.id).unwrap();
    assert_eq!(edges.len(), 4);
    let orders: Vec<i32> = edges.iter().map(|e| e.sort_order).collect();
    assert_eq!(orders, vec![0, 1, 2, 3]);
    assert_eq!(edges[0].notes.as_deref(), Some("front row"));

    // 每条持久化的组成边恰好设置一种组件列
    let conn = env.scope.connection();
    let conn = conn.lock().unwrap();
    let violations: i64 = conn
        .query_row(
            r#"SELECT COUNT(*) FROM composition
               WHERE (finished_unit_id IS NOT NULL) + (finished_good_id IS NOT NULL)
                   + (packaging_product_id IS NOT NULL) + (material_unit_id IS NOT NULL) != 1"#,
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(violations, 0);
}

#[test]
fn test_xor_约束_直接写入两种组件被拒绝() {
    let env = create_test_env();
    let parent = env.recipe("parent");
    let child = env.recipe("child");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);

    let conn = env.scope.connection();
    let conn = conn.lock().unwrap();
    let result = conn.execute(
        r#"INSERT INTO composition (
               parent_id, finished_good_id, packaging_product_id, quantity, sort_order,
               created_at, updated_at, quantity_updated_at
           ) VALUES (?1, ?2, ?3, 1.0, 0, '2026-01-01 00:00:00', '2026-01-01 00:00:00', '2026-01-01 00:00:00')"#,
        rusqlite::params![parent.id.0, child.id.0, tin.id.0],
    );
    assert!(result.is_err(), "两种组件列同时非空必须被 CHECK 拒绝");
}

#[test]
fn test_数量校验_非正数拒绝且不写入() {
    let env = create_test_env();
    let parent = env.recipe("parent");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);
    let component = ComponentRef::leaf(LeafKind::PackagingProduct, tin.id);

    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let err = env.store.add_component(None, parent.id, component, bad, None).unwrap_err();
        assert!(matches!(err, BomError::Validation { .. }), "quantity {} should be rejected", bad);
    }
    assert_eq!(env.count_rows("composition"), 0);
}

#[test]
fn test_重复边_拒绝() {
    let env = create_test_env();
    let parent = env.recipe("parent");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);
    let component = ComponentRef::leaf(LeafKind::PackagingProduct, tin.id);

    env.store.add_component(None, parent.id, component, 1.0, None).unwrap();
    let err = env.store.add_component(None, parent.id, component, 2.0, None).unwrap_err();
    assert!(matches!(err, BomError::Validation { .. }));
    assert_eq!(env.count_rows("composition"), 1);
}

#[test]
fn test_环路_自引用() {
    let env = create_test_env();
    let a = env.recipe("a");

    let err = env
        .store
        .add_component(None, a.id, ComponentRef::FinishedGood(a.id), 1.0, None)
        .unwrap_err();
    match err {
        BomError::Cycle { path } => assert_eq!(path, vec!["a".to_string(), "a".to_string()]),
        other => panic!("Expected Cycle, got {:?}", other),
    }
    assert_eq!(env.count_rows("composition"), 0);
}

#[test]
fn test_环路_长度2() {
    let env = create_test_env();
    let a = env.recipe("a");
    let b = env.recipe("b");
    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 1.0, None)
        .unwrap();

    let err = env
        .store
        .add_component(None, b.id, ComponentRef::FinishedGood(a.id), 1.0, None)
        .unwrap_err();
    match err {
        BomError::Cycle { path } => assert_eq!(path, vec!["b", "a", "b"]),
        other => panic!("Expected Cycle, got {:?}", other),
    }
}

#[test]
fn test_环路_长度3() {
    let env = create_test_env();
    let a = env.recipe("a");
    let b = env.recipe("b");
    let c = env.recipe("c");
    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 1.0, None)
        .unwrap();
    env.store
        .add_component(None, b.id, ComponentRef::FinishedGood(c.id), 1.0, None)
        .unwrap();

    let err = env
        .store
        .add_component(None, c.id, ComponentRef::FinishedGood(a.id), 1.0, None)
        .unwrap_err();
    match err {
        BomError::Cycle { path } => assert_eq!(path, vec!["c", "a", "b", "c"]),
        other => panic!("Expected Cycle, got {:?}", other),
    }
    assert_eq!(env.count_rows("composition"), 2);
}

#[test]
fn test_深度_三层通过_四层拒绝() {
    let env = create_test_env();
    let a = env.recipe("a");
    let b = env.recipe("b");
    let c = env.recipe("c");
    let d = env.recipe("d");

    env.store
        .add_component(None, a.id, ComponentRef::FinishedGood(b.id), 1.0, None)
        .unwrap();
    env.store
        .add_component(None, b.id, ComponentRef::FinishedGood(c.id), 1.0, None)
        .unwrap();

    let err = env
        .store
        .add_component(None, c.id, ComponentRef::FinishedGood(d.id), 1.0, None)
        .unwrap_err();
    match err {
        BomError::DepthExceeded {
            parent,
            component,
            depth,
            max_depth,
        } => {
            assert_eq!(parent, "c");
            assert_eq!(component, "d");
            assert_eq!(depth, 4);
            assert_eq!(max_depth, 3);
        }
        other => panic!("Expected DepthExceeded, got {:?}", other),
    }

    // 叶子组件不增加层数
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);
    env.store
        .add_component(None, c.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, None)
        .unwrap();
}

#[test]
fn test_深度_子树深度计入() {
    let env = create_test_env();
    let top = env.recipe("top");
    let x = env.recipe("x");
    let y = env.recipe("y");
    let z = env.recipe("z");
    // x -> y -> z 已是三层，再挂到 top 下将成为四层
    env.store
        .add_component(None, x.id, ComponentRef::FinishedGood(y.id), 1.0, None)
        .unwrap();
    env.store
        .add_component(None, y.id, ComponentRef::FinishedGood(z.id), 1.0, None)
        .unwrap();

    let err = env
        .store
        .add_component(None, top.id, ComponentRef::FinishedGood(x.id), 1.0, None)
        .unwrap_err();
    assert!(matches!(err, BomError::DepthExceeded { depth: 4, .. }));
}

#[test]
fn test_修改组成边_数量与备注() {
    let env = create_test_env();
    let parent = env.recipe("parent");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);
    let edge = env
        .store
        .add_component(None, parent.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, Some("old"))
        .unwrap();

    let updated = env
        .store
        .update_component(
            None,
            edge.id,
            CompositionPatch {
                quantity: Some(3.0),
                notes: Some("new".to_string()),
            },
        )
        .unwrap();
    assert_eq!(updated.quantity, 3.0);
    assert_eq!(updated.notes.as_deref(), Some("new"));
    assert!(updated.quantity_updated_at > edge.quantity_updated_at);

    let err = env
        .store
        .update_component(
            None,
            edge.id,
            CompositionPatch {
                quantity: Some(0.0),
                notes: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, BomError::Validation { .. }));
}

#[test]
fn test_重排_必须覆盖全部边() {
    let env = create_test_env();
    let parent = env.recipe("parent");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);
    let ribbon = env.leaf(LeafKind::MaterialUnit, "ribbon", None);
    let e1 = env
        .store
        .add_component(None, parent.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, None)
        .unwrap();
    let e2 = env
        .store
        .add_component(None, parent.id, ComponentRef::leaf(LeafKind::MaterialUnit, ribbon.id), 1.0, None)
        .unwrap();

    let err = env.store.reorder_components(None, parent.id, &[e2.id]).unwrap_err();
    assert!(matches!(err, BomError::Validation { .. }));

    let edges = env.store.reorder_components(None, parent.id, &[e2.id, e1.id]).unwrap();
    assert_eq!(edges[0].id, e2.id);
    assert_eq!(edges[1].id, e1.id);
}

#[test]
fn test_删除受限_移除引用后成功() {
    let env = create_test_env();
    let gift_box = env.recipe("gift-box");
    let cookie = env.recipe("sugar-cookie");
    let tin = env.leaf(LeafKind::PackagingProduct, "tin", None);

    let nested = env
        .store
        .add_component(None, gift_box.id, ComponentRef::FinishedGood(cookie.id), 1.0, None)
        .unwrap();
    let packed = env
        .store
        .add_component(None, gift_box.id, ComponentRef::leaf(LeafKind::PackagingProduct, tin.id), 1.0, None)
        .unwrap();

    match env.store.delete_assembly(None, cookie.id).unwrap_err() {
        BomError::RestrictedDeletion { slug, referenced_by, .. } => {
            assert_eq!(slug, "sugar-cookie");
            assert_eq!(referenced_by, vec!["gift-box".to_string()]);
        }
        other => panic!("Expected RestrictedDeletion, got {:?}", other),
    }
    match env.store.delete_leaf(None, LeafKind::PackagingProduct, tin.id).unwrap_err() {
        BomError::RestrictedDeletion { referenced_by, .. } => assert_eq!(referenced_by, vec!["gift-box"]),
        other => panic!("Expected RestrictedDeletion, got {:?}", other),
    }

    assert!(env.store.remove_component(None, nested.id).unwrap());
    assert!(env.store.remove_component(None, packed.id).unwrap());
    assert!(!env.store.remove_component(None, packed.id).unwrap());

    assert!(env.store.delete_assembly(None, cookie.id).unwrap());
    assert!(env.store.delete_leaf(None, LeafKind::PackagingProduct, tin.id).unwrap());
    assert!(!env.store.delete_assembly(None, cookie.id).unwrap());
}

#[test]
fn test_删除受限_生产请求引用() {
    let env = create_test_env();
    let cookie = env.recipe("sugar-cookie");
    let plan = env.plans.create_plan_request(None, "holiday", "Holiday").unwrap();
    env.plans.set_item(None, plan.id, cookie.id, 2.0).unwrap();

    match env.store.delete_assembly(None, cookie.id).unwrap_err() {
        BomError::RestrictedDeletion { referenced_by, .. } => {
            assert_eq!(referenced_by, vec!["plan:holiday".to_string()]);
        }
        other => panic!("Expected RestrictedDeletion, got {:?}", other),
    }
}

#[test]
fn test_删除父装配体_级联删除自身组成边() {
    let env = create_test_env();
    let gift_box = env.recipe("gift-box");
    let cookie = env.recipe("sugar-cookie");
    env.store
        .add_component(None, gift_box.id, ComponentRef::FinishedGood(cookie.id), 1.0, None)
        .unwrap();

    assert!(env.store.delete_assembly(None, gift_box.id).unwrap());
    assert_eq!(env.count_rows("composition"), 0);
    assert!(env.store.find_parents_of(None, ComponentRef::FinishedGood(cookie.id)).unwrap().is_empty());
}
