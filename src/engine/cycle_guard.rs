// ==========================================
// 烘焙管理系统 - 环路 / 深度守卫
// ==========================================
// 职责: 新增组成边之前校验
//   1. 环路: 从候选组件出发沿子边能否回到候选父装配体
//   2. 深度: ancestor_depth(父) + subtree_depth(组件) 不得超过 max_depth
// 说明: 叶子组件不改变嵌套层数，直接放行
// ==========================================

use crate::config::config_manager::load_bom_config;
use crate::domain::types::{AssemblyId, ComponentRef};
use crate::engine::error::{BomError, BomResult, StorageContext};
use crate::engine::graph::AssemblyGraph;
use crate::repository::assembly_repo::AssemblyRepository;
use crate::repository::composition_repo::CompositionRepository;
use crate::repository::scope::{TransactionScope, TxContext};
use rusqlite::Connection;
use tracing::{debug, warn};

// ==========================================
// CycleGuard
// ==========================================
pub struct CycleGuard {
    scope: TransactionScope,
}

impl CycleGuard {
    pub fn new(scope: TransactionScope) -> Self {
        Self { scope }
    }

    /// 校验 parent -> component 是否可以新增
    ///
    /// # 返回
    /// - `Err(BomError::Cycle)`: 会形成环（自引用为长度 1 的环）
    /// - `Err(BomError::DepthExceeded)`: 会超过配置的最大层数
    pub fn validate_edge(
        &self,
        ctx: Option<TxContext<'_>>,
        parent: AssemblyId,
        component: ComponentRef,
    ) -> BomResult<()> {
        self.scope.run(ctx, "validate_edge", |ctx| {
            let max_depth = load_bom_config(&ctx).ctx("load_bom_config")?.max_depth;
            Self::check(&ctx, parent, component, max_depth)
        })
    }

    /// 在给定连接上执行校验（供 CompositionStore / 导入器在同一事务内调用）
    pub(crate) fn check(
        conn: &Connection,
        parent: AssemblyId,
        component: ComponentRef,
        max_depth: usize,
    ) -> BomResult<()> {
        let child = match component.as_assembly() {
            Some(child) => child,
            None => return Ok(()),
        };

        if child == parent {
            let slug = slug_of(conn, parent)?;
            warn!(parent = %slug, "拒绝自引用组成边");
            return Err(BomError::Cycle {
                path: vec![slug.clone(), slug],
            });
        }

        let edges = CompositionRepository::assembly_edges(conn).ctx("load_assembly_edges")?;
        let graph = AssemblyGraph::from_edges(edges);

        // 1. 环路: child 能否到达 parent
        if let Some(back_path) = graph.find_path(child, parent) {
            let mut path = Vec::with_capacity(back_path.len() + 1);
            path.push(slug_of(conn, parent)?);
            for id in back_path {
                path.push(slug_of(conn, id)?);
            }
            warn!(cycle = %path.join(" -> "), "拒绝形成环路的组成边");
            return Err(BomError::Cycle { path });
        }

        // 2. 深度: 经过新边的最长装配体链
        let depth = graph.ancestor_depth(parent) + graph.subtree_depth(child);
        debug!(parent = parent.0, child = child.0, depth, max_depth, "嵌套深度校验");
        if depth > max_depth {
            return Err(BomError::DepthExceeded {
                parent: slug_of(conn, parent)?,
                component: slug_of(conn, child)?,
                depth,
                max_depth,
            });
        }

        Ok(())
    }
}

fn slug_of(conn: &Connection, id: AssemblyId) -> BomResult<String> {
    Ok(AssemblyRepository::find_by_id(conn, id)
        .ctx("find_assembly")?
        .map(|a| a.slug)
        .unwrap_or_else(|| format!("#{}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{now_ts, open_in_memory};
    use crate::domain::assembly::NewAssembly;
    use crate::domain::types::{AssemblyKind, ItemId};

    fn make_assembly(conn: &Connection, slug: &str) -> AssemblyId {
        AssemblyRepository::insert(
            conn,
            &NewAssembly {
                slug: slug.to_string(),
                display_name: slug.to_string(),
                kind: AssemblyKind::FinishedGood,
                yield_quantity: 1.0,
                yield_unit: "each".to_string(),
            },
            now_ts(),
        )
        .unwrap()
    }

    fn link(conn: &Connection, parent: AssemblyId, child: AssemblyId) {
        CompositionRepository::insert(conn, parent, ComponentRef::FinishedGood(child), 1.0, None, 0, now_ts())
            .unwrap();
    }

    #[test]
    fn test_叶子组件_不做环路与深度校验() {
        let conn = open_in_memory().unwrap();
        let a = make_assembly(&conn, "a");
        let tin = ComponentRef::PackagingProduct(ItemId(1));
        assert!(CycleGuard::check(&conn, a, tin, 0).is_ok());
    }

    #[test]
    fn test_深度_恰好等于上限允许_超过拒绝() {
        let conn = open_in_memory().unwrap();
        let a = make_assembly(&conn, "a");
        let b = make_assembly(&conn, "b");
        let c = make_assembly(&conn, "c");
        link(&conn, a, b);

        // a -> b -> c 共 3 层
        assert!(CycleGuard::check(&conn, b, ComponentRef::FinishedGood(c), 3).is_ok());
        let err = CycleGuard::check(&conn, b, ComponentRef::FinishedGood(c), 2).unwrap_err();
        match err {
            BomError::DepthExceeded { parent, component, depth, max_depth } => {
                assert_eq!((parent.as_str(), component.as_str()), ("b", "c"));
                assert_eq!((depth, max_depth), (3, 2));
            }
            other => panic!("Expected DepthExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_环路_路径从父节点出发回到父节点() {
        let conn = open_in_memory().unwrap();
        let a = make_assembly(&conn, "a");
        let b = make_assembly(&conn, "b");
        link(&conn, a, b);

        let err = CycleGuard::check(&conn, b, ComponentRef::FinishedGood(a), 3).unwrap_err();
        match err {
            BomError::Cycle { path } => assert_eq!(path, vec!["b", "a", "b"]),
            other => panic!("Expected Cycle, got {:?}", other),
        }
    }
}
