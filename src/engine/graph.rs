// ==========================================
// 烘焙管理系统 - 装配体嵌套图（内存视图）
// ==========================================
// 只包含 装配体 → 嵌套装配体 的边；叶子组件不影响环与深度
// 全部遍历使用显式栈 + 访问集合，图已损坏（含环）时也不会死循环
// ==========================================

use crate::domain::types::AssemblyId;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct AssemblyGraph {
    children: HashMap<AssemblyId, Vec<AssemblyId>>,
    parents: HashMap<AssemblyId, Vec<AssemblyId>>,
}

impl AssemblyGraph {
    /// 由 (父, 子) 边构建
    pub fn from_edges(edges: impl IntoIterator<Item = (AssemblyId, AssemblyId)>) -> Self {
        let mut graph = Self::default();
        for (parent, child) in edges {
            graph.children.entry(parent).or_default().push(child);
            graph.parents.entry(child).or_default().push(parent);
        }
        graph
    }

    pub fn children(&self, id: AssemblyId) -> &[AssemblyId] {
        self.children.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn parents(&self, id: AssemblyId) -> &[AssemblyId] {
        self.parents.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// 沿子边从 from 到 to 的一条路径（含两端）；不可达返回 None
    pub fn find_path(&self, from: AssemblyId, to: AssemblyId) -> Option<Vec<AssemblyId>> {
        if from == to {
            return Some(vec![from]);
        }

        let mut came_from: HashMap<AssemblyId, AssemblyId> = HashMap::new();
        let mut visited: HashSet<AssemblyId> = HashSet::new();
        let mut stack = vec![from];
        visited.insert(from);

        while let Some(node) = stack.pop() {
            for &child in self.children(node) {
                if !visited.insert(child) {
                    continue;
                }
                came_from.insert(child, node);
                if child == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(&prev) = came_from.get(&cursor) {
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                stack.push(child);
            }
        }
        None
    }

    /// 向下最长装配体链长度（含自身，无嵌套时为 1）
    pub fn subtree_depth(&self, id: AssemblyId) -> usize {
        longest_chain(id, &self.children)
    }

    /// 向上最长装配体链长度（含自身，无父时为 1）
    pub fn ancestor_depth(&self, id: AssemblyId) -> usize {
        longest_chain(id, &self.parents)
    }

    /// 从根出发可达的全部装配体（含根，按发现顺序）
    pub fn reachable_from(&self, roots: &[AssemblyId]) -> Vec<AssemblyId> {
        let mut seen: HashSet<AssemblyId> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<AssemblyId> = VecDeque::new();

        for &root in roots {
            if seen.insert(root) {
                queue.push_back(root);
            }
        }
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &child in self.children(node) {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        order
    }
}

/// 显式栈后序遍历求最长链；当前路径上的回边视为 0（损坏图的防御）
fn longest_chain(start: AssemblyId, adjacency: &HashMap<AssemblyId, Vec<AssemblyId>>) -> usize {
    let mut memo: HashMap<AssemblyId, usize> = HashMap::new();
    let mut on_path: HashSet<AssemblyId> = HashSet::new();
    let mut stack: Vec<(AssemblyId, usize)> = vec![(start, 0)];
    on_path.insert(start);

    while let Some(top) = stack.last_mut() {
        let node = top.0;
        let next = adjacency.get(&node).map(|v| v.as_slice()).unwrap_or(&[]);

        if top.1 < next.len() {
            let child = next[top.1];
            top.1 += 1;
            if memo.contains_key(&child) || on_path.contains(&child) {
                continue;
            }
            on_path.insert(child);
            stack.push((child, 0));
        } else {
            let best = next.iter().filter_map(|c| memo.get(c)).max().copied().unwrap_or(0);
            memo.insert(node, best + 1);
            on_path.remove(&node);
            stack.pop();
        }
    }

    memo.get(&start).copied().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> AssemblyId {
        AssemblyId(n)
    }

    #[test]
    fn test_深度_链与分叉() {
        // 1 -> 2 -> 3, 1 -> 4
        let g = AssemblyGraph::from_edges([(id(1), id(2)), (id(2), id(3)), (id(1), id(4))]);
        assert_eq!(g.subtree_depth(id(1)), 3);
        assert_eq!(g.subtree_depth(id(4)), 1);
        assert_eq!(g.ancestor_depth(id(3)), 3);
        assert_eq!(g.ancestor_depth(id(1)), 1);
    }

    #[test]
    fn test_路径查找() {
        let g = AssemblyGraph::from_edges([(id(1), id(2)), (id(2), id(3))]);
        assert_eq!(g.find_path(id(1), id(3)), Some(vec![id(1), id(2), id(3)]));
        assert_eq!(g.find_path(id(3), id(1)), None);
        assert_eq!(g.find_path(id(2), id(2)), Some(vec![id(2)]));
    }

    #[test]
    fn test_损坏图_不死循环() {
        let g = AssemblyGraph::from_edges([(id(1), id(2)), (id(2), id(1))]);
        assert_eq!(g.subtree_depth(id(1)), 2);
        assert_eq!(g.reachable_from(&[id(1)]), vec![id(1), id(2)]);
        assert!(g.find_path(id(1), id(1)).is_some());
    }
}
