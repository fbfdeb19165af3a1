use std::collections::VecDeque;
use crate::core::error::{Error, ErrorKind, Result};
use crate::join::criteria::{FindFn, JoinCriteria};
use crate::query::ast::Query;
use crate::query::sort::SortSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// One table in a join plan. The edge to `parent` carries no data of its
/// own; join key and cardinality come from the table connections.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub table: String,
    pub filter: Query,
    pub sort: SortSpec,
    pub find_fn: FindFn,
    pub alias: Option<String>,
    pub filter_up: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Join plan as an arena of nodes with index links.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinGraph {
    nodes: Vec<JoinNode>,
    root: NodeId,
}

impl JoinGraph {
    /// Build the plan in preorder; children keep document order and get
    /// increasing ids. A table repeated along one root-to-leaf path is a
    /// `CyclicJoin`.
    pub fn build(root_table: &str, criteria: &JoinCriteria) -> Result<JoinGraph> {
        let mut graph = JoinGraph {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let mut path = Vec::new();
        graph.add_node(root_table, criteria, None, &mut path)?;
        Ok(graph)
    }

    fn add_node(
        &mut self,
        table: &str,
        criteria: &JoinCriteria,
        parent: Option<NodeId>,
        path: &mut Vec<String>,
    ) -> Result<NodeId> {
        if path.iter().any(|ancestor| ancestor == table) {
            return Err(Error::new(
                ErrorKind::CyclicJoin,
                format!("table {} appears twice on the path {}", table, path.join(" -> ")),
            ));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(JoinNode {
            table: table.to_string(),
            filter: criteria.filter.clone(),
            sort: criteria.sort.clone(),
            find_fn: criteria.find_fn,
            alias: criteria.alias.clone(),
            filter_up: criteria.filter_up,
            parent,
            children: Vec::new(),
        });

        path.push(table.to_string());
        for (child_table, child_criteria) in criteria.children.iter() {
            let child = self.add_node(child_table, child_criteria, Some(id), path)?;
            self.nodes[id.0].children.push(child);
        }
        path.pop();

        Ok(id)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &JoinNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn breadth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.node(id).children.iter().copied());
        }
        order
    }

    /// First node in breadth-first order with the most predicate keys;
    /// `None` when no node filters at all.
    pub fn most_selective_node(&self) -> Option<NodeId> {
        let mut best: Option<(NodeId, usize)> = None;
        for id in self.breadth_first() {
            let count = self.node(id).filter.predicate_count();
            if count == 0 {
                continue;
            }
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((id, count)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Nodes from `id` up to the root, inclusive.
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            path.push(parent);
            current = parent;
        }
        path
    }

    /// Whether any node shares its table with one of its ancestors.
    pub fn has_repeated_ancestor(&self) -> bool {
        (0..self.nodes.len()).any(|index| {
            let id = NodeId(index);
            let table = &self.node(id).table;
            self.path_to_root(id)
                .into_iter()
                .skip(1)
                .any(|ancestor| self.node(ancestor).table == *table)
        })
    }

    /// The same plan with `target` as root: every edge on the old
    /// root-to-target path is reversed, nothing else changes. Child lists
    /// stay sorted by id, so rerooting back at the old root restores the
    /// original graph exactly.
    pub fn rerooted(&self, target: NodeId) -> JoinGraph {
        let mut graph = self.clone();
        let path = self.path_to_root(target);

        for pair in path.windows(2) {
            let (child, parent) = (pair[0], pair[1]);
            graph.nodes[parent.0].children.retain(|id| *id != child);
            graph.nodes[child.0].children.push(parent);
            graph.nodes[parent.0].parent = Some(child);
        }
        graph.nodes[target.0].parent = None;
        graph.root = target;

        for id in &path {
            graph.nodes[id.0].children.sort();
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn league_graph() -> JoinGraph {
        let (root, criteria) = JoinCriteria::parse_root(&json!({
            "league": {
                "children": {
                    "league_season": {
                        "filter": {"season": 2023},
                        "children": {
                            "team_season": {"filter": {"season": 2023, "power_rank": {"$lte": 3}}}
                        }
                    },
                    "team": {"filter": {"active": true}}
                }
            }
        }))
        .unwrap();
        JoinGraph::build(&root, &criteria).unwrap()
    }

    fn tables(graph: &JoinGraph, ids: &[NodeId]) -> Vec<String> {
        ids.iter().map(|id| graph.node(*id).table.clone()).collect()
    }

    #[test]
    fn build_assigns_preorder_ids() {
        let graph = league_graph();
        assert_eq!(graph.len(), 4);
        assert_eq!(tables(&graph, &[NodeId(0), NodeId(1), NodeId(2), NodeId(3)]), vec![
            "league", "league_season", "team_season", "team"
        ]);
        assert_eq!(graph.node(NodeId(0)).children, vec![NodeId(1), NodeId(3)]);
        assert_eq!(graph.node(NodeId(2)).parent, Some(NodeId(1)));
        assert_eq!(tables(&graph, &graph.breadth_first()), vec![
            "league", "league_season", "team", "team_season"
        ]);
    }

    #[test]
    fn most_selective_node_prefers_more_keys_then_bfs_order() {
        let graph = league_graph();
        assert_eq!(graph.most_selective_node(), Some(NodeId(2)));

        // ties resolve to the node seen first breadth-first
        let (root, criteria) = JoinCriteria::parse_root(&json!({
            "a": {"children": {"b": {"children": {"d": {"filter": {"x": 1}}}}, "c": {"filter": {"y": 1}}}}
        }))
        .unwrap();
        let graph = JoinGraph::build(&root, &criteria).unwrap();
        assert_eq!(graph.node(graph.most_selective_node().unwrap()).table, "c");

        let (root, criteria) = JoinCriteria::parse_root(&json!({"a": {"children": {"b": {}}}})).unwrap();
        assert_eq!(JoinGraph::build(&root, &criteria).unwrap().most_selective_node(), None);
    }

    #[test]
    fn reroot_reverses_the_path_only() {
        let graph = league_graph();
        let rerooted = graph.rerooted(NodeId(2));

        assert_eq!(rerooted.root(), NodeId(2));
        assert_eq!(rerooted.node(NodeId(2)).parent, None);
        assert_eq!(rerooted.node(NodeId(2)).children, vec![NodeId(1)]);
        assert_eq!(rerooted.node(NodeId(1)).children, vec![NodeId(0)]);
        assert_eq!(rerooted.node(NodeId(0)).children, vec![NodeId(3)]);
        assert_eq!(rerooted.node(NodeId(3)).parent, Some(NodeId(0)));

        // criteria stay with their node
        assert_eq!(rerooted.node(NodeId(2)).filter, graph.node(NodeId(2)).filter);
    }

    #[test]
    fn reroot_is_its_own_inverse() {
        let graph = league_graph();
        for target in 0..graph.len() {
            let there = graph.rerooted(NodeId(target));
            assert_eq!(there.rerooted(graph.root()), graph, "target {}", target);
        }
        assert_eq!(graph.rerooted(graph.root()), graph);
    }

    #[test]
    fn repeated_ancestor_tables_are_refused() {
        let (root, criteria) = JoinCriteria::parse_root(&json!({
            "league": {"children": {"team": {"children": {"league": {}}}}}
        }))
        .unwrap();
        let err = JoinGraph::build(&root, &criteria).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CyclicJoin);

        // the same table in sibling branches is fine until a reroot lines them up
        let (root, criteria) = JoinCriteria::parse_root(&json!({
            "league": {"children": {
                "season": {"children": {"team": {"filter": {"x": 1}}}},
                "division": {"children": {"team": {}}}
            }}
        }))
        .unwrap();
        let graph = JoinGraph::build(&root, &criteria).unwrap();
        assert!(!graph.has_repeated_ancestor());
        assert!(graph.rerooted(NodeId(2)).has_repeated_ancestor());
    }
}
