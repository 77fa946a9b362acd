//! Structural queries over the project graph: related files, test/impl
//! navigation, import chains, bounded transitive closures, cycle detection,
//! and change-impact estimation.

use crate::graph::ProjectGraph;
use crate::model::{EdgeKind, Node, NodeId, NodeKind};
use crate::parser::{impl_test_path, test_impl_path};
use std::collections::HashSet;

// Relevance priors per relation, highest first.
const RELEVANCE_TEST: f64 = 0.95;
const RELEVANCE_IMPORT: f64 = 0.90;
const RELEVANCE_IMPORTED_BY: f64 = 0.80;
const RELEVANCE_SAME_PACKAGE: f64 = 0.70;

/// Why a file was considered related.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Test,
    Import,
    ImportedBy,
    SamePackage,
}

#[derive(Debug, Clone)]
pub struct RelatedFile {
    pub path: String,
    pub relation: Relation,
    pub relevance: f64,
}

/// Files related to `path`: direct file-kind import targets, incoming
/// dependents, test counterparts in either direction, and same-package
/// siblings. Deduplicated (highest relevance wins), ranked, truncated to
/// `limit`.
pub fn related_files(graph: &ProjectGraph, path: &str, limit: usize) -> Vec<RelatedFile> {
    let id = NodeId::file(path);
    let mut best: Vec<RelatedFile> = Vec::new();

    let mut add = |path: String, relation: Relation, relevance: f64| {
        if let Some(existing) = best.iter_mut().find(|r| r.path == path) {
            if relevance > existing.relevance {
                existing.relation = relation;
                existing.relevance = relevance;
            }
        } else {
            best.push(RelatedFile { path, relation, relevance });
        }
    };

    // Outgoing dependencies with a file-kind target.
    for edge in graph.get_edges(&id) {
        if edge.kind != EdgeKind::Imports {
            continue;
        }
        if let Some(node) = graph.get_node(&edge.to) {
            if node.kind == NodeKind::File {
                if let Some(p) = node.path {
                    add(p, Relation::Import, RELEVANCE_IMPORT);
                }
            }
        }
    }

    // Incoming dependents.
    for edge in graph.get_reverse_edges(&id) {
        if edge.kind != EdgeKind::Imports {
            continue;
        }
        if let Some(node) = graph.get_node(&edge.from) {
            if node.kind == NodeKind::File {
                if let Some(p) = node.path {
                    add(p, Relation::ImportedBy, RELEVANCE_IMPORTED_BY);
                }
            }
        }
    }

    // Explicit test edges, both directions.
    for test_path in tests_related(graph, &id) {
        add(test_path, Relation::Test, RELEVANCE_TEST);
    }

    // Same-package siblings through the common contains parent.
    for sibling in files_in_same_package(graph, path) {
        add(sibling, Relation::SamePackage, RELEVANCE_SAME_PACKAGE);
    }

    best.retain(|r| r.path != path);
    best.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    best.truncate(limit);
    best
}

fn tests_related(graph: &ProjectGraph, id: &NodeId) -> Vec<String> {
    let mut out = Vec::new();
    for edge in graph.get_edges(id) {
        if edge.kind == EdgeKind::Tests {
            if let Some(p) = graph.get_node(&edge.to).and_then(|n| n.path) {
                out.push(p);
            }
        }
    }
    for edge in graph.get_reverse_edges(id) {
        if edge.kind == EdgeKind::Tests {
            if let Some(p) = graph.get_node(&edge.from).and_then(|n| n.path) {
                out.push(p);
            }
        }
    }
    out
}

/// Test files for an implementation file: incoming `tests` edges plus the
/// naming convention, deduplicated. Convention hits count only when the file
/// is actually in the graph.
pub fn find_tests_for(graph: &ProjectGraph, path: &str) -> Vec<String> {
    let id = NodeId::file(path);
    let mut out: Vec<String> = graph
        .get_reverse_edges(&id)
        .into_iter()
        .filter(|e| e.kind == EdgeKind::Tests)
        .filter_map(|e| graph.get_node(&e.from).and_then(|n| n.path))
        .collect();

    if let Some(test_path) = impl_test_path(path) {
        if graph.find_node_by_path(&test_path).is_some() {
            out.push(test_path);
        }
    }

    out.sort();
    out.dedup();
    out
}

/// Implementation files for a test file: outgoing `tests` edges plus the
/// naming convention, deduplicated.
pub fn find_impl_for(graph: &ProjectGraph, path: &str) -> Vec<String> {
    let id = NodeId::file(path);
    let mut out: Vec<String> = graph
        .get_edges(&id)
        .into_iter()
        .filter(|e| e.kind == EdgeKind::Tests)
        .filter_map(|e| graph.get_node(&e.to).and_then(|n| n.path))
        .collect();

    if let Some(impl_path) = test_impl_path(path) {
        if graph.find_node_by_path(&impl_path).is_some() {
            out.push(impl_path);
        }
    }

    out.sort();
    out.dedup();
    out
}

/// Other file nodes under the same `contains` parent as `path`.
pub fn files_in_same_package(graph: &ProjectGraph, path: &str) -> Vec<String> {
    let id = NodeId::file(path);
    let Some(parent) = graph
        .get_reverse_edges(&id)
        .into_iter()
        .find(|e| e.kind == EdgeKind::Contains)
        .map(|e| e.from)
    else {
        return Vec::new();
    };

    let mut out: Vec<String> = graph
        .get_edges(&parent)
        .into_iter()
        .filter(|e| e.kind == EdgeKind::Contains && e.to != id)
        .filter_map(|e| graph.get_node(&e.to))
        .filter(|n| n.kind == NodeKind::File)
        .filter_map(|n| n.path)
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Shortest import path between two files, endpoints inclusive; empty when
/// unreachable.
pub fn import_chain(graph: &ProjectGraph, from_path: &str, to_path: &str) -> Vec<NodeId> {
    graph.find_path(&NodeId::file(from_path), &NodeId::file(to_path))
}

/// Transitive closure over `imports` edges, depth-bounded, origin excluded.
pub fn all_dependencies(graph: &ProjectGraph, path: &str, max_depth: usize) -> Vec<Node> {
    bounded_dfs(graph, &NodeId::file(path), max_depth, Direction::Out)
}

/// Transitive dependents over `imports` edges, depth-bounded, origin
/// excluded.
pub fn all_dependents(graph: &ProjectGraph, path: &str, max_depth: usize) -> Vec<Node> {
    bounded_dfs(graph, &NodeId::file(path), max_depth, Direction::In)
}

enum Direction {
    Out,
    In,
}

fn bounded_dfs(graph: &ProjectGraph, origin: &NodeId, max_depth: usize, dir: Direction) -> Vec<Node> {
    let mut visited: HashSet<NodeId> = HashSet::from([origin.clone()]);
    let mut out = Vec::new();
    let mut stack: Vec<(NodeId, usize)> = vec![(origin.clone(), 0)];

    while let Some((current, depth)) = stack.pop() {
        if depth >= max_depth {
            continue;
        }
        let edges = match dir {
            Direction::Out => graph.get_edges(&current),
            Direction::In => graph.get_reverse_edges(&current),
        };
        for edge in edges {
            if edge.kind != EdgeKind::Imports {
                continue;
            }
            let next = match dir {
                Direction::Out => edge.to,
                Direction::In => edge.from,
            };
            if visited.insert(next.clone()) {
                if let Some(node) = graph.get_node(&next) {
                    out.push(node);
                }
                stack.push((next, depth + 1));
            }
        }
    }
    out
}

/// Import cycles: DFS over `imports` edges; each back edge expands into the
/// stack slice forming the cycle plus the closing node.
pub fn find_cycles(graph: &ProjectGraph) -> Vec<Vec<NodeId>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let nodes = graph.all_nodes();
    let mut color: std::collections::HashMap<NodeId, Color> =
        nodes.iter().map(|n| (n.id.clone(), Color::White)).collect();
    let mut cycles = Vec::new();

    fn visit(
        graph: &ProjectGraph,
        id: &NodeId,
        color: &mut std::collections::HashMap<NodeId, Color>,
        stack: &mut Vec<NodeId>,
        cycles: &mut Vec<Vec<NodeId>>,
    ) {
        color.insert(id.clone(), Color::Gray);
        stack.push(id.clone());

        for edge in graph.get_edges(id) {
            if edge.kind != EdgeKind::Imports {
                continue;
            }
            match color.get(&edge.to).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    // Back edge: the cycle is the stack from the target on,
                    // closed by the target again.
                    if let Some(start) = stack.iter().position(|n| n == &edge.to) {
                        let mut cycle: Vec<NodeId> = stack[start..].to_vec();
                        cycle.push(edge.to.clone());
                        cycles.push(cycle);
                    }
                }
                Color::White => visit(graph, &edge.to, color, stack, cycles),
                Color::Black => {}
            }
        }

        stack.pop();
        color.insert(id.clone(), Color::Black);
    }

    let mut ids: Vec<NodeId> = nodes.into_iter().map(|n| n.id).collect();
    ids.sort();
    for id in ids {
        if color.get(&id) == Some(&Color::White) {
            let mut stack = Vec::new();
            visit(graph, &id, &mut color, &mut stack, &mut cycles);
        }
    }
    cycles
}

/// Fraction of file nodes that transitively import `path` (0 when the graph
/// has no file nodes).
pub fn compute_impact(graph: &ProjectGraph, path: &str) -> f64 {
    let total_files = graph.nodes_of_kind(NodeKind::File).len();
    if total_files == 0 {
        return 0.0;
    }
    let dependents = bounded_dfs(graph, &NodeId::file(path), usize::MAX, Direction::In);
    let dependent_files = dependents.iter().filter(|n| n.kind == NodeKind::File).count();
    dependent_files as f64 / total_files as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node};

    /// main.go -> util.go -> helper.go, util_test.go tests util.go, all four
    /// contained by one package node.
    fn scenario_graph() -> ProjectGraph {
        let g = ProjectGraph::new();
        for p in ["/ws/main.go", "/ws/util.go", "/ws/util_test.go", "/ws/helper.go"] {
            g.add_node(Node::file(p)).unwrap();
        }
        g.add_node(Node::package("/ws", "main")).unwrap();
        for p in ["/ws/main.go", "/ws/util.go", "/ws/util_test.go", "/ws/helper.go"] {
            g.add_edge(Edge::new(NodeId::package("/ws"), NodeId::file(p), EdgeKind::Contains))
                .unwrap();
        }
        g.add_edge(Edge::new(NodeId::file("/ws/main.go"), NodeId::file("/ws/util.go"), EdgeKind::Imports))
            .unwrap();
        g.add_edge(Edge::new(NodeId::file("/ws/util.go"), NodeId::file("/ws/helper.go"), EdgeKind::Imports))
            .unwrap();
        g.add_edge(Edge::new(
            NodeId::file("/ws/util_test.go"),
            NodeId::file("/ws/util.go"),
            EdgeKind::Tests,
        ))
        .unwrap();
        g
    }

    #[test]
    fn related_files_ranked_by_relation() {
        let g = scenario_graph();
        let related = related_files(&g, "/ws/main.go", 10);

        let util = related.iter().find(|r| r.path == "/ws/util.go").unwrap();
        assert_eq!(util.relation, Relation::Import);
        assert_eq!(util.relevance, RELEVANCE_IMPORT);

        // Siblings come through the package node at 0.70.
        let helper = related.iter().find(|r| r.path == "/ws/helper.go").unwrap();
        assert_eq!(helper.relation, Relation::SamePackage);

        // Ranking is descending.
        for pair in related.windows(2) {
            assert!(pair[0].relevance >= pair[1].relevance);
        }
        // The file itself never appears.
        assert!(related.iter().all(|r| r.path != "/ws/main.go"));
    }

    #[test]
    fn related_files_test_relation_wins_dedup() {
        let g = scenario_graph();
        let related = related_files(&g, "/ws/util.go", 10);
        // util_test.go is both a sibling (0.70) and a test (0.95); test wins.
        let test = related.iter().find(|r| r.path == "/ws/util_test.go").unwrap();
        assert_eq!(test.relation, Relation::Test);
        assert_eq!(test.relevance, RELEVANCE_TEST);
        assert_eq!(related[0].path, "/ws/util_test.go");
    }

    #[test]
    fn related_files_truncates() {
        let g = scenario_graph();
        assert_eq!(related_files(&g, "/ws/main.go", 1).len(), 1);
    }

    #[test]
    fn tests_for_and_impl_for() {
        let g = scenario_graph();
        // Edge and naming convention agree; result is deduplicated.
        assert_eq!(find_tests_for(&g, "/ws/util.go"), vec!["/ws/util_test.go"]);
        assert_eq!(find_impl_for(&g, "/ws/util_test.go"), vec!["/ws/util.go"]);
        // No tests for helper.go.
        assert!(find_tests_for(&g, "/ws/helper.go").is_empty());
    }

    #[test]
    fn naming_convention_without_edge() {
        let g = ProjectGraph::new();
        g.add_node(Node::file("/ws/conv.go")).unwrap();
        g.add_node(Node::file("/ws/conv_test.go")).unwrap();
        assert_eq!(find_tests_for(&g, "/ws/conv.go"), vec!["/ws/conv_test.go"]);
        assert_eq!(find_impl_for(&g, "/ws/conv_test.go"), vec!["/ws/conv.go"]);
    }

    #[test]
    fn same_package_siblings() {
        let g = scenario_graph();
        let siblings = files_in_same_package(&g, "/ws/main.go");
        assert_eq!(siblings, vec!["/ws/helper.go", "/ws/util.go", "/ws/util_test.go"]);
    }

    #[test]
    fn import_chain_endpoints_inclusive() {
        let g = scenario_graph();
        let chain = import_chain(&g, "/ws/main.go", "/ws/helper.go");
        assert_eq!(
            chain,
            vec![
                NodeId::file("/ws/main.go"),
                NodeId::file("/ws/util.go"),
                NodeId::file("/ws/helper.go")
            ]
        );
        assert!(import_chain(&g, "/ws/helper.go", "/ws/main.go").is_empty());
    }

    #[test]
    fn bounded_transitive_closures() {
        let g = scenario_graph();
        let deps1: Vec<String> = all_dependencies(&g, "/ws/main.go", 1)
            .into_iter()
            .filter_map(|n| n.path)
            .collect();
        assert_eq!(deps1, vec!["/ws/util.go"]);

        let mut deps2: Vec<String> = all_dependencies(&g, "/ws/main.go", 2)
            .into_iter()
            .filter_map(|n| n.path)
            .collect();
        deps2.sort();
        assert_eq!(deps2, vec!["/ws/helper.go", "/ws/util.go"]);

        let mut dependents: Vec<String> = all_dependents(&g, "/ws/helper.go", 10)
            .into_iter()
            .filter_map(|n| n.path)
            .collect();
        dependents.sort();
        assert_eq!(dependents, vec!["/ws/main.go", "/ws/util.go"]);
    }

    #[test]
    fn cycle_detection() {
        let g = ProjectGraph::new();
        for p in ["/a.go", "/b.go", "/c.go", "/d.go"] {
            g.add_node(Node::file(p)).unwrap();
        }
        for (from, to) in [("/a.go", "/b.go"), ("/b.go", "/c.go"), ("/c.go", "/a.go")] {
            g.add_edge(Edge::new(NodeId::file(from), NodeId::file(to), EdgeKind::Imports)).unwrap();
        }
        // d.go sits outside the cycle.
        g.add_edge(Edge::new(NodeId::file("/d.go"), NodeId::file("/a.go"), EdgeKind::Imports))
            .unwrap();

        let cycles = find_cycles(&g);
        assert!(!cycles.is_empty());
        let cycle = &cycles[0];
        for p in ["/a.go", "/b.go", "/c.go"] {
            assert!(cycle.contains(&NodeId::file(p)), "{p} missing from {cycle:?}");
        }
        // Closed: first node repeats at the end.
        assert_eq!(cycle.first(), cycle.last());
        assert!(!cycle.contains(&NodeId::file("/d.go")));
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let g = scenario_graph();
        assert!(find_cycles(&g).is_empty());
    }

    #[test]
    fn impact_ratio() {
        let g = scenario_graph();
        // helper.go is imported (transitively) by util.go and main.go out of
        // 4 file nodes.
        assert_eq!(compute_impact(&g, "/ws/helper.go"), 2.0 / 4.0);
        assert_eq!(compute_impact(&g, "/ws/main.go"), 0.0);
        assert_eq!(compute_impact(&ProjectGraph::new(), "/nothing.go"), 0.0);
    }
}
