//! Concurrent directed multigraph: node map, out/in adjacency maps, and a
//! secondary path index, all behind one reader-writer lock.
//!
//! The lock is deliberately coarse — builds are bursty writes, queries are
//! many concurrent reads, and every query hands back copies so no caller
//! ever holds the lock.

use crate::model::{Edge, EdgeKind, Node, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid node id")]
    InvalidNodeId,
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("node already exists: {0}")]
    NodeExists(NodeId),
    #[error("invalid edge: {0}")]
    InvalidEdge(String),
    #[error("edge not found: {from} -[{kind:?}]-> {to}")]
    EdgeNotFound { from: NodeId, to: NodeId, kind: EdgeKind },
    #[error("edge already exists: {from} -[{kind:?}]-> {to}")]
    EdgeExists { from: NodeId, to: NodeId, kind: EdgeKind },
    #[error("graph serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct GraphInner {
    nodes: HashMap<NodeId, Node>,
    out_edges: HashMap<NodeId, Vec<Edge>>,
    in_edges: HashMap<NodeId, Vec<Edge>>,
    path_index: HashMap<String, NodeId>,
}

/// On-disk shape: `{ "nodes": [...], "edges": [...] }`, order-insensitive.
#[derive(Debug, Serialize, Deserialize)]
struct GraphFile {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// The project graph. Shareable across threads by reference; all methods
/// take `&self` and synchronize internally.
#[derive(Debug, Default)]
pub struct ProjectGraph {
    inner: RwLock<GraphInner>,
}

impl ProjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -- mutation -----------------------------------------------------------

    pub fn add_node(&self, node: Node) -> Result<(), GraphError> {
        let mut inner = self.inner.write().unwrap();
        inner.add_node(node)
    }

    pub fn remove_node(&self, id: &NodeId) -> Result<(), GraphError> {
        let mut inner = self.inner.write().unwrap();
        inner.remove_node(id)
    }

    /// Replace an existing node; the path index follows a path change
    /// atomically under the write lock.
    pub fn update_node(&self, node: Node) -> Result<(), GraphError> {
        let mut inner = self.inner.write().unwrap();
        let old = inner.nodes.get(&node.id).ok_or_else(|| GraphError::NodeNotFound(node.id.clone()))?;
        let old_path = old.path.clone();
        if old_path != node.path {
            if let Some(p) = &old_path {
                if inner.path_index.get(p) == Some(&node.id) {
                    inner.path_index.remove(p);
                }
            }
            if let Some(p) = &node.path {
                inner.path_index.insert(p.clone(), node.id.clone());
            }
        }
        inner.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn add_edge(&self, edge: Edge) -> Result<(), GraphError> {
        let mut inner = self.inner.write().unwrap();
        inner.add_edge(edge)
    }

    pub fn remove_edge(&self, from: &NodeId, to: &NodeId, kind: EdgeKind) -> Result<(), GraphError> {
        let mut inner = self.inner.write().unwrap();
        let found = inner
            .out_edges
            .get(from)
            .is_some_and(|edges| edges.iter().any(|e| &e.to == to && e.kind == kind));
        if !found {
            return Err(GraphError::EdgeNotFound { from: from.clone(), to: to.clone(), kind });
        }
        if let Some(edges) = inner.out_edges.get_mut(from) {
            edges.retain(|e| !(&e.to == to && e.kind == kind));
        }
        if let Some(edges) = inner.in_edges.get_mut(to) {
            edges.retain(|e| !(&e.from == from && e.kind == kind));
        }
        Ok(())
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        *inner = GraphInner::default();
    }

    // -- reads (all return copies) ------------------------------------------

    pub fn get_node(&self, id: &NodeId) -> Option<Node> {
        self.inner.read().unwrap().nodes.get(id).cloned()
    }

    pub fn has_node(&self, id: &NodeId) -> bool {
        self.inner.read().unwrap().nodes.contains_key(id)
    }

    pub fn get_edges(&self, from: &NodeId) -> Vec<Edge> {
        self.inner.read().unwrap().out_edges.get(from).cloned().unwrap_or_default()
    }

    pub fn get_reverse_edges(&self, to: &NodeId) -> Vec<Edge> {
        self.inner.read().unwrap().in_edges.get(to).cloned().unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().unwrap().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().unwrap().out_edges.values().map(Vec::len).sum()
    }

    pub fn all_nodes(&self) -> Vec<Node> {
        self.inner.read().unwrap().nodes.values().cloned().collect()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<Node> {
        self.inner
            .read()
            .unwrap()
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// O(1) lookup through the secondary path index.
    pub fn find_node_by_path(&self, path: &str) -> Option<Node> {
        let inner = self.inner.read().unwrap();
        let id = inner.path_index.get(path)?;
        inner.nodes.get(id).cloned()
    }

    /// Unique nodes reachable over one outgoing edge.
    pub fn dependencies(&self, id: &NodeId) -> Vec<Node> {
        let inner = self.inner.read().unwrap();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        if let Some(edges) = inner.out_edges.get(id) {
            for edge in edges {
                if seen.insert(&edge.to) {
                    if let Some(node) = inner.nodes.get(&edge.to) {
                        out.push(node.clone());
                    }
                }
            }
        }
        out
    }

    /// Unique nodes with an edge into `id`.
    pub fn dependents(&self, id: &NodeId) -> Vec<Node> {
        let inner = self.inner.read().unwrap();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        if let Some(edges) = inner.in_edges.get(id) {
            for edge in edges {
                if seen.insert(&edge.from) {
                    if let Some(node) = inner.nodes.get(&edge.from) {
                        out.push(node.clone());
                    }
                }
            }
        }
        out
    }

    /// BFS over the undirected projection, up to `degree` hops, source
    /// excluded.
    pub fn related_nodes(&self, id: &NodeId, degree: usize) -> Vec<Node> {
        let inner = self.inner.read().unwrap();
        if !inner.nodes.contains_key(id) || degree == 0 {
            return Vec::new();
        }

        let mut visited: HashSet<NodeId> = HashSet::from([id.clone()]);
        let mut frontier: Vec<NodeId> = vec![id.clone()];
        let mut out = Vec::new();

        for _ in 0..degree {
            let mut next = Vec::new();
            for current in &frontier {
                let neighbors = inner
                    .out_edges
                    .get(current)
                    .into_iter()
                    .flatten()
                    .map(|e| &e.to)
                    .chain(inner.in_edges.get(current).into_iter().flatten().map(|e| &e.from));
                for n in neighbors {
                    if visited.insert(n.clone()) {
                        if let Some(node) = inner.nodes.get(n) {
                            out.push(node.clone());
                        }
                        next.push(n.clone());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }

    /// Shortest path over outgoing edges, endpoints inclusive. Empty when
    /// unreachable or either endpoint is missing.
    pub fn find_path(&self, from: &NodeId, to: &NodeId) -> Vec<NodeId> {
        let inner = self.inner.read().unwrap();
        if !inner.nodes.contains_key(from) || !inner.nodes.contains_key(to) {
            return Vec::new();
        }
        if from == to {
            return vec![from.clone()];
        }

        let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::from([from.clone()]);
        let mut visited: HashSet<NodeId> = HashSet::from([from.clone()]);

        while let Some(current) = queue.pop_front() {
            for edge in inner.out_edges.get(&current).into_iter().flatten() {
                if visited.insert(edge.to.clone()) {
                    prev.insert(edge.to.clone(), current.clone());
                    if &edge.to == to {
                        // Reconstruct back to front.
                        let mut path = vec![to.clone()];
                        let mut cursor = to;
                        while let Some(p) = prev.get(cursor) {
                            path.push(p.clone());
                            cursor = p;
                        }
                        path.reverse();
                        return path;
                    }
                    queue.push_back(edge.to.clone());
                }
            }
        }
        Vec::new()
    }

    // -- persistence --------------------------------------------------------

    pub fn to_json(&self) -> Result<Vec<u8>, GraphError> {
        let inner = self.inner.read().unwrap();
        let mut nodes: Vec<Node> = inner.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<Edge> = inner.out_edges.values().flatten().cloned().collect();
        edges.sort_by(|a, b| (&a.from, &a.to, a.kind as u8).cmp(&(&b.from, &b.to, b.kind as u8)));
        Ok(serde_json::to_vec_pretty(&GraphFile { nodes, edges })?)
    }

    /// Atomic load: parse and validate into a fresh graph, then swap. The
    /// existing contents survive a failed load untouched.
    pub fn load_json(&self, data: &[u8]) -> Result<(), GraphError> {
        let file: GraphFile = serde_json::from_slice(data)?;
        let mut fresh = GraphInner::default();
        for node in file.nodes {
            fresh.add_node(node)?;
        }
        for edge in file.edges {
            fresh.add_edge(edge)?;
        }
        debug!(nodes = fresh.nodes.len(), "graph loaded");
        let mut inner = self.inner.write().unwrap();
        *inner = fresh;
        Ok(())
    }
}

impl GraphInner {
    fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if node.id.is_empty() {
            return Err(GraphError::InvalidNodeId);
        }
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::NodeExists(node.id));
        }
        if let Some(path) = &node.path {
            self.path_index.insert(path.clone(), node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    fn remove_node(&mut self, id: &NodeId) -> Result<(), GraphError> {
        let node = self.nodes.remove(id).ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;

        // Cascade: every edge touching the node disappears from both maps.
        if let Some(edges) = self.out_edges.remove(id) {
            for edge in edges {
                if let Some(rev) = self.in_edges.get_mut(&edge.to) {
                    rev.retain(|e| &e.from != id);
                }
            }
        }
        if let Some(edges) = self.in_edges.remove(id) {
            for edge in edges {
                if let Some(fwd) = self.out_edges.get_mut(&edge.from) {
                    fwd.retain(|e| &e.to != id);
                }
            }
        }

        if let Some(path) = &node.path {
            if self.path_index.get(path) == Some(id) {
                self.path_index.remove(path);
            }
        }
        Ok(())
    }

    fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if edge.from.is_empty() || edge.to.is_empty() {
            return Err(GraphError::InvalidEdge("empty endpoint id".to_string()));
        }
        if !self.nodes.contains_key(&edge.from) {
            return Err(GraphError::NodeNotFound(edge.from));
        }
        if !self.nodes.contains_key(&edge.to) {
            return Err(GraphError::NodeNotFound(edge.to));
        }
        let duplicate = self
            .out_edges
            .get(&edge.from)
            .is_some_and(|edges| edges.iter().any(|e| e.same_triple(&edge)));
        if duplicate {
            return Err(GraphError::EdgeExists { from: edge.from, to: edge.to, kind: edge.kind });
        }
        self.in_edges.entry(edge.to.clone()).or_default().push(edge.clone());
        self.out_edges.entry(edge.from.clone()).or_default().push(edge);
        Ok(())
    }
}
