//! The NFA graph
//!
//! A directed multigraph with ordered adjacency. Vertices are plain `u32`
//! descriptors into an arena; each carries its entering byte predicate,
//! an optional pattern label, and a match flag. Labels live on states,
//! not edges (Glushkov-style): an edge `u -> v` means "after satisfying
//! v's predicate, control is at v".
//!
//! Edge order is semantically load-bearing: the out-list order of a vertex
//! is alternation priority, leftmost child first. Passes that rebuild
//! graphs must preserve it. Vertex deletion is not supported; compiler
//! passes copy into fresh graphs instead.

use crate::instruction::UNSET;
use crate::transition::Transition;
use std::fmt::Write as _;

/// Vertex descriptor
pub type VertexId = u32;

/// Per-vertex payload
#[derive(Debug, Clone)]
pub struct VertexInfo {
    /// Byte predicate consumed to enter this vertex; None only for vertex 0
    pub trans: Option<Transition>,
    /// Pattern label, or UNSET
    pub label: u32,
    /// True if reaching this vertex completes a match
    pub is_match: bool,
}

impl VertexInfo {
    fn start() -> Self {
        Self {
            trans: None,
            label: UNSET,
            is_match: false,
        }
    }
}

/// Directed multigraph with ordered adjacency and per-vertex payloads
#[derive(Debug, Clone, Default)]
pub struct Graph {
    verts: Vec<VertexInfo>,
    out_edges: Vec<Vec<VertexId>>,
    in_edges: Vec<Vec<VertexId>>,
}

impl Graph {
    /// A graph containing only the start sentinel (vertex 0)
    pub fn new() -> Self {
        Self {
            verts: vec![VertexInfo::start()],
            out_edges: vec![Vec::new()],
            in_edges: vec![Vec::new()],
        }
    }

    /// Add a vertex carrying `trans`; returns its descriptor
    pub fn add_vertex(&mut self, trans: Transition) -> VertexId {
        let v = self.verts.len() as VertexId;
        self.verts.push(VertexInfo {
            trans: Some(trans),
            label: UNSET,
            is_match: false,
        });
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        v
    }

    /// Append an edge `u -> v` to the end of u's out-list and v's in-list.
    ///
    /// Duplicate edges are permitted at this level; the NFA builder's
    /// patching is responsible for not introducing parallel edges.
    pub fn add_edge(&mut self, u: VertexId, v: VertexId) {
        self.out_edges[u as usize].push(v);
        self.in_edges[v as usize].push(u);
    }

    /// Append `u -> v` unless it is already present
    pub fn add_edge_dedup(&mut self, u: VertexId, v: VertexId) {
        if !self.out_edges[u as usize].contains(&v) {
            self.add_edge(u, v);
        }
    }

    /// True if the edge `u -> v` exists
    pub fn has_edge(&self, u: VertexId, v: VertexId) -> bool {
        self.out_edges[u as usize].contains(&v)
    }

    /// Number of vertices
    pub fn num_vertices(&self) -> usize {
        self.verts.len()
    }

    /// Successors of `v` in priority order
    pub fn out_vertices(&self, v: VertexId) -> &[VertexId] {
        &self.out_edges[v as usize]
    }

    /// Predecessors of `v` in edge-insertion order
    pub fn in_vertices(&self, v: VertexId) -> &[VertexId] {
        &self.in_edges[v as usize]
    }

    /// Out-degree of `v`
    pub fn out_degree(&self, v: VertexId) -> usize {
        self.out_edges[v as usize].len()
    }

    /// In-degree of `v`
    pub fn in_degree(&self, v: VertexId) -> usize {
        self.in_edges[v as usize].len()
    }

    /// The i-th successor of `v`
    pub fn out_vertex(&self, v: VertexId, i: usize) -> VertexId {
        self.out_edges[v as usize][i]
    }

    /// Iterate over all vertex descriptors
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> {
        0..self.verts.len() as VertexId
    }

    /// Payload access
    pub fn vertex(&self, v: VertexId) -> &VertexInfo {
        &self.verts[v as usize]
    }

    /// Mutable payload access
    pub fn vertex_mut(&mut self, v: VertexId) -> &mut VertexInfo {
        &mut self.verts[v as usize]
    }

    /// Count of vertices with in-degree above one; these get check indices
    pub fn num_shared_vertices(&self) -> usize {
        self.vertices().filter(|&v| self.in_degree(v) > 1).count()
    }
}

fn dot_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render the graph as Graphviz DOT.
///
/// Match states get a double ring; edges are labeled with the target's
/// predicate and their priority position.
pub fn write_graphviz(graph: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "digraph G {{\n  rankdir=LR;\n  ranksep=equally;\n  node [shape=\"circle\"];"
    );

    for v in graph.vertices() {
        let _ = write!(out, "  {} [label=\"{}\"", v, v);
        if graph.vertex(v).is_match {
            // double ring for match states
            let _ = write!(out, ", peripheries=2");
        }
        let _ = writeln!(out, "];");
    }

    for head in graph.vertices() {
        for (priority, &tail) in graph.out_vertices(head).iter().enumerate() {
            let label = graph
                .vertex(tail)
                .trans
                .as_ref()
                .map(|t| t.display_label())
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {} -> {} [label=\"{}\", taillabel=\"{}\"];",
                head,
                tail,
                dot_escape(&label),
                priority
            );
        }
    }

    let _ = writeln!(out, "}}");
    out
}
