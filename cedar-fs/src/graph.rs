//! A small DAG with cycle-detecting topological sort, used to order
//! backup actions (including third-party extensions that inject new
//! actions with before/after dependencies).
//!
//! Grounded on `original_source/util.py::DirectedGraph`/`_Vertex`: a
//! synthetic start vertex gets an edge to every user-created vertex so
//! depth-first search reaches all of them, and a back-edge to a vertex
//! that is "discovered" but not yet "explored" is a cycle.

use std::collections::HashMap;

use crate::error::{FsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Undiscovered,
    Discovered,
    Explored,
}

/// A directed graph over named vertices.
///
/// Vertex 0 is reserved as the synthetic "start" vertex (name `None`) and
/// is never returned from [`DirectedGraph::topological_sort`].
pub struct DirectedGraph {
    name: String,
    vertex_names: Vec<Option<String>>,
    index_of: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

const START: usize = 0;

impl DirectedGraph {
    /// Creates a new, empty graph (containing only the synthetic start
    /// vertex) identified by `name` (used only in error messages).
    pub fn new(name: impl Into<String>) -> Self {
        DirectedGraph {
            name: name.into(),
            vertex_names: vec![None],
            index_of: HashMap::new(),
            edges: vec![Vec::new()],
        }
    }

    /// Creates a new vertex with a non-empty name. Automatically gets an
    /// edge from the synthetic start vertex.
    pub fn create_vertex(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(FsError::InvalidArgument(
                "vertex name must not be empty".to_string(),
            ));
        }
        if self.index_of.contains_key(&name) {
            return Err(FsError::InvalidArgument(format!(
                "vertex [{name}] already exists in graph [{}]",
                self.name
            )));
        }

        let index = self.vertex_names.len();
        self.vertex_names.push(Some(name.clone()));
        self.index_of.insert(name, index);
        self.edges.push(Vec::new());
        self.edges[START].push(index);

        Ok(())
    }

    /// Creates a directed edge `from -> to`. Both vertices must already
    /// exist.
    pub fn create_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let from_idx = *self.index_of.get(from).ok_or_else(|| {
            FsError::InvalidArgument(format!("vertex [{from}] does not exist in graph"))
        })?;
        let to_idx = *self.index_of.get(to).ok_or_else(|| {
            FsError::InvalidArgument(format!("vertex [{to}] does not exist in graph"))
        })?;

        if !self.edges[from_idx].contains(&to_idx) {
            self.edges[from_idx].push(to_idx);
        }

        Ok(())
    }

    /// Runs depth-first search from the synthetic start vertex and returns
    /// vertex names in reverse finish order (a valid topological order),
    /// omitting the synthetic start.
    ///
    /// Fails naming both endpoints of the first back-edge found if the
    /// graph contains a cycle reachable from the start vertex.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let mut color = vec![Color::Undiscovered; self.vertex_names.len()];
        let mut finish_order = Vec::with_capacity(self.vertex_names.len());

        self.visit(START, &mut color, &mut finish_order)?;

        finish_order.reverse();
        Ok(finish_order
            .into_iter()
            .filter_map(|idx| self.vertex_names[idx].clone())
            .collect())
    }

    fn visit(
        &self,
        vertex: usize,
        color: &mut [Color],
        finish_order: &mut Vec<usize>,
    ) -> Result<()> {
        color[vertex] = Color::Discovered;

        for &next in &self.edges[vertex] {
            match color[next] {
                Color::Undiscovered => self.visit(next, color, finish_order)?,
                Color::Discovered => {
                    let from = self.display_name(vertex);
                    let to = self.display_name(next);
                    return Err(FsError::InvalidArgument(format!(
                        "graph [{}] contains a cycle: [{from}] -> [{to}]",
                        self.name
                    )));
                }
                Color::Explored => {}
            }
        }

        color[vertex] = Color::Explored;
        finish_order.push(vertex);
        Ok(())
    }

    fn display_name(&self, idx: usize) -> String {
        self.vertex_names[idx]
            .clone()
            .unwrap_or_else(|| "<start>".to_string())
    }
}
