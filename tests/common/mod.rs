//! Shared helpers for integration tests

// not every test binary uses every helper
#![allow(dead_code)]

pub mod test_repo;

pub use test_repo::TestRepo;

use pysift::{Graph, ModuleId};

/// Resolve a module name, panicking with context on a miss
pub fn id(graph: &Graph, name: &str) -> ModuleId {
    graph
        .id_for_name(name)
        .unwrap_or_else(|| panic!("module {} not in graph", name))
}

/// Direct edge presence by module name
pub fn has_edge(graph: &Graph, from: &str, to: &str) -> bool {
    let (f, t) = (id(graph, from), id(graph, to));
    graph.successors(f).contains(&t)
}

/// Names of the transitive successors of a module
pub fn closure_out_names(graph: &Graph, from: &str) -> Vec<String> {
    graph
        .closure_out(id(graph, from))
        .into_iter()
        .map(|m| graph.module(m).name.clone())
        .collect()
}
