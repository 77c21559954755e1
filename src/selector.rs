//! The selection engine: changed files in, ordered test files out
//!
//! Each changed file is resolved to its node and the union of reverse
//! closures is intersected with the registered test set. A changed file
//! that no longer maps to any node (deleted, renamed, never scanned)
//! makes the selection untrustworthy, so the whole suite is returned
//! instead, with a diagnostic saying why.

use std::path::PathBuf;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::graph::{AffectedTests, Graph};

/// Result of a selection query
#[derive(Debug, Default)]
pub struct Selection {
    /// Test files to run, sorted by path ascending
    pub tests: Vec<PathBuf>,
    /// True when an unresolved changed file forced the full suite
    pub full_suite: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Select the test files affected by a set of changed file paths.
///
/// An empty change set selects nothing; changing every source file selects
/// every registered test.
pub fn select(graph: &Graph, changed: &[PathBuf]) -> Selection {
    if changed.is_empty() {
        return Selection::default();
    }
    finish(graph, graph.affected_tests(changed))
}

/// Like [`select`], with changes named by module instead of path
pub fn select_modules(graph: &Graph, changed: &[String]) -> Selection {
    if changed.is_empty() {
        return Selection::default();
    }
    finish(graph, graph.affected_tests_by_modules(changed))
}

fn finish(graph: &Graph, affected: AffectedTests) -> Selection {
    let mut selection = Selection::default();
    if !affected.unmatched.is_empty() {
        for path in &affected.unmatched {
            selection.diagnostics.push(Diagnostic::new(
                DiagnosticKind::Select,
                path.clone(),
                "changed file does not map to any module; running the full suite",
            ));
        }
        selection.full_suite = true;
        selection.tests = all_test_paths(graph);
        return selection;
    }
    selection.tests = affected
        .tests
        .iter()
        .filter_map(|&id| graph.module(id).path.clone())
        .collect();
    selection.tests.sort();
    selection
}

fn all_test_paths(graph: &Graph) -> Vec<PathBuf> {
    let mut tests: Vec<PathBuf> = graph
        .tests()
        .iter()
        .filter_map(|&id| graph.module(id).path.clone())
        .collect();
    tests.sort();
    tests
}
