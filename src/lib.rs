//! pysift: import-graph driven test selection for Python repositories
//!
//! Given a repository of Python sources and a set of modified files,
//! pysift answers one question: which test files could plausibly behave
//! differently because of those modifications? It does so with a static
//! import graph:
//!
//! - a parallel walker discovers sources under the configured roots
//! - a tree-sitter based extractor pulls every import reference out of
//!   every file, at any nesting depth
//! - a resolver maps references to canonical dotted module names,
//!   honoring relative imports, wildcards, and namespace packages
//! - a graph store answers forward and reverse transitive-closure queries
//! - a serializer persists the graph in a compact versioned binary form
//! - a validator cross-checks the static graph against a recorded trace
//!   of what a real loader pass actually imported
//!
//! # Example
//!
//! ```ignore
//! use pysift::{build_graph, select, BuildOptions, DefaultHooks};
//! use std::path::PathBuf;
//!
//! let graph = build_graph(
//!     &[PathBuf::from(".")],
//!     &DefaultHooks,
//!     &BuildOptions::default(),
//! )?;
//! let selection = select(&graph, &[PathBuf::from("pkg/core.py")]);
//! for test in selection.tests {
//!     println!("{}", test.display());
//! }
//! ```

pub mod build;
pub mod cli;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod graph;
mod hash;
pub mod moduleid;
pub mod resolver;
pub mod selector;
pub mod serializer;
pub mod validator;
pub mod walker;

// Re-export the invocation surface
pub use build::{build_graph, scan_summary};
pub use cli::{Cli, Commands};
pub use config::{BuildOptions, CancelToken, DefaultHooks, HookConfig, Hooks};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{PysiftError, Result};
pub use graph::{Graph, GraphMeta};
pub use moduleid::{ModuleId, ModuleInfo, ModuleKind};
pub use selector::{select, select_modules, Selection};
pub use serializer::{load_graph, save_graph};
pub use validator::{validate, TraceEvent, TraceLog, ValidationMode, ValidationReport};
