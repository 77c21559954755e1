//! CLI command handlers

pub mod graph;
pub mod select;
pub mod validate;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::build::{build_graph, scan_summary};
use crate::cli::BuildArgs;
use crate::config::{BuildOptions, HookConfig};
use crate::error::Result;
use crate::graph::Graph;
use crate::serializer::load_graph;

fn hooks_from(hook: &Option<PathBuf>) -> Result<HookConfig> {
    match hook {
        Some(path) => HookConfig::from_file(path),
        None => Ok(HookConfig::default()),
    }
}

fn options_from(build: &BuildArgs) -> BuildOptions {
    BuildOptions {
        jobs: build.jobs,
        parse_timeout: build.parse_timeout_ms.map(Duration::from_millis),
        cancel: Default::default(),
    }
}

/// Load a saved graph when one is given and still matches the tree;
/// otherwise build from scratch
fn load_or_build(
    root: &Path,
    graph_file: &Option<PathBuf>,
    hooks: &HookConfig,
    options: &BuildOptions,
    verbose: bool,
) -> Result<Graph> {
    let roots = vec![root.to_path_buf()];
    if let Some(path) = graph_file {
        let graph = load_graph(path)?;
        let current = scan_summary(&roots, hooks, options)?;
        let same_hooks = graph.meta().hook_signature == crate::build::hooks_signature(hooks);
        if graph.is_fresh(current) && same_hooks {
            if verbose {
                eprintln!("Loaded graph from {} ({} nodes)", path.display(), graph.node_count());
            }
            return Ok(graph);
        }
        let reason = if same_hooks { "tree" } else { "hook configuration" };
        eprintln!(
            "Graph file {} is stale for the current {}; rebuilding",
            path.display(),
            reason
        );
    }
    build_graph(&roots, hooks, options)
}
