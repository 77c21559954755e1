//! `pysift graph`: build the import graph, optionally persisting it

use std::fs::File;
use std::io::BufWriter;

use crate::build::build_graph;
use crate::cli::GraphArgs;
use crate::error::Result;
use crate::serializer::save_graph;

use super::{hooks_from, options_from};

pub fn run(args: &GraphArgs, verbose: bool) -> Result<()> {
    let hooks = hooks_from(&args.hook)?;
    let options = options_from(&args.build);
    let graph = build_graph(&[args.path.clone()], &hooks, &options)?;

    eprintln!(
        "graph: {} modules, {} test files, {} diagnostics",
        graph.node_count(),
        graph.tests().len(),
        graph.diagnostics().len()
    );
    if verbose {
        for diagnostic in graph.diagnostics() {
            eprintln!("  {}", diagnostic);
        }
        for (name, wanted_by) in graph.unresolved() {
            eprintln!("  unresolved: {} (wanted by {} modules)", name, wanted_by.len());
        }
    }

    if let Some(path) = &args.dump {
        let mut w = BufWriter::new(File::create(path)?);
        graph.dump_text(&mut w)?;
        eprintln!("dump written to {}", path.display());
    }
    if let Some(path) = &args.graph {
        save_graph(&graph, path)?;
        eprintln!("graph written to {}", path.display());
    }
    Ok(())
}
