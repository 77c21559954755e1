//! `pysift validate`: diff a recorded import trace against the graph

use crate::cli::ValidateArgs;
use crate::error::Result;
use crate::validator::{validate, TraceLog, ValidationMode};

use super::{hooks_from, load_or_build, options_from};

pub fn run(args: &ValidateArgs, verbose: bool) -> Result<()> {
    let hooks = hooks_from(&args.hook)?;
    let options = options_from(&args.build);
    let graph = load_or_build(&args.path, &args.graph, &hooks, &options, verbose)?;

    let trace = TraceLog::from_jsonl(&args.trace)?;
    let mode: ValidationMode = args.mode.into();
    let report = validate(&graph, trace.events, mode);

    for diagnostic in &report.diagnostics {
        let hint = if diagnostic.hinted {
            " (importer already carries hint-guarded imports)"
        } else {
            ""
        };
        eprintln!(
            "missing: {} -> {}{}",
            diagnostic.importer, diagnostic.imported, hint
        );
    }
    eprintln!(
        "validated {} recorded import(s), {} missing from the static graph",
        report.checked,
        report.diagnostics.len()
    );
    report.enforce(mode)
}
