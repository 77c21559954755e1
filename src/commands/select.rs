//! `pysift select`: print the test files affected by a change

use std::collections::BTreeSet;
use std::io::{self, BufRead};
use std::path::PathBuf;

use crate::cli::SelectArgs;
use crate::error::Result;
use crate::selector::{select, select_modules, Selection};

use super::{hooks_from, load_or_build, options_from};

pub fn run(args: &SelectArgs, verbose: bool) -> Result<()> {
    let hooks = hooks_from(&args.hook)?;
    let options = options_from(&args.build);
    let graph = load_or_build(&args.path, &args.graph, &hooks, &options, verbose)?;

    let mut files = args.files.clone();
    if args.stdin {
        for line in io::stdin().lock().lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                files.push(PathBuf::from(line));
            }
        }
    }

    let by_files = select(&graph, &files);
    let by_modules = select_modules(&graph, &args.modules);
    let merged = merge(by_files, by_modules);

    for diagnostic in &merged.diagnostics {
        eprintln!("{}", diagnostic);
    }
    if merged.full_suite {
        eprintln!("selection fell back to the full test suite");
    }
    for test in &merged.tests {
        println!("{}", test.display());
    }
    if verbose {
        eprintln!("{} test file(s) selected", merged.tests.len());
    }
    Ok(())
}

fn merge(a: Selection, b: Selection) -> Selection {
    let mut diagnostics = a.diagnostics;
    diagnostics.extend(b.diagnostics);
    let tests: BTreeSet<PathBuf> = a.tests.into_iter().chain(b.tests).collect();
    Selection {
        tests: tests.into_iter().collect(),
        full_suite: a.full_suite || b.full_suite,
        diagnostics,
    }
}
