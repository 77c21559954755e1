//! Graph construction: walk, extract, resolve, merge
//!
//! The pipeline has two parallel phases and one single-writer phase:
//!
//! 1. discovery (parallel walk) collects candidates, sorted by path;
//! 2. extraction (`rayon` over the candidate list) reads and parses each
//!    file, producing raw references and content hashes;
//! 3. registration (sequential) assigns module ids in path order, which
//!    pins source-root precedence and keeps id assignment deterministic;
//! 4. resolution (`rayon` again) turns raw references into per-file edge
//!    batches against the shared intern table;
//! 5. the merge applies every batch, materializes implicit package
//!    ancestors, and injects hook-supplied dependencies.
//!
//! Cancellation is cooperative: workers stop picking up files once the
//! token fires, in-flight parses finish, and the build returns an error
//! instead of a partial graph.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{BuildOptions, Hooks, TestMatcher};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{PysiftError, Result};
use crate::extractor::{scan_source, FileIntel};
use crate::graph::{Graph, GraphMeta};
use crate::hash::{combine_unordered, fnv1a};
use crate::moduleid::{ModuleId, ModuleKind, ModuleTable, RegisterOutcome};
use crate::resolver::{root_namespace, FsProbe, Resolver};
use crate::walker::{self, module_names, SourceCandidate};

/// Build the full module graph for the given roots.
///
/// `roots` seeds the walk when the hooks do not name explicit source
/// roots. Recoverable problems land in the graph's diagnostics; only
/// configuration errors, cancellation, and walk-level failures surface
/// here.
pub fn build_graph(roots: &[PathBuf], hooks: &dyn Hooks, options: &BuildOptions) -> Result<Graph> {
    let (walk_roots, explicit) = effective_roots(roots, hooks);
    let threads = thread_count(options);
    let ignore_patterns = hooks.ignore_patterns();
    let test_matcher = TestMatcher::new(&hooks.test_patterns());

    let mut discovery = walker::discover(
        &walk_roots,
        explicit,
        &ignore_patterns,
        threads,
        &options.cancel,
    )?;
    info!(files = discovery.files.len(), "discovery complete");

    // with explicit roots, registration precedence is configuration order:
    // when two roots expose the same module name the earlier root wins
    if explicit {
        let precedence: std::collections::HashMap<&PathBuf, usize> =
            walk_roots.iter().enumerate().map(|(i, r)| (r, i)).collect();
        discovery.files.sort_by(|a, b| {
            let pa = precedence.get(&a.root).copied().unwrap_or(usize::MAX);
            let pb = precedence.get(&b.root).copied().unwrap_or(usize::MAX);
            pa.cmp(&pb).then_with(|| a.path.cmp(&b.path))
        });
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| PysiftError::Io(io::Error::other(e.to_string())))?;

    // extraction: CPU-bound, one task per file
    let scanned: Vec<ScannedFile> = pool.install(|| {
        discovery
            .files
            .par_iter()
            .map(|cand| scan_one(cand, options))
            .collect()
    });
    if options.cancel.is_cancelled() {
        return Err(PysiftError::Cancelled);
    }

    let summary = summary_hash(
        discovery
            .files
            .iter()
            .zip(&scanned)
            .map(|(cand, s)| (&cand.path, s.content_hash)),
    );

    // registration: single writer, path order
    let table = ModuleTable::new();
    let probe = FsProbe::new();
    let mut diagnostics = discovery.diagnostics;
    let mut registered: Vec<Registered> = Vec::with_capacity(discovery.files.len());

    for (cand, scan) in discovery.files.iter().zip(&scanned) {
        if let Some(message) = &scan.io_error {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::Io,
                &cand.path,
                message.clone(),
            ));
        }
        let Some((spelled, module)) = module_names(&cand.path, &cand.root) else {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::Resolve,
                &cand.path,
                "file does not map to a module name under its package root",
            ));
            continue;
        };
        // a module file sitting next to a package directory of the same
        // name loses, exactly like the language's own finder decides it
        if !is_init_file(&cand.path) && probe.has_package_marker(&cand.path.with_extension("")) {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::ShadowedModule,
                &cand.path,
                format!("module {} is shadowed by the package of the same name", module),
            ));
            continue;
        }
        let id = if scan.intel.ns_pkg_init {
            // pkgutil-style namespace init files share one pathless node
            table.intern_namespace(&module)
        } else {
            match table.register_file(&module, &cand.path, test_matcher.is_test_file(&cand.path)) {
                RegisterOutcome::Registered(id) => id,
                RegisterOutcome::Duplicate { existing, .. } => {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::DuplicateModule,
                        &cand.path,
                        format!(
                            "module {} already provided by {}",
                            module,
                            existing
                                .as_deref()
                                .unwrap_or_else(|| Path::new("<namespace>"))
                                .display()
                        ),
                    ));
                    continue;
                }
            }
        };
        if let Some(message) = &scan.intel.parse_error {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::Parse,
                &cand.path,
                message.clone(),
            ));
        }
        registered.push(Registered {
            id,
            spelled,
            module,
            cand,
            intel: &scan.intel,
        });
    }

    let internal_prefixes: HashSet<String> = registered
        .iter()
        .map(|r| root_namespace(&r.module).to_string())
        .collect();
    let package_roots = package_roots(&walk_roots, explicit, &discovery.files);

    // resolution: parallel, per-file edge batches against the shared table
    let resolver = Resolver::new(
        &table,
        &probe,
        package_roots.clone(),
        internal_prefixes,
        hooks.external_prefixes(),
        hooks.include_typechecking(),
    );
    let resolved: Vec<_> = pool.install(|| {
        registered
            .par_iter()
            .map(|r| {
                if options.cancel.is_cancelled() {
                    return Default::default();
                }
                resolver.resolve_file(&r.spelled, &r.cand.path, r.intel)
            })
            .collect()
    });
    if options.cancel.is_cancelled() {
        return Err(PysiftError::Cancelled);
    }

    // importing a.b.c executes a and a.b on the way down; materialize
    // those edges (and any missing namespace ancestors) once the whole
    // module set is known
    let ancestor_edges = ancestor_edges(&table);

    let meta = GraphMeta {
        source_roots: package_roots,
        ignore_patterns,
        test_patterns: hooks.test_patterns(),
        include_typechecking: hooks.include_typechecking(),
        hook_signature: hooks_signature(hooks),
    };

    // merge: the single writer owns the store from here on
    let mut graph = Graph::new(table.into_inner(), meta, summary);
    graph.diagnostics = diagnostics;
    for (r, res) in registered.iter().zip(resolved) {
        for target in res.targets {
            graph.add_edge(r.id, target);
        }
        if res.hinted {
            graph.mark_hinted(r.id);
        }
        for name in res.unresolved {
            graph.unresolved.entry(name).or_default().insert(r.id);
        }
        graph.diagnostics.extend(res.diagnostics);
    }
    for (from, to) in ancestor_edges {
        graph.add_edge(from, to);
    }

    apply_dynamic_dependencies(&mut graph, hooks.dynamic_dependencies());
    apply_leaf_augmentations(&mut graph, hooks.dynamic_dependencies_at_leaves());

    debug!(
        nodes = graph.node_count(),
        tests = graph.tests().len(),
        "graph complete"
    );
    Ok(graph)
}

/// Hash the current repository state without parsing anything.
///
/// Used to decide whether a loaded graph is still trustworthy (see
/// [`Graph::is_fresh`]); walks and hashes exactly the files a full build
/// would consume.
pub fn scan_summary(roots: &[PathBuf], hooks: &dyn Hooks, options: &BuildOptions) -> Result<u64> {
    let (walk_roots, explicit) = effective_roots(roots, hooks);
    let threads = thread_count(options);
    let discovery = walker::discover(
        &walk_roots,
        explicit,
        &hooks.ignore_patterns(),
        threads,
        &options.cancel,
    )?;
    let hashes: Vec<u64> = discovery
        .files
        .par_iter()
        .map(|cand| fs::read(&cand.path).map_or(0, |bytes| fnv1a(&bytes)))
        .collect();
    Ok(summary_hash(
        discovery.files.iter().zip(hashes).map(|(c, h)| (&c.path, h)),
    ))
}

/// Stable hash of the full hook surface, as the builder sees it
pub fn hooks_signature(hooks: &dyn Hooks) -> u64 {
    let materialized = crate::config::HookConfig {
        source_roots: hooks.source_roots(),
        ignore_patterns: hooks.ignore_patterns(),
        include_typechecking: hooks.include_typechecking(),
        external_prefixes: hooks.external_prefixes(),
        test_patterns: hooks.test_patterns(),
        dynamic_dependencies: hooks.dynamic_dependencies(),
        dynamic_dependencies_at_leaves: hooks.dynamic_dependencies_at_leaves(),
    };
    materialized.signature_hash()
}

struct ScannedFile {
    intel: FileIntel,
    content_hash: u64,
    io_error: Option<String>,
}

struct Registered<'a> {
    id: ModuleId,
    /// Module path with a trailing `.__init__` retained
    spelled: String,
    module: String,
    cand: &'a SourceCandidate,
    intel: &'a FileIntel,
}

fn scan_one(cand: &SourceCandidate, options: &BuildOptions) -> ScannedFile {
    if options.cancel.is_cancelled() {
        return ScannedFile {
            intel: FileIntel::default(),
            content_hash: 0,
            io_error: None,
        };
    }
    let bytes = match fs::read(&cand.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return ScannedFile {
                intel: FileIntel::default(),
                content_hash: 0,
                io_error: Some(e.to_string()),
            }
        }
    };
    let content_hash = fnv1a(&bytes);
    match String::from_utf8(bytes) {
        Ok(source) => ScannedFile {
            intel: scan_source(&cand.path, &source, options.parse_timeout),
            content_hash,
            io_error: None,
        },
        Err(_) => {
            let mut intel = FileIntel {
                content_hash,
                ..Default::default()
            };
            intel.parse_error = Some("source is not valid UTF-8".to_string());
            ScannedFile {
                intel,
                content_hash,
                io_error: None,
            }
        }
    }
}

fn effective_roots(roots: &[PathBuf], hooks: &dyn Hooks) -> (Vec<PathBuf>, bool) {
    let configured = hooks.source_roots();
    let (roots, explicit) = if configured.is_empty() {
        (roots.to_vec(), false)
    } else {
        (configured, true)
    };
    // normalized roots keep stored paths comparable with query paths
    (roots.iter().map(|r| walker::clean_path(r)).collect(), explicit)
}

fn thread_count(options: &BuildOptions) -> usize {
    options.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

fn is_init_file(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|f| f.to_str()),
        Some("__init__.py" | "__init__.pyi" | "__init__.pyx")
    )
}

/// Package roots in precedence order: configured roots as given, inferred
/// roots in first-encountered (path-sorted) order
fn package_roots(
    walk_roots: &[PathBuf],
    explicit: bool,
    files: &[SourceCandidate],
) -> Vec<PathBuf> {
    if explicit {
        return walk_roots.to_vec();
    }
    let mut seen = HashSet::new();
    let mut roots = Vec::new();
    for cand in files {
        if seen.insert(cand.root.clone()) {
            roots.push(cand.root.clone());
        }
    }
    roots
}

fn summary_hash<'a>(items: impl Iterator<Item = (&'a PathBuf, u64)>) -> u64 {
    let mut acc = 0u64;
    for (path, content_hash) in items {
        let item = fnv1a(path.to_string_lossy().as_bytes()) ^ content_hash.rotate_left(1);
        acc = combine_unordered(acc, item);
    }
    acc
}

/// One edge per module to its immediate parent package. Grandparents are
/// covered transitively because every created parent is itself visited as
/// the table grows.
fn ancestor_edges(table: &ModuleTable) -> Vec<(ModuleId, ModuleId)> {
    let mut edges = Vec::new();
    let mut id: ModuleId = 0;
    while (id as usize) < table.len() {
        let name = table.name_of(id);
        if let Some((parent, _)) = name.rsplit_once('.') {
            let parent_id = match table.kind_of(id) {
                ModuleKind::External => table.intern_external(parent),
                _ => table.intern_namespace(parent),
            };
            edges.push((id, parent_id));
        }
        id += 1;
    }
    edges
}

/// Inject hook-supplied dependencies as plain edges, before any closure is
/// computed. Keys may be module names or file paths; payloads may name a
/// module, a member of one (the parent is used), or a `prefix.*` wildcard.
fn apply_dynamic_dependencies(graph: &mut Graph, deps: BTreeMap<String, BTreeSet<String>>) {
    for (key, payloads) in deps {
        let owner = graph
            .id_for_path(Path::new(&key))
            .or_else(|| graph.id_for_name(&key));
        let Some(owner) = owner else {
            warn!(key = %key, "dynamic dependency key not in graph");
            graph.push_diagnostic(Diagnostic::global(
                DiagnosticKind::Resolve,
                format!("dynamic dependency key {} not in graph", key),
            ));
            continue;
        };
        for payload in payloads {
            if let Some(prefix) = payload.strip_suffix(".*") {
                let children: Vec<ModuleId> = graph
                    .modules()
                    .filter(|(_, info)| {
                        info.name
                            .strip_prefix(prefix)
                            .and_then(|rest| rest.strip_prefix('.'))
                            .is_some_and(|child| !child.contains('.'))
                    })
                    .map(|(id, _)| id)
                    .collect();
                debug!(prefix, count = children.len(), "dynamic wildcard dependency");
                for child in children {
                    graph.add_edge(owner, child);
                }
            } else if let Some(id) = name_or_parent(graph, &payload) {
                graph.add_edge(owner, id);
            }
        }
    }
}

fn apply_leaf_augmentations(graph: &mut Graph, deps: BTreeMap<String, BTreeSet<String>>) {
    for (key, extras) in deps {
        let Some(trigger) = graph.id_for_name(&key) else {
            warn!(key = %key, "leaf augmentation trigger not in graph");
            continue;
        };
        let ids: BTreeSet<ModuleId> = extras
            .iter()
            .filter_map(|name| name_or_parent(graph, name))
            .collect();
        if !ids.is_empty() {
            graph.add_leaf_augmentation(trigger, ids);
        }
    }
}

/// A payload may name a value inside a module; fall back to the parent
fn name_or_parent(graph: &Graph, name: &str) -> Option<ModuleId> {
    graph.id_for_name(name).or_else(|| {
        let (parent, _) = name.rsplit_once('.')?;
        graph.id_for_name(parent)
    })
}
