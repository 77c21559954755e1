//! Resolution of raw import references to canonical module ids
//!
//! Raw references leave the extractor as spelled in source. This module
//! turns them into edges against the intern table, applying the package
//! rules of the host language:
//!
//! - absolute names resolve against the configured source roots in
//!   configuration order; the first root that can supply a name wins
//! - relative references pop `level` components off the importing module's
//!   spelled path; popping past the root is a reported error, not a drop
//! - `from pkg import name` prefers the submodule `pkg.name` when one
//!   exists on disk, and falls back to `pkg` for plain attributes
//! - wildcards expand to the direct submodules present at expansion time
//! - anything that no root can supply becomes an external node, unless its
//!   top-level name is internal, in which case it lands in the unresolved
//!   index
//!
//! Filesystem checks are case-sensitive even on case-preserving
//! filesystems (directory listings are consulted, not just `exists`),
//! matching how the language's own finder behaves.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::extractor::{FileIntel, RawImportKind};
use crate::moduleid::{ModuleId, ModuleTable};

/// Cached, case-sensitive filesystem probe.
///
/// readdir is expensive; listings are cached for the lifetime of a build.
/// The cache also pins wildcard expansion to a single snapshot: a
/// submodule appearing mid-build cannot change an expansion that already
/// happened.
#[derive(Debug, Default)]
pub struct FsProbe {
    listings: RwLock<HashMap<PathBuf, Option<Arc<BTreeSet<String>>>>>,
}

impl FsProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted names of the direct children of `dir`; `None` if it is not a
    /// readable directory
    pub fn children(&self, dir: &Path) -> Option<Arc<BTreeSet<String>>> {
        if let Some(cached) = self.listings.read().get(dir) {
            return cached.clone();
        }
        // the empty path denotes the current-directory source root
        let read_target = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let listing = fs::read_dir(read_target).ok().map(|entries| {
            let mut names = BTreeSet::new();
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    names.insert(name.to_string());
                }
            }
            Arc::new(names)
        });
        self.listings
            .write()
            .insert(dir.to_path_buf(), listing.clone());
        listing
    }

    /// Does `dir/name` exist with exactly this casing?
    pub fn exists_case_sensitive(&self, dir: &Path, name: &str) -> bool {
        // fast path: spare the readdir when even a case-blind probe misses
        if !fs::exists(dir.join(name)).unwrap_or(false) {
            return false;
        }
        self.children(dir)
            .map_or(false, |names| names.contains(name))
    }

    /// Case-sensitive directory check
    pub fn dir_exists(&self, path: &Path) -> bool {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
        else {
            return path.is_dir();
        };
        self.exists_case_sensitive(parent, name) && path.is_dir()
    }

    /// Does `dir` carry a package marker file?
    pub fn has_package_marker(&self, dir: &Path) -> bool {
        self.exists_case_sensitive(dir, "__init__.py")
            || self.exists_case_sensitive(dir, "__init__.pyi")
            || self.exists_case_sensitive(dir, "__init__.pyx")
    }
}

/// Result of resolving one file's references
#[derive(Debug, Default)]
pub struct ResolvedImports {
    /// Deduplicated edge targets
    pub targets: BTreeSet<ModuleId>,
    /// Parents of internal-looking names that failed to resolve
    pub unresolved: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// Whether any reference sat under an always-false hint guard
    pub hinted: bool,
}

/// Shared resolution context for one build
pub struct Resolver<'a> {
    table: &'a ModuleTable,
    probe: &'a FsProbe,
    /// Package roots in precedence order
    roots: Vec<PathBuf>,
    /// Top-level names owned by the repository
    internal_prefixes: HashSet<String>,
    external_prefixes: Vec<String>,
    include_typechecking: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(
        table: &'a ModuleTable,
        probe: &'a FsProbe,
        roots: Vec<PathBuf>,
        internal_prefixes: HashSet<String>,
        external_prefixes: Vec<String>,
        include_typechecking: bool,
    ) -> Self {
        Self {
            table,
            probe,
            roots,
            internal_prefixes,
            external_prefixes,
            include_typechecking,
        }
    }

    /// Resolve every raw reference of one file into edges
    pub fn resolve_file(&self, spelled: &str, path: &Path, intel: &FileIntel) -> ResolvedImports {
        let mut out = ResolvedImports::default();
        for raw in &intel.imports {
            if raw.typechecking && !self.include_typechecking {
                continue;
            }
            if raw.hinted {
                out.hinted = true;
            }
            match &raw.kind {
                RawImportKind::Absolute | RawImportKind::Reflective => {
                    self.add_name(&raw.payload, path, raw.line, &mut out);
                }
                RawImportKind::Relative { level } => {
                    match relative_target(spelled, *level, &raw.payload) {
                        Some(target) => self.add_name(&target, path, raw.line, &mut out),
                        None => out.diagnostics.push(Diagnostic::new(
                            DiagnosticKind::Resolve,
                            path,
                            format!(
                                "line {}: relative import (level {}) escapes the package root",
                                raw.line, level
                            ),
                        )),
                    }
                }
                RawImportKind::Wildcard { level } => {
                    let prefix = if *level > 0 {
                        match relative_target(spelled, *level, &raw.payload) {
                            Some(t) => t,
                            None => {
                                out.diagnostics.push(Diagnostic::new(
                                    DiagnosticKind::Resolve,
                                    path,
                                    format!(
                                        "line {}: relative import (level {}) escapes the package root",
                                        raw.line, level
                                    ),
                                ));
                                continue;
                            }
                        }
                    } else {
                        raw.payload.clone()
                    };
                    self.expand_wildcard(&prefix, path, raw.line, &mut out);
                }
            }
        }
        out
    }

    /// Resolve a dotted name and record the resulting edge (if any)
    fn add_name(&self, name: &str, path: &Path, line: usize, out: &mut ResolvedImports) {
        if name.is_empty() {
            return;
        }
        if let Some(prefix) = self.matching_external_prefix(name) {
            out.targets.insert(self.table.intern_external(prefix));
            return;
        }
        if let Some(id) = self.probe_internal(name) {
            out.targets.insert(id);
            return;
        }
        // the final component may be an attribute rather than a module
        if let Some((parent, _)) = name.rsplit_once('.') {
            if let Some(id) = self.probe_internal(parent) {
                out.targets.insert(id);
                return;
            }
        }
        let top = root_namespace(name);
        if self.internal_prefixes.contains(top) {
            // looks like ours but nothing on disk backs it: record the
            // parent so one unresolved module does not spam one entry per
            // imported symbol
            let recorded = match name.rsplit_once('.') {
                Some((parent, _)) => parent.to_string(),
                None => name.to_string(),
            };
            debug!(name, file = %path.display(), "unresolved internal import");
            out.diagnostics.push(Diagnostic::new(
                DiagnosticKind::Resolve,
                path,
                format!("line {}: unresolved internal import {}", line, name),
            ));
            out.unresolved.insert(recorded);
        } else {
            out.targets.insert(self.table.intern_external(name));
        }
    }

    /// Find an internal module for a dotted name: registered file,
    /// unregistered stub on disk, or namespace directory
    fn probe_internal(&self, name: &str) -> Option<ModuleId> {
        if let Some(id) = self.table.id_for_name(name) {
            return Some(id);
        }
        let rel: PathBuf = name.split('.').collect();
        for root in &self.roots {
            let base = root.join(&rel);
            for marker in ["__init__.py", "__init__.pyi", "__init__.pyx"] {
                if let Some(id) = self.table.id_for_path(&base.join(marker)) {
                    return Some(id);
                }
            }
            for ext in ["py", "pyx", "pyi"] {
                if let Some(id) = self.table.id_for_path(&base.with_extension(ext)) {
                    return Some(id);
                }
            }
            // a directory with submodules but no marker: namespace package
            if self.probe.dir_exists(&base) {
                return Some(self.table.intern_namespace(name));
            }
        }
        None
    }

    /// Expand `from <prefix> import *` to the submodules present on disk.
    ///
    /// An expansion deliberately behaves as if `__all__` listed every
    /// submodule: that can only over-approximate, never miss a dependency.
    fn expand_wildcard(&self, prefix: &str, path: &Path, line: usize, out: &mut ResolvedImports) {
        if prefix.is_empty() {
            return;
        }
        let rel: PathBuf = prefix.split('.').collect();
        for root in &self.roots {
            let dir = root.join(&rel);
            if !self.probe.dir_exists(&dir) {
                continue;
            }
            let Some(children) = self.probe.children(&dir) else {
                continue;
            };
            for child in children.iter() {
                let sub = if self.probe.dir_exists(&dir.join(child)) {
                    if self.probe.has_package_marker(&dir.join(child)) {
                        Some(child.as_str())
                    } else {
                        None
                    }
                } else {
                    match child
                        .strip_suffix(".py")
                        .or_else(|| child.strip_suffix(".pyi"))
                        .or_else(|| child.strip_suffix(".pyx"))
                    {
                        Some(stem) if stem != "__init__" => Some(stem),
                        _ => None,
                    }
                };
                if let Some(sub) = sub {
                    let full = format!("{}.{}", prefix, sub);
                    if let Some(id) = self.probe_internal(&full) {
                        out.targets.insert(id);
                    }
                }
            }
            debug!(prefix, file = %path.display(), "expanded wildcard");
            return;
        }
        if self.probe_internal(prefix).is_some() {
            // star over a plain module: the base reference already covers it
            return;
        }
        if self.internal_prefixes.contains(root_namespace(prefix)) {
            out.diagnostics.push(Diagnostic::new(
                DiagnosticKind::Resolve,
                path,
                format!("line {}: wildcard import from unknown package {}", line, prefix),
            ));
            out.unresolved.insert(prefix.to_string());
        } else {
            // external wildcard collapses to the package itself
            out.targets.insert(self.table.intern_external(prefix));
        }
    }

    fn matching_external_prefix(&self, name: &str) -> Option<&str> {
        let mut best: Option<&str> = None;
        for prefix in &self.external_prefixes {
            let hit = name == prefix
                || (name.len() > prefix.len()
                    && name.starts_with(prefix.as_str())
                    && name.as_bytes()[prefix.len()] == b'.');
            if hit && best.map_or(true, |b| prefix.len() > b.len()) {
                best = Some(prefix);
            }
        }
        best
    }
}

/// First dotted component of a module name
pub fn root_namespace(name: &str) -> &str {
    match name.find('.') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Ancestor of the spelled module path at the given depth, joined with the
/// payload. `None` when the level pops past the package root.
fn relative_target(spelled: &str, level: u32, payload: &str) -> Option<String> {
    let mut idx = spelled.len();
    for _ in 0..level {
        idx = spelled[..idx].rfind('.')?;
    }
    let ancestor = &spelled[..idx];
    if payload.is_empty() {
        Some(ancestor.to_string())
    } else {
        Some(format!("{}.{}", ancestor, payload))
    }
}
