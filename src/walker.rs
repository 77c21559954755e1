//! Parallel source discovery
//!
//! Walks the configured roots with the `ignore` crate's parallel walker,
//! emitting one candidate per Python source file together with the package
//! root that owns it. Symlinks are followed with the walker's built-in
//! loop detection, so a link is traversed at most once per target.
//!
//! Stub (`.pyi`) and native-extension (`.pyx`) sources are picked up only
//! when no sibling `.py` exists; `.pyx` wins over `.pyi`. This keeps
//! generated and native modules visible in the graph without ever
//! double-registering a module.

use std::fs;
use std::path::{Component, Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::{WalkBuilder, WalkState};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::CancelToken;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{PysiftError, Result};

/// A discovered source file and the package root that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    pub path: PathBuf,
    pub root: PathBuf,
}

/// Result of a discovery pass: candidates sorted by path, plus any
/// recoverable walk problems
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<SourceCandidate>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Walk `roots` and collect every Python source candidate.
///
/// When `explicit_roots` is true the walk roots are source roots: each
/// file's package root is the walk root it was found under. Otherwise the
/// package root is inferred per file as the nearest ancestor directory
/// that carries no package marker.
///
/// Unreadable entries become [`DiagnosticKind::Io`] diagnostics and the
/// walk continues. The output ordering is stable across runs: candidates
/// are sorted by path before being handed downstream.
pub fn discover(
    roots: &[PathBuf],
    explicit_roots: bool,
    ignore_patterns: &[String],
    threads: usize,
    cancel: &CancelToken,
) -> Result<Discovery> {
    if roots.is_empty() {
        return Err(PysiftError::NoRoots);
    }

    let files = Mutex::new(Vec::new());
    let diagnostics = Mutex::new(Vec::new());

    for root in roots {
        // the current-directory root is stored as "" (see [`clean_path`]);
        // the walker itself still needs a real path to open
        let walk_target = if root.as_os_str().is_empty() {
            Path::new(".")
        } else {
            root.as_path()
        };
        let mut builder = WalkBuilder::new(walk_target);
        // gitignore handling is deliberately off: repositories routinely
        // ignore files that are nonetheless committed and imported
        builder
            .standard_filters(false)
            .hidden(true)
            .follow_links(true)
            .threads(threads);

        if !ignore_patterns.is_empty() {
            let mut overrides = OverrideBuilder::new(walk_target);
            for pattern in ignore_patterns {
                overrides
                    .add(&format!("!{}", pattern))
                    .map_err(|e| PysiftError::Config {
                        path: root.clone(),
                        message: format!("bad ignore pattern {:?}: {}", pattern, e),
                    })?;
            }
            let overrides = overrides.build().map_err(|e| PysiftError::Config {
                path: root.clone(),
                message: format!("bad ignore patterns: {}", e),
            })?;
            builder.overrides(overrides);
        }

        builder.build_parallel().run(|| {
            let files = &files;
            let diagnostics = &diagnostics;
            let cancel = cancel.clone();
            Box::new(move |entry| {
                if cancel.is_cancelled() {
                    return WalkState::Quit;
                }
                let entry = match entry {
                    Err(err) => {
                        diagnostics
                            .lock()
                            .push(Diagnostic::global(DiagnosticKind::Io, err.to_string()));
                        return WalkState::Continue;
                    }
                    Ok(e) => e,
                };
                if !entry.file_type().map_or(false, |t| t.is_file()) {
                    return WalkState::Continue;
                }
                if !wanted(entry.path()) {
                    return WalkState::Continue;
                }
                let path = clean_path(entry.path());
                debug!(path = %path.display(), "discovered");
                let owner = if explicit_roots {
                    root.clone()
                } else {
                    package_root_for(&path)
                };
                files.lock().push(SourceCandidate { path, root: owner });
                WalkState::Continue
            })
        });
    }

    if cancel.is_cancelled() {
        return Err(PysiftError::Cancelled);
    }

    let mut files = files.into_inner();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup();

    Ok(Discovery {
        files,
        diagnostics: diagnostics.into_inner(),
    })
}

/// Source filter: plain `.py` always; `.pyi`/`.pyx` only without a sibling
/// `.py`, with `.pyx` taking precedence over `.pyi`
fn wanted(path: &Path) -> bool {
    let Some(name) = path.to_str() else {
        return false;
    };
    if name.ends_with(".py") {
        return true;
    }
    if name.ends_with(".pyx") {
        let py = &name[..name.len() - 1];
        return !fs::exists(py).unwrap_or(true);
    }
    if name.ends_with(".pyi") {
        let py = &name[..name.len() - 1];
        let pyx = format!("{}x", py);
        return !fs::exists(py).unwrap_or(true) && !fs::exists(&pyx).unwrap_or(false);
    }
    false
}

fn has_package_marker(dir: &Path) -> bool {
    fs::exists(dir.join("__init__.py")).unwrap_or(false)
        || fs::exists(dir.join("__init__.pyi")).unwrap_or(false)
}

/// Nearest ancestor directory that is itself not a package
fn package_root_for(path: &Path) -> PathBuf {
    let mut dir = path.parent().unwrap_or(Path::new(""));
    while has_package_marker(dir) {
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
    dir.to_path_buf()
}

/// Lexically drop `.` components so that stored and queried paths agree
/// regardless of a leading `./`. The current directory itself cleans to
/// the empty path.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Derive the module names for a file under its package root.
///
/// Returns `(spelled, module)` where `spelled` keeps a trailing
/// `.__init__` component (needed to resolve relative imports) and `module`
/// is the canonical dotted name. `None` means the file cannot name a
/// module (a marker file sitting directly at the root, or a non-UTF8
/// path).
pub fn module_names(path: &Path, root: &Path) -> Option<(String, String)> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for comp in rel.components() {
        parts.push(comp.as_os_str().to_str()?);
    }
    let file = parts.pop()?;
    let stem = file
        .strip_suffix(".py")
        .or_else(|| file.strip_suffix(".pyi"))
        .or_else(|| file.strip_suffix(".pyx"))?;
    parts.push(stem);
    let spelled = parts.join(".");
    let module = spelled
        .strip_suffix(".__init__")
        .unwrap_or(&spelled)
        .to_string();
    if module.is_empty() || module == "__init__" {
        return None;
    }
    Some((spelled, module))
}
