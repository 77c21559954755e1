//! Build configuration and the user hook surface
//!
//! Front-ends override defaults through a fixed capability interface: the
//! [`Hooks`] trait. Every method has a default, so an implementation only
//! supplies what it cares about. [`HookConfig`] is the serde-backed
//! implementation loaded from a JSON hook file (`--hook <path>`).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PysiftError, Result};
use crate::hash::fnv1a;

/// Capability interface consumed by the graph builder.
///
/// Implementations supply any subset of the methods; the defaults below
/// apply otherwise.
pub trait Hooks {
    /// Directories whose direct children define top-level module names.
    /// Empty means: infer package roots from package markers while walking.
    fn source_roots(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Hierarchical glob patterns excluded from the walk
    fn ignore_patterns(&self) -> Vec<String> {
        Vec::new()
    }

    /// Promote `if TYPE_CHECKING:` imports into the graph
    fn include_typechecking(&self) -> bool {
        false
    }

    /// Import prefixes tracked as external nodes even without backing code
    /// (useful for `importlib` and friends)
    fn external_prefixes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Filename globs identifying test files; empty means the built-in
    /// pytest conventions (`test_*.py`, `*_test.py`, anything under a
    /// `test/` or `tests/` directory)
    fn test_patterns(&self) -> Vec<String> {
        Vec::new()
    }

    /// Extra dependencies injected before any closure is computed, keyed by
    /// module name or file path
    fn dynamic_dependencies(&self) -> BTreeMap<String, BTreeSet<String>> {
        BTreeMap::new()
    }

    /// Extra dependencies applied to the closure of any seed that reaches
    /// the keyed module
    fn dynamic_dependencies_at_leaves(&self) -> BTreeMap<String, BTreeSet<String>> {
        BTreeMap::new()
    }
}

/// Hooks implementation with every default
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}

/// Hook overrides loaded from a JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HookConfig {
    pub source_roots: Vec<PathBuf>,
    pub ignore_patterns: Vec<String>,
    pub include_typechecking: bool,
    pub external_prefixes: Vec<String>,
    pub test_patterns: Vec<String>,
    pub dynamic_dependencies: BTreeMap<String, BTreeSet<String>>,
    pub dynamic_dependencies_at_leaves: BTreeMap<String, BTreeSet<String>>,
}

impl HookConfig {
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| PysiftError::Config {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    /// Stable hash of the hook surface, stored in the graph file so a
    /// reloaded graph can be checked against the hooks it was built with
    pub fn signature_hash(&self) -> u64 {
        // BTreeMap fields keep the JSON rendering deterministic
        let canonical = serde_json::to_string(self).unwrap_or_default();
        fnv1a(canonical.as_bytes())
    }
}

impl Hooks for HookConfig {
    fn source_roots(&self) -> Vec<PathBuf> {
        self.source_roots.clone()
    }

    fn ignore_patterns(&self) -> Vec<String> {
        self.ignore_patterns.clone()
    }

    fn include_typechecking(&self) -> bool {
        self.include_typechecking
    }

    fn external_prefixes(&self) -> Vec<String> {
        self.external_prefixes.clone()
    }

    fn test_patterns(&self) -> Vec<String> {
        self.test_patterns.clone()
    }

    fn dynamic_dependencies(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.dynamic_dependencies.clone()
    }

    fn dynamic_dependencies_at_leaves(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.dynamic_dependencies_at_leaves.clone()
    }
}

/// Knobs that shape a single build run (as opposed to the hook surface,
/// which shapes the graph contents)
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Worker threads; `None` means one per available core
    pub jobs: Option<usize>,

    /// Per-file parse budget; `None` means unbounded
    pub parse_timeout: Option<Duration>,

    pub cancel: CancelToken,
}

/// Cooperative cancellation for a running build.
///
/// Workers stop picking up new files once the token fires; in-flight parses
/// complete. A cancelled build returns an error instead of a partial graph.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Compiled test-file classifier.
///
/// Matches:
///   - the configured filename globs (only `*` is special)
///   - with no configured globs: `test_*.py` / `*_test.py` filenames, or
///     any `.py` file inside a `test/` or `tests/` directory
pub struct TestMatcher {
    patterns: Vec<Regex>,
    builtin_dirs: bool,
}

impl TestMatcher {
    pub fn new(globs: &[String]) -> Self {
        let (globs, builtin_dirs): (Vec<String>, bool) = if globs.is_empty() {
            (vec!["test_*.py".into(), "*_test.py".into()], true)
        } else {
            (globs.to_vec(), false)
        };
        let patterns = globs
            .iter()
            .map(|g| {
                let mut re = String::from("^");
                for ch in g.chars() {
                    match ch {
                        '*' => re.push_str(".*"),
                        c => re.push_str(&regex::escape(&c.to_string())),
                    }
                }
                re.push('$');
                // the pattern is built from an escaped literal, it always compiles
                Regex::new(&re).expect("glob translation")
            })
            .collect();
        Self {
            patterns,
            builtin_dirs,
        }
    }

    pub fn is_test_file(&self, path: &std::path::Path) -> bool {
        let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
            return false;
        };
        if self.patterns.iter().any(|re| re.is_match(filename)) {
            return true;
        }
        if self.builtin_dirs {
            return path
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .any(|c| c == "test" || c == "tests");
        }
        false
    }
}
