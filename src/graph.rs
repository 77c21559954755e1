//! The module dependency graph store
//!
//! Holds the directed import graph over interned module ids, with a
//! reverse index maintained on every mutation. Closures are computed with
//! an iterative worklist (import cycles are routine in real repositories)
//! and reverse closures are memoized per node; the memo is dropped on any
//! mutation.
//!
//! The store has two phases. During a build exactly one writer mutates it
//! (`&mut self` methods). Afterwards any number of readers may query it
//! concurrently; the closure memo sits behind its own lock so `&self`
//! queries stay shareable across threads.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::moduleid::{ModuleId, ModuleInfo, TableInner};

/// Build configuration snapshot carried by a graph (and its file form)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMeta {
    pub source_roots: Vec<PathBuf>,
    pub ignore_patterns: Vec<String>,
    pub test_patterns: Vec<String>,
    pub include_typechecking: bool,
    /// Hash of the hook surface the graph was built with
    pub hook_signature: u64,
}

/// Result of mapping changed files onto the registered test set
#[derive(Debug, Default)]
pub struct AffectedTests {
    pub tests: BTreeSet<ModuleId>,
    /// Changed paths that did not map to any node
    pub unmatched: Vec<PathBuf>,
}

pub struct Graph {
    pub(crate) modules: TableInner,
    pub(crate) out: Vec<HashSet<ModuleId>>,
    pub(crate) inn: Vec<HashSet<ModuleId>>,
    pub(crate) tests: BTreeSet<ModuleId>,
    /// Modules whose source carries hint-guarded imports
    pub(crate) hinted: BTreeSet<ModuleId>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    /// Internal-looking imports that resolved to nothing, keyed by the
    /// unresolved parent, mapped to the modules that wanted them
    pub(crate) unresolved: BTreeMap<String, BTreeSet<ModuleId>>,
    /// Extra dependencies granted to any seed whose closure reaches the key
    pub(crate) leaf_augments: BTreeMap<ModuleId, BTreeSet<ModuleId>>,
    pub(crate) summary_hash: u64,
    pub(crate) meta: GraphMeta,
    closure_cache: RwLock<HashMap<ModuleId, Arc<BTreeSet<ModuleId>>>>,
}

impl Graph {
    pub(crate) fn new(modules: TableInner, meta: GraphMeta, summary_hash: u64) -> Self {
        let n = modules.len();
        let tests: BTreeSet<ModuleId> = modules
            .iter()
            .filter(|(_, info)| info.is_test)
            .map(|(id, _)| id)
            .collect();
        Self {
            modules,
            out: vec![HashSet::new(); n],
            inn: vec![HashSet::new(); n],
            tests,
            hinted: BTreeSet::new(),
            diagnostics: Vec::new(),
            unresolved: BTreeMap::new(),
            leaf_augments: BTreeMap::new(),
            summary_hash,
            meta,
            closure_cache: RwLock::new(HashMap::new()),
        }
    }

    // ========== Node access ==========

    pub fn node_count(&self) -> usize {
        self.modules.len()
    }

    pub fn module(&self, id: ModuleId) -> &ModuleInfo {
        self.modules.get(id)
    }

    pub fn id_for_name(&self, name: &str) -> Option<ModuleId> {
        self.modules.id_for_name(name)
    }

    pub fn id_for_path(&self, path: &Path) -> Option<ModuleId> {
        self.modules.id_for_path(path)
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &ModuleInfo)> {
        self.modules.iter()
    }

    /// Registered test-file nodes
    pub fn tests(&self) -> &BTreeSet<ModuleId> {
        &self.tests
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Unresolved internal imports: parent name -> modules that wanted it
    pub fn unresolved(&self) -> impl Iterator<Item = (&str, &BTreeSet<ModuleId>)> {
        self.unresolved.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether this module's source carries hint-guarded imports
    pub fn is_hinted(&self, id: ModuleId) -> bool {
        self.hinted.contains(&id)
    }

    pub fn summary_hash(&self) -> u64 {
        self.summary_hash
    }

    /// A loaded graph is only trusted when its summary hash matches the
    /// current repository scan
    pub fn is_fresh(&self, current_summary: u64) -> bool {
        self.summary_hash == current_summary
    }

    pub fn meta(&self) -> &GraphMeta {
        &self.meta
    }

    // ========== Mutation (write phase) ==========

    /// Insert an edge; idempotent, O(1) amortized. Keeps the reverse index
    /// in sync and drops the closure memo.
    pub fn add_edge(&mut self, from: ModuleId, to: ModuleId) {
        if from == to {
            return;
        }
        if self.out[from as usize].insert(to) {
            self.inn[to as usize].insert(from);
            self.closure_cache.get_mut().clear();
        }
    }

    /// Remove an edge; no-op if absent
    pub fn remove_edge(&mut self, from: ModuleId, to: ModuleId) {
        if self.out[from as usize].remove(&to) {
            self.inn[to as usize].remove(&from);
            self.closure_cache.get_mut().clear();
        }
    }

    /// Register a node as a test file
    pub fn mark_test(&mut self, id: ModuleId) {
        self.tests.insert(id);
    }

    pub(crate) fn mark_hinted(&mut self, id: ModuleId) {
        self.hinted.insert(id);
    }

    /// Union extra dependencies onto the closure of anything reaching `trigger`
    pub fn add_leaf_augmentation(&mut self, trigger: ModuleId, extra: BTreeSet<ModuleId>) {
        self.leaf_augments.entry(trigger).or_default().extend(extra);
        self.closure_cache.get_mut().clear();
    }

    // ========== Queries (read phase) ==========

    /// Direct successors, sorted
    pub fn successors(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut v: Vec<ModuleId> = self.out[id as usize].iter().copied().collect();
        v.sort_unstable();
        v
    }

    /// Direct predecessors, sorted
    pub fn predecessors(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut v: Vec<ModuleId> = self.inn[id as usize].iter().copied().collect();
        v.sort_unstable();
        v
    }

    /// Transitive successors. Includes the seed only when it sits on a cycle.
    pub fn closure_out(&self, id: ModuleId) -> BTreeSet<ModuleId> {
        let mut result = self.reach(id, &self.out);
        if !self.leaf_augments.is_empty() {
            let mut extra: BTreeSet<ModuleId> = BTreeSet::new();
            for (&trigger, deps) in &self.leaf_augments {
                if !result.contains(&trigger) {
                    continue;
                }
                for &dep in deps {
                    if extra.insert(dep) {
                        extra.extend(self.reach(dep, &self.out));
                    }
                }
            }
            result.extend(extra);
        }
        result
    }

    /// Transitive predecessors; memoized until the next mutation
    pub fn closure_in(&self, id: ModuleId) -> Arc<BTreeSet<ModuleId>> {
        if let Some(cached) = self.closure_cache.read().get(&id) {
            return cached.clone();
        }
        let mut result = self.reach(id, &self.inn);
        for (&trigger, deps) in &self.leaf_augments {
            let supplies_id = deps
                .iter()
                .any(|&d| d == id || self.reach(d, &self.out).contains(&id));
            if supplies_id {
                result.extend(self.reach(trigger, &self.inn));
            }
        }
        let result = Arc::new(result);
        self.closure_cache.write().insert(id, result.clone());
        result
    }

    /// Tests whose outcome could differ because of the changed files
    pub fn affected_tests(&self, changed: &[PathBuf]) -> AffectedTests {
        let mut affected = AffectedTests::default();
        for path in changed {
            let normalized = crate::walker::clean_path(path);
            let Some(id) = self.modules.id_for_path(&normalized) else {
                affected.unmatched.push(path.clone());
                continue;
            };
            self.collect_affected(id, &mut affected.tests);
        }
        affected
    }

    /// Like [`Graph::affected_tests`], keyed by module name
    pub fn affected_tests_by_modules(&self, changed: &[String]) -> AffectedTests {
        let mut affected = AffectedTests::default();
        for name in changed {
            let Some(id) = self.modules.id_for_name(name) else {
                affected.unmatched.push(PathBuf::from(name));
                continue;
            };
            self.collect_affected(id, &mut affected.tests);
        }
        affected
    }

    fn collect_affected(&self, id: ModuleId, tests: &mut BTreeSet<ModuleId>) {
        if self.tests.contains(&id) {
            tests.insert(id);
        }
        for &dependent in self.closure_in(id).iter() {
            if self.tests.contains(&dependent) {
                tests.insert(dependent);
            }
        }
    }

    fn reach(&self, seed: ModuleId, edges: &[HashSet<ModuleId>]) -> BTreeSet<ModuleId> {
        let mut seen = vec![false; edges.len()];
        let mut result = BTreeSet::new();
        let mut stack: Vec<ModuleId> = edges[seed as usize].iter().copied().collect();
        while let Some(node) = stack.pop() {
            if seen[node as usize] {
                continue;
            }
            seen[node as usize] = true;
            result.insert(node);
            stack.extend(edges[node as usize].iter().copied());
        }
        result
    }

    // ========== Debug output ==========

    /// Deterministic human-readable dump: one `module -> deps` line per
    /// node, sorted by module name
    pub fn dump_text(&self, w: &mut impl Write) -> io::Result<()> {
        let mut by_name: Vec<(&str, ModuleId)> = self
            .modules
            .iter()
            .map(|(id, m)| (m.name.as_str(), id))
            .collect();
        by_name.sort_unstable();
        for (name, id) in by_name {
            let mut deps: Vec<&str> = self.out[id as usize]
                .iter()
                .map(|&d| self.modules.get(d).name.as_str())
                .collect();
            deps.sort_unstable();
            let marker = if self.tests.contains(&id) { " [test]" } else { "" };
            writeln!(w, "{}{} -> {}", name, marker, deps.join(", "))?;
        }
        Ok(())
    }
}
