//! Interned module identifiers
//!
//! Every importable unit is assigned a dense `u32` id the first time it is
//! seen. Ids index directly into the adjacency vectors of the graph store,
//! which keeps cycle-safe traversal cheap and gives the serializer its
//! string table for free.
//!
//! The table is written from many worker threads during resolution, so the
//! mutable state sits behind a `parking_lot::RwLock`; misses take the write
//! lock, hits only the read lock. Once a build finishes the inner table is
//! extracted and used lock-free.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Dense identifier for a module; equality is name-exact
pub type ModuleId = u32;

/// What backs a module node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Backed by a source file under a source root
    File,
    /// A package directory with submodules but no file of its own
    Namespace,
    /// Referenced but not backed by the repository
    External,
}

/// Metadata carried by every module node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Canonical dotted name
    pub name: String,

    /// Source file path, present only for [`ModuleKind::File`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    pub kind: ModuleKind,

    /// Whether the backing file is a registered test file
    pub is_test: bool,
}

impl ModuleInfo {
    pub fn is_internal(&self) -> bool {
        self.kind != ModuleKind::External
    }
}

/// Outcome of registering a source file under a name that is already taken
#[derive(Debug)]
pub enum RegisterOutcome {
    /// Fresh registration (or upgrade of a namespace/external placeholder)
    Registered(ModuleId),
    /// Another file already owns this name; the earlier one wins
    Duplicate {
        id: ModuleId,
        existing: Option<PathBuf>,
    },
}

#[derive(Debug, Default)]
pub struct TableInner {
    modules: Vec<ModuleInfo>,
    by_name: HashMap<String, ModuleId>,
    by_path: HashMap<PathBuf, ModuleId>,
}

impl TableInner {
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id as usize]
    }

    pub fn id_for_name(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn id_for_path(&self, path: &Path) -> Option<ModuleId> {
        self.by_path.get(path).copied()
    }

    /// Look a key up as a file path first, then as a module name
    pub fn id_for_key(&self, key: &str) -> Option<ModuleId> {
        self.id_for_path(Path::new(key))
            .or_else(|| self.id_for_name(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &ModuleInfo)> {
        self.modules
            .iter()
            .enumerate()
            .map(|(i, m)| (i as ModuleId, m))
    }

    /// Rebuild the lookup maps from a plain module list (deserialization)
    pub fn from_modules(modules: Vec<ModuleInfo>) -> Self {
        let mut by_name = HashMap::with_capacity(modules.len());
        let mut by_path = HashMap::new();
        for (i, m) in modules.iter().enumerate() {
            by_name.insert(m.name.clone(), i as ModuleId);
            if let Some(p) = &m.path {
                by_path.insert(p.clone(), i as ModuleId);
            }
        }
        Self {
            modules,
            by_name,
            by_path,
        }
    }

    fn push(&mut self, info: ModuleInfo) -> ModuleId {
        let id = self.modules.len() as ModuleId;
        self.by_name.insert(info.name.clone(), id);
        if let Some(p) = &info.path {
            self.by_path.insert(p.clone(), id);
        }
        self.modules.push(info);
        id
    }

    /// Consistency check: every entry is reachable through both indexes
    #[cfg(debug_assertions)]
    pub fn validate(&self) {
        for (id, m) in self.iter() {
            assert_eq!(self.id_for_name(&m.name), Some(id), "{}", m.name);
            if let Some(p) = &m.path {
                assert_eq!(self.id_for_path(p), Some(id), "{}", p.display());
            }
        }
    }
}

/// Thread-safe intern table used during a build
#[derive(Debug, Default)]
pub struct ModuleTable {
    inner: RwLock<TableInner>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn id_for_name(&self, name: &str) -> Option<ModuleId> {
        self.inner.read().id_for_name(name)
    }

    pub fn id_for_path(&self, path: &Path) -> Option<ModuleId> {
        self.inner.read().id_for_path(path)
    }

    pub fn name_of(&self, id: ModuleId) -> String {
        self.inner.read().get(id).name.clone()
    }

    pub fn kind_of(&self, id: ModuleId) -> ModuleKind {
        self.inner.read().get(id).kind
    }

    /// Register a source file as the owner of `name`.
    ///
    /// A namespace or external placeholder created earlier for the same name
    /// is upgraded in place. A second *file* claiming the name loses: the
    /// earlier registration wins and the caller reports a diagnostic.
    pub fn register_file(&self, name: &str, path: &Path, is_test: bool) -> RegisterOutcome {
        let mut inner = self.inner.write();
        if let Some(id) = inner.id_for_name(name) {
            let existing = &inner.modules[id as usize];
            if existing.kind == ModuleKind::File {
                return RegisterOutcome::Duplicate {
                    id,
                    existing: existing.path.clone(),
                };
            }
            inner.modules[id as usize].kind = ModuleKind::File;
            inner.modules[id as usize].path = Some(path.to_path_buf());
            inner.modules[id as usize].is_test = is_test;
            inner.by_path.insert(path.to_path_buf(), id);
            return RegisterOutcome::Registered(id);
        }
        let id = inner.push(ModuleInfo {
            name: name.to_string(),
            path: Some(path.to_path_buf()),
            kind: ModuleKind::File,
            is_test,
        });
        RegisterOutcome::Registered(id)
    }

    /// Intern a namespace package (no backing file of its own).
    ///
    /// Multiple `__init__` files may map to the same namespace name, so no
    /// path is recorded; this keeps the graph shape independent of the order
    /// in which files are scanned. An internal node always wins over an
    /// external placeholder of the same name.
    pub fn intern_namespace(&self, name: &str) -> ModuleId {
        if let Some(id) = self.id_for_name(name) {
            let mut inner = self.inner.write();
            if inner.modules[id as usize].kind == ModuleKind::External {
                inner.modules[id as usize].kind = ModuleKind::Namespace;
            }
            return id;
        }
        let mut inner = self.inner.write();
        // re-check under the write lock: another worker may have won the race
        if let Some(id) = inner.id_for_name(name) {
            if inner.modules[id as usize].kind == ModuleKind::External {
                inner.modules[id as usize].kind = ModuleKind::Namespace;
            }
            return id;
        }
        inner.push(ModuleInfo {
            name: name.to_string(),
            path: None,
            kind: ModuleKind::Namespace,
            is_test: false,
        })
    }

    /// Intern an external module; never displaces an internal node
    pub fn intern_external(&self, name: &str) -> ModuleId {
        if let Some(id) = self.id_for_name(name) {
            return id;
        }
        let mut inner = self.inner.write();
        if let Some(id) = inner.id_for_name(name) {
            return id;
        }
        inner.push(ModuleInfo {
            name: name.to_string(),
            path: None,
            kind: ModuleKind::External,
            is_test: false,
        })
    }

    /// Extract the finished table once the write phase is over
    pub fn into_inner(self) -> TableInner {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let t = ModuleTable::new();
        let a = match t.register_file("foo.bar", Path::new("foo/bar.py"), false) {
            RegisterOutcome::Registered(id) => id,
            _ => panic!("fresh registration"),
        };
        let b = match t.register_file("foo.baz", Path::new("foo/baz.py"), false) {
            RegisterOutcome::Registered(id) => id,
            _ => panic!("fresh registration"),
        };
        assert_ne!(a, b);
        assert_eq!(t.id_for_name("foo.bar"), Some(a));
        assert_eq!(t.id_for_path(Path::new("foo/baz.py")), Some(b));
        assert_eq!(t.id_for_name("foo/bar.py"), None);
        assert_eq!(t.id_for_path(Path::new("foo.bar")), None);
    }

    #[test]
    fn test_duplicate_file_keeps_first() {
        let t = ModuleTable::new();
        let first = match t.register_file("foo", Path::new("src/foo.py"), false) {
            RegisterOutcome::Registered(id) => id,
            _ => panic!("fresh registration"),
        };
        match t.register_file("foo", Path::new("other/foo.py"), false) {
            RegisterOutcome::Duplicate { id, existing } => {
                assert_eq!(id, first);
                assert_eq!(existing.as_deref(), Some(Path::new("src/foo.py")));
            }
            _ => panic!("expected duplicate"),
        }
        assert_eq!(t.id_for_path(Path::new("src/foo.py")), Some(first));
        assert_eq!(t.id_for_path(Path::new("other/foo.py")), None);
    }

    #[test]
    fn test_external_upgraded_by_file() {
        let t = ModuleTable::new();
        let ext = t.intern_external("pkg.mod");
        match t.register_file("pkg.mod", Path::new("pkg/mod.py"), false) {
            RegisterOutcome::Registered(id) => assert_eq!(id, ext),
            _ => panic!("placeholder should be upgraded"),
        }
        let inner = t.into_inner();
        assert_eq!(inner.get(ext).kind, ModuleKind::File);
        assert_eq!(inner.get(ext).path.as_deref(), Some(Path::new("pkg/mod.py")));
    }

    #[test]
    fn test_namespace_never_downgraded() {
        let t = ModuleTable::new();
        let ns = t.intern_namespace("pkg");
        assert_eq!(t.intern_external("pkg"), ns);
        let inner = t.into_inner();
        assert_eq!(inner.get(ns).kind, ModuleKind::Namespace);
        assert!(inner.get(ns).path.is_none());
    }

    #[test]
    fn test_interning_is_idempotent() {
        let t = ModuleTable::new();
        let a = t.intern_external("requests");
        let b = t.intern_external("requests");
        assert_eq!(a, b);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_from_modules_rebuilds_indexes() {
        let t = ModuleTable::new();
        t.register_file("a", Path::new("a.py"), false);
        t.intern_external("sys");
        let inner = t.into_inner();
        let rebuilt = TableInner::from_modules(inner.modules.clone());
        assert_eq!(rebuilt.id_for_name("a"), inner.id_for_name("a"));
        assert_eq!(rebuilt.id_for_name("sys"), inner.id_for_name("sys"));
        assert_eq!(
            rebuilt.id_for_path(Path::new("a.py")),
            inner.id_for_path(Path::new("a.py"))
        );
    }
}
