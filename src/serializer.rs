//! Binary persistence for graphs
//!
//! Compact little-endian format, version-gated, written atomically:
//!
//! ```text
//! magic "PSIG" | u16 version | u64 summary hash
//! varint node count
//!   per node: name, path (empty = none), kind byte, flags byte
//! edge lists, run-length by source: per node, varint count + sorted targets
//! leaf augmentations, unresolved index, diagnostics
//! metadata block: roots, ignore patterns, test patterns, flags, hook hash
//! ```
//!
//! Strings live once in the node table; edges are integer pairs. All
//! collections are written in sorted order, so `save -> load -> save`
//! produces byte-identical artifacts. A version or magic mismatch is a
//! hard error; the caller decides what to do about a stale summary hash
//! (see [`Graph::is_fresh`]).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{PysiftError, Result};
use crate::graph::{Graph, GraphMeta};
use crate::moduleid::{ModuleId, ModuleInfo, ModuleKind, TableInner};

const MAGIC: &[u8; 4] = b"PSIG";
pub const FORMAT_VERSION: u16 = 1;

const FLAG_TEST: u8 = 1 << 0;
const FLAG_HINTED: u8 = 1 << 1;

/// Serialize a graph to `path`, atomically (temp file + rename)
pub fn save_graph(graph: &Graph, path: &Path) -> Result<()> {
    let tmp = path.with_extension("psig.tmp");
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        write_graph(graph, &mut w)?;
        w.flush()?;
    }
    // rename over an existing target is atomic on Unix; Windows needs the
    // explicit delete first
    #[cfg(windows)]
    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a graph from `path`. Magic or version mismatch is fatal; no
/// silent fallback.
pub fn load_graph(path: &Path) -> Result<Graph> {
    let file = File::open(path)?;
    let mut r = BufReader::new(file);
    read_graph(&mut r).map_err(|e| match e {
        ReadError::Format(message) => PysiftError::GraphFormat {
            path: path.to_path_buf(),
            message,
        },
        ReadError::Io(err) => PysiftError::GraphFormat {
            path: path.to_path_buf(),
            message: err.to_string(),
        },
    })
}

// ========== Writing ==========

fn write_graph(graph: &Graph, w: &mut impl Write) -> io::Result<()> {
    w.write_all(MAGIC)?;
    w.write_all(&FORMAT_VERSION.to_le_bytes())?;
    w.write_all(&graph.summary_hash.to_le_bytes())?;

    let n = graph.modules.len();
    write_varint(w, n as u64)?;
    for (id, info) in graph.modules.iter() {
        write_str(w, &info.name)?;
        match &info.path {
            Some(p) => write_str(w, &p.to_string_lossy())?,
            None => write_str(w, "")?,
        }
        w.write_all(&[kind_tag(info.kind)])?;
        let mut flags = 0u8;
        if graph.tests.contains(&id) {
            flags |= FLAG_TEST;
        }
        if graph.hinted.contains(&id) {
            flags |= FLAG_HINTED;
        }
        w.write_all(&[flags])?;
    }

    for out in &graph.out {
        let mut targets: Vec<ModuleId> = out.iter().copied().collect();
        targets.sort_unstable();
        write_varint(w, targets.len() as u64)?;
        for t in targets {
            write_varint(w, t as u64)?;
        }
    }

    write_varint(w, graph.leaf_augments.len() as u64)?;
    for (trigger, deps) in &graph.leaf_augments {
        write_varint(w, *trigger as u64)?;
        write_varint(w, deps.len() as u64)?;
        for d in deps {
            write_varint(w, *d as u64)?;
        }
    }

    write_varint(w, graph.unresolved.len() as u64)?;
    for (name, wanted_by) in &graph.unresolved {
        write_str(w, name)?;
        write_varint(w, wanted_by.len() as u64)?;
        for id in wanted_by {
            write_varint(w, *id as u64)?;
        }
    }

    write_varint(w, graph.diagnostics.len() as u64)?;
    for d in &graph.diagnostics {
        w.write_all(&[d.kind.to_tag()])?;
        match &d.path {
            Some(p) => write_str(w, &p.to_string_lossy())?,
            None => write_str(w, "")?,
        }
        write_str(w, &d.message)?;
    }

    write_meta(&graph.meta, w)
}

fn write_meta(meta: &GraphMeta, w: &mut impl Write) -> io::Result<()> {
    write_varint(w, meta.source_roots.len() as u64)?;
    for root in &meta.source_roots {
        write_str(w, &root.to_string_lossy())?;
    }
    write_varint(w, meta.ignore_patterns.len() as u64)?;
    for p in &meta.ignore_patterns {
        write_str(w, p)?;
    }
    write_varint(w, meta.test_patterns.len() as u64)?;
    for p in &meta.test_patterns {
        write_str(w, p)?;
    }
    w.write_all(&[meta.include_typechecking as u8])?;
    w.write_all(&meta.hook_signature.to_le_bytes())?;
    Ok(())
}

// ========== Reading ==========

#[derive(Debug)]
enum ReadError {
    Format(String),
    Io(io::Error),
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        ReadError::Io(e)
    }
}

fn corrupt(message: impl Into<String>) -> ReadError {
    ReadError::Format(message.into())
}

fn read_graph(r: &mut impl Read) -> std::result::Result<Graph, ReadError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(corrupt("not a pysift graph file"));
    }
    let mut version = [0u8; 2];
    r.read_exact(&mut version)?;
    let version = u16::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "format version {} (supported: {})",
            version, FORMAT_VERSION
        )));
    }
    let mut hash = [0u8; 8];
    r.read_exact(&mut hash)?;
    let summary_hash = u64::from_le_bytes(hash);

    let n = read_varint(r)? as usize;
    if n > u32::MAX as usize {
        return Err(corrupt("node count out of range"));
    }
    let mut modules = Vec::with_capacity(n);
    let mut hinted = BTreeSet::new();
    for id in 0..n {
        let name = read_str(r)?;
        let path = read_str(r)?;
        let mut tags = [0u8; 2];
        r.read_exact(&mut tags)?;
        let kind = kind_from_tag(tags[0]).ok_or_else(|| corrupt("bad module kind"))?;
        if tags[1] & FLAG_HINTED != 0 {
            hinted.insert(id as ModuleId);
        }
        modules.push(ModuleInfo {
            name,
            path: if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            },
            kind,
            is_test: tags[1] & FLAG_TEST != 0,
        });
    }

    let mut out: Vec<HashSet<ModuleId>> = vec![HashSet::new(); n];
    let mut inn: Vec<HashSet<ModuleId>> = vec![HashSet::new(); n];
    for (from, out_edges) in out.iter_mut().enumerate() {
        let count = read_varint(r)? as usize;
        for _ in 0..count {
            let to = read_node_id(r, n)?;
            out_edges.insert(to);
            inn[to as usize].insert(from as ModuleId);
        }
    }

    let mut leaf_augments = BTreeMap::new();
    let count = read_varint(r)? as usize;
    for _ in 0..count {
        let trigger = read_node_id(r, n)?;
        let deps_len = read_varint(r)? as usize;
        let mut deps = BTreeSet::new();
        for _ in 0..deps_len {
            deps.insert(read_node_id(r, n)?);
        }
        leaf_augments.insert(trigger, deps);
    }

    let mut unresolved = BTreeMap::new();
    let count = read_varint(r)? as usize;
    for _ in 0..count {
        let name = read_str(r)?;
        let wanted_len = read_varint(r)? as usize;
        let mut wanted = BTreeSet::new();
        for _ in 0..wanted_len {
            wanted.insert(read_node_id(r, n)?);
        }
        unresolved.insert(name, wanted);
    }

    let mut diagnostics = Vec::new();
    let count = read_varint(r)? as usize;
    for _ in 0..count {
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)?;
        let kind = DiagnosticKind::from_tag(tag[0]).ok_or_else(|| corrupt("bad diagnostic"))?;
        let path = read_str(r)?;
        let message = read_str(r)?;
        diagnostics.push(Diagnostic {
            kind,
            path: if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            },
            message,
        });
    }

    let meta = read_meta(r)?;

    // the test set is rebuilt from the per-node flags by the constructor
    let mut graph = Graph::new(TableInner::from_modules(modules), meta, summary_hash);
    graph.out = out;
    graph.inn = inn;
    graph.hinted = hinted;
    graph.leaf_augments = leaf_augments;
    graph.unresolved = unresolved;
    graph.diagnostics = diagnostics;
    Ok(graph)
}

fn read_meta(r: &mut impl Read) -> std::result::Result<GraphMeta, ReadError> {
    let mut meta = GraphMeta::default();
    let count = read_varint(r)? as usize;
    for _ in 0..count {
        meta.source_roots.push(PathBuf::from(read_str(r)?));
    }
    let count = read_varint(r)? as usize;
    for _ in 0..count {
        meta.ignore_patterns.push(read_str(r)?);
    }
    let count = read_varint(r)? as usize;
    for _ in 0..count {
        meta.test_patterns.push(read_str(r)?);
    }
    let mut flag = [0u8; 1];
    r.read_exact(&mut flag)?;
    meta.include_typechecking = flag[0] != 0;
    let mut hash = [0u8; 8];
    r.read_exact(&mut hash)?;
    meta.hook_signature = u64::from_le_bytes(hash);
    Ok(meta)
}

fn read_node_id(r: &mut impl Read, n: usize) -> std::result::Result<ModuleId, ReadError> {
    let id = read_varint(r)?;
    if id >= n as u64 {
        return Err(corrupt(format!("node id {} out of range", id)));
    }
    Ok(id as ModuleId)
}

// ========== Primitives ==========

fn kind_tag(kind: ModuleKind) -> u8 {
    match kind {
        ModuleKind::File => 0,
        ModuleKind::Namespace => 1,
        ModuleKind::External => 2,
    }
}

fn kind_from_tag(tag: u8) -> Option<ModuleKind> {
    Some(match tag {
        0 => ModuleKind::File,
        1 => ModuleKind::Namespace,
        2 => ModuleKind::External,
        _ => return None,
    })
}

fn write_varint(w: &mut impl Write, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            return w.write_all(&[byte]);
        }
        w.write_all(&[byte | 0x80])?;
    }
}

fn read_varint(r: &mut impl Read) -> std::result::Result<u64, ReadError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        if shift >= 64 {
            return Err(corrupt("varint overflow"));
        }
        value |= ((byte[0] & 0x7f) as u64) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn write_str(w: &mut impl Write, s: &str) -> io::Result<()> {
    write_varint(w, s.len() as u64)?;
    w.write_all(s.as_bytes())
}

fn read_str(r: &mut impl Read) -> std::result::Result<String, ReadError> {
    let len = read_varint(r)? as usize;
    if len > 1 << 24 {
        return Err(corrupt("string length out of range"));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| corrupt("invalid UTF-8 in string table"))
}
