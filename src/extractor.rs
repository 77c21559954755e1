//! Import extraction from Python sources
//!
//! Parses a single file with tree-sitter and walks the full syntax tree,
//! so imports nested inside functions, class bodies, conditionals, and
//! exception handlers are all seen. Two guard forms get special treatment:
//!
//! - `if TYPE_CHECKING:` bodies are walked and their references tagged,
//!   so the resolver can drop or promote them per configuration;
//! - a literal always-false gate (`if False:` / `if 0:`) is walked and its
//!   references flagged as hints. Such guards carry imports that exist
//!   purely for the graph.
//!
//! Calls to `__import__` / `importlib.import_module` with a single literal
//! string argument are recognized; computed targets are not inferred, but
//! any bare reference to `__import__` is surfaced as a reference to the
//! `__import__` sentinel so dynamic-import use stays visible.

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::hash::fnv1a;

/// Syntactic form of a raw import reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawImportKind {
    /// `import a.b` or the target side of an absolute `from a.b import c`
    Absolute,
    /// Reference relative to the importing module, popping `level`
    /// package components
    Relative { level: u32 },
    /// `from <payload> import *`; the payload names the package prefix
    Wildcard { level: u32 },
    /// Literal-string target of a reflective import call
    Reflective,
}

/// One extracted reference, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImport {
    pub kind: RawImportKind,
    /// Dotted name (possibly empty for `from . import x` package refs)
    pub payload: String,
    /// Reference appears under an `if TYPE_CHECKING:` guard
    pub typechecking: bool,
    /// Reference appears under a literal always-false guard
    pub hinted: bool,
    /// 1-based source line
    pub line: usize,
}

/// Everything the extractor learns about one file
#[derive(Debug, Default)]
pub struct FileIntel {
    pub imports: Vec<RawImport>,
    pub content_hash: u64,
    /// Present when the file could not be parsed; the file still becomes a
    /// node, with no outgoing references
    pub parse_error: Option<String>,
    /// `__init__.py` carrying the pkgutil `extend_path` stanza
    pub ns_pkg_init: bool,
}

/// Parse one source file and extract its raw import references.
///
/// A parse failure (syntax error or timeout) is recorded on the returned
/// intel rather than raised; extraction never aborts a build.
pub fn scan_source(path: &Path, source: &str, timeout: Option<Duration>) -> FileIntel {
    let mut intel = FileIntel {
        content_hash: fnv1a(source.as_bytes()),
        ..Default::default()
    };

    let filename = path.file_name().and_then(|f| f.to_str()).unwrap_or("");
    intel.ns_pkg_init =
        (filename == "__init__.py" || filename == "__init__.pyi") && is_pkgutil_ns_init(source);

    if filename.ends_with(".pyx") {
        // Cython sources are registered for their path, not parsed
        return intel;
    }

    let mut parser = tree_sitter::Parser::new();
    if parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .is_err()
    {
        intel.parse_error = Some("grammar mismatch".to_string());
        return intel;
    }
    if let Some(budget) = timeout {
        parser.set_timeout_micros(budget.as_micros() as u64);
    }

    let tree = match parser.parse(source, None) {
        Some(t) => t,
        None => {
            intel.parse_error = Some("parse timed out".to_string());
            return intel;
        }
    };
    if tree.root_node().has_error() {
        intel.parse_error = Some("syntax error".to_string());
        return intel;
    }

    let mut walker = ImportWalker {
        source,
        typechecking: false,
        hinted: false,
        imports: Vec::new(),
    };
    walker.walk(tree.root_node());
    intel.imports = walker.imports;
    intel
}

/// `__init__.py` whose first statement is the pkgutil namespace stanza
pub fn is_pkgutil_ns_init(source: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"^__path__ *= *__import__ *\(('pkgutil'|"pkgutil")\).extend_path *\( *__path__ *, *__name__ *\)"#,
        )
        .expect("pkgutil stanza regex")
    });
    RE.is_match_at(source, 0)
}

struct ImportWalker<'a> {
    source: &'a str,
    typechecking: bool,
    hinted: bool,
    imports: Vec<RawImport>,
}

impl<'a> ImportWalker<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn push(&mut self, kind: RawImportKind, payload: String, node: Node<'_>) {
        self.imports.push(RawImport {
            kind,
            payload,
            typechecking: self.typechecking,
            hinted: self.hinted,
            line: node.start_position().row + 1,
        });
    }

    fn descend(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(child);
        }
    }

    fn walk(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" => self.on_import(node),
            "import_from_statement" => self.on_import_from(node),
            // `from __future__ import ...` carries no dependency information
            "future_import_statement" => {}
            "if_statement" => self.on_if(node),
            "call" => {
                self.on_call(node);
                self.descend(node);
            }
            "identifier" => {
                // a bare reference to __import__ can smuggle in anything;
                // surface it so the validator knows dynamic imports happen here
                if self.text(node) == "__import__" {
                    self.push(RawImportKind::Reflective, "__import__".to_string(), node);
                }
            }
            _ => self.descend(node),
        }
    }

    /// `import a.b, c as d`
    fn on_import(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let target = match name.kind() {
                "aliased_import" => name.child_by_field_name("name"),
                _ => Some(name),
            };
            if let Some(t) = target {
                let payload = self.text(t).to_string();
                self.push(RawImportKind::Absolute, payload, node);
            }
        }
    }

    /// `from <module> import x, y` / `from <module> import *`
    ///
    /// Emits a reference to the package itself plus one per imported name;
    /// the resolver later decides whether `x` names a submodule or an
    /// attribute.
    fn on_import_from(&mut self, node: Node<'_>) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let (level, base) = match module_node.kind() {
            "relative_import" => {
                let mut level = 0u32;
                let mut base = String::new();
                let mut cursor = module_node.walk();
                for child in module_node.children(&mut cursor) {
                    match child.kind() {
                        "import_prefix" => {
                            level += self.text(child).matches('.').count() as u32;
                        }
                        "dotted_name" => base = self.text(child).to_string(),
                        _ => {}
                    }
                }
                (level, base)
            }
            _ => (0, self.text(module_node).to_string()),
        };

        let base_kind = |level: u32| {
            if level > 0 {
                RawImportKind::Relative { level }
            } else {
                RawImportKind::Absolute
            }
        };

        // the package side is always a dependency in its own right
        if level > 0 || !base.is_empty() {
            self.push(base_kind(level), base.clone(), node);
        }

        let mut cursor = node.walk();
        let is_wildcard = node
            .children(&mut cursor)
            .any(|c| c.kind() == "wildcard_import");
        if is_wildcard {
            self.push(RawImportKind::Wildcard { level }, base, node);
            return;
        }

        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let item = match name.kind() {
                "aliased_import" => name.child_by_field_name("name"),
                _ => Some(name),
            };
            let Some(item) = item else { continue };
            let item = self.text(item);
            let payload = if base.is_empty() {
                item.to_string()
            } else {
                format!("{}.{}", base, item)
            };
            self.push(base_kind(level), payload, node);
        }
    }

    fn on_if(&mut self, node: Node<'_>) {
        let cond = node.child_by_field_name("condition");
        let (guards_typechecking, always_false) = match cond {
            Some(c) => {
                let text = self.text(c);
                (
                    text == "TYPE_CHECKING" || text == "typing.TYPE_CHECKING",
                    c.kind() == "false" || (c.kind() == "integer" && text == "0"),
                )
            }
            None => (false, false),
        };
        if let Some(c) = cond {
            self.walk(c);
        }
        if let Some(consequence) = node.child_by_field_name("consequence") {
            let saved = (self.typechecking, self.hinted);
            self.typechecking |= guards_typechecking;
            self.hinted |= always_false;
            self.walk(consequence);
            (self.typechecking, self.hinted) = saved;
        }
        let mut cursor = node.walk();
        let alternatives: Vec<Node> = node
            .children_by_field_name("alternative", &mut cursor)
            .collect();
        for alt in alternatives {
            match alt.kind() {
                "elif_clause" => self.on_elif(alt),
                // else_clause: the non-guarded path, walked plainly
                _ => self.descend(alt),
            }
        }
    }

    fn on_elif(&mut self, node: Node<'_>) {
        let cond = node.child_by_field_name("condition");
        let (guards_typechecking, always_false) = match cond {
            Some(c) => {
                let text = self.text(c);
                (
                    text == "TYPE_CHECKING" || text == "typing.TYPE_CHECKING",
                    c.kind() == "false" || (c.kind() == "integer" && text == "0"),
                )
            }
            None => (false, false),
        };
        if let Some(c) = cond {
            self.walk(c);
        }
        if let Some(consequence) = node.child_by_field_name("consequence") {
            let saved = (self.typechecking, self.hinted);
            self.typechecking |= guards_typechecking;
            self.hinted |= always_false;
            self.walk(consequence);
            (self.typechecking, self.hinted) = saved;
        }
    }

    /// `__import__("m")` / `importlib.import_module("m")` with a literal
    fn on_call(&mut self, node: Node<'_>) {
        let Some(func) = node.child_by_field_name("function") else {
            return;
        };
        let matched = match func.kind() {
            "identifier" => {
                let t = self.text(func);
                t == "__import__" || t == "import_module"
            }
            "attribute" => {
                let obj = func.child_by_field_name("object");
                let attr = func.child_by_field_name("attribute");
                match (obj, attr) {
                    (Some(o), Some(a)) if o.kind() == "identifier" => {
                        let (ot, at) = (self.text(o), self.text(a));
                        (ot == "importlib" && at == "import_module")
                            || (ot == "builtins" && at == "__import__")
                    }
                    _ => false,
                }
            }
            _ => false,
        };
        if !matched {
            return;
        }
        let Some(args) = node.child_by_field_name("arguments") else {
            return;
        };
        if args.kind() != "argument_list" {
            return;
        }
        let mut cursor = args.walk();
        let positional: Vec<Node> = args
            .named_children(&mut cursor)
            .filter(|n| n.kind() != "keyword_argument" && n.kind() != "comment")
            .collect();
        if positional.len() != 1 {
            return;
        }
        if let Some(lit) = self.string_literal(positional[0]) {
            self.push(RawImportKind::Reflective, lit, node);
        }
    }

    /// Plain string literal contents; f-strings and concatenations are not
    /// treated as literals
    fn string_literal(&self, node: Node<'_>) -> Option<String> {
        if node.kind() != "string" {
            return None;
        }
        let mut cursor = node.walk();
        let mut out = String::new();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "interpolation" => return None,
                "string_content" => out.push_str(self.text(child)),
                _ => {}
            }
        }
        Some(out)
    }
}
