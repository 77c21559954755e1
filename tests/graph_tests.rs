//! End-to-end graph construction tests over real repository trees

mod common;

use common::{closure_out_names, has_edge, id, TestRepo};
use pysift::{DiagnosticKind, HookConfig, ModuleKind};

#[test]
fn cyclic_pair_builds_both_edges() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/a.py", "import pkg.b\n")
        .add_file("pkg/b.py", "from . import a\n");
    let graph = repo.build();

    assert!(has_edge(&graph, "pkg.a", "pkg.b"));
    assert!(has_edge(&graph, "pkg.b", "pkg.a"));

    // a cycle pulls the seed into its own closure
    let closure = closure_out_names(&graph, "pkg.a");
    assert!(closure.contains(&"pkg.a".to_string()));
    assert!(closure.contains(&"pkg.b".to_string()));
    let reverse = graph.closure_in(id(&graph, "pkg.a"));
    assert!(reverse.contains(&id(&graph, "pkg.b")));
    assert!(reverse.contains(&id(&graph, "pkg.a")));
}

#[test]
fn every_discovered_file_has_exactly_one_node() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/a.py", "import os\n")
        .add_file("pkg/b.py", "")
        .add_file("top.py", "");
    let graph = repo.build();

    for name in ["pkg.a", "pkg.b", "pkg", "top"] {
        assert!(graph.id_for_name(name).is_some(), "missing node {}", name);
    }
    assert_eq!(graph.id_for_path(&repo.file("pkg/a.py")), Some(id(&graph, "pkg.a")));
}

#[test]
fn wildcard_expands_to_submodules_on_disk() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_package("pkg/sub")
        .add_file("pkg/sub/x.py", "")
        .add_file("pkg/sub/y.py", "")
        .add_file("consumer.py", "from pkg.sub import *\n");
    let graph = repo.build();

    assert!(has_edge(&graph, "consumer", "pkg.sub"));
    assert!(has_edge(&graph, "consumer", "pkg.sub.x"));
    assert!(has_edge(&graph, "consumer", "pkg.sub.y"));
}

#[test]
fn wildcard_into_empty_package_is_silent() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_package("pkg/empty")
        .add_file("consumer.py", "from pkg.empty import *\n");
    let graph = repo.build();

    assert!(has_edge(&graph, "consumer", "pkg.empty"));
    // zero expansion edges beyond the package itself, and no diagnostic
    assert!(!graph
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::Resolve));
}

#[test]
fn external_wildcard_collapses_to_the_package() {
    let repo = TestRepo::new();
    repo.add_file("consumer.py", "from numpy import *\n");
    let graph = repo.build();

    assert!(has_edge(&graph, "consumer", "numpy"));
    assert_eq!(graph.module(id(&graph, "numpy")).kind, ModuleKind::External);
}

#[test]
fn typechecking_imports_are_excluded_by_default() {
    let repo = TestRepo::new();
    let source = "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    import only_typed\n";
    repo.add_file("consumer.py", source);

    let graph = repo.build();
    assert!(graph.id_for_name("only_typed").is_none());

    let hooks: HookConfig =
        serde_json::from_str(r#"{"include_typechecking": true}"#).unwrap();
    let graph = repo.build_with(&hooks);
    assert!(has_edge(&graph, "consumer", "only_typed"));
}

#[test]
fn hint_guard_imports_land_in_the_graph() {
    let repo = TestRepo::new();
    repo.add_file("consumer.py", "if False:\n    import hinted.module\n");
    let graph = repo.build();

    assert!(has_edge(&graph, "consumer", "hinted.module"));
    assert!(graph.is_hinted(id(&graph, "consumer")));
}

#[test]
fn relative_import_past_root_is_a_diagnostic_not_an_edge() {
    let repo = TestRepo::new();
    repo.add_file("top.py", "from .. import x\n");
    let graph = repo.build();

    let top = id(&graph, "top");
    assert!(graph.successors(top).is_empty());
    assert!(graph
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::Resolve
            && d.message.contains("escapes the package root")));
}

#[test]
fn duplicate_top_level_module_keeps_earlier_root() {
    let repo = TestRepo::new();
    repo.add_file("first/foo.py", "import json\n")
        .add_file("second/foo.py", "import sys\n");
    let hooks = HookConfig {
        source_roots: vec![repo.file("first"), repo.file("second")],
        ..Default::default()
    };
    let graph = repo.build_with(&hooks);

    let foo = id(&graph, "foo");
    assert_eq!(
        graph.module(foo).path.as_deref(),
        Some(repo.file("first/foo.py").as_path())
    );
    assert!(graph
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::DuplicateModule));
}

#[test]
fn module_file_loses_to_sibling_package() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_package("pkg/foo")
        .add_file("pkg/foo.py", "import json\n");
    let graph = repo.build();

    // pkg.foo is the package, not the stray module file
    let foo = id(&graph, "pkg.foo");
    assert_eq!(
        graph.module(foo).path.as_deref(),
        Some(repo.file("pkg/foo/__init__.py").as_path())
    );
    assert!(graph
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::ShadowedModule));
}

#[test]
fn namespace_packages_resolve_without_markers() {
    let repo = TestRepo::new();
    repo.add_file("ns/sub/mod.py", "")
        .add_file("consumer.py", "import ns.sub.mod\n");
    let hooks = HookConfig {
        source_roots: vec![repo.path().to_path_buf()],
        ..Default::default()
    };
    let graph = repo.build_with(&hooks);

    assert!(has_edge(&graph, "consumer", "ns.sub.mod"));
    assert_eq!(graph.module(id(&graph, "ns.sub")).kind, ModuleKind::Namespace);
    assert_eq!(graph.module(id(&graph, "ns")).kind, ModuleKind::Namespace);
}

#[test]
fn pkgutil_init_becomes_a_pathless_namespace_node() {
    let repo = TestRepo::new();
    repo.add_file(
        "pkg/__init__.py",
        "__path__ = __import__('pkgutil').extend_path(__path__, __name__)\n",
    )
    .add_file("pkg/mod.py", "");
    let graph = repo.build();

    let pkg = id(&graph, "pkg");
    assert_eq!(graph.module(pkg).kind, ModuleKind::Namespace);
    assert!(graph.module(pkg).path.is_none());
    assert!(graph.id_for_name("pkg.mod").is_some());
}

#[test]
fn deep_import_implies_ancestor_packages() {
    let repo = TestRepo::new();
    repo.add_package("lib")
        .add_package("lib/sub")
        .add_file("lib/sub/x.py", "")
        .add_file("consumer.py", "import lib.sub.x\n");
    let graph = repo.build();

    // importing lib.sub.x executes lib and lib.sub on the way down
    let closure = closure_out_names(&graph, "consumer");
    assert!(closure.contains(&"lib.sub.x".to_string()));
    assert!(closure.contains(&"lib.sub".to_string()));
    assert!(closure.contains(&"lib".to_string()));
}

#[test]
fn submodule_shorthand_prefers_the_submodule() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/helper.py", "")
        .add_file("uses_module.py", "from pkg import helper\n")
        .add_file("uses_attr.py", "from pkg import CONSTANT\n");
    let graph = repo.build();

    assert!(has_edge(&graph, "uses_module", "pkg.helper"));
    assert!(has_edge(&graph, "uses_attr", "pkg"));
    assert!(!graph.successors(id(&graph, "uses_attr")).iter().any(|&t| {
        graph.module(t).name == "pkg.CONSTANT"
    }));
}

#[test]
fn unresolved_internal_imports_are_indexed() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("consumer.py", "from pkg.missing import thing\n");
    let graph = repo.build();

    let unresolved: Vec<&str> = graph.unresolved().map(|(name, _)| name).collect();
    assert_eq!(unresolved, vec!["pkg.missing"]);
    assert!(graph
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::Resolve));
}

#[test]
fn reflective_literal_imports_become_edges() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/target.py", "")
        .add_file(
            "consumer.py",
            "import importlib\nimportlib.import_module('pkg.target')\n",
        );
    let graph = repo.build();

    assert!(has_edge(&graph, "consumer", "pkg.target"));
}

#[test]
fn external_prefixes_are_tracked_without_code() {
    let repo = TestRepo::new();
    repo.add_file("consumer.py", "import importlib.resources\n");
    let hooks = HookConfig {
        external_prefixes: vec!["importlib".to_string()],
        ..Default::default()
    };
    let graph = repo.build_with(&hooks);

    assert!(has_edge(&graph, "consumer", "importlib"));
}

#[test]
fn stub_sources_fill_in_for_missing_py_files() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/native.pyx", "cdef int x = 1\n")
        .add_file("pkg/typed.pyi", "x: int\n")
        .add_file("pkg/dual.py", "")
        .add_file("pkg/dual.pyi", "x: int\n");
    let graph = repo.build();

    assert_eq!(
        graph.module(id(&graph, "pkg.native")).path.as_deref(),
        Some(repo.file("pkg/native.pyx").as_path())
    );
    assert_eq!(
        graph.module(id(&graph, "pkg.typed")).path.as_deref(),
        Some(repo.file("pkg/typed.pyi").as_path())
    );
    // the stub next to a real module is ignored
    assert_eq!(
        graph.module(id(&graph, "pkg.dual")).path.as_deref(),
        Some(repo.file("pkg/dual.py").as_path())
    );
}

#[test]
fn syntax_error_registers_an_empty_node() {
    let repo = TestRepo::new();
    repo.add_file("broken.py", "def oops(:\n    import hidden\n");
    let graph = repo.build();

    let broken = id(&graph, "broken");
    assert!(graph.successors(broken).is_empty());
    assert!(graph
        .diagnostics()
        .iter()
        .any(|d| d.kind == DiagnosticKind::Parse));
}

#[test]
fn empty_repository_builds_an_empty_graph() {
    let repo = TestRepo::new();
    let graph = repo.build();
    assert_eq!(graph.node_count(), 0);
    assert!(graph.tests().is_empty());
    assert!(pysift::select(&graph, &[]).tests.is_empty());
}

#[test]
fn identical_trees_build_identical_graphs() {
    let make = || {
        let repo = TestRepo::new();
        repo.add_package("pkg")
            .add_file("pkg/a.py", "import pkg.b\nimport os\n")
            .add_file("pkg/b.py", "from . import a\n")
            .add_file("tests/test_a.py", "import pkg.a\n");
        repo
    };
    let (r1, r2) = (make(), make());
    let (g1, g2) = (r1.build(), r2.build());

    let dump = |g: &pysift::Graph| {
        let mut buf = Vec::new();
        g.dump_text(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    };
    assert_eq!(dump(&g1), dump(&g2));
    assert_eq!(g1.node_count(), g2.node_count());
}
