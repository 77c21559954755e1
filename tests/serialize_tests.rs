//! Round-trip and format-safety tests for the binary graph file

mod common;

use std::collections::BTreeSet;
use std::fs;

use common::TestRepo;
use pysift::{
    load_graph, save_graph, scan_summary, BuildOptions, Graph, HookConfig, PysiftError,
};

fn fixture() -> TestRepo {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/a.py", "import pkg.b\nfrom pkg.missing import thing\n")
        .add_file("pkg/b.py", "from . import a\nimport os\n")
        .add_file("pkg/test_x.py", "import pkg.b\nif False:\n    import hinted.dep\n");
    repo
}

fn dump(graph: &Graph) -> String {
    let mut buf = Vec::new();
    graph.dump_text(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn roundtrip_preserves_graph_contents() {
    let repo = fixture();
    let graph = repo.build();
    let file = repo.file("graph.psig");
    save_graph(&graph, &file).unwrap();
    let reloaded = load_graph(&file).unwrap();

    assert_eq!(graph.node_count(), reloaded.node_count());
    assert_eq!(graph.summary_hash(), reloaded.summary_hash());
    assert_eq!(graph.meta(), reloaded.meta());
    assert_eq!(dump(&graph), dump(&reloaded));
    assert_eq!(graph.tests(), reloaded.tests());
    assert_eq!(graph.diagnostics().len(), reloaded.diagnostics().len());

    let unresolved: Vec<_> = graph.unresolved().map(|(n, _)| n.to_string()).collect();
    let unresolved_reloaded: Vec<_> =
        reloaded.unresolved().map(|(n, _)| n.to_string()).collect();
    assert_eq!(unresolved, unresolved_reloaded);

    // reverse closures agree on every node
    for (id, info) in graph.modules() {
        let other = reloaded
            .id_for_name(&info.name)
            .expect("node survives the roundtrip");
        let a: BTreeSet<String> = graph
            .closure_in(id)
            .iter()
            .map(|&m| graph.module(m).name.clone())
            .collect();
        let b: BTreeSet<String> = reloaded
            .closure_in(other)
            .iter()
            .map(|&m| reloaded.module(m).name.clone())
            .collect();
        assert_eq!(a, b, "closure_in mismatch for {}", info.name);
    }
}

#[test]
fn save_load_save_is_byte_identical() {
    let repo = fixture();
    let graph = repo.build();
    let first = repo.file("first.psig");
    let second = repo.file("second.psig");
    save_graph(&graph, &first).unwrap();
    let reloaded = load_graph(&first).unwrap();
    save_graph(&reloaded, &second).unwrap();
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn hint_flags_survive_the_roundtrip() {
    let repo = fixture();
    let graph = repo.build();
    let file = repo.file("graph.psig");
    save_graph(&graph, &file).unwrap();
    let reloaded = load_graph(&file).unwrap();

    let test_x = reloaded.id_for_name("pkg.test_x").unwrap();
    assert!(reloaded.is_hinted(test_x));
}

#[test]
fn garbage_file_is_rejected() {
    let repo = TestRepo::new();
    repo.add_file("junk.psig", "this is not a graph\n");
    match load_graph(&repo.file("junk.psig")) {
        Err(PysiftError::GraphFormat { message, .. }) => {
            assert!(message.contains("not a pysift graph"));
        }
        other => panic!("expected format error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn version_mismatch_is_a_hard_error() {
    let repo = fixture();
    let graph = repo.build();
    let file = repo.file("graph.psig");
    save_graph(&graph, &file).unwrap();

    // flip the version halfword right after the magic
    let mut bytes = fs::read(&file).unwrap();
    bytes[4] = 0xFF;
    bytes[5] = 0xFF;
    fs::write(&file, &bytes).unwrap();

    match load_graph(&file) {
        Err(PysiftError::GraphFormat { message, .. }) => {
            assert!(message.contains("version"));
        }
        other => panic!("expected format error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn summary_hash_tracks_tree_state() {
    let repo = fixture();
    let graph = repo.build();
    let hooks = HookConfig::default();
    let options = BuildOptions::default();
    let roots = vec![repo.path().to_path_buf()];

    let current = scan_summary(&roots, &hooks, &options).unwrap();
    assert!(graph.is_fresh(current));

    repo.add_file("pkg/b.py", "from . import a\nimport sys\n");
    let changed = scan_summary(&roots, &hooks, &options).unwrap();
    assert!(!graph.is_fresh(changed));
}
