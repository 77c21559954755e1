//! Selection engine tests: changed files in, ordered test files out

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use common::TestRepo;
use pysift::{select, select_modules, HookConfig};

fn scenario_repo() -> TestRepo {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/a.py", "import pkg.b\n")
        .add_file("pkg/b.py", "from . import a\n")
        .add_file("pkg/test_x.py", "import pkg.b\n")
        .add_file("pkg/test_y.py", "import json\n");
    repo
}

#[test]
fn change_propagates_through_a_cycle_to_the_test() {
    let repo = scenario_repo();
    let graph = repo.build();
    let selection = select(&graph, &[repo.file("pkg/a.py")]);
    assert_eq!(selection.tests, vec![repo.file("pkg/test_x.py")]);
    assert!(!selection.full_suite);
}

#[test]
fn empty_change_set_selects_nothing() {
    let repo = scenario_repo();
    let graph = repo.build();
    let selection = select(&graph, &[]);
    assert!(selection.tests.is_empty());
    assert!(!selection.full_suite);
}

#[test]
fn changing_every_source_selects_every_test() {
    let repo = scenario_repo();
    let graph = repo.build();
    let all: Vec<PathBuf> = graph
        .modules()
        .filter_map(|(_, m)| m.path.clone())
        .collect();
    let selection = select(&graph, &all);
    assert_eq!(
        selection.tests,
        vec![repo.file("pkg/test_x.py"), repo.file("pkg/test_y.py")]
    );
}

#[test]
fn selection_follows_transitive_chains() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/a.py", "")
        .add_file("other.py", "import pkg.a\n")
        .add_file("test_foo.py", "import other\n")
        .add_file("test_unrelated.py", "import json\n");
    let graph = repo.build();

    let selection = select(&graph, &[repo.file("pkg/a.py")]);
    assert_eq!(selection.tests, vec![repo.file("test_foo.py")]);
}

#[test]
fn unresolved_changed_file_triggers_full_suite() {
    let repo = scenario_repo();
    let graph = repo.build();
    let selection = select(&graph, &[repo.file("pkg/deleted.py")]);
    assert!(selection.full_suite);
    assert_eq!(
        selection.tests,
        vec![repo.file("pkg/test_x.py"), repo.file("pkg/test_y.py")]
    );
    assert_eq!(selection.diagnostics.len(), 1);
}

#[test]
fn output_is_sorted_by_path() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/core.py", "")
        .add_file("tests/test_b.py", "import pkg.core\n")
        .add_file("tests/test_a.py", "import pkg.core\n");
    let graph = repo.build();

    let selection = select(&graph, &[repo.file("pkg/core.py")]);
    assert_eq!(
        selection.tests,
        vec![repo.file("tests/test_a.py"), repo.file("tests/test_b.py")]
    );
}

#[test]
fn selection_by_module_name() {
    let repo = scenario_repo();
    let graph = repo.build();
    let selection = select_modules(&graph, &["pkg.b".to_string()]);
    assert_eq!(selection.tests, vec![repo.file("pkg/test_x.py")]);
}

#[test]
fn custom_test_patterns_shape_the_test_set() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/core.py", "")
        .add_file("check_core.py", "import pkg.core\n")
        .add_file("test_core.py", "import pkg.core\n");
    let hooks = HookConfig {
        test_patterns: vec!["check_*.py".to_string()],
        ..Default::default()
    };
    let graph = repo.build_with(&hooks);

    let selection = select(&graph, &[repo.file("pkg/core.py")]);
    assert_eq!(selection.tests, vec![repo.file("check_core.py")]);
}

#[test]
fn dynamic_dependencies_connect_plugin_hosts() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/host.py", "")
        .add_file("pkg/plugin.py", "")
        .add_file("test_host.py", "import pkg.host\n");
    // pkg.host loads pkg.plugin reflectively at runtime; the hook says so
    let hooks = HookConfig {
        dynamic_dependencies: BTreeMap::from([(
            "pkg.host".to_string(),
            BTreeSet::from(["pkg.plugin".to_string()]),
        )]),
        ..Default::default()
    };
    let graph = repo.build_with(&hooks);

    let selection = select(&graph, &[repo.file("pkg/plugin.py")]);
    assert_eq!(selection.tests, vec![repo.file("test_host.py")]);
}

#[test]
fn leaf_augmentations_reach_seeds_that_import_the_trigger() {
    let repo = TestRepo::new();
    repo.add_package("pkg")
        .add_file("pkg/fixtures.py", "")
        .add_file("pkg/data_models.py", "")
        .add_file("test_uses_fixtures.py", "import pkg.fixtures\n")
        .add_file("test_plain.py", "import json\n");
    // anything importing pkg.fixtures implicitly depends on pkg.data_models
    let hooks = HookConfig {
        dynamic_dependencies_at_leaves: BTreeMap::from([(
            "pkg.fixtures".to_string(),
            BTreeSet::from(["pkg.data_models".to_string()]),
        )]),
        ..Default::default()
    };
    let graph = repo.build_with(&hooks);

    let selection = select(&graph, &[repo.file("pkg/data_models.py")]);
    assert_eq!(selection.tests, vec![repo.file("test_uses_fixtures.py")]);
}
