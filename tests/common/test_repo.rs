//! Temporary Python repository builder for integration tests

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use pysift::{build_graph, BuildOptions, Graph, HookConfig};

/// Builder for throwaway Python repository trees
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new empty test repository
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Get the path to the test repository root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a file inside the repository
    pub fn file(&self, relative_path: &str) -> PathBuf {
        self.dir.path().join(relative_path)
    }

    /// Add a source file with the given content
    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Add an empty `__init__.py` under the given package directory
    pub fn add_package(&self, relative_dir: &str) -> &Self {
        self.add_file(&format!("{}/__init__.py", relative_dir), "")
    }

    /// Build the graph with default hooks
    pub fn build(&self) -> Graph {
        self.build_with(&HookConfig::default())
    }

    /// Build the graph with the given hook overrides
    pub fn build_with(&self, hooks: &HookConfig) -> Graph {
        build_graph(
            &[self.path().to_path_buf()],
            hooks,
            &BuildOptions::default(),
        )
        .expect("graph build failed")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
