//! Structured diagnostics collected during a graph build
//!
//! Recoverable problems never abort a build. They are recorded here, keyed
//! by the file they originate from, and travel with the graph (including
//! through serialization) so that callers can surface them after the fact.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Category of a recoverable problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// File or directory could not be read
    Io,
    /// Source file failed to parse (syntax error or parse timeout)
    Parse,
    /// Import reference could not be resolved (relative past root, etc.)
    Resolve,
    /// Two source roots expose the same module name
    DuplicateModule,
    /// A module file is shadowed by a sibling package directory
    ShadowedModule,
    /// A changed file handed to the selector does not map to any node
    Select,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Parse => "parse",
            Self::Resolve => "resolve",
            Self::DuplicateModule => "duplicate-module",
            Self::ShadowedModule => "shadowed-module",
            Self::Select => "select",
        }
    }

    pub(crate) fn to_tag(self) -> u8 {
        match self {
            Self::Io => 0,
            Self::Parse => 1,
            Self::Resolve => 2,
            Self::DuplicateModule => 3,
            Self::ShadowedModule => 4,
            Self::Select => 5,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Io,
            1 => Self::Parse,
            2 => Self::Resolve,
            3 => Self::DuplicateModule,
            4 => Self::ShadowedModule,
            5 => Self::Select,
            _ => return None,
        })
    }
}

/// A single recoverable problem tied to a file (or to the build as a whole)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,

    /// File the problem originates from, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn global(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(f, "[{}] {}: {}", self.kind.as_str(), p.display(), self.message),
            None => write!(f, "[{}] {}", self.kind.as_str(), self.message),
        }
    }
}
