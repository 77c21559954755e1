//! Validation of the static graph against a dynamic import trace
//!
//! The authoritative record of what actually gets imported comes from the
//! host runtime: a loader shim records `(importer, imported)` pairs while
//! each test file is imported once. That shim is host-specific and lives
//! outside this crate; the core consumes its output through [`TraceEvent`]
//! values, most conveniently via the JSON-lines adapter [`TraceLog`].
//!
//! Validation asks one question per recorded edge: is the imported module
//! inside the importer's static transitive closure? Every miss becomes a
//! structured diagnostic. Strict mode turns any miss into a fatal error,
//! warn mode reports and continues, disabled skips the work entirely.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PysiftError, Result};
use crate::graph::Graph;
use crate::moduleid::ModuleId;
use crate::resolver::root_namespace;

/// Failure policy for a validation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Any missing edge is a fatal error
    Strict,
    /// Diagnostics only; the run continues
    #[default]
    Warn,
    /// The validator is not installed
    Disabled,
}

/// One recorded import observed by the host loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub importer: String,
    pub imported: String,
}

/// A recorded loader pass, read from a JSON-lines file (one event object
/// per line; blank lines ignored)
#[derive(Debug, Default)]
pub struct TraceLog {
    pub events: Vec<TraceEvent>,
}

impl TraceLog {
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut events = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: TraceEvent =
                serde_json::from_str(line).map_err(|e| PysiftError::Trace {
                    path: path.to_path_buf(),
                    message: format!("line {}: {}", lineno + 1, e),
                })?;
            events.push(event);
        }
        Ok(Self { events })
    }
}

/// Why a recorded edge could not be confirmed statically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationIssue {
    /// The import happened but the static closure does not contain it
    MissingEdge,
    /// The importer itself is unknown to the graph
    UnknownImporter,
}

/// One dynamic edge the static graph cannot account for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDiagnostic {
    pub issue: ValidationIssue,
    pub importer: String,
    pub imported: String,
    /// The importer's source carries hint-guarded imports; a missing edge
    /// there usually means one more hint is wanted
    pub hinted: bool,
}

/// Outcome of a validation run
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
    /// Recorded events that were actually checked against the graph
    pub checked: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Apply the failure policy: strict mode turns misses into an error
    pub fn enforce(&self, mode: ValidationMode) -> Result<()> {
        if mode == ValidationMode::Strict && !self.is_clean() {
            return Err(PysiftError::Validation {
                missing: self.diagnostics.len(),
            });
        }
        Ok(())
    }
}

/// Diff a recorded trace against the static closure of each importer.
///
/// Events involving modules entirely outside the repository's namespaces
/// (stdlib, third-party) are skipped: the static graph only answers for
/// names it could ever contain.
pub fn validate(
    graph: &Graph,
    events: impl IntoIterator<Item = TraceEvent>,
    mode: ValidationMode,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    if mode == ValidationMode::Disabled {
        return report;
    }

    // namespaces the graph can answer for
    let internal_tops: BTreeSet<&str> = graph
        .modules()
        .filter(|(_, info)| info.is_internal())
        .map(|(_, info)| root_namespace(&info.name))
        .collect();

    let mut closures: HashMap<ModuleId, Arc<BTreeSet<ModuleId>>> = HashMap::new();

    for event in events {
        if event.importer == event.imported {
            continue;
        }
        let importer_id = graph
            .id_for_name(&event.importer)
            .or_else(|| graph.id_for_path(Path::new(&event.importer)));
        let Some(importer_id) = importer_id else {
            if internal_tops.contains(root_namespace(&event.importer)) {
                report.diagnostics.push(ValidationDiagnostic {
                    issue: ValidationIssue::UnknownImporter,
                    importer: event.importer,
                    imported: event.imported,
                    hinted: false,
                });
            }
            continue;
        };

        let imported_id = graph.id_for_name(&event.imported);
        let in_universe =
            imported_id.is_some() || internal_tops.contains(root_namespace(&event.imported));
        if !in_universe {
            continue;
        }
        report.checked += 1;

        let closure = closures
            .entry(importer_id)
            .or_insert_with(|| Arc::new(graph.closure_out(importer_id)))
            .clone();
        let confirmed = imported_id.is_some_and(|id| id == importer_id || closure.contains(&id));
        if !confirmed {
            debug!(
                importer = %event.importer,
                imported = %event.imported,
                "dynamic edge missing from static closure"
            );
            report.diagnostics.push(ValidationDiagnostic {
                issue: ValidationIssue::MissingEdge,
                hinted: graph.is_hinted(importer_id),
                importer: event.importer,
                imported: event.imported,
            });
        }
    }
    report
}
