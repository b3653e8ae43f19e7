use crate::common::error::Error;
use std::path::{Path, PathBuf};

/// One object that could not be extracted or searched
#[derive(Debug)]
pub struct NodeFailure {
    /// Embedding path label of the object
    pub label: String,
    pub error: Error,
}

/// Outcome of one extraction call.
///
/// Outputs and failures are in discovery order.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    outputs: Vec<PathBuf>,
    failures: Vec<NodeFailure>,
}

impl ExtractionReport {
    /// Files written, in discovery order.
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }

    /// Whether every object was extracted without failure.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_parts(self) -> (Vec<PathBuf>, Vec<NodeFailure>) {
        (self.outputs, self.failures)
    }
}

/// Append-only collector for an [`ExtractionReport`].
#[derive(Debug, Default)]
pub(crate) struct ReportBuilder {
    report: ExtractionReport,
}

impl ReportBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_output(&mut self, path: &Path) {
        self.report.outputs.push(path.to_path_buf());
    }

    pub(crate) fn push_failure(&mut self, label: impl Into<String>, error: Error) {
        self.report.failures.push(NodeFailure {
            label: label.into(),
            error,
        });
    }

    pub(crate) fn output_count(&self) -> usize {
        self.report.outputs.len()
    }

    pub(crate) fn failure_count(&self) -> usize {
        self.report.failures.len()
    }

    pub(crate) fn finish(self) -> ExtractionReport {
        self.report
    }
}
